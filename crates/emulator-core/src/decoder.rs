//! Streaming instruction decoder.
//!
//! Pops the 64-bit opcode at the instruction pointer, then each operand per
//! the opcode schema, producing a fully-typed [`DecodedInstruction`] plus a
//! text literal for diagnostics. A decode failure leaves partially-consumed
//! state behind only in the stream position; the executor restores the
//! instruction pointer to the start of the faulting instruction before
//! raising the illegal-instruction interrupt.

use crate::cpu::CpuCore;
use crate::encoding::{is_floating_point, InstructionSpec, Width};
use crate::fault::CoreError;
use crate::operand::{self, ByteSource, Operand};

/// A fully decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction {
    /// Schema entry for the opcode.
    pub spec: &'static InstructionSpec,
    /// Width tag popped after the opcode, when the schema carries one.
    pub width: Option<Width>,
    /// Decoded operand records in source order.
    pub operands: Vec<Operand>,
    /// Canonical text form, e.g. `ADD .64bit <%FER14>, <$(0x1F)>`.
    pub literal: String,
}

impl DecodedInstruction {
    /// The instruction width.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalInstruction`] when the schema carries no
    /// width (callers dispatching width-generic semantics must not reach
    /// this).
    pub fn width(&self) -> Result<Width, CoreError> {
        self.width.ok_or_else(|| {
            CoreError::IllegalInstruction(format!("{} carries no width", self.spec.mnemonic))
        })
    }
}

/// [`ByteSource`] that consumes memory at the CPU's instruction pointer,
/// advancing it one byte per pop.
pub struct CodeStream<'c> {
    cpu: &'c CpuCore,
}

impl<'c> CodeStream<'c> {
    /// Creates a stream at the current instruction pointer.
    #[must_use]
    pub const fn new(cpu: &'c CpuCore) -> Self {
        Self { cpu }
    }
}

impl ByteSource for CodeStream<'_> {
    fn next_u8(&mut self) -> Result<u8, CoreError> {
        let pointer = self.cpu.instruction_pointer();
        let byte = self.cpu.memory().read_uint(pointer, 1)?;
        self.cpu.set_instruction_pointer(pointer.wrapping_add(1));
        #[allow(clippy::cast_possible_truncation)]
        let byte = byte as u8;
        Ok(byte)
    }
}

/// Decodes one instruction from an arbitrary byte source.
///
/// # Errors
///
/// Returns [`CoreError::IllegalInstruction`] for unknown opcodes, malformed
/// operand records, or operand widths that disagree with the instruction.
pub fn decode_from(source: &mut dyn ByteSource) -> Result<DecodedInstruction, CoreError> {
    let code = source.next_u64()?;
    let spec = crate::encoding::spec_for_code(code)
        .ok_or_else(|| CoreError::IllegalInstruction(format!("unknown opcode {code:#X}")))?;

    let width = if spec.width_prefixed {
        let tag = source.next_u8()?;
        let width = Width::from_tag(tag)
            .filter(|width| width.is_integer())
            .ok_or_else(|| {
                CoreError::IllegalInstruction(format!(
                    "unknown width tag {tag:#04X} after {}",
                    spec.mnemonic
                ))
            })?;
        Some(width)
    } else {
        None
    };

    let mut operands = Vec::with_capacity(usize::from(spec.operand_count));
    for _ in 0..spec.operand_count {
        operands.push(operand::decode(source)?);
    }

    validate_operand_widths(spec, width, &operands)?;

    let literal = render_literal(spec, width, &operands);
    Ok(DecodedInstruction {
        spec,
        width,
        operands,
        literal,
    })
}

/// Decodes the instruction at the CPU's instruction pointer, advancing it
/// past the consumed bytes.
///
/// # Errors
///
/// Returns [`CoreError::IllegalInstruction`] on any decode fault; the
/// instruction pointer is left mid-instruction and the caller restores it.
pub fn decode_instruction(cpu: &CpuCore) -> Result<DecodedInstruction, CoreError> {
    let mut stream = CodeStream::new(cpu);
    decode_from(&mut stream)
}

/// Checks that register and memory operands agree with the instruction
/// width: width-tagged instructions take operands of exactly their width,
/// and floating-point instructions take `XMM` registers (memory and
/// constant operands are 64-bit cells).
///
/// # Errors
///
/// Returns [`CoreError::IllegalInstruction`] on a mismatch.
pub fn validate_operand_widths(
    spec: &InstructionSpec,
    width: Option<Width>,
    operands: &[Operand],
) -> Result<(), CoreError> {
    let expected_register = if is_floating_point(spec.opcode) {
        Some(Width::Fp128)
    } else {
        width
    };
    let expected_memory = if is_floating_point(spec.opcode) {
        Some(Width::W64)
    } else {
        width
    };

    for operand in operands {
        match operand {
            Operand::Register {
                width: operand_width,
                ..
            } => {
                if let Some(expected) = expected_register {
                    if *operand_width != expected {
                        return Err(CoreError::IllegalInstruction(format!(
                            "{} operand width tag {:#04X} does not match instruction width {:#04X}",
                            spec.mnemonic,
                            operand_width.tag(),
                            expected.tag()
                        )));
                    }
                }
            }
            Operand::Memory {
                width: operand_width,
                ..
            } => {
                if let Some(expected) = expected_memory {
                    if *operand_width != expected {
                        return Err(CoreError::IllegalInstruction(format!(
                            "{} memory access width tag {:#04X} does not match instruction width {:#04X}",
                            spec.mnemonic,
                            operand_width.tag(),
                            expected.tag()
                        )));
                    }
                }
            }
            Operand::Constant { .. } => {}
        }
    }
    Ok(())
}

fn render_literal(
    spec: &InstructionSpec,
    width: Option<Width>,
    operands: &[Operand],
) -> String {
    let mut literal = spec.mnemonic.to_owned();
    if let Some(suffix) = width.and_then(Width::suffix) {
        literal.push(' ');
        literal.push_str(suffix);
    }
    for (position, operand) in operands.iter().enumerate() {
        literal.push_str(if position == 0 { " " } else { ", " });
        literal.push_str(&operand::render(operand));
    }
    literal
}
