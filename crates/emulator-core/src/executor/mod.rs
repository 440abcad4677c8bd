//! Instruction execution: dispatch, stack discipline, and interrupts.
//!
//! `step` drives one pass of the machine's state cycle:
//! fetch → decode opcode → decode operands → resolve → execute →
//! advance/branch/interrupt. Any fault raised while decoding restores the
//! instruction pointer to the start of the faulting instruction and
//! dispatches the illegal-instruction interrupt; execution faults dispatch
//! an interrupt with the instruction pointer already past the instruction.

mod alu;

pub use alu::{sign_bit, sign_extend, AluResult};

use crate::api::{StepOutcome, TraceEvent, TraceSink};
use crate::cpu::CpuCore;
use crate::decoder::{self, DecodedInstruction};
use crate::encoding::{
    Opcode, Width, R_CODE_BASE, R_DATA_BASE, R_DATA_POINTER, R_EXTENDED_SEGMENT_BASE,
    R_EXTENDED_SEGMENT_POINTER, R_STACK_BASE, R_STACK_POINTER,
};
use crate::fault::CoreError;
use crate::interrupt::{FaultDiagnostic, INT_DIVISION_BY_ZERO, INT_ILLEGAL_INSTRUCTION};
use crate::resolver::{resolve, OperandCell};

/// Register cells saved by `PUSHALL`, in push order. `SP`, `CB`, and the
/// instruction pointer are excluded so the restore cannot corrupt the walk.
const PUSHALL_ORDER: &[(Width, u8)] = &[
    (Width::W8, 0),
    (Width::W8, 1),
    (Width::W8, 2),
    (Width::W8, 3),
    (Width::W8, 4),
    (Width::W8, 5),
    (Width::W8, 6),
    (Width::W8, 7),
    (Width::W16, 0),
    (Width::W16, 1),
    (Width::W16, 2),
    (Width::W16, 3),
    (Width::W16, 4),
    (Width::W16, 5),
    (Width::W16, 6),
    (Width::W16, 7),
    (Width::W32, 0),
    (Width::W32, 1),
    (Width::W32, 2),
    (Width::W32, 3),
    (Width::W32, 4),
    (Width::W32, 5),
    (Width::W32, 6),
    (Width::W32, 7),
    (Width::W64, 0),
    (Width::W64, 1),
    (Width::W64, 2),
    (Width::W64, 3),
    (Width::W64, 4),
    (Width::W64, 5),
    (Width::W64, 6),
    (Width::W64, 7),
    (Width::W64, 8),
    (Width::W64, 9),
    (Width::W64, 10),
    (Width::W64, 11),
    (Width::W64, 12),
    (Width::W64, 13),
    (Width::W64, 14),
    (Width::W64, 15),
    (Width::W64, R_STACK_BASE),
    (Width::W64, R_DATA_BASE),
    (Width::W64, R_DATA_POINTER),
    (Width::W64, R_EXTENDED_SEGMENT_BASE),
    (Width::W64, R_EXTENDED_SEGMENT_POINTER),
];

enum Flow {
    Continue,
    Halt,
    Interrupt(u64),
}

/// Executes one instruction, reporting to `sink`.
///
/// # Errors
///
/// Returns a [`FaultDiagnostic`] when an interrupt had to be raised but
/// could not be dispatched; the VM is halted.
pub fn step(cpu: &CpuCore, sink: &mut dyn TraceSink) -> Result<StepOutcome, FaultDiagnostic> {
    let start = cpu.instruction_pointer();

    let instruction = match decoder::decode_instruction(cpu) {
        Ok(instruction) => instruction,
        Err(_) => {
            // Discard partially-decoded state: the faulting instruction is
            // re-entered by the handler at its first byte.
            cpu.set_instruction_pointer(start);
            return dispatch_interrupt(cpu, INT_ILLEGAL_INSTRUCTION, start, None, sink);
        }
    };

    match execute(cpu, &instruction) {
        Ok(Flow::Continue) => {
            sink.on_event(TraceEvent::Retired {
                instruction_pointer: start,
                literal: &instruction.literal,
            });
            Ok(StepOutcome::Retired)
        }
        Ok(Flow::Halt) => {
            cpu.request_stop();
            sink.on_event(TraceEvent::Halted {
                instruction_pointer: cpu.instruction_pointer(),
            });
            Ok(StepOutcome::Halted)
        }
        Ok(Flow::Interrupt(code)) => {
            dispatch_interrupt(cpu, code, start, Some(&instruction), sink)
        }
        Err(_) => dispatch_interrupt(cpu, INT_ILLEGAL_INSTRUCTION, start, Some(&instruction), sink),
    }
}

fn dispatch_interrupt(
    cpu: &CpuCore,
    code: u64,
    faulting_pointer: u64,
    instruction: Option<&DecodedInstruction>,
    sink: &mut dyn TraceSink,
) -> Result<StepOutcome, FaultDiagnostic> {
    match soft_interruption_ready(cpu, code) {
        Ok(()) => {
            sink.on_event(TraceEvent::InterruptRaised {
                code,
                instruction_pointer: faulting_pointer,
            });
            Ok(StepOutcome::Interrupted { code })
        }
        Err(_) => {
            cpu.request_stop();
            let opcode = cpu.memory().read_uint(faulting_pointer, 8).unwrap_or(0);
            Err(FaultDiagnostic {
                instruction_pointer: faulting_pointer,
                opcode,
                literal: instruction.map(|decoded| decoded.literal.clone()),
            })
        }
    }
}

/// Transfers control to the vector entry for `code`, pushing the current
/// instruction pointer as the return context.
///
/// # Errors
///
/// Returns [`CoreError::IllegalInstruction`] when the code has no vector
/// entry or the context push fails; the caller halts with a diagnostic.
pub fn soft_interruption_ready(cpu: &CpuCore, code: u64) -> Result<(), CoreError> {
    let entry = cpu.vector_table().entry(code).ok_or_else(|| {
        CoreError::IllegalInstruction(format!("no vector entry for interrupt {code:#X}"))
    })?;
    push_cell(cpu, cpu.instruction_pointer(), 8)?;
    cpu.set_instruction_pointer(entry);
    Ok(())
}

fn push_cell(cpu: &CpuCore, value: u64, length: usize) -> Result<(), CoreError> {
    let pointer = cpu.read_register(Width::W64, R_STACK_POINTER)?;
    let pointer = pointer.wrapping_sub(length as u64);
    cpu.memory().write_uint(pointer, value, length)?;
    cpu.write_register(Width::W64, R_STACK_POINTER, pointer)
}

fn pop_cell(cpu: &CpuCore, length: usize) -> Result<u64, CoreError> {
    let pointer = cpu.read_register(Width::W64, R_STACK_POINTER)?;
    let value = cpu.memory().read_uint(pointer, length)?;
    cpu.write_register(Width::W64, R_STACK_POINTER, pointer.wrapping_add(length as u64))?;
    Ok(value)
}

fn unary_cell<'c>(
    cpu: &'c CpuCore,
    instruction: &DecodedInstruction,
) -> Result<OperandCell<'c>, CoreError> {
    resolve(cpu, &instruction.operands[0])
}

fn binary_cells<'c>(
    cpu: &'c CpuCore,
    instruction: &DecodedInstruction,
) -> Result<(OperandCell<'c>, OperandCell<'c>), CoreError> {
    Ok((
        resolve(cpu, &instruction.operands[0])?,
        resolve(cpu, &instruction.operands[1])?,
    ))
}

#[allow(clippy::too_many_lines)]
fn execute(cpu: &CpuCore, instruction: &DecodedInstruction) -> Result<Flow, CoreError> {
    match instruction.spec.opcode {
        Opcode::Nop => Ok(Flow::Continue),
        Opcode::Hlt => Ok(Flow::Halt),

        Opcode::Add | Opcode::Adc | Opcode::Sub | Opcode::Cmp => {
            let width = instruction.width()?;
            let (destination, source) = binary_cells(cpu, instruction)?;
            let lhs = destination.get64()?;
            let rhs = source.get64()?;
            let carry_in = cpu.flags().carry;
            let result = match instruction.spec.opcode {
                Opcode::Add => alu::add(width, lhs, rhs, false),
                Opcode::Adc => alu::add(width, lhs, rhs, carry_in),
                _ => alu::sub(width, lhs, rhs, false),
            };
            if instruction.spec.opcode != Opcode::Cmp {
                destination.set64(result.value)?;
            }
            cpu.set_flags(result.flags);
            Ok(Flow::Continue)
        }

        Opcode::Neg => {
            let width = instruction.width()?;
            let cell = unary_cell(cpu, instruction)?;
            let value = cell.get64()?;
            let result = alu::sub(width, 0, value, false);
            cell.set64(result.value)?;
            cpu.set_flags(result.flags);
            Ok(Flow::Continue)
        }

        Opcode::Mul | Opcode::Imul => {
            let width = instruction.width()?;
            execute_multiply(cpu, instruction, width)
        }

        Opcode::Div | Opcode::Idiv => {
            let width = instruction.width()?;
            execute_divide(cpu, instruction, width)
        }

        Opcode::And | Opcode::Or | Opcode::Xor => {
            let width = instruction.width()?;
            let (destination, source) = binary_cells(cpu, instruction)?;
            let lhs = destination.get64()? & width.mask();
            let rhs = source.get64()? & width.mask();
            let value = match instruction.spec.opcode {
                Opcode::And => lhs & rhs,
                Opcode::Or => lhs | rhs,
                _ => lhs ^ rhs,
            };
            let result = alu::logic(width, value);
            destination.set64(result.value)?;
            cpu.set_flags(result.flags);
            Ok(Flow::Continue)
        }

        Opcode::Not => {
            let width = instruction.width()?;
            let cell = unary_cell(cpu, instruction)?;
            let result = alu::logic(width, !cell.get64()?);
            cell.set64(result.value)?;
            cpu.set_flags(result.flags);
            Ok(Flow::Continue)
        }

        Opcode::Shl | Opcode::Shr | Opcode::Rol | Opcode::Ror | Opcode::Rcl | Opcode::Rcr => {
            let width = instruction.width()?;
            let (destination, source) = binary_cells(cpu, instruction)?;
            let value = destination.get64()?;
            let count = source.get64()?;
            let carry_in = cpu.flags().carry;
            let result = match instruction.spec.opcode {
                Opcode::Shl => alu::shl(width, value, count),
                Opcode::Shr => alu::shr(width, value, count),
                Opcode::Rol => alu::rol(width, value, count),
                Opcode::Ror => alu::ror(width, value, count),
                Opcode::Rcl => alu::rcl(width, value, count, carry_in),
                _ => alu::rcr(width, value, count, carry_in),
            };
            destination.set64(result.value)?;
            cpu.set_flags(result.flags);
            Ok(Flow::Continue)
        }

        Opcode::Mov => {
            let (destination, source) = binary_cells(cpu, instruction)?;
            destination.set64(source.get64()?)?;
            Ok(Flow::Continue)
        }

        Opcode::Xchg => {
            let (first, second) = binary_cells(cpu, instruction)?;
            let left = first.get64()?;
            let right = second.get64()?;
            first.set64(right)?;
            second.set64(left)?;
            Ok(Flow::Continue)
        }

        Opcode::Push => {
            let width = instruction.width()?;
            let value = unary_cell(cpu, instruction)?.get64()?;
            push_cell(cpu, value, width.bytes())?;
            Ok(Flow::Continue)
        }

        Opcode::Pop => {
            let width = instruction.width()?;
            let value = pop_cell(cpu, width.bytes())?;
            unary_cell(cpu, instruction)?.set64(value)?;
            Ok(Flow::Continue)
        }

        Opcode::Pushall => {
            for (width, index) in PUSHALL_ORDER {
                let value = cpu.read_register(*width, *index)?;
                push_cell(cpu, value, 8)?;
            }
            Ok(Flow::Continue)
        }

        Opcode::Popall => {
            for (width, index) in PUSHALL_ORDER.iter().rev() {
                let value = pop_cell(cpu, 8)?;
                cpu.write_register(*width, *index, value)?;
            }
            Ok(Flow::Continue)
        }

        Opcode::Enter => {
            let size = unary_cell(cpu, instruction)?.get64()?;
            let stack_base = cpu.read_register(Width::W64, R_STACK_BASE)?;
            push_cell(cpu, stack_base, 8)?;
            let pointer = cpu.read_register(Width::W64, R_STACK_POINTER)?;
            cpu.write_register(Width::W64, R_STACK_BASE, pointer)?;
            cpu.write_register(Width::W64, R_STACK_POINTER, pointer.wrapping_sub(size))?;
            Ok(Flow::Continue)
        }

        Opcode::Leave => {
            let stack_base = cpu.read_register(Width::W64, R_STACK_BASE)?;
            cpu.write_register(Width::W64, R_STACK_POINTER, stack_base)?;
            let saved = pop_cell(cpu, 8)?;
            cpu.write_register(Width::W64, R_STACK_BASE, saved)?;
            Ok(Flow::Continue)
        }

        Opcode::Movs => {
            let count = cpu.read_register(Width::W64, 0)?;
            let source = cpu
                .read_register(Width::W64, R_CODE_BASE)?
                .wrapping_add(cpu.read_register(Width::W64, 1)?);
            let destination = cpu
                .read_register(Width::W64, R_DATA_BASE)?
                .wrapping_add(cpu.read_register(Width::W64, 2)?);
            let count = usize::try_from(count).map_err(|_| {
                CoreError::IllegalInstruction("block move count exceeds address space".into())
            })?;
            let mut buffer = vec![0u8; count];
            cpu.memory().read(source, &mut buffer)?;
            cpu.memory().write(destination, &buffer)?;
            Ok(Flow::Continue)
        }

        Opcode::Fadd => {
            let (destination, source) = binary_cells(cpu, instruction)?;
            let lhs = f64::from_bits(destination.get64()?);
            let rhs = f64::from_bits(source.get64()?);
            destination.set64((lhs + rhs).to_bits())?;
            Ok(Flow::Continue)
        }

        Opcode::Fdiv => {
            let divisor = f64::from_bits(unary_cell(cpu, instruction)?.get64()?);
            let accumulator = cpu.read_xmm(0)?;
            #[allow(clippy::cast_possible_truncation)]
            let lhs = f64::from_bits(accumulator as u64);
            let high = accumulator & (u128::MAX << 64);
            cpu.write_xmm(0, high | u128::from((lhs / divisor).to_bits()))?;
            Ok(Flow::Continue)
        }
    }
}

fn execute_multiply(
    cpu: &CpuCore,
    instruction: &DecodedInstruction,
    width: Width,
) -> Result<Flow, CoreError> {
    let bits = width.bits();
    let mask = width.mask();
    let accumulator = cpu.read_register(width, 0)?;
    let source = unary_cell(cpu, instruction)?.get64()? & mask;

    let (low, high, spill) = if instruction.spec.opcode == Opcode::Mul {
        let product = u128::from(accumulator) * u128::from(source);
        #[allow(clippy::cast_possible_truncation)]
        let low = (product as u64) & mask;
        #[allow(clippy::cast_possible_truncation)]
        let high = ((product >> bits) as u64) & mask;
        (low, high, high != 0)
    } else {
        let product = sign_extend(width, accumulator) * sign_extend(width, source);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let low = (product as u64) & mask;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let high = ((product >> bits) as u64) & mask;
        (low, high, product != sign_extend(width, low))
    };

    cpu.write_register(width, 0, low)?;
    cpu.write_register(width, 1, high)?;
    cpu.set_flags(crate::state::StatusFlags {
        carry: spill,
        overflow: spill,
        zero: low == 0,
        sign: sign_bit(width, low),
    });
    Ok(Flow::Continue)
}

fn execute_divide(
    cpu: &CpuCore,
    instruction: &DecodedInstruction,
    width: Width,
) -> Result<Flow, CoreError> {
    let mask = width.mask();
    let accumulator = cpu.read_register(width, 0)?;
    let divisor = unary_cell(cpu, instruction)?.get64()? & mask;

    if divisor == 0 {
        return Ok(Flow::Interrupt(INT_DIVISION_BY_ZERO));
    }

    let (quotient, remainder) = if instruction.spec.opcode == Opcode::Div {
        (accumulator / divisor, accumulator % divisor)
    } else {
        let lhs = sign_extend(width, accumulator);
        let rhs = sign_extend(width, divisor);
        let wide_quotient = lhs.wrapping_div(rhs);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let quotient = (wide_quotient as u64) & mask;
        // The lone wrapping case (MIN / -1) does not fit the width.
        if sign_extend(width, quotient) != wide_quotient {
            return Ok(Flow::Interrupt(INT_DIVISION_BY_ZERO));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let remainder = (lhs.wrapping_rem(rhs) as u64) & mask;
        (quotient, remainder)
    };

    cpu.write_register(width, 0, quotient)?;
    cpu.write_register(width, 1, remainder)?;
    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use crate::api::{CoreConfig, StepOutcome};
    use crate::cpu::CpuCore;
    use crate::encoding::{spec_for_mnemonic, Width, R_STACK_BASE, R_STACK_POINTER};
    use crate::interrupt::{INT_DIVISION_BY_ZERO, INTERRUPT_VECTOR_BASE};
    use crate::operand;

    fn assemble(instructions: &[&str]) -> Vec<u8> {
        let mut image = Vec::new();
        for line in instructions {
            let mut parts = line.splitn(2, ' ');
            let mnemonic = parts.next().unwrap();
            let spec = spec_for_mnemonic(mnemonic).unwrap();
            image.extend_from_slice(&spec.code.to_le_bytes());

            let rest = parts.next().unwrap_or("");
            let mut rest = rest.trim();
            if spec.width_prefixed {
                let (suffix, tail) = rest.split_once(' ').unwrap_or((rest, ""));
                let width = Width::from_suffix(suffix).unwrap();
                image.push(width.tag());
                rest = tail.trim();
            }
            for part in split_operands(rest) {
                let record = operand::parse(part).unwrap();
                operand::encode(&record, &mut image);
            }
        }
        image
    }

    fn split_operands(text: &str) -> Vec<&str> {
        let mut parts = Vec::new();
        let mut depth = 0i32;
        let mut start = 0usize;
        for (position, character) in text.char_indices() {
            match character {
                '<' => depth += 1,
                '>' => depth -= 1,
                ',' if depth == 0 => {
                    parts.push(text[start..position].trim());
                    start = position + 1;
                }
                _ => {}
            }
        }
        let last = text[start..].trim();
        if !last.is_empty() {
            parts.push(last);
        }
        parts
    }

    fn run_program(cpu: &CpuCore, instructions: &[&str]) {
        let mut listing: Vec<&str> = instructions.to_vec();
        listing.push("HLT");
        cpu.load_firmware(&assemble(&listing)).unwrap();
        let outcome = cpu.run();
        assert!(
            matches!(outcome.cause, crate::api::HaltCause::Halt),
            "program should halt cleanly: {:?}",
            outcome.cause
        );
    }

    #[test]
    fn add_wraps_and_sets_carry_for_cmp() {
        let cpu = CpuCore::default();
        cpu.write_register(Width::W8, 2, 0xFF).unwrap();
        run_program(&cpu, &["ADD .8bit <%R2>, <$(0x02)>"]);
        assert_eq!(cpu.read_register(Width::W8, 2).unwrap(), 0x01);
        assert!(cpu.flags().carry);
    }

    #[test]
    fn adc_consumes_the_carry() {
        let cpu = CpuCore::default();
        cpu.write_register(Width::W8, 0, 0xFF).unwrap();
        cpu.write_register(Width::W8, 1, 0x30).unwrap();
        run_program(
            &cpu,
            &["ADD .8bit <%R0>, <$(0x02)>", "ADC .8bit <%R1>, <$(0x00)>"],
        );
        assert_eq!(cpu.read_register(Width::W8, 0).unwrap(), 0x01);
        assert_eq!(cpu.read_register(Width::W8, 1).unwrap(), 0x31);
    }

    #[test]
    fn mov_negative_constant_narrows_to_width() {
        let cpu = CpuCore::default();
        run_program(&cpu, &["MOV .16bit <%EXR0>, <$(-32)>"]);
        assert_eq!(cpu.read_register(Width::W16, 0).unwrap(), 0xFFE0);
    }

    #[test]
    fn xor_with_self_clears_the_register() {
        let cpu = CpuCore::default();
        cpu.write_register(Width::W64, 0, 0xDEAD_BEEF).unwrap();
        run_program(&cpu, &["XOR .64bit <%FER0>, <%FER0>"]);
        assert_eq!(cpu.read_register(Width::W64, 0).unwrap(), 0);
        assert!(cpu.flags().zero);
    }

    #[test]
    fn memory_destination_receives_little_endian_value() {
        let cpu = CpuCore::default();
        cpu.write_register(Width::W64, 14, 0).unwrap();
        run_program(
            &cpu,
            &["MOV .64bit <*2&64(%FER14, $(255), $(4))>, <$(114514)>"],
        );
        assert_eq!(cpu.memory().read_uint(518, 8).unwrap(), 114_514);
    }

    #[test]
    fn push_then_pop_restores_sp_and_transfers_value() {
        let cpu = CpuCore::new(&CoreConfig {
            initial_stack_pointer: 0x1000,
            ..CoreConfig::default()
        });
        cpu.write_register(Width::W64, 0, 0xDEAD_BEEF).unwrap();
        run_program(&cpu, &["PUSH .64bit <%FER0>"]);
        assert_eq!(cpu.read_register(Width::W64, R_STACK_POINTER).unwrap(), 0xFF8);
        assert_eq!(cpu.memory().read_uint(0xFF8, 8).unwrap(), 0xDEAD_BEEF);

        let cpu2 = CpuCore::new(&CoreConfig {
            initial_stack_pointer: 0x1000,
            ..CoreConfig::default()
        });
        cpu2.write_register(Width::W64, 0, 0xDEAD_BEEF).unwrap();
        run_program(&cpu2, &["PUSH .64bit <%FER0>", "POP .64bit <%FER2>"]);
        assert_eq!(
            cpu2.read_register(Width::W64, R_STACK_POINTER).unwrap(),
            0x1000
        );
        assert_eq!(cpu2.read_register(Width::W64, 2).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn pushall_and_popall_roundtrip_the_register_file() {
        let cpu = CpuCore::default();
        for index in 0..16u8 {
            cpu.write_register(Width::W64, index, 0x100 + u64::from(index))
                .unwrap();
        }
        cpu.write_register(Width::W8, 3, 0x33).unwrap();
        cpu.write_register(Width::W16, 4, 0x4444).unwrap();
        run_program(
            &cpu,
            &[
                "PUSHALL",
                "MOV .64bit <%FER5>, <$(0)>",
                "MOV .8bit <%R3>, <$(0)>",
                "POPALL",
            ],
        );
        assert_eq!(cpu.read_register(Width::W64, 5).unwrap(), 0x105);
        assert_eq!(cpu.read_register(Width::W8, 3).unwrap(), 0x33);
        assert_eq!(cpu.read_register(Width::W16, 4).unwrap(), 0x4444);
    }

    #[test]
    fn enter_and_leave_frame_discipline() {
        let cpu = CpuCore::new(&CoreConfig {
            initial_stack_pointer: 0x2000,
            ..CoreConfig::default()
        });
        cpu.write_register(Width::W64, R_STACK_BASE, 0xAAAA).unwrap();
        run_program(&cpu, &["ENTER .64bit <$(0xFF)>", "LEAVE"]);
        assert_eq!(
            cpu.read_register(Width::W64, R_STACK_POINTER).unwrap(),
            0x2000
        );
        assert_eq!(cpu.read_register(Width::W64, R_STACK_BASE).unwrap(), 0xAAAA);
    }

    #[test]
    fn movs_copies_count_bytes_between_segments() {
        let cpu = CpuCore::default();
        cpu.memory().write(0x500, b"sysdarft").unwrap();
        cpu.write_register(Width::W64, 0, 8).unwrap();
        cpu.write_register(Width::W64, 1, 0x500).unwrap();
        cpu.write_register(Width::W64, 2, 0x900).unwrap();
        run_program(&cpu, &["MOVS"]);
        let mut copied = [0u8; 8];
        cpu.memory().read(0x900, &mut copied).unwrap();
        assert_eq!(&copied, b"sysdarft");
    }

    #[test]
    fn mul_splits_product_across_first_two_registers() {
        let cpu = CpuCore::default();
        cpu.write_register(Width::W32, 0, 0x8000_0000).unwrap();
        cpu.write_register(Width::W32, 2, 0x02).unwrap();
        run_program(&cpu, &["MUL .32bit <%HER2>"]);
        assert_eq!(cpu.read_register(Width::W32, 0).unwrap(), 0);
        assert_eq!(cpu.read_register(Width::W32, 1).unwrap(), 1);
        assert!(cpu.flags().carry);
    }

    #[test]
    fn imul_is_signed() {
        let cpu = CpuCore::default();
        cpu.write_register(Width::W16, 0, 6).unwrap();
        run_program(&cpu, &["IMUL .16bit <$(-2)>"]);
        assert_eq!(cpu.read_register(Width::W16, 0).unwrap(), 0xFFF4);
        assert_eq!(cpu.read_register(Width::W16, 1).unwrap(), 0xFFFF);
    }

    #[test]
    fn div_leaves_quotient_and_remainder() {
        let cpu = CpuCore::default();
        cpu.write_register(Width::W64, 0, 65_536).unwrap();
        run_program(&cpu, &["DIV .64bit <$(3)>"]);
        assert_eq!(cpu.read_register(Width::W64, 0).unwrap(), 21_845);
        assert_eq!(cpu.read_register(Width::W64, 1).unwrap(), 1);
    }

    #[test]
    fn idiv_divides_signed_values() {
        let cpu = CpuCore::default();
        cpu.write_register(Width::W64, 0, (-65_536i64) as u64).unwrap();
        cpu.write_register(Width::W64, 1, (-2i64) as u64).unwrap();
        run_program(&cpu, &["IDIV .64bit <%FER1>"]);
        assert_eq!(cpu.read_register(Width::W64, 0).unwrap(), 32_768);
        assert_eq!(cpu.read_register(Width::W64, 1).unwrap(), 0);
    }

    #[test]
    fn divide_by_zero_raises_its_interrupt() {
        let cpu = CpuCore::default();
        cpu.load_firmware(&assemble(&["DIV .64bit <$(0)>"])).unwrap();
        let outcome = cpu.step().unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Interrupted {
                code: INT_DIVISION_BY_ZERO
            }
        );
        assert_eq!(
            cpu.instruction_pointer(),
            INTERRUPT_VECTOR_BASE + 8 * INT_DIVISION_BY_ZERO
        );
    }

    #[test]
    fn shifts_and_rotates_match_reference_values() {
        let cpu = CpuCore::default();
        run_program(
            &cpu,
            &[
                "MOV .8bit <%R0>, <$(0x34)>",
                "SHL .8bit <%R0>, <$(4)>",
                "SHR .8bit <%R0>, <$(6)>",
                "MOV .8bit <%R1>, <$(0xF4)>",
                "ROL .8bit <%R1>, <$(2)>",
                "ROR .8bit <%R1>, <$(1)>",
            ],
        );
        assert_eq!(cpu.read_register(Width::W8, 0).unwrap(), 0x01);
        assert_eq!(cpu.read_register(Width::W8, 1).unwrap(), 0xE9);
    }

    #[test]
    fn rotate_through_carry_moves_the_top_bit_out() {
        let cpu = CpuCore::default();
        run_program(
            &cpu,
            &[
                "MOV .8bit <%R0>, <$(0x8F)>",
                "ADD .8bit <%R1>, <$(0)>",
                "RCL .8bit <%R0>, <$(1)>",
                "RCR .8bit <%R0>, <$(1)>",
            ],
        );
        assert_eq!(cpu.read_register(Width::W8, 0).unwrap(), 0x8F);
    }

    #[test]
    fn xchg_swaps_cells() {
        let cpu = CpuCore::default();
        cpu.write_register(Width::W64, 0, 1).unwrap();
        cpu.write_register(Width::W64, 1, 2).unwrap();
        run_program(&cpu, &["XCHG .64bit <%FER0>, <%FER1>"]);
        assert_eq!(cpu.read_register(Width::W64, 0).unwrap(), 2);
        assert_eq!(cpu.read_register(Width::W64, 1).unwrap(), 1);
    }

    #[test]
    fn fadd_accumulates_f64_bit_patterns() {
        let cpu = CpuCore::default();
        cpu.write_xmm(2, u128::from(2.5f64.to_bits())).unwrap();
        let mut image = assemble(&["FADD"]);
        // FADD <%XMM2>, <$(bits of 0.25)>
        image.extend_from_slice(&[0x01, 0xFC, 0x02, 0x02, 0x00]);
        image.extend_from_slice(&0.25f64.to_bits().to_le_bytes());
        image.extend_from_slice(&assemble(&["HLT"]));
        cpu.load_firmware(&image).unwrap();
        cpu.run();
        #[allow(clippy::cast_possible_truncation)]
        let low = cpu.read_xmm(2).unwrap() as u64;
        assert!((f64::from_bits(low) - 2.75).abs() < f64::EPSILON);
    }

    #[test]
    fn fdiv_divides_the_xmm0_accumulator() {
        let cpu = CpuCore::default();
        cpu.write_xmm(0, u128::from(10.0f64.to_bits())).unwrap();
        let mut image = Vec::new();
        image.extend_from_slice(&0x31u64.to_le_bytes());
        image.extend_from_slice(&[0x02, 0x00]);
        image.extend_from_slice(&4.0f64.to_bits().to_le_bytes());
        image.extend_from_slice(&assemble(&["HLT"]));
        cpu.load_firmware(&image).unwrap();
        cpu.run();
        #[allow(clippy::cast_possible_truncation)]
        let low = cpu.read_xmm(0).unwrap() as u64;
        assert!((f64::from_bits(low) - 2.5).abs() < f64::EPSILON);
    }
}
