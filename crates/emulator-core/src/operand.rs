//! Operand codec: text grammar, wire encoding, and canonical rendering.
//!
//! An operand is exactly one of three variants. The text grammar is
//!
//! ```text
//! operand := "<" body ">"
//! body    := reg | const | mem
//! reg     := "%" ("R"|"EXR"|"HER"|"FER"|"XMM") digit+
//!          | "%" ("SB"|"SP"|"CB"|"DB"|"DP"|"EB"|"EP")
//! const   := "$(" expr ")"
//! mem     := "*" ratio "&" width "(" sub "," sub "," sub ")"
//! ```
//!
//! and the wire format is
//!
//! ```text
//! register := 01 WIDTH IDX
//! constant := 02 SIGN VAL(8 bytes, little-endian)
//! memory   := 03 WIDTH RATIO P1 P2 P3
//! ```
//!
//! where `P1..P3` are full register or constant records. The codec is
//! bijective between canonical text and wire bytes; decoding validates
//! every tag so that re-encoding a decoded stream reproduces it exactly.

use crate::encoding::{
    MemoryRatio, Width, CONSTANT_PREFIX, CONTROL_REGISTER_BASE, CONTROL_REGISTER_NAMES,
    FULLY_EXTENDED_REGISTER_COUNT, MEMORY_PREFIX, REGISTER_PREFIX, R_EXTENDED_SEGMENT_POINTER,
    SMALL_REGISTER_COUNT, XMM_REGISTER_COUNT,
};
use crate::expr;
use crate::fault::CoreError;

/// A decoded operand record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// A register reference: class is implied by the width tag.
    Register {
        /// Register class width.
        width: Width,
        /// Zero-based index within the class; indices at or above
        /// [`CONTROL_REGISTER_BASE`] name control registers in the 64-bit
        /// class.
        index: u8,
    },
    /// A 64-bit immediate with recorded signedness.
    Constant {
        /// True when the source expression produced a negative value.
        signed: bool,
        /// Two's-complement bit pattern.
        value: u64,
    },
    /// A memory reference `(base + offset1 + offset2) * ratio`.
    Memory {
        /// Access width of the referenced cell.
        width: Width,
        /// Address scaling ratio.
        ratio: MemoryRatio,
        /// Base component; register (64-bit only) or constant.
        base: Box<Operand>,
        /// First offset component.
        offset1: Box<Operand>,
        /// Second offset component.
        offset2: Box<Operand>,
    },
}

/// Pull-based byte stream consumed by the wire decoder.
///
/// Implemented by the in-memory [`SliceReader`] and by the CPU's
/// instruction-pointer stream, so the same decoder drives the disassembler
/// and the live instruction decoder.
pub trait ByteSource {
    /// Removes and returns the next byte.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalInstruction`] when the stream is
    /// exhausted.
    fn next_u8(&mut self) -> Result<u8, CoreError>;

    /// Removes the next eight bytes as a little-endian 64-bit value.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalInstruction`] when the stream is
    /// exhausted.
    fn next_u64(&mut self) -> Result<u64, CoreError> {
        let mut bytes = [0u8; 8];
        for byte in &mut bytes {
            *byte = self.next_u8()?;
        }
        Ok(u64::from_le_bytes(bytes))
    }
}

/// [`ByteSource`] over a byte slice.
#[derive(Debug)]
pub struct SliceReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> SliceReader<'a> {
    /// Creates a reader at the start of `bytes`.
    #[must_use]
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    /// Number of bytes consumed so far.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// True when every byte has been consumed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.position >= self.bytes.len()
    }
}

impl ByteSource for SliceReader<'_> {
    fn next_u8(&mut self) -> Result<u8, CoreError> {
        let byte = self.bytes.get(self.position).copied().ok_or_else(|| {
            CoreError::IllegalInstruction("unexpected end of instruction stream".into())
        })?;
        self.position += 1;
        Ok(byte)
    }
}

/// Parses operand text into a record.
///
/// Whitespace is insignificant, matching is case-insensitive, and the outer
/// `<...>` is optional.
///
/// # Errors
///
/// Returns [`CoreError::OperandSyntax`] when the text matches none of the
/// three grammars and [`CoreError::OperandSemantic`] when a memory
/// sub-operand is not a 64-bit register or constant.
pub fn parse(text: &str) -> Result<Operand, CoreError> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();

    let body = cleaned
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
        .unwrap_or(&cleaned);

    parse_body(body, text)
}

fn parse_body(body: &str, original: &str) -> Result<Operand, CoreError> {
    if let Some(name) = body.strip_prefix('%') {
        return parse_register(name, original);
    }
    if let Some(inner) = body.strip_prefix("$(").and_then(|rest| rest.strip_suffix(')')) {
        let constant = expr::evaluate(inner)?;
        return Ok(Operand::Constant {
            signed: constant.signed,
            value: constant.bits,
        });
    }
    if body.starts_with('*') {
        return parse_memory(body, original);
    }
    Err(CoreError::OperandSyntax(original.trim().to_owned()))
}

fn parse_register(name: &str, original: &str) -> Result<Operand, CoreError> {
    for (control, index) in CONTROL_REGISTER_NAMES {
        if name == *control {
            return Ok(Operand::Register {
                width: Width::W64,
                index: *index,
            });
        }
    }

    // Longest prefix first so "R" does not shadow the other classes.
    let classes: [(&str, Width, u8); 5] = [
        ("XMM", Width::Fp128, XMM_REGISTER_COUNT),
        ("EXR", Width::W16, SMALL_REGISTER_COUNT),
        ("HER", Width::W32, SMALL_REGISTER_COUNT),
        ("FER", Width::W64, FULLY_EXTENDED_REGISTER_COUNT),
        ("R", Width::W8, SMALL_REGISTER_COUNT),
    ];

    for (prefix, width, count) in classes {
        if let Some(digits) = name.strip_prefix(prefix) {
            let index: u8 = digits
                .parse()
                .map_err(|_| CoreError::OperandSyntax(original.trim().to_owned()))?;
            if index >= count {
                return Err(CoreError::OperandSyntax(original.trim().to_owned()));
            }
            return Ok(Operand::Register { width, index });
        }
    }

    Err(CoreError::OperandSyntax(original.trim().to_owned()))
}

fn parse_memory(body: &str, original: &str) -> Result<Operand, CoreError> {
    let syntax = || CoreError::OperandSyntax(original.trim().to_owned());

    let rest = body.strip_prefix('*').ok_or_else(syntax)?;
    let ampersand = rest.find('&').ok_or_else(syntax)?;
    let ratio_value: u64 = rest[..ampersand].parse().map_err(|_| syntax())?;
    let ratio = MemoryRatio::from_multiplier(ratio_value).ok_or_else(syntax)?;

    let rest = &rest[ampersand + 1..];
    let open = rest.find('(').ok_or_else(syntax)?;
    let width = match &rest[..open] {
        "8" => Width::W8,
        "16" => Width::W16,
        "32" => Width::W32,
        "64" => Width::W64,
        _ => return Err(syntax()),
    };

    let inner = rest[open + 1..].strip_suffix(')').ok_or_else(syntax)?;
    let parts = split_components(inner);
    let [base, offset1, offset2]: [&str; 3] = parts.try_into().map_err(|_| syntax())?;

    Ok(Operand::Memory {
        width,
        ratio,
        base: Box::new(parse_component(base, original)?),
        offset1: Box::new(parse_component(offset1, original)?),
        offset2: Box::new(parse_component(offset2, original)?),
    })
}

fn split_components(inner: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (position, character) in inner.char_indices() {
        match character {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&inner[start..position]);
                start = position + 1;
            }
            _ => {}
        }
    }
    parts.push(&inner[start..]);
    parts
}

fn parse_component(component: &str, original: &str) -> Result<Operand, CoreError> {
    let operand = parse_body(component, original)?;
    check_component(&operand)?;
    Ok(operand)
}

fn check_component(operand: &Operand) -> Result<(), CoreError> {
    match operand {
        Operand::Register {
            width: Width::W64, ..
        }
        | Operand::Constant { .. } => Ok(()),
        Operand::Register { .. } => Err(CoreError::OperandSemantic(format!(
            "memory component must be a 64-bit register or constant: {}",
            render_body(operand)
        ))),
        Operand::Memory { .. } => Err(CoreError::OperandSemantic(
            "memory component cannot itself be a memory operand".into(),
        )),
    }
}

/// Serializes an operand record to wire bytes.
pub fn encode(operand: &Operand, buffer: &mut Vec<u8>) {
    match operand {
        Operand::Register { width, index } => {
            buffer.push(REGISTER_PREFIX);
            buffer.push(width.tag());
            buffer.push(*index);
        }
        Operand::Constant { signed, value } => {
            buffer.push(CONSTANT_PREFIX);
            buffer.push(u8::from(*signed));
            buffer.extend_from_slice(&value.to_le_bytes());
        }
        Operand::Memory {
            width,
            ratio,
            base,
            offset1,
            offset2,
        } => {
            buffer.push(MEMORY_PREFIX);
            buffer.push(width.tag());
            buffer.push(ratio.bcd());
            encode(base, buffer);
            encode(offset1, buffer);
            encode(offset2, buffer);
        }
    }
}

/// Deserializes one operand record from a byte source.
///
/// Every tag byte is validated so that exactly the streams this codec can
/// produce are accepted.
///
/// # Errors
///
/// Returns [`CoreError::IllegalInstruction`] for unknown prefixes, width
/// tags, ratios, out-of-range register indices, a signed constant with a
/// non-negative payload, or a truncated stream.
pub fn decode(source: &mut dyn ByteSource) -> Result<Operand, CoreError> {
    let prefix = source.next_u8()?;
    match prefix {
        REGISTER_PREFIX => decode_register(source),
        CONSTANT_PREFIX => decode_constant(source),
        MEMORY_PREFIX => decode_memory(source),
        _ => Err(CoreError::IllegalInstruction(format!(
            "unknown operand prefix {prefix:#04X}"
        ))),
    }
}

fn decode_register(source: &mut dyn ByteSource) -> Result<Operand, CoreError> {
    let tag = source.next_u8()?;
    let width = Width::from_tag(tag).ok_or_else(|| {
        CoreError::IllegalInstruction(format!("unknown register width tag {tag:#04X}"))
    })?;
    let index = source.next_u8()?;

    let legal = match width {
        Width::W8 | Width::W16 | Width::W32 => index < SMALL_REGISTER_COUNT,
        Width::W64 => {
            index < FULLY_EXTENDED_REGISTER_COUNT
                || (CONTROL_REGISTER_BASE..=R_EXTENDED_SEGMENT_POINTER).contains(&index)
        }
        Width::Fp128 => index < XMM_REGISTER_COUNT,
    };
    if !legal {
        return Err(CoreError::IllegalInstruction(format!(
            "register index {index:#04X} out of range for width tag {tag:#04X}"
        )));
    }

    Ok(Operand::Register { width, index })
}

fn decode_constant(source: &mut dyn ByteSource) -> Result<Operand, CoreError> {
    let sign = source.next_u8()?;
    let value = source.next_u64()?;
    let signed = match sign {
        0x00 => false,
        0x01 => true,
        _ => {
            return Err(CoreError::IllegalInstruction(format!(
                "unknown constant sign byte {sign:#04X}"
            )))
        }
    };
    #[allow(clippy::cast_possible_wrap)]
    if signed && (value as i64) >= 0 {
        return Err(CoreError::IllegalInstruction(
            "signed constant with non-negative payload".into(),
        ));
    }
    Ok(Operand::Constant { signed, value })
}

fn decode_memory(source: &mut dyn ByteSource) -> Result<Operand, CoreError> {
    let tag = source.next_u8()?;
    let width = Width::from_tag(tag)
        .filter(|width| width.is_integer())
        .ok_or_else(|| {
            CoreError::IllegalInstruction(format!("unknown memory access width tag {tag:#04X}"))
        })?;

    let ratio_byte = source.next_u8()?;
    let ratio = MemoryRatio::from_bcd(ratio_byte).ok_or_else(|| {
        CoreError::IllegalInstruction(format!("unknown memory ratio {ratio_byte:#04X}"))
    })?;

    let component = |source: &mut dyn ByteSource| -> Result<Operand, CoreError> {
        let prefix = source.next_u8()?;
        let operand = match prefix {
            REGISTER_PREFIX => decode_register(source)?,
            CONSTANT_PREFIX => decode_constant(source)?,
            _ => {
                return Err(CoreError::IllegalInstruction(format!(
                    "memory component prefix {prefix:#04X} is not a register or constant"
                )))
            }
        };
        check_component(&operand).map_err(|_| {
            CoreError::IllegalInstruction(
                "memory component register must be 64-bit wide".into(),
            )
        })?;
        Ok(operand)
    };

    let base = component(source)?;
    let offset1 = component(source)?;
    let offset2 = component(source)?;

    Ok(Operand::Memory {
        width,
        ratio,
        base: Box::new(base),
        offset1: Box::new(offset1),
        offset2: Box::new(offset2),
    })
}

/// Renders the canonical text form, wrapped in `<...>`.
///
/// Canonical form is upper-case and space-free; unsigned constants render in
/// hexadecimal, signed constants in decimal with a leading `-`.
#[must_use]
pub fn render(operand: &Operand) -> String {
    format!("<{}>", render_body(operand))
}

fn render_body(operand: &Operand) -> String {
    match operand {
        Operand::Register { width, index } => format!("%{}", register_name(*width, *index)),
        Operand::Constant { signed, value } => {
            if *signed {
                #[allow(clippy::cast_possible_wrap)]
                let signed_value = *value as i64;
                format!("$({signed_value})")
            } else {
                format!("$({value:#X})")
            }
        }
        Operand::Memory {
            width,
            ratio,
            base,
            offset1,
            offset2,
        } => format!(
            "*{}&{}({},{},{})",
            ratio.multiplier(),
            width.bits(),
            render_body(base),
            render_body(offset1),
            render_body(offset2)
        ),
    }
}

fn register_name(width: Width, index: u8) -> String {
    if width == Width::W64 && index >= CONTROL_REGISTER_BASE {
        for (name, control_index) in CONTROL_REGISTER_NAMES {
            if *control_index == index {
                return (*name).to_owned();
            }
        }
    }
    let prefix = match width {
        Width::W8 => "R",
        Width::W16 => "EXR",
        Width::W32 => "HER",
        Width::W64 => "FER",
        Width::Fp128 => "XMM",
    };
    format!("{prefix}{index}")
}
