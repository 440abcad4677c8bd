//! Instruction encoding: parsed lines to wire bytes.
//!
//! The byte layout is the 64-bit little-endian opcode, the width-tag byte
//! when the schema carries one, then each operand record through the core
//! codec.

use emulator_core::{operand, validate_operand_widths, CoreError};
use thiserror::Error;

use crate::parser::{ParsedInstruction, ParsedLine};

/// Encoding error carrying the source line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}")]
pub struct EncodeError {
    /// 1-indexed source line.
    pub line: usize,
    /// Underlying codec error.
    pub kind: CoreError,
}

/// Encodes one instruction to bytes.
///
/// # Errors
///
/// Returns an [`EncodeError`] when an operand text fails the codec grammar
/// or the operand widths disagree with the instruction width.
pub fn encode_instruction(instruction: &ParsedInstruction) -> Result<Vec<u8>, EncodeError> {
    let fail = |kind: CoreError| EncodeError {
        line: instruction.line,
        kind,
    };

    let mut records = Vec::with_capacity(instruction.operands.len());
    for text in &instruction.operands {
        records.push(operand::parse(text).map_err(fail)?);
    }
    validate_operand_widths(instruction.spec, instruction.width, &records).map_err(fail)?;

    let mut bytes = instruction.spec.code.to_le_bytes().to_vec();
    if let Some(width) = instruction.width {
        bytes.push(width.tag());
    }
    for record in &records {
        operand::encode(record, &mut bytes);
    }
    Ok(bytes)
}

/// Encodes a parsed line to bytes; blank lines produce none.
///
/// # Errors
///
/// Returns an [`EncodeError`] when instruction encoding fails.
pub fn encode_line(parsed: &ParsedLine) -> Result<Vec<u8>, EncodeError> {
    match parsed {
        ParsedLine::Blank => Ok(Vec::new()),
        ParsedLine::Instruction(instruction) => encode_instruction(instruction),
    }
}
