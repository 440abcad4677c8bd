//! Instruction-level disassembly.
//!
//! Walks a byte slice through the codec's reverse path, producing the same
//! canonical text literals the live decoder attaches to instructions.

use crate::decoder::{self, DecodedInstruction};
use crate::fault::CoreError;
use crate::operand::SliceReader;

/// One disassembled instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisassembledInstruction {
    /// Byte offset of the instruction within the input.
    pub offset: usize,
    /// Length of the instruction in bytes.
    pub length: usize,
    /// The decoded record.
    pub instruction: DecodedInstruction,
}

/// Disassembles a single instruction at the start of `reader`.
///
/// # Errors
///
/// Returns [`CoreError::IllegalInstruction`] when the bytes do not form a
/// valid instruction.
pub fn disassemble_one(reader: &mut SliceReader<'_>) -> Result<DecodedInstruction, CoreError> {
    decoder::decode_from(reader)
}

/// Disassembles an entire byte stream into instruction records.
///
/// # Errors
///
/// Returns [`CoreError::IllegalInstruction`] at the first offset whose
/// bytes do not form a valid instruction.
pub fn disassemble(bytes: &[u8]) -> Result<Vec<DisassembledInstruction>, CoreError> {
    let mut reader = SliceReader::new(bytes);
    let mut rows = Vec::new();
    while !reader.is_empty() {
        let offset = reader.position();
        let instruction = disassemble_one(&mut reader)?;
        rows.push(DisassembledInstruction {
            offset,
            length: reader.position() - offset,
            instruction,
        });
    }
    Ok(rows)
}

/// Disassembles a byte stream to text, one canonical literal per line.
///
/// # Errors
///
/// Returns [`CoreError::IllegalInstruction`] when any instruction fails to
/// decode.
pub fn disassemble_to_text(bytes: &[u8]) -> Result<String, CoreError> {
    let rows = disassemble(bytes)?;
    let mut text = String::new();
    for row in rows {
        text.push_str(&row.instruction.literal);
        text.push('\n');
    }
    Ok(text)
}
