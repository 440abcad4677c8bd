//! Instruction line parser.
//!
//! Converts one source line of the form
//! `MNEMONIC[.WIDTH] <operand>[, <operand>...]` into a structured
//! [`ParsedInstruction`] validated against the core opcode schema.
//! Mnemonics are case-insensitive; `;` starts a comment.

use emulator_core::{spec_for_mnemonic, InstructionSpec, Width};
use thiserror::Error;

/// Source location for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    /// 1-indexed line number.
    pub line: usize,
    /// 1-indexed column number.
    pub column: usize,
}

/// Parse error with source location.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}")]
pub struct ParseError {
    /// Location of the error.
    pub location: SourceLocation,
    /// Kind of parse error.
    pub kind: ParseErrorKind,
}

/// Classification of parse errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    /// Mnemonic not present in the instruction table.
    #[error("unknown mnemonic: {0}")]
    UnknownMnemonic(String),
    /// Width-prefixed instruction written without a `.Nbit` suffix.
    #[error("{0} requires a width suffix")]
    MissingWidthSuffix(String),
    /// Width suffix on an instruction that carries no width.
    #[error("{0} does not take a width suffix")]
    UnexpectedWidthSuffix(String),
    /// Suffix that is not one of `.8bit/.16bit/.32bit/.64bit`.
    #[error("unknown width suffix: {0}")]
    UnknownWidthSuffix(String),
    /// Operand list length does not match the opcode schema.
    #[error("{mnemonic} takes {expected} operand(s), found {found}")]
    WrongOperandCount {
        /// The instruction mnemonic.
        mnemonic: String,
        /// Operand count from the schema.
        expected: u8,
        /// Operands found on the line.
        found: usize,
    },
}

/// A parsed source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// Empty or comment-only line.
    Blank,
    /// Instruction line.
    Instruction(ParsedInstruction),
}

/// A parsed instruction with raw operand texts.
///
/// Operand texts are handed to the core codec during encoding; the parser
/// only splits and counts them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInstruction {
    /// Schema entry resolved from the mnemonic.
    pub spec: &'static InstructionSpec,
    /// Width from the `.Nbit` suffix, when the schema carries one.
    pub width: Option<Width>,
    /// Raw operand texts in source order.
    pub operands: Vec<String>,
    /// 1-indexed source line.
    pub line: usize,
}

/// Parses one source line.
///
/// # Errors
///
/// Returns a [`ParseError`] for unknown mnemonics, width-suffix misuse, or
/// a wrong operand count. Operand-text errors surface later, from the
/// codec, during encoding.
pub fn parse_line(text: &str, line_number: usize) -> Result<ParsedLine, ParseError> {
    let stripped = strip_comment(text);
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        return Ok(ParsedLine::Blank);
    }

    let at = |column: usize| SourceLocation {
        line: line_number,
        column,
    };
    let column = text.len() - text.trim_start().len() + 1;

    let (mnemonic, rest) = trimmed
        .split_once(char::is_whitespace)
        .unwrap_or((trimmed, ""));

    let spec = spec_for_mnemonic(mnemonic).ok_or_else(|| ParseError {
        location: at(column),
        kind: ParseErrorKind::UnknownMnemonic(mnemonic.to_owned()),
    })?;

    let mut rest = rest.trim_start();
    let width = if rest.starts_with('.') {
        let (suffix, tail) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        if !spec.width_prefixed {
            return Err(ParseError {
                location: at(column),
                kind: ParseErrorKind::UnexpectedWidthSuffix(spec.mnemonic.to_owned()),
            });
        }
        let width = Width::from_suffix(suffix).ok_or_else(|| ParseError {
            location: at(column),
            kind: ParseErrorKind::UnknownWidthSuffix(suffix.to_owned()),
        })?;
        rest = tail.trim_start();
        Some(width)
    } else {
        if spec.width_prefixed {
            return Err(ParseError {
                location: at(column),
                kind: ParseErrorKind::MissingWidthSuffix(spec.mnemonic.to_owned()),
            });
        }
        None
    };

    let operands = split_operands(rest);
    if operands.len() != usize::from(spec.operand_count) {
        return Err(ParseError {
            location: at(column),
            kind: ParseErrorKind::WrongOperandCount {
                mnemonic: spec.mnemonic.to_owned(),
                expected: spec.operand_count,
                found: operands.len(),
            },
        });
    }

    Ok(ParsedLine::Instruction(ParsedInstruction {
        spec,
        width,
        operands,
        line: line_number,
    }))
}

fn strip_comment(line: &str) -> &str {
    line.find(';').map_or(line, |position| &line[..position])
}

/// Splits an operand list on commas outside `<...>` brackets, so memory
/// operands keep their internal commas.
fn split_operands(text: &str) -> Vec<String> {
    let mut operands = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (position, character) in text.char_indices() {
        match character {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                operands.push(text[start..position].trim().to_owned());
                start = position + 1;
            }
            _ => {}
        }
    }
    let last = text[start..].trim();
    if !last.is_empty() {
        operands.push(last.to_owned());
    }
    operands.retain(|operand| !operand.is_empty());
    operands
}
