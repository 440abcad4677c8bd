//! Whole-source assembly driver.
//!
//! Assembles free-form instruction text into a flat binary image,
//! collecting every error with its location instead of stopping at the
//! first.

use std::path::Path;

use crate::encoder::encode_line;
use crate::errors::{AssemblerError, AssemblerErrorKind, ErrorCollection};
use crate::parser::parse_line;

/// Assembles a complete source string.
///
/// # Errors
///
/// Returns every parse and encode error found, with line locations.
pub fn assemble_source(source: &str) -> Result<Vec<u8>, ErrorCollection> {
    let mut image = Vec::new();
    let mut errors = ErrorCollection::new();

    for (index, line) in source.lines().enumerate() {
        let line_number = index + 1;
        match parse_line(line, line_number) {
            Ok(parsed) => match encode_line(&parsed) {
                Ok(bytes) => image.extend_from_slice(&bytes),
                Err(error) => errors.push(error.into()),
            },
            Err(error) => errors.push(error.into()),
        }
    }

    if errors.is_empty() {
        Ok(image)
    } else {
        Err(errors)
    }
}

/// Assembles a single instruction line.
///
/// # Errors
///
/// Returns the parse or encode error for the line.
pub fn assemble_line(line: &str) -> Result<Vec<u8>, AssemblerError> {
    let parsed = parse_line(line, 1).map_err(AssemblerError::from)?;
    encode_line(&parsed).map_err(AssemblerError::from)
}

/// Reads and assembles a source file.
///
/// # Errors
///
/// Returns the I/O error or every assembly error, each tagged with the
/// file path.
pub fn assemble_file(path: &Path) -> Result<Vec<u8>, ErrorCollection> {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(error) => {
            let mut errors = ErrorCollection::new();
            errors.push(AssemblerError::new(AssemblerErrorKind::Io(format!(
                "{}: {error}",
                path.display()
            ))));
            return Err(errors);
        }
    };

    assemble_source(&source)
        .map_err(|errors| errors.iter().cloned().map(|e| e.with_file(path)).collect())
}
