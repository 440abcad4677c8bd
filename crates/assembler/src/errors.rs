//! Structured error reporting for assembler phases.
//!
//! Errors format to stderr in the standard style:
//! ```text
//! file.s:10:5: error: message
//! ```
//! and are collected across the whole source so one run reports every
//! problem at once.

use std::fmt;
use std::path::PathBuf;

use crate::encoder::EncodeError;
use crate::parser::ParseError;

/// A source location for error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLoc {
    /// File path; empty for in-memory sources.
    pub file: PathBuf,
    /// 1-indexed line number.
    pub line: usize,
    /// 1-indexed column number (1 if unknown).
    pub column: usize,
}

impl SourceLoc {
    /// Creates a new source location.
    #[must_use]
    pub const fn new(file: PathBuf, line: usize, column: usize) -> Self {
        Self { file, line, column }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

/// A unified assembler error with source context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblerError {
    /// The kind of error.
    pub kind: AssemblerErrorKind,
    /// Source location if available.
    pub location: Option<SourceLoc>,
}

impl AssemblerError {
    /// Creates a new assembler error without a location.
    #[must_use]
    pub const fn new(kind: AssemblerErrorKind) -> Self {
        Self {
            kind,
            location: None,
        }
    }

    /// Adds a source location to the error.
    #[must_use]
    pub fn with_location(mut self, location: SourceLoc) -> Self {
        self.location = Some(location);
        self
    }

    /// Attaches a file path to an existing location.
    #[must_use]
    pub fn with_file(mut self, file: &std::path::Path) -> Self {
        if let Some(location) = &mut self.location {
            location.file = file.to_path_buf();
        }
        self
    }

    /// Formats the error for stderr output.
    #[must_use]
    pub fn format_for_stderr(&self) -> String {
        self.location.as_ref().map_or_else(
            || format!("error: {}", self.kind),
            |location| format!("{location}: error: {}", self.kind),
        )
    }
}

impl fmt::Display for AssemblerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{location}: {}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for AssemblerError {}

impl From<ParseError> for AssemblerError {
    fn from(error: ParseError) -> Self {
        let location = SourceLoc::new(
            PathBuf::new(),
            error.location.line,
            error.location.column,
        );
        Self {
            kind: AssemblerErrorKind::Parse(error),
            location: Some(location),
        }
    }
}

impl From<EncodeError> for AssemblerError {
    fn from(error: EncodeError) -> Self {
        let location = SourceLoc::new(PathBuf::new(), error.line, 1);
        Self {
            kind: AssemblerErrorKind::Encode(error),
            location: Some(location),
        }
    }
}

/// Classification of assembler errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblerErrorKind {
    /// Parse error during line parsing.
    Parse(ParseError),
    /// Operand encoding error from the core codec.
    Encode(EncodeError),
    /// I/O error reading the source file.
    Io(String),
}

impl fmt::Display for AssemblerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(error) => write!(f, "{error}"),
            Self::Encode(error) => write!(f, "{error}"),
            Self::Io(message) => write!(f, "I/O error: {message}"),
        }
    }
}

/// A collection of assembler errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorCollection {
    errors: Vec<AssemblerError>,
}

impl ErrorCollection {
    /// Creates an empty collection.
    #[must_use]
    pub const fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Adds an error.
    pub fn push(&mut self, error: AssemblerError) {
        self.errors.push(error);
    }

    /// True when no errors were collected.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of collected errors.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.errors.len()
    }

    /// Iterates the collected errors.
    pub fn iter(&self) -> impl Iterator<Item = &AssemblerError> {
        self.errors.iter()
    }

    /// Formats every error for stderr output, one per line.
    #[must_use]
    pub fn format_for_stderr(&self) -> String {
        self.errors
            .iter()
            .map(AssemblerError::format_for_stderr)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for ErrorCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, error) in self.errors.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorCollection {}

impl FromIterator<AssemblerError> for ErrorCollection {
    fn from_iter<T: IntoIterator<Item = AssemblerError>>(iter: T) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}
