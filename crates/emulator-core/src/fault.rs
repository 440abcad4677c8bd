use thiserror::Error;

/// Synchronous error taxonomy raised by the operand codec, decoder, and
/// executor.
///
/// Decoder and executor callers convert these into the illegal-instruction
/// soft interrupt; they never escape as host-process failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Operand text does not match any of the three operand grammars.
    #[error("cannot parse operand expression: {0}")]
    OperandSyntax(String),
    /// Operand is well-formed but not usable in this position.
    #[error("operand not usable here: {0}")]
    OperandSemantic(String),
    /// Unknown opcode, malformed wire bytes, width mismatch, write to a
    /// constant, or out-of-range register index.
    #[error("illegal instruction: {0}")]
    IllegalInstruction(String),
}
