//! Core emulator crate for the Sysdarft virtual machine.

/// Wire-format constants and the opcode schema table.
pub mod encoding;
pub use encoding::{
    is_floating_point, spec_for_code, spec_for_mnemonic, InstructionSpec, MemoryRatio, Opcode,
    Width, CONSTANT_PREFIX, CONTROL_REGISTER_BASE, CONTROL_REGISTER_NAMES,
    FULLY_EXTENDED_REGISTER_COUNT, INSTRUCTION_TABLE, MEMORY_PREFIX, REGISTER_PREFIX,
    R_CODE_BASE, R_DATA_BASE, R_DATA_POINTER, R_EXTENDED_SEGMENT_BASE,
    R_EXTENDED_SEGMENT_POINTER, R_STACK_BASE, R_STACK_POINTER, SMALL_REGISTER_COUNT,
    XMM_REGISTER_COUNT,
};

/// Error taxonomy for codec, decoder, and executor faults.
pub mod fault;
pub use fault::CoreError;

/// Embedded constant-expression evaluator.
pub mod expr;
pub use expr::ConstantValue;

/// Operand codec: text grammar, wire bytes, canonical rendering.
pub mod operand;
pub use operand::{ByteSource, Operand, SliceReader};

/// Architectural CPU state model primitives.
pub mod state;
pub use state::{RegisterFile, StatusFlags};

/// Flat byte-addressed main memory.
pub mod memory;
pub use memory::{MainMemory, BIOS_START, MAIN_MEMORY_BYTES};

/// Software interrupt vector table and halt diagnostics.
pub mod interrupt;
pub use interrupt::{
    FaultDiagnostic, VectorTable, INTERRUPT_VECTOR_BASE, INTERRUPT_VECTOR_ENTRIES,
    INTERRUPT_VECTOR_STRIDE, INT_DIVISION_BY_ZERO, INT_ILLEGAL_INSTRUCTION,
};

/// Host-facing configuration, step outcomes, and trace hooks.
pub mod api;
pub use api::{
    CoreConfig, HaltCause, NullTraceSink, RunOutcome, StepOutcome, TraceEvent, TraceSink,
    DEFAULT_STACK_POINTER,
};

/// The CPU context owning registers, memory, and the vector table.
pub mod cpu;
pub use cpu::CpuCore;

/// Streaming instruction decoder.
pub mod decoder;
pub use decoder::{decode_from, decode_instruction, validate_operand_widths, DecodedInstruction};

/// Operand resolution to readable/writable cells.
pub mod resolver;
pub use resolver::{resolve, OperandCell};

/// Instruction execution and interrupt dispatch.
pub mod executor;
pub use executor::soft_interruption_ready;

/// Instruction-level disassembly.
pub mod disasm;
pub use disasm::{disassemble, disassemble_to_text, DisassembledInstruction};

/// Host collaborator surfaces: console and module loader.
pub mod host;
pub use host::{
    Console, CursorPosition, LibraryLoadError, ModuleLoader, ModuleResolutionError, VideoBuffer,
    CONSOLE_HEIGHT, CONSOLE_WIDTH,
};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
