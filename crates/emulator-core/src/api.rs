//! Host-facing configuration, step outcomes, and trace hooks.

use crate::interrupt::FaultDiagnostic;
use crate::memory::MAIN_MEMORY_BYTES;

/// Default initial stack pointer: the stack grows down from just below the
/// interrupt vector table.
pub const DEFAULT_STACK_POINTER: u64 = 0xA0000;

/// Immutable configuration for a CPU instance.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CoreConfig {
    /// Size of the flat address space in bytes.
    pub memory_bytes: usize,
    /// Initial `SP` value loaded at VM initialization.
    pub initial_stack_pointer: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            memory_bytes: MAIN_MEMORY_BYTES,
            initial_stack_pointer: DEFAULT_STACK_POINTER,
        }
    }
}

/// Outcome of one instruction step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The instruction retired normally.
    Retired,
    /// `HLT` retired; the run flag has been cleared.
    Halted,
    /// A soft interrupt was dispatched and the instruction pointer now
    /// addresses the vector entry.
    Interrupted {
        /// Interrupt code that was dispatched.
        code: u64,
    },
}

/// Why a `run` call returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltCause {
    /// `HLT` retired.
    Halt,
    /// The host cleared the run flag.
    Stopped,
    /// An interrupt could not be dispatched; the VM carries a diagnostic.
    Fault(FaultDiagnostic),
}

/// Aggregated outcome of a `run` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Number of instructions that retired (including the final `HLT`).
    pub steps: u64,
    /// Why the loop exited.
    pub cause: HaltCause,
}

/// Trace events emitted at step boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent<'a> {
    /// An instruction retired.
    Retired {
        /// Instruction pointer of the retired instruction.
        instruction_pointer: u64,
        /// Canonical text literal reconstructed during decode.
        literal: &'a str,
    },
    /// A soft interrupt was dispatched.
    InterruptRaised {
        /// Dispatched interrupt code.
        code: u64,
        /// Instruction pointer of the faulting instruction.
        instruction_pointer: u64,
    },
    /// The core halted.
    Halted {
        /// Instruction pointer after the halt.
        instruction_pointer: u64,
    },
}

/// Sink trait for deterministic trace hooks.
pub trait TraceSink {
    /// Records an event in execution order.
    fn on_event(&mut self, event: TraceEvent<'_>);
}

/// Sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTraceSink;

impl TraceSink for NullTraceSink {
    fn on_event(&mut self, _event: TraceEvent<'_>) {}
}
