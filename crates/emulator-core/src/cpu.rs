//! The CPU context: register file, memory, vector table, and run loop.
//!
//! All mutable state is owned here and threaded through the decoder and
//! executor; there is no file-scope state. Register accesses serialize on a
//! single mutex (reads included, since the 64-bit containers of smaller
//! registers may be mid-update on another thread). The `running`/`exited`
//! atomic pair lets a supervisor request a stop and join deterministically.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::api::{CoreConfig, HaltCause, NullTraceSink, RunOutcome, StepOutcome, TraceSink};
use crate::encoding::{Width, R_STACK_POINTER};
use crate::executor;
use crate::fault::CoreError;
use crate::interrupt::{FaultDiagnostic, VectorTable};
use crate::memory::{MainMemory, BIOS_START};
use crate::state::{RegisterFile, StatusFlags};

/// A single virtual CPU with its memory and interrupt table.
#[derive(Debug)]
pub struct CpuCore {
    registers: Mutex<RegisterFile>,
    memory: MainMemory,
    vector_table: VectorTable,
    running: AtomicBool,
    exited: AtomicBool,
}

impl Default for CpuCore {
    fn default() -> Self {
        Self::new(&CoreConfig::default())
    }
}

impl CpuCore {
    /// Creates a zeroed VM: memory cleared, registers cleared, `SP` loaded
    /// from the configuration, and the instruction pointer at
    /// [`BIOS_START`].
    ///
    /// # Panics
    ///
    /// Panics if the register lock is poisoned (unreachable during
    /// construction).
    #[must_use]
    pub fn new(config: &CoreConfig) -> Self {
        let cpu = Self {
            registers: Mutex::new(RegisterFile::default()),
            memory: MainMemory::new(config.memory_bytes),
            vector_table: VectorTable::new(),
            running: AtomicBool::new(true),
            exited: AtomicBool::new(false),
        };
        {
            let mut registers = cpu.registers.lock().expect("register lock poisoned");
            registers
                .write(Width::W64, R_STACK_POINTER, config.initial_stack_pointer)
                .expect("stack pointer index is always valid");
            registers.set_instruction_pointer(BIOS_START);
        }
        cpu
    }

    /// Copies a firmware image to [`BIOS_START`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalInstruction`] when the image does not fit
    /// in memory.
    pub fn load_firmware(&self, image: &[u8]) -> Result<(), CoreError> {
        self.memory.write(BIOS_START, image)
    }

    /// Flat main memory.
    #[must_use]
    pub const fn memory(&self) -> &MainMemory {
        &self.memory
    }

    /// Interrupt vector table.
    #[must_use]
    pub const fn vector_table(&self) -> &VectorTable {
        &self.vector_table
    }

    fn lock_registers(&self) -> std::sync::MutexGuard<'_, RegisterFile> {
        self.registers.lock().expect("register lock poisoned")
    }

    /// Reads a register under the register lock.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalInstruction`] for a width/index pair
    /// outside the register file.
    pub fn read_register(&self, width: Width, index: u8) -> Result<u64, CoreError> {
        self.lock_registers().read(width, index)
    }

    /// Writes a register under the register lock, narrowing to `width`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalInstruction`] for a width/index pair
    /// outside the register file.
    pub fn write_register(&self, width: Width, index: u8, value: u64) -> Result<(), CoreError> {
        self.lock_registers().write(width, index, value)
    }

    /// Reads a 128-bit `XMM` lane under the register lock.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalInstruction`] for an out-of-range index.
    pub fn read_xmm(&self, index: u8) -> Result<u128, CoreError> {
        self.lock_registers().read_xmm(index)
    }

    /// Writes a 128-bit `XMM` lane under the register lock.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalInstruction`] for an out-of-range index.
    pub fn write_xmm(&self, index: u8, value: u128) -> Result<(), CoreError> {
        self.lock_registers().write_xmm(index, value)
    }

    /// Current instruction pointer.
    #[must_use]
    pub fn instruction_pointer(&self) -> u64 {
        self.lock_registers().instruction_pointer()
    }

    /// Sets the instruction pointer.
    pub fn set_instruction_pointer(&self, value: u64) {
        self.lock_registers().set_instruction_pointer(value);
    }

    /// Current status flags.
    #[must_use]
    pub fn flags(&self) -> StatusFlags {
        self.lock_registers().flags()
    }

    /// Replaces the status flags.
    pub fn set_flags(&self, flags: StatusFlags) {
        self.lock_registers().set_flags(flags);
    }

    /// Requests a stop; the run loop exits at its next fetch boundary.
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// True while no stop has been requested and no `HLT` has retired.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// True once a run loop has exited.
    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// Executes one instruction.
    ///
    /// # Errors
    ///
    /// Returns a [`FaultDiagnostic`] when a raised interrupt could not be
    /// dispatched; the VM is halted in that case.
    pub fn step(&self) -> Result<StepOutcome, FaultDiagnostic> {
        executor::step(self, &mut NullTraceSink)
    }

    /// Runs until `HLT`, a stop request, or an undispatchable fault.
    pub fn run(&self) -> RunOutcome {
        self.run_with_trace(&mut NullTraceSink)
    }

    /// Runs like [`CpuCore::run`], reporting each step to `sink`.
    pub fn run_with_trace(&self, sink: &mut dyn TraceSink) -> RunOutcome {
        let mut steps = 0u64;
        let cause = loop {
            if !self.is_running() {
                break HaltCause::Stopped;
            }
            match executor::step(self, sink) {
                Ok(StepOutcome::Halted) => {
                    steps += 1;
                    break HaltCause::Halt;
                }
                Ok(_) => steps += 1,
                Err(diagnostic) => break HaltCause::Fault(diagnostic),
            }
        };
        self.exited.store(true, Ordering::SeqCst);
        RunOutcome { steps, cause }
    }
}
