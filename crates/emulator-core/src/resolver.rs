//! Operand resolution: from decoded records to readable/writable cells.
//!
//! Resolution pattern-matches on the operand variant and captures live CPU
//! state once: memory operands compute their effective address
//! `(base + offset1 + offset2) * ratio` at resolve time by reading the
//! referenced registers and constants. The returned cell exposes a 64-bit
//! view; reads zero-extend, writes narrow to the operand width.

use crate::cpu::CpuCore;
use crate::encoding::Width;
use crate::fault::CoreError;
use crate::operand::Operand;

/// A resolved operand: a readable (and usually writable) 64-bit cell.
#[derive(Debug)]
pub enum OperandCell<'c> {
    /// A register slot.
    Register {
        /// CPU owning the register file.
        cpu: &'c CpuCore,
        /// Register class width.
        width: Width,
        /// Index within the class.
        index: u8,
    },
    /// An immediate value; writes fault.
    Constant {
        /// The constant's 64-bit pattern.
        value: u64,
    },
    /// A memory cell at a fixed effective address.
    Memory {
        /// CPU owning main memory.
        cpu: &'c CpuCore,
        /// Effective address computed at resolve time.
        address: u64,
        /// Access width.
        width: Width,
    },
}

/// Resolves an operand record against live CPU state.
///
/// # Errors
///
/// Returns [`CoreError::OperandSemantic`] when a memory component register
/// is not 64-bit wide, and [`CoreError::IllegalInstruction`] for register
/// indices outside the file.
pub fn resolve<'c>(cpu: &'c CpuCore, operand: &Operand) -> Result<OperandCell<'c>, CoreError> {
    match operand {
        Operand::Register { width, index } => Ok(OperandCell::Register {
            cpu,
            width: *width,
            index: *index,
        }),
        Operand::Constant { value, .. } => Ok(OperandCell::Constant { value: *value }),
        Operand::Memory {
            width,
            ratio,
            base,
            offset1,
            offset2,
        } => {
            let base = read_component(cpu, base)?;
            let offset1 = read_component(cpu, offset1)?;
            let offset2 = read_component(cpu, offset2)?;
            let address = base
                .wrapping_add(offset1)
                .wrapping_add(offset2)
                .wrapping_mul(ratio.multiplier());
            Ok(OperandCell::Memory {
                cpu,
                address,
                width: *width,
            })
        }
    }
}

fn read_component(cpu: &CpuCore, component: &Operand) -> Result<u64, CoreError> {
    match component {
        Operand::Register {
            width: Width::W64,
            index,
        } => cpu.read_register(Width::W64, *index),
        Operand::Constant { value, .. } => Ok(*value),
        _ => Err(CoreError::OperandSemantic(
            "memory component must be a 64-bit register or constant".into(),
        )),
    }
}

impl OperandCell<'_> {
    /// Reads the cell, zero-extended into 64 bits.
    ///
    /// `XMM` registers yield their low 64 bits.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalInstruction`] for out-of-range register
    /// indices or memory addresses.
    pub fn get64(&self) -> Result<u64, CoreError> {
        match self {
            Self::Register {
                cpu,
                width: Width::Fp128,
                index,
            } => {
                #[allow(clippy::cast_possible_truncation)]
                let low = cpu.read_xmm(*index)? as u64;
                Ok(low)
            }
            Self::Register { cpu, width, index } => cpu.read_register(*width, *index),
            Self::Constant { value } => Ok(*value),
            Self::Memory {
                cpu,
                address,
                width,
            } => cpu.memory().read_uint(*address, width.bytes().min(8)),
        }
    }

    /// Writes the cell, narrowing to the operand width.
    ///
    /// `XMM` registers receive the value in their low 64 bits; the high
    /// lane is preserved.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalInstruction`] when the cell is a
    /// constant, or for out-of-range register indices or memory addresses.
    pub fn set64(&self, value: u64) -> Result<(), CoreError> {
        match self {
            Self::Register {
                cpu,
                width: Width::Fp128,
                index,
            } => {
                let high = cpu.read_xmm(*index)? & (u128::MAX << 64);
                cpu.write_xmm(*index, high | u128::from(value))
            }
            Self::Register { cpu, width, index } => cpu.write_register(*width, *index, value),
            Self::Constant { .. } => Err(CoreError::IllegalInstruction(
                "write to constant operand".into(),
            )),
            Self::Memory {
                cpu,
                address,
                width,
            } => cpu
                .memory()
                .write_uint(*address, value, width.bytes().min(8)),
        }
    }

    /// Effective address of a memory cell.
    #[must_use]
    pub const fn address(&self) -> Option<u64> {
        match self {
            Self::Memory { address, .. } => Some(*address),
            _ => None,
        }
    }
}
