//! Wire-format constants and the opcode schema table.
//!
//! Everything the operand codec and the instruction decoder agree on lives
//! here: operand prefixes, width tags, memory ratios, control-register index
//! reservations, and the single source-of-truth instruction table.

/// Wire prefix introducing a register operand record.
pub const REGISTER_PREFIX: u8 = 0x01;
/// Wire prefix introducing a constant operand record.
pub const CONSTANT_PREFIX: u8 = 0x02;
/// Wire prefix introducing a memory operand record.
pub const MEMORY_PREFIX: u8 = 0x03;

/// Number of registers in each of the 8/16/32-bit classes.
pub const SMALL_REGISTER_COUNT: u8 = 8;
/// Number of registers in the 64-bit `FER` class.
pub const FULLY_EXTENDED_REGISTER_COUNT: u8 = 16;
/// Number of 128-bit `XMM` registers.
pub const XMM_REGISTER_COUNT: u8 = 8;

/// First register index reserved for the named 64-bit control registers.
pub const CONTROL_REGISTER_BASE: u8 = 0x10;

/// Stack base register index within the 64-bit class.
pub const R_STACK_BASE: u8 = 0x10;
/// Stack pointer register index within the 64-bit class.
pub const R_STACK_POINTER: u8 = 0x11;
/// Code base register index within the 64-bit class.
pub const R_CODE_BASE: u8 = 0x12;
/// Data base register index within the 64-bit class.
pub const R_DATA_BASE: u8 = 0x13;
/// Data pointer register index within the 64-bit class.
pub const R_DATA_POINTER: u8 = 0x14;
/// Extra-segment base register index within the 64-bit class.
pub const R_EXTENDED_SEGMENT_BASE: u8 = 0x15;
/// Extra-segment pointer register index within the 64-bit class.
pub const R_EXTENDED_SEGMENT_POINTER: u8 = 0x16;

/// Textual names of the control registers, in index order from
/// [`CONTROL_REGISTER_BASE`].
pub const CONTROL_REGISTER_NAMES: &[(&str, u8)] = &[
    ("SB", R_STACK_BASE),
    ("SP", R_STACK_POINTER),
    ("CB", R_CODE_BASE),
    ("DB", R_DATA_BASE),
    ("DP", R_DATA_POINTER),
    ("EB", R_EXTENDED_SEGMENT_BASE),
    ("EP", R_EXTENDED_SEGMENT_POINTER),
];

/// Operand width tags.
///
/// The discriminants are wire bytes, not bit counts: `0x16` labels the
/// 16-bit width, `0x32` the 32-bit width, and so on. This labelling is a
/// hard invariant of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum Width {
    /// 8-bit operand width (`R*` class).
    W8 = 0x08,
    /// 16-bit operand width (`EXR*` class).
    W16 = 0x16,
    /// 32-bit operand width (`HER*` class).
    W32 = 0x32,
    /// 64-bit operand width (`FER*` class and control registers).
    W64 = 0x64,
    /// 128-bit floating-point width (`XMM*` class).
    Fp128 = 0xFC,
}

impl Width {
    /// Decodes a width-tag byte.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x08 => Some(Self::W8),
            0x16 => Some(Self::W16),
            0x32 => Some(Self::W32),
            0x64 => Some(Self::W64),
            0xFC => Some(Self::Fp128),
            _ => None,
        }
    }

    /// Returns the wire tag byte.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Width in bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::W8 => 8,
            Self::W16 => 16,
            Self::W32 => 32,
            Self::W64 => 64,
            Self::Fp128 => 128,
        }
    }

    /// Width in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        (self.bits() / 8) as usize
    }

    /// Mask selecting the low `bits()` of a 64-bit cell.
    ///
    /// The 128-bit width masks nothing; its cells are handled as whole
    /// `u128` lanes by the register file.
    #[must_use]
    pub const fn mask(self) -> u64 {
        match self {
            Self::W8 => 0xFF,
            Self::W16 => 0xFFFF,
            Self::W32 => 0xFFFF_FFFF,
            Self::W64 | Self::Fp128 => u64::MAX,
        }
    }

    /// The `.Nbit` width suffix used in instruction text.
    #[must_use]
    pub const fn suffix(self) -> Option<&'static str> {
        match self {
            Self::W8 => Some(".8bit"),
            Self::W16 => Some(".16bit"),
            Self::W32 => Some(".32bit"),
            Self::W64 => Some(".64bit"),
            Self::Fp128 => None,
        }
    }

    /// Resolves a `.Nbit` width suffix (ASCII case-insensitive).
    #[must_use]
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        [Self::W8, Self::W16, Self::W32, Self::W64]
            .into_iter()
            .find(|width| {
                width
                    .suffix()
                    .is_some_and(|s| s.eq_ignore_ascii_case(suffix))
            })
    }

    /// True for the four integer widths legal in memory records and
    /// width-prefixed instructions.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        !matches!(self, Self::Fp128)
    }
}

/// Memory-operand scaling ratio, stored as packed BCD on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum MemoryRatio {
    /// Scale by 1 (`0x01`).
    X1 = 0x01,
    /// Scale by 2 (`0x02`).
    X2 = 0x02,
    /// Scale by 4 (`0x04`).
    X4 = 0x04,
    /// Scale by 8 (`0x08`).
    X8 = 0x08,
    /// Scale by 16 (`0x16`, packed BCD).
    X16 = 0x16,
}

impl MemoryRatio {
    /// Decodes a packed-BCD ratio byte.
    #[must_use]
    pub const fn from_bcd(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::X1),
            0x02 => Some(Self::X2),
            0x04 => Some(Self::X4),
            0x08 => Some(Self::X8),
            0x16 => Some(Self::X16),
            _ => None,
        }
    }

    /// Resolves a plain multiplier (1, 2, 4, 8, 16).
    #[must_use]
    pub const fn from_multiplier(multiplier: u64) -> Option<Self> {
        match multiplier {
            1 => Some(Self::X1),
            2 => Some(Self::X2),
            4 => Some(Self::X4),
            8 => Some(Self::X8),
            16 => Some(Self::X16),
            _ => None,
        }
    }

    /// Returns the packed-BCD wire byte.
    #[must_use]
    pub const fn bcd(self) -> u8 {
        self as u8
    }

    /// Returns the plain multiplier applied to the effective address.
    #[must_use]
    pub const fn multiplier(self) -> u64 {
        match self {
            Self::X1 => 1,
            Self::X2 => 2,
            Self::X4 => 4,
            Self::X8 => 8,
            Self::X16 => 16,
        }
    }
}

/// Assigned instruction opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Opcode {
    Nop,
    Add,
    Adc,
    Sub,
    Mul,
    Imul,
    Div,
    Idiv,
    Neg,
    Cmp,
    And,
    Or,
    Xor,
    Not,
    Shl,
    Shr,
    Rol,
    Ror,
    Rcl,
    Rcr,
    Mov,
    Xchg,
    Push,
    Pop,
    Pushall,
    Popall,
    Enter,
    Leave,
    Movs,
    Fadd,
    Fdiv,
    Hlt,
}

/// Static description of one instruction's encoding schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionSpec {
    /// The 64-bit opcode value as it appears on the wire.
    pub code: u64,
    /// Dispatch identity.
    pub opcode: Opcode,
    /// Canonical upper-case mnemonic.
    pub mnemonic: &'static str,
    /// Whether a width-tag byte follows the opcode.
    pub width_prefixed: bool,
    /// Number of operand records following the opcode (and width byte).
    pub operand_count: u8,
}

/// Single source-of-truth instruction table.
///
/// Any opcode not present here is illegal by definition.
pub const INSTRUCTION_TABLE: &[InstructionSpec] = &[
    InstructionSpec { code: 0x00, opcode: Opcode::Nop, mnemonic: "NOP", width_prefixed: false, operand_count: 0 },
    InstructionSpec { code: 0x01, opcode: Opcode::Add, mnemonic: "ADD", width_prefixed: true, operand_count: 2 },
    InstructionSpec { code: 0x02, opcode: Opcode::Adc, mnemonic: "ADC", width_prefixed: true, operand_count: 2 },
    InstructionSpec { code: 0x03, opcode: Opcode::Sub, mnemonic: "SUB", width_prefixed: true, operand_count: 2 },
    InstructionSpec { code: 0x04, opcode: Opcode::Mul, mnemonic: "MUL", width_prefixed: true, operand_count: 1 },
    InstructionSpec { code: 0x05, opcode: Opcode::Imul, mnemonic: "IMUL", width_prefixed: true, operand_count: 1 },
    InstructionSpec { code: 0x06, opcode: Opcode::Div, mnemonic: "DIV", width_prefixed: true, operand_count: 1 },
    InstructionSpec { code: 0x07, opcode: Opcode::Idiv, mnemonic: "IDIV", width_prefixed: true, operand_count: 1 },
    InstructionSpec { code: 0x08, opcode: Opcode::Neg, mnemonic: "NEG", width_prefixed: true, operand_count: 1 },
    InstructionSpec { code: 0x09, opcode: Opcode::Cmp, mnemonic: "CMP", width_prefixed: true, operand_count: 2 },
    InstructionSpec { code: 0x0A, opcode: Opcode::And, mnemonic: "AND", width_prefixed: true, operand_count: 2 },
    InstructionSpec { code: 0x0B, opcode: Opcode::Or, mnemonic: "OR", width_prefixed: true, operand_count: 2 },
    InstructionSpec { code: 0x0C, opcode: Opcode::Xor, mnemonic: "XOR", width_prefixed: true, operand_count: 2 },
    InstructionSpec { code: 0x0D, opcode: Opcode::Not, mnemonic: "NOT", width_prefixed: true, operand_count: 1 },
    InstructionSpec { code: 0x0E, opcode: Opcode::Shl, mnemonic: "SHL", width_prefixed: true, operand_count: 2 },
    InstructionSpec { code: 0x0F, opcode: Opcode::Shr, mnemonic: "SHR", width_prefixed: true, operand_count: 2 },
    InstructionSpec { code: 0x10, opcode: Opcode::Rol, mnemonic: "ROL", width_prefixed: true, operand_count: 2 },
    InstructionSpec { code: 0x11, opcode: Opcode::Ror, mnemonic: "ROR", width_prefixed: true, operand_count: 2 },
    InstructionSpec { code: 0x12, opcode: Opcode::Rcl, mnemonic: "RCL", width_prefixed: true, operand_count: 2 },
    InstructionSpec { code: 0x13, opcode: Opcode::Rcr, mnemonic: "RCR", width_prefixed: true, operand_count: 2 },
    InstructionSpec { code: 0x20, opcode: Opcode::Mov, mnemonic: "MOV", width_prefixed: true, operand_count: 2 },
    InstructionSpec { code: 0x21, opcode: Opcode::Xchg, mnemonic: "XCHG", width_prefixed: true, operand_count: 2 },
    InstructionSpec { code: 0x22, opcode: Opcode::Push, mnemonic: "PUSH", width_prefixed: true, operand_count: 1 },
    InstructionSpec { code: 0x23, opcode: Opcode::Pop, mnemonic: "POP", width_prefixed: true, operand_count: 1 },
    InstructionSpec { code: 0x24, opcode: Opcode::Pushall, mnemonic: "PUSHALL", width_prefixed: false, operand_count: 0 },
    InstructionSpec { code: 0x25, opcode: Opcode::Popall, mnemonic: "POPALL", width_prefixed: false, operand_count: 0 },
    InstructionSpec { code: 0x26, opcode: Opcode::Enter, mnemonic: "ENTER", width_prefixed: true, operand_count: 1 },
    InstructionSpec { code: 0x27, opcode: Opcode::Leave, mnemonic: "LEAVE", width_prefixed: false, operand_count: 0 },
    InstructionSpec { code: 0x28, opcode: Opcode::Movs, mnemonic: "MOVS", width_prefixed: false, operand_count: 0 },
    InstructionSpec { code: 0x30, opcode: Opcode::Fadd, mnemonic: "FADD", width_prefixed: false, operand_count: 2 },
    InstructionSpec { code: 0x31, opcode: Opcode::Fdiv, mnemonic: "FDIV", width_prefixed: false, operand_count: 1 },
    InstructionSpec { code: 0x40, opcode: Opcode::Hlt, mnemonic: "HLT", width_prefixed: false, operand_count: 0 },
];

/// Looks up the schema for a 64-bit opcode.
///
/// `None` means the opcode is illegal.
#[must_use]
pub fn spec_for_code(code: u64) -> Option<&'static InstructionSpec> {
    INSTRUCTION_TABLE.iter().find(|spec| spec.code == code)
}

/// Resolves a mnemonic (ASCII case-insensitive) to its schema.
#[must_use]
pub fn spec_for_mnemonic(mnemonic: &str) -> Option<&'static InstructionSpec> {
    INSTRUCTION_TABLE
        .iter()
        .find(|spec| spec.mnemonic.eq_ignore_ascii_case(mnemonic))
}

/// True for the floating-point opcodes whose register operands live in the
/// `XMM` class.
#[must_use]
pub const fn is_floating_point(opcode: Opcode) -> bool {
    matches!(opcode, Opcode::Fadd | Opcode::Fdiv)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{
        spec_for_code, spec_for_mnemonic, MemoryRatio, Opcode, Width, INSTRUCTION_TABLE,
    };

    #[test]
    fn width_tags_are_labels_not_bit_counts() {
        assert_eq!(Width::W16.tag(), 0x16);
        assert_eq!(Width::W16.bits(), 16);
        assert_eq!(Width::W32.tag(), 0x32);
        assert_eq!(Width::W32.bits(), 32);
        assert_eq!(Width::W64.tag(), 0x64);
        assert_eq!(Width::W64.bits(), 64);
        assert_eq!(Width::Fp128.tag(), 0xFC);
    }

    #[test]
    fn width_tag_roundtrip_rejects_unknown_bytes() {
        for tag in [0x08u8, 0x16, 0x32, 0x64, 0xFC] {
            let width = Width::from_tag(tag).expect("defined width tag");
            assert_eq!(width.tag(), tag);
        }
        assert_eq!(Width::from_tag(0x00), None);
        assert_eq!(Width::from_tag(0x10), None);
        assert_eq!(Width::from_tag(0x80), None);
    }

    #[test]
    fn width_suffix_roundtrip() {
        assert_eq!(Width::from_suffix(".8bit"), Some(Width::W8));
        assert_eq!(Width::from_suffix(".64BIT"), Some(Width::W64));
        assert_eq!(Width::from_suffix(".128bit"), None);
        for width in [Width::W8, Width::W16, Width::W32, Width::W64] {
            let suffix = width.suffix().expect("integer widths have suffixes");
            assert_eq!(Width::from_suffix(suffix), Some(width));
        }
        assert_eq!(Width::Fp128.suffix(), None);
    }

    #[test]
    fn ratio_sixteen_is_packed_bcd() {
        let ratio = MemoryRatio::from_multiplier(16).expect("16 is a legal ratio");
        assert_eq!(ratio.bcd(), 0x16);
        assert_eq!(MemoryRatio::from_bcd(0x16), Some(MemoryRatio::X16));
        assert_eq!(MemoryRatio::from_bcd(0x10), None);
        assert_eq!(MemoryRatio::from_bcd(0x03), None);
    }

    #[test]
    fn ratio_multiplier_roundtrip() {
        for multiplier in [1u64, 2, 4, 8, 16] {
            let ratio = MemoryRatio::from_multiplier(multiplier).expect("legal ratio");
            assert_eq!(ratio.multiplier(), multiplier);
            assert_eq!(MemoryRatio::from_bcd(ratio.bcd()), Some(ratio));
        }
        assert_eq!(MemoryRatio::from_multiplier(3), None);
        assert_eq!(MemoryRatio::from_multiplier(32), None);
    }

    #[test]
    fn table_contains_unique_codes_and_mnemonics() {
        let codes: HashSet<_> = INSTRUCTION_TABLE.iter().map(|spec| spec.code).collect();
        assert_eq!(codes.len(), INSTRUCTION_TABLE.len());

        let mnemonics: HashSet<_> = INSTRUCTION_TABLE
            .iter()
            .map(|spec| spec.mnemonic)
            .collect();
        assert_eq!(mnemonics.len(), INSTRUCTION_TABLE.len());
    }

    #[test]
    fn reserved_and_assigned_codes_match_contract() {
        assert_eq!(spec_for_code(0x00).map(|s| s.opcode), Some(Opcode::Nop));
        assert_eq!(spec_for_code(0x01).map(|s| s.opcode), Some(Opcode::Add));
        assert_eq!(spec_for_code(0x41), None);
        assert_eq!(spec_for_code(u64::MAX), None);
    }

    #[test]
    fn every_table_entry_resolves_via_both_lookups() {
        for spec in INSTRUCTION_TABLE {
            assert_eq!(spec_for_code(spec.code), Some(spec));
            assert_eq!(spec_for_mnemonic(spec.mnemonic), Some(spec));
        }
    }

    #[test]
    fn mnemonic_lookup_is_case_insensitive() {
        assert_eq!(
            spec_for_mnemonic("add").map(|s| s.opcode),
            Some(Opcode::Add)
        );
        assert_eq!(
            spec_for_mnemonic("pUsHaLl").map(|s| s.opcode),
            Some(Opcode::Pushall)
        );
        assert_eq!(spec_for_mnemonic("NOTREAL"), None);
    }

    #[test]
    fn width_prefix_matches_instruction_class() {
        for spec in INSTRUCTION_TABLE {
            let expects_width = !matches!(
                spec.opcode,
                Opcode::Nop
                    | Opcode::Pushall
                    | Opcode::Popall
                    | Opcode::Leave
                    | Opcode::Movs
                    | Opcode::Fadd
                    | Opcode::Fdiv
                    | Opcode::Hlt
            );
            assert_eq!(spec.width_prefixed, expects_width, "{}", spec.mnemonic);
        }
    }
}
