//! Round-trip properties of the operand codec.
//!
//! Text and wire forms must be mutually canonical: rendering a parsed
//! operand reproduces its canonical text, and re-encoding a decoded byte
//! stream reproduces it byte for byte.

use emulator_core::{operand, MemoryRatio, Operand, SliceReader, Width};
use proptest::prelude::*;

fn width_index(width: Width) -> impl Strategy<Value = Operand> {
    let count = match width {
        Width::W8 | Width::W16 | Width::W32 | Width::Fp128 => 8u8,
        Width::W64 => 16u8,
    };
    (0..count).prop_map(move |index| Operand::Register { width, index })
}

fn register_strategy() -> impl Strategy<Value = Operand> {
    prop_oneof![
        width_index(Width::W8),
        width_index(Width::W16),
        width_index(Width::W32),
        width_index(Width::W64),
        width_index(Width::Fp128),
        (0x10u8..=0x16).prop_map(|index| Operand::Register {
            width: Width::W64,
            index
        }),
    ]
}

fn constant_strategy() -> impl Strategy<Value = Operand> {
    prop_oneof![
        any::<u64>().prop_map(|value| Operand::Constant {
            signed: false,
            value
        }),
        (i64::MIN..0i64).prop_map(|value| {
            #[allow(clippy::cast_sign_loss)]
            let value = value as u64;
            Operand::Constant {
                signed: true,
                value,
            }
        }),
    ]
}

fn component_strategy() -> impl Strategy<Value = Operand> {
    prop_oneof![
        (0u8..16).prop_map(|index| Operand::Register {
            width: Width::W64,
            index
        }),
        (0x10u8..=0x16).prop_map(|index| Operand::Register {
            width: Width::W64,
            index
        }),
        constant_strategy(),
    ]
}

fn ratio_strategy() -> impl Strategy<Value = MemoryRatio> {
    prop_oneof![
        Just(MemoryRatio::X1),
        Just(MemoryRatio::X2),
        Just(MemoryRatio::X4),
        Just(MemoryRatio::X8),
        Just(MemoryRatio::X16),
    ]
}

fn access_width_strategy() -> impl Strategy<Value = Width> {
    prop_oneof![
        Just(Width::W8),
        Just(Width::W16),
        Just(Width::W32),
        Just(Width::W64),
    ]
}

fn memory_strategy() -> impl Strategy<Value = Operand> {
    (
        access_width_strategy(),
        ratio_strategy(),
        component_strategy(),
        component_strategy(),
        component_strategy(),
    )
        .prop_map(|(width, ratio, base, offset1, offset2)| Operand::Memory {
            width,
            ratio,
            base: Box::new(base),
            offset1: Box::new(offset1),
            offset2: Box::new(offset2),
        })
}

fn operand_strategy() -> impl Strategy<Value = Operand> {
    prop_oneof![register_strategy(), constant_strategy(), memory_strategy()]
}

proptest! {
    #[test]
    fn rendered_text_reparses_to_the_same_record(record in operand_strategy()) {
        let text = operand::render(&record);
        let reparsed = operand::parse(&text).expect("canonical text must parse");
        prop_assert_eq!(reparsed, record);
    }

    #[test]
    fn rendering_is_idempotent(record in operand_strategy()) {
        let text = operand::render(&record);
        let again = operand::render(&operand::parse(&text).expect("canonical text must parse"));
        prop_assert_eq!(text, again);
    }

    #[test]
    fn wire_bytes_roundtrip_exactly(record in operand_strategy()) {
        let mut bytes = Vec::new();
        operand::encode(&record, &mut bytes);

        let mut reader = SliceReader::new(&bytes);
        let decoded = operand::decode(&mut reader).expect("self-encoded bytes must decode");
        prop_assert!(reader.is_empty(), "decode must consume the whole record");
        prop_assert_eq!(&decoded, &record);

        // assemble(disassemble(B)) == B through the text form as well.
        let reassembled = operand::parse(&operand::render(&decoded)).expect("canonical");
        let mut bytes_again = Vec::new();
        operand::encode(&reassembled, &mut bytes_again);
        prop_assert_eq!(bytes_again, bytes);
    }

    #[test]
    fn decoding_never_reads_past_the_record(record in operand_strategy(), tail in proptest::collection::vec(any::<u8>(), 0..16)) {
        let mut bytes = Vec::new();
        operand::encode(&record, &mut bytes);
        let record_length = bytes.len();
        bytes.extend_from_slice(&tail);

        let mut reader = SliceReader::new(&bytes);
        operand::decode(&mut reader).expect("record must decode with trailing bytes");
        prop_assert_eq!(reader.position(), record_length);
    }

    #[test]
    fn whitespace_and_case_are_insignificant(record in operand_strategy()) {
        let text = operand::render(&record);
        let lower = text.to_ascii_lowercase();
        let spaced: String = text.chars().flat_map(|c| [c, ' ']).collect();
        prop_assert_eq!(operand::parse(&lower).expect("lower-case text must parse"), record.clone());
        prop_assert_eq!(operand::parse(&spaced).expect("spaced text must parse"), record);
    }
}

#[test]
fn canonicalization_matches_reference_examples() {
    for (input, canonical) in [
        ("<%fer14>", "<%FER14>"),
        ("%R7", "<%R7>"),
        ("$( 0x1F )", "<$(0x1F)>"),
        ("$(31)", "<$(0x1F)>"),
        ("$(-32)", "<$(-32)>"),
        (
            "*2&64(%FER14, $(255), $(4))",
            "<*2&64(%FER14,$(0xFF),$(0x4))>",
        ),
        ("*1&8($(1),$(2),$(3))", "<*1&8($(0x1),$(0x2),$(0x3))>"),
        ("< %sp >", "<%SP>"),
    ] {
        let record = operand::parse(input).expect(input);
        assert_eq!(operand::render(&record), canonical, "{input}");
    }
}
