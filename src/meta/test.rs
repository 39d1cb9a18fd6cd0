//! Tests for the meta-string codec.

use proptest::prelude::*;

use super::*;

fn namespace_encoder() -> MetaStringEncoder { MetaStringEncoder::new('.', '_') }

fn namespace_decoder() -> MetaStringDecoder { MetaStringDecoder::new('.', '_') }

fn type_name_encoder() -> MetaStringEncoder { MetaStringEncoder::new('$', '_') }

fn type_name_decoder() -> MetaStringDecoder { MetaStringDecoder::new('$', '_') }

#[test]
fn encoding_selection_is_deterministic() {
    let encoder = type_name_encoder();
    let cases = [
        ("lowercase_name", Encoding::LowerSpecial),
        ("org.example", Encoding::LowerSpecial),
        ("Mixed1Digit", Encoding::LowerUpperDigitSpecial),
        ("Example", Encoding::FirstToLowerSpecial),
        ("internalBuffer", Encoding::AllToLowerSpecial),
        ("HELLOHELLOHELLO", Encoding::LowerUpperDigitSpecial),
        ("snake_case_123", Encoding::LowerUpperDigitSpecial),
        ("has-dash", Encoding::Utf8),
    ];
    for (input, expected) in cases {
        let m = encoder.encode(input).unwrap();
        assert_eq!(m.encoding(), expected, "encoding of {input:?}");
    }
}

#[test]
fn non_ascii_falls_back_to_utf8() {
    let m = namespace_encoder().encode("日本語").unwrap();
    assert_eq!(m.encoding(), Encoding::Utf8);
    assert_eq!(m.encoded(), "日本語".as_bytes());
    assert_eq!(
        namespace_decoder().decode(m.encoded(), m.encoding()).unwrap(),
        "日本語"
    );
}

#[test]
fn five_bit_packing_shrinks_lowercase_names() {
    let input = "serialization";
    let m = namespace_encoder().encode(input).unwrap();
    assert_eq!(m.encoding(), Encoding::LowerSpecial);
    // 13 chars * 5 bits + 1 flag bit = 66 bits -> 9 bytes, down from 13.
    assert_eq!(m.encoded().len(), 9);
    assert_eq!(
        namespace_decoder().decode(m.encoded(), m.encoding()).unwrap(),
        input
    );
}

#[test]
fn strip_flag_marks_padded_final_group() {
    let encoder = namespace_encoder();
    let decoder = namespace_decoder();
    // Lengths around the byte boundary exercise both flag states.
    for len in 1..=17 {
        let input = "a".repeat(len);
        let m = encoder.encode(&input).unwrap();
        assert_eq!(
            decoder.decode(m.encoded(), m.encoding()).unwrap(),
            input,
            "length {len}"
        );
    }
}

#[test]
fn camel_case_round_trips_through_escapes() {
    let decoder = type_name_decoder();
    for input in ["SomeCamelCase", "ABc", "XY"] {
        let m = type_name_encoder()
            .encode_with_encoding(input, Encoding::AllToLowerSpecial)
            .unwrap();
        assert_eq!(
            decoder.decode(m.encoded(), m.encoding()).unwrap(),
            input,
            "round trip of {input:?}"
        );
    }
}

#[test]
fn first_to_lower_round_trips() {
    let m = type_name_encoder()
        .encode_with_encoding("Example", Encoding::FirstToLowerSpecial)
        .unwrap();
    assert_eq!(
        type_name_decoder().decode(m.encoded(), m.encoding()).unwrap(),
        "Example"
    );
}

#[test]
fn six_bit_alphabet_uses_special_chars() {
    let encoder = type_name_encoder();
    let m = encoder
        .encode_with_encoding("A1$_", Encoding::LowerUpperDigitSpecial)
        .unwrap();
    assert_eq!(
        type_name_decoder().decode(m.encoded(), m.encoding()).unwrap(),
        "A1$_"
    );
}

#[test]
fn empty_input_encodes_to_no_bytes() {
    let m = namespace_encoder().encode("").unwrap();
    assert!(m.encoded().is_empty());
    assert_eq!(
        namespace_decoder().decode(m.encoded(), m.encoding()).unwrap(),
        ""
    );
}

#[test]
fn length_limit_is_exact() {
    let encoder = namespace_encoder();
    let at_limit: String = "a".repeat(MAX_META_STRING_LEN);
    assert!(encoder.encode(&at_limit).is_ok());

    let over_limit: String = "a".repeat(MAX_META_STRING_LEN + 1);
    assert!(matches!(
        encoder.encode(&over_limit),
        Err(crate::Error::MetaStringTooLong(_))
    ));
}

#[test]
fn packed_encoding_rejects_non_ascii() {
    assert!(matches!(
        namespace_encoder()
            .encode_with_encoding("héllo", Encoding::LowerSpecial),
        Err(crate::Error::MetaStringNonAscii)
    ));
}

proptest! {
    #[test]
    fn ascii_identifiers_round_trip(
        input in "[a-zA-Z0-9._$]{0,64}"
    ) {
        let encoder = namespace_encoder();
        let decoder = namespace_decoder();
        let m = encoder.encode(&input).unwrap();
        let decoded = decoder.decode(m.encoded(), m.encoding()).unwrap();
        prop_assert_eq!(decoded, input);
    }

    #[test]
    fn reported_encoding_matches_selection(
        input in "[a-z._$|]{1,64}"
    ) {
        let encoder = namespace_encoder();
        let m = encoder.encode(&input).unwrap();
        prop_assert_eq!(m.encoding(), Encoding::LowerSpecial);
    }
}
