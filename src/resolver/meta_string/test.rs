//! Tests for meta-string interning.

use super::*;
use crate::meta::MetaStringEncoder;

fn encode(s: &str) -> crate::meta::MetaString {
    MetaStringEncoder::new('.', '_').encode(s).unwrap()
}

#[test]
fn first_occurrence_writes_payload_then_back_references() {
    let mut resolver = MetaStringResolver::new();
    let mut buf = Buffer::new();
    let bytes = resolver.get_meta_string_bytes(&encode("org.example"));

    resolver.write_meta_string_bytes(&mut buf, &bytes);
    let first_len = buf.writer_index();
    resolver.write_meta_string_bytes(&mut buf, &bytes);
    // The second occurrence is a one-byte dynamic id header.
    assert_eq!(buf.writer_index() - first_len, 1);

    let mut reader = MetaStringResolver::new();
    let a = reader.read_meta_string_bytes(&mut buf).unwrap();
    let b = reader.read_meta_string_bytes(&mut buf).unwrap();
    assert!(Rc::ptr_eq(&a, &b));
    assert_eq!(a.data(), bytes.data());
    assert_eq!(a.encoding(), bytes.encoding());
    assert_eq!(a.hashcode(), bytes.hashcode());
}

#[test]
fn small_payload_carries_encoding_byte() {
    let mut resolver = MetaStringResolver::new();
    let mut buf = Buffer::new();
    let bytes = resolver.get_meta_string_bytes(&encode("abc"));
    assert!(bytes.data().len() <= SMALL_STRING_THRESHOLD);

    resolver.write_meta_string_bytes(&mut buf, &bytes);
    // header + encoding byte + data, no 8-byte hash.
    assert_eq!(buf.writer_index(), 1 + 1 + bytes.data().len());
}

#[test]
fn large_payload_carries_hash() {
    let mut resolver = MetaStringResolver::new();
    let mut buf = Buffer::new();
    let long_name = "an.exceedingly.long.namespace.for.wire.testing";
    let bytes = resolver.get_meta_string_bytes(&encode(long_name));
    assert!(bytes.data().len() > SMALL_STRING_THRESHOLD);

    resolver.write_meta_string_bytes(&mut buf, &bytes);
    let header_len = if bytes.data().len() < 64 { 1 } else { 2 };
    assert_eq!(
        buf.writer_index(),
        header_len + 8 + bytes.data().len()
    );

    let mut reader = MetaStringResolver::new();
    let read = reader.read_meta_string_bytes(&mut buf).unwrap();
    assert_eq!(read.hashcode(), bytes.hashcode());
    assert_eq!(read.data(), bytes.data());
}

#[test]
fn hash_low_byte_is_the_encoding() {
    let mut resolver = MetaStringResolver::new();
    for name in ["ab", "mediumsizedname", "a.disproportionately.long.name"] {
        let bytes = resolver.get_meta_string_bytes(&encode(name));
        assert_eq!(
            (bytes.hashcode() & 0xFF) as u8,
            bytes.encoding() as u8,
            "low byte for {name:?}"
        );
    }
}

#[test]
fn conversion_cache_returns_one_handle_per_payload() {
    let mut resolver = MetaStringResolver::new();
    let a = resolver.get_meta_string_bytes(&encode("shared.name"));
    let b = resolver.get_meta_string_bytes(&encode("shared.name"));
    assert!(Rc::ptr_eq(&a, &b));
}

#[test]
fn reset_write_restarts_dynamic_ids() {
    let mut resolver = MetaStringResolver::new();
    let bytes = resolver.get_meta_string_bytes(&encode("org.example"));

    let mut first = Buffer::new();
    resolver.write_meta_string_bytes(&mut first, &bytes);
    resolver.reset_write();
    let mut second = Buffer::new();
    resolver.write_meta_string_bytes(&mut second, &bytes);
    // After a reset the string is announced in full again.
    assert_eq!(first.written(), second.written());
}

#[test]
fn back_reference_to_unknown_id_fails() {
    let mut resolver = MetaStringResolver::new();
    let mut buf = Buffer::new();
    buf.write_var_uint32((1 << 1) | 1);
    assert!(matches!(
        resolver.read_meta_string_bytes(&mut buf),
        Err(Error::InvalidDynamicId(1))
    ));
}
