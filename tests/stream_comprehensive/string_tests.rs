//! String Tests
//!
//! Short and long string records, modified UTF-8 and string limits.
//!
//! Test ID Conventions:
//! - STR-xxx: String tests

use crate::common::*;

fn string_bytes(s: &str) -> Vec<u8> {
    let registry = registry();
    let mut heap = Heap::new();
    let value = string(&mut heap, s);
    write_objects(&registry, &mut heap, &[value])
}

fn read_string(bytes: &[u8]) -> String {
    let (heap, value) = read_one(&registry(), bytes).unwrap();
    text(&heap, value)
}

#[test]
fn str_001_empty_string() {
    let bytes = string_bytes("");
    assert_eq!(&bytes[4..], &[TC_STRING, 0, 0]);
    assert_eq!(read_string(&bytes), "");
}

#[test]
fn str_002_longest_short_string() {
    let s = "a".repeat(65535);
    let bytes = string_bytes(&s);
    assert_eq!(&bytes[4..7], &[TC_STRING, 0xFF, 0xFF]);
    assert_eq!(read_string(&bytes), s);
}

#[test]
fn str_003_shortest_long_string() {
    let s = "a".repeat(65536);
    let bytes = string_bytes(&s);
    assert_eq!(bytes[4], TC_LONGSTRING);
    assert_eq!(&bytes[5..13], &65536i64.to_be_bytes());
    assert_eq!(read_string(&bytes), s);
}

#[test]
fn str_004_three_byte_characters_count_encoded_length() {
    let fits = "\u{20AC}".repeat(21845);
    assert_eq!(string_bytes(&fits)[4], TC_STRING);

    let spills = "\u{20AC}".repeat(21846);
    let bytes = string_bytes(&spills);
    assert_eq!(bytes[4], TC_LONGSTRING);
    assert_eq!(read_string(&bytes), spills);
}

#[test]
fn str_005_nul_uses_two_byte_form() {
    let bytes = string_bytes("a\0b");
    assert_eq!(&bytes[4..], &[TC_STRING, 0, 4, b'a', 0xC0, 0x80, b'b']);
    assert_eq!(read_string(&bytes), "a\0b");
}

#[test]
fn str_006_supplementary_character_as_surrogate_pair() {
    let bytes = string_bytes("\u{1F600}");
    assert_eq!(&bytes[4..7], &[TC_STRING, 0, 6]);
    assert_eq!(read_string(&bytes), "\u{1F600}");
}

#[test]
fn str_007_mixed_text_round_trip() {
    let s = "plain ascii, caf\u{e9}, \u{4e2d}\u{6587}, \u{1F680} and a \0 byte";
    assert_eq!(read_string(&string_bytes(s)), s);
}

#[test]
fn str_008_reader_string_limit() {
    let bytes = string_bytes(&"x".repeat(2000));
    let mut heap = Heap::new();
    let result = reader_with(&registry(), &bytes, StreamConfig::for_testing()).read_object(&mut heap);
    assert!(matches!(result, Err(Error::Limit(_))));
}

// =============================================================================
// Length-prefixed UTF in block data
// =============================================================================

#[test]
fn str_011_write_utf_limit() {
    let registry = registry();
    let mut bytes = Vec::new();
    let mut writer = ObjectWriter::new(&mut bytes, registry).unwrap();
    writer.write_utf(&"a".repeat(65535)).unwrap();
    match writer.write_utf(&"a".repeat(65536)) {
        Err(Error::StringTooLong { length }) => assert_eq!(length, 65536),
        other => panic!("expected string too long, got {:?}", other),
    }
}

#[test]
fn str_012_write_utf_spans_blocks() {
    let registry = registry();
    let s = "\u{20AC}".repeat(10_000);
    let bytes = write_with(&registry, StreamConfig::for_testing(), |w| w.write_utf(&s));
    let mut r = reader(&registry, &bytes);
    assert_eq!(r.read_utf().unwrap(), s);
}
