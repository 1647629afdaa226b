//! Enum Tests
//!
//! Enum constants are written by name and resolved to the reader's
//! interned constant, so identity survives any number of references.
//!
//! Test ID Conventions:
//! - EN-xxx: Enum tests

use crate::common::*;

fn color_registry(constants: &[&str]) -> std::sync::Arc<ClassRegistry> {
    registry_with(vec![
        holder_class(),
        ClassDef::enumeration("test.Color", constants.iter().copied()),
    ])
}

#[test]
fn en_001_constant_identity() {
    let registry = color_registry(&["RED", "GREEN"]);
    let mut heap = Heap::new();
    let red = registry.enum_constant(&mut heap, "test.Color", "RED").unwrap();
    let h = new_holder(&registry, &mut heap, Value::Ref(red), Value::Ref(red));

    let (mut copy, read) = round_trip(&registry, &mut heap, Value::Ref(h));
    let a = field(&copy, read, "a");
    assert_eq!(a, field(&copy, read, "b"));
    let interned = registry.enum_constant(&mut copy, "test.Color", "RED").unwrap();
    assert_eq!(a, Value::Ref(interned));
}

#[test]
fn en_002_constant_read_twice_is_same_object() {
    let registry = color_registry(&["RED", "GREEN"]);
    let mut heap = Heap::new();
    let green = registry.enum_constant(&mut heap, "test.Color", "GREEN").unwrap();
    let bytes = write_objects(&registry, &mut heap, &[Value::Ref(green), Value::Ref(green)]);

    let mut copy = Heap::new();
    let mut r = reader(&registry, &bytes);
    let first = r.read_object(&mut copy).unwrap();
    let second = r.read_object(&mut copy).unwrap();
    assert_eq!(first, second);
    assert_eq!(copy.enum_value(id(first)).unwrap().name, "GREEN");
}

#[test]
fn en_003_unknown_constant() {
    let writer_registry = color_registry(&["RED", "GREEN"]);
    let reader_registry = color_registry(&["RED"]);
    let mut heap = Heap::new();
    let green = writer_registry
        .enum_constant(&mut heap, "test.Color", "GREEN")
        .unwrap();
    let result = transfer(&writer_registry, &mut heap, Value::Ref(green), &reader_registry);
    assert!(matches!(result, Err(Error::InvalidObject(_))));
}

#[test]
fn en_004_reordered_constants_still_match_by_name() {
    let writer_registry = color_registry(&["RED", "GREEN", "BLUE"]);
    let reader_registry = color_registry(&["BLUE", "GREEN", "RED"]);
    let mut heap = Heap::new();
    let blue = writer_registry
        .enum_constant(&mut heap, "test.Color", "BLUE")
        .unwrap();
    let (copy, read) =
        transfer(&writer_registry, &mut heap, Value::Ref(blue), &reader_registry).unwrap();
    assert_eq!(copy.enum_value(id(read)).unwrap().name, "BLUE");
}

#[test]
fn en_005_enum_array() {
    let registry = color_registry(&["RED", "GREEN"]);
    let mut heap = Heap::new();
    let red = registry.enum_constant(&mut heap, "test.Color", "RED").unwrap();
    let green = registry.enum_constant(&mut heap, "test.Color", "GREEN").unwrap();
    let arr = heap.alloc_array(
        "[Ltest.Color;",
        ArrayData::Reference(vec![Value::Ref(red), Value::Ref(green), Value::Ref(red)]),
    );
    let (copy, read) = round_trip(&registry, &mut heap, Value::Ref(arr));
    let array = copy.array(id(read)).unwrap();
    assert_eq!(array.data.get(0), array.data.get(2));
}

#[test]
fn en_006_constant_specific_subclass_written_as_enum_class() {
    let registry = registry_with(vec![
        ClassDef::enumeration("test.Op", ["PLUS", "MINUS"]),
        ClassDef::new("test.Op$1")
            .with_modifiers(Modifiers::FINAL)
            .extends("test.Op"),
    ]);
    let mut heap = Heap::new();
    let plus = heap.enum_constant("test.Op$1", "PLUS");
    let bytes = write_objects(&registry, &mut heap, &[Value::Ref(plus)]);
    assert!(find_bytes(&bytes, b"test.Op$1").is_none());

    let (copy, read) = read_one(&registry, &bytes).unwrap();
    let constant = copy.enum_value(id(read)).unwrap();
    assert_eq!(constant.class_name, "test.Op");
    assert_eq!(constant.name, "PLUS");
}

#[test]
fn en_007_enum_descriptor_has_zero_version() {
    let registry = color_registry(&["RED"]);
    assert_eq!(registry.serial_version_uid("test.Color").unwrap(), 0);
}
