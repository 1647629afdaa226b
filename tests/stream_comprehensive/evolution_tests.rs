//! Class Evolution Tests
//!
//! The writer and reader each get their own registry, so every test here
//! describes a class one way when writing and another way when reading.
//!
//! Test ID Conventions:
//! - EV-xxx: Class evolution tests

use crate::common::*;
use std::sync::Arc;

fn point_v2() -> ClassDef {
    point_class().field("z", FieldType::INT)
}

fn incompatibility(result: Result<(Heap, Value)>) -> Incompatibility {
    match result {
        Err(Error::IncompatibleClass { reason, .. }) => reason,
        Err(other) => panic!("expected incompatible class, got {:?}", other),
        Ok(_) => panic!("expected incompatible class, read succeeded"),
    }
}

// =============================================================================
// Fields (EV-001 to EV-010)
// =============================================================================

#[test]
fn ev_001_added_field_takes_default() {
    let writer_registry = registry_with(vec![point_class()]);
    let reader_registry = registry_with(vec![point_v2()]);
    let mut heap = Heap::new();
    let p = new_point(&writer_registry, &mut heap, 1, 2);
    let (copy, read) = transfer(&writer_registry, &mut heap, Value::Ref(p), &reader_registry).unwrap();
    assert_eq!(field(&copy, read, "x"), Value::Int(1));
    assert_eq!(field(&copy, read, "y"), Value::Int(2));
    assert_eq!(field(&copy, read, "z"), Value::Int(0));
}

#[test]
fn ev_002_removed_field_is_discarded() {
    let writer_registry = registry_with(vec![point_class().field("label", FieldType::string())]);
    let reader_registry = registry_with(vec![point_class()]);
    let mut heap = Heap::new();
    let p = new_point(&writer_registry, &mut heap, 5, 6);
    let label = string(&mut heap, "dropped");
    heap.set_field(p, "label", label).unwrap();
    let (copy, read) = transfer(&writer_registry, &mut heap, Value::Ref(p), &reader_registry).unwrap();
    assert_eq!(field(&copy, read, "x"), Value::Int(5));
    assert_eq!(field(&copy, read, "y"), Value::Int(6));
    assert!(copy.get_field(id(read), "label").is_err());
}

#[test]
fn ev_003_transient_field_not_written() {
    let def = point_class().transient_field("cache", FieldType::INT);
    let registry = registry_with(vec![def]);
    let mut heap = Heap::new();
    let p = new_point(&registry, &mut heap, 1, 1);
    heap.set_field(p, "cache", Value::Int(77)).unwrap();
    let (copy, read) = transfer(&registry, &mut heap, Value::Ref(p), &registry).unwrap();
    assert_eq!(field(&copy, read, "cache"), Value::Int(0));
}

#[test]
fn ev_004_primitive_type_change_is_field_mismatch() {
    let writer_registry = registry_with(vec![point_class()]);
    let reader_registry = registry_with(vec![ClassDef::new("test.Point")
        .serializable()
        .serial_version_uid(1)
        .field("x", FieldType::LONG)
        .field("y", FieldType::INT)]);
    let mut heap = Heap::new();
    let p = new_point(&writer_registry, &mut heap, 1, 2);
    let result = transfer(&writer_registry, &mut heap, Value::Ref(p), &reader_registry);
    match result {
        Err(Error::FieldMismatch { field, .. }) => assert_eq!(field, "x"),
        other => panic!("expected field mismatch, got {:?}", other.map(|(_, v)| v)),
    }
}

#[test]
fn ev_005_reference_field_narrowed_rejects_value() {
    let writer_registry = fixture_registry();
    let reader_registry = registry_with(vec![
        point_class(),
        ClassDef::new("test.Holder")
            .serializable()
            .serial_version_uid(3)
            .field("a", FieldType::object("test.Point"))
            .field("b", FieldType::object("java.lang.Object")),
    ]);
    let mut heap = Heap::new();
    let s = string(&mut heap, "not a point");
    let h = new_holder(&writer_registry, &mut heap, s, Value::Null);
    let result = transfer(&writer_registry, &mut heap, Value::Ref(h), &reader_registry);
    assert!(matches!(result, Err(Error::FieldMismatch { .. })));
}

#[test]
fn ev_006_reference_field_to_unknown_class_is_accepted() {
    let writer_registry = fixture_registry();
    let reader_registry = registry_with(vec![ClassDef::new("test.Holder")
        .serializable()
        .serial_version_uid(3)
        .field("a", FieldType::object("test.Unregistered"))
        .field("b", FieldType::object("java.lang.Object"))]);
    let mut heap = Heap::new();
    let s = string(&mut heap, "kept");
    let h = new_holder(&writer_registry, &mut heap, s, Value::Null);
    let (copy, read) = transfer(&writer_registry, &mut heap, Value::Ref(h), &reader_registry).unwrap();
    assert_eq!(text(&copy, field(&copy, read, "a")), "kept");
}

// =============================================================================
// Version identifiers (EV-011 to EV-020)
// =============================================================================

#[test]
fn ev_011_explicit_version_mismatch() {
    let writer_registry = registry_with(vec![point_class()]);
    let reader_registry = registry_with(vec![point_class().serial_version_uid(2)]);
    let mut heap = Heap::new();
    let p = new_point(&writer_registry, &mut heap, 1, 2);
    let reason = incompatibility(transfer(
        &writer_registry,
        &mut heap,
        Value::Ref(p),
        &reader_registry,
    ));
    assert_eq!(reason, Incompatibility::VersionMismatch { stream: 1, local: 2 });
}

#[test]
fn ev_012_default_version_tracks_fields() {
    let plain = || {
        ClassDef::new("test.Plain")
            .serializable()
            .field("a", FieldType::INT)
    };
    let writer_registry = registry_with(vec![plain()]);
    let same_registry = registry_with(vec![plain()]);
    let changed_registry = registry_with(vec![plain().field("b", FieldType::INT)]);

    let mut heap = Heap::new();
    let obj = writer_registry.new_instance(&mut heap, "test.Plain").unwrap();
    let bytes = write_objects(&writer_registry, &mut heap, &[Value::Ref(obj)]);

    assert!(read_one(&same_registry, &bytes).is_ok());
    let reason = incompatibility(read_one(&changed_registry, &bytes));
    assert!(matches!(reason, Incompatibility::VersionMismatch { .. }));
}

#[test]
fn ev_013_default_version_ignores_transient_fields() {
    let writer_registry = registry_with(vec![ClassDef::new("test.Plain")
        .serializable()
        .field("a", FieldType::INT)]);
    let reader_registry = registry_with(vec![ClassDef::new("test.Plain")
        .serializable()
        .field("a", FieldType::INT)
        .transient_field("scratch", FieldType::LONG)]);
    assert_eq!(
        writer_registry.serial_version_uid("test.Plain").unwrap(),
        reader_registry.serial_version_uid("test.Plain").unwrap()
    );
}

#[test]
fn ev_014_default_version_tracks_field_types() {
    let writer_registry = registry_with(vec![ClassDef::new("test.Plain")
        .serializable()
        .field("a", FieldType::INT)]);
    let reader_registry = registry_with(vec![ClassDef::new("test.Plain")
        .serializable()
        .field("a", FieldType::LONG)]);
    let stream_suid = writer_registry.serial_version_uid("test.Plain").unwrap();
    let local_suid = reader_registry.serial_version_uid("test.Plain").unwrap();
    assert_ne!(stream_suid, local_suid);

    let mut heap = Heap::new();
    let obj = writer_registry.new_instance(&mut heap, "test.Plain").unwrap();
    heap.set_field(obj, "a", Value::Int(7)).unwrap();
    let result = transfer(&writer_registry, &mut heap, Value::Ref(obj), &reader_registry);
    assert_eq!(
        incompatibility(result),
        Incompatibility::VersionMismatch {
            stream: stream_suid,
            local: local_suid
        }
    );
}

// =============================================================================
// Missing classes (EV-021 to EV-030)
// =============================================================================

#[test]
fn ev_021_class_not_found_keeps_stream_in_sync() {
    let extra = ClassDef::new("test.Extra")
        .serializable()
        .field("v", FieldType::INT)
        .write_object(|frame| {
            frame.default_write_object()?;
            frame.write_int(1234)?;
            frame.write_utf("trailing")
        });
    let writer_registry = registry_with(vec![point_class(), holder_class(), extra]);
    let reader_registry = registry_with(vec![point_class(), holder_class()]);

    let mut heap = Heap::new();
    let e = writer_registry.new_instance(&mut heap, "test.Extra").unwrap();
    let after = string(&mut heap, "after");
    let h = new_holder(&writer_registry, &mut heap, Value::Ref(e), after);
    let p = new_point(&writer_registry, &mut heap, 8, 9);
    let bytes = write_objects(&writer_registry, &mut heap, &[Value::Ref(h), Value::Ref(p)]);

    let mut copy = Heap::new();
    let mut r = reader(&reader_registry, &bytes);
    match r.read_object(&mut copy) {
        Err(Error::ClassNotFound(name)) => assert_eq!(name, "test.Extra"),
        other => panic!("expected class not found, got {:?}", other),
    }
    let next = r.read_object(&mut copy).unwrap();
    assert_eq!(field(&copy, next, "x"), Value::Int(8));
}

#[test]
fn ev_022_missing_class_in_array() {
    let writer_registry = registry_with(vec![point_class()]);
    let reader_registry = registry();
    let mut heap = Heap::new();
    let p = new_point(&writer_registry, &mut heap, 1, 1);
    let arr = heap.alloc_array("[Ltest.Point;", ArrayData::Reference(vec![Value::Ref(p)]));
    let result = transfer(&writer_registry, &mut heap, Value::Ref(arr), &reader_registry);
    assert!(matches!(result, Err(Error::ClassNotFound(_))));
}

/// `test.Holder` as a reader that dropped field `a`
fn holder_without_a() -> ClassDef {
    ClassDef::new("test.Holder")
        .serializable()
        .serial_version_uid(3)
        .field("b", FieldType::object("java.lang.Object"))
}

#[test]
fn ev_023_missing_class_in_dropped_field_is_ignored() {
    let writer_registry = fixture_registry();
    let reader_registry = registry_with(vec![holder_without_a()]);
    let mut heap = Heap::new();
    let p = new_point(&writer_registry, &mut heap, 1, 2);
    let kept = string(&mut heap, "kept");
    let h = new_holder(&writer_registry, &mut heap, Value::Ref(p), kept);

    let (copy, read) = transfer(&writer_registry, &mut heap, Value::Ref(h), &reader_registry).unwrap();
    assert_eq!(text(&copy, field(&copy, read, "b")), "kept");
    assert!(copy.get_field(id(read), "a").is_err());
}

#[test]
fn ev_024_dropped_missing_object_referenced_again() {
    let writer_registry = fixture_registry();
    let reader_registry = registry_with(vec![holder_without_a()]);
    let mut heap = Heap::new();
    let p = new_point(&writer_registry, &mut heap, 1, 2);
    let h = new_holder(&writer_registry, &mut heap, Value::Ref(p), Value::Ref(p));

    match transfer(&writer_registry, &mut heap, Value::Ref(h), &reader_registry) {
        Err(Error::ClassNotFound(name)) => assert_eq!(name, "test.Point"),
        other => panic!("expected class not found, got {:?}", other),
    }
}

#[test]
fn ev_025_missing_class_follows_the_object_holding_it() {
    let writer_registry = fixture_registry();
    let reader_registry = registry_with(vec![node_class(), holder_without_a()]);
    let mut heap = Heap::new();
    let p = new_point(&writer_registry, &mut heap, 1, 2);
    let node = new_node(&writer_registry, &mut heap, 5);
    heap.set_field(node, "peer", Value::Ref(p)).unwrap();
    let h = new_holder(&writer_registry, &mut heap, Value::Ref(node), Value::Ref(node));

    match transfer(&writer_registry, &mut heap, Value::Ref(h), &reader_registry) {
        Err(Error::ClassNotFound(name)) => assert_eq!(name, "test.Point"),
        other => panic!("expected class not found, got {:?}", other),
    }

    // the same node without the point is fine
    heap.set_field(node, "peer", Value::Null).unwrap();
    let (copy, read) = transfer(&writer_registry, &mut heap, Value::Ref(h), &reader_registry).unwrap();
    assert_eq!(field(&copy, field(&copy, read, "b"), "value"), Value::Int(5));
}

#[test]
fn ev_026_missing_class_shared_around_a_cycle() {
    let writer_registry = fixture_registry();
    let reader_registry = registry_with(vec![node_class(), holder_without_a()]);
    let mut heap = Heap::new();
    let p = new_point(&writer_registry, &mut heap, 1, 2);
    let first = new_node(&writer_registry, &mut heap, 1);
    let second = new_node(&writer_registry, &mut heap, 2);
    // second is complete before first reaches its point
    heap.set_field(first, "next", Value::Ref(second)).unwrap();
    heap.set_field(second, "next", Value::Ref(first)).unwrap();
    heap.set_field(first, "peer", Value::Ref(p)).unwrap();
    let h = new_holder(&writer_registry, &mut heap, Value::Ref(first), Value::Ref(second));

    assert!(matches!(
        transfer(&writer_registry, &mut heap, Value::Ref(h), &reader_registry),
        Err(Error::ClassNotFound(_))
    ));
}

#[test]
fn ev_027_missing_class_in_skipped_custom_data() {
    let extra = || {
        ClassDef::new("test.Extra")
            .serializable()
            .serial_version_uid(20)
            .field("v", FieldType::INT)
            .transient_field("point", FieldType::object("test.Point"))
    };
    let writer_registry = registry_with(vec![
        point_class(),
        extra().write_object(|frame| {
            frame.default_write_object()?;
            let obj = frame.object();
            let point = frame.heap().get_field(obj, "point")?;
            frame.write_object(point)
        }),
    ]);
    let reader_registry = registry_with(vec![extra()]);

    let mut heap = Heap::new();
    let e = writer_registry.new_instance(&mut heap, "test.Extra").unwrap();
    let p = new_point(&writer_registry, &mut heap, 3, 4);
    heap.set_field(e, "v", Value::Int(11)).unwrap();
    heap.set_field(e, "point", Value::Ref(p)).unwrap();

    let (copy, read) = transfer(&writer_registry, &mut heap, Value::Ref(e), &reader_registry).unwrap();
    assert_eq!(field(&copy, read, "v"), Value::Int(11));
    assert_eq!(field(&copy, read, "point"), Value::Null);
}

// =============================================================================
// Hierarchy changes (EV-031 to EV-040)
// =============================================================================

fn sub_class() -> ClassDef {
    ClassDef::new("test.Sub")
        .serializable()
        .serial_version_uid(10)
        .field("s", FieldType::INT)
}

fn serializable_base() -> ClassDef {
    ClassDef::new("test.Base")
        .serializable()
        .serial_version_uid(11)
        .field("b", FieldType::INT)
}

#[test]
fn ev_031_inserted_superclass_gets_no_data_hook() {
    let writer_registry = registry_with(vec![sub_class()]);
    let reader_registry = registry_with(vec![
        serializable_base().read_object_no_data(|heap, obj| {
            heap.set_field(obj, "b", Value::Int(42))
        }),
        sub_class().extends("test.Base"),
    ]);
    let mut heap = Heap::new();
    let obj = writer_registry.new_instance(&mut heap, "test.Sub").unwrap();
    heap.set_field(obj, "s", Value::Int(3)).unwrap();

    let (copy, read) = transfer(&writer_registry, &mut heap, Value::Ref(obj), &reader_registry).unwrap();
    assert_eq!(field(&copy, read, "s"), Value::Int(3));
    assert_eq!(field(&copy, read, "b"), Value::Int(42));
}

#[test]
fn ev_032_removed_superclass_data_is_discarded() {
    let writer_registry = registry_with(vec![serializable_base(), sub_class().extends("test.Base")]);
    let reader_registry = registry_with(vec![serializable_base(), sub_class()]);
    let mut heap = Heap::new();
    let obj = writer_registry.new_instance(&mut heap, "test.Sub").unwrap();
    heap.set_field(obj, "s", Value::Int(4)).unwrap();
    heap.set_field(obj, "b", Value::Int(5)).unwrap();

    let (copy, read) = transfer(&writer_registry, &mut heap, Value::Ref(obj), &reader_registry).unwrap();
    assert_eq!(field(&copy, read, "s"), Value::Int(4));
    assert!(copy.get_field(id(read), "b").is_err());
}

#[test]
fn ev_033_superclass_fields_round_trip() {
    let registry = registry_with(vec![serializable_base(), sub_class().extends("test.Base")]);
    let mut heap = Heap::new();
    let obj = registry.new_instance(&mut heap, "test.Sub").unwrap();
    heap.set_field(obj, "s", Value::Int(1)).unwrap();
    heap.set_field(obj, "b", Value::Int(2)).unwrap();
    round_trip(&registry, &mut heap, Value::Ref(obj));
}

#[test]
fn ev_034_non_serializable_ancestor_constructor_runs() {
    let classes = || {
        vec![
            ClassDef::new("test.Base")
                .field("tag", FieldType::INT)
                .constructor(
                    ConstructorDef::no_arg(Modifiers::PUBLIC)
                        .with_init(|heap, obj| heap.set_field(obj, "tag", Value::Int(7))),
                ),
            sub_class().extends("test.Base"),
        ]
    };
    let writer_registry = registry_with(classes());
    let reader_registry = registry_with(classes());
    let mut heap = Heap::new();
    let obj = writer_registry.new_instance(&mut heap, "test.Sub").unwrap();
    heap.set_field(obj, "tag", Value::Int(99)).unwrap();
    heap.set_field(obj, "s", Value::Int(12)).unwrap();

    let (copy, read) = transfer(&writer_registry, &mut heap, Value::Ref(obj), &reader_registry).unwrap();
    assert_eq!(field(&copy, read, "tag"), Value::Int(7));
    assert_eq!(field(&copy, read, "s"), Value::Int(12));
}

#[test]
fn ev_035_private_ancestor_constructor_rejected() {
    let writer_registry = registry_with(vec![
        ClassDef::new("test.Base"),
        sub_class().extends("test.Base"),
    ]);
    let reader_registry = registry_with(vec![
        ClassDef::new("test.Base").constructor(ConstructorDef::no_arg(Modifiers::PRIVATE)),
        sub_class().extends("test.Base"),
    ]);
    let mut heap = Heap::new();
    let obj = writer_registry.new_instance(&mut heap, "test.Sub").unwrap();
    let reason = incompatibility(transfer(
        &writer_registry,
        &mut heap,
        Value::Ref(obj),
        &reader_registry,
    ));
    assert_eq!(reason, Incompatibility::NoValidConstructor);
}

#[test]
fn ev_036_package_private_constructor_needs_same_package() {
    let reader_registry = registry_with(vec![
        ClassDef::new("other.Base").constructor(ConstructorDef::no_arg(Modifiers::NONE)),
        sub_class().extends("other.Base"),
    ]);
    let writer_registry = registry_with(vec![
        ClassDef::new("other.Base"),
        sub_class().extends("other.Base"),
    ]);
    let mut heap = Heap::new();
    let obj = writer_registry.new_instance(&mut heap, "test.Sub").unwrap();
    let reason = incompatibility(transfer(
        &writer_registry,
        &mut heap,
        Value::Ref(obj),
        &reader_registry,
    ));
    assert_eq!(reason, Incompatibility::NoValidConstructor);
}

// =============================================================================
// Capability and name checks (EV-041 to EV-050)
// =============================================================================

#[test]
fn ev_041_serializable_vs_externalizable() {
    let writer_registry = registry_with(vec![ClassDef::new("test.Thing")
        .serializable()
        .serial_version_uid(5)
        .field("v", FieldType::INT)]);
    let reader_registry = registry_with(vec![ClassDef::new("test.Thing")
        .externalizable()
        .serial_version_uid(5)
        .read_external(|_| Ok(()))
        .write_external(|_| Ok(()))]);
    let mut heap = Heap::new();
    let obj = writer_registry.new_instance(&mut heap, "test.Thing").unwrap();
    let reason = incompatibility(transfer(
        &writer_registry,
        &mut heap,
        Value::Ref(obj),
        &reader_registry,
    ));
    assert_eq!(reason, Incompatibility::SerializableMismatch);
}

#[test]
fn ev_042_local_class_no_longer_serializable() {
    let writer_registry = registry_with(vec![ClassDef::new("test.Thing")
        .serializable()
        .serial_version_uid(5)]);
    let reader_registry = registry_with(vec![ClassDef::new("test.Thing")]);
    let mut heap = Heap::new();
    let obj = writer_registry.new_instance(&mut heap, "test.Thing").unwrap();
    let reason = incompatibility(transfer(
        &writer_registry,
        &mut heap,
        Value::Ref(obj),
        &reader_registry,
    ));
    assert_eq!(reason, Incompatibility::NotDeserializable);
}

#[test]
fn ev_043_enum_descriptor_bound_to_plain_class() {
    let writer_registry = registry_with(vec![ClassDef::enumeration("test.Color", ["RED"])]);
    let reader_registry = registry_with(vec![ClassDef::new("test.Color").serializable()]);
    let mut heap = Heap::new();
    let red = writer_registry.enum_constant(&mut heap, "test.Color", "RED").unwrap();
    let reason = incompatibility(transfer(
        &writer_registry,
        &mut heap,
        Value::Ref(red),
        &reader_registry,
    ));
    assert_eq!(reason, Incompatibility::EnumMismatch { stream_is_enum: true });
}

/// Maps stream class names onto local ones
struct Renamer {
    from: &'static str,
    to: &'static str,
}

impl ReadHooks for Renamer {
    fn resolve_class(&self, registry: &ClassRegistry, name: &str) -> Option<Arc<ClassDef>> {
        let name = if name == self.from { self.to } else { name };
        registry.lookup(name)
    }
}

fn moved_point(name: &str) -> ClassDef {
    ClassDef::new(name)
        .serializable()
        .serial_version_uid(1)
        .field("x", FieldType::INT)
        .field("y", FieldType::INT)
}

#[test]
fn ev_044_class_moved_between_packages() {
    let writer_registry = registry_with(vec![moved_point("old.pkg.Point")]);
    let reader_registry = registry_with(vec![moved_point("new.pkg.Point")]);
    let mut heap = Heap::new();
    let p = writer_registry.new_instance(&mut heap, "old.pkg.Point").unwrap();
    heap.set_field(p, "x", Value::Int(10)).unwrap();
    let bytes = write_objects(&writer_registry, &mut heap, &[Value::Ref(p)]);

    let mut copy = Heap::new();
    let read = reader(&reader_registry, &bytes)
        .with_hooks(Arc::new(Renamer {
            from: "old.pkg.Point",
            to: "new.pkg.Point",
        }))
        .read_object(&mut copy)
        .unwrap();
    assert_eq!(copy.class_name_of(id(read)), Some("new.pkg.Point"));
    assert_eq!(field(&copy, read, "x"), Value::Int(10));
}

#[test]
fn ev_045_resolved_class_with_other_base_name() {
    let writer_registry = registry_with(vec![moved_point("old.pkg.Point")]);
    let reader_registry = registry_with(vec![moved_point("new.pkg.Spot")]);
    let mut heap = Heap::new();
    let p = writer_registry.new_instance(&mut heap, "old.pkg.Point").unwrap();
    let bytes = write_objects(&writer_registry, &mut heap, &[Value::Ref(p)]);

    let mut copy = Heap::new();
    let result = reader(&reader_registry, &bytes)
        .with_hooks(Arc::new(Renamer {
            from: "old.pkg.Point",
            to: "new.pkg.Spot",
        }))
        .read_object(&mut copy);
    match result {
        Err(Error::IncompatibleClass {
            reason: Incompatibility::NameMismatch { local },
            ..
        }) => assert_eq!(local, "new.pkg.Spot"),
        other => panic!("expected name mismatch, got {:?}", other),
    }
}
