//! Shared test utilities for the integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

pub use objstream::format::*;
pub use objstream::{
    ArrayData, ClassDef, ClassRegistry, ConstructorDef, Error, FieldType, GetFields,
    HandleScope, Heap, HeapObject, Incompatibility, Modifiers, ObjectId, ObjectReader,
    ObjectWriter, OptionalData, PersistentField, ProtocolVersion, ReadFrame, ReadHooks, Result,
    StreamConfig, StreamLimits, Value, WriteFrame, WriteHooks,
};
use std::sync::{Arc, Once};

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output through the test harness's captured output
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

// ============================================================================
// Registries and fixture classes
// ============================================================================

/// Fresh registry holding only the built-in classes
pub fn registry() -> Arc<ClassRegistry> {
    init_tracing();
    Arc::new(ClassRegistry::new())
}

/// Registry with the given classes registered in order
pub fn registry_with(defs: Vec<ClassDef>) -> Arc<ClassRegistry> {
    let registry = registry();
    for def in defs {
        registry.register(def).expect("register class");
    }
    registry
}

/// `test.Point { int x; int y; }`
pub fn point_class() -> ClassDef {
    ClassDef::new("test.Point")
        .serializable()
        .serial_version_uid(1)
        .field("x", FieldType::INT)
        .field("y", FieldType::INT)
}

/// `test.Node { int value; Node next; Object peer; }`
pub fn node_class() -> ClassDef {
    ClassDef::new("test.Node")
        .serializable()
        .serial_version_uid(2)
        .field("value", FieldType::INT)
        .field("next", FieldType::object("test.Node"))
        .field("peer", FieldType::object("java.lang.Object"))
}

/// `test.Holder { Object a; Object b; }`
pub fn holder_class() -> ClassDef {
    ClassDef::new("test.Holder")
        .serializable()
        .serial_version_uid(3)
        .field("a", FieldType::object("java.lang.Object"))
        .field("b", FieldType::object("java.lang.Object"))
}

/// Registry with Point, Node and Holder
pub fn fixture_registry() -> Arc<ClassRegistry> {
    registry_with(vec![point_class(), node_class(), holder_class()])
}

// ============================================================================
// Heap helpers
// ============================================================================

pub fn new_point(registry: &ClassRegistry, heap: &mut Heap, x: i32, y: i32) -> ObjectId {
    let p = registry.new_instance(heap, "test.Point").expect("new Point");
    heap.set_field(p, "x", Value::Int(x)).unwrap();
    heap.set_field(p, "y", Value::Int(y)).unwrap();
    p
}

pub fn new_holder(registry: &ClassRegistry, heap: &mut Heap, a: Value, b: Value) -> ObjectId {
    let h = registry.new_instance(heap, "test.Holder").expect("new Holder");
    heap.set_field(h, "a", a).unwrap();
    heap.set_field(h, "b", b).unwrap();
    h
}

pub fn new_node(registry: &ClassRegistry, heap: &mut Heap, value: i32) -> ObjectId {
    let n = registry.new_instance(heap, "test.Node").expect("new Node");
    heap.set_field(n, "value", Value::Int(value)).unwrap();
    n
}

pub fn string(heap: &mut Heap, s: &str) -> Value {
    Value::Ref(heap.alloc_string(s))
}

/// Object id of a reference value, panicking on null or primitives
pub fn id(value: Value) -> ObjectId {
    value.object_id().expect("reference value")
}

pub fn field(heap: &Heap, value: Value, name: &str) -> Value {
    heap.get_field(id(value), name).expect("field")
}

pub fn text(heap: &Heap, value: Value) -> String {
    heap.string_value(value).expect("string value").to_string()
}

// ============================================================================
// Stream helpers
// ============================================================================

/// Bytes produced by running `f` against a fresh writer
pub fn write_with(
    registry: &Arc<ClassRegistry>,
    config: StreamConfig,
    f: impl FnOnce(&mut ObjectWriter<'_>) -> Result<()>,
) -> Vec<u8> {
    let mut bytes = Vec::new();
    {
        let mut writer =
            ObjectWriter::with_config(&mut bytes, Arc::clone(registry), config).expect("writer");
        f(&mut writer).expect("write");
        writer.close().expect("close");
    }
    bytes
}

/// Bytes of the given top-level objects, written with the default config
pub fn write_objects(registry: &Arc<ClassRegistry>, heap: &mut Heap, values: &[Value]) -> Vec<u8> {
    write_with(registry, StreamConfig::default(), |w| {
        for value in values {
            w.write_object(heap, *value)?;
        }
        Ok(())
    })
}

pub fn reader<'a>(registry: &Arc<ClassRegistry>, bytes: &'a [u8]) -> ObjectReader<'a> {
    ObjectReader::new(bytes, Arc::clone(registry)).expect("reader")
}

pub fn reader_with<'a>(
    registry: &Arc<ClassRegistry>,
    bytes: &'a [u8],
    config: StreamConfig,
) -> ObjectReader<'a> {
    ObjectReader::with_config(bytes, Arc::clone(registry), config).expect("reader")
}

/// Read one top-level object into a fresh heap
pub fn read_one(registry: &Arc<ClassRegistry>, bytes: &[u8]) -> Result<(Heap, Value)> {
    let mut heap = Heap::new();
    let value = reader(registry, bytes).read_object(&mut heap)?;
    Ok((heap, value))
}

/// Write `value` with `writer_registry`, read it back with `reader_registry`
pub fn transfer(
    writer_registry: &Arc<ClassRegistry>,
    heap: &mut Heap,
    value: Value,
    reader_registry: &Arc<ClassRegistry>,
) -> Result<(Heap, Value)> {
    let bytes = write_objects(writer_registry, heap, &[value]);
    read_one(reader_registry, &bytes)
}

/// Write and read back with one registry, asserting the graphs match
pub fn round_trip(registry: &Arc<ClassRegistry>, heap: &mut Heap, value: Value) -> (Heap, Value) {
    let (copy, read) = transfer(registry, heap, value, registry).expect("round trip");
    assert!(
        heap.isomorphic(value, &copy, read),
        "graph read back differs from graph written"
    );
    (copy, read)
}

/// Position of the first occurrence of `needle` in `haystack`
pub fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
