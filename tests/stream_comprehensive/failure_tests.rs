//! Failure Tests
//!
//! Write failures recorded in the stream, corrupt and truncated input,
//! resource limits, file-driven configuration and dynamic proxies.
//!
//! Test ID Conventions:
//! - FL-xxx: Failure tests

use crate::common::*;
use std::sync::Arc;
use tempfile::TempDir;

fn plain_class() -> ClassDef {
    ClassDef::new("test.Plain").field("v", FieldType::INT)
}

fn node_chain(registry: &ClassRegistry, heap: &mut Heap, len: i32) -> ObjectId {
    let head = new_node(registry, heap, 0);
    let mut tail = head;
    for i in 1..len {
        let next = new_node(registry, heap, i);
        heap.set_field(tail, "next", Value::Ref(next)).unwrap();
        tail = next;
    }
    head
}

// =============================================================================
// Write failures (FL-001 to FL-010)
// =============================================================================

#[test]
fn fl_001_not_serializable_field_is_recorded_in_stream() {
    let registry = registry_with(vec![holder_class(), point_class(), plain_class()]);
    let mut heap = Heap::new();
    let plain = registry.new_instance(&mut heap, "test.Plain").unwrap();
    let holder = new_holder(&registry, &mut heap, Value::Ref(plain), Value::Null);
    let point = new_point(&registry, &mut heap, 5, 6);

    let mut bytes = Vec::new();
    {
        let mut writer = ObjectWriter::new(&mut bytes, Arc::clone(&registry)).unwrap();
        match writer.write_object(&mut heap, Value::Ref(holder)) {
            Err(Error::NotSerializable(class)) => assert_eq!(class, "test.Plain"),
            other => panic!("expected not serializable, got {:?}", other),
        }
        writer.write_object(&mut heap, Value::Ref(point)).unwrap();
        writer.close().unwrap();
    }
    assert!(bytes.contains(&TC_EXCEPTION));

    let mut copy = Heap::new();
    let mut r = reader(&registry, &bytes);
    match r.read_object(&mut copy) {
        Err(Error::WriteAborted { detail }) => assert!(detail.contains("not_serializable")),
        other => panic!("expected write aborted, got {:?}", other),
    }
    let read = r.read_object(&mut copy).unwrap();
    assert_eq!(field(&copy, read, "x"), Value::Int(5));
}

#[test]
fn fl_002_not_serializable_top_level() {
    let registry = registry_with(vec![plain_class()]);
    let mut heap = Heap::new();
    let plain = registry.new_instance(&mut heap, "test.Plain").unwrap();

    let mut bytes = Vec::new();
    {
        let mut writer = ObjectWriter::new(&mut bytes, Arc::clone(&registry)).unwrap();
        let result = writer.write_object(&mut heap, Value::Ref(plain));
        assert!(matches!(result, Err(Error::NotSerializable(_))));
        writer.close().unwrap();
    }
    assert_eq!(bytes[4], TC_EXCEPTION);
    assert!(matches!(
        read_one(&registry, &bytes),
        Err(Error::WriteAborted { .. })
    ));
}

#[test]
fn fl_003_writer_depth_limit() {
    let registry = fixture_registry();
    let mut heap = Heap::new();
    let head = node_chain(&registry, &mut heap, 40);

    let mut bytes = Vec::new();
    let mut writer =
        ObjectWriter::with_config(&mut bytes, Arc::clone(&registry), StreamConfig::for_testing())
            .unwrap();
    assert!(matches!(
        writer.write_object(&mut heap, Value::Ref(head)),
        Err(Error::Limit(_))
    ));
}

// =============================================================================
// Corrupt input (FL-011 to FL-020)
// =============================================================================

#[test]
fn fl_011_bad_header() {
    let registry = registry();
    let bytes = [0xCA, 0xFE, 0x00, 0x05];
    assert!(matches!(
        ObjectReader::new(&bytes[..], Arc::clone(&registry)),
        Err(Error::MalformedStream(_))
    ));
    let bytes = [0xAC, 0xED, 0x00, 0x04];
    assert!(matches!(
        ObjectReader::new(&bytes[..], Arc::clone(&registry)),
        Err(Error::MalformedStream(_))
    ));
}

#[test]
fn fl_012_empty_input() {
    let registry = registry();
    let bytes: [u8; 0] = [];
    assert!(matches!(
        ObjectReader::new(&bytes[..], registry),
        Err(Error::Io(_))
    ));
}

#[test]
fn fl_013_truncated_object() {
    let registry = fixture_registry();
    let mut heap = Heap::new();
    let p = new_point(&registry, &mut heap, 1, 2);
    let bytes = write_objects(&registry, &mut heap, &[Value::Ref(p)]);
    let truncated = &bytes[..bytes.len() - 3];
    assert!(matches!(read_one(&registry, truncated), Err(Error::Io(_))));
}

#[test]
fn fl_014_unknown_type_code() {
    let registry = registry();
    let bytes = [0xAC, 0xED, 0x00, 0x05, 0x99];
    assert!(matches!(
        read_one(&registry, &bytes),
        Err(Error::MalformedStream(_))
    ));
}

#[test]
fn fl_015_dangling_back_reference() {
    let registry = registry();
    let bytes = [0xAC, 0xED, 0x00, 0x05, TC_REFERENCE, 0x00, 0x7E, 0x00, 0x05];
    assert!(matches!(
        read_one(&registry, &bytes),
        Err(Error::MalformedStream(_))
    ));
}

#[test]
fn fl_016_class_descriptor_in_value_position() {
    let registry = fixture_registry();
    let mut heap = Heap::new();
    let p = new_point(&registry, &mut heap, 1, 2);
    let bytes = write_objects(&registry, &mut heap, &[Value::Ref(p)]);
    // Drop the TC_OBJECT tag so the descriptor is the first record
    let mut corrupt = bytes[..4].to_vec();
    corrupt.extend_from_slice(&bytes[5..]);
    assert!(matches!(
        read_one(&registry, &corrupt),
        Err(Error::MalformedStream(_))
    ));
}

// =============================================================================
// Limits and configuration (FL-021 to FL-030)
// =============================================================================

#[test]
fn fl_021_reader_depth_limit() {
    let registry = fixture_registry();
    let mut heap = Heap::new();
    let head = node_chain(&registry, &mut heap, 40);
    let bytes = write_objects(&registry, &mut heap, &[Value::Ref(head)]);

    let mut copy = Heap::new();
    let result =
        reader_with(&registry, &bytes, StreamConfig::for_testing()).read_object(&mut copy);
    assert!(matches!(result, Err(Error::Limit(_))));
    assert!(read_one(&registry, &bytes).is_ok());
}

#[test]
fn fl_022_array_length_limit() {
    let registry = registry();
    let mut heap = Heap::new();
    let arr = heap.alloc_array("[I", ArrayData::Int(vec![1; 150]));
    let bytes = write_objects(&registry, &mut heap, &[Value::Ref(arr)]);

    let mut copy = Heap::new();
    let result =
        reader_with(&registry, &bytes, StreamConfig::for_testing()).read_object(&mut copy);
    assert!(matches!(result, Err(Error::Limit(_))));
}

#[test]
fn fl_023_reference_limit() {
    let registry = fixture_registry();
    let mut heap = Heap::new();
    let points: Vec<Value> = (0..20)
        .map(|i| Value::Ref(new_point(&registry, &mut heap, i, i)))
        .collect();
    let arr = heap.alloc_array("[Ljava.lang.Object;", ArrayData::Reference(points));
    let bytes = write_objects(&registry, &mut heap, &[Value::Ref(arr)]);

    let config = StreamConfig::default().with_limits(StreamLimits {
        max_references: 10,
        ..Default::default()
    });
    let mut copy = Heap::new();
    let result = reader_with(&registry, &bytes, config).read_object(&mut copy);
    assert!(matches!(result, Err(Error::Limit(_))));
}

#[test]
fn fl_024_limits_loaded_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("objstream.toml");
    StreamConfig::default()
        .with_max_depth(4)
        .write_to_file(&path)
        .unwrap();
    let config = StreamConfig::from_file(&path).unwrap();
    assert_eq!(config.limits.max_depth, 4);

    let registry = fixture_registry();
    let mut heap = Heap::new();
    let head = node_chain(&registry, &mut heap, 10);
    let bytes = write_objects(&registry, &mut heap, &[Value::Ref(head)]);

    let mut copy = Heap::new();
    let result = reader_with(&registry, &bytes, config).read_object(&mut copy);
    assert!(matches!(result, Err(Error::Limit(_))));
}

#[test]
fn fl_025_invalid_config_rejected_by_reader() {
    let registry = registry();
    let bytes = write_with(&registry, StreamConfig::default(), |w| w.write_int(1));
    let config = StreamConfig::default().with_block_size(8);
    assert!(matches!(
        ObjectReader::with_config(&bytes[..], registry, config),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn fl_026_chain_within_default_depth() {
    let registry = fixture_registry();
    let max_depth = StreamLimits::default().max_depth;
    let mut heap = Heap::new();
    // the null after the last node takes one level too
    let len = max_depth as i32 - 1;
    let head = node_chain(&registry, &mut heap, len);

    let (copy, read) = round_trip(&registry, &mut heap, Value::Ref(head));
    let mut cursor = read;
    let mut count = 0;
    while let Value::Ref(_) = cursor {
        cursor = field(&copy, cursor, "next");
        count += 1;
    }
    assert_eq!(count, len);
}

#[test]
fn fl_027_chain_past_default_depth_is_a_limit_error() {
    let registry = fixture_registry();
    let max_depth = StreamLimits::default().max_depth;
    let mut heap = Heap::new();
    let head = node_chain(&registry, &mut heap, max_depth as i32 + 10);

    let mut bytes = Vec::new();
    {
        let mut writer = ObjectWriter::new(&mut bytes, Arc::clone(&registry)).unwrap();
        assert!(matches!(
            writer.write_object(&mut heap, Value::Ref(head)),
            Err(Error::Limit(_))
        ));
    }

    let deeper = StreamConfig::default().with_max_depth(max_depth + 20);
    let bytes = write_with(&registry, deeper, |w| w.write_object(&mut heap, Value::Ref(head)));
    assert!(matches!(read_one(&registry, &bytes), Err(Error::Limit(_))));
}

// =============================================================================
// Proxies (FL-031 to FL-040)
// =============================================================================

fn proxy_classes() -> Vec<ClassDef> {
    vec![
        ClassDef::interface("test.Greeter"),
        ClassDef::new("test.Handler")
            .serializable()
            .implements("java.lang.reflect.InvocationHandler")
            .serial_version_uid(60)
            .field("greeting", FieldType::string()),
    ]
}

fn write_proxy(registry: &Arc<ClassRegistry>) -> Vec<u8> {
    let class = registry
        .resolve_proxy(&["test.Greeter".to_string()])
        .unwrap();
    let mut heap = Heap::new();
    let proxy = registry.new_instance(&mut heap, class.name()).unwrap();
    let handler = registry.new_instance(&mut heap, "test.Handler").unwrap();
    let greeting = string(&mut heap, "hello");
    heap.set_field(handler, "greeting", greeting).unwrap();
    heap.set_field(proxy, "h", Value::Ref(handler)).unwrap();
    write_objects(registry, &mut heap, &[Value::Ref(proxy)])
}

#[test]
fn fl_031_proxy_round_trip() {
    let writer_registry = registry_with(proxy_classes());
    let bytes = write_proxy(&writer_registry);
    assert!(bytes.contains(&TC_PROXYCLASSDESC));

    let reader_registry = registry_with(proxy_classes());
    let (copy, read) = read_one(&reader_registry, &bytes).unwrap();
    let class = copy.class_name_of(id(read)).unwrap();
    assert!(class.starts_with("objstream.proxy.$Proxy"));
    let handler = field(&copy, read, "h");
    assert_eq!(text(&copy, field(&copy, handler, "greeting")), "hello");
}

#[test]
fn fl_032_proxy_interface_missing() {
    let writer_registry = registry_with(proxy_classes());
    let bytes = write_proxy(&writer_registry);

    let reader_registry = registry_with(vec![ClassDef::new("test.Handler")
        .serializable()
        .implements("java.lang.reflect.InvocationHandler")
        .serial_version_uid(60)
        .field("greeting", FieldType::string())]);
    assert!(matches!(
        read_one(&reader_registry, &bytes),
        Err(Error::ClassNotFound(_))
    ));
}

#[test]
fn fl_033_proxy_descriptor_bound_to_ordinary_class() {
    struct ToHandler;
    impl ReadHooks for ToHandler {
        fn resolve_proxy_class(
            &self,
            registry: &ClassRegistry,
            _interfaces: &[String],
        ) -> Option<Arc<ClassDef>> {
            registry.lookup("test.Handler")
        }
    }

    let writer_registry = registry_with(proxy_classes());
    let bytes = write_proxy(&writer_registry);
    let reader_registry = registry_with(proxy_classes());
    let mut copy = Heap::new();
    let result = reader(&reader_registry, &bytes)
        .with_hooks(Arc::new(ToHandler))
        .read_object(&mut copy);
    assert!(matches!(
        result,
        Err(Error::IncompatibleClass {
            reason: Incompatibility::ProxyMismatch,
            ..
        })
    ));
}
