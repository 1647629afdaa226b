//! Property Tests
//!
//! Randomized graphs, strings and primitive sequences. Identity structure,
//! not just values, must survive a write/read cycle.
//!
//! Test ID Conventions:
//! - PROP-xxx: Property tests

use crate::common::*;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Item {
    Int(i32),
    Long(i64),
    Double(f64),
    Utf(String),
    Point(i32, i32),
}

fn item() -> impl Strategy<Value = Item> {
    prop_oneof![
        any::<i32>().prop_map(Item::Int),
        any::<i64>().prop_map(Item::Long),
        any::<f64>().prop_map(Item::Double),
        ".{0,40}".prop_map(Item::Utf),
        (any::<i32>(), any::<i32>()).prop_map(|(x, y)| Item::Point(x, y)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// prop_001: arbitrary reference graphs among holders keep their shape
    #[test]
    fn prop_001_random_graph_shape(
        edges in prop::collection::vec((any::<Option<u8>>(), any::<Option<u8>>()), 1..12),
    ) {
        let registry = fixture_registry();
        let mut heap = Heap::new();
        let holders: Vec<ObjectId> = edges
            .iter()
            .map(|_| new_holder(&registry, &mut heap, Value::Null, Value::Null))
            .collect();
        let target = |i: Option<u8>| match i {
            Some(i) => Value::Ref(holders[i as usize % holders.len()]),
            None => Value::Null,
        };
        for (holder, (a, b)) in holders.iter().zip(edges.iter()) {
            heap.set_field(*holder, "a", target(*a)).unwrap();
            heap.set_field(*holder, "b", target(*b)).unwrap();
        }

        let root = Value::Ref(holders[0]);
        let (copy, read) = transfer(&registry, &mut heap, root, &registry).unwrap();
        prop_assert!(heap.isomorphic(root, &copy, read));
    }

    /// prop_002: arbitrary text survives the string record
    #[test]
    fn prop_002_string_records(s in ".*") {
        let registry = registry();
        let mut heap = Heap::new();
        let value = string(&mut heap, &s);
        let (copy, read) = transfer(&registry, &mut heap, value, &registry).unwrap();
        prop_assert_eq!(text(&copy, read), s);
    }

    /// prop_003: int arrays of any content
    #[test]
    fn prop_003_int_arrays(values in prop::collection::vec(any::<i32>(), 0..300)) {
        let registry = registry();
        let mut heap = Heap::new();
        let arr = heap.alloc_array("[I", ArrayData::Int(values.clone()));
        let (copy, read) = transfer(&registry, &mut heap, Value::Ref(arr), &registry).unwrap();
        prop_assert_eq!(&copy.array(id(read)).unwrap().data, &ArrayData::Int(values));
    }

    /// prop_004: primitives and objects interleaved at any block size
    #[test]
    fn prop_004_interleaved_items(
        items in prop::collection::vec(item(), 0..40),
        block_size in 128usize..2048,
    ) {
        let registry = fixture_registry();
        let mut heap = Heap::new();
        let config = StreamConfig::default().with_block_size(block_size);
        let bytes = write_with(&registry, config.clone(), |w| {
            for item in &items {
                match item {
                    Item::Int(v) => w.write_int(*v)?,
                    Item::Long(v) => w.write_long(*v)?,
                    Item::Double(v) => w.write_double(*v)?,
                    Item::Utf(s) => w.write_utf(s)?,
                    Item::Point(x, y) => {
                        let p = new_point(&registry, &mut heap, *x, *y);
                        w.write_object(&mut heap, Value::Ref(p))?
                    }
                }
            }
            Ok(())
        });

        let mut copy = Heap::new();
        let mut r = reader_with(&registry, &bytes, config);
        for item in &items {
            match item {
                Item::Int(v) => prop_assert_eq!(r.read_int().unwrap(), *v),
                Item::Long(v) => prop_assert_eq!(r.read_long().unwrap(), *v),
                Item::Double(v) => {
                    prop_assert_eq!(r.read_double().unwrap().to_bits(), v.to_bits())
                }
                Item::Utf(s) => prop_assert_eq!(&r.read_utf().unwrap(), s),
                Item::Point(x, y) => {
                    let read = r.read_object(&mut copy).unwrap();
                    prop_assert_eq!(field(&copy, read, "x"), Value::Int(*x));
                    prop_assert_eq!(field(&copy, read, "y"), Value::Int(*y));
                }
            }
        }
    }
}
