//! objstream - object-graph serialization streams
//!
//! Writes graphs of objects held in a [`Heap`] to a compact tagged byte
//! stream and rebuilds equivalent graphs from it. Shared references and
//! cycles survive the round trip, classes may evolve between writer and
//! reader, and classes can take over their own encoding with per-class
//! hooks.
//!
//! # Quick Start
//!
//! ```
//! use objstream::{ClassDef, ClassRegistry, FieldType, Heap, ObjectReader, ObjectWriter, Value};
//! use std::sync::Arc;
//!
//! # fn main() -> objstream::Result<()> {
//! let registry = Arc::new(ClassRegistry::new());
//! registry.register(
//!     ClassDef::new("demo.Point")
//!         .serializable()
//!         .field("x", FieldType::INT)
//!         .field("y", FieldType::INT),
//! )?;
//!
//! let mut heap = Heap::new();
//! let p = registry.new_instance(&mut heap, "demo.Point")?;
//! heap.set_field(p, "x", Value::Int(1))?;
//!
//! let mut bytes = Vec::new();
//! let mut writer = ObjectWriter::new(&mut bytes, Arc::clone(&registry))?;
//! writer.write_object(&mut heap, Value::Ref(p))?;
//! writer.close()?;
//!
//! let mut copy = Heap::new();
//! let mut reader = ObjectReader::new(&bytes[..], registry)?;
//! let q = reader.read_object(&mut copy)?;
//! assert!(heap.isomorphic(Value::Ref(p), &copy, q));
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - `objstream-core`: values, the object heap, type codes, limits, errors
//! - `objstream-stream`: the wire format, class registry and descriptors,
//!   handle tables, `ObjectWriter` and `ObjectReader`

pub use objstream_core::*;
pub use objstream_stream::*;
