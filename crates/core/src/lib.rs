//! Core types for objstream
//!
//! This crate defines the foundational types shared by the encoder and the
//! decoder:
//! - Value: primitive values and object references
//! - Heap: arena of objects (instances, strings, arrays, enum constants,
//!   class objects) addressed by ObjectId
//! - InstanceLayout: per-class field slot layout
//! - PrimitiveType / FieldType / Modifiers: type codes and access flags
//! - StreamLimits: resource limits for decoding untrusted streams
//! - Error: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod heap;
pub mod limits;
pub mod types;
pub mod value;

pub use error::{Error, Incompatibility, OptionalData, Result};
pub use heap::{
    Array, ArrayData, EnumConstant, Heap, HeapObject, Instance, InstanceLayout, ObjectId,
    SlotInfo, CLASS_CLASS, STRING_CLASS,
};
pub use limits::{LimitError, StreamLimits};
pub use types::{
    array_component, class_name_to_signature, signature_to_class_name, FieldType, Modifiers,
    PrimitiveType,
};
pub use value::Value;
