//! Object stream encoder and decoder
//!
//! This crate implements the tagged record stream:
//! - format: wire constants (magic, tags, descriptor flags)
//! - utf: modified UTF-8
//! - class: class definitions, descriptors, version ids and the registry
//! - handles: writer and reader handle tables
//! - writer / reader: `ObjectWriter` and `ObjectReader` with their per-class
//!   hook frames
//! - hooks: stream-level substitution and class resolution
//! - config: stream configuration (TOML-loadable)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub(crate) mod block;
pub mod class;
pub(crate) mod codec;
pub mod config;
pub mod format;
pub mod handles;
pub mod hooks;
pub mod reader;
pub mod utf;
pub mod writer;

pub use class::{
    ClassDef, ClassDescriptor, ClassHooks, ClassRegistry, ConstructorDef, FieldBinding,
    FieldDef, FieldDescriptor, MethodDef, PersistentField,
};
pub use config::{ConfigError, HandleScope, StreamConfig};
pub use format::ProtocolVersion;
pub use hooks::{DefaultHooks, ReadHooks, WriteHooks};
pub use reader::{GetFields, ObjectReader, ReadFrame, ValidationCallback};
pub use writer::{ObjectWriter, PutFields, WriteFrame};

pub use objstream_core;
