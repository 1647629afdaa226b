//! Error types for object streams
//!
//! This module defines all error types used by the encoder, the decoder and
//! the class model. We use `thiserror` for automatic `Display` and `Error`
//! trait implementations.

use crate::limits::LimitError;
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type alias for object stream operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for object streams
///
/// Every variant is fatal for the stream operation that produced it; the
/// engine never retries.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying transport failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Unexpected tag, bad header or otherwise unparseable stream
    #[error("Stream corrupted: {0}")]
    MalformedStream(String),

    /// Stream class cannot be mapped onto the local class
    #[error("Incompatible class {class}: {reason}")]
    IncompatibleClass {
        /// Class name as found in the stream
        class: String,
        /// Why the classes are incompatible
        reason: Incompatibility,
    },

    /// Referenced class cannot be resolved locally
    #[error("Class not found: {0}")]
    ClassNotFound(String),

    /// Object's class has no serialization capability
    #[error("Not serializable: {0}")]
    NotSerializable(String),

    /// Bad back-reference, unshared violation or rejected object
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// Primitive data where an object was expected, or the reverse
    #[error("Optional data present: {0}")]
    OptionalData(OptionalData),

    /// Default field read/write used outside a per-class routine
    #[error("Not active: {0}")]
    NotActive(String),

    /// The writer aborted and recorded its failure in the stream
    #[error("Writing aborted: {detail}")]
    WriteAborted {
        /// Failure description transmitted by the writer
        detail: String,
    },

    /// Field value does not fit the field's declared type
    #[error("Field {class}.{field} type mismatch: expected {expected}, got {actual}")]
    FieldMismatch {
        /// Declaring class
        class: String,
        /// Field name
        field: String,
        /// Declared type
        expected: String,
        /// Type actually supplied
        actual: String,
    },

    /// Named field is not a serializable field of the class
    #[error("No serializable field {field} in class {class}")]
    UnknownField {
        /// Class name
        class: String,
        /// Field name
        field: String,
    },

    /// Modified UTF-8 encoding exceeds the 65535-byte short form
    #[error("String too long: encoded length {length} exceeds 65535 bytes")]
    StringTooLong {
        /// Encoded length in bytes
        length: usize,
    },

    /// A configured stream limit was exceeded
    #[error("Limit exceeded: {0}")]
    Limit(#[from] LimitError),

    /// Invalid class definition supplied to a registry
    #[error("Invalid class definition: {0}")]
    InvalidDefinition(String),

    /// Invalid operation or state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Invalid stream configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Recording a write failure in the stream itself failed
    #[error("Stream corrupted while recording write failure ({original}): {secondary}")]
    ExceptionRecordFailed {
        /// The failure that triggered the exception record
        original: Box<Error>,
        /// The failure raised while writing the exception record
        secondary: Box<Error>,
    },
}

impl Error {
    /// Create an `IncompatibleClass` error
    pub fn incompatible(class: impl Into<String>, reason: Incompatibility) -> Self {
        Error::IncompatibleClass {
            class: class.into(),
            reason,
        }
    }

    /// Create a `MalformedStream` error
    pub fn malformed(detail: impl Into<String>) -> Self {
        Error::MalformedStream(detail.into())
    }

    /// Short, stable name of the error kind
    ///
    /// Used as the `kind` of write-failure records.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::MalformedStream(_) => "malformed_stream",
            Error::IncompatibleClass { .. } => "incompatible_class",
            Error::ClassNotFound(_) => "class_not_found",
            Error::NotSerializable(_) => "not_serializable",
            Error::InvalidObject(_) => "invalid_object",
            Error::OptionalData(_) => "optional_data",
            Error::NotActive(_) => "not_active",
            Error::WriteAborted { .. } => "write_aborted",
            Error::FieldMismatch { .. } => "field_mismatch",
            Error::UnknownField { .. } => "unknown_field",
            Error::StringTooLong { .. } => "string_too_long",
            Error::Limit(_) => "limit_exceeded",
            Error::InvalidDefinition(_) => "invalid_definition",
            Error::InvalidOperation(_) => "invalid_operation",
            Error::InvalidConfig(_) => "invalid_config",
            Error::ExceptionRecordFailed { .. } => "exception_record_failed",
        }
    }
}

/// Reason a stream class cannot be bound to a local class
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incompatibility {
    /// Version identifiers differ
    VersionMismatch {
        /// Version id recorded in the stream
        stream: i64,
        /// Version id of the local class
        local: i64,
    },
    /// Base names (after the last '.') differ
    NameMismatch {
        /// Name of the local class the stream class resolved to
        local: String,
    },
    /// One side is serializable, the other externalizable
    SerializableMismatch,
    /// Local class cannot be deserialized with the recorded capability
    NotDeserializable,
    /// Enum descriptor bound to a non-enum class or the reverse
    EnumMismatch {
        /// Whether the stream descriptor is an enum
        stream_is_enum: bool,
    },
    /// Proxy descriptor bound to a non-proxy class or the reverse
    ProxyMismatch,
    /// No accessible no-arg constructor on the first non-serializable ancestor
    NoValidConstructor,
    /// Declared persistent field without a matching instance field
    UnmatchedField(String),
    /// Descriptor is internally inconsistent
    InvalidDescriptor(String),
}

impl fmt::Display for Incompatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Incompatibility::VersionMismatch { stream, local } => write!(
                f,
                "local class incompatible: stream classdesc serialVersionUID = {}, local class serialVersionUID = {}",
                stream, local
            ),
            Incompatibility::NameMismatch { local } => write!(
                f,
                "local class name {} incompatible with stream class name",
                local
            ),
            Incompatibility::SerializableMismatch => {
                write!(f, "Serializable incompatible with Externalizable")
            }
            Incompatibility::NotDeserializable => write!(f, "class invalid for deserialization"),
            Incompatibility::EnumMismatch { stream_is_enum: true } => {
                write!(f, "cannot bind enum descriptor to a non-enum class")
            }
            Incompatibility::EnumMismatch {
                stream_is_enum: false,
            } => write!(f, "cannot bind non-enum descriptor to an enum class"),
            Incompatibility::ProxyMismatch => {
                write!(f, "cannot bind proxy descriptor to a non-proxy class")
            }
            Incompatibility::NoValidConstructor => write!(f, "no valid constructor"),
            Incompatibility::UnmatchedField(name) => {
                write!(f, "unmatched serializable field declared: {}", name)
            }
            Incompatibility::InvalidDescriptor(detail) => write!(f, "{}", detail),
        }
    }
}

/// Which side of the primitive/object boundary a read ran into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionalData {
    /// An object read found buffered primitive data
    Primitive {
        /// Bytes remaining in the current data block
        length: usize,
    },
    /// An object read reached the end of a class's custom data
    EndOfData,
    /// A primitive read found a tagged object record
    ObjectRecord {
        /// Tag byte of the record
        tag: u8,
    },
}

impl fmt::Display for OptionalData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionalData::Primitive { length } => {
                write!(f, "{} bytes of primitive data where an object was expected", length)
            }
            OptionalData::EndOfData => write!(f, "end of custom data where an object was expected"),
            OptionalData::ObjectRecord { tag } => {
                write!(f, "object record 0x{:02X} where primitive data was expected", tag)
            }
        }
    }
}
