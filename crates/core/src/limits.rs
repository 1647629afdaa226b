//! Resource limits for decoding
//!
//! Streams come from untrusted sources; these limits bound the resources a
//! single decode may consume. Violations return `Error::Limit`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Resource limits applied while reading (and, for depth, writing) a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamLimits {
    /// Maximum object nesting depth (default: 128)
    ///
    /// Each level of nesting is a level of native recursion on the thread
    /// doing the read or write. Raise this together with that thread's stack
    /// size.
    pub max_depth: usize,

    /// Maximum array length (default: 16M elements)
    pub max_array_length: usize,

    /// Maximum number of handles in one generation (default: 16M)
    pub max_references: usize,

    /// Maximum encoded string length in bytes (default: 64MB)
    pub max_string_bytes: usize,
}

impl Default for StreamLimits {
    fn default() -> Self {
        StreamLimits {
            max_depth: 128,
            max_array_length: 16 * 1024 * 1024,
            max_references: 16 * 1024 * 1024,
            max_string_bytes: 64 * 1024 * 1024, // 64MB
        }
    }
}

impl StreamLimits {
    /// Create limits with small values for testing
    pub fn with_small_limits() -> Self {
        StreamLimits {
            max_depth: 16,
            max_array_length: 100,
            max_references: 100,
            max_string_bytes: 1000,
        }
    }

    /// Validate a nesting depth
    pub fn check_depth(&self, depth: usize) -> Result<(), LimitError> {
        if depth > self.max_depth {
            return Err(LimitError::NestingTooDeep {
                actual: depth,
                max: self.max_depth,
            });
        }
        Ok(())
    }

    /// Validate an array length read from the stream
    pub fn check_array_length(&self, length: usize) -> Result<(), LimitError> {
        if length > self.max_array_length {
            return Err(LimitError::ArrayTooLong {
                actual: length,
                max: self.max_array_length,
            });
        }
        Ok(())
    }

    /// Validate the number of live handles
    pub fn check_references(&self, count: usize) -> Result<(), LimitError> {
        if count > self.max_references {
            return Err(LimitError::TooManyReferences {
                actual: count,
                max: self.max_references,
            });
        }
        Ok(())
    }

    /// Validate an encoded string length read from the stream
    pub fn check_string_bytes(&self, length: u64) -> Result<(), LimitError> {
        if length > self.max_string_bytes as u64 {
            return Err(LimitError::StringTooLong {
                actual: length,
                max: self.max_string_bytes,
            });
        }
        Ok(())
    }

    /// Reject limits that would make every stream fail
    pub fn validate(&self) -> Result<(), LimitError> {
        if self.max_depth == 0 {
            return Err(LimitError::Invalid("max_depth must be at least 1".to_string()));
        }
        if self.max_references == 0 {
            return Err(LimitError::Invalid(
                "max_references must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Limit validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitError {
    /// Object graph nested deeper than allowed
    #[error("nesting depth {actual} exceeds maximum {max}")]
    NestingTooDeep {
        /// Depth reached
        actual: usize,
        /// Configured maximum
        max: usize,
    },

    /// Array longer than allowed
    #[error("array length {actual} exceeds maximum {max}")]
    ArrayTooLong {
        /// Length found in the stream
        actual: usize,
        /// Configured maximum
        max: usize,
    },

    /// Too many handles assigned in one generation
    #[error("reference count {actual} exceeds maximum {max}")]
    TooManyReferences {
        /// Handles assigned
        actual: usize,
        /// Configured maximum
        max: usize,
    },

    /// String longer than allowed
    #[error("string length {actual} exceeds maximum {max}")]
    StringTooLong {
        /// Length found in the stream
        actual: u64,
        /// Configured maximum
        max: usize,
    },

    /// Limit values themselves are unusable
    #[error("invalid limits: {0}")]
    Invalid(String),
}
