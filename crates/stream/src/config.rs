//! Stream configuration
//!
//! Controls the externalizable protocol, block-data buffer size, handle
//! lifetime and decode limits. Writer and reader of one stream must agree on
//! `handle_scope`.
//!
//! Configurations can be loaded from TOML:
//!
//! ```toml
//! protocol = "v2"
//! block_size = 1024
//! handle_scope = "per_call"
//!
//! [limits]
//! max_depth = 128
//! ```

use crate::format::{ProtocolVersion, DEFAULT_BLOCK_SIZE, MAX_BLOCK_HEADER_LEN};
use objstream_core::{Error, LimitError, StreamLimits};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Lifetime of handle assignments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HandleScope {
    /// Cleared after each top-level read or write
    #[default]
    PerCall,
    /// Kept until a reset record
    Stream,
}

/// Stream configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Externalizable encoding (default: V2)
    pub protocol: ProtocolVersion,
    /// Block-data buffer size in bytes (default: 1024)
    pub block_size: usize,
    /// Handle lifetime (default: per call)
    pub handle_scope: HandleScope,
    /// Resource limits
    pub limits: StreamLimits,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            protocol: ProtocolVersion::V2,
            block_size: DEFAULT_BLOCK_SIZE,
            handle_scope: HandleScope::PerCall,
            limits: StreamLimits::default(),
        }
    }
}

impl StreamConfig {
    /// Create config for testing
    ///
    /// Uses small limits and a small block buffer so tests exercise
    /// long-block and limit paths with little data.
    pub fn for_testing() -> Self {
        StreamConfig {
            block_size: 128,
            limits: StreamLimits::with_small_limits(),
            ..Default::default()
        }
    }

    /// Set the externalizable protocol
    pub fn with_protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set the block-data buffer size
    pub fn with_block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Set the handle lifetime
    pub fn with_handle_scope(mut self, scope: HandleScope) -> Self {
        self.handle_scope = scope;
        self
    }

    /// Set the resource limits
    pub fn with_limits(mut self, limits: StreamLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the maximum nesting depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.limits.max_depth = depth;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size <= MAX_BLOCK_HEADER_LEN / 2 {
            return Err(ConfigError::BlockSize(self.block_size));
        }
        if self.block_size > i32::MAX as usize {
            return Err(ConfigError::BlockSize(self.block_size));
        }
        self.limits.validate()?;
        Ok(())
    }

    /// Read and parse config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: StreamConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize this config to TOML and write it to the given path
    pub fn write_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Block size out of range
    #[error("Invalid block size {0}: must be between 128 and i32::MAX")]
    BlockSize(usize),

    /// Invalid limits
    #[error("Invalid limits: {0}")]
    Limits(#[from] LimitError),

    /// Config file could not be read
    #[error("Failed to read config file '{path}': {reason}")]
    Read {
        /// File path
        path: String,
        /// Underlying error
        reason: String,
    },

    /// Config file could not be parsed
    #[error("Failed to parse config file '{path}': {reason}")]
    Parse {
        /// File path
        path: String,
        /// Underlying error
        reason: String,
    },

    /// Config could not be serialized
    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    /// Config file could not be written
    #[error("Failed to write config file '{path}': {reason}")]
    Write {
        /// File path
        path: String,
        /// Underlying error
        reason: String,
    },
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}
