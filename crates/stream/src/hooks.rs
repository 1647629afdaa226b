//! Stream-level hooks
//!
//! Writers and readers consult these on every object, after the class-level
//! hooks. The defaults pass everything through unchanged.

use crate::class::{ClassDef, ClassRegistry};
use objstream_core::{Heap, Result, Value};
use std::sync::Arc;

/// Write-side object substitution
pub trait WriteHooks: Send + Sync {
    /// Substitute an object before it is written
    ///
    /// Called for every non-null object that is not a back-reference, after
    /// the class-level `write_replace`.
    fn replace_object(&self, _heap: &mut Heap, value: Value) -> Result<Value> {
        Ok(value)
    }
}

/// Read-side class resolution and object substitution
pub trait ReadHooks: Send + Sync {
    /// Local class for a class name found in the stream
    fn resolve_class(&self, registry: &ClassRegistry, name: &str) -> Option<Arc<ClassDef>> {
        registry.lookup(name)
    }

    /// Local proxy class implementing the given interfaces
    fn resolve_proxy_class(
        &self,
        registry: &ClassRegistry,
        interfaces: &[String],
    ) -> Option<Arc<ClassDef>> {
        registry.resolve_proxy(interfaces)
    }

    /// Substitute an object after it has been read
    fn resolve_object(&self, _heap: &mut Heap, value: Value) -> Result<Value> {
        Ok(value)
    }
}

/// Hooks that change nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl WriteHooks for DefaultHooks {}
impl ReadHooks for DefaultHooks {}
