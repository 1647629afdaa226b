//! Handle tables
//!
//! Every class descriptor, string, array, enum constant, class object and
//! instance gets a handle when it is first written or read. Handles are
//! assigned from [`BASE_WIRE_HANDLE`](crate::format::BASE_WIRE_HANDLE) in
//! strictly increasing order, identically on both sides, so a back-reference
//! record only needs the handle number.
//!
//! Unshared occurrences consume a handle but leave no mapping (writer) or a
//! tombstone (reader): a back-reference to them is invalid.
//!
//! The reader also remembers which objects reached an unresolvable class
//! while their content was read. An object that closes a cycle back onto an
//! enclosing object still being read is failed together with it.

use crate::class::ClassDescriptor;
use crate::format::BASE_WIRE_HANDLE;
use objstream_core::{Error, LimitError, ObjectId, Result, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Writer-side identity of a handled item
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HandleKey {
    /// Heap object identity
    Object(ObjectId),
    /// Class descriptor, by class name
    Descriptor(String),
    /// Field type signature string
    TypeString(String),
}

/// Writer handle table: identity → handle
#[derive(Debug, Default)]
pub struct WriteHandles {
    map: HashMap<HandleKey, i32>,
    aliases: HashMap<ObjectId, Value>,
    next: usize,
}

impl WriteHandles {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next handle; `None` keys consume a handle without a mapping
    pub fn register(&mut self, key: Option<HandleKey>, limit: usize) -> Result<i32> {
        if self.next >= limit {
            return Err(LimitError::TooManyReferences {
                actual: self.next + 1,
                max: limit,
            }
            .into());
        }
        let handle = BASE_WIRE_HANDLE + self.next as i32;
        self.next += 1;
        if let Some(key) = key {
            self.map.insert(key, handle);
        }
        Ok(handle)
    }

    /// Handle previously assigned to this key
    pub fn lookup(&self, key: &HandleKey) -> Option<i32> {
        self.map.get(key).copied()
    }

    /// Record that `original` was written as `replacement`
    pub fn alias(&mut self, original: ObjectId, replacement: Value) {
        self.aliases.insert(original, replacement);
    }

    /// Replacement recorded for a value, or the value itself
    pub fn substitute(&self, value: Value) -> Value {
        match value {
            Value::Ref(id) => self.aliases.get(&id).copied().unwrap_or(value),
            other => other,
        }
    }

    /// Number of handles assigned
    pub fn len(&self) -> usize {
        self.next
    }

    /// Whether no handle has been assigned
    pub fn is_empty(&self) -> bool {
        self.next == 0
    }

    /// Forget every handle and alias
    pub fn clear(&mut self) {
        self.map.clear();
        self.aliases.clear();
        self.next = 0;
    }
}

/// Reader-side handle entry
#[derive(Debug, Clone)]
pub enum HandleEntry {
    /// Object value (string, array, enum constant, class object, instance)
    Object(Value),
    /// Completed class descriptor
    Descriptor(Arc<ClassDescriptor>),
    /// String read outside object position (field type signature, enum
    /// constant name); materialised in the heap if referenced as a value
    Text(String),
    /// Record still being read
    Pending,
    /// Read in unshared mode
    Unshared,
    /// Record whose class could not be resolved
    Failed(String),
}

/// Reader handle table: handle → entry
#[derive(Debug, Default)]
pub struct ReadHandles {
    entries: Vec<HandleEntry>,
    /// Objects whose content depends on an unresolvable class
    failures: HashMap<usize, String>,
    /// Objects whose content is still being read, innermost last
    open: Vec<usize>,
    /// Finished objects that fail if the keyed open object fails
    dependents: HashMap<usize, Vec<usize>>,
}

impl ReadHandles {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, returning its table index
    pub fn assign(&mut self, entry: HandleEntry, limit: usize) -> Result<usize> {
        if self.entries.len() >= limit {
            return Err(LimitError::TooManyReferences {
                actual: self.entries.len() + 1,
                max: limit,
            }
            .into());
        }
        self.entries.push(entry);
        Ok(self.entries.len() - 1)
    }

    /// Replace the entry at an index
    pub fn set(&mut self, index: usize, entry: HandleEntry) {
        if let Some(slot) = self.entries.get_mut(index) {
            *slot = entry;
        }
    }

    /// Entry for a wire handle
    pub fn lookup(&self, handle: i32) -> Result<&HandleEntry> {
        let index = handle
            .checked_sub(BASE_WIRE_HANDLE)
            .filter(|i| *i >= 0)
            .map(|i| i as usize);
        index
            .and_then(|i| self.entries.get(i))
            .ok_or_else(|| {
                Error::malformed(format!("invalid handle value: {:08X}", handle))
            })
    }

    /// Entry at a table index
    pub fn get(&self, index: usize) -> Option<&HandleEntry> {
        self.entries.get(index)
    }

    /// Number of handles assigned
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no handle has been assigned
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mark an object as being read
    pub fn open(&mut self, index: usize) {
        self.open.push(index);
    }

    /// Whether an object's content is still being read
    pub fn is_open(&self, index: usize) -> bool {
        self.open.binary_search(&index).is_ok()
    }

    /// Close an object opened with [`open`](Self::open)
    ///
    /// `missing` is the first unresolvable class its content depends on;
    /// `low` is the earliest enclosing open object it refers back to, whose
    /// failure it then shares.
    pub fn finish(&mut self, index: usize, missing: Option<&str>, low: Option<usize>) {
        match self.open.last() {
            Some(last) if *last == index => {
                self.open.pop();
            }
            _ => self.open.retain(|i| *i != index),
        }
        match (missing, low) {
            (Some(class), _) => self.fail(index, class),
            (None, Some(low)) => self.dependents.entry(low).or_default().push(index),
            (None, None) => self.resolve(index),
        }
    }

    /// Unresolvable class an object depends on, if any
    pub fn failure(&self, index: usize) -> Option<&str> {
        self.failures.get(&index).map(String::as_str)
    }

    fn fail(&mut self, index: usize, class: &str) {
        let mut pending = vec![index];
        while let Some(i) = pending.pop() {
            if self.failures.contains_key(&i) {
                continue;
            }
            self.failures.insert(i, class.to_string());
            if let Some(deps) = self.dependents.remove(&i) {
                pending.extend(deps);
            }
        }
    }

    fn resolve(&mut self, index: usize) {
        let mut pending = vec![index];
        while let Some(i) = pending.pop() {
            if let Some(deps) = self.dependents.remove(&i) {
                pending.extend(deps);
            }
        }
    }

    /// Forget every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.failures.clear();
        self.open.clear();
        self.dependents.clear();
    }
}
