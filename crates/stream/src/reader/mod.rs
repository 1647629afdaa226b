//! Object stream decoder
//!
//! `ObjectReader` rebuilds object graphs from the tagged record stream into
//! a [`Heap`]. Handles are assigned in the same order the writer assigned
//! them, so back-references resolve to the very object read earlier and
//! cycles close on the partially built instance.
//!
//! Stream class descriptors are bound to local classes when read: version
//! ids, base names and capabilities must agree, and fields are matched by
//! name. Fields only the stream has are read and discarded; fields only the
//! local class has keep their constructor values.
//!
//! A record whose class cannot be resolved is still consumed, so the stream
//! stays in sync. The outermost read fails with `ClassNotFound` only when
//! the unresolvable record is reachable from the returned graph: values of
//! stream-only fields and skipped custom data are read and dropped without
//! failing, while an object that holds one anywhere in its content carries
//! the failure to later back-references.
//! Validation callbacks registered during a read run once the outermost
//! read has succeeded.

mod frame;
mod validation;

pub use frame::{GetFields, ReadFrame};
pub use validation::ValidationCallback;

use crate::block::BlockInput;
use crate::class::descriptor::assign_offsets;
use crate::class::{
    base_name, ClassDef, ClassDescriptor, ClassRegistry, FieldBinding, FieldDescriptor,
    ReadObjectHook,
};
use crate::codec;
use crate::config::{HandleScope, StreamConfig};
use crate::format::*;
use crate::handles::{HandleEntry, ReadHandles};
use crate::hooks::{DefaultHooks, ReadHooks};
use crate::utf;
use crate::writer::FrameKind;
use byteorder::{BigEndian, ReadBytesExt};
use objstream_core::{
    array_component, ArrayData, Error, FieldType, Heap, Incompatibility, ObjectId, OptionalData,
    PrimitiveType, Result, Value, CLASS_CLASS, STRING_CLASS,
};
use std::io::{self, Read};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use validation::ValidationList;

/// Object stream decoder
pub struct ObjectReader<'r> {
    input: BlockInput<'r>,
    registry: Arc<ClassRegistry>,
    hooks: Arc<dyn ReadHooks>,
    config: StreamConfig,
    handles: ReadHandles,
    validations: ValidationList,
    depth: usize,
    /// Set once a custom routine has consumed a class's default fields and
    /// the stream recorded no custom data after them
    default_data_end: bool,
    /// First unresolvable class the record being read depends on
    missing_class: Option<String>,
    /// Earliest enclosing open object the record being read refers back to
    low_dep: Option<usize>,
}

/// Dependency state of an enclosing record, set aside while a nested one
/// is read
struct Dependencies {
    missing: Option<String>,
    low: Option<usize>,
}

/// One class level of an object's data, root first
struct DataSlot {
    desc: Arc<ClassDescriptor>,
    local: Option<Arc<ClassDef>>,
    has_data: bool,
}

fn invalid_descriptor(class: &str, detail: impl Into<String>) -> Error {
    Error::incompatible(class, Incompatibility::InvalidDescriptor(detail.into()))
}

impl<'r> ObjectReader<'r> {
    /// Create a reader with the default configuration and check the stream
    /// header
    pub fn new(source: impl Read + 'r, registry: Arc<ClassRegistry>) -> Result<Self> {
        Self::with_config(source, registry, StreamConfig::default())
    }

    /// Create a reader with an explicit configuration
    pub fn with_config(
        source: impl Read + 'r,
        registry: Arc<ClassRegistry>,
        config: StreamConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut input = BlockInput::new(Box::new(source));
        let magic = input.read_u16::<BigEndian>()?;
        let version = input.read_u16::<BigEndian>()?;
        if magic != STREAM_MAGIC || version != STREAM_VERSION {
            return Err(Error::malformed(format!(
                "invalid stream header: {:04X}{:04X}",
                magic, version
            )));
        }
        input.set_block_mode(true)?;
        debug!(
            target: "objstream::reader",
            handle_scope = ?config.handle_scope,
            "Opened object stream reader"
        );
        Ok(ObjectReader {
            input,
            registry,
            hooks: Arc::new(DefaultHooks),
            config,
            handles: ReadHandles::new(),
            validations: ValidationList::default(),
            depth: 0,
            default_data_end: false,
            missing_class: None,
            low_dep: None,
        })
    }

    /// Install stream-level hooks
    pub fn with_hooks(mut self, hooks: Arc<dyn ReadHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Class registry used to resolve stream classes
    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    /// Read an object graph
    pub fn read_object(&mut self, heap: &mut Heap) -> Result<Value> {
        self.read_top(heap, false)
    }

    /// Read an object that must not be referenced again
    ///
    /// Later back-references to it fail with `InvalidObject`.
    pub fn read_unshared(&mut self, heap: &mut Heap) -> Result<Value> {
        self.read_top(heap, true)
    }

    fn read_top(&mut self, heap: &mut Heap, unshared: bool) -> Result<Value> {
        let result = self.read_value(heap, unshared);
        let result = match (result, self.missing_class.take()) {
            (Ok(_), Some(class)) => {
                warn!(target: "objstream::reader", class = %class, "Stream references unknown class");
                Err(Error::ClassNotFound(class))
            }
            (Ok(value), None) => self.validations.run(heap).map(|()| value),
            (Err(e), _) => Err(e),
        };
        self.validations.clear();
        self.default_data_end = false;
        self.low_dep = None;
        if self.config.handle_scope == HandleScope::PerCall {
            self.handles.clear();
        }
        result
    }

    /// Register a callback to run after the outermost read completes
    ///
    /// Only allowed while an object is being read, i.e. from a custom read
    /// routine.
    pub(crate) fn register_validation(
        &mut self,
        priority: i32,
        callback: impl FnOnce(&mut Heap) -> Result<()> + 'static,
    ) -> Result<()> {
        if self.depth == 0 {
            return Err(Error::NotActive("stream inactive".to_string()));
        }
        self.validations.register(priority, Box::new(callback));
        Ok(())
    }

    /// Release the source
    pub fn close(self) -> Result<()> {
        debug!(
            target: "objstream::reader",
            handles = self.handles.len(),
            "Closed object stream reader"
        );
        Ok(())
    }

    /// Read a `boolean`
    pub fn read_bool(&mut self) -> Result<bool> {
        let r = self.input.read_u8();
        self.primitive(r).map(|b| b != 0)
    }

    /// Read a `byte`
    pub fn read_byte(&mut self) -> Result<i8> {
        let r = self.input.read_i8();
        self.primitive(r)
    }

    /// Read a `char` (UTF-16 code unit)
    pub fn read_char(&mut self) -> Result<u16> {
        let r = self.input.read_u16::<BigEndian>();
        self.primitive(r)
    }

    /// Read a `short`
    pub fn read_short(&mut self) -> Result<i16> {
        let r = self.input.read_i16::<BigEndian>();
        self.primitive(r)
    }

    /// Read an `int`
    pub fn read_int(&mut self) -> Result<i32> {
        let r = self.input.read_i32::<BigEndian>();
        self.primitive(r)
    }

    /// Read a `long`
    pub fn read_long(&mut self) -> Result<i64> {
        let r = self.input.read_i64::<BigEndian>();
        self.primitive(r)
    }

    /// Read a `float`
    pub fn read_float(&mut self) -> Result<f32> {
        let r = self.input.read_f32::<BigEndian>();
        self.primitive(r)
    }

    /// Read a `double`
    pub fn read_double(&mut self) -> Result<f64> {
        let r = self.input.read_f64::<BigEndian>();
        self.primitive(r)
    }

    /// Fill `buf` with raw bytes
    pub fn read_fully(&mut self, buf: &mut [u8]) -> Result<()> {
        let r = self.input.read_exact(buf);
        self.primitive(r)
    }

    /// Read a length-prefixed modified UTF-8 string
    pub fn read_utf(&mut self) -> Result<String> {
        let len = self.input.read_u16::<BigEndian>();
        let len = self.primitive(len)? as usize;
        let mut buf = vec![0u8; len];
        let r = self.input.read_exact(&mut buf);
        self.primitive(r)?;
        utf::decode(&buf)
    }

    /// Skip up to `n` bytes, stopping early at the end of primitive data
    pub fn skip_bytes(&mut self, n: usize) -> Result<usize> {
        let r = io::copy(&mut (&mut self.input).take(n as u64), &mut io::sink());
        self.primitive(r).map(|skipped| skipped as usize)
    }

    /// Primitive bytes readable without crossing a record boundary
    pub fn available(&mut self) -> Result<usize> {
        let r = self.input.available();
        self.primitive(r)
    }

    fn primitive<T>(&mut self, result: io::Result<T>) -> Result<T> {
        let value = result.map_err(|e| self.read_error(e))?;
        self.check_reset()?;
        Ok(value)
    }

    /// Classify a failed primitive read
    fn read_error(&mut self, e: io::Error) -> Error {
        if e.kind() == io::ErrorKind::UnexpectedEof && self.input.block_mode() && self.input.at_end() {
            if let Ok(Some(tag)) = self.input.peek() {
                if tag != TC_ENDBLOCKDATA {
                    return Error::OptionalData(OptionalData::ObjectRecord { tag });
                }
            }
        }
        if e.kind() == io::ErrorKind::InvalidData {
            return Error::malformed(e.to_string());
        }
        Error::Io(e)
    }

    fn check_reset(&mut self) -> Result<()> {
        if self.input.take_reset() {
            self.handle_reset()?;
        }
        Ok(())
    }

    fn handle_reset(&mut self) -> Result<()> {
        if self.depth > 0 {
            return Err(Error::malformed(format!(
                "unexpected reset; recursion depth: {}",
                self.depth
            )));
        }
        self.handles.clear();
        debug!(target: "objstream::reader", "Stream reset");
        Ok(())
    }

    fn assign(&mut self, entry: HandleEntry) -> Result<usize> {
        self.handles.assign(entry, self.config.limits.max_references)
    }

    fn note_missing(&mut self, class: &str) {
        if self.missing_class.is_none() {
            self.missing_class = Some(class.to_string());
        }
    }

    /// Back-reference to an object: inherit its failure, or depend on it
    /// while it is still being read
    fn note_reference(&mut self, index: usize) {
        if let Some(class) = self.handles.failure(index) {
            let class = class.to_string();
            self.note_missing(&class);
        } else if self.handles.is_open(index) {
            self.low_dep = Some(self.low_dep.map_or(index, |low| low.min(index)));
        }
    }

    fn set_aside(&mut self) -> Dependencies {
        Dependencies {
            missing: self.missing_class.take(),
            low: self.low_dep.take(),
        }
    }

    fn open_record(&mut self, index: usize) -> Dependencies {
        self.handles.open(index);
        self.set_aside()
    }

    /// Attach what an object's content depended on to its handle, then
    /// merge it into the enclosing record
    fn close_record(&mut self, index: usize, outer: Dependencies) {
        let missing = self.missing_class.take();
        let low = self.low_dep.take().filter(|low| *low < index);
        self.handles.finish(index, missing.as_deref(), low);
        self.missing_class = outer.missing.or(missing);
        self.low_dep = match (outer.low, low) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }

    /// Read one object record and drop it
    ///
    /// Unresolvable classes inside the dropped value do not fail the read.
    fn discard_value(&mut self, heap: &mut Heap, unshared: bool) -> Result<()> {
        let outer = self.set_aside();
        let result = self.read_value(heap, unshared);
        self.missing_class = outer.missing;
        self.low_dep = outer.low;
        result.map(drop)
    }

    /// Point a handle at a substituted object; tombstones stay
    fn replace_entry(&mut self, index: usize, value: Value) {
        if let Some(HandleEntry::Object(_)) = self.handles.get(index) {
            self.handles.set(index, HandleEntry::Object(value));
        }
    }

    /// Read one object record
    pub(crate) fn read_value(&mut self, heap: &mut Heap, unshared: bool) -> Result<Value> {
        let old_mode = self.input.block_mode();
        if old_mode {
            let remaining = self.input.current_block_remaining();
            if remaining > 0 {
                return Err(Error::OptionalData(OptionalData::Primitive {
                    length: remaining,
                }));
            }
            if self.default_data_end {
                return Err(Error::OptionalData(OptionalData::EndOfData));
            }
            self.input.set_block_mode(false)?;
        }
        let result = self.read_record(heap, unshared, old_mode);
        let restored = self.input.set_block_mode(old_mode);
        let value = result?;
        restored?;
        Ok(value)
    }

    fn read_record(&mut self, heap: &mut Heap, unshared: bool, old_mode: bool) -> Result<Value> {
        let tag = loop {
            let tag = self.input.peek_tag()?;
            if tag != TC_RESET {
                break tag;
            }
            self.input.read_u8()?;
            self.handle_reset()?;
        };
        self.depth += 1;
        let result = match self.config.limits.check_depth(self.depth) {
            Ok(()) => self.read_tagged(heap, tag, unshared, old_mode),
            Err(e) => Err(e.into()),
        };
        self.depth -= 1;
        result
    }

    fn read_tagged(&mut self, heap: &mut Heap, tag: u8, unshared: bool, old_mode: bool) -> Result<Value> {
        match tag {
            TC_NULL => {
                self.input.read_u8()?;
                Ok(Value::Null)
            }
            TC_REFERENCE => self.read_handle(heap, unshared),
            TC_CLASS => self.read_class(heap, unshared),
            TC_STRING | TC_LONGSTRING => self.read_string_record(heap, unshared),
            TC_ARRAY => self.read_array_record(heap, unshared),
            TC_ENUM => self.read_enum_record(heap, unshared),
            TC_OBJECT => self.read_object_record(heap, unshared),
            TC_EXCEPTION => Err(self.read_fatal_exception()?),
            TC_BLOCKDATA | TC_BLOCKDATALONG | TC_ENDBLOCKDATA => {
                Err(self.unexpected_block(tag, old_mode))
            }
            _ => Err(unexpected_tag(tag)),
        }
    }

    fn read_string_record(&mut self, heap: &mut Heap, unshared: bool) -> Result<Value> {
        let (value, index) = self.read_string(heap, unshared)?;
        self.check_resolve(heap, value, index)
    }

    fn read_array_record(&mut self, heap: &mut Heap, unshared: bool) -> Result<Value> {
        let (value, index) = self.read_array(heap, unshared)?;
        self.check_resolve(heap, value, index)
    }

    fn read_enum_record(&mut self, heap: &mut Heap, unshared: bool) -> Result<Value> {
        let (value, index) = self.read_enum(heap, unshared)?;
        self.check_resolve(heap, value, index)
    }

    fn read_object_record(&mut self, heap: &mut Heap, unshared: bool) -> Result<Value> {
        let (value, index) = self.read_ordinary_object(heap, unshared)?;
        self.check_resolve(heap, value, index)
    }

    /// Block-data markers met where an object record was expected
    #[inline(never)]
    fn unexpected_block(&mut self, tag: u8, old_mode: bool) -> Error {
        match (tag, old_mode) {
            (TC_ENDBLOCKDATA, true) => Error::OptionalData(OptionalData::EndOfData),
            (TC_ENDBLOCKDATA, false) => Error::malformed("unexpected end of block data"),
            (_, false) => Error::malformed("unexpected block data"),
            (_, true) => {
                if let Err(e) = self.input.set_block_mode(true) {
                    return e;
                }
                if let Err(e) = self.input.refill() {
                    return e.into();
                }
                Error::OptionalData(OptionalData::Primitive {
                    length: self.input.current_block_remaining(),
                })
            }
        }
    }

    /// Stream-level substitution of a freshly read object
    fn check_resolve(&mut self, heap: &mut Heap, value: Value, index: usize) -> Result<Value> {
        if value.is_null() || matches!(self.handles.get(index), Some(HandleEntry::Failed(_))) {
            return Ok(value);
        }
        let replacement = self.hooks.resolve_object(heap, value)?;
        if replacement != value {
            trace_replaced(value, replacement, "Object resolved");
            self.replace_entry(index, replacement);
        }
        Ok(replacement)
    }

    fn read_wire_handle(&mut self) -> Result<(i32, usize)> {
        self.input.read_u8()?;
        let handle = self.input.read_i32::<BigEndian>()?;
        self.handles.lookup(handle)?;
        Ok((handle, (handle - BASE_WIRE_HANDLE) as usize))
    }

    fn read_handle(&mut self, heap: &mut Heap, unshared: bool) -> Result<Value> {
        let (handle, index) = self.read_wire_handle()?;
        if unshared {
            return Err(Error::InvalidObject(
                "cannot read back reference as unshared".to_string(),
            ));
        }
        match self.handles.lookup(handle)?.clone() {
            HandleEntry::Object(value) => {
                self.note_reference(index);
                Ok(value)
            }
            HandleEntry::Text(s) => {
                let id = heap.alloc_string(s);
                self.handles.set(index, HandleEntry::Object(Value::Ref(id)));
                Ok(Value::Ref(id))
            }
            HandleEntry::Unshared => Err(Error::InvalidObject(
                "cannot read back reference to unshared object".to_string(),
            )),
            HandleEntry::Failed(class) => {
                self.note_missing(&class);
                Ok(Value::Null)
            }
            HandleEntry::Pending => Err(Error::malformed(format!(
                "reference to incomplete record {:08X}",
                handle
            ))),
            HandleEntry::Descriptor(desc) => Err(Error::malformed(format!(
                "reference to class descriptor {} in object position",
                desc.name()
            ))),
        }
    }

    fn read_class(&mut self, heap: &mut Heap, unshared: bool) -> Result<Value> {
        self.input.read_u8()?;
        let desc = self.required_desc(heap)?;
        let (value, entry) = match desc.local_class() {
            Some(def) => {
                let id = heap.class_object(def.name());
                (Value::Ref(id), HandleEntry::Object(Value::Ref(id)))
            }
            None => {
                self.note_missing(desc.name());
                (Value::Null, HandleEntry::Failed(desc.name().to_string()))
            }
        };
        self.assign(if unshared { HandleEntry::Unshared } else { entry })?;
        Ok(value)
    }

    fn read_string_body(&mut self) -> Result<String> {
        let tag = self.input.read_u8()?;
        let len = match tag {
            TC_STRING => u64::from(self.input.read_u16::<BigEndian>()?),
            TC_LONGSTRING => {
                let len = self.input.read_i64::<BigEndian>()?;
                u64::try_from(len)
                    .map_err(|_| Error::malformed(format!("negative string length: {}", len)))?
            }
            _ => return Err(Error::malformed(format!("invalid type code: {:02X}", tag))),
        };
        self.config.limits.check_string_bytes(len)?;
        let mut buf = vec![0u8; len as usize];
        self.input.read_exact(&mut buf)?;
        utf::decode(&buf)
    }

    fn read_string(&mut self, heap: &mut Heap, unshared: bool) -> Result<(Value, usize)> {
        let s = self.read_string_body()?;
        let id = heap.alloc_string(s);
        let entry = if unshared {
            HandleEntry::Unshared
        } else {
            HandleEntry::Object(Value::Ref(id))
        };
        Ok((Value::Ref(id), self.assign(entry)?))
    }

    /// String record that names something rather than being a value
    fn read_text(&mut self) -> Result<String> {
        let s = self.read_string_body()?;
        self.assign(HandleEntry::Text(s.clone()))?;
        Ok(s)
    }

    fn read_type_string(&mut self, heap: &Heap) -> Result<String> {
        match self.input.peek_tag()? {
            TC_REFERENCE => {
                let (handle, _) = self.read_wire_handle()?;
                match self.handles.lookup(handle)? {
                    HandleEntry::Text(s) => Ok(s.clone()),
                    HandleEntry::Object(value) => heap
                        .string_value(*value)
                        .map(str::to_string)
                        .ok_or_else(|| {
                            Error::malformed(format!("handle {:08X} is not a string", handle))
                        }),
                    HandleEntry::Unshared => Err(Error::InvalidObject(
                        "cannot read back reference to unshared object".to_string(),
                    )),
                    _ => Err(Error::malformed(format!(
                        "handle {:08X} is not a string",
                        handle
                    ))),
                }
            }
            TC_STRING | TC_LONGSTRING => self.read_text(),
            tag => Err(Error::malformed(format!("invalid type code: {:02X}", tag))),
        }
    }

    fn read_class_desc(&mut self, heap: &mut Heap) -> Result<Option<Arc<ClassDescriptor>>> {
        match self.input.peek_tag()? {
            TC_NULL => {
                self.input.read_u8()?;
                Ok(None)
            }
            TC_REFERENCE => {
                let (handle, _) = self.read_wire_handle()?;
                match self.handles.lookup(handle)? {
                    HandleEntry::Descriptor(desc) => Ok(Some(Arc::clone(desc))),
                    _ => Err(Error::malformed(format!(
                        "handle {:08X} is not a class descriptor",
                        handle
                    ))),
                }
            }
            TC_CLASSDESC => self.read_non_proxy_desc(heap).map(Some),
            TC_PROXYCLASSDESC => self.read_proxy_desc(heap).map(Some),
            tag => Err(Error::malformed(format!("invalid type code: {:02X}", tag))),
        }
    }

    fn required_desc(&mut self, heap: &mut Heap) -> Result<Arc<ClassDescriptor>> {
        self.read_class_desc(heap)?
            .ok_or_else(|| Error::malformed("null class descriptor"))
    }

    fn read_non_proxy_desc(&mut self, heap: &mut Heap) -> Result<Arc<ClassDescriptor>> {
        self.input.read_u8()?;
        let index = self.assign(HandleEntry::Pending)?;
        let name = self.read_utf()?;
        let suid = self.input.read_i64::<BigEndian>()?;
        let flags = self.input.read_u8()?;
        let externalizable = flags & SC_EXTERNALIZABLE != 0;
        let sflag = flags & SC_SERIALIZABLE != 0;
        if externalizable && sflag {
            return Err(invalid_descriptor(
                &name,
                "serializable and externalizable flags conflict",
            ));
        }
        let is_enum = flags & SC_ENUM != 0;
        if is_enum && suid != 0 {
            return Err(invalid_descriptor(
                &name,
                format!("enum descriptor has non-zero serialVersionUID: {}", suid),
            ));
        }
        let count = self.input.read_i16::<BigEndian>()?;
        if count < 0 {
            return Err(Error::malformed(format!(
                "negative field count {} for {}",
                count, name
            )));
        }
        if is_enum && count != 0 {
            return Err(invalid_descriptor(
                &name,
                format!("enum descriptor has non-zero field count: {}", count),
            ));
        }

        let mut fields = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let code = self.input.read_u8()?;
            let field_name = self.read_utf()?;
            let field_type = if code == b'L' || code == b'[' {
                let signature = self.read_type_string(heap)?;
                FieldType::from_signature(&signature)
            } else {
                PrimitiveType::from_code(code).map(FieldType::Primitive)
            };
            let field_type = field_type.ok_or_else(|| {
                invalid_descriptor(&name, format!("invalid descriptor for field {}", field_name))
            })?;
            fields.push(FieldDescriptor::new(field_name, field_type, false));
        }
        let (prim_data_size, num_obj_fields) =
            assign_offsets(&mut fields).map_err(|reason| Error::incompatible(&name, reason))?;

        let local = self.hooks.resolve_class(&self.registry, &name);
        self.input.set_block_mode(true)?;
        self.skip_custom_data(heap)?;
        let superclass = self.read_class_desc(heap)?;

        let desc = ClassDescriptor {
            name,
            suid,
            serializable: externalizable || sflag,
            externalizable,
            has_write_object_data: flags & SC_WRITE_METHOD != 0,
            has_block_external_data: flags & SC_BLOCK_DATA != 0,
            is_enum,
            proxy_interfaces: None,
            fields,
            prim_data_size,
            num_obj_fields,
            superclass,
            local: None,
            deserialize_error: None,
            default_serialize_error: None,
        };
        let desc = Arc::new(self.bind_non_proxy(desc, local)?);
        self.handles
            .set(index, HandleEntry::Descriptor(Arc::clone(&desc)));
        trace!(
            target: "objstream::reader",
            class = %desc.name(),
            suid = desc.serial_version_uid(),
            resolved = desc.is_resolved(),
            "Read class descriptor"
        );
        Ok(desc)
    }

    /// Check a stream descriptor against its local class and match fields
    fn bind_non_proxy(
        &self,
        mut desc: ClassDescriptor,
        local: Option<Arc<ClassDef>>,
    ) -> Result<ClassDescriptor> {
        let Some(def) = local else {
            return Ok(desc);
        };
        let local_desc = self.registry.describe(def.name())?;
        let local_name = local_desc.name().to_string();
        if local_desc.is_proxy() {
            return Err(invalid_descriptor(
                &local_name,
                "cannot bind non-proxy descriptor to a proxy class",
            ));
        }
        if desc.is_enum != local_desc.is_enum() {
            return Err(Error::incompatible(
                &local_name,
                Incompatibility::EnumMismatch {
                    stream_is_enum: desc.is_enum,
                },
            ));
        }
        if desc.serializable == local_desc.is_serializable()
            && !def.is_array()
            && desc.suid != local_desc.serial_version_uid()
        {
            return Err(Error::incompatible(
                &local_name,
                Incompatibility::VersionMismatch {
                    stream: desc.suid,
                    local: local_desc.serial_version_uid(),
                },
            ));
        }
        if base_name(&desc.name) != base_name(&local_name) {
            return Err(Error::incompatible(
                &desc.name,
                Incompatibility::NameMismatch { local: local_name },
            ));
        }
        if !desc.is_enum {
            if desc.serializable == local_desc.is_serializable()
                && desc.externalizable != local_desc.is_externalizable()
            {
                return Err(Error::incompatible(
                    &local_name,
                    Incompatibility::SerializableMismatch,
                ));
            }
            if desc.serializable != local_desc.is_serializable()
                || desc.externalizable != local_desc.is_externalizable()
                || !desc.serializable
            {
                desc.deserialize_error = Some(Incompatibility::NotDeserializable);
            }
        }
        if desc.deserialize_error.is_none() {
            desc.deserialize_error = local_desc.deserialize_error.clone();
        }

        for field in desc.fields.iter_mut() {
            let Some(local_field) = local_desc.field(&field.name) else {
                continue;
            };
            let primitive = field.is_primitive() || local_field.is_primitive();
            field.binding = if primitive && field.type_code() != local_field.type_code() {
                FieldBinding::Mismatch {
                    local_type: local_field.field_type().clone(),
                }
            } else {
                local_field.binding().clone()
            };
            field.unshared = local_field.is_unshared();
        }
        desc.local = Some(def);
        Ok(desc)
    }

    fn read_proxy_desc(&mut self, heap: &mut Heap) -> Result<Arc<ClassDescriptor>> {
        self.input.read_u8()?;
        let index = self.assign(HandleEntry::Pending)?;
        let count = self.input.read_i32::<BigEndian>()?;
        if count < 0 {
            return Err(Error::malformed(format!("negative interface count: {}", count)));
        }
        if count > 65535 {
            return Err(Error::InvalidObject(format!(
                "interface limit exceeded: {}",
                count
            )));
        }
        let mut interfaces = Vec::with_capacity(count as usize);
        for _ in 0..count {
            interfaces.push(self.read_utf()?);
        }

        let local = self.hooks.resolve_proxy_class(&self.registry, &interfaces);
        self.input.set_block_mode(true)?;
        self.skip_custom_data(heap)?;
        let superclass = self.read_class_desc(heap)?;

        let mut desc = ClassDescriptor {
            name: format!("$Proxy({})", interfaces.join(",")),
            suid: 0,
            serializable: true,
            externalizable: false,
            has_write_object_data: false,
            has_block_external_data: false,
            is_enum: false,
            proxy_interfaces: Some(interfaces),
            fields: Vec::new(),
            prim_data_size: 0,
            num_obj_fields: 0,
            superclass,
            local: None,
            deserialize_error: None,
            default_serialize_error: None,
        };
        if let Some(def) = local {
            let local_desc = self.registry.describe(def.name())?;
            if !local_desc.is_proxy() {
                return Err(Error::incompatible(
                    local_desc.name(),
                    Incompatibility::ProxyMismatch,
                ));
            }
            desc.name = local_desc.name().to_string();
            desc.externalizable = local_desc.is_externalizable();
            desc.deserialize_error = local_desc.deserialize_error.clone();
            desc.local = Some(def);
        }
        let desc = Arc::new(desc);
        self.handles
            .set(index, HandleEntry::Descriptor(Arc::clone(&desc)));
        trace!(
            target: "objstream::reader",
            class = %desc.name(),
            resolved = desc.is_resolved(),
            "Read proxy class descriptor"
        );
        Ok(desc)
    }

    /// Discard class annotations or unread custom data up to the end marker
    fn skip_custom_data(&mut self, heap: &mut Heap) -> Result<()> {
        loop {
            if self.input.block_mode() {
                self.input.skip_block_data()?;
                self.check_reset()?;
                self.input.set_block_mode(false)?;
            }
            match self.input.peek_tag()? {
                TC_BLOCKDATA | TC_BLOCKDATALONG => {
                    self.input.set_block_mode(true)?;
                }
                TC_ENDBLOCKDATA => {
                    self.input.read_u8()?;
                    return Ok(());
                }
                _ => self.discard_value(heap, false)?,
            }
        }
    }

    fn read_array(&mut self, heap: &mut Heap, unshared: bool) -> Result<(Value, usize)> {
        self.input.read_u8()?;
        let desc = self.required_desc(heap)?;
        let len = self.input.read_i32::<BigEndian>()?;
        let len = usize::try_from(len)
            .map_err(|_| Error::malformed(format!("negative array length: {}", len)))?;
        self.config.limits.check_array_length(len)?;

        let Some(def) = desc.local_class().cloned() else {
            self.note_missing(desc.name());
            let entry = if unshared {
                HandleEntry::Unshared
            } else {
                HandleEntry::Failed(desc.name().to_string())
            };
            let index = self.assign(entry)?;
            for _ in 0..len {
                self.discard_value(heap, false)?;
            }
            return Ok((Value::Null, index));
        };
        let class_name = def.name().to_string();
        let component = array_component(&class_name)
            .ok_or_else(|| invalid_descriptor(&class_name, "not an array class"))?;

        let id = match component.primitive() {
            Some(p) => {
                let mut data = ArrayData::with_len(&component, len);
                for i in 0..len {
                    data.set(i, codec::read_primitive(&mut self.input, p)?)?;
                }
                heap.alloc_array(class_name.clone(), data)
            }
            None => heap.alloc_array(class_name.clone(), ArrayData::with_len(&component, len)),
        };
        let entry = if unshared {
            HandleEntry::Unshared
        } else {
            HandleEntry::Object(Value::Ref(id))
        };
        let index = self.assign(entry)?;

        if let Some(target) = component.class_name() {
            let outer = self.open_record(index);
            let result = self.read_elements(heap, id, len, &target);
            self.close_record(index, outer);
            result?;
        }
        Ok((Value::Ref(id), index))
    }

    fn read_elements(&mut self, heap: &mut Heap, id: ObjectId, len: usize, target: &str) -> Result<()> {
        let check = self.registry.contains(target);
        for i in 0..len {
            let element = self.read_value(heap, false)?;
            if let Value::Ref(element_id) = element {
                let class = heap.object(element_id)?.class_name();
                if check && !self.registry.is_assignable(class, target) {
                    return Err(element_mismatch(heap, id, i, class));
                }
            }
            heap.array_mut(id)
                .ok_or_else(|| not_an_array(id))?
                .data
                .set(i, element)?;
        }
        Ok(())
    }

    fn read_enum(&mut self, heap: &mut Heap, unshared: bool) -> Result<(Value, usize)> {
        self.input.read_u8()?;
        let desc = self.required_desc(heap)?;
        if !desc.is_enum() {
            return Err(invalid_descriptor(desc.name(), "non-enum class"));
        }
        let index = self.assign(if unshared {
            HandleEntry::Unshared
        } else {
            HandleEntry::Pending
        })?;
        let name = self.read_text()?;
        let Some(def) = desc.local_class() else {
            self.note_missing(desc.name());
            if !unshared {
                self.handles
                    .set(index, HandleEntry::Failed(desc.name().to_string()));
            }
            return Ok((Value::Null, index));
        };
        let id = self.registry.enum_constant(heap, def.name(), &name)?;
        if !unshared {
            self.handles.set(index, HandleEntry::Object(Value::Ref(id)));
        }
        Ok((Value::Ref(id), index))
    }

    fn read_ordinary_object(&mut self, heap: &mut Heap, unshared: bool) -> Result<(Value, usize)> {
        self.input.read_u8()?;
        let desc = self.required_desc(heap)?;
        desc.check_deserialize()?;
        let local = desc.local_class().cloned();
        if let Some(def) = &local {
            if def.name() == STRING_CLASS || def.name() == CLASS_CLASS || def.is_array() {
                return Err(invalid_descriptor(desc.name(), "invalid class descriptor"));
            }
        }

        let obj = match &local {
            Some(def) => Some(
                self.registry
                    .instantiate(heap, def.name(), desc.is_externalizable())?,
            ),
            None => {
                self.note_missing(desc.name());
                None
            }
        };
        let entry = match obj {
            _ if unshared => HandleEntry::Unshared,
            Some(id) => HandleEntry::Object(Value::Ref(id)),
            None => HandleEntry::Failed(desc.name().to_string()),
        };
        let index = self.assign(entry)?;
        trace_object(desc.name(), index, obj.is_some());

        let (Some(id), Some(def)) = (obj, local) else {
            self.read_object_data(heap, None, &desc)?;
            return Ok((Value::Null, index));
        };
        let outer = self.open_record(index);
        let result = self.read_object_data(heap, Some(id), &desc);
        self.close_record(index, outer);
        result?;
        let value = self.apply_read_resolve(heap, &def, id, index)?;
        Ok((value, index))
    }

    fn read_object_data(
        &mut self,
        heap: &mut Heap,
        obj: Option<ObjectId>,
        desc: &Arc<ClassDescriptor>,
    ) -> Result<()> {
        if desc.is_externalizable() {
            self.read_external_data(heap, obj, desc)
        } else {
            self.read_serial_data(heap, obj, desc)
        }
    }

    /// Class-level replacement of a freshly read instance
    #[inline(never)]
    fn apply_read_resolve(
        &mut self,
        heap: &mut Heap,
        def: &ClassDef,
        id: ObjectId,
        index: usize,
    ) -> Result<Value> {
        let value = Value::Ref(id);
        let Some(hook) = self.registry.find_read_resolve(def.name()) else {
            return Ok(value);
        };
        let replacement = hook(heap, id)?;
        if replacement != value {
            trace_replaced(value, replacement, "Object replaced by class");
            self.replace_entry(index, replacement);
        }
        Ok(replacement)
    }

    fn read_external_data(
        &mut self,
        heap: &mut Heap,
        obj: Option<ObjectId>,
        desc: &Arc<ClassDescriptor>,
    ) -> Result<()> {
        let blocked = desc.has_block_external_data();
        let (Some(id), Some(def)) = (obj, desc.local_class()) else {
            // raw payloads cannot be skipped without the class
            if !blocked {
                return Err(Error::ClassNotFound(desc.name().to_string()));
            }
            self.input.set_block_mode(true)?;
            return self.skip_custom_data(heap);
        };
        let hook = self
            .registry
            .find_hook(def.name(), |h| h.read_external.clone())
            .ok_or_else(|| {
                Error::InvalidDefinition(format!(
                    "externalizable class {} declares no read_external routine",
                    def.name()
                ))
            })?;
        if blocked {
            self.input.set_block_mode(true)?;
        }
        {
            let mut frame = ReadFrame::new(self, heap, id, Arc::clone(desc), FrameKind::External);
            hook(&mut frame)?;
        }
        if blocked {
            self.skip_custom_data(heap)?;
        }
        Ok(())
    }

    /// Class levels of an object, merging stream and local hierarchies
    ///
    /// Stream classes missing locally still carry data, which is read and
    /// dropped; local serializable classes missing from the stream get a
    /// slot without data.
    fn class_data_layout(&self, desc: &Arc<ClassDescriptor>) -> Result<Vec<DataSlot>> {
        let local_chain: Vec<Arc<ClassDef>> = match desc.local_class() {
            Some(def) => self
                .registry
                .hierarchy(def.name())?
                .into_iter()
                .take_while(|d| self.registry.is_serializable(d.name()))
                .collect(),
            None => Vec::new(),
        };
        let mut slots = Vec::new();
        let mut start = 0;
        for stream_desc in desc.hierarchy() {
            let search = stream_desc
                .local_class()
                .map(|def| def.name())
                .unwrap_or_else(|| stream_desc.name())
                .to_string();
            let matched = local_chain[start..]
                .iter()
                .position(|def| def.name() == search)
                .map(|pos| pos + start);
            let mut local = None;
            if let Some(m) = matched {
                for def in &local_chain[start..m] {
                    slots.push(DataSlot {
                        desc: self.registry.describe(def.name())?,
                        local: Some(Arc::clone(def)),
                        has_data: false,
                    });
                }
                local = Some(Arc::clone(&local_chain[m]));
                start = m + 1;
            }
            slots.push(DataSlot {
                desc: stream_desc,
                local,
                has_data: true,
            });
        }
        for def in &local_chain[start..] {
            slots.push(DataSlot {
                desc: self.registry.describe(def.name())?,
                local: Some(Arc::clone(def)),
                has_data: false,
            });
        }
        slots.reverse();
        Ok(slots)
    }

    fn read_serial_data(
        &mut self,
        heap: &mut Heap,
        obj: Option<ObjectId>,
        desc: &Arc<ClassDescriptor>,
    ) -> Result<()> {
        for slot in self.class_data_layout(desc)? {
            if !slot.has_data {
                let hook = slot
                    .local
                    .as_ref()
                    .and_then(|def| def.hooks().read_object_no_data.clone());
                if let (Some(id), Some(hook)) = (obj, hook) {
                    hook(heap, id)?;
                }
                continue;
            }
            let hook = slot
                .local
                .as_ref()
                .and_then(|def| def.hooks().read_object.clone());
            match (obj, hook) {
                (Some(id), Some(hook)) => {
                    self.read_custom_data(heap, id, Arc::clone(&slot.desc), hook)?
                }
                (Some(id), None) if slot.local.is_some() => {
                    self.read_default_fields(heap, Some(id), &slot.desc)?
                }
                _ => self.read_default_fields(heap, None, &slot.desc)?,
            }
            if slot.desc.has_write_object_data() {
                self.skip_custom_data(heap)?;
            } else {
                self.input.set_block_mode(false)?;
            }
        }
        Ok(())
    }

    /// Run a class's own read routine with the input in block mode
    #[inline(never)]
    fn read_custom_data(
        &mut self,
        heap: &mut Heap,
        id: ObjectId,
        desc: Arc<ClassDescriptor>,
        hook: ReadObjectHook,
    ) -> Result<()> {
        self.input.set_block_mode(true)?;
        let result = {
            let mut frame = ReadFrame::new(self, heap, id, desc, FrameKind::Serial);
            hook(&mut frame)
        };
        self.default_data_end = false;
        result
    }

    /// Primitive field data followed by each reference field
    ///
    /// With no target object every value is read and dropped, as are values
    /// of fields the local class does not bind. Assignment
    /// failures are reported after all fields have been consumed.
    pub(crate) fn read_default_fields(
        &mut self,
        heap: &mut Heap,
        obj: Option<ObjectId>,
        desc: &ClassDescriptor,
    ) -> Result<()> {
        let mut prim = vec![0u8; desc.primitive_data_size()];
        self.input.read_exact(&mut prim)?;
        let mut mismatch = None;
        for field in desc.fields() {
            let kept = obj.is_some() && matches!(field.binding(), FieldBinding::Slot { .. });
            let value = match field.field_type().primitive() {
                Some(p) => codec::get_primitive(&prim, field.offset(), p)?,
                None if kept => self.read_value(heap, field.is_unshared())?,
                None => {
                    self.discard_value(heap, field.is_unshared())?;
                    Value::Null
                }
            };
            if let Some(id) = obj {
                if let Some(e) = self.bind_field(heap, id, desc, field, value)? {
                    mismatch.get_or_insert(e);
                }
            }
        }
        match mismatch {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Store one stream field value; `Some` describes a type mismatch
    fn bind_field(
        &self,
        heap: &mut Heap,
        id: ObjectId,
        desc: &ClassDescriptor,
        field: &FieldDescriptor,
        value: Value,
    ) -> Result<Option<Error>> {
        let mismatch = |expected: String, actual: String| Error::FieldMismatch {
            class: desc.name().to_string(),
            field: field.name().to_string(),
            expected,
            actual,
        };
        match field.binding() {
            FieldBinding::Unbound => Ok(None),
            FieldBinding::Mismatch { local_type } => Ok(Some(mismatch(
                local_type.to_string(),
                field.field_type().to_string(),
            ))),
            FieldBinding::Slot { index, local_type } => {
                if let (Value::Ref(value_id), Some(target)) = (value, local_type.class_name()) {
                    let class = heap.object(value_id)?.class_name();
                    if self.registry.contains(&target) && !self.registry.is_assignable(class, &target) {
                        return Ok(Some(mismatch(target, class.to_string())));
                    }
                }
                heap.instance_mut(id)?.set_slot(*index, value)?;
                Ok(None)
            }
        }
    }

    /// Consume a writer's failure record
    ///
    /// The record is read with a fresh handle table into a scratch heap and
    /// leaves the handle table empty.
    fn read_fatal_exception(&mut self) -> Result<Error> {
        self.input.read_u8()?;
        self.handles.clear();
        let outer = self.set_aside();
        let mut scratch = Heap::new();
        let result = self.read_value(&mut scratch, false);
        self.handles.clear();
        self.missing_class = outer.missing;
        self.low_dep = outer.low;
        let detail = match result? {
            Value::Ref(id) => failure_detail(&scratch, id),
            _ => "unknown failure".to_string(),
        };
        warn!(target: "objstream::reader", detail = %detail, "Stream records a write failure");
        Ok(Error::WriteAborted { detail })
    }
}

#[inline(never)]
fn unexpected_tag(tag: u8) -> Error {
    match tag {
        TC_CLASSDESC | TC_PROXYCLASSDESC => {
            Error::malformed(format!("{} record in object position", tag_name(tag)))
        }
        _ => Error::malformed(format!("invalid type code: {:02X}", tag)),
    }
}

#[inline(never)]
fn element_mismatch(heap: &Heap, id: ObjectId, index: usize, class: &str) -> Error {
    let array = heap.class_name_of(id).unwrap_or("array");
    Error::InvalidObject(format!(
        "array element {} of class {} cannot be stored in {}",
        index, class, array
    ))
}

#[inline(never)]
fn not_an_array(id: ObjectId) -> Error {
    Error::InvalidObject(format!("{} is not an array", id))
}

#[inline(never)]
fn trace_object(class: &str, handle: usize, resolved: bool) {
    trace!(
        target: "objstream::reader",
        class = %class,
        handle,
        resolved,
        "Reading object"
    );
}

#[inline(never)]
fn trace_replaced(original: Value, replacement: Value, message: &'static str) {
    trace!(
        target: "objstream::reader",
        original = %original,
        replacement = %replacement,
        "{}",
        message
    );
}

fn failure_detail(heap: &Heap, id: ObjectId) -> String {
    let text = |field: &str| -> Option<String> {
        let value = heap.get_field(id, field).ok()?;
        heap.string_value(value).map(str::to_string)
    };
    match (text("kind"), text("message")) {
        (Some(kind), Some(message)) => format!("{}: {}", kind, message),
        _ => heap
            .class_name_of(id)
            .unwrap_or("unknown failure")
            .to_string(),
    }
}

impl std::fmt::Debug for ObjectReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectReader")
            .field("config", &self.config)
            .field("handles", &self.handles.len())
            .field("depth", &self.depth)
            .field("validations", &self.validations.len())
            .finish()
    }
}
