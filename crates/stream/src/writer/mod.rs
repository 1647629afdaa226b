//! Object stream encoder
//!
//! `ObjectWriter` turns object graphs held in a [`Heap`] into the tagged
//! record stream. Every object, string, array, enum constant, class object
//! and class descriptor gets a handle on first write; later occurrences are
//! written as back-references, which preserves aliasing and cycles.
//!
//! Per object, `write_value`:
//! 1. maps earlier replacements, writes NULL, back-references and class
//!    objects
//! 2. applies the class-level `write_replace` routine, repeatedly while the
//!    class changes, and then the stream-level hook if the object was not
//!    replaced
//! 3. writes the object by shape: STRING/LONGSTRING, ARRAY, ENUM or OBJECT
//!
//! Primitive data written between records is buffered and framed as
//! block-data records, flushed right before the next tagged record.
//!
//! When an outermost write fails, the writer records the failure in the
//! stream (EXCEPTION record) so readers see `WriteAborted` instead of a
//! truncated graph.

mod frame;

pub use frame::{PutFields, WriteFrame};

use crate::block::BlockOutput;
use crate::class::{
    ClassDescriptor, ClassRegistry, FieldBinding, WriteObjectHook, ENUM, WRITE_FAILURE,
};
use crate::config::{HandleScope, StreamConfig};
use crate::format::*;
use crate::handles::{HandleKey, WriteHandles};
use crate::hooks::{DefaultHooks, WriteHooks};
use crate::utf;
use crate::codec;
use byteorder::{BigEndian, WriteBytesExt};
pub(crate) use frame::FrameKind;
use objstream_core::{ArrayData, Error, Heap, HeapObject, Incompatibility, ObjectId, Result, Value};
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Object stream encoder
pub struct ObjectWriter<'w> {
    out: BlockOutput<'w>,
    registry: Arc<ClassRegistry>,
    hooks: Arc<dyn WriteHooks>,
    config: StreamConfig,
    handles: WriteHandles,
    depth: usize,
}

impl<'w> ObjectWriter<'w> {
    /// Create a writer with the default configuration and write the stream
    /// header
    pub fn new(sink: impl Write + 'w, registry: Arc<ClassRegistry>) -> Result<Self> {
        Self::with_config(sink, registry, StreamConfig::default())
    }

    /// Create a writer with an explicit configuration
    pub fn with_config(
        sink: impl Write + 'w,
        registry: Arc<ClassRegistry>,
        config: StreamConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut out = BlockOutput::new(Box::new(sink), config.block_size);
        out.write_u16::<BigEndian>(STREAM_MAGIC)?;
        out.write_u16::<BigEndian>(STREAM_VERSION)?;
        out.set_block_mode(true)?;
        debug!(
            target: "objstream::writer",
            protocol = config.protocol.number(),
            block_size = config.block_size,
            "Opened object stream writer"
        );
        Ok(ObjectWriter {
            out,
            registry,
            hooks: Arc::new(DefaultHooks),
            config,
            handles: WriteHandles::new(),
            depth: 0,
        })
    }

    /// Install stream-level hooks
    pub fn with_hooks(mut self, hooks: Arc<dyn WriteHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Class registry used to describe objects
    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    /// Active externalizable protocol
    pub fn protocol(&self) -> ProtocolVersion {
        self.config.protocol
    }

    /// Switch the externalizable protocol; only allowed before any handle
    /// has been assigned
    pub fn use_protocol_version(&mut self, protocol: ProtocolVersion) -> Result<()> {
        if !self.handles.is_empty() {
            return Err(Error::InvalidOperation("stream non-empty".to_string()));
        }
        self.config.protocol = protocol;
        Ok(())
    }

    /// Write an object graph
    pub fn write_object(&mut self, heap: &mut Heap, value: Value) -> Result<()> {
        self.write_top(heap, value, false)
    }

    /// Write an object as a new, unshared occurrence
    ///
    /// The object gets a fresh handle that later writes never refer back to.
    pub fn write_unshared(&mut self, heap: &mut Heap, value: Value) -> Result<()> {
        self.write_top(heap, value, true)
    }

    fn write_top(&mut self, heap: &mut Heap, value: Value, unshared: bool) -> Result<()> {
        match self.write_value(heap, value, unshared) {
            Ok(()) => {
                if self.depth == 0 && self.config.handle_scope == HandleScope::PerCall {
                    self.handles.clear();
                }
                Ok(())
            }
            Err(e) if self.depth == 0 => Err(self.write_fatal(e)),
            Err(e) => Err(e),
        }
    }

    /// Write a reset record and forget every handle
    pub fn reset(&mut self) -> Result<()> {
        if self.depth != 0 {
            return Err(Error::InvalidOperation("stream active".to_string()));
        }
        self.out.set_block_mode(false)?;
        self.out.write_tag(TC_RESET)?;
        self.handles.clear();
        self.out.set_block_mode(true)?;
        debug!(target: "objstream::writer", "Stream reset");
        Ok(())
    }

    /// Flush buffered block data and the sink
    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    /// Flush and release the sink
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        debug!(
            target: "objstream::writer",
            handles = self.handles.len(),
            "Closed object stream writer"
        );
        Ok(())
    }

    /// Write a `boolean`
    pub fn write_bool(&mut self, v: bool) -> Result<()> {
        self.write_primitive(Value::Boolean(v))
    }

    /// Write a `byte`
    pub fn write_byte(&mut self, v: i8) -> Result<()> {
        self.write_primitive(Value::Byte(v))
    }

    /// Write a `char` (UTF-16 code unit)
    pub fn write_char(&mut self, v: u16) -> Result<()> {
        self.write_primitive(Value::Char(v))
    }

    /// Write a `short`
    pub fn write_short(&mut self, v: i16) -> Result<()> {
        self.write_primitive(Value::Short(v))
    }

    /// Write an `int`
    pub fn write_int(&mut self, v: i32) -> Result<()> {
        self.write_primitive(Value::Int(v))
    }

    /// Write a `long`
    pub fn write_long(&mut self, v: i64) -> Result<()> {
        self.write_primitive(Value::Long(v))
    }

    /// Write a `float`
    pub fn write_float(&mut self, v: f32) -> Result<()> {
        self.write_primitive(Value::Float(v))
    }

    /// Write a `double`
    pub fn write_double(&mut self, v: f64) -> Result<()> {
        self.write_primitive(Value::Double(v))
    }

    fn write_primitive(&mut self, value: Value) -> Result<()> {
        codec::write_primitive(&mut self.out, value)?;
        Ok(())
    }

    /// Write raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write_all(bytes)?;
        Ok(())
    }

    /// Write every UTF-16 code unit of a string as a `char`
    pub fn write_chars(&mut self, s: &str) -> Result<()> {
        for unit in s.encode_utf16() {
            self.out.write_u16::<BigEndian>(unit)?;
        }
        Ok(())
    }

    /// Write the low byte of every UTF-16 code unit of a string
    pub fn write_string_bytes(&mut self, s: &str) -> Result<()> {
        let bytes: Vec<u8> = s.encode_utf16().map(|unit| unit as u8).collect();
        self.write_bytes(&bytes)
    }

    /// Write a string in length-prefixed modified UTF-8
    ///
    /// Fails with `StringTooLong` above 65535 encoded bytes.
    pub fn write_utf(&mut self, s: &str) -> Result<()> {
        self.write_short_utf(s)
    }

    fn write_short_utf(&mut self, s: &str) -> Result<()> {
        let encoded = utf::encode(s);
        if encoded.len() > MAX_UTF_LEN {
            return Err(Error::StringTooLong {
                length: encoded.len(),
            });
        }
        self.out.write_u16::<BigEndian>(encoded.len() as u16)?;
        self.out.write_all(&encoded)?;
        Ok(())
    }

    /// Write one value as an object record
    pub(crate) fn write_value(&mut self, heap: &mut Heap, value: Value, unshared: bool) -> Result<()> {
        let old_mode = self.out.set_block_mode(false)?;
        self.depth += 1;
        let result = match self.config.limits.check_depth(self.depth) {
            Ok(()) => self.write_value0(heap, value, unshared),
            Err(e) => Err(e.into()),
        };
        self.depth -= 1;
        let restored = self.out.set_block_mode(old_mode);
        result?;
        restored?;
        Ok(())
    }

    fn write_value0(&mut self, heap: &mut Heap, value: Value, unshared: bool) -> Result<()> {
        if value.primitive_type().is_some() {
            return Err(not_an_object(value));
        }
        let orig = self.handles.substitute(value);
        if self.write_shortcut(heap, orig, unshared)? {
            return Ok(());
        }
        let Value::Ref(orig_id) = orig else {
            return Ok(());
        };

        let obj = self.apply_replacement(heap, orig_id)?;
        if obj != orig {
            self.handles.alias(orig_id, obj);
            if self.write_shortcut(heap, obj, unshared)? {
                return Ok(());
            }
        }

        let Value::Ref(id) = obj else {
            return Ok(());
        };
        match heap.object(id)? {
            HeapObject::String(_) => self.write_string_object(heap, id, unshared),
            HeapObject::Array(_) => self.write_array(heap, id, unshared),
            HeapObject::Enum(_) => self.write_enum(heap, id, unshared),
            HeapObject::Instance(_) => self.write_ordinary_object(heap, id, unshared),
            HeapObject::Class(_) => Err(class_on_object_path(id)),
        }
    }

    /// Class-level replacement, repeated while the class changes, then the
    /// stream-level hook for objects the class left alone
    #[inline(never)]
    fn apply_replacement(&mut self, heap: &mut Heap, orig_id: ObjectId) -> Result<Value> {
        let orig = Value::Ref(orig_id);
        let mut obj = orig;
        let mut class = heap.object(orig_id)?.class_name().to_string();
        while let (Some(hook), Value::Ref(id)) = (self.registry.find_write_replace(&class), obj) {
            obj = hook(heap, id)?;
            let Value::Ref(rep) = obj else { break };
            let rep_class = heap.object(rep)?.class_name().to_string();
            if rep_class == class {
                break;
            }
            class = rep_class;
        }
        if obj == orig {
            obj = self.hooks.replace_object(heap, obj)?;
        }
        if obj.primitive_type().is_some() {
            return Err(Error::InvalidObject(format!(
                "replacement for {} is a {} value",
                orig_id,
                obj.type_name()
            )));
        }
        if obj != orig {
            trace!(
                target: "objstream::writer",
                original = %orig_id,
                replacement = %obj,
                "Object replaced"
            );
        }
        Ok(obj)
    }

    #[inline(never)]
    fn write_string_object(&mut self, heap: &Heap, id: ObjectId, unshared: bool) -> Result<()> {
        let s = match heap.object(id)? {
            HeapObject::String(s) => s.clone(),
            _ => return Err(Error::InvalidObject(format!("{} is not a string", id))),
        };
        let key = (!unshared).then_some(HandleKey::Object(id));
        self.write_string(&s, key)
    }

    /// NULL, back-reference and class-object cases; `true` when written
    fn write_shortcut(&mut self, heap: &Heap, value: Value, unshared: bool) -> Result<bool> {
        let id = match value {
            Value::Null => {
                self.out.write_tag(TC_NULL)?;
                return Ok(true);
            }
            Value::Ref(id) => id,
            _ => return Ok(false),
        };
        if !unshared {
            if let Some(handle) = self.handles.lookup(&HandleKey::Object(id)) {
                self.write_handle(handle)?;
                return Ok(true);
            }
        }
        if let HeapObject::Class(name) = heap.object(id)? {
            let name = name.clone();
            self.write_class(id, &name, unshared)?;
            return Ok(true);
        }
        Ok(false)
    }

    fn write_handle(&mut self, handle: i32) -> Result<()> {
        self.out.write_tag(TC_REFERENCE)?;
        self.out.write_i32::<BigEndian>(handle)?;
        Ok(())
    }

    fn register(&mut self, key: Option<HandleKey>) -> Result<i32> {
        self.handles.register(key, self.config.limits.max_references)
    }

    fn write_class(&mut self, id: ObjectId, name: &str, unshared: bool) -> Result<()> {
        let desc = self.registry.describe(name)?;
        self.out.write_tag(TC_CLASS)?;
        self.write_class_desc(Some(&desc))?;
        self.register((!unshared).then_some(HandleKey::Object(id)))?;
        Ok(())
    }

    fn write_class_desc(&mut self, desc: Option<&Arc<ClassDescriptor>>) -> Result<()> {
        let Some(desc) = desc else {
            self.out.write_tag(TC_NULL)?;
            return Ok(());
        };
        let key = HandleKey::Descriptor(desc.name().to_string());
        if let Some(handle) = self.handles.lookup(&key) {
            return self.write_handle(handle);
        }
        match desc.proxy_interfaces() {
            Some(interfaces) => {
                self.out.write_tag(TC_PROXYCLASSDESC)?;
                self.register(Some(key))?;
                self.out.write_i32::<BigEndian>(interfaces.len() as i32)?;
                for interface in interfaces {
                    self.write_short_utf(interface)?;
                }
            }
            None => {
                self.out.write_tag(TC_CLASSDESC)?;
                self.register(Some(key))?;
                self.write_short_utf(desc.name())?;
                self.out.write_i64::<BigEndian>(desc.serial_version_uid())?;
                self.out.write_u8(desc.flags(self.config.protocol))?;
                self.out.write_i16::<BigEndian>(desc.fields().len() as i16)?;
                for field in desc.fields() {
                    self.out.write_u8(field.type_code())?;
                    self.write_short_utf(field.name())?;
                    if !field.is_primitive() {
                        self.write_type_string(&field.field_type().signature())?;
                    }
                }
            }
        }
        // class annotations are always empty
        self.out.write_tag(TC_ENDBLOCKDATA)?;
        trace!(
            target: "objstream::writer",
            class = %desc.name(),
            suid = desc.serial_version_uid(),
            "Wrote class descriptor"
        );
        self.write_class_desc(desc.superclass())
    }

    fn write_type_string(&mut self, signature: &str) -> Result<()> {
        let key = HandleKey::TypeString(signature.to_string());
        match self.handles.lookup(&key) {
            Some(handle) => self.write_handle(handle),
            None => self.write_string(signature, Some(key)),
        }
    }

    fn write_string(&mut self, s: &str, key: Option<HandleKey>) -> Result<()> {
        let encoded = utf::encode(s);
        if encoded.len() <= MAX_UTF_LEN {
            self.out.write_tag(TC_STRING)?;
            self.register(key)?;
            self.out.write_u16::<BigEndian>(encoded.len() as u16)?;
        } else {
            self.out.write_tag(TC_LONGSTRING)?;
            self.register(key)?;
            self.out.write_i64::<BigEndian>(encoded.len() as i64)?;
        }
        self.out.write_all(&encoded)?;
        Ok(())
    }

    fn write_array(&mut self, heap: &mut Heap, id: ObjectId, unshared: bool) -> Result<()> {
        let class_name = match heap.array(id) {
            Some(array) => array.class_name.clone(),
            None => return Err(Error::InvalidObject(format!("{} is not an array", id))),
        };
        let desc = self.registry.describe(&class_name)?;
        self.out.write_tag(TC_ARRAY)?;
        self.write_class_desc(Some(&desc))?;
        self.register((!unshared).then_some(HandleKey::Object(id)))?;

        let elements = match heap.array(id).map(|a| &a.data) {
            Some(ArrayData::Reference(values)) => values.clone(),
            Some(data) => {
                self.out.write_i32::<BigEndian>(data.len() as i32)?;
                for i in 0..data.len() {
                    if let Some(v) = data.get(i) {
                        codec::write_primitive(&mut self.out, v)?;
                    }
                }
                return Ok(());
            }
            None => return Err(Error::InvalidObject(format!("{} is not an array", id))),
        };
        self.out.write_i32::<BigEndian>(elements.len() as i32)?;
        for element in elements {
            self.write_value(heap, element, false)?;
        }
        Ok(())
    }

    fn write_enum(&mut self, heap: &mut Heap, id: ObjectId, unshared: bool) -> Result<()> {
        let (class_name, name) = match heap.enum_value(id) {
            Some(e) => (e.class_name.clone(), e.name.clone()),
            None => return Err(Error::InvalidObject(format!("{} is not an enum constant", id))),
        };
        let mut desc = self.registry.describe(&class_name)?;
        if !desc.is_enum() {
            return Err(Error::InvalidObject(format!("{} is not an enum", class_name)));
        }
        // constant-specific subclasses are written as their enum class
        if let Some(sup) = desc.superclass() {
            if sup.name() != ENUM {
                desc = Arc::clone(sup);
            }
        }
        self.out.write_tag(TC_ENUM)?;
        self.write_class_desc(Some(&desc))?;
        self.register((!unshared).then_some(HandleKey::Object(id)))?;
        self.write_string(&name, None)
    }

    fn write_ordinary_object(&mut self, heap: &mut Heap, id: ObjectId, unshared: bool) -> Result<()> {
        let class_name = heap.object(id)?.class_name().to_string();
        let desc = self.registry.describe(&class_name)?;
        if !desc.is_serializable() {
            return Err(Error::NotSerializable(class_name));
        }
        self.out.write_tag(TC_OBJECT)?;
        self.write_class_desc(Some(&desc))?;
        let handle = self.register((!unshared).then_some(HandleKey::Object(id)))?;
        trace_object(&class_name, id, handle);
        if desc.is_externalizable() && !desc.is_proxy() {
            self.write_external_data(heap, id, &desc)
        } else {
            self.write_serial_data(heap, id, &desc)
        }
    }

    fn write_external_data(
        &mut self,
        heap: &mut Heap,
        id: ObjectId,
        desc: &Arc<ClassDescriptor>,
    ) -> Result<()> {
        let hook = self
            .registry
            .find_hook(desc.name(), |h| h.write_external.clone())
            .ok_or_else(|| {
                Error::InvalidDefinition(format!(
                    "externalizable class {} declares no write_external routine",
                    desc.name()
                ))
            })?;
        if self.config.protocol == ProtocolVersion::V1 {
            let mut frame = WriteFrame::new(self, heap, id, Arc::clone(desc), FrameKind::External);
            hook(&mut frame)
        } else {
            self.out.set_block_mode(true)?;
            {
                let mut frame =
                    WriteFrame::new(self, heap, id, Arc::clone(desc), FrameKind::External);
                hook(&mut frame)?;
            }
            self.out.set_block_mode(false)?;
            self.out.write_tag(TC_ENDBLOCKDATA)?;
            Ok(())
        }
    }

    fn write_serial_data(
        &mut self,
        heap: &mut Heap,
        id: ObjectId,
        desc: &Arc<ClassDescriptor>,
    ) -> Result<()> {
        for slot in desc.hierarchy().into_iter().rev() {
            let hook = slot
                .local_class()
                .filter(|_| slot.has_write_object_data())
                .and_then(|def| def.hooks().write_object.clone());
            match hook {
                Some(hook) => self.write_custom_data(heap, id, slot, hook)?,
                None => self.write_default_fields(heap, id, &slot)?,
            }
        }
        Ok(())
    }

    /// Run a class's own write routine with the output in block mode
    #[inline(never)]
    fn write_custom_data(
        &mut self,
        heap: &mut Heap,
        id: ObjectId,
        slot: Arc<ClassDescriptor>,
        hook: WriteObjectHook,
    ) -> Result<()> {
        self.out.set_block_mode(true)?;
        {
            let mut frame = WriteFrame::new(self, heap, id, slot, FrameKind::Serial);
            hook(&mut frame)?;
        }
        self.out.set_block_mode(false)?;
        self.out.write_tag(TC_ENDBLOCKDATA)?;
        Ok(())
    }

    /// Primitive field data followed by each reference field
    pub(crate) fn write_default_fields(
        &mut self,
        heap: &mut Heap,
        id: ObjectId,
        desc: &ClassDescriptor,
    ) -> Result<()> {
        desc.check_default_serialize()?;
        let instance = heap.instance(id)?;
        let mut prim = vec![0u8; desc.primitive_data_size()];
        let mut refs = Vec::with_capacity(desc.object_field_count());
        for field in desc.fields() {
            let index = match field.binding() {
                FieldBinding::Slot { index, .. } => *index,
                _ => {
                    return Err(Error::incompatible(
                        desc.name(),
                        Incompatibility::UnmatchedField(field.name().to_string()),
                    ))
                }
            };
            let value = instance
                .slot(index)
                .ok_or_else(|| missing_slot(id, desc.name(), field.name()))?;
            if field.is_primitive() {
                codec::put_primitive(&mut prim, field.offset(), value)?;
            } else {
                refs.push((value, field.is_unshared()));
            }
        }
        self.out.write_all(&prim)?;
        for (value, unshared) in refs {
            self.write_value(heap, value, unshared)?;
        }
        Ok(())
    }

    /// Record an outermost failure in the stream
    fn write_fatal(&mut self, original: Error) -> Error {
        warn!(
            target: "objstream::writer",
            error = %original,
            "Write failed, recording failure in stream"
        );
        match self.write_exception_record(&original) {
            Ok(()) => original,
            Err(secondary) => Error::ExceptionRecordFailed {
                original: Box::new(original),
                secondary: Box::new(secondary),
            },
        }
    }

    fn write_exception_record(&mut self, error: &Error) -> Result<()> {
        self.handles.clear();
        let old_mode = self.out.set_block_mode(false)?;
        let result = self.write_failure_object(error);
        self.handles.clear();
        let restored = self.out.set_block_mode(old_mode);
        result?;
        restored?;
        Ok(())
    }

    fn write_failure_object(&mut self, error: &Error) -> Result<()> {
        let mut scratch = Heap::new();
        let failure = scratch.alloc_instance(self.registry.layout(WRITE_FAILURE)?);
        let kind = scratch.alloc_string(error.kind_name());
        let message = scratch.alloc_string(error.to_string());
        scratch.set_field(failure, "kind", Value::Ref(kind))?;
        scratch.set_field(failure, "message", Value::Ref(message))?;
        self.out.write_tag(TC_EXCEPTION)?;
        self.write_value(&mut scratch, Value::Ref(failure), false)
    }
}

impl std::fmt::Debug for ObjectWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectWriter")
            .field("config", &self.config)
            .field("handles", &self.handles.len())
            .field("depth", &self.depth)
            .finish()
    }
}

#[inline(never)]
fn not_an_object(value: Value) -> Error {
    Error::InvalidObject(format!(
        "{} value cannot be written as an object",
        value.type_name()
    ))
}

#[inline(never)]
fn class_on_object_path(id: ObjectId) -> Error {
    Error::InvalidObject(format!("class object {} reached the object path", id))
}

#[inline(never)]
fn missing_slot(id: ObjectId, class: &str, field: &str) -> Error {
    Error::InvalidObject(format!("{} has no slot for {}.{}", id, class, field))
}

#[inline(never)]
fn trace_object(class: &str, id: ObjectId, handle: i32) {
    trace!(
        target: "objstream::writer",
        class = %class,
        object = %id,
        handle,
        "Writing object"
    );
}
