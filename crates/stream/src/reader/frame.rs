//! Read-side hook frames and emulated fields

use super::ObjectReader;
use crate::class::ClassDescriptor;
use crate::codec;
use crate::writer::FrameKind;
use objstream_core::{Error, FieldType, Heap, ObjectId, Result, Value};
use std::io::Read;
use std::sync::Arc;

/// Context handed to custom read routines
///
/// Mirrors [`WriteFrame`](crate::writer::WriteFrame): primitive reads come
/// from the class's block data, `read_object` reads nested records.
pub struct ReadFrame<'a, 'r> {
    reader: &'a mut ObjectReader<'r>,
    heap: &'a mut Heap,
    object: ObjectId,
    desc: Arc<ClassDescriptor>,
    kind: FrameKind,
    fields_read: bool,
}

impl<'a, 'r> ReadFrame<'a, 'r> {
    pub(crate) fn new(
        reader: &'a mut ObjectReader<'r>,
        heap: &'a mut Heap,
        object: ObjectId,
        desc: Arc<ClassDescriptor>,
        kind: FrameKind,
    ) -> Self {
        ReadFrame {
            reader,
            heap,
            object,
            desc,
            kind,
            fields_read: false,
        }
    }

    /// Object being rebuilt
    pub fn object(&self) -> ObjectId {
        self.object
    }

    /// Class name recorded in the stream
    pub fn class_name(&self) -> &str {
        self.desc.name()
    }

    /// Stream descriptor of the class whose routine is running
    pub fn descriptor(&self) -> &Arc<ClassDescriptor> {
        &self.desc
    }

    /// The heap the graph is rebuilt into
    pub fn heap(&mut self) -> &mut Heap {
        &mut *self.heap
    }

    fn local_name(&self) -> &str {
        self.desc
            .local_class()
            .map(|def| def.name())
            .unwrap_or_else(|| self.desc.name())
    }

    /// Field of the object, preferring the one declared by this class
    pub fn field(&self, name: &str) -> Result<Value> {
        let instance = self.heap.instance(self.object)?;
        match instance.layout().slot_index(self.local_name(), name) {
            Some(index) => instance.slot(index).ok_or_else(|| Error::UnknownField {
                class: self.local_name().to_string(),
                field: name.to_string(),
            }),
            None => instance.get(name),
        }
    }

    /// Set a field of the object, preferring the one declared by this class
    pub fn set_field(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let index = self
            .heap
            .instance(self.object)?
            .layout()
            .slot_index(self.local_name(), name);
        let instance = self.heap.instance_mut(self.object)?;
        match index {
            Some(index) => instance.set_slot(index, value),
            None => instance.set(name, value),
        }
    }

    fn claim_fields(&mut self, operation: &str) -> Result<()> {
        if self.kind == FrameKind::External {
            return Err(Error::NotActive(format!(
                "{} called from an externalizable routine of {}",
                operation,
                self.desc.name()
            )));
        }
        if self.fields_read {
            return Err(Error::NotActive(format!(
                "{}: fields of {} already read",
                operation,
                self.desc.name()
            )));
        }
        self.fields_read = true;
        Ok(())
    }

    /// Read this class's serializable fields the default way
    ///
    /// Fields the stream has but the local class lacks are discarded;
    /// local fields the stream lacks keep their initial values.
    pub fn default_read_object(&mut self) -> Result<()> {
        self.claim_fields("default_read_object")?;
        let desc = Arc::clone(&self.desc);
        self.reader.input.set_block_mode(false)?;
        self.reader
            .read_default_fields(self.heap, Some(self.object), &desc)?;
        self.reader.input.set_block_mode(true)?;
        if !desc.has_write_object_data() {
            self.reader.default_data_end = true;
        }
        Ok(())
    }

    /// Read this class's fields into a by-name view without assigning them
    pub fn read_fields(&mut self) -> Result<GetFields> {
        self.claim_fields("read_fields")?;
        let desc = Arc::clone(&self.desc);
        self.reader.input.set_block_mode(false)?;
        let mut prim = vec![0u8; desc.primitive_data_size()];
        self.reader.input.read_exact(&mut prim)?;
        let mut objects = Vec::with_capacity(desc.object_field_count());
        for field in desc.fields().iter().filter(|f| !f.is_primitive()) {
            objects.push(self.reader.read_value(self.heap, field.is_unshared())?);
        }
        self.reader.input.set_block_mode(true)?;
        if !desc.has_write_object_data() {
            self.reader.default_data_end = true;
        }
        let local = match desc.local_class() {
            Some(def) => Some(self.reader.registry.describe(def.name())?),
            None => None,
        };
        Ok(GetFields {
            desc,
            local,
            prim,
            objects,
        })
    }

    /// Read a nested object
    pub fn read_object(&mut self) -> Result<Value> {
        self.reader.read_value(self.heap, false)
    }

    /// Read a nested object that must not be referenced again
    pub fn read_unshared(&mut self) -> Result<Value> {
        self.reader.read_value(self.heap, true)
    }

    /// Read a `boolean`
    pub fn read_bool(&mut self) -> Result<bool> {
        self.reader.read_bool()
    }

    /// Read a `byte`
    pub fn read_byte(&mut self) -> Result<i8> {
        self.reader.read_byte()
    }

    /// Read a `char`
    pub fn read_char(&mut self) -> Result<u16> {
        self.reader.read_char()
    }

    /// Read a `short`
    pub fn read_short(&mut self) -> Result<i16> {
        self.reader.read_short()
    }

    /// Read an `int`
    pub fn read_int(&mut self) -> Result<i32> {
        self.reader.read_int()
    }

    /// Read a `long`
    pub fn read_long(&mut self) -> Result<i64> {
        self.reader.read_long()
    }

    /// Read a `float`
    pub fn read_float(&mut self) -> Result<f32> {
        self.reader.read_float()
    }

    /// Read a `double`
    pub fn read_double(&mut self) -> Result<f64> {
        self.reader.read_double()
    }

    /// Fill `buf` with raw bytes
    pub fn read_fully(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_fully(buf)
    }

    /// Read a length-prefixed modified UTF-8 string
    pub fn read_utf(&mut self) -> Result<String> {
        self.reader.read_utf()
    }

    /// Skip up to `n` bytes of primitive data
    pub fn skip_bytes(&mut self, n: usize) -> Result<usize> {
        self.reader.skip_bytes(n)
    }

    /// Primitive bytes readable without blocking on a record
    pub fn available(&mut self) -> Result<usize> {
        self.reader.available()
    }

    /// Run `callback` after the outermost read completes
    pub fn register_validation(
        &mut self,
        priority: i32,
        callback: impl FnOnce(&mut Heap) -> Result<()> + 'static,
    ) -> Result<()> {
        self.reader.register_validation(priority, callback)
    }
}

/// Field values of one class as recorded in the stream
#[derive(Debug, Clone)]
pub struct GetFields {
    desc: Arc<ClassDescriptor>,
    local: Option<Arc<ClassDescriptor>>,
    prim: Vec<u8>,
    objects: Vec<Value>,
}

impl GetFields {
    /// Class name recorded in the stream
    pub fn class_name(&self) -> &str {
        self.desc.name()
    }

    fn unknown(&self, name: &str) -> Error {
        Error::UnknownField {
            class: self.desc.name().to_string(),
            field: name.to_string(),
        }
    }

    fn check_type(&self, name: &str, field_type: &FieldType, requested: &Value) -> Result<()> {
        if field_type.accepts(requested) {
            return Ok(());
        }
        Err(Error::FieldMismatch {
            class: self.desc.name().to_string(),
            field: name.to_string(),
            expected: field_type.to_string(),
            actual: requested.type_name().to_string(),
        })
    }

    /// Value of a field, or `default` when only the local class has it
    ///
    /// `default` also fixes the requested type: it must match the field's
    /// declared type.
    pub fn get(&self, name: &str, default: impl Into<Value>) -> Result<Value> {
        let default = default.into();
        if let Some(field) = self.desc.field(name) {
            self.check_type(name, field.field_type(), &default)?;
            return match field.field_type().primitive() {
                Some(p) => Ok(codec::get_primitive(&self.prim, field.offset(), p)?),
                None => self
                    .objects
                    .get(field.offset())
                    .copied()
                    .ok_or_else(|| self.unknown(name)),
            };
        }
        match self.local.as_ref().and_then(|d| d.field(name)) {
            Some(field) => {
                self.check_type(name, field.field_type(), &default)?;
                Ok(default)
            }
            None => Err(self.unknown(name)),
        }
    }

    /// Value of a reference field
    pub fn get_object(&self, name: &str) -> Result<Value> {
        self.get(name, Value::Null)
    }

    /// Whether a field is absent from the stream and would take its default
    pub fn defaulted(&self, name: &str) -> Result<bool> {
        if self.desc.field(name).is_some() {
            return Ok(false);
        }
        match self.local.as_ref().and_then(|d| d.field(name)) {
            Some(_) => Ok(true),
            None => Err(self.unknown(name)),
        }
    }
}
