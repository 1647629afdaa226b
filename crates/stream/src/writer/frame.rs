//! Write-side hook frames and emulated fields

use super::ObjectWriter;
use crate::class::ClassDescriptor;
use crate::codec;
use objstream_core::{Error, Heap, ObjectId, Result, Value};
use std::io::Write;
use std::sync::Arc;

/// Which routine a frame was handed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    /// Custom routine of one class level
    Serial,
    /// Externalizable payload
    External,
}

/// Context handed to custom write routines
///
/// Gives access to the object being written and to the stream. Primitive
/// writes land in block data; `write_object` writes nested records.
pub struct WriteFrame<'a, 'w> {
    writer: &'a mut ObjectWriter<'w>,
    heap: &'a mut Heap,
    object: ObjectId,
    desc: Arc<ClassDescriptor>,
    kind: FrameKind,
    fields_written: bool,
}

impl<'a, 'w> WriteFrame<'a, 'w> {
    pub(crate) fn new(
        writer: &'a mut ObjectWriter<'w>,
        heap: &'a mut Heap,
        object: ObjectId,
        desc: Arc<ClassDescriptor>,
        kind: FrameKind,
    ) -> Self {
        WriteFrame {
            writer,
            heap,
            object,
            desc,
            kind,
            fields_written: false,
        }
    }

    /// Object being written
    pub fn object(&self) -> ObjectId {
        self.object
    }

    /// Class whose routine is running
    pub fn class_name(&self) -> &str {
        self.desc.name()
    }

    /// Descriptor of the class whose routine is running
    pub fn descriptor(&self) -> &Arc<ClassDescriptor> {
        &self.desc
    }

    /// The heap holding the graph
    pub fn heap(&mut self) -> &mut Heap {
        &mut *self.heap
    }

    /// Field of the object, preferring the one declared by this class
    pub fn field(&self, name: &str) -> Result<Value> {
        let instance = self.heap.instance(self.object)?;
        match instance.layout().slot_index(self.desc.name(), name) {
            Some(index) => instance.slot(index).ok_or_else(|| Error::UnknownField {
                class: self.desc.name().to_string(),
                field: name.to_string(),
            }),
            None => instance.get(name),
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
        if self.fields_written {
            return Err(Error::NotActive(format!(
                "{}: fields of {} already written",
                operation,
                self.desc.name()
            )));
        }
        self.fields_written = true;
        Ok(())
    }

    /// Write this class's serializable fields the default way
    pub fn default_write_object(&mut self) -> Result<()> {
        self.claim_fields("default_write_object")?;
        let desc = Arc::clone(&self.desc);
        self.writer.out.set_block_mode(false)?;
        self.writer.write_default_fields(self.heap, self.object, &desc)?;
        self.writer.out.set_block_mode(true)?;
        Ok(())
    }

    /// Buffer for writing this class's fields by name
    pub fn put_fields(&self) -> Result<PutFields> {
        if self.kind == FrameKind::External {
            return Err(Error::NotActive(format!(
                "put_fields called from an externalizable routine of {}",
                self.desc.name()
            )));
        }
        Ok(PutFields::new(Arc::clone(&self.desc)))
    }

    /// Write fields buffered with [`put_fields`](Self::put_fields)
    pub fn write_fields(&mut self, fields: &PutFields) -> Result<()> {
        if fields.desc.name() != self.desc.name() {
            return Err(Error::InvalidOperation(format!(
                "fields of {} written for {}",
                fields.desc.name(),
                self.desc.name()
            )));
        }
        self.claim_fields("write_fields")?;
        self.writer.out.set_block_mode(false)?;
        self.writer.out.write_all(&fields.prim)?;
        let unshared = fields
            .desc
            .fields()
            .iter()
            .filter(|f| !f.is_primitive())
            .map(|f| f.is_unshared());
        for (value, unshared) in fields.objects.iter().copied().zip(unshared) {
            self.writer.write_value(self.heap, value, unshared)?;
        }
        self.writer.out.set_block_mode(true)?;
        Ok(())
    }

    /// Write a nested object
    pub fn write_object(&mut self, value: Value) -> Result<()> {
        self.writer.write_value(self.heap, value, false)
    }

    /// Write a nested object unshared
    pub fn write_unshared(&mut self, value: Value) -> Result<()> {
        self.writer.write_value(self.heap, value, true)
    }

    /// Write a `boolean`
    pub fn write_bool(&mut self, v: bool) -> Result<()> {
        self.writer.write_bool(v)
    }

    /// Write a `byte`
    pub fn write_byte(&mut self, v: i8) -> Result<()> {
        self.writer.write_byte(v)
    }

    /// Write a `char`
    pub fn write_char(&mut self, v: u16) -> Result<()> {
        self.writer.write_char(v)
    }

    /// Write a `short`
    pub fn write_short(&mut self, v: i16) -> Result<()> {
        self.writer.write_short(v)
    }

    /// Write an `int`
    pub fn write_int(&mut self, v: i32) -> Result<()> {
        self.writer.write_int(v)
    }

    /// Write a `long`
    pub fn write_long(&mut self, v: i64) -> Result<()> {
        self.writer.write_long(v)
    }

    /// Write a `float`
    pub fn write_float(&mut self, v: f32) -> Result<()> {
        self.writer.write_float(v)
    }

    /// Write a `double`
    pub fn write_double(&mut self, v: f64) -> Result<()> {
        self.writer.write_double(v)
    }

    /// Write raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_bytes(bytes)
    }

    /// Write a string as `char`s
    pub fn write_chars(&mut self, s: &str) -> Result<()> {
        self.writer.write_chars(s)
    }

    /// Write a length-prefixed modified UTF-8 string
    pub fn write_utf(&mut self, s: &str) -> Result<()> {
        self.writer.write_utf(s)
    }
}

/// Named field values for one class, written in descriptor layout
#[derive(Debug, Clone)]
pub struct PutFields {
    desc: Arc<ClassDescriptor>,
    prim: Vec<u8>,
    objects: Vec<Value>,
}

impl PutFields {
    fn new(desc: Arc<ClassDescriptor>) -> Self {
        let prim = vec![0u8; desc.primitive_data_size()];
        let objects = vec![Value::Null; desc.object_field_count()];
        PutFields {
            desc,
            prim,
            objects,
        }
    }

    /// Set a field; the value must match the field's type
    pub fn put(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let field = self.desc.field(name).ok_or_else(|| Error::UnknownField {
            class: self.desc.name().to_string(),
            field: name.to_string(),
        })?;
        if !field.field_type().accepts(&value) {
            return Err(Error::FieldMismatch {
                class: self.desc.name().to_string(),
                field: name.to_string(),
                expected: field.field_type().to_string(),
                actual: value.type_name().to_string(),
            });
        }
        if field.is_primitive() {
            codec::put_primitive(&mut self.prim, field.offset(), value)?;
        } else {
            self.objects[field.offset()] = value;
        }
        Ok(())
    }

    /// Value currently buffered for a field
    pub fn get(&self, name: &str) -> Result<Value> {
        let field = self.desc.field(name).ok_or_else(|| Error::UnknownField {
            class: self.desc.name().to_string(),
            field: name.to_string(),
        })?;
        match field.field_type().primitive() {
            Some(p) => Ok(codec::get_primitive(&self.prim, field.offset(), p)?),
            None => Ok(self.objects[field.offset()]),
        }
    }
}
