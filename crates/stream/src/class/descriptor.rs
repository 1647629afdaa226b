//! Class descriptors
//!
//! A `ClassDescriptor` is the serialization shape of one class: name,
//! version id, capability flags, sorted serializable fields with their
//! offsets, and a link to the descriptor of the nearest serializable
//! superclass. Local descriptors are built by the
//! [`ClassRegistry`](super::ClassRegistry); stream descriptors are built by
//! the reader from a descriptor record and bound to the resolved local
//! class. Both are frozen in an `Arc` once complete.

use super::def::ClassDef;
use super::suid::java_cmp;
use crate::format::{
    ProtocolVersion, SC_BLOCK_DATA, SC_ENUM, SC_EXTERNALIZABLE, SC_SERIALIZABLE, SC_WRITE_METHOD,
};
use objstream_core::{Error, FieldType, Incompatibility, Result};
use std::sync::Arc;

/// How a descriptor field maps onto local instance slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldBinding {
    /// No local field; values are read and discarded
    Unbound,
    /// Local slot with a compatible type
    Slot {
        /// Slot index in the layout of the declaring class and its subclasses
        index: usize,
        /// Declared local type
        local_type: FieldType,
    },
    /// Local field of the same name with a different type code
    Mismatch {
        /// Declared local type
        local_type: FieldType,
    },
}

/// One serializable field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub(crate) name: String,
    pub(crate) field_type: FieldType,
    pub(crate) unshared: bool,
    pub(crate) offset: usize,
    pub(crate) binding: FieldBinding,
}

impl FieldDescriptor {
    /// Unbound field at offset 0
    pub fn new(name: impl Into<String>, field_type: FieldType, unshared: bool) -> Self {
        FieldDescriptor {
            name: name.into(),
            field_type,
            unshared,
            offset: 0,
            binding: FieldBinding::Unbound,
        }
    }

    /// Field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field type
    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    /// Wire type code
    pub fn type_code(&self) -> u8 {
        self.field_type.code()
    }

    /// Whether the field is primitive
    pub fn is_primitive(&self) -> bool {
        self.field_type.is_primitive()
    }

    /// Whether values are written and read unshared
    pub fn is_unshared(&self) -> bool {
        self.unshared
    }

    /// Byte offset (primitives) or index among reference fields
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Local binding
    pub fn binding(&self) -> &FieldBinding {
        &self.binding
    }
}

/// Sort fields primitives first, then by name
pub(crate) fn sort_fields(fields: &mut [FieldDescriptor]) {
    fields.sort_by(|a, b| match (a.is_primitive(), b.is_primitive()) {
        (true, false) => std::cmp::Ordering::Less,
        (false, true) => std::cmp::Ordering::Greater,
        _ => java_cmp(&a.name, &b.name),
    });
}

/// Assign offsets, returning (primitive data size, reference field count)
///
/// Fields must already be in primitives-first order.
pub(crate) fn assign_offsets(
    fields: &mut [FieldDescriptor],
) -> std::result::Result<(usize, usize), Incompatibility> {
    let mut prim_size = 0;
    let mut obj_count = 0;
    let mut first_obj = None;
    for (i, field) in fields.iter_mut().enumerate() {
        match field.field_type.primitive() {
            Some(p) => {
                field.offset = prim_size;
                prim_size += p.size();
            }
            None => {
                field.offset = obj_count;
                obj_count += 1;
                first_obj.get_or_insert(i);
            }
        }
    }
    if let Some(first) = first_obj {
        if first + obj_count != fields.len() {
            return Err(Incompatibility::InvalidDescriptor(
                "illegal field order".to_string(),
            ));
        }
    }
    Ok((prim_size, obj_count))
}

/// Serialization shape of one class
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    pub(crate) name: String,
    pub(crate) suid: i64,
    pub(crate) serializable: bool,
    pub(crate) externalizable: bool,
    pub(crate) has_write_object_data: bool,
    pub(crate) has_block_external_data: bool,
    pub(crate) is_enum: bool,
    pub(crate) proxy_interfaces: Option<Vec<String>>,
    pub(crate) fields: Vec<FieldDescriptor>,
    pub(crate) prim_data_size: usize,
    pub(crate) num_obj_fields: usize,
    pub(crate) superclass: Option<Arc<ClassDescriptor>>,
    pub(crate) local: Option<Arc<ClassDef>>,
    pub(crate) deserialize_error: Option<Incompatibility>,
    pub(crate) default_serialize_error: Option<Incompatibility>,
}

impl ClassDescriptor {
    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version id
    pub fn serial_version_uid(&self) -> i64 {
        self.suid
    }

    /// Serializable (externalizable classes are serializable too)
    pub fn is_serializable(&self) -> bool {
        self.serializable
    }

    /// Externalizable
    pub fn is_externalizable(&self) -> bool {
        self.externalizable
    }

    /// Whether class data carries custom data terminated by ENDBLOCKDATA
    pub fn has_write_object_data(&self) -> bool {
        self.has_write_object_data
    }

    /// Whether externalizable data is block-data framed
    pub fn has_block_external_data(&self) -> bool {
        self.has_block_external_data
    }

    /// Enum class
    pub fn is_enum(&self) -> bool {
        self.is_enum
    }

    /// Proxy class
    pub fn is_proxy(&self) -> bool {
        self.proxy_interfaces.is_some()
    }

    /// Interfaces of a proxy class
    pub fn proxy_interfaces(&self) -> Option<&[String]> {
        self.proxy_interfaces.as_deref()
    }

    /// Array class
    pub fn is_array(&self) -> bool {
        self.name.starts_with('[')
    }

    /// Serializable fields, primitives first
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Field by name and optional type
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Size of the primitive field data
    pub fn primitive_data_size(&self) -> usize {
        self.prim_data_size
    }

    /// Number of reference fields
    pub fn object_field_count(&self) -> usize {
        self.num_obj_fields
    }

    /// Descriptor of the nearest serializable superclass
    pub fn superclass(&self) -> Option<&Arc<ClassDescriptor>> {
        self.superclass.as_ref()
    }

    /// Local class this descriptor is bound to
    pub fn local_class(&self) -> Option<&Arc<ClassDef>> {
        self.local.as_ref()
    }

    /// Whether a local class was found
    pub fn is_resolved(&self) -> bool {
        self.local.is_some()
    }

    /// Flag byte for a descriptor record
    pub fn flags(&self, protocol: ProtocolVersion) -> u8 {
        let mut flags = 0;
        if self.externalizable {
            flags |= SC_EXTERNALIZABLE;
            if protocol != ProtocolVersion::V1 {
                flags |= SC_BLOCK_DATA;
            }
        } else if self.serializable {
            flags |= SC_SERIALIZABLE;
        }
        if self.has_write_object_data {
            flags |= SC_WRITE_METHOD;
        }
        if self.is_enum {
            flags |= SC_ENUM;
        }
        flags
    }

    /// Fail unless instances may be created for deserialization
    pub fn check_deserialize(&self) -> Result<()> {
        match &self.deserialize_error {
            Some(reason) => Err(Error::incompatible(&self.name, reason.clone())),
            None => Ok(()),
        }
    }

    /// Fail unless default field serialization is possible
    pub fn check_default_serialize(&self) -> Result<()> {
        match &self.default_serialize_error {
            Some(reason) => Err(Error::incompatible(&self.name, reason.clone())),
            None => Ok(()),
        }
    }

    /// Descriptors from this class up to the root, most-derived first
    pub fn hierarchy(self: &Arc<Self>) -> Vec<Arc<ClassDescriptor>> {
        let mut chain = vec![Arc::clone(self)];
        let mut current = self.superclass.clone();
        while let Some(desc) = current {
            current = desc.superclass.clone();
            chain.push(desc);
        }
        chain
    }
}
