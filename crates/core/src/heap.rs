//! Object heap
//!
//! The heap is an arena of objects addressed by [`ObjectId`]. Object
//! identity is the id: two references are "the same object" exactly when
//! their ids are equal, which is what shared references, cycles and
//! back-references are defined in terms of.
//!
//! Instances store their fields in slots. An [`InstanceLayout`] lists the
//! slots of a class, root class first, so the slot index of an inherited
//! field is the same in every subclass. Layouts are built once per class and
//! shared behind an `Arc`; field access goes through slot indices bound
//! ahead of time rather than name lookups.
//!
//! Enum constants and class objects are interned: there is exactly one heap
//! object per (enum class, constant name) and per class name.

use crate::error::{Error, Result};
use crate::types::{FieldType, PrimitiveType};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Class name of string objects
pub const STRING_CLASS: &str = "java.lang.String";

/// Class name of class objects
pub const CLASS_CLASS: &str = "java.lang.Class";

/// Identity of a heap object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

impl ObjectId {
    /// Arena index
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// One instance field slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    /// Class that declares the field
    pub declaring_class: String,
    /// Field name
    pub name: String,
    /// Declared field type
    pub field_type: FieldType,
}

/// Slot layout of a class's instances
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceLayout {
    class_name: String,
    slots: Vec<SlotInfo>,
}

impl InstanceLayout {
    /// Create a layout; slots must be ordered root class first
    pub fn new(class_name: impl Into<String>, slots: Vec<SlotInfo>) -> Self {
        InstanceLayout {
            class_name: class_name.into(),
            slots,
        }
    }

    /// Name of the instance class
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// All slots, root class first
    pub fn slots(&self) -> &[SlotInfo] {
        &self.slots
    }

    /// Slot of a field declared by a specific class
    pub fn slot_index(&self, declaring_class: &str, name: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.declaring_class == declaring_class && s.name == name)
    }

    /// Slot of the most-derived field with this name
    pub fn find(&self, name: &str) -> Option<usize> {
        self.slots.iter().rposition(|s| s.name == name)
    }

    /// Default slot values
    pub fn default_slots(&self) -> Vec<Value> {
        self.slots
            .iter()
            .map(|s| s.field_type.default_value())
            .collect()
    }
}

/// An object instance
#[derive(Debug, Clone)]
pub struct Instance {
    layout: Arc<InstanceLayout>,
    slots: Vec<Value>,
}

impl Instance {
    /// Create an instance with every slot at its default value
    pub fn new(layout: Arc<InstanceLayout>) -> Self {
        let slots = layout.default_slots();
        Instance { layout, slots }
    }

    /// Class name
    pub fn class_name(&self) -> &str {
        self.layout.class_name()
    }

    /// Slot layout
    pub fn layout(&self) -> &Arc<InstanceLayout> {
        &self.layout
    }

    /// Slot values
    pub fn slots(&self) -> &[Value] {
        &self.slots
    }

    /// Value of a slot
    pub fn slot(&self, index: usize) -> Option<Value> {
        self.slots.get(index).copied()
    }

    /// Set a slot, checking the value against the declared type
    pub fn set_slot(&mut self, index: usize, value: Value) -> Result<()> {
        let info = self.layout.slots().get(index).ok_or_else(|| {
            Error::InvalidOperation(format!(
                "slot {} out of range for {}",
                index,
                self.layout.class_name()
            ))
        })?;
        if !info.field_type.accepts(&value) {
            return Err(Error::FieldMismatch {
                class: info.declaring_class.clone(),
                field: info.name.clone(),
                expected: info.field_type.to_string(),
                actual: value.type_name().to_string(),
            });
        }
        self.slots[index] = value;
        Ok(())
    }

    /// Value of the most-derived field with this name
    pub fn get(&self, name: &str) -> Result<Value> {
        self.layout
            .find(name)
            .map(|i| self.slots[i])
            .ok_or_else(|| Error::UnknownField {
                class: self.layout.class_name().to_string(),
                field: name.to_string(),
            })
    }

    /// Set the most-derived field with this name
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let index = self.layout.find(name).ok_or_else(|| Error::UnknownField {
            class: self.layout.class_name().to_string(),
            field: name.to_string(),
        })?;
        self.set_slot(index, value)
    }
}

/// Array elements
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    /// `boolean[]`
    Boolean(Vec<bool>),
    /// `byte[]`
    Byte(Vec<i8>),
    /// `char[]`
    Char(Vec<u16>),
    /// `short[]`
    Short(Vec<i16>),
    /// `int[]`
    Int(Vec<i32>),
    /// `long[]`
    Long(Vec<i64>),
    /// `float[]`
    Float(Vec<f32>),
    /// `double[]`
    Double(Vec<f64>),
    /// Reference arrays
    Reference(Vec<Value>),
}

impl ArrayData {
    /// Zero-filled array of the given component type
    pub fn with_len(component: &FieldType, len: usize) -> ArrayData {
        match component {
            FieldType::Primitive(PrimitiveType::Boolean) => ArrayData::Boolean(vec![false; len]),
            FieldType::Primitive(PrimitiveType::Byte) => ArrayData::Byte(vec![0; len]),
            FieldType::Primitive(PrimitiveType::Char) => ArrayData::Char(vec![0; len]),
            FieldType::Primitive(PrimitiveType::Short) => ArrayData::Short(vec![0; len]),
            FieldType::Primitive(PrimitiveType::Int) => ArrayData::Int(vec![0; len]),
            FieldType::Primitive(PrimitiveType::Long) => ArrayData::Long(vec![0; len]),
            FieldType::Primitive(PrimitiveType::Float) => ArrayData::Float(vec![0.0; len]),
            FieldType::Primitive(PrimitiveType::Double) => ArrayData::Double(vec![0.0; len]),
            FieldType::Reference(_) => ArrayData::Reference(vec![Value::Null; len]),
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            ArrayData::Boolean(v) => v.len(),
            ArrayData::Byte(v) => v.len(),
            ArrayData::Char(v) => v.len(),
            ArrayData::Short(v) => v.len(),
            ArrayData::Int(v) => v.len(),
            ArrayData::Long(v) => v.len(),
            ArrayData::Float(v) => v.len(),
            ArrayData::Double(v) => v.len(),
            ArrayData::Reference(v) => v.len(),
        }
    }

    /// Whether the array has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Primitive element type (`None` for reference arrays)
    pub fn element_type(&self) -> Option<PrimitiveType> {
        match self {
            ArrayData::Boolean(_) => Some(PrimitiveType::Boolean),
            ArrayData::Byte(_) => Some(PrimitiveType::Byte),
            ArrayData::Char(_) => Some(PrimitiveType::Char),
            ArrayData::Short(_) => Some(PrimitiveType::Short),
            ArrayData::Int(_) => Some(PrimitiveType::Int),
            ArrayData::Long(_) => Some(PrimitiveType::Long),
            ArrayData::Float(_) => Some(PrimitiveType::Float),
            ArrayData::Double(_) => Some(PrimitiveType::Double),
            ArrayData::Reference(_) => None,
        }
    }

    /// Element at `index` as a value
    pub fn get(&self, index: usize) -> Option<Value> {
        match self {
            ArrayData::Boolean(v) => v.get(index).map(|x| Value::Boolean(*x)),
            ArrayData::Byte(v) => v.get(index).map(|x| Value::Byte(*x)),
            ArrayData::Char(v) => v.get(index).map(|x| Value::Char(*x)),
            ArrayData::Short(v) => v.get(index).map(|x| Value::Short(*x)),
            ArrayData::Int(v) => v.get(index).map(|x| Value::Int(*x)),
            ArrayData::Long(v) => v.get(index).map(|x| Value::Long(*x)),
            ArrayData::Float(v) => v.get(index).map(|x| Value::Float(*x)),
            ArrayData::Double(v) => v.get(index).map(|x| Value::Double(*x)),
            ArrayData::Reference(v) => v.get(index).copied(),
        }
    }

    /// Set the element at `index`
    pub fn set(&mut self, index: usize, value: Value) -> Result<()> {
        let len = self.len();
        if index >= len {
            return Err(Error::InvalidOperation(format!(
                "array index {} out of bounds for length {}",
                index, len
            )));
        }
        match (self, value) {
            (ArrayData::Boolean(v), Value::Boolean(x)) => v[index] = x,
            (ArrayData::Byte(v), Value::Byte(x)) => v[index] = x,
            (ArrayData::Char(v), Value::Char(x)) => v[index] = x,
            (ArrayData::Short(v), Value::Short(x)) => v[index] = x,
            (ArrayData::Int(v), Value::Int(x)) => v[index] = x,
            (ArrayData::Long(v), Value::Long(x)) => v[index] = x,
            (ArrayData::Float(v), Value::Float(x)) => v[index] = x,
            (ArrayData::Double(v), Value::Double(x)) => v[index] = x,
            (ArrayData::Reference(v), x @ (Value::Null | Value::Ref(_))) => v[index] = x,
            (data, x) => {
                return Err(Error::InvalidOperation(format!(
                    "cannot store {} in {} array",
                    x.type_name(),
                    data.element_type().map(PrimitiveType::name).unwrap_or("reference")
                )))
            }
        }
        Ok(())
    }

    fn same_primitive_bits(&self, other: &ArrayData) -> bool {
        match (self, other) {
            (ArrayData::Float(a), ArrayData::Float(b)) => a
                .iter()
                .zip(b)
                .all(|(x, y)| x.to_bits() == y.to_bits()),
            (ArrayData::Double(a), ArrayData::Double(b)) => a
                .iter()
                .zip(b)
                .all(|(x, y)| x.to_bits() == y.to_bits()),
            (a, b) => a == b,
        }
    }
}

/// An array object
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    /// Array class name (`[I`, `[Ljava.lang.String;`)
    pub class_name: String,
    /// Elements
    pub data: ArrayData,
}

/// An enum constant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumConstant {
    /// Enum class name
    pub class_name: String,
    /// Constant name
    pub name: String,
}

/// A heap object
#[derive(Debug, Clone)]
pub enum HeapObject {
    /// Ordinary instance with field slots
    Instance(Instance),
    /// Immutable string
    String(String),
    /// Array
    Array(Array),
    /// Enum constant
    Enum(EnumConstant),
    /// Class object, by class name
    Class(String),
}

impl HeapObject {
    /// Class name of the object
    pub fn class_name(&self) -> &str {
        match self {
            HeapObject::Instance(i) => i.class_name(),
            HeapObject::String(_) => STRING_CLASS,
            HeapObject::Array(a) => &a.class_name,
            HeapObject::Enum(e) => &e.class_name,
            HeapObject::Class(_) => CLASS_CLASS,
        }
    }
}

/// Arena of objects
#[derive(Debug, Default, Clone)]
pub struct Heap {
    objects: Vec<HeapObject>,
    enum_constants: HashMap<(String, String), ObjectId>,
    class_objects: HashMap<String, ObjectId>,
}

impl Heap {
    /// Create an empty heap
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the heap is empty
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Add an object
    pub fn alloc(&mut self, object: HeapObject) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(object);
        id
    }

    /// Add a new string object
    ///
    /// Strings are not interned: every call creates a distinct object.
    pub fn alloc_string(&mut self, s: impl Into<String>) -> ObjectId {
        self.alloc(HeapObject::String(s.into()))
    }

    /// Add a new instance with default field values
    pub fn alloc_instance(&mut self, layout: Arc<InstanceLayout>) -> ObjectId {
        self.alloc(HeapObject::Instance(Instance::new(layout)))
    }

    /// Add a new array
    pub fn alloc_array(&mut self, class_name: impl Into<String>, data: ArrayData) -> ObjectId {
        self.alloc(HeapObject::Array(Array {
            class_name: class_name.into(),
            data,
        }))
    }

    /// The interned enum constant object
    pub fn enum_constant(&mut self, class_name: &str, name: &str) -> ObjectId {
        let key = (class_name.to_string(), name.to_string());
        if let Some(id) = self.enum_constants.get(&key) {
            return *id;
        }
        let id = self.alloc(HeapObject::Enum(EnumConstant {
            class_name: key.0.clone(),
            name: key.1.clone(),
        }));
        self.enum_constants.insert(key, id);
        id
    }

    /// The interned class object
    pub fn class_object(&mut self, class_name: &str) -> ObjectId {
        if let Some(id) = self.class_objects.get(class_name) {
            return *id;
        }
        let id = self.alloc(HeapObject::Class(class_name.to_string()));
        self.class_objects.insert(class_name.to_string(), id);
        id
    }

    /// Object by id
    pub fn get(&self, id: ObjectId) -> Option<&HeapObject> {
        self.objects.get(id.index())
    }

    /// Mutable object by id
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut HeapObject> {
        self.objects.get_mut(id.index())
    }

    /// Object by id, failing on a dangling id
    pub fn object(&self, id: ObjectId) -> Result<&HeapObject> {
        self.get(id)
            .ok_or_else(|| Error::InvalidObject(format!("dangling object reference {}", id)))
    }

    /// Class name of an object
    pub fn class_name_of(&self, id: ObjectId) -> Option<&str> {
        self.get(id).map(HeapObject::class_name)
    }

    /// Instance by id
    pub fn instance(&self, id: ObjectId) -> Result<&Instance> {
        match self.object(id)? {
            HeapObject::Instance(i) => Ok(i),
            other => Err(Error::InvalidObject(format!(
                "{} is a {}, not an instance",
                id,
                other.class_name()
            ))),
        }
    }

    /// Mutable instance by id
    pub fn instance_mut(&mut self, id: ObjectId) -> Result<&mut Instance> {
        match self.objects.get_mut(id.index()) {
            Some(HeapObject::Instance(i)) => Ok(i),
            Some(other) => Err(Error::InvalidObject(format!(
                "{} is a {}, not an instance",
                id,
                other.class_name()
            ))),
            None => Err(Error::InvalidObject(format!(
                "dangling object reference {}",
                id
            ))),
        }
    }

    /// String contents, if the object is a string
    pub fn string(&self, id: ObjectId) -> Option<&str> {
        match self.get(id) {
            Some(HeapObject::String(s)) => Some(s),
            _ => None,
        }
    }

    /// String contents of a value, if it references a string
    pub fn string_value(&self, value: Value) -> Option<&str> {
        value.object_id().and_then(|id| self.string(id))
    }

    /// Array, if the object is one
    pub fn array(&self, id: ObjectId) -> Option<&Array> {
        match self.get(id) {
            Some(HeapObject::Array(a)) => Some(a),
            _ => None,
        }
    }

    /// Mutable array, if the object is one
    pub fn array_mut(&mut self, id: ObjectId) -> Option<&mut Array> {
        match self.objects.get_mut(id.index()) {
            Some(HeapObject::Array(a)) => Some(a),
            _ => None,
        }
    }

    /// Enum constant, if the object is one
    pub fn enum_value(&self, id: ObjectId) -> Option<&EnumConstant> {
        match self.get(id) {
            Some(HeapObject::Enum(e)) => Some(e),
            _ => None,
        }
    }

    /// Field of an instance by name
    pub fn get_field(&self, id: ObjectId, name: &str) -> Result<Value> {
        self.instance(id)?.get(name)
    }

    /// Set a field of an instance by name
    pub fn set_field(&mut self, id: ObjectId, name: &str, value: Value) -> Result<()> {
        self.instance_mut(id)?.set(name, value)
    }

    /// Whether `a` (in this heap) and `b` (in `other`) are the roots of
    /// structurally identical graphs
    ///
    /// Identity structure must match exactly: two references to the same
    /// object on one side must be two references to the same object on the
    /// other, so aliasing and cycles are compared along with contents.
    pub fn isomorphic(&self, a: Value, other: &Heap, b: Value) -> bool {
        let mut forward: HashMap<ObjectId, ObjectId> = HashMap::new();
        let mut backward: HashMap<ObjectId, ObjectId> = HashMap::new();
        let mut pending = vec![(a, b)];

        while let Some((x, y)) = pending.pop() {
            let (xa, yb) = match (x, y) {
                (Value::Ref(xa), Value::Ref(yb)) => (xa, yb),
                (Value::Ref(_), _) | (_, Value::Ref(_)) => return false,
                (x, y) => {
                    if x.same_bits(&y) {
                        continue;
                    }
                    return false;
                }
            };
            match (forward.get(&xa), backward.get(&yb)) {
                (Some(mapped), _) if *mapped != yb => return false,
                (_, Some(mapped)) if *mapped != xa => return false,
                (Some(_), Some(_)) => continue,
                _ => {}
            }
            forward.insert(xa, yb);
            backward.insert(yb, xa);

            let (ox, oy) = match (self.get(xa), other.get(yb)) {
                (Some(ox), Some(oy)) => (ox, oy),
                _ => return false,
            };
            match (ox, oy) {
                (HeapObject::Instance(ix), HeapObject::Instance(iy)) => {
                    if ix.class_name() != iy.class_name() || ix.slots.len() != iy.slots.len() {
                        return false;
                    }
                    pending.extend(ix.slots.iter().copied().zip(iy.slots.iter().copied()));
                }
                (HeapObject::String(sx), HeapObject::String(sy)) => {
                    if sx != sy {
                        return false;
                    }
                }
                (HeapObject::Array(ax), HeapObject::Array(ay)) => {
                    if ax.class_name != ay.class_name || ax.data.len() != ay.data.len() {
                        return false;
                    }
                    match (&ax.data, &ay.data) {
                        (ArrayData::Reference(ex), ArrayData::Reference(ey)) => {
                            pending.extend(ex.iter().copied().zip(ey.iter().copied()));
                        }
                        (dx, dy) => {
                            if !dx.same_primitive_bits(dy) {
                                return false;
                            }
                        }
                    }
                }
                (HeapObject::Enum(ex), HeapObject::Enum(ey)) => {
                    if ex != ey {
                        return false;
                    }
                }
                (HeapObject::Class(cx), HeapObject::Class(cy)) => {
                    if cx != cy {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        true
    }
}
