//! Type codes, field types and modifier bits
//!
//! Field types are identified on the wire by a one-byte type code:
//!
//! ```text
//! B byte    C char    D double   F float
//! I int     J long    S short    Z boolean
//! L object  [ array
//! ```
//!
//! Reference types carry a JVM-style signature (`Ljava/lang/String;`,
//! `[I`, `[Lcom/example/Point;`). Class names use dots (`com.example.Point`)
//! and array class names keep the signature form with dotted component names
//! (`[Lcom.example.Point;`).

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Primitive field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    /// `boolean`, one byte
    Boolean,
    /// `byte`, one byte
    Byte,
    /// `char`, two bytes (UTF-16 code unit)
    Char,
    /// `short`, two bytes
    Short,
    /// `int`, four bytes
    Int,
    /// `long`, eight bytes
    Long,
    /// `float`, four bytes
    Float,
    /// `double`, eight bytes
    Double,
}

impl PrimitiveType {
    /// All primitive types, in type-code order
    pub const ALL: [PrimitiveType; 8] = [
        PrimitiveType::Byte,
        PrimitiveType::Char,
        PrimitiveType::Double,
        PrimitiveType::Float,
        PrimitiveType::Int,
        PrimitiveType::Long,
        PrimitiveType::Short,
        PrimitiveType::Boolean,
    ];

    /// Wire type code
    pub fn code(self) -> u8 {
        match self {
            PrimitiveType::Boolean => b'Z',
            PrimitiveType::Byte => b'B',
            PrimitiveType::Char => b'C',
            PrimitiveType::Short => b'S',
            PrimitiveType::Int => b'I',
            PrimitiveType::Long => b'J',
            PrimitiveType::Float => b'F',
            PrimitiveType::Double => b'D',
        }
    }

    /// Parse a wire type code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            b'Z' => Some(PrimitiveType::Boolean),
            b'B' => Some(PrimitiveType::Byte),
            b'C' => Some(PrimitiveType::Char),
            b'S' => Some(PrimitiveType::Short),
            b'I' => Some(PrimitiveType::Int),
            b'J' => Some(PrimitiveType::Long),
            b'F' => Some(PrimitiveType::Float),
            b'D' => Some(PrimitiveType::Double),
            _ => None,
        }
    }

    /// Encoded width in bytes
    pub fn size(self) -> usize {
        match self {
            PrimitiveType::Boolean | PrimitiveType::Byte => 1,
            PrimitiveType::Char | PrimitiveType::Short => 2,
            PrimitiveType::Int | PrimitiveType::Float => 4,
            PrimitiveType::Long | PrimitiveType::Double => 8,
        }
    }

    /// Source-level type name
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Byte => "byte",
            PrimitiveType::Char => "char",
            PrimitiveType::Short => "short",
            PrimitiveType::Int => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
        }
    }

    /// Zero value of this type
    pub fn default_value(self) -> Value {
        match self {
            PrimitiveType::Boolean => Value::Boolean(false),
            PrimitiveType::Byte => Value::Byte(0),
            PrimitiveType::Char => Value::Char(0),
            PrimitiveType::Short => Value::Short(0),
            PrimitiveType::Int => Value::Int(0),
            PrimitiveType::Long => Value::Long(0),
            PrimitiveType::Float => Value::Float(0.0),
            PrimitiveType::Double => Value::Double(0.0),
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declared type of a field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// Primitive field
    Primitive(PrimitiveType),
    /// Reference field with its type signature
    Reference(String),
}

impl FieldType {
    /// `boolean`
    pub const BOOLEAN: FieldType = FieldType::Primitive(PrimitiveType::Boolean);
    /// `byte`
    pub const BYTE: FieldType = FieldType::Primitive(PrimitiveType::Byte);
    /// `char`
    pub const CHAR: FieldType = FieldType::Primitive(PrimitiveType::Char);
    /// `short`
    pub const SHORT: FieldType = FieldType::Primitive(PrimitiveType::Short);
    /// `int`
    pub const INT: FieldType = FieldType::Primitive(PrimitiveType::Int);
    /// `long`
    pub const LONG: FieldType = FieldType::Primitive(PrimitiveType::Long);
    /// `float`
    pub const FLOAT: FieldType = FieldType::Primitive(PrimitiveType::Float);
    /// `double`
    pub const DOUBLE: FieldType = FieldType::Primitive(PrimitiveType::Double);

    /// Reference field whose declared type is the named class
    ///
    /// Accepts plain class names (`com.example.Point`) and array class
    /// names (`[I`, `[Lcom.example.Point;`).
    pub fn object(class_name: &str) -> FieldType {
        FieldType::Reference(class_name_to_signature(class_name))
    }

    /// `java.lang.String` reference field
    pub fn string() -> FieldType {
        FieldType::object("java.lang.String")
    }

    /// Parse a field signature (`I`, `Ljava/lang/String;`, `[J`)
    pub fn from_signature(signature: &str) -> Option<FieldType> {
        let bytes = signature.as_bytes();
        match bytes.first()? {
            b'L' | b'[' => {
                if valid_reference_signature(signature) {
                    Some(FieldType::Reference(signature.to_string()))
                } else {
                    None
                }
            }
            &code if bytes.len() == 1 => PrimitiveType::from_code(code).map(FieldType::Primitive),
            _ => None,
        }
    }

    /// Wire type code
    pub fn code(&self) -> u8 {
        match self {
            FieldType::Primitive(p) => p.code(),
            FieldType::Reference(sig) => {
                if sig.starts_with('[') {
                    b'['
                } else {
                    b'L'
                }
            }
        }
    }

    /// Full type signature
    pub fn signature(&self) -> String {
        match self {
            FieldType::Primitive(p) => (p.code() as char).to_string(),
            FieldType::Reference(sig) => sig.clone(),
        }
    }

    /// Whether this is a primitive type
    pub fn is_primitive(&self) -> bool {
        matches!(self, FieldType::Primitive(_))
    }

    /// Primitive type, if any
    pub fn primitive(&self) -> Option<PrimitiveType> {
        match self {
            FieldType::Primitive(p) => Some(*p),
            FieldType::Reference(_) => None,
        }
    }

    /// Class name of a reference type (`None` for primitives)
    pub fn class_name(&self) -> Option<String> {
        match self {
            FieldType::Primitive(_) => None,
            FieldType::Reference(sig) => Some(signature_to_class_name(sig)),
        }
    }

    /// Zero value of this type
    pub fn default_value(&self) -> Value {
        match self {
            FieldType::Primitive(p) => p.default_value(),
            FieldType::Reference(_) => Value::Null,
        }
    }

    /// Whether the value's shape fits this type
    ///
    /// Reference types accept any reference; class assignability is checked
    /// by the class registry.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::Primitive(p) => value.primitive_type() == Some(*p),
            FieldType::Reference(_) => matches!(value, Value::Null | Value::Ref(_)),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Primitive(p) => write!(f, "{}", p),
            FieldType::Reference(sig) => write!(f, "{}", signature_to_class_name(sig)),
        }
    }
}

fn valid_reference_signature(sig: &str) -> bool {
    let trimmed = sig.trim_start_matches('[');
    let dims = sig.len() - trimmed.len();
    match trimmed.as_bytes() {
        [b'L', .., b';'] => trimmed.len() > 2,
        [code] => dims > 0 && PrimitiveType::from_code(*code).is_some(),
        _ => false,
    }
}

/// Convert a class name to a field signature
///
/// `com.example.Point` becomes `Lcom/example/Point;`; array class names keep
/// their shape with slashes in component names.
pub fn class_name_to_signature(class_name: &str) -> String {
    if class_name.starts_with('[') {
        class_name.replace('.', "/")
    } else {
        format!("L{};", class_name.replace('.', "/"))
    }
}

/// Convert a field signature to a class name
///
/// `Lcom/example/Point;` becomes `com.example.Point`; array signatures
/// become array class names (`[Lcom.example.Point;`).
pub fn signature_to_class_name(signature: &str) -> String {
    if signature.starts_with('[') {
        signature.replace('/', ".")
    } else if let Some(inner) = signature
        .strip_prefix('L')
        .and_then(|s| s.strip_suffix(';'))
    {
        inner.replace('/', ".")
    } else {
        signature.to_string()
    }
}

/// Component type of an array class name (`[I` → `int`, `[[I` → `[I`)
pub fn array_component(class_name: &str) -> Option<FieldType> {
    let rest = class_name.strip_prefix('[')?;
    FieldType::from_signature(&rest.replace('.', "/"))
}

/// Class and member modifier bits (JVM access flags)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Modifiers(u16);

impl Modifiers {
    /// No modifiers (package-private)
    pub const NONE: Modifiers = Modifiers(0);
    /// `public`
    pub const PUBLIC: Modifiers = Modifiers(0x0001);
    /// `private`
    pub const PRIVATE: Modifiers = Modifiers(0x0002);
    /// `protected`
    pub const PROTECTED: Modifiers = Modifiers(0x0004);
    /// `static`
    pub const STATIC: Modifiers = Modifiers(0x0008);
    /// `final`
    pub const FINAL: Modifiers = Modifiers(0x0010);
    /// `synchronized`
    pub const SYNCHRONIZED: Modifiers = Modifiers(0x0020);
    /// `volatile`
    pub const VOLATILE: Modifiers = Modifiers(0x0040);
    /// `transient`
    pub const TRANSIENT: Modifiers = Modifiers(0x0080);
    /// `native`
    pub const NATIVE: Modifiers = Modifiers(0x0100);
    /// `interface`
    pub const INTERFACE: Modifiers = Modifiers(0x0200);
    /// `abstract`
    pub const ABSTRACT: Modifiers = Modifiers(0x0400);
    /// `strictfp`
    pub const STRICT: Modifiers = Modifiers(0x0800);

    /// Build from raw bits
    pub const fn from_bits(bits: u16) -> Self {
        Modifiers(bits)
    }

    /// Raw bits
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Whether every bit of `other` is set
    pub const fn contains(self, other: Modifiers) -> bool {
        self.0 & other.0 == other.0
    }

    /// Keep only the bits of `mask`
    pub const fn masked(self, mask: Modifiers) -> Modifiers {
        Modifiers(self.0 & mask.0)
    }

    /// Clear the bits of `other`
    pub const fn without(self, other: Modifiers) -> Modifiers {
        Modifiers(self.0 & !other.0)
    }

    /// Whether the member is `private`
    pub const fn is_private(self) -> bool {
        self.contains(Modifiers::PRIVATE)
    }

    /// Whether the member is `static`
    pub const fn is_static(self) -> bool {
        self.contains(Modifiers::STATIC)
    }

    /// Whether the field is `transient`
    pub const fn is_transient(self) -> bool {
        self.contains(Modifiers::TRANSIENT)
    }
}

impl std::ops::BitOr for Modifiers {
    type Output = Modifiers;

    fn bitor(self, rhs: Modifiers) -> Modifiers {
        Modifiers(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for Modifiers {
    fn bitor_assign(&mut self, rhs: Modifiers) {
        self.0 |= rhs.0;
    }
}
