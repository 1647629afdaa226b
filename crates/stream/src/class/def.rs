//! Class definitions
//!
//! A `ClassDef` is what the application declares about a class: its place in
//! the hierarchy, its fields and members, and the per-class hooks that take
//! part in serialization. Capabilities come from the interface list:
//! implementing `java.io.Serializable` (directly or through an ancestor or
//! super-interface) makes a class serializable, `java.io.Externalizable`
//! makes it externalizable.

use crate::reader::ReadFrame;
use crate::writer::WriteFrame;
use objstream_core::{FieldType, Heap, Modifiers, ObjectId, Result, Value};
use std::fmt;
use std::sync::Arc;

/// Name of the serializable marker interface
pub const SERIALIZABLE: &str = "java.io.Serializable";
/// Name of the externalizable marker interface
pub const EXTERNALIZABLE: &str = "java.io.Externalizable";
/// Name of the root class
pub const OBJECT: &str = "java.lang.Object";
/// Name of the enum base class
pub const ENUM: &str = "java.lang.Enum";
/// Name of the proxy base class
pub const PROXY: &str = "java.lang.reflect.Proxy";

/// Custom write routine, run with the stream in block-data mode
pub type WriteObjectHook = Arc<dyn Fn(&mut WriteFrame<'_, '_>) -> Result<()> + Send + Sync>;
/// Custom read routine, run with the stream in block-data mode
pub type ReadObjectHook = Arc<dyn Fn(&mut ReadFrame<'_, '_>) -> Result<()> + Send + Sync>;
/// Routine run on an object without a stream frame
pub type ObjectHook = Arc<dyn Fn(&mut Heap, ObjectId) -> Result<()> + Send + Sync>;
/// Routine returning a substitute for an object
pub type ReplaceHook = Arc<dyn Fn(&mut Heap, ObjectId) -> Result<Value> + Send + Sync>;

/// Per-class serialization hooks
#[derive(Clone, Default)]
pub struct ClassHooks {
    /// Custom field writer
    pub write_object: Option<WriteObjectHook>,
    /// Custom field reader
    pub read_object: Option<ReadObjectHook>,
    /// Run when the stream carries no data for this class
    pub read_object_no_data: Option<ObjectHook>,
    /// Substitute an object before it is written
    pub write_replace: Option<ReplaceHook>,
    /// Substitute an object after it is read
    pub read_resolve: Option<ReplaceHook>,
    /// Externalizable payload writer
    pub write_external: Option<WriteObjectHook>,
    /// Externalizable payload reader
    pub read_external: Option<ReadObjectHook>,
}

impl fmt::Debug for ClassHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassHooks")
            .field("write_object", &self.write_object.is_some())
            .field("read_object", &self.read_object.is_some())
            .field("read_object_no_data", &self.read_object_no_data.is_some())
            .field("write_replace", &self.write_replace.is_some())
            .field("read_resolve", &self.read_resolve.is_some())
            .field("write_external", &self.write_external.is_some())
            .field("read_external", &self.read_external.is_some())
            .finish()
    }
}

/// A declared field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Declared type
    pub field_type: FieldType,
    /// Access and storage modifiers
    pub modifiers: Modifiers,
}

impl FieldDef {
    /// Whether the field is serialized by default
    pub fn is_default_serializable(&self) -> bool {
        !self.modifiers.is_static() && !self.modifiers.is_transient()
    }
}

/// An explicitly declared serializable field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentField {
    /// Field name
    pub name: String,
    /// Field type
    pub field_type: FieldType,
    /// Whether values are always written and read unshared
    pub unshared: bool,
}

impl PersistentField {
    /// Shared persistent field
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        PersistentField {
            name: name.into(),
            field_type,
            unshared: false,
        }
    }

    /// Mark the field unshared
    pub fn unshared(mut self) -> Self {
        self.unshared = true;
        self
    }
}

/// A declared method, used for the default version id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDef {
    /// Method name
    pub name: String,
    /// Method descriptor, e.g. `(I)V`
    pub descriptor: String,
    /// Modifiers
    pub modifiers: Modifiers,
}

/// A declared constructor
#[derive(Clone)]
pub struct ConstructorDef {
    /// Constructor descriptor, e.g. `()V`
    pub descriptor: String,
    /// Modifiers
    pub modifiers: Modifiers,
    /// Field initialization run when the constructor is invoked
    pub init: Option<ObjectHook>,
}

impl ConstructorDef {
    /// Constructor with the given descriptor
    pub fn new(descriptor: impl Into<String>, modifiers: Modifiers) -> Self {
        ConstructorDef {
            descriptor: descriptor.into(),
            modifiers,
            init: None,
        }
    }

    /// No-arg constructor
    pub fn no_arg(modifiers: Modifiers) -> Self {
        Self::new("()V", modifiers)
    }

    /// Attach field initialization
    pub fn with_init(
        mut self,
        init: impl Fn(&mut Heap, ObjectId) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.init = Some(Arc::new(init));
        self
    }

    /// Whether this is the no-arg constructor
    pub fn is_no_arg(&self) -> bool {
        self.descriptor == "()V"
    }
}

impl fmt::Debug for ConstructorDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorDef")
            .field("descriptor", &self.descriptor)
            .field("modifiers", &self.modifiers)
            .field("init", &self.init.is_some())
            .finish()
    }
}

/// Declared shape and behavior of a class
#[derive(Clone, Debug)]
pub struct ClassDef {
    name: String,
    modifiers: Modifiers,
    superclass: Option<String>,
    interfaces: Vec<String>,
    fields: Vec<FieldDef>,
    persistent_fields: Option<Vec<PersistentField>>,
    serial_version_uid: Option<i64>,
    constructors: Vec<ConstructorDef>,
    methods: Vec<MethodDef>,
    static_initializer: bool,
    enum_constants: Option<Vec<String>>,
    proxy: bool,
    hooks: ClassHooks,
}

impl ClassDef {
    /// Public class extending `java.lang.Object`
    pub fn new(name: impl Into<String>) -> Self {
        ClassDef {
            name: name.into(),
            modifiers: Modifiers::PUBLIC,
            superclass: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            persistent_fields: None,
            serial_version_uid: None,
            constructors: Vec::new(),
            methods: Vec::new(),
            static_initializer: false,
            enum_constants: None,
            proxy: false,
            hooks: ClassHooks::default(),
        }
    }

    /// Public interface
    pub fn interface(name: impl Into<String>) -> Self {
        ClassDef {
            modifiers: Modifiers::PUBLIC | Modifiers::INTERFACE | Modifiers::ABSTRACT,
            ..ClassDef::new(name)
        }
    }

    /// Enum class with the given constants
    pub fn enumeration<I, S>(name: impl Into<String>, constants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ClassDef {
            modifiers: Modifiers::PUBLIC | Modifiers::FINAL,
            superclass: Some(ENUM.to_string()),
            enum_constants: Some(constants.into_iter().map(Into::into).collect()),
            ..ClassDef::new(name)
        }
    }

    /// Proxy class implementing the given interfaces
    pub fn proxy<I, S>(name: impl Into<String>, interfaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ClassDef {
            modifiers: Modifiers::PUBLIC | Modifiers::FINAL,
            superclass: Some(PROXY.to_string()),
            interfaces: interfaces.into_iter().map(Into::into).collect(),
            proxy: true,
            ..ClassDef::new(name)
        }
    }

    /// Array class definition for an array class name
    pub(crate) fn array(name: impl Into<String>, modifiers: Modifiers) -> Self {
        ClassDef {
            modifiers,
            interfaces: vec!["java.lang.Cloneable".to_string(), SERIALIZABLE.to_string()],
            ..ClassDef::new(name)
        }
    }

    /// Replace the class modifiers
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Set the superclass
    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    /// Add an implemented interface
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        let interface = interface.into();
        if !self.interfaces.contains(&interface) {
            self.interfaces.push(interface);
        }
        self
    }

    /// Implement `java.io.Serializable`
    pub fn serializable(self) -> Self {
        self.implements(SERIALIZABLE)
    }

    /// Implement `java.io.Externalizable`
    pub fn externalizable(self) -> Self {
        self.implements(EXTERNALIZABLE)
    }

    /// Add a private instance field
    pub fn field(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.field_with_modifiers(name, field_type, Modifiers::PRIVATE)
    }

    /// Add a private transient field
    pub fn transient_field(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.field_with_modifiers(name, field_type, Modifiers::PRIVATE | Modifiers::TRANSIENT)
    }

    /// Add a private static field
    pub fn static_field(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.field_with_modifiers(name, field_type, Modifiers::PRIVATE | Modifiers::STATIC)
    }

    /// Add a field with explicit modifiers
    pub fn field_with_modifiers(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
        modifiers: Modifiers,
    ) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            field_type,
            modifiers,
        });
        self
    }

    /// Declare the serializable fields explicitly
    pub fn persistent_fields(mut self, fields: Vec<PersistentField>) -> Self {
        self.persistent_fields = Some(fields);
        self
    }

    /// Declare the version id explicitly
    pub fn serial_version_uid(mut self, suid: i64) -> Self {
        self.serial_version_uid = Some(suid);
        self
    }

    /// Add a constructor
    pub fn constructor(mut self, constructor: ConstructorDef) -> Self {
        self.constructors.push(constructor);
        self
    }

    /// Add a method
    pub fn method(
        mut self,
        name: impl Into<String>,
        descriptor: impl Into<String>,
        modifiers: Modifiers,
    ) -> Self {
        self.methods.push(MethodDef {
            name: name.into(),
            descriptor: descriptor.into(),
            modifiers,
        });
        self
    }

    /// Declare a static initializer
    pub fn static_initializer(mut self) -> Self {
        self.static_initializer = true;
        self
    }

    /// Set the custom write routine
    pub fn write_object(
        mut self,
        hook: impl Fn(&mut WriteFrame<'_, '_>) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.write_object = Some(Arc::new(hook));
        self
    }

    /// Set the custom read routine
    pub fn read_object(
        mut self,
        hook: impl Fn(&mut ReadFrame<'_, '_>) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.read_object = Some(Arc::new(hook));
        self
    }

    /// Set the routine run when the stream has no data for this class
    pub fn read_object_no_data(
        mut self,
        hook: impl Fn(&mut Heap, ObjectId) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.read_object_no_data = Some(Arc::new(hook));
        self
    }

    /// Set the write-side substitution routine
    pub fn write_replace(
        mut self,
        hook: impl Fn(&mut Heap, ObjectId) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.write_replace = Some(Arc::new(hook));
        self
    }

    /// Set the read-side substitution routine
    pub fn read_resolve(
        mut self,
        hook: impl Fn(&mut Heap, ObjectId) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.read_resolve = Some(Arc::new(hook));
        self
    }

    /// Set the externalizable payload writer
    pub fn write_external(
        mut self,
        hook: impl Fn(&mut WriteFrame<'_, '_>) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.write_external = Some(Arc::new(hook));
        self
    }

    /// Set the externalizable payload reader
    pub fn read_external(
        mut self,
        hook: impl Fn(&mut ReadFrame<'_, '_>) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.read_external = Some(Arc::new(hook));
        self
    }

    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Class modifiers
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Superclass name (`None` for direct subclasses of `java.lang.Object`)
    pub fn superclass(&self) -> Option<&str> {
        self.superclass.as_deref()
    }

    /// Directly implemented interfaces
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    /// Declared fields, static and transient included
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Explicit serializable field list
    pub fn declared_persistent_fields(&self) -> Option<&[PersistentField]> {
        self.persistent_fields.as_deref()
    }

    /// Serializable fields: the explicit list or every non-static,
    /// non-transient declared field
    pub fn serial_fields(&self) -> Vec<PersistentField> {
        match &self.persistent_fields {
            Some(fields) => fields.clone(),
            None => self
                .fields
                .iter()
                .filter(|f| f.is_default_serializable())
                .map(|f| PersistentField::new(f.name.clone(), f.field_type.clone()))
                .collect(),
        }
    }

    /// Explicit version id
    pub fn declared_serial_version_uid(&self) -> Option<i64> {
        self.serial_version_uid
    }

    /// Constructors, including the implicit default constructor of a class
    /// that declares none
    pub fn constructors(&self) -> Vec<ConstructorDef> {
        if self.constructors.is_empty() && !self.is_interface() && !self.is_array() {
            let access = self
                .modifiers
                .masked(Modifiers::PUBLIC | Modifiers::PROTECTED | Modifiers::PRIVATE);
            vec![ConstructorDef::no_arg(access)]
        } else {
            self.constructors.clone()
        }
    }

    /// The no-arg constructor, if declared (or implicit)
    pub fn no_arg_constructor(&self) -> Option<ConstructorDef> {
        self.constructors().into_iter().find(|c| c.is_no_arg())
    }

    /// Declared methods
    pub fn methods(&self) -> &[MethodDef] {
        &self.methods
    }

    /// Whether a static initializer is declared
    pub fn has_static_initializer(&self) -> bool {
        self.static_initializer
    }

    /// Enum constant names (`None` for non-enum classes)
    pub fn enum_constants(&self) -> Option<&[String]> {
        self.enum_constants.as_deref()
    }

    /// Whether the class declares enum constants
    pub fn is_enum(&self) -> bool {
        self.enum_constants.is_some()
    }

    /// Whether this is a proxy class
    pub fn is_proxy(&self) -> bool {
        self.proxy
    }

    /// Whether this is an interface
    pub fn is_interface(&self) -> bool {
        self.modifiers.contains(Modifiers::INTERFACE)
    }

    /// Whether this is an array class
    pub fn is_array(&self) -> bool {
        self.name.starts_with('[')
    }

    /// Package part of the name
    pub fn package(&self) -> &str {
        package_of(&self.name)
    }

    /// Serialization hooks
    pub fn hooks(&self) -> &ClassHooks {
        &self.hooks
    }
}

/// Package part of a class name (empty for the default package)
pub fn package_of(class_name: &str) -> &str {
    class_name.rfind('.').map(|i| &class_name[..i]).unwrap_or("")
}

/// Name after the last '.'
pub fn base_name(class_name: &str) -> &str {
    class_name
        .rfind('.')
        .map(|i| &class_name[i + 1..])
        .unwrap_or(class_name)
}
