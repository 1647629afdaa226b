//! Class model: definitions, descriptors, version ids and the registry

pub mod def;
pub mod descriptor;
pub mod registry;
pub mod suid;

pub use def::{
    base_name, package_of, ClassDef, ClassHooks, ConstructorDef, FieldDef, MethodDef, ObjectHook,
    PersistentField, ReadObjectHook, ReplaceHook, WriteObjectHook, ENUM, EXTERNALIZABLE, OBJECT,
    PROXY, SERIALIZABLE,
};
pub use descriptor::{ClassDescriptor, FieldBinding, FieldDescriptor};
pub use registry::{ClassRegistry, INVOCATION_HANDLER, WRITE_FAILURE};
pub use suid::default_suid;
