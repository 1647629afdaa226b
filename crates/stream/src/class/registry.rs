//! Class registry
//!
//! Holds the application's class definitions and caches derived data
//! (descriptors and instance layouts) for the lifetime of the registry.
//! Registering or unregistering a class evicts every cached entry, so a
//! class can be redefined between streams to simulate evolution.
//!
//! The registry is shared between streams (`Arc<ClassRegistry>`) and is safe
//! to use from several threads.

use super::def::{
    ClassDef, ClassHooks, ConstructorDef, ReplaceHook, ENUM, EXTERNALIZABLE, OBJECT, PROXY,
    SERIALIZABLE,
};
use super::descriptor::{
    assign_offsets, sort_fields, ClassDescriptor, FieldBinding, FieldDescriptor,
};
use super::suid::default_suid;
use objstream_core::heap::{CLASS_CLASS, STRING_CLASS};
use objstream_core::{
    array_component, Error, FieldType, Heap, Incompatibility, InstanceLayout, Modifiers, ObjectId,
    Result, SlotInfo,
};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Name of the class carried by exception records
pub const WRITE_FAILURE: &str = "objstream.WriteFailure";
/// Name of the proxy handler interface
pub const INVOCATION_HANDLER: &str = "java.lang.reflect.InvocationHandler";
const CLONEABLE: &str = "java.lang.Cloneable";
const COMPARABLE: &str = "java.lang.Comparable";
const CHAR_SEQUENCE: &str = "java.lang.CharSequence";

/// Registry of class definitions with cached descriptors and layouts
pub struct ClassRegistry {
    defs: RwLock<HashMap<String, Arc<ClassDef>>>,
    descriptors: RwLock<HashMap<String, Arc<ClassDescriptor>>>,
    layouts: RwLock<HashMap<String, Arc<InstanceLayout>>>,
    proxy_counter: AtomicUsize,
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("classes", &self.defs.read().len())
            .field("descriptors", &self.descriptors.read().len())
            .finish()
    }
}

impl ClassRegistry {
    /// Registry holding the built-in classes
    pub fn new() -> Self {
        let registry = ClassRegistry {
            defs: RwLock::new(HashMap::new()),
            descriptors: RwLock::new(HashMap::new()),
            layouts: RwLock::new(HashMap::new()),
            proxy_counter: AtomicUsize::new(0),
        };
        {
            let mut defs = registry.defs.write();
            for def in builtin_defs() {
                defs.insert(def.name().to_string(), Arc::new(def));
            }
        }
        registry
    }

    /// Register a class definition, replacing any definition of the same name
    pub fn register(&self, def: ClassDef) -> Result<Arc<ClassDef>> {
        validate_definition(&def)?;
        {
            let defs = self.defs.read();
            let mut seen = HashSet::new();
            let mut next = def.superclass().map(str::to_string);
            while let Some(name) = next {
                if name == def.name() || !seen.insert(name.clone()) {
                    return Err(Error::InvalidDefinition(format!(
                        "class {} is its own superclass",
                        def.name()
                    )));
                }
                next = defs
                    .get(&name)
                    .and_then(|d| d.superclass().map(str::to_string));
            }
        }

        let def = Arc::new(def);
        let replaced = self
            .defs
            .write()
            .insert(def.name().to_string(), Arc::clone(&def))
            .is_some();
        self.clear_caches();
        debug!(
            target: "objstream::registry",
            class = %def.name(),
            replaced,
            "Registered class"
        );
        Ok(def)
    }

    /// Remove a class definition and evict all cached data
    pub fn unregister(&self, name: &str) -> Option<Arc<ClassDef>> {
        let removed = self.defs.write().remove(name);
        self.clear_caches();
        if removed.is_some() {
            debug!(target: "objstream::registry", class = %name, "Unregistered class");
        }
        removed
    }

    fn clear_caches(&self) {
        self.descriptors.write().clear();
        self.layouts.write().clear();
    }

    /// Whether a class of this name can be resolved
    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Definition of a class; array classes are synthesized from their
    /// component type
    pub fn lookup(&self, name: &str) -> Option<Arc<ClassDef>> {
        if let Some(def) = self.defs.read().get(name) {
            return Some(Arc::clone(def));
        }
        if !name.starts_with('[') {
            return None;
        }
        let access = match array_component(name)? {
            FieldType::Primitive(_) => Modifiers::PUBLIC,
            FieldType::Reference(sig) => {
                let component = FieldType::Reference(sig).class_name()?;
                self.lookup(&component)?
                    .modifiers()
                    .masked(Modifiers::PUBLIC | Modifiers::PRIVATE | Modifiers::PROTECTED)
            }
        };
        Some(Arc::new(ClassDef::array(
            name,
            access | Modifiers::FINAL | Modifiers::ABSTRACT,
        )))
    }

    /// Class and its superclasses, most-derived first
    pub fn hierarchy(&self, name: &str) -> Result<Vec<Arc<ClassDef>>> {
        let mut chain = Vec::new();
        let mut next = Some(name.to_string());
        while let Some(current) = next {
            let def = self
                .lookup(&current)
                .ok_or_else(|| Error::ClassNotFound(current.clone()))?;
            if chain.iter().any(|d: &Arc<ClassDef>| d.name() == def.name()) {
                return Err(Error::InvalidDefinition(format!(
                    "circular superclass chain at {}",
                    current
                )));
            }
            next = def.superclass().map(str::to_string);
            chain.push(def);
        }
        Ok(chain)
    }

    /// Whether a value of class `from` may be stored where `to` is expected
    pub fn is_assignable(&self, from: &str, to: &str) -> bool {
        if from == to || to == OBJECT {
            return true;
        }
        if from.starts_with('[') {
            if to == CLONEABLE || to == SERIALIZABLE {
                return true;
            }
            let component = |name: &str| array_component(name).and_then(|t| t.class_name());
            return match (component(from), to.starts_with('[').then(|| component(to)).flatten()) {
                (Some(a), Some(b)) => self.is_assignable(&a, &b),
                _ => false,
            };
        }
        let defs = self.defs.read();
        let mut stack = vec![from.to_string()];
        let mut seen = HashSet::new();
        while let Some(name) = stack.pop() {
            if name == to {
                return true;
            }
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some(def) = defs.get(&name) {
                stack.extend(def.superclass().map(str::to_string));
                stack.extend(def.interfaces().iter().cloned());
            }
        }
        false
    }

    /// Whether instances of the class can be serialized
    pub fn is_serializable(&self, name: &str) -> bool {
        self.is_assignable(name, SERIALIZABLE)
    }

    /// Whether the class controls its own encoding
    pub fn is_externalizable(&self, name: &str) -> bool {
        !name.starts_with('[') && self.is_assignable(name, EXTERNALIZABLE)
    }

    /// Whether the class is an enum
    pub fn is_enum(&self, name: &str) -> bool {
        !name.starts_with('[') && self.is_assignable(name, ENUM)
    }

    /// Serialization descriptor of a local class
    pub fn describe(&self, name: &str) -> Result<Arc<ClassDescriptor>> {
        if let Some(desc) = self.descriptors.read().get(name) {
            return Ok(Arc::clone(desc));
        }
        let desc = Arc::new(self.build_descriptor(name)?);
        trace!(
            target: "objstream::registry",
            class = %name,
            suid = desc.serial_version_uid(),
            fields = desc.fields().len(),
            "Built class descriptor"
        );
        let mut cache = self.descriptors.write();
        Ok(Arc::clone(cache.entry(name.to_string()).or_insert(desc)))
    }

    /// Version id of a local class
    pub fn serial_version_uid(&self, name: &str) -> Result<i64> {
        Ok(self.describe(name)?.serial_version_uid())
    }

    fn build_descriptor(&self, name: &str) -> Result<ClassDescriptor> {
        let def = self
            .lookup(name)
            .ok_or_else(|| Error::ClassNotFound(name.to_string()))?;
        let is_array = def.is_array();
        let serializable = self.is_serializable(name);
        let externalizable = self.is_externalizable(name);
        let is_enum = self.is_enum(name);
        let is_proxy = def.is_proxy();

        let superclass = match def.superclass() {
            Some(sup) if !is_array => {
                if !self.contains(sup) {
                    return Err(Error::ClassNotFound(sup.to_string()));
                }
                if self.is_serializable(sup) {
                    Some(self.describe(sup)?)
                } else {
                    None
                }
            }
            _ => None,
        };

        let suid = if !serializable || is_enum || is_proxy {
            0
        } else {
            def.declared_serial_version_uid()
                .unwrap_or_else(|| default_suid(&def))
        };

        let mut fields = Vec::new();
        let mut default_serialize_error = None;
        if serializable
            && !externalizable
            && !is_enum
            && !is_proxy
            && !is_array
            && !def.is_interface()
        {
            let layout = self.layout(name)?;
            for pf in def.serial_fields() {
                let mut field = FieldDescriptor::new(pf.name, pf.field_type, pf.unshared);
                let local = def
                    .fields()
                    .iter()
                    .find(|f| f.name == field.name && !f.modifiers.is_static());
                match (local, layout.slot_index(name, &field.name)) {
                    (Some(f), Some(index)) if f.field_type == field.field_type => {
                        field.binding = FieldBinding::Slot {
                            index,
                            local_type: f.field_type.clone(),
                        };
                    }
                    _ => {
                        default_serialize_error =
                            Some(Incompatibility::UnmatchedField(field.name.clone()));
                    }
                }
                fields.push(field);
            }
            sort_fields(&mut fields);
        }
        let (prim_data_size, num_obj_fields) =
            assign_offsets(&mut fields).map_err(|reason| Error::incompatible(name, reason))?;

        let deserialize_error = if is_array {
            None
        } else if is_enum {
            Some(Incompatibility::InvalidDescriptor("enum type".to_string()))
        } else if !serializable || !self.has_valid_constructor(&def, externalizable)? {
            Some(Incompatibility::NoValidConstructor)
        } else {
            None
        };

        Ok(ClassDescriptor {
            name: name.to_string(),
            suid,
            serializable,
            externalizable,
            has_write_object_data: serializable
                && !externalizable
                && def.hooks().write_object.is_some(),
            has_block_external_data: true,
            is_enum,
            proxy_interfaces: is_proxy.then(|| def.interfaces().to_vec()),
            fields,
            prim_data_size,
            num_obj_fields,
            superclass,
            local: Some(def),
            deserialize_error,
            default_serialize_error,
        })
    }

    /// Whether an instance can be created without running serializable
    /// constructors
    ///
    /// Externalizable classes need a public no-arg constructor of their own;
    /// serializable classes need an accessible no-arg constructor on the
    /// nearest non-serializable ancestor.
    fn has_valid_constructor(&self, def: &ClassDef, externalizable: bool) -> Result<bool> {
        if externalizable {
            return Ok(def
                .no_arg_constructor()
                .map_or(false, |c| c.modifiers.contains(Modifiers::PUBLIC)));
        }
        let chain = self.hierarchy(def.name())?;
        let init_class = chain.iter().find(|d| !self.is_serializable(d.name()));
        Ok(match init_class {
            None => true,
            Some(init) => match init.no_arg_constructor() {
                None => false,
                Some(c) if c.modifiers.is_private() => false,
                Some(c)
                    if !c.modifiers.contains(Modifiers::PUBLIC)
                        && !c.modifiers.contains(Modifiers::PROTECTED) =>
                {
                    init.package() == def.package()
                }
                Some(_) => true,
            },
        })
    }

    /// Slot layout of a class's instances
    pub fn layout(&self, name: &str) -> Result<Arc<InstanceLayout>> {
        if let Some(layout) = self.layouts.read().get(name) {
            return Ok(Arc::clone(layout));
        }
        let chain = self.hierarchy(name)?;
        let slots = chain
            .iter()
            .rev()
            .flat_map(|def| {
                def.fields()
                    .iter()
                    .filter(|f| !f.modifiers.is_static())
                    .map(move |f| SlotInfo {
                        declaring_class: def.name().to_string(),
                        name: f.name.clone(),
                        field_type: f.field_type.clone(),
                    })
            })
            .collect();
        let layout = Arc::new(InstanceLayout::new(name, slots));
        let mut cache = self.layouts.write();
        Ok(Arc::clone(cache.entry(name.to_string()).or_insert(layout)))
    }

    /// Create an instance, running every no-arg constructor from the root
    pub fn new_instance(&self, heap: &mut Heap, name: &str) -> Result<ObjectId> {
        self.construct(heap, name, false)
    }

    /// Create an instance for deserialization
    ///
    /// Serializable classes only run the constructors of the ancestors above
    /// the nearest non-serializable class; externalizable classes run their
    /// whole constructor chain.
    pub(crate) fn instantiate(
        &self,
        heap: &mut Heap,
        name: &str,
        externalizable: bool,
    ) -> Result<ObjectId> {
        self.construct(heap, name, !externalizable)
    }

    fn construct(&self, heap: &mut Heap, name: &str, skip_serializable: bool) -> Result<ObjectId> {
        let layout = self.layout(name)?;
        let chain = self.hierarchy(name)?;
        let id = heap.alloc_instance(layout);
        let start = if skip_serializable {
            chain
                .iter()
                .position(|d| !self.is_serializable(d.name()))
                .unwrap_or(chain.len())
        } else {
            0
        };
        for def in chain[start..].iter().rev() {
            if let Some(init) = def.no_arg_constructor().and_then(|c| c.init) {
                init(heap, id)?;
            }
        }
        Ok(id)
    }

    /// Interned enum constant
    pub fn enum_constant(&self, heap: &mut Heap, class_name: &str, name: &str) -> Result<ObjectId> {
        let def = self
            .lookup(class_name)
            .ok_or_else(|| Error::ClassNotFound(class_name.to_string()))?;
        match def.enum_constants() {
            Some(constants) if constants.iter().any(|c| c == name) => {
                Ok(heap.enum_constant(class_name, name))
            }
            Some(_) => Err(Error::InvalidObject(format!(
                "enum constant {} does not exist in {}",
                name, class_name
            ))),
            None => Err(Error::InvalidObject(format!("{} is not an enum", class_name))),
        }
    }

    /// Proxy class implementing exactly these interfaces
    ///
    /// A registered proxy class is preferred; otherwise one is defined if
    /// every interface resolves.
    pub fn resolve_proxy(&self, interfaces: &[String]) -> Option<Arc<ClassDef>> {
        let existing = self
            .defs
            .read()
            .values()
            .find(|d| d.is_proxy() && d.interfaces() == interfaces)
            .cloned();
        if existing.is_some() {
            return existing;
        }
        let all_interfaces = interfaces
            .iter()
            .all(|i| self.lookup(i).map_or(false, |d| d.is_interface()));
        if !all_interfaces {
            return None;
        }
        let n = self.proxy_counter.fetch_add(1, Ordering::Relaxed);
        let def = ClassDef::proxy(format!("objstream.proxy.$Proxy{}", n), interfaces.iter().cloned());
        self.register(def).ok()
    }

    /// Nearest hook selected by `pick`, searching from the class up
    pub fn find_hook<T>(&self, name: &str, pick: impl Fn(&ClassHooks) -> Option<T>) -> Option<T> {
        self.hierarchy(name)
            .ok()?
            .iter()
            .find_map(|d| pick(d.hooks()))
    }

    /// Nearest class-level write-side substitution routine
    pub fn find_write_replace(&self, name: &str) -> Option<ReplaceHook> {
        self.find_hook(name, |h| h.write_replace.clone())
    }

    /// Nearest class-level read-side substitution routine
    pub fn find_read_resolve(&self, name: &str) -> Option<ReplaceHook> {
        self.find_hook(name, |h| h.read_resolve.clone())
    }
}

fn validate_definition(def: &ClassDef) -> Result<()> {
    let name = def.name();
    if name.is_empty() || name.starts_with('[') || name.contains('/') || name.contains(';') {
        return Err(Error::InvalidDefinition(format!("invalid class name '{}'", name)));
    }
    let mut seen = HashSet::new();
    for field in def.fields() {
        if !seen.insert(field.name.as_str()) {
            return Err(Error::InvalidDefinition(format!(
                "duplicate field {} in {}",
                field.name, name
            )));
        }
    }
    if let Some(persistent) = def.declared_persistent_fields() {
        let mut seen = HashSet::new();
        for field in persistent {
            if !seen.insert(field.name.as_str()) {
                return Err(Error::InvalidDefinition(format!(
                    "duplicate persistent field {} in {}",
                    field.name, name
                )));
            }
        }
    }
    if let Some(constants) = def.enum_constants() {
        let mut seen = HashSet::new();
        if let Some(dup) = constants.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(Error::InvalidDefinition(format!(
                "duplicate enum constant {} in {}",
                dup, name
            )));
        }
    }
    Ok(())
}

fn builtin_defs() -> Vec<ClassDef> {
    let string = FieldType::string();
    vec![
        ClassDef::new(OBJECT),
        ClassDef::interface(SERIALIZABLE),
        ClassDef::interface(EXTERNALIZABLE)
            .implements(SERIALIZABLE)
            .method(
                "readExternal",
                "(Ljava/io/ObjectInput;)V",
                Modifiers::PUBLIC | Modifiers::ABSTRACT,
            )
            .method(
                "writeExternal",
                "(Ljava/io/ObjectOutput;)V",
                Modifiers::PUBLIC | Modifiers::ABSTRACT,
            ),
        ClassDef::interface(CLONEABLE),
        ClassDef::interface(COMPARABLE),
        ClassDef::interface(CHAR_SEQUENCE),
        ClassDef::interface(INVOCATION_HANDLER),
        ClassDef::new(ENUM)
            .with_modifiers(Modifiers::PUBLIC | Modifiers::ABSTRACT)
            .implements(COMPARABLE)
            .serializable()
            .constructor(ConstructorDef::new(
                "(Ljava/lang/String;I)V",
                Modifiers::PROTECTED,
            )),
        ClassDef::new(STRING_CLASS)
            .with_modifiers(Modifiers::PUBLIC | Modifiers::FINAL)
            .serializable()
            .implements(COMPARABLE)
            .implements(CHAR_SEQUENCE)
            .serial_version_uid(-6849794470754667710)
            .persistent_fields(Vec::new()),
        ClassDef::new(CLASS_CLASS)
            .with_modifiers(Modifiers::PUBLIC | Modifiers::FINAL)
            .serializable()
            .serial_version_uid(3206093459760846163)
            .persistent_fields(Vec::new()),
        ClassDef::new(PROXY)
            .serializable()
            .serial_version_uid(-2222568056686623797)
            .field_with_modifiers("h", FieldType::object(INVOCATION_HANDLER), Modifiers::PROTECTED)
            .constructor(ConstructorDef::no_arg(Modifiers::PRIVATE))
            .constructor(ConstructorDef::new(
                "(Ljava/lang/reflect/InvocationHandler;)V",
                Modifiers::PROTECTED,
            )),
        ClassDef::new(WRITE_FAILURE)
            .with_modifiers(Modifiers::PUBLIC | Modifiers::FINAL)
            .serializable()
            .serial_version_uid(1)
            .field("kind", string.clone())
            .field("message", string),
    ]
}
