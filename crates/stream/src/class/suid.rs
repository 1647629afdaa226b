//! Default version identifier
//!
//! Classes that do not declare a version id get one derived from their
//! structure. The canonical byte sequence covers, in order:
//!
//! 1. class name
//! 2. class modifiers (public, final, interface, abstract)
//! 3. sorted interface names (not for arrays)
//! 4. sorted fields, skipping private static and private transient ones
//! 5. `<clinit>` when a static initializer is declared
//! 6. sorted non-private constructors as `<init>`
//! 7. sorted non-private methods
//!
//! Strings use the `writeUTF` form (u16 length + modified UTF-8) and
//! integers are big-endian. The sequence is digested with SHA-256 and the
//! first eight digest bytes are read as a little-endian i64.

use super::def::ClassDef;
use crate::utf;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use objstream_core::Modifiers;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;

const CLASS_MASK: Modifiers = Modifiers::from_bits(
    Modifiers::PUBLIC.bits()
        | Modifiers::FINAL.bits()
        | Modifiers::INTERFACE.bits()
        | Modifiers::ABSTRACT.bits(),
);

const FIELD_MASK: Modifiers = Modifiers::from_bits(
    Modifiers::PUBLIC.bits()
        | Modifiers::PRIVATE.bits()
        | Modifiers::PROTECTED.bits()
        | Modifiers::STATIC.bits()
        | Modifiers::FINAL.bits()
        | Modifiers::VOLATILE.bits()
        | Modifiers::TRANSIENT.bits(),
);

const METHOD_MASK: Modifiers = Modifiers::from_bits(
    Modifiers::PUBLIC.bits()
        | Modifiers::PRIVATE.bits()
        | Modifiers::PROTECTED.bits()
        | Modifiers::STATIC.bits()
        | Modifiers::FINAL.bits()
        | Modifiers::SYNCHRONIZED.bits()
        | Modifiers::NATIVE.bits()
        | Modifiers::ABSTRACT.bits()
        | Modifiers::STRICT.bits(),
);

/// Canonical byte sequence hashed into the default version id
pub fn canonical_bytes(def: &ClassDef) -> Vec<u8> {
    let mut out = Vec::new();
    write_utf(&mut out, def.name());

    let mut class_mods = def.modifiers().masked(CLASS_MASK);
    if class_mods.contains(Modifiers::INTERFACE) {
        class_mods = if def.methods().is_empty() {
            class_mods.without(Modifiers::ABSTRACT)
        } else {
            class_mods | Modifiers::ABSTRACT
        };
    }
    write_int(&mut out, class_mods);

    if !def.is_array() {
        let mut interfaces: Vec<&str> = def.interfaces().iter().map(String::as_str).collect();
        interfaces.sort_by(|a, b| java_cmp(a, b));
        for name in interfaces {
            write_utf(&mut out, name);
        }
    }

    let mut fields: Vec<_> = def.fields().iter().collect();
    fields.sort_by(|a, b| java_cmp(&a.name, &b.name));
    for field in fields {
        let mods = field.modifiers.masked(FIELD_MASK);
        let private = mods.contains(Modifiers::PRIVATE);
        let static_or_transient =
            mods.contains(Modifiers::STATIC) || mods.contains(Modifiers::TRANSIENT);
        if !private || !static_or_transient {
            write_utf(&mut out, &field.name);
            write_int(&mut out, mods);
            write_utf(&mut out, &field.field_type.signature());
        }
    }

    if def.has_static_initializer() {
        write_utf(&mut out, "<clinit>");
        write_int(&mut out, Modifiers::STATIC);
        write_utf(&mut out, "()V");
    }

    let mut constructors = def.constructors();
    constructors.sort_by(|a, b| java_cmp(&a.descriptor, &b.descriptor));
    for ctor in constructors {
        let mods = ctor.modifiers.masked(METHOD_MASK);
        if !mods.contains(Modifiers::PRIVATE) {
            write_utf(&mut out, "<init>");
            write_int(&mut out, mods);
            write_utf(&mut out, &ctor.descriptor.replace('/', "."));
        }
    }

    let mut methods: Vec<_> = def.methods().iter().collect();
    methods.sort_by(|a, b| java_cmp(&a.name, &b.name).then_with(|| java_cmp(&a.descriptor, &b.descriptor)));
    for method in methods {
        let mods = method.modifiers.masked(METHOD_MASK);
        if !mods.contains(Modifiers::PRIVATE) {
            write_utf(&mut out, &method.name);
            write_int(&mut out, mods);
            write_utf(&mut out, &method.descriptor.replace('/', "."));
        }
    }
    out
}

/// Default version id of a class
pub fn default_suid(def: &ClassDef) -> i64 {
    let digest = Sha256::digest(canonical_bytes(def));
    let mut head = &digest[..8];
    // An 8-byte slice always yields an i64.
    head.read_i64::<LittleEndian>().unwrap_or_default()
}

/// String order by UTF-16 code units
pub(crate) fn java_cmp(a: &str, b: &str) -> Ordering {
    a.encode_utf16().cmp(b.encode_utf16())
}

fn write_utf(out: &mut Vec<u8>, s: &str) {
    let len = utf::encoded_len(s).min(u16::MAX as usize);
    // Writes into a Vec cannot fail.
    let _ = out.write_u16::<BigEndian>(len as u16);
    utf::encode_into(s, out);
}

fn write_int(out: &mut Vec<u8>, mods: Modifiers) {
    let _ = out.write_i32::<BigEndian>(i32::from(mods.bits()));
}
