//! Wire format constants
//!
//! ## Stream Layout
//!
//! ```text
//! stream      := magic:u16 version:u16 content*
//! content     := object | blockdata
//! blockdata   := TC_BLOCKDATA len:u8 bytes
//!              | TC_BLOCKDATALONG len:i32 bytes
//! object      := TC_NULL
//!              | TC_REFERENCE handle:i32
//!              | TC_CLASS classDesc
//!              | TC_STRING len:u16 mutf8 | TC_LONGSTRING len:i64 mutf8
//!              | TC_ARRAY classDesc len:i32 element*
//!              | TC_ENUM classDesc constantName
//!              | TC_OBJECT classDesc classdata*
//!              | TC_RESET | TC_EXCEPTION object
//! classDesc   := TC_CLASSDESC name:utf suid:i64 flags:u8 count:u16 field*
//!                  annotation TC_ENDBLOCKDATA superDesc
//!              | TC_PROXYCLASSDESC count:i32 iface:utf*
//!                  annotation TC_ENDBLOCKDATA superDesc
//!              | TC_NULL | TC_REFERENCE handle:i32
//! field       := code:u8 name:utf [typeString]   (typeString for 'L' and '[')
//! classdata   := primitive-fields reference-fields        (default)
//!              | fields? blockdata/objects* TC_ENDBLOCKDATA (custom write hook)
//!              | blockdata/objects* TC_ENDBLOCKDATA        (externalizable, protocol 2)
//! ```
//!
//! All integers are big-endian. Handles are assigned from `BASE_WIRE_HANDLE`
//! upward in the order records are first written.

use serde::{Deserialize, Serialize};

/// Stream magic number
pub const STREAM_MAGIC: u16 = 0xACED;
/// Stream format version
pub const STREAM_VERSION: u16 = 5;

/// Null reference
pub const TC_NULL: u8 = 0x70;
/// Back-reference to a handle
pub const TC_REFERENCE: u8 = 0x71;
/// Class descriptor
pub const TC_CLASSDESC: u8 = 0x72;
/// Object instance
pub const TC_OBJECT: u8 = 0x73;
/// String, u16 length
pub const TC_STRING: u8 = 0x74;
/// Array
pub const TC_ARRAY: u8 = 0x75;
/// Class object
pub const TC_CLASS: u8 = 0x76;
/// Block data, u8 length
pub const TC_BLOCKDATA: u8 = 0x77;
/// End of optional block data
pub const TC_ENDBLOCKDATA: u8 = 0x78;
/// Handle table reset
pub const TC_RESET: u8 = 0x79;
/// Block data, i32 length
pub const TC_BLOCKDATALONG: u8 = 0x7A;
/// Writer-side failure record
pub const TC_EXCEPTION: u8 = 0x7B;
/// String, i64 length
pub const TC_LONGSTRING: u8 = 0x7C;
/// Proxy class descriptor
pub const TC_PROXYCLASSDESC: u8 = 0x7D;
/// Enum constant
pub const TC_ENUM: u8 = 0x7E;

/// First handle value
pub const BASE_WIRE_HANDLE: i32 = 0x7E0000;

/// Class has a custom write hook
pub const SC_WRITE_METHOD: u8 = 0x01;
/// Class is serializable
pub const SC_SERIALIZABLE: u8 = 0x02;
/// Class is externalizable
pub const SC_EXTERNALIZABLE: u8 = 0x04;
/// Externalizable data is written in block-data mode
pub const SC_BLOCK_DATA: u8 = 0x08;
/// Class is an enum
pub const SC_ENUM: u8 = 0x10;

/// Largest payload of a short block-data record
pub const MAX_BLOCK_HEADER_LEN: usize = 0xFF;

/// Largest encoded length of a short-form string
pub const MAX_UTF_LEN: usize = 0xFFFF;

/// Default block-data buffer size
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Whether the byte is one of the record tags
pub fn is_tag(byte: u8) -> bool {
    (TC_NULL..=TC_ENUM).contains(&byte)
}

/// Human-readable tag name for logs and errors
pub fn tag_name(tag: u8) -> &'static str {
    match tag {
        TC_NULL => "TC_NULL",
        TC_REFERENCE => "TC_REFERENCE",
        TC_CLASSDESC => "TC_CLASSDESC",
        TC_OBJECT => "TC_OBJECT",
        TC_STRING => "TC_STRING",
        TC_ARRAY => "TC_ARRAY",
        TC_CLASS => "TC_CLASS",
        TC_BLOCKDATA => "TC_BLOCKDATA",
        TC_ENDBLOCKDATA => "TC_ENDBLOCKDATA",
        TC_RESET => "TC_RESET",
        TC_BLOCKDATALONG => "TC_BLOCKDATALONG",
        TC_EXCEPTION => "TC_EXCEPTION",
        TC_LONGSTRING => "TC_LONGSTRING",
        TC_PROXYCLASSDESC => "TC_PROXYCLASSDESC",
        TC_ENUM => "TC_ENUM",
        _ => "unknown",
    }
}

/// Encoding of externalizable payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    /// Externalizable data written raw; readers cannot skip it
    V1,
    /// Externalizable data written in block-data mode
    #[default]
    V2,
}

impl ProtocolVersion {
    /// Protocol number
    pub fn number(self) -> u8 {
        match self {
            ProtocolVersion::V1 => 1,
            ProtocolVersion::V2 => 2,
        }
    }
}
