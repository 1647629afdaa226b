//! Primitive value codec shared by the encoder and the decoder
//!
//! Primitives are fixed-width big-endian; booleans are one byte, non-zero
//! meaning true. Default field data is the concatenation of a class's
//! primitive fields at their descriptor offsets.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use objstream_core::{PrimitiveType, Value};
use std::io::{self, Read, Write};

/// Write one primitive value
///
/// References are rejected with `InvalidInput`.
pub(crate) fn write_primitive<W: Write + ?Sized>(w: &mut W, value: Value) -> io::Result<()> {
    match value {
        Value::Boolean(v) => w.write_u8(u8::from(v)),
        Value::Byte(v) => w.write_i8(v),
        Value::Char(v) => w.write_u16::<BigEndian>(v),
        Value::Short(v) => w.write_i16::<BigEndian>(v),
        Value::Int(v) => w.write_i32::<BigEndian>(v),
        Value::Long(v) => w.write_i64::<BigEndian>(v),
        Value::Float(v) => w.write_f32::<BigEndian>(v),
        Value::Double(v) => w.write_f64::<BigEndian>(v),
        Value::Null | Value::Ref(_) => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "reference is not a primitive value",
        )),
    }
}

/// Read one primitive value of the given type
pub(crate) fn read_primitive<R: Read + ?Sized>(r: &mut R, ty: PrimitiveType) -> io::Result<Value> {
    Ok(match ty {
        PrimitiveType::Boolean => Value::Boolean(r.read_u8()? != 0),
        PrimitiveType::Byte => Value::Byte(r.read_i8()?),
        PrimitiveType::Char => Value::Char(r.read_u16::<BigEndian>()?),
        PrimitiveType::Short => Value::Short(r.read_i16::<BigEndian>()?),
        PrimitiveType::Int => Value::Int(r.read_i32::<BigEndian>()?),
        PrimitiveType::Long => Value::Long(r.read_i64::<BigEndian>()?),
        PrimitiveType::Float => Value::Float(r.read_f32::<BigEndian>()?),
        PrimitiveType::Double => Value::Double(r.read_f64::<BigEndian>()?),
    })
}

/// Store a primitive at `offset` of a field data buffer
pub(crate) fn put_primitive(buf: &mut [u8], offset: usize, value: Value) -> io::Result<()> {
    let width = value
        .primitive_type()
        .map(PrimitiveType::size)
        .unwrap_or(0);
    let slot = buf
        .get_mut(offset..offset + width)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "field offset out of range"))?;
    write_primitive(&mut &mut *slot, value)
}

/// Load a primitive from `offset` of a field data buffer
pub(crate) fn get_primitive(buf: &[u8], offset: usize, ty: PrimitiveType) -> io::Result<Value> {
    let mut slot = buf.get(offset..offset + ty.size()).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "field offset out of range")
    })?;
    read_primitive(&mut slot, ty)
}
