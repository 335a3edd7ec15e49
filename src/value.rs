//! The S7comm-plus value type system.
//!
//! Every value on the wire starts with a flags byte and a type tag byte:
//!
//! | Flags  | Shape | Layout after the two header bytes |
//! |--------|-------|-----------------------------------|
//! | `0x00` | scalar | one element |
//! | `0x10` | array | VLQ count, then `count` elements |
//! | `0x20` | address array | same layout as an array |
//! | `0x40` | sparse array | `(VLQ key, element)` pairs, key `0` ends the list |
//!
//! [`Value`] is a closed enum over these shapes and each shape is a closed
//! enum over the element kinds it supports, so every `(flags, type tag)`
//! pair the codec understands is a distinct variant. Pairs without a variant
//! fail with [`DecodeError::Unsupported`].
//!
//! # Example
//!
//! ```
//! use s7commplus::{Array, Scalar, Value};
//!
//! let value = Value::Array(Array::UDInt(vec![1, 300]));
//! let mut buf = Vec::new();
//! value.encode(&mut buf).unwrap();
//! assert_eq!(buf, [0x10, 0x04, 0x02, 0x01, 0x82, 0x2C]);
//!
//! let decoded = Value::decode(&mut &buf[..]).unwrap();
//! assert_eq!(decoded, value);
//! assert_eq!(Value::from(Scalar::Bool(true)).as_bool(), Some(true));
//! ```

use std::io::{self, Read, Write};

use crate::error::DecodeError;
use crate::vlq::{self, DecodeResult};

/// Flags value of a plain scalar.
pub const FLAGS_SCALAR: u8 = 0x00;
/// Flags bit marking an array.
pub const FLAG_ARRAY: u8 = 0x10;
/// Flags bit marking an address array.
pub const FLAG_ADDRESS_ARRAY: u8 = 0x20;
/// Flags bit marking a sparse array.
pub const FLAG_SPARSE_ARRAY: u8 = 0x40;

/// Element kinds and their type tag bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    /// No value.
    Null = 0x00,
    /// Boolean.
    Bool = 0x01,
    /// Unsigned 8-bit integer.
    USInt = 0x02,
    /// Unsigned 16-bit integer.
    UInt = 0x03,
    /// Unsigned 32-bit integer (VLQ).
    UDInt = 0x04,
    /// Unsigned 64-bit integer (VLQ).
    ULInt = 0x05,
    /// Signed 8-bit integer.
    SInt = 0x06,
    /// Signed 16-bit integer.
    Int = 0x07,
    /// Signed 32-bit integer (VLQ).
    DInt = 0x08,
    /// Signed 64-bit integer (VLQ).
    LInt = 0x09,
    /// 8-bit bit string.
    Byte = 0x0A,
    /// 16-bit bit string.
    Word = 0x0B,
    /// 32-bit bit string.
    DWord = 0x0C,
    /// 64-bit bit string.
    LWord = 0x0D,
    /// 32-bit float.
    Real = 0x0E,
    /// 64-bit float.
    LReal = 0x0F,
    /// Microseconds since the Unix epoch.
    Timestamp = 0x10,
    /// Signed duration in nanoseconds (VLQ).
    Timespan = 0x11,
    /// Relation id (fixed 32-bit).
    Rid = 0x12,
    /// Attribute id (VLQ 32-bit).
    Aid = 0x13,
    /// Opaque byte blob.
    Blob = 0x14,
    /// Wide string.
    WString = 0x15,
    /// Nested struct.
    Struct = 0x17,
}

impl DataType {
    /// Returns the type tag byte.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Looks up a type tag byte.
    ///
    /// # Example
    ///
    /// ```
    /// use s7commplus::DataType;
    ///
    /// assert_eq!(DataType::from_tag(0x04), Some(DataType::UDInt));
    /// assert_eq!(DataType::from_tag(0x16), None);
    /// ```
    pub fn from_tag(tag: u8) -> Option<Self> {
        let ty = match tag {
            0x00 => Self::Null,
            0x01 => Self::Bool,
            0x02 => Self::USInt,
            0x03 => Self::UInt,
            0x04 => Self::UDInt,
            0x05 => Self::ULInt,
            0x06 => Self::SInt,
            0x07 => Self::Int,
            0x08 => Self::DInt,
            0x09 => Self::LInt,
            0x0A => Self::Byte,
            0x0B => Self::Word,
            0x0C => Self::DWord,
            0x0D => Self::LWord,
            0x0E => Self::Real,
            0x0F => Self::LReal,
            0x10 => Self::Timestamp,
            0x11 => Self::Timespan,
            0x12 => Self::Rid,
            0x13 => Self::Aid,
            0x14 => Self::Blob,
            0x15 => Self::WString,
            0x17 => Self::Struct,
            _ => return None,
        };
        Some(ty)
    }
}

/// Opaque byte payload owned by a root object.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Blob {
    /// Id of the object the blob belongs to (0 when free-standing).
    pub root_id: u32,
    /// Raw content.
    pub data: Vec<u8>,
}

impl Blob {
    /// Creates a free-standing blob.
    pub fn new(data: Vec<u8>) -> Self {
        Self { root_id: 0, data }
    }
}

/// Fixed-layout struct payload used for the reserved struct id ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedStruct {
    /// Interface timestamp of the packed layout.
    pub interface_timestamp: u64,
    /// Transport flags.
    pub transport_flags: u32,
    /// Raw element bytes.
    pub data: Vec<u8>,
}

/// Body of a [`Struct`].
#[derive(Debug, Clone, PartialEq)]
pub enum StructBody {
    /// Raw payload of a packed struct.
    Packed(PackedStruct),
    /// `(id, value)` elements of a generic struct.
    Elements(Vec<(u32, Value)>),
}

/// A nested struct value.
#[derive(Debug, Clone, PartialEq)]
pub struct Struct {
    /// Struct id, fixed 4 bytes on the wire; decides between the packed and
    /// the generic layout.
    pub id: u32,
    /// Struct content.
    pub body: StructBody,
}

impl Struct {
    /// Creates a generic struct from `(id, value)` elements.
    pub fn new(id: u32, elements: Vec<(u32, Value)>) -> Self {
        Self {
            id,
            body: StructBody::Elements(elements),
        }
    }

    /// Creates a packed struct.
    pub fn packed(id: u32, packed: PackedStruct) -> Self {
        Self {
            id,
            body: StructBody::Packed(packed),
        }
    }

    /// Returns `true` if structs with this id use the packed layout.
    ///
    /// # Example
    ///
    /// ```
    /// use s7commplus::Struct;
    ///
    /// assert!(Struct::is_packed_id(0x9000_0001));
    /// assert!(Struct::is_packed_id(0x0200_0001));
    /// assert!(!Struct::is_packed_id(0x9000_0000));
    /// assert!(!Struct::is_packed_id(1234));
    /// ```
    pub fn is_packed_id(id: u32) -> bool {
        (id > 0x9000_0000 && id < 0x9FFF_FFFF) || (id > 0x0200_0000 && id < 0x02FF_FFFF)
    }

    /// Returns the element with the given id of a generic struct.
    pub fn element(&self, id: u32) -> Option<&Value> {
        match &self.body {
            StructBody::Elements(elements) => elements
                .iter()
                .find(|(element_id, _)| *element_id == id)
                .map(|(_, value)| value),
            StructBody::Packed(_) => None,
        }
    }

    fn decode<R: Read + ?Sized>(r: &mut R) -> DecodeResult<Self> {
        let id = vlq::read_u32(r)?;
        if Self::is_packed_id(id) {
            let interface_timestamp = vlq::read_u64(r)?;
            let (transport_flags, _) = vlq::decode_u32(r)?;
            let (count, _) = vlq::decode_u32(r)?;
            let data = vlq::read_bytes(r, count as usize)?;
            return Ok(Self::packed(
                id,
                PackedStruct {
                    interface_timestamp,
                    transport_flags,
                    data,
                },
            ));
        }

        let mut elements = Vec::new();
        loop {
            let (element_id, _) = vlq::decode_u32(r)?;
            if element_id == 0 {
                break;
            }
            elements.push((element_id, Value::decode(r)?));
        }
        Ok(Self::new(id, elements))
    }

    fn encode<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<usize> {
        let packed_id = Self::is_packed_id(self.id);
        let mut len = vlq::write_u32(w, self.id)?;
        match &self.body {
            StructBody::Packed(packed) if packed_id => {
                len += vlq::write_u64(w, packed.interface_timestamp)?;
                len += vlq::encode_u32(w, packed.transport_flags)?;
                len += vlq::encode_u32(w, length_u32(packed.data.len())?)?;
                len += vlq::write_bytes(w, &packed.data)?;
            }
            StructBody::Elements(elements) if !packed_id => {
                for (element_id, value) in elements {
                    if *element_id == 0 {
                        return Err(invalid_input("struct element id 0 is reserved"));
                    }
                    len += vlq::encode_u32(w, *element_id)?;
                    len += value.encode(w)?;
                }
                len += vlq::write_u8(w, 0)?;
            }
            _ => {
                return Err(invalid_input(
                    "struct body does not match the layout of its id",
                ))
            }
        }
        Ok(len)
    }
}

/// A single element.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Boolean.
    Bool(bool),
    /// Unsigned 8-bit integer.
    USInt(u8),
    /// Unsigned 16-bit integer.
    UInt(u16),
    /// Unsigned 32-bit integer.
    UDInt(u32),
    /// Unsigned 64-bit integer.
    ULInt(u64),
    /// Signed 8-bit integer.
    SInt(i8),
    /// Signed 16-bit integer.
    Int(i16),
    /// Signed 32-bit integer.
    DInt(i32),
    /// Signed 64-bit integer.
    LInt(i64),
    /// 8-bit bit string.
    Byte(u8),
    /// 16-bit bit string.
    Word(u16),
    /// 32-bit bit string.
    DWord(u32),
    /// 64-bit bit string.
    LWord(u64),
    /// 32-bit float.
    Real(f32),
    /// 64-bit float.
    LReal(f64),
    /// Microseconds since the Unix epoch.
    Timestamp(u64),
    /// Signed duration in nanoseconds.
    Timespan(i64),
    /// Relation id.
    Rid(u32),
    /// Attribute id.
    Aid(u32),
    /// Opaque blob.
    Blob(Blob),
    /// Wide string.
    WString(String),
    /// Nested struct.
    Struct(Struct),
}

impl Scalar {
    /// Returns the element kind.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Bool(_) => DataType::Bool,
            Self::USInt(_) => DataType::USInt,
            Self::UInt(_) => DataType::UInt,
            Self::UDInt(_) => DataType::UDInt,
            Self::ULInt(_) => DataType::ULInt,
            Self::SInt(_) => DataType::SInt,
            Self::Int(_) => DataType::Int,
            Self::DInt(_) => DataType::DInt,
            Self::LInt(_) => DataType::LInt,
            Self::Byte(_) => DataType::Byte,
            Self::Word(_) => DataType::Word,
            Self::DWord(_) => DataType::DWord,
            Self::LWord(_) => DataType::LWord,
            Self::Real(_) => DataType::Real,
            Self::LReal(_) => DataType::LReal,
            Self::Timestamp(_) => DataType::Timestamp,
            Self::Timespan(_) => DataType::Timespan,
            Self::Rid(_) => DataType::Rid,
            Self::Aid(_) => DataType::Aid,
            Self::Blob(_) => DataType::Blob,
            Self::WString(_) => DataType::WString,
            Self::Struct(_) => DataType::Struct,
        }
    }

    fn decode<R: Read + ?Sized>(r: &mut R, ty: DataType) -> DecodeResult<Option<Self>> {
        let scalar = match ty {
            DataType::Null => return Ok(None),
            DataType::Bool => Self::Bool(read_bool(r)?),
            DataType::USInt => Self::USInt(vlq::read_u8(r)?),
            DataType::UInt => Self::UInt(vlq::read_u16(r)?),
            DataType::UDInt => Self::UDInt(read_vlq_u32(r)?),
            DataType::ULInt => Self::ULInt(read_vlq_u64(r)?),
            DataType::SInt => Self::SInt(read_i8(r)?),
            DataType::Int => Self::Int(read_i16(r)?),
            DataType::DInt => Self::DInt(read_vlq_i32(r)?),
            DataType::LInt => Self::LInt(read_vlq_i64(r)?),
            DataType::Byte => Self::Byte(vlq::read_u8(r)?),
            DataType::Word => Self::Word(vlq::read_u16(r)?),
            DataType::DWord => Self::DWord(vlq::read_u32(r)?),
            DataType::LWord => Self::LWord(vlq::read_u64(r)?),
            DataType::Real => Self::Real(read_f32(r)?),
            DataType::LReal => Self::LReal(read_f64(r)?),
            DataType::Timestamp => Self::Timestamp(vlq::read_u64(r)?),
            DataType::Timespan => Self::Timespan(read_vlq_i64(r)?),
            DataType::Rid => Self::Rid(vlq::read_u32(r)?),
            DataType::Aid => Self::Aid(read_vlq_u32(r)?),
            DataType::Blob => Self::Blob(read_blob(r)?),
            DataType::WString => Self::WString(read_wstring(r)?),
            DataType::Struct => Self::Struct(Struct::decode(r)?),
        };
        Ok(Some(scalar))
    }

    fn encode<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<usize> {
        match self {
            Self::Bool(v) => write_bool(w, v),
            Self::USInt(v) | Self::Byte(v) => vlq::write_u8(w, *v),
            Self::UInt(v) | Self::Word(v) => vlq::write_u16(w, *v),
            Self::UDInt(v) | Self::Aid(v) => write_vlq_u32(w, v),
            Self::ULInt(v) => write_vlq_u64(w, v),
            Self::SInt(v) => write_i8(w, v),
            Self::Int(v) => write_i16(w, v),
            Self::DInt(v) => write_vlq_i32(w, v),
            Self::LInt(v) | Self::Timespan(v) => write_vlq_i64(w, v),
            Self::DWord(v) | Self::Rid(v) => vlq::write_u32(w, *v),
            Self::LWord(v) | Self::Timestamp(v) => vlq::write_u64(w, *v),
            Self::Real(v) => write_f32(w, v),
            Self::LReal(v) => write_f64(w, v),
            Self::Blob(v) => write_blob(w, v),
            Self::WString(v) => write_wstring(w, v),
            Self::Struct(v) => v.encode(w),
        }
    }
}

/// Dense array of elements; used for both array and address-array shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Array {
    /// Booleans.
    Bool(Vec<bool>),
    /// Unsigned 8-bit integers.
    USInt(Vec<u8>),
    /// Unsigned 16-bit integers.
    UInt(Vec<u16>),
    /// Unsigned 32-bit integers.
    UDInt(Vec<u32>),
    /// Unsigned 64-bit integers.
    ULInt(Vec<u64>),
    /// Signed 8-bit integers.
    SInt(Vec<i8>),
    /// Signed 16-bit integers.
    Int(Vec<i16>),
    /// Signed 32-bit integers.
    DInt(Vec<i32>),
    /// Signed 64-bit integers.
    LInt(Vec<i64>),
    /// 8-bit bit strings.
    Byte(Vec<u8>),
    /// 16-bit bit strings.
    Word(Vec<u16>),
    /// 32-bit bit strings.
    DWord(Vec<u32>),
    /// 64-bit bit strings.
    LWord(Vec<u64>),
    /// 32-bit floats.
    Real(Vec<f32>),
    /// 64-bit floats.
    LReal(Vec<f64>),
    /// Timestamps.
    Timestamp(Vec<u64>),
    /// Timespans.
    Timespan(Vec<i64>),
    /// Relation ids.
    Rid(Vec<u32>),
    /// Attribute ids.
    Aid(Vec<u32>),
    /// Blobs.
    Blob(Vec<Blob>),
    /// Wide strings.
    WString(Vec<String>),
}

impl Array {
    /// Returns the element kind.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Bool(_) => DataType::Bool,
            Self::USInt(_) => DataType::USInt,
            Self::UInt(_) => DataType::UInt,
            Self::UDInt(_) => DataType::UDInt,
            Self::ULInt(_) => DataType::ULInt,
            Self::SInt(_) => DataType::SInt,
            Self::Int(_) => DataType::Int,
            Self::DInt(_) => DataType::DInt,
            Self::LInt(_) => DataType::LInt,
            Self::Byte(_) => DataType::Byte,
            Self::Word(_) => DataType::Word,
            Self::DWord(_) => DataType::DWord,
            Self::LWord(_) => DataType::LWord,
            Self::Real(_) => DataType::Real,
            Self::LReal(_) => DataType::LReal,
            Self::Timestamp(_) => DataType::Timestamp,
            Self::Timespan(_) => DataType::Timespan,
            Self::Rid(_) => DataType::Rid,
            Self::Aid(_) => DataType::Aid,
            Self::Blob(_) => DataType::Blob,
            Self::WString(_) => DataType::WString,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::USInt(v) | Self::Byte(v) => v.len(),
            Self::UInt(v) | Self::Word(v) => v.len(),
            Self::UDInt(v) | Self::DWord(v) | Self::Rid(v) | Self::Aid(v) => v.len(),
            Self::ULInt(v) | Self::LWord(v) | Self::Timestamp(v) => v.len(),
            Self::SInt(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::DInt(v) => v.len(),
            Self::LInt(v) | Self::Timespan(v) => v.len(),
            Self::Real(v) => v.len(),
            Self::LReal(v) => v.len(),
            Self::Blob(v) => v.len(),
            Self::WString(v) => v.len(),
        }
    }

    /// Returns `true` if the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn decode<R: Read + ?Sized>(r: &mut R, flags: u8, ty: DataType) -> DecodeResult<Self> {
        if matches!(ty, DataType::Null | DataType::Struct) {
            return Err(DecodeError::unsupported(flags, ty.tag()));
        }
        let (count, _) = vlq::decode_u32(r)?;
        let array = match ty {
            DataType::Bool => Self::Bool(read_seq(r, count, read_bool)?),
            DataType::USInt => Self::USInt(read_seq(r, count, vlq::read_u8)?),
            DataType::UInt => Self::UInt(read_seq(r, count, vlq::read_u16)?),
            DataType::UDInt => Self::UDInt(read_seq(r, count, read_vlq_u32)?),
            DataType::ULInt => Self::ULInt(read_seq(r, count, read_vlq_u64)?),
            DataType::SInt => Self::SInt(read_seq(r, count, read_i8)?),
            DataType::Int => Self::Int(read_seq(r, count, read_i16)?),
            DataType::DInt => Self::DInt(read_seq(r, count, read_vlq_i32)?),
            DataType::LInt => Self::LInt(read_seq(r, count, read_vlq_i64)?),
            DataType::Byte => Self::Byte(read_seq(r, count, vlq::read_u8)?),
            DataType::Word => Self::Word(read_seq(r, count, vlq::read_u16)?),
            DataType::DWord => Self::DWord(read_seq(r, count, vlq::read_u32)?),
            DataType::LWord => Self::LWord(read_seq(r, count, vlq::read_u64)?),
            DataType::Real => Self::Real(read_seq(r, count, read_f32)?),
            DataType::LReal => Self::LReal(read_seq(r, count, read_f64)?),
            DataType::Timestamp => Self::Timestamp(read_seq(r, count, vlq::read_u64)?),
            DataType::Timespan => Self::Timespan(read_seq(r, count, read_vlq_i64)?),
            DataType::Rid => Self::Rid(read_seq(r, count, vlq::read_u32)?),
            DataType::Aid => Self::Aid(read_seq(r, count, read_vlq_u32)?),
            DataType::Blob => Self::Blob(read_seq(r, count, read_blob)?),
            DataType::WString => Self::WString(read_seq(r, count, read_wstring)?),
            DataType::Null | DataType::Struct => {
                return Err(DecodeError::unsupported(flags, ty.tag()))
            }
        };
        Ok(array)
    }

    fn encode<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<usize> {
        let mut len = vlq::encode_u32(w, length_u32(self.len())?)?;
        len += match self {
            Self::Bool(v) => write_seq(w, v, write_bool)?,
            Self::USInt(v) | Self::Byte(v) => vlq::write_bytes(w, v)?,
            Self::UInt(v) | Self::Word(v) => write_seq(w, v, |w, x| vlq::write_u16(w, *x))?,
            Self::UDInt(v) | Self::Aid(v) => write_seq(w, v, write_vlq_u32)?,
            Self::ULInt(v) => write_seq(w, v, write_vlq_u64)?,
            Self::SInt(v) => write_seq(w, v, write_i8)?,
            Self::Int(v) => write_seq(w, v, write_i16)?,
            Self::DInt(v) => write_seq(w, v, write_vlq_i32)?,
            Self::LInt(v) | Self::Timespan(v) => write_seq(w, v, write_vlq_i64)?,
            Self::DWord(v) | Self::Rid(v) => write_seq(w, v, |w, x| vlq::write_u32(w, *x))?,
            Self::LWord(v) | Self::Timestamp(v) => write_seq(w, v, |w, x| vlq::write_u64(w, *x))?,
            Self::Real(v) => write_seq(w, v, write_f32)?,
            Self::LReal(v) => write_seq(w, v, write_f64)?,
            Self::Blob(v) => write_seq(w, v, write_blob)?,
            Self::WString(v) => write_seq(w, v, write_wstring)?,
        };
        Ok(len)
    }
}

/// Sparse array of `(key, element)` pairs. Keys are nonzero.
#[derive(Debug, Clone, PartialEq)]
pub enum SparseArray {
    /// Unsigned 32-bit integers.
    UDInt(Vec<(u32, u32)>),
    /// Blobs.
    Blob(Vec<(u32, Blob)>),
    /// Wide strings.
    WString(Vec<(u32, String)>),
}

impl SparseArray {
    /// Returns the element kind.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::UDInt(_) => DataType::UDInt,
            Self::Blob(_) => DataType::Blob,
            Self::WString(_) => DataType::WString,
        }
    }

    fn decode<R: Read + ?Sized>(r: &mut R, flags: u8, ty: DataType) -> DecodeResult<Self> {
        match ty {
            DataType::UDInt => Ok(Self::UDInt(read_sparse(r, read_vlq_u32)?)),
            DataType::Blob => Ok(Self::Blob(read_sparse(r, read_blob)?)),
            DataType::WString => Ok(Self::WString(read_sparse(r, read_wstring)?)),
            _ => Err(DecodeError::unsupported(flags, ty.tag())),
        }
    }

    fn encode<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<usize> {
        match self {
            Self::UDInt(v) => write_sparse(w, v, write_vlq_u32),
            Self::Blob(v) => write_sparse(w, v, write_blob),
            Self::WString(v) => write_sparse(w, v, write_wstring),
        }
    }
}

/// A complete value as carried on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value (`00 00`).
    Null,
    /// Single element.
    Scalar(Scalar),
    /// Dense array.
    Array(Array),
    /// Dense array flagged as an address array.
    AddressArray(Array),
    /// Sparse array.
    SparseArray(SparseArray),
}

impl Value {
    /// Decodes one value.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Unsupported`] for flags/type combinations
    /// without a decoder and [`DecodeError::UnexpectedEndOfStream`] for
    /// truncated input.
    pub fn decode<R: Read + ?Sized>(r: &mut R) -> DecodeResult<Self> {
        let flags = vlq::read_u8(r)?;
        let tag = vlq::read_u8(r)?;
        let ty = DataType::from_tag(tag).ok_or(DecodeError::unsupported(flags, tag))?;
        match flags {
            FLAGS_SCALAR => Ok(Scalar::decode(r, ty)?.map_or(Self::Null, Self::Scalar)),
            FLAG_ARRAY => Array::decode(r, flags, ty).map(Self::Array),
            FLAG_ADDRESS_ARRAY => Array::decode(r, flags, ty).map(Self::AddressArray),
            FLAG_SPARSE_ARRAY => SparseArray::decode(r, flags, ty).map(Self::SparseArray),
            _ => Err(DecodeError::unsupported(flags, tag)),
        }
    }

    /// Encodes the value and returns the number of bytes written.
    pub fn encode<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<usize> {
        let mut len = vlq::write_u8(w, self.flags())?;
        len += vlq::write_u8(w, self.data_type().tag())?;
        len += match self {
            Self::Null => 0,
            Self::Scalar(v) => v.encode(w)?,
            Self::Array(v) | Self::AddressArray(v) => v.encode(w)?,
            Self::SparseArray(v) => v.encode(w)?,
        };
        Ok(len)
    }

    /// Returns the flags byte.
    pub fn flags(&self) -> u8 {
        match self {
            Self::Null | Self::Scalar(_) => FLAGS_SCALAR,
            Self::Array(_) => FLAG_ARRAY,
            Self::AddressArray(_) => FLAG_ADDRESS_ARRAY,
            Self::SparseArray(_) => FLAG_SPARSE_ARRAY,
        }
    }

    /// Returns the element kind.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Null => DataType::Null,
            Self::Scalar(v) => v.data_type(),
            Self::Array(v) | Self::AddressArray(v) => v.data_type(),
            Self::SparseArray(v) => v.data_type(),
        }
    }

    /// Returns the type tag byte.
    pub fn type_tag(&self) -> u8 {
        self.data_type().tag()
    }

    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the boolean of a `Bool` scalar.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Scalar(Scalar::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    /// Returns any unsigned scalar of at most 32 bits, widened.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::Scalar(Scalar::USInt(v) | Scalar::Byte(v)) => Some(u32::from(*v)),
            Self::Scalar(Scalar::UInt(v) | Scalar::Word(v)) => Some(u32::from(*v)),
            Self::Scalar(
                Scalar::UDInt(v) | Scalar::DWord(v) | Scalar::Rid(v) | Scalar::Aid(v),
            ) => Some(*v),
            _ => None,
        }
    }

    /// Returns any integer scalar that fits into an `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Scalar(Scalar::SInt(v)) => Some(i64::from(*v)),
            Self::Scalar(Scalar::Int(v)) => Some(i64::from(*v)),
            Self::Scalar(Scalar::DInt(v)) => Some(i64::from(*v)),
            Self::Scalar(Scalar::LInt(v) | Scalar::Timespan(v)) => Some(*v),
            Self::Scalar(Scalar::ULInt(v) | Scalar::LWord(v)) => i64::try_from(*v).ok(),
            _ => self.as_u32().map(i64::from),
        }
    }

    /// Returns the bytes of a blob or of a `USInt`/`Byte` array.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Scalar(Scalar::Blob(blob)) => Some(&blob.data),
            Self::Array(Array::USInt(v) | Array::Byte(v)) => Some(v),
            _ => None,
        }
    }

    /// Returns the text of a `WString` scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Scalar::WString(v)) => Some(v),
            _ => None,
        }
    }
}

impl From<Scalar> for Value {
    fn from(value: Scalar) -> Self {
        Self::Scalar(value)
    }
}

impl From<Array> for Value {
    fn from(value: Array) -> Self {
        Self::Array(value)
    }
}

impl From<SparseArray> for Value {
    fn from(value: SparseArray) -> Self {
        Self::SparseArray(value)
    }
}

impl From<Struct> for Value {
    fn from(value: Struct) -> Self {
        Self::Scalar(Scalar::Struct(value))
    }
}

fn invalid_input(reason: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, reason)
}

fn length_u32(len: usize) -> io::Result<u32> {
    u32::try_from(len).map_err(|_| invalid_input("length exceeds u32"))
}

fn read_seq<R, T, F>(r: &mut R, count: u32, read: F) -> DecodeResult<Vec<T>>
where
    R: Read + ?Sized,
    F: Fn(&mut R) -> DecodeResult<T>,
{
    // The count comes off the wire; cap the preallocation.
    let mut items = Vec::with_capacity((count as usize).min(1024));
    for _ in 0..count {
        items.push(read(r)?);
    }
    Ok(items)
}

fn write_seq<W, T, F>(w: &mut W, items: &[T], write: F) -> io::Result<usize>
where
    W: Write + ?Sized,
    F: Fn(&mut W, &T) -> io::Result<usize>,
{
    let mut len = 0;
    for item in items {
        len += write(w, item)?;
    }
    Ok(len)
}

fn read_sparse<R, T, F>(r: &mut R, read: F) -> DecodeResult<Vec<(u32, T)>>
where
    R: Read + ?Sized,
    F: Fn(&mut R) -> DecodeResult<T>,
{
    let mut entries = Vec::new();
    loop {
        let (key, _) = vlq::decode_u32(r)?;
        if key == 0 {
            return Ok(entries);
        }
        entries.push((key, read(r)?));
    }
}

fn write_sparse<W, T, F>(w: &mut W, entries: &[(u32, T)], write: F) -> io::Result<usize>
where
    W: Write + ?Sized,
    F: Fn(&mut W, &T) -> io::Result<usize>,
{
    let mut len = 0;
    for (key, item) in entries {
        if *key == 0 {
            return Err(invalid_input("sparse array key 0 is reserved"));
        }
        len += vlq::encode_u32(w, *key)?;
        len += write(w, item)?;
    }
    len += vlq::write_u8(w, 0)?;
    Ok(len)
}

fn read_bool<R: Read + ?Sized>(r: &mut R) -> DecodeResult<bool> {
    Ok(vlq::read_u8(r)? != 0)
}

fn write_bool<W: Write + ?Sized>(w: &mut W, v: &bool) -> io::Result<usize> {
    vlq::write_u8(w, u8::from(*v))
}

fn read_i8<R: Read + ?Sized>(r: &mut R) -> DecodeResult<i8> {
    Ok(vlq::read_u8(r)? as i8)
}

fn write_i8<W: Write + ?Sized>(w: &mut W, v: &i8) -> io::Result<usize> {
    vlq::write_u8(w, *v as u8)
}

fn read_i16<R: Read + ?Sized>(r: &mut R) -> DecodeResult<i16> {
    Ok(vlq::read_u16(r)? as i16)
}

fn write_i16<W: Write + ?Sized>(w: &mut W, v: &i16) -> io::Result<usize> {
    vlq::write_u16(w, *v as u16)
}

fn read_f32<R: Read + ?Sized>(r: &mut R) -> DecodeResult<f32> {
    Ok(f32::from_bits(vlq::read_u32(r)?))
}

fn write_f32<W: Write + ?Sized>(w: &mut W, v: &f32) -> io::Result<usize> {
    vlq::write_u32(w, v.to_bits())
}

fn read_f64<R: Read + ?Sized>(r: &mut R) -> DecodeResult<f64> {
    Ok(f64::from_bits(vlq::read_u64(r)?))
}

fn write_f64<W: Write + ?Sized>(w: &mut W, v: &f64) -> io::Result<usize> {
    vlq::write_u64(w, v.to_bits())
}

fn read_vlq_u32<R: Read + ?Sized>(r: &mut R) -> DecodeResult<u32> {
    Ok(vlq::decode_u32(r)?.0)
}

fn write_vlq_u32<W: Write + ?Sized>(w: &mut W, v: &u32) -> io::Result<usize> {
    vlq::encode_u32(w, *v)
}

fn read_vlq_u64<R: Read + ?Sized>(r: &mut R) -> DecodeResult<u64> {
    Ok(vlq::decode_u64(r)?.0)
}

fn write_vlq_u64<W: Write + ?Sized>(w: &mut W, v: &u64) -> io::Result<usize> {
    vlq::encode_u64(w, *v)
}

fn read_vlq_i32<R: Read + ?Sized>(r: &mut R) -> DecodeResult<i32> {
    Ok(vlq::decode_i32(r)?.0)
}

fn write_vlq_i32<W: Write + ?Sized>(w: &mut W, v: &i32) -> io::Result<usize> {
    vlq::encode_i32(w, *v)
}

fn read_vlq_i64<R: Read + ?Sized>(r: &mut R) -> DecodeResult<i64> {
    Ok(vlq::decode_i64(r)?.0)
}

fn write_vlq_i64<W: Write + ?Sized>(w: &mut W, v: &i64) -> io::Result<usize> {
    vlq::encode_i64(w, *v)
}

fn read_blob<R: Read + ?Sized>(r: &mut R) -> DecodeResult<Blob> {
    let (root_id, _) = vlq::decode_u32(r)?;
    let (len, _) = vlq::decode_u32(r)?;
    let data = vlq::read_bytes(r, len as usize)?;
    Ok(Blob { root_id, data })
}

fn write_blob<W: Write + ?Sized>(w: &mut W, v: &Blob) -> io::Result<usize> {
    let mut len = vlq::encode_u32(w, v.root_id)?;
    len += vlq::encode_u32(w, length_u32(v.data.len())?)?;
    len += vlq::write_bytes(w, &v.data)?;
    Ok(len)
}

fn read_wstring<R: Read + ?Sized>(r: &mut R) -> DecodeResult<String> {
    let (len, _) = vlq::decode_u32(r)?;
    let bytes = vlq::read_bytes(r, len as usize)?;
    String::from_utf8(bytes).map_err(|_| DecodeError::InvalidString)
}

fn write_wstring<W: Write + ?Sized>(w: &mut W, v: &String) -> io::Result<usize> {
    let mut len = vlq::encode_u32(w, length_u32(v.len())?)?;
    len += vlq::write_bytes(w, v.as_bytes())?;
    Ok(len)
}
