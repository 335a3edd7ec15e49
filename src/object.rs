//! Object trees and their tag-delimited wire format.
//!
//! An [`Object`] is the protocol's unit of structured data: a header
//! (relation id, class id, class flags, attribute id), a set of attributes,
//! relations, nested child objects and, for data block descriptions, the
//! variable name and type lists.
//!
//! # Wire format
//!
//! Objects are a stream of single-byte tags:
//!
//! | Tag    | Meaning | Payload |
//! |--------|---------|---------|
//! | `0xA1` | start of object | u32 relation id, VLQ class id, VLQ class flags, VLQ attribute id |
//! | `0xA2` | terminating object | none |
//! | `0xA3` | attribute | VLQ attribute id, [`Value`] |
//! | `0xA4` | relation | VLQ relation id, u32 value |
//! | `0xA7` | start of tag description | none (legacy, skipped) |
//! | `0xA8` | terminating tag description | none |
//! | `0xAB` | variable type list | see [`VartypeList`] |
//! | `0xAC` | variable name list | see [`VarnameList`] |
//!
//! Any other byte ends the current object without being consumed, so a
//! surrounding structure can continue from it.
//!
//! # Example
//!
//! ```
//! use s7commplus::{Object, Scalar};
//!
//! let mut session = Object::new(211, 287, 0, 0);
//! session.set_attribute(300, Scalar::Rid(0x80C3_C901).into());
//! session.add_child(Object::new(211, 255, 0, 0));
//!
//! let mut buf = Vec::new();
//! session.encode(&mut buf).unwrap();
//!
//! let decoded = Object::decode(&mut &buf[..]).unwrap();
//! assert_eq!(decoded, session);
//! assert_eq!(decoded.children_by_class(255).count(), 1);
//! ```

use std::io::{self, BufRead, Write};

use crate::error::DecodeError;
use crate::value::Value;
use crate::vlq::{self, DecodeResult};

/// Start of an object.
pub const TAG_START_OF_OBJECT: u8 = 0xA1;
/// End of an object.
pub const TAG_TERMINATING_OBJECT: u8 = 0xA2;
/// Attribute entry.
pub const TAG_ATTRIBUTE: u8 = 0xA3;
/// Relation entry.
pub const TAG_RELATION: u8 = 0xA4;
/// Start of a tag description.
pub const TAG_START_OF_TAG_DESCRIPTION: u8 = 0xA7;
/// End of a tag description.
pub const TAG_TERMINATING_TAG_DESCRIPTION: u8 = 0xA8;
/// Variable type list.
pub const TAG_VARTYPE_LIST: u8 = 0xAB;
/// Variable name list.
pub const TAG_VARNAME_LIST: u8 = 0xAC;

/// A node of the object tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Object {
    /// Relation id of this instance.
    pub relation_id: u32,
    /// Class id of this instance.
    pub class_id: u32,
    /// Class flags.
    pub class_flags: u32,
    /// Attribute id the object is stored under.
    pub attribute_id: u32,
    attributes: Vec<(u32, Value)>,
    relations: Vec<(u32, u32)>,
    children: Vec<Object>,
    /// Variable names of a data block description.
    pub varnames: Option<VarnameList>,
    /// Variable types of a data block description.
    pub vartypes: Option<VartypeList>,
}

impl Object {
    /// Creates an empty object.
    pub fn new(relation_id: u32, class_id: u32, class_flags: u32, attribute_id: u32) -> Self {
        Self {
            relation_id,
            class_id,
            class_flags,
            attribute_id,
            ..Self::default()
        }
    }

    /// Sets an attribute, replacing a previous value with the same id.
    pub fn set_attribute(&mut self, id: u32, value: Value) {
        match self.attributes.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((id, value)),
        }
    }

    /// Returns the attribute with the given id.
    pub fn attribute(&self, id: u32) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, value)| value)
    }

    /// Attributes in insertion order.
    pub fn attributes(&self) -> &[(u32, Value)] {
        &self.attributes
    }

    /// Sets a relation, replacing a previous value with the same id.
    pub fn set_relation(&mut self, id: u32, value: u32) {
        match self.relations.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => slot.1 = value,
            None => self.relations.push((id, value)),
        }
    }

    /// Returns the relation with the given id.
    pub fn relation(&self, id: u32) -> Option<u32> {
        self.relations
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, value)| *value)
    }

    /// Relations in insertion order.
    pub fn relations(&self) -> &[(u32, u32)] {
        &self.relations
    }

    /// Appends a child object.
    ///
    /// Children sharing the same `(class_id, relation_id)` are all kept.
    pub fn add_child(&mut self, child: Object) {
        self.children.push(child);
    }

    /// Child objects in wire order.
    pub fn children(&self) -> &[Object] {
        &self.children
    }

    /// Iterates over the children of the given class.
    pub fn children_by_class(&self, class_id: u32) -> impl Iterator<Item = &Object> + '_ {
        self.children
            .iter()
            .filter(move |child| child.class_id == class_id)
    }

    /// Returns the first child with the given class and relation id.
    pub fn child(&self, class_id: u32, relation_id: u32) -> Option<&Object> {
        self.children
            .iter()
            .find(|child| child.class_id == class_id && child.relation_id == relation_id)
    }

    /// Decodes one object, starting at its `0xA1` tag.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Malformed`] if the stream does not start with
    /// an object, and any error raised while decoding attribute values.
    pub fn decode<R: BufRead + ?Sized>(r: &mut R) -> DecodeResult<Self> {
        let tag = vlq::read_u8(r)?;
        if tag != TAG_START_OF_OBJECT {
            return Err(DecodeError::malformed(format!(
                "expected start of object, found tag 0x{tag:02X}"
            )));
        }
        let mut object = Self::decode_header(r)?;
        object.decode_body(r)?;
        Ok(object)
    }

    fn decode_header<R: BufRead + ?Sized>(r: &mut R) -> DecodeResult<Self> {
        let relation_id = vlq::read_u32(r)?;
        let (class_id, _) = vlq::decode_u32(r)?;
        let (class_flags, _) = vlq::decode_u32(r)?;
        let (attribute_id, _) = vlq::decode_u32(r)?;
        Ok(Self::new(relation_id, class_id, class_flags, attribute_id))
    }

    fn decode_body<R: BufRead + ?Sized>(&mut self, r: &mut R) -> DecodeResult<()> {
        loop {
            let Some(tag) = peek_u8(r)? else {
                return Err(DecodeError::UnexpectedEndOfStream);
            };
            match tag {
                TAG_START_OF_OBJECT
                | TAG_TERMINATING_OBJECT
                | TAG_ATTRIBUTE
                | TAG_RELATION
                | TAG_START_OF_TAG_DESCRIPTION
                | TAG_TERMINATING_TAG_DESCRIPTION
                | TAG_VARTYPE_LIST
                | TAG_VARNAME_LIST => r.consume(1),
                _ => return Ok(()),
            }
            match tag {
                TAG_START_OF_OBJECT => {
                    let mut child = Self::decode_header(r)?;
                    child.decode_body(r)?;
                    self.children.push(child);
                }
                TAG_TERMINATING_OBJECT => return Ok(()),
                TAG_ATTRIBUTE => {
                    let (id, _) = vlq::decode_u32(r)?;
                    let value = Value::decode(r)?;
                    self.set_attribute(id, value);
                }
                TAG_RELATION => {
                    let (id, _) = vlq::decode_u32(r)?;
                    let value = vlq::read_u32(r)?;
                    self.set_relation(id, value);
                }
                TAG_VARTYPE_LIST => self.vartypes = Some(VartypeList::decode(r)?),
                TAG_VARNAME_LIST => self.varnames = Some(VarnameList::decode(r)?),
                // Tag description delimiters carry no payload on current firmware.
                _ => {}
            }
        }
    }

    /// Encodes the object tree and returns the number of bytes written.
    pub fn encode<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<usize> {
        let mut len = vlq::write_u8(w, TAG_START_OF_OBJECT)?;
        len += vlq::write_u32(w, self.relation_id)?;
        len += vlq::encode_u32(w, self.class_id)?;
        len += vlq::encode_u32(w, self.class_flags)?;
        len += vlq::encode_u32(w, self.attribute_id)?;
        for (id, value) in &self.attributes {
            len += vlq::write_u8(w, TAG_ATTRIBUTE)?;
            len += vlq::encode_u32(w, *id)?;
            len += value.encode(w)?;
        }
        for (id, value) in &self.relations {
            len += vlq::write_u8(w, TAG_RELATION)?;
            len += vlq::encode_u32(w, *id)?;
            len += vlq::write_u32(w, *value)?;
        }
        if let Some(vartypes) = &self.vartypes {
            len += vlq::write_u8(w, TAG_VARTYPE_LIST)?;
            len += vartypes.encode(w)?;
        }
        if let Some(varnames) = &self.varnames {
            len += vlq::write_u8(w, TAG_VARNAME_LIST)?;
            len += varnames.encode(w)?;
        }
        for child in &self.children {
            len += child.encode(w)?;
        }
        len += vlq::write_u8(w, TAG_TERMINATING_OBJECT)?;
        Ok(len)
    }
}

/// Decodes consecutive sibling objects.
///
/// Stops without consuming at the first byte that is not a start-of-object
/// tag, or at the end of the stream.
pub fn decode_object_list<R: BufRead + ?Sized>(r: &mut R) -> DecodeResult<Vec<Object>> {
    let mut objects = Vec::new();
    while peek_u8(r)? == Some(TAG_START_OF_OBJECT) {
        objects.push(Object::decode(r)?);
    }
    Ok(objects)
}

fn peek_u8<R: BufRead + ?Sized>(r: &mut R) -> DecodeResult<Option<u8>> {
    let buf = r.fill_buf()?;
    Ok(buf.first().copied())
}

/// Largest payload a single tag description block can carry.
const MAX_BLOCK_LEN: usize = u16::MAX as usize;

/// Variable names of a data block, in declaration order.
///
/// Encoded as blocks of `u16` length (a zero length ends the list); each
/// block holds entries of `u8 length, UTF-8 name, 0x00`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VarnameList {
    /// Variable names.
    pub names: Vec<String>,
}

impl VarnameList {
    /// Creates a list from names.
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    fn decode<R: BufRead + ?Sized>(r: &mut R) -> DecodeResult<Self> {
        let mut names = Vec::new();
        loop {
            let block_len = vlq::read_u16(r)?;
            if block_len == 0 {
                return Ok(Self { names });
            }
            let block = vlq::read_bytes(r, usize::from(block_len))?;
            let mut cursor = &block[..];
            while !cursor.is_empty() {
                let len = vlq::read_u8(&mut cursor)?;
                let bytes = vlq::read_bytes(&mut cursor, usize::from(len))?;
                if vlq::read_u8(&mut cursor)? != 0 {
                    return Err(DecodeError::malformed("variable name is not terminated"));
                }
                names.push(String::from_utf8(bytes).map_err(|_| DecodeError::InvalidString)?);
            }
        }
    }

    fn encode<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<usize> {
        let mut entries = Vec::with_capacity(self.names.len());
        for name in &self.names {
            let len = u8::try_from(name.len()).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, "variable name longer than 255 bytes")
            })?;
            let mut entry = Vec::with_capacity(name.len() + 2);
            entry.push(len);
            entry.extend_from_slice(name.as_bytes());
            entry.push(0);
            entries.push(entry);
        }
        let mut len = 0;
        for block in pack_blocks(&entries) {
            len += vlq::write_u16(w, block.len() as u16)?;
            len += vlq::write_bytes(w, &block)?;
        }
        len += vlq::write_u16(w, 0)?;
        Ok(len)
    }
}

/// Kind of the offset information attached to a [`VartypeElement`].
///
/// Stored in bits 12-15 of the element's attribute flags; each kind has a
/// fixed byte length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetInfoKind {
    /// Function block array.
    FbArray,
    /// Standard struct element.
    StructElemStd,
    /// String struct element.
    StructElemString,
    /// One-dimensional array struct element.
    StructElemArray1Dim,
    /// Multi-dimensional array struct element.
    StructElemArrayMDim,
    /// Struct inside a struct.
    StructElemStruct,
    /// One-dimensional struct array inside a struct.
    StructElemStruct1Dim,
    /// Multi-dimensional struct array inside a struct.
    StructElemStructMDim,
    /// Standard variable.
    Std,
    /// String variable.
    String,
    /// One-dimensional array.
    Array1Dim,
    /// Multi-dimensional array.
    ArrayMDim,
    /// Struct.
    Struct,
    /// One-dimensional struct array.
    Struct1Dim,
    /// Multi-dimensional struct array.
    StructMDim,
    /// Function block or system function block instance.
    FbSfb,
}

impl OffsetInfoKind {
    /// Extracts the kind from element attribute flags.
    pub fn from_attribute_flags(flags: u16) -> Self {
        match flags >> 12 {
            0 => Self::FbArray,
            1 => Self::StructElemStd,
            2 => Self::StructElemString,
            3 => Self::StructElemArray1Dim,
            4 => Self::StructElemArrayMDim,
            5 => Self::StructElemStruct,
            6 => Self::StructElemStruct1Dim,
            7 => Self::StructElemStructMDim,
            8 => Self::Std,
            9 => Self::String,
            10 => Self::Array1Dim,
            11 => Self::ArrayMDim,
            12 => Self::Struct,
            13 => Self::Struct1Dim,
            14 => Self::StructMDim,
            _ => Self::FbSfb,
        }
    }

    /// Byte length of the offset information.
    pub fn size(self) -> usize {
        match self {
            Self::StructElemStd => 4,
            Self::FbArray | Self::StructElemString | Self::Std => 8,
            Self::StructElemArray1Dim | Self::String => 12,
            Self::StructElemStruct | Self::Array1Dim => 16,
            Self::Struct => 20,
            Self::StructElemStruct1Dim => 24,
            Self::Struct1Dim | Self::FbSfb => 28,
            Self::StructElemArrayMDim => 32,
            Self::ArrayMDim => 36,
            Self::StructElemStructMDim => 44,
            Self::StructMDim => 48,
        }
    }
}

/// Type and layout information of one variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VartypeElement {
    /// Local id of the variable inside its block.
    pub lid: u32,
    /// CRC of the symbol name.
    pub symbol_crc: u32,
    /// Software data type code.
    pub softdatatype: u8,
    /// Attribute flags; bits 12-15 select the offset information kind.
    pub attribute_flags: u16,
    /// Bit offset information.
    pub bit_offset_info: u8,
    /// Raw offset information, [`OffsetInfoKind::size`] bytes long.
    pub offset_info: Vec<u8>,
}

impl VartypeElement {
    /// Returns the offset information kind.
    pub fn offset_info_kind(&self) -> OffsetInfoKind {
        OffsetInfoKind::from_attribute_flags(self.attribute_flags)
    }

    fn encoded_len(&self) -> usize {
        12 + self.offset_info.len()
    }

    fn decode(r: &mut &[u8]) -> DecodeResult<Self> {
        let lid = vlq::read_u32_le(r)?;
        let symbol_crc = vlq::read_u32_le(r)?;
        let softdatatype = vlq::read_u8(r)?;
        let attribute_flags = vlq::read_u16(r)?;
        let bit_offset_info = vlq::read_u8(r)?;
        let kind = OffsetInfoKind::from_attribute_flags(attribute_flags);
        let offset_info = vlq::read_bytes(r, kind.size())?;
        Ok(Self {
            lid,
            symbol_crc,
            softdatatype,
            attribute_flags,
            bit_offset_info,
            offset_info,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) -> io::Result<()> {
        if self.offset_info.len() != self.offset_info_kind().size() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "offset info length does not match its kind",
            ));
        }
        vlq::write_u32_le(out, self.lid)?;
        vlq::write_u32_le(out, self.symbol_crc)?;
        vlq::write_u8(out, self.softdatatype)?;
        vlq::write_u16(out, self.attribute_flags)?;
        vlq::write_u8(out, self.bit_offset_info)?;
        vlq::write_bytes(out, &self.offset_info)?;
        Ok(())
    }
}

/// Variable types of a data block.
///
/// Encoded as `u16` block length, `u32` little-endian first id, elements,
/// further `u16`-prefixed blocks of elements, and a zero length.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VartypeList {
    /// Id of the first element.
    pub first_id: u32,
    /// Elements in declaration order.
    pub elements: Vec<VartypeElement>,
}

impl VartypeList {
    fn decode<R: BufRead + ?Sized>(r: &mut R) -> DecodeResult<Self> {
        let mut block_len = vlq::read_u16(r)?;
        let first_id = vlq::read_u32_le(r)?;
        let mut elements = Vec::new();
        while block_len != 0 {
            let block = vlq::read_bytes(r, usize::from(block_len))?;
            let mut cursor = &block[..];
            while !cursor.is_empty() {
                elements.push(VartypeElement::decode(&mut cursor)?);
            }
            block_len = vlq::read_u16(r)?;
        }
        Ok(Self { first_id, elements })
    }

    fn encode<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<usize> {
        let mut entries = Vec::with_capacity(self.elements.len());
        for element in &self.elements {
            let mut entry = Vec::with_capacity(element.encoded_len());
            element.encode(&mut entry)?;
            entries.push(entry);
        }
        let blocks = pack_blocks(&entries);
        let mut len = 0;
        match blocks.split_first() {
            None => {
                len += vlq::write_u16(w, 0)?;
                len += vlq::write_u32_le(w, self.first_id)?;
            }
            Some((first, rest)) => {
                len += vlq::write_u16(w, first.len() as u16)?;
                len += vlq::write_u32_le(w, self.first_id)?;
                len += vlq::write_bytes(w, first)?;
                for block in rest {
                    len += vlq::write_u16(w, block.len() as u16)?;
                    len += vlq::write_bytes(w, block)?;
                }
                len += vlq::write_u16(w, 0)?;
            }
        }
        Ok(len)
    }
}

/// Groups entries into blocks that fit a `u16` length.
fn pack_blocks(entries: &[Vec<u8>]) -> Vec<Vec<u8>> {
    let mut blocks: Vec<Vec<u8>> = Vec::new();
    let mut current = Vec::new();
    for entry in entries {
        if !current.is_empty() && current.len() + entry.len() > MAX_BLOCK_LEN {
            blocks.push(std::mem::take(&mut current));
        }
        current.extend_from_slice(entry);
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Array, Scalar};

    fn encode(object: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        let len = object.encode(&mut buf).unwrap();
        assert_eq!(len, buf.len());
        buf
    }

    #[test]
    fn test_attribute_and_child_round_trip() {
        let mut parent = Object::new(0x10, 287, 0, 0);
        parent.set_attribute(306, Scalar::UDInt(2).into());
        parent.add_child(Object::new(0x11, 255, 0, 0));

        let bytes = encode(&parent);
        assert_eq!(
            hex::encode(&bytes),
            "a100000010821f0000a38232000402a100000011817f0000a2a2"
        );
        let decoded = Object::decode(&mut &bytes[..]).unwrap();
        assert_eq!(decoded, parent);
        assert_eq!(decoded.attribute(306), Some(&Value::Scalar(Scalar::UDInt(2))));
    }

    #[test]
    fn test_relations_and_nested_children() {
        let mut grandchild = Object::new(3, 30, 0, 0);
        grandchild.set_attribute(1, Array::UInt(vec![1, 2]).into());
        let mut child = Object::new(2, 20, 1, 5);
        child.add_child(grandchild);
        let mut root = Object::new(1, 10, 0, 0);
        root.set_relation(7, 0xDEAD_BEEF);
        root.add_child(child);

        let bytes = encode(&root);
        let decoded = Object::decode(&mut &bytes[..]).unwrap();
        assert_eq!(decoded, root);
        assert_eq!(decoded.relation(7), Some(0xDEAD_BEEF));
        assert_eq!(decoded.children()[0].children()[0].class_id, 30);
    }

    #[test]
    fn test_duplicate_child_keys_are_kept() {
        let mut root = Object::new(1, 10, 0, 0);
        root.add_child(Object::new(2, 20, 0, 0));
        root.add_child(Object::new(2, 20, 0, 1));

        let bytes = encode(&root);
        let decoded = Object::decode(&mut &bytes[..]).unwrap();
        assert_eq!(decoded.children_by_class(20).count(), 2);
        assert_eq!(decoded.child(20, 2).map(|c| c.attribute_id), Some(0));
    }

    #[test]
    fn test_attribute_ids_unique() {
        let mut object = Object::new(1, 1, 0, 0);
        object.set_attribute(5, Scalar::Bool(false).into());
        object.set_attribute(5, Scalar::Bool(true).into());
        assert_eq!(object.attributes().len(), 1);
        assert_eq!(object.attribute(5).and_then(Value::as_bool), Some(true));
    }

    #[test]
    fn test_unknown_tag_ends_object_without_consuming() {
        let mut bytes = encode(&Object::new(1, 2, 0, 0));
        // Drop the terminating tag and continue with foreign data.
        bytes.pop();
        bytes.extend_from_slice(&[0x55, 0x01]);

        let mut cursor = &bytes[..];
        let decoded = Object::decode(&mut cursor).unwrap();
        assert_eq!(decoded.class_id, 2);
        assert_eq!(cursor, [0x55, 0x01]);
    }

    #[test]
    fn test_tag_description_start_is_skipped() {
        let mut bytes = encode(&Object::new(1, 2, 0, 0));
        bytes.insert(bytes.len() - 1, TAG_START_OF_TAG_DESCRIPTION);
        let decoded = Object::decode(&mut &bytes[..]).unwrap();
        assert_eq!(decoded, Object::new(1, 2, 0, 0));
    }

    #[test]
    fn test_truncated_object() {
        let bytes = encode(&Object::new(1, 2, 0, 0));
        let err = Object::decode(&mut &bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedEndOfStream));
    }

    #[test]
    fn test_not_an_object() {
        let err = Object::decode(&mut &[0x00][..]).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_object_list_stops_at_foreign_tag() {
        let mut bytes = encode(&Object::new(1, 10, 0, 0));
        bytes.extend(encode(&Object::new(2, 10, 0, 0)));
        bytes.push(0x00);

        let mut cursor = &bytes[..];
        let objects = decode_object_list(&mut cursor).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[1].relation_id, 2);
        assert_eq!(cursor, [0x00]);

        assert!(decode_object_list(&mut &[][..]).unwrap().is_empty());
    }

    #[test]
    fn test_tag_description_lists_round_trip() {
        let mut object = Object::new(0x8A0E_0001, 0x9EAE, 0, 0);
        object.varnames = Some(VarnameList::new(vec!["Speed".into(), "Running".into()]));
        object.vartypes = Some(VartypeList {
            first_id: 1,
            elements: vec![
                VartypeElement {
                    lid: 1,
                    symbol_crc: 0x1234_5678,
                    softdatatype: 0x08,
                    attribute_flags: 0x8000,
                    bit_offset_info: 0,
                    offset_info: vec![0; OffsetInfoKind::Std.size()],
                },
                VartypeElement {
                    lid: 2,
                    symbol_crc: 0x9ABC_DEF0,
                    softdatatype: 0x01,
                    attribute_flags: 0xA000,
                    bit_offset_info: 3,
                    offset_info: (0..16).collect(),
                },
            ],
        });

        let bytes = encode(&object);
        let decoded = Object::decode(&mut &bytes[..]).unwrap();
        assert_eq!(decoded, object);
        let vartypes = decoded.vartypes.unwrap();
        assert_eq!(vartypes.elements[1].offset_info_kind(), OffsetInfoKind::Array1Dim);
    }

    #[test]
    fn test_empty_tag_description_lists() {
        let mut object = Object::new(1, 1, 0, 0);
        object.varnames = Some(VarnameList::default());
        object.vartypes = Some(VartypeList {
            first_id: 9,
            elements: Vec::new(),
        });
        let bytes = encode(&object);
        assert_eq!(Object::decode(&mut &bytes[..]).unwrap(), object);
    }

    #[test]
    fn test_vartype_offset_length_checked() {
        let mut object = Object::new(1, 1, 0, 0);
        object.vartypes = Some(VartypeList {
            first_id: 1,
            elements: vec![VartypeElement {
                lid: 1,
                symbol_crc: 0,
                softdatatype: 1,
                attribute_flags: 0x8000,
                bit_offset_info: 0,
                offset_info: vec![0; 3],
            }],
        });
        assert!(object.encode(&mut Vec::new()).is_err());
    }
}
