//! S7comm-plus response parsing and validation.
//!
//! A response PDU is split into a [`ResponseFrame`] (version, header and raw
//! payload) and then decoded into the response type matching the request.
//!
//! # Response Structure
//!
//! | Component | Encoding |
//! |-----------|----------|
//! | Protocol version | 1 byte |
//! | [`ResponseHeader`] | 10 bytes |
//! | Return value | VLQ u64 |
//! | Body | response specific |
//! | Integrity id | VLQ u32, V3 only |
//! | Fill | zero bytes, ignored |
//!
//! # Return Values
//!
//! A return value with bit 63 set is an error and is surfaced as
//! [`S7Error::ServerError`]. Bulk responses are the exception: their nonzero
//! return values, negative or not, only signal that at least one item failed,
//! and the per-item error lists carry the details.
//!
//! # Example
//!
//! ```
//! use s7commplus::{FunctionCode, GetVariableResponse, Response, ResponseFrame};
//!
//! let pdu = [
//!     0x03, // version
//!     0x32, 0x00, 0x00, 0x04, 0xFC, 0x00, 0x00, 0x00, 0x01, 0x00, // header
//!     0x00, // return value
//!     0x00, 0x04, 0x01, // UDInt 1
//!     0x07, // integrity id
//!     0x00, 0x00, 0x00, 0x00, // fill
//! ];
//! let frame = ResponseFrame::from_bytes(&pdu).unwrap();
//! frame.validate(FunctionCode::GetVariable, 1).unwrap();
//! let response = GetVariableResponse::decode(&frame.payload, true).unwrap();
//! assert_eq!(response.value.as_u32(), Some(1));
//! assert_eq!(response.integrity_id, Some(7));
//! ```

use std::io;

use crate::error::{Result, S7Error};
use crate::header::{FunctionCode, ProtocolVersion, ResponseHeader, RESPONSE_HEADER_SIZE};
use crate::object::{decode_object_list, Object};
use crate::value::Value;
use crate::vlq;

/// Returns `true` if a return value reports an error.
pub fn is_error_return(return_value: u64) -> bool {
    (return_value as i64) < 0
}

/// A response PDU split into header and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    /// Protocol version byte.
    pub version: ProtocolVersion,
    /// Response header.
    pub header: ResponseHeader,
    /// Everything after the header.
    pub payload: Vec<u8>,
}

impl ResponseFrame {
    /// Splits a reassembled PDU.
    ///
    /// # Errors
    ///
    /// Returns `S7Error::InvalidResponse` if the version or header is invalid.
    pub fn from_bytes(pdu: &[u8]) -> Result<Self> {
        let (&version, rest) = pdu
            .split_first()
            .ok_or_else(|| S7Error::invalid_response("empty PDU"))?;
        let version = match ProtocolVersion::from_u8(version) {
            Some(ProtocolVersion::SystemEvent) | None => {
                return Err(S7Error::invalid_response(format!(
                    "unexpected protocol version 0x{version:02X}"
                )))
            }
            Some(v) => v,
        };
        let header = ResponseHeader::from_bytes(rest)?;
        Ok(Self {
            version,
            header,
            payload: rest[RESPONSE_HEADER_SIZE..].to_vec(),
        })
    }

    /// Checks the response against the request it answers.
    ///
    /// # Errors
    ///
    /// - `S7Error::SequenceMismatch` if the sequence number differs
    /// - `S7Error::ServerError` if the server answered with an error response
    /// - `S7Error::UnexpectedFunction` if the function code differs
    pub fn validate(&self, function: FunctionCode, sequence: u16) -> Result<()> {
        if self.header.sequence != sequence {
            return Err(S7Error::sequence_mismatch(sequence, self.header.sequence));
        }
        if self.header.function_code().is_some_and(FunctionCode::is_error) {
            let (return_value, _) = vlq::decode_u64(&mut &self.payload[..])?;
            return Err(S7Error::ServerError { return_value });
        }
        if self.header.function != function.to_u16() {
            return Err(S7Error::UnexpectedFunction {
                expected: function.to_u16(),
                received: self.header.function,
            });
        }
        Ok(())
    }
}

/// A decodable response body.
pub trait Response: Sized {
    /// Function code the response answers.
    const FUNCTION: FunctionCode;

    /// Decodes the payload of a response frame.
    ///
    /// # Errors
    ///
    /// Returns `S7Error::ServerError` for an error return value and
    /// `S7Error::Decode` for malformed payloads.
    fn decode(payload: &[u8], with_integrity: bool) -> Result<Self>;

    /// Appends the payload of this response to `w`.
    fn encode(&self, w: &mut Vec<u8>) -> io::Result<()>;

    /// Return value of the response.
    fn return_value(&self) -> u64;

    /// Integrity id, if the response carried one.
    fn integrity_id(&self) -> Option<u32>;
}

/// Serializes a complete response PDU.
///
/// Used by servers and test doubles; the client only decodes responses.
pub fn encode_response<P: Response>(
    response: &P,
    version: ProtocolVersion,
    sequence: u16,
) -> Result<Vec<u8>> {
    let header = ResponseHeader::new(P::FUNCTION, sequence);
    let mut pdu = Vec::with_capacity(32);
    pdu.push(version.to_u8());
    pdu.extend_from_slice(&header.to_bytes());
    response.encode(&mut pdu)?;
    vlq::write_u32(&mut pdu, 0)?;
    Ok(pdu)
}

fn read_return_value(r: &mut &[u8]) -> Result<u64> {
    let return_value = read_bulk_return_value(r)?;
    if is_error_return(return_value) {
        return Err(S7Error::ServerError { return_value });
    }
    Ok(return_value)
}

/// Bulk answers report failed items in their error list, whatever the sign
/// of the return value.
fn read_bulk_return_value(r: &mut &[u8]) -> Result<u64> {
    Ok(vlq::decode_u64(r)?.0)
}

fn read_integrity_id(r: &mut &[u8], with_integrity: bool) -> Result<Option<u32>> {
    if !with_integrity {
        return Ok(None);
    }
    let (id, _) = vlq::decode_u32(r)?;
    Ok(Some(id))
}

fn write_integrity_id(w: &mut Vec<u8>, integrity_id: Option<u32>) -> io::Result<()> {
    if let Some(id) = integrity_id {
        vlq::encode_u32(w, id)?;
    }
    Ok(())
}

/// Reads `(item number, T)` pairs until a zero item number.
fn read_item_list<T>(
    r: &mut &[u8],
    mut read: impl FnMut(&mut &[u8]) -> Result<T>,
) -> Result<Vec<(u32, T)>> {
    let mut items = Vec::new();
    loop {
        let (item, _) = vlq::decode_u32(r)?;
        if item == 0 {
            return Ok(items);
        }
        items.push((item, read(r)?));
    }
}

fn read_error_list(r: &mut &[u8]) -> Result<Vec<(u32, u64)>> {
    read_item_list(r, |r| Ok(vlq::decode_u64(r)?.0))
}

fn write_error_list(w: &mut Vec<u8>, errors: &[(u32, u64)]) -> io::Result<()> {
    for (item, code) in errors {
        vlq::encode_u32(w, *item)?;
        vlq::encode_u64(w, *code)?;
    }
    vlq::write_u8(w, 0)?;
    Ok(())
}

/// Answer to [`InitSslRequest`](crate::InitSslRequest).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitSslResponse {
    /// Return value.
    pub return_value: u64,
}

impl Response for InitSslResponse {
    const FUNCTION: FunctionCode = FunctionCode::InitSsl;

    fn decode(payload: &[u8], _with_integrity: bool) -> Result<Self> {
        let mut r = payload;
        let return_value = read_return_value(&mut r)?;
        Ok(Self { return_value })
    }

    fn encode(&self, w: &mut Vec<u8>) -> io::Result<()> {
        vlq::encode_u64(w, self.return_value)?;
        Ok(())
    }

    fn return_value(&self) -> u64 {
        self.return_value
    }

    fn integrity_id(&self) -> Option<u32> {
        None
    }
}

/// Answer to [`CreateObjectRequest`](crate::CreateObjectRequest).
#[derive(Debug, Clone, PartialEq)]
pub struct CreateObjectResponse {
    /// Return value.
    pub return_value: u64,
    /// Ids assigned to the new object; a session gets two.
    pub object_ids: Vec<u32>,
    /// The created object as seen by the server.
    pub object: Object,
    /// Integrity id.
    pub integrity_id: Option<u32>,
}

impl Response for CreateObjectResponse {
    const FUNCTION: FunctionCode = FunctionCode::CreateObject;

    fn decode(payload: &[u8], with_integrity: bool) -> Result<Self> {
        let mut r = payload;
        let return_value = read_return_value(&mut r)?;
        let count = vlq::read_u8(&mut r)?;
        let object_ids = (0..count)
            .map(|_| vlq::decode_u32(&mut r).map(|(id, _)| id))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let object = Object::decode(&mut r)?;
        let integrity_id = read_integrity_id(&mut r, with_integrity)?;
        Ok(Self {
            return_value,
            object_ids,
            object,
            integrity_id,
        })
    }

    fn encode(&self, w: &mut Vec<u8>) -> io::Result<()> {
        vlq::encode_u64(w, self.return_value)?;
        let count = u8::try_from(self.object_ids.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many object ids"))?;
        vlq::write_u8(w, count)?;
        for id in &self.object_ids {
            vlq::encode_u32(w, *id)?;
        }
        self.object.encode(w)?;
        write_integrity_id(w, self.integrity_id)
    }

    fn return_value(&self) -> u64 {
        self.return_value
    }

    fn integrity_id(&self) -> Option<u32> {
        self.integrity_id
    }
}

/// Answer to [`DeleteObjectRequest`](crate::DeleteObjectRequest).
///
/// The confirmation of a session deleting itself carries no integrity id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteObjectResponse {
    /// Return value.
    pub return_value: u64,
    /// Integrity id.
    pub integrity_id: Option<u32>,
}

impl Response for DeleteObjectResponse {
    const FUNCTION: FunctionCode = FunctionCode::DeleteObject;

    fn decode(payload: &[u8], with_integrity: bool) -> Result<Self> {
        let mut r = payload;
        let return_value = read_return_value(&mut r)?;
        let integrity_id = read_integrity_id(&mut r, with_integrity)?;
        Ok(Self {
            return_value,
            integrity_id,
        })
    }

    fn encode(&self, w: &mut Vec<u8>) -> io::Result<()> {
        vlq::encode_u64(w, self.return_value)?;
        write_integrity_id(w, self.integrity_id)
    }

    fn return_value(&self) -> u64 {
        self.return_value
    }

    fn integrity_id(&self) -> Option<u32> {
        self.integrity_id
    }
}

/// Answer to [`GetMultiVariablesRequest`](crate::GetMultiVariablesRequest).
///
/// Item numbers are 1-based positions in the request.
#[derive(Debug, Clone, PartialEq)]
pub struct GetMultiVariablesResponse {
    /// Return value; nonzero if at least one item failed.
    pub return_value: u64,
    /// Values of the items that succeeded.
    pub values: Vec<(u32, Value)>,
    /// Error codes of the items that failed.
    pub errors: Vec<(u32, u64)>,
    /// Integrity id.
    pub integrity_id: Option<u32>,
}

impl Response for GetMultiVariablesResponse {
    const FUNCTION: FunctionCode = FunctionCode::GetMultiVariables;

    fn decode(payload: &[u8], with_integrity: bool) -> Result<Self> {
        let mut r = payload;
        let return_value = read_bulk_return_value(&mut r)?;
        let values = read_item_list(&mut r, |r| Ok(Value::decode(r)?))?;
        let errors = read_error_list(&mut r)?;
        let integrity_id = read_integrity_id(&mut r, with_integrity)?;
        Ok(Self {
            return_value,
            values,
            errors,
            integrity_id,
        })
    }

    fn encode(&self, w: &mut Vec<u8>) -> io::Result<()> {
        vlq::encode_u64(w, self.return_value)?;
        for (item, value) in &self.values {
            vlq::encode_u32(w, *item)?;
            value.encode(w)?;
        }
        vlq::write_u8(w, 0)?;
        write_error_list(w, &self.errors)?;
        write_integrity_id(w, self.integrity_id)
    }

    fn return_value(&self) -> u64 {
        self.return_value
    }

    fn integrity_id(&self) -> Option<u32> {
        self.integrity_id
    }
}

/// Answer to [`SetMultiVariablesRequest`](crate::SetMultiVariablesRequest).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetMultiVariablesResponse {
    /// Return value; nonzero if at least one item failed.
    pub return_value: u64,
    /// Error codes of the items that failed.
    pub errors: Vec<(u32, u64)>,
    /// Integrity id.
    pub integrity_id: Option<u32>,
}

impl Response for SetMultiVariablesResponse {
    const FUNCTION: FunctionCode = FunctionCode::SetMultiVariables;

    fn decode(payload: &[u8], with_integrity: bool) -> Result<Self> {
        let mut r = payload;
        let return_value = read_bulk_return_value(&mut r)?;
        let errors = read_error_list(&mut r)?;
        let integrity_id = read_integrity_id(&mut r, with_integrity)?;
        Ok(Self {
            return_value,
            errors,
            integrity_id,
        })
    }

    fn encode(&self, w: &mut Vec<u8>) -> io::Result<()> {
        vlq::encode_u64(w, self.return_value)?;
        write_error_list(w, &self.errors)?;
        write_integrity_id(w, self.integrity_id)
    }

    fn return_value(&self) -> u64 {
        self.return_value
    }

    fn integrity_id(&self) -> Option<u32> {
        self.integrity_id
    }
}

/// Answer to [`GetVariableRequest`](crate::GetVariableRequest).
#[derive(Debug, Clone, PartialEq)]
pub struct GetVariableResponse {
    /// Return value.
    pub return_value: u64,
    /// Attribute value.
    pub value: Value,
    /// Integrity id.
    pub integrity_id: Option<u32>,
}

impl Response for GetVariableResponse {
    const FUNCTION: FunctionCode = FunctionCode::GetVariable;

    fn decode(payload: &[u8], with_integrity: bool) -> Result<Self> {
        let mut r = payload;
        let return_value = read_return_value(&mut r)?;
        let value = Value::decode(&mut r)?;
        let integrity_id = read_integrity_id(&mut r, with_integrity)?;
        Ok(Self {
            return_value,
            value,
            integrity_id,
        })
    }

    fn encode(&self, w: &mut Vec<u8>) -> io::Result<()> {
        vlq::encode_u64(w, self.return_value)?;
        self.value.encode(w)?;
        write_integrity_id(w, self.integrity_id)
    }

    fn return_value(&self) -> u64 {
        self.return_value
    }

    fn integrity_id(&self) -> Option<u32> {
        self.integrity_id
    }
}

/// Answer to [`SetVariableRequest`](crate::SetVariableRequest).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetVariableResponse {
    /// Return value.
    pub return_value: u64,
    /// Integrity id.
    pub integrity_id: Option<u32>,
}

impl Response for SetVariableResponse {
    const FUNCTION: FunctionCode = FunctionCode::SetVariable;

    fn decode(payload: &[u8], with_integrity: bool) -> Result<Self> {
        let mut r = payload;
        let return_value = read_return_value(&mut r)?;
        let integrity_id = read_integrity_id(&mut r, with_integrity)?;
        Ok(Self {
            return_value,
            integrity_id,
        })
    }

    fn encode(&self, w: &mut Vec<u8>) -> io::Result<()> {
        vlq::encode_u64(w, self.return_value)?;
        write_integrity_id(w, self.integrity_id)
    }

    fn return_value(&self) -> u64 {
        self.return_value
    }

    fn integrity_id(&self) -> Option<u32> {
        self.integrity_id
    }
}

/// Answer to [`ExploreRequest`](crate::ExploreRequest).
#[derive(Debug, Clone, PartialEq)]
pub struct ExploreResponse {
    /// Return value.
    pub return_value: u64,
    /// Object the exploration started at.
    pub explore_id: u32,
    /// Objects found below it.
    pub objects: Vec<Object>,
    /// Integrity id.
    pub integrity_id: Option<u32>,
}

impl Response for ExploreResponse {
    const FUNCTION: FunctionCode = FunctionCode::Explore;

    fn decode(payload: &[u8], with_integrity: bool) -> Result<Self> {
        let mut r = payload;
        let return_value = read_return_value(&mut r)?;
        let explore_id = vlq::read_u32(&mut r)?;
        let objects = decode_object_list(&mut r)?;
        let integrity_id = read_integrity_id(&mut r, with_integrity)?;
        Ok(Self {
            return_value,
            explore_id,
            objects,
            integrity_id,
        })
    }

    fn encode(&self, w: &mut Vec<u8>) -> io::Result<()> {
        vlq::encode_u64(w, self.return_value)?;
        vlq::write_u32(w, self.explore_id)?;
        for object in &self.objects {
            object.encode(w)?;
        }
        write_integrity_id(w, self.integrity_id)
    }

    fn return_value(&self) -> u64 {
        self.return_value
    }

    fn integrity_id(&self) -> Option<u32> {
        self.integrity_id
    }
}
