//! S7comm-plus request PDUs.
//!
//! Each request type knows its function code, protocol version and payload.
//! [`encode_request`] wraps a payload into a complete PDU:
//!
//! | Part | Encoding |
//! |------|----------|
//! | Protocol version | 1 byte |
//! | [`RequestHeader`] | 14 bytes |
//! | Payload | request specific |
//! | Integrity id | VLQ u32, V3 only |
//! | Fill | 4 zero bytes |
//!
//! # Request Types
//!
//! ## Session
//! - [`InitSslRequest`] - Announce the TLS upgrade
//! - [`CreateObjectRequest`] - Create the server session
//! - [`DeleteObjectRequest`] - Delete the server session
//!
//! ## Variables
//! - [`GetMultiVariablesRequest`] - Read several items
//! - [`SetMultiVariablesRequest`] - Write several items or session attributes
//! - [`GetVariableRequest`] - Read one attribute of an object
//! - [`SetVariableRequest`] - Write one attribute of an object
//!
//! ## Browsing
//! - [`ExploreRequest`] - Read part of the object tree
//!
//! # Example
//!
//! ```
//! use s7commplus::{encode_request, Area, GetMultiVariablesRequest, ItemAddress};
//!
//! let request = GetMultiVariablesRequest::new(vec![ItemAddress::new(Area::DataBlock(1), vec![1])]);
//! let pdu = encode_request(&request, 1, 0x0000_0120, Some(0)).unwrap();
//! assert_eq!(pdu[0], 0x03);
//! assert_eq!(pdu[1], 0x31);
//! ```

use crate::address::ItemAddress;
use crate::error::{Result, S7Error};
use crate::header::{
    FunctionCode, ProtocolVersion, RequestHeader, TRANSPORT_FLAGS_DEFAULT,
    TRANSPORT_FLAGS_INIT_SSL,
};
use crate::ids;
use crate::object::Object;
use crate::value::{Scalar, Value};
use crate::vlq;

use std::io;

/// A request that can be sent to the PLC.
pub trait Request {
    /// Function code of the request.
    fn function_code(&self) -> FunctionCode;

    /// Protocol version the request is sent with.
    fn protocol_version(&self) -> ProtocolVersion {
        ProtocolVersion::V3
    }

    /// Transport flags of the request header.
    fn transport_flags(&self) -> u8 {
        TRANSPORT_FLAGS_DEFAULT
    }

    /// Whether the request carries an integrity id.
    fn with_integrity_id(&self) -> bool {
        self.protocol_version() == ProtocolVersion::V3
    }

    /// Appends the request payload to `w`.
    fn encode_payload(&self, w: &mut Vec<u8>) -> io::Result<()>;
}

/// Serializes a complete request PDU.
///
/// # Arguments
///
/// * `request` - Request to encode
/// * `sequence` - Sequence number of the exchange
/// * `session_id` - Session id for the header
/// * `integrity_id` - Integrity id, written only when `Some`
///
/// # Errors
///
/// Returns `S7Error::Io` if a value in the payload cannot be encoded.
pub fn encode_request<Q: Request + ?Sized>(
    request: &Q,
    sequence: u16,
    session_id: u32,
    integrity_id: Option<u32>,
) -> Result<Vec<u8>> {
    let header = RequestHeader::new(request.function_code(), sequence, session_id)
        .with_transport_flags(request.transport_flags());

    let mut pdu = Vec::with_capacity(64);
    pdu.push(request.protocol_version().to_u8());
    pdu.extend_from_slice(&header.to_bytes());
    request.encode_payload(&mut pdu)?;
    if let Some(id) = integrity_id {
        vlq::encode_u32(&mut pdu, id)?;
    }
    vlq::write_u32(&mut pdu, 0)?;
    Ok(pdu)
}

/// Writes the object qualifier that closes multi-variable requests.
pub(crate) fn encode_object_qualifier(w: &mut Vec<u8>) -> io::Result<usize> {
    let mut len = vlq::write_u32(w, ids::OBJECT_QUALIFIER)?;
    for (id, value) in [
        (ids::PARENT_RID, Scalar::Rid(0)),
        (ids::COMPOSITION_AID, Scalar::Aid(0)),
        (ids::KEY_QUALIFIER, Scalar::UDInt(0)),
    ] {
        len += vlq::encode_u32(w, id)?;
        len += Value::from(value).encode(w)?;
    }
    len += vlq::write_u8(w, 0)?;
    Ok(len)
}

/// Announces the switch to TLS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitSslRequest;

impl Request for InitSslRequest {
    fn function_code(&self) -> FunctionCode {
        FunctionCode::InitSsl
    }

    fn protocol_version(&self) -> ProtocolVersion {
        ProtocolVersion::V1
    }

    fn transport_flags(&self) -> u8 {
        TRANSPORT_FLAGS_INIT_SSL
    }

    fn encode_payload(&self, _w: &mut Vec<u8>) -> io::Result<()> {
        Ok(())
    }
}

/// Creates an object below `request_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateObjectRequest {
    /// Object the new object is created in.
    pub request_id: u32,
    /// Value accompanying the request id.
    pub request_value: Value,
    /// Object to create.
    pub object: Object,
}

impl CreateObjectRequest {
    /// Builds the request creating a new server session.
    ///
    /// The session object announces the client relation id and contains an
    /// empty subscriptions container.
    pub fn session() -> Self {
        let mut object = Object::new(ids::GET_NEW_RID_ON_SERVER, ids::CLASS_SERVER_SESSION, 0, 0);
        object.set_attribute(
            ids::SERVER_SESSION_CLIENT_RID,
            Scalar::Rid(ids::CLIENT_RID).into(),
        );
        object.add_child(Object::new(
            ids::GET_NEW_RID_ON_SERVER,
            ids::CLASS_SUBSCRIPTIONS,
            0,
            0,
        ));
        Self {
            request_id: ids::OBJECT_SERVER_SESSION_CONTAINER,
            request_value: Scalar::UDInt(0).into(),
            object,
        }
    }
}

impl Request for CreateObjectRequest {
    fn function_code(&self) -> FunctionCode {
        FunctionCode::CreateObject
    }

    fn protocol_version(&self) -> ProtocolVersion {
        ProtocolVersion::V1
    }

    fn encode_payload(&self, w: &mut Vec<u8>) -> io::Result<()> {
        vlq::write_u32(w, self.request_id)?;
        self.request_value.encode(w)?;
        vlq::write_u32(w, 0)?;
        self.object.encode(w)?;
        Ok(())
    }
}

/// Deletes an object, typically the own session on disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteObjectRequest {
    /// Object to delete.
    pub object_id: u32,
}

impl DeleteObjectRequest {
    /// Creates a new delete request.
    pub fn new(object_id: u32) -> Self {
        Self { object_id }
    }
}

impl Request for DeleteObjectRequest {
    fn function_code(&self) -> FunctionCode {
        FunctionCode::DeleteObject
    }

    fn encode_payload(&self, w: &mut Vec<u8>) -> io::Result<()> {
        vlq::write_u32(w, self.object_id)?;
        Ok(())
    }
}

/// Reads several items in one round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetMultiVariablesRequest {
    /// Addresses to read, answered by item number (1-based position).
    pub addresses: Vec<ItemAddress>,
}

impl GetMultiVariablesRequest {
    /// Creates a new read request.
    pub fn new(addresses: Vec<ItemAddress>) -> Self {
        Self { addresses }
    }
}

impl Request for GetMultiVariablesRequest {
    fn function_code(&self) -> FunctionCode {
        FunctionCode::GetMultiVariables
    }

    fn encode_payload(&self, w: &mut Vec<u8>) -> io::Result<()> {
        // Link id, unused for plain reads.
        vlq::write_u32(w, 0)?;
        vlq::encode_u32(w, self.addresses.len() as u32)?;
        let fields: u32 = self.addresses.iter().map(ItemAddress::field_count).sum();
        vlq::encode_u32(w, fields)?;
        for address in &self.addresses {
            address.encode(w)?;
        }
        encode_object_qualifier(w)?;
        Ok(())
    }
}

/// What a [`SetMultiVariablesRequest`] writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteTarget {
    /// Attributes of one object, addressed by attribute id.
    Object {
        /// Object holding the attributes.
        object_id: u32,
        /// Attribute ids, one per value.
        attributes: Vec<u32>,
    },
    /// Items addressed by area and LID path.
    Items(Vec<ItemAddress>),
}

impl WriteTarget {
    fn len(&self) -> usize {
        match self {
            WriteTarget::Object { attributes, .. } => attributes.len(),
            WriteTarget::Items(addresses) => addresses.len(),
        }
    }
}

/// Writes several variables in one round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct SetMultiVariablesRequest {
    target: WriteTarget,
    values: Vec<Value>,
    version: ProtocolVersion,
}

impl SetMultiVariablesRequest {
    /// Creates a write of `values` to the given items.
    ///
    /// # Errors
    ///
    /// Returns `S7Error::InvalidParameter` if the counts differ.
    pub fn items(addresses: Vec<ItemAddress>, values: Vec<Value>) -> Result<Self> {
        Self::new(WriteTarget::Items(addresses), values, ProtocolVersion::V3)
    }

    /// Creates a write of `values` to attributes of one object.
    ///
    /// # Errors
    ///
    /// Returns `S7Error::InvalidParameter` if the counts differ.
    pub fn attributes(object_id: u32, attributes: Vec<u32>, values: Vec<Value>) -> Result<Self> {
        Self::new(
            WriteTarget::Object {
                object_id,
                attributes,
            },
            values,
            ProtocolVersion::V3,
        )
    }

    /// Builds the session setup write that echoes the server session
    /// version back to the session object.
    pub fn session_setup(session_id: u32, server_session_version: Value) -> Self {
        Self {
            target: WriteTarget::Object {
                object_id: session_id,
                attributes: vec![ids::SERVER_SESSION_VERSION],
            },
            values: vec![server_session_version],
            version: ProtocolVersion::V2,
        }
    }

    fn new(target: WriteTarget, values: Vec<Value>, version: ProtocolVersion) -> Result<Self> {
        if target.len() != values.len() {
            return Err(S7Error::invalid_parameter(
                "values",
                format!(
                    "{} values given for {} addresses",
                    values.len(),
                    target.len()
                ),
            ));
        }
        Ok(Self {
            target,
            values,
            version,
        })
    }

    /// Returns the write target.
    pub fn target(&self) -> &WriteTarget {
        &self.target
    }

    /// Returns the values in item order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl Request for SetMultiVariablesRequest {
    fn function_code(&self) -> FunctionCode {
        FunctionCode::SetMultiVariables
    }

    fn protocol_version(&self) -> ProtocolVersion {
        self.version
    }

    fn encode_payload(&self, w: &mut Vec<u8>) -> io::Result<()> {
        match &self.target {
            WriteTarget::Object {
                object_id,
                attributes,
            } => {
                vlq::write_u32(w, *object_id)?;
                vlq::encode_u32(w, attributes.len() as u32)?;
                vlq::encode_u32(w, attributes.len() as u32)?;
                for attribute in attributes {
                    vlq::encode_u32(w, *attribute)?;
                }
            }
            WriteTarget::Items(addresses) => {
                vlq::write_u32(w, 0)?;
                vlq::encode_u32(w, addresses.len() as u32)?;
                let fields: u32 = addresses.iter().map(ItemAddress::field_count).sum();
                vlq::encode_u32(w, fields)?;
                for address in addresses {
                    address.encode(w)?;
                }
            }
        }
        for (index, value) in self.values.iter().enumerate() {
            vlq::encode_u32(w, index as u32 + 1)?;
            value.encode(w)?;
        }
        vlq::write_u8(w, 0)?;
        if matches!(self.target, WriteTarget::Items(_)) {
            encode_object_qualifier(w)?;
        }
        Ok(())
    }
}

/// Reads one attribute of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetVariableRequest {
    /// Object holding the attribute.
    pub object_id: u32,
    /// Attribute id.
    pub attribute: u32,
}

impl GetVariableRequest {
    /// Creates a new single attribute read.
    pub fn new(object_id: u32, attribute: u32) -> Self {
        Self {
            object_id,
            attribute,
        }
    }
}

impl Request for GetVariableRequest {
    fn function_code(&self) -> FunctionCode {
        FunctionCode::GetVariable
    }

    fn encode_payload(&self, w: &mut Vec<u8>) -> io::Result<()> {
        vlq::write_u32(w, self.object_id)?;
        vlq::encode_u32(w, 1)?;
        vlq::encode_u32(w, self.attribute)?;
        Ok(())
    }
}

/// Writes one attribute of an object.
#[derive(Debug, Clone, PartialEq)]
pub struct SetVariableRequest {
    /// Object holding the attribute.
    pub object_id: u32,
    /// Attribute id.
    pub attribute: u32,
    /// New value.
    pub value: Value,
}

impl SetVariableRequest {
    /// Creates a new single attribute write.
    pub fn new(object_id: u32, attribute: u32, value: Value) -> Self {
        Self {
            object_id,
            attribute,
            value,
        }
    }
}

impl Request for SetVariableRequest {
    fn function_code(&self) -> FunctionCode {
        FunctionCode::SetVariable
    }

    fn encode_payload(&self, w: &mut Vec<u8>) -> io::Result<()> {
        vlq::write_u32(w, self.object_id)?;
        vlq::encode_u32(w, 1)?;
        vlq::encode_u32(w, self.attribute)?;
        self.value.encode(w)?;
        Ok(())
    }
}

/// Reads part of the object tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExploreRequest {
    /// Object to start at.
    pub explore_id: u32,
    /// Class filter, 0 for all.
    pub explore_request_id: u32,
    /// Whether children are explored recursively.
    pub children_recursive: bool,
    /// Whether parents are included.
    pub explore_parents: bool,
    /// Attributes to return for each object, empty for the defaults.
    pub attributes: Vec<u32>,
}

impl ExploreRequest {
    /// Creates a recursive explore of `explore_id`.
    pub fn new(explore_id: u32) -> Self {
        Self {
            explore_id,
            explore_request_id: ids::NONE,
            children_recursive: true,
            explore_parents: false,
            attributes: Vec::new(),
        }
    }

    /// Restricts the returned attributes.
    pub fn with_attributes(mut self, attributes: Vec<u32>) -> Self {
        self.attributes = attributes;
        self
    }
}

impl Request for ExploreRequest {
    fn function_code(&self) -> FunctionCode {
        FunctionCode::Explore
    }

    fn encode_payload(&self, w: &mut Vec<u8>) -> io::Result<()> {
        vlq::write_u32(w, self.explore_id)?;
        vlq::encode_u32(w, self.explore_request_id)?;
        vlq::write_u8(w, u8::from(self.children_recursive))?;
        vlq::write_u8(w, 1)?;
        vlq::write_u8(w, u8::from(self.explore_parents))?;
        vlq::encode_u32(w, self.attributes.len() as u32)?;
        for attribute in &self.attributes {
            vlq::encode_u32(w, *attribute)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Area;
    use crate::header::REQUEST_HEADER_SIZE;
    use crate::value::Array;

    fn payload_of(pdu: &[u8], integrity: bool) -> &[u8] {
        let start = 1 + REQUEST_HEADER_SIZE;
        let end = pdu.len() - 4;
        let payload = &pdu[start..end];
        if integrity {
            &payload[..payload.len() - 1]
        } else {
            payload
        }
    }

    #[test]
    fn test_init_ssl_pdu() {
        let pdu = encode_request(&InitSslRequest, 1, ids::OBJECT_NULL_SERVER_SESSION, None)
            .unwrap();
        assert_eq!(
            hex::encode(&pdu),
            "0131000005b300000001000001203000000000"
        );
        assert!(!InitSslRequest.with_integrity_id());
    }

    #[test]
    fn test_integrity_id_before_fill() {
        let request = GetVariableRequest::new(0x0000_03A0, ids::EFFECTIVE_PROTECTION_LEVEL);
        let pdu = encode_request(&request, 7, 0x0000_03A0, Some(5)).unwrap();
        assert_eq!(pdu[0], 0x03);
        assert_eq!(&pdu[pdu.len() - 5..], &[0x05, 0x00, 0x00, 0x00, 0x00]);
        // object id, count 1, attribute 1842 (0x8E 0x32)
        assert_eq!(hex::encode(payload_of(&pdu, true)), "000003a0018e32");
    }

    #[test]
    fn test_object_qualifier_layout() {
        let mut buf = Vec::new();
        encode_object_qualifier(&mut buf).unwrap();
        // 1256, then 1257 Rid(0), 1258 Aid(0), 1259 UDInt(0), terminator
        assert_eq!(
            hex::encode(&buf),
            "000004e88969001200000000896a001300896b00040000"
        );
    }

    #[test]
    fn test_get_multi_variables_payload() {
        let request = GetMultiVariablesRequest::new(vec![
            ItemAddress::new(Area::Merker, vec![1]),
            ItemAddress::new(Area::DataBlock(1), vec![1, 2]),
        ]);
        let pdu = encode_request(&request, 1, 1, Some(0)).unwrap();
        let payload = payload_of(&pdu, true);
        let mut qualifier = Vec::new();
        encode_object_qualifier(&mut qualifier).unwrap();

        // link id, 2 items, 11 fields
        assert_eq!(&payload[..6], &[0, 0, 0, 0, 2, 11]);
        assert!(payload.ends_with(&qualifier));
    }

    #[test]
    fn test_set_multi_variables_count_mismatch() {
        let result = SetMultiVariablesRequest::items(
            vec![ItemAddress::new(Area::Merker, vec![1])],
            vec![],
        );
        assert!(matches!(result, Err(S7Error::InvalidParameter { .. })));
    }

    #[test]
    fn test_session_setup_is_v2() {
        let request = SetMultiVariablesRequest::session_setup(0x3A0, Scalar::UDInt(3).into());
        assert_eq!(request.protocol_version(), ProtocolVersion::V2);
        assert!(!request.with_integrity_id());

        let pdu = encode_request(&request, 3, 0x3A0, None).unwrap();
        // object id, 1 item, 1 field, attribute 306, item 1, UDInt 3, terminator
        assert_eq!(
            hex::encode(payload_of(&pdu, false)),
            "000003a0010182320100040300"
        );
    }

    #[test]
    fn test_set_multi_variables_items_values() {
        let request = SetMultiVariablesRequest::items(
            vec![ItemAddress::new(Area::Merker, vec![1])],
            vec![Value::Array(Array::USInt(vec![1, 2]))],
        )
        .unwrap();
        assert_eq!(request.values().len(), 1);
        assert!(matches!(request.target(), WriteTarget::Items(a) if a.len() == 1));
        assert!(request.with_integrity_id());
    }

    #[test]
    fn test_create_session_request() {
        let request = CreateObjectRequest::session();
        assert_eq!(request.request_id, ids::OBJECT_SERVER_SESSION_CONTAINER);
        assert_eq!(request.object.class_id, ids::CLASS_SERVER_SESSION);
        assert_eq!(
            request.object.attribute(ids::SERVER_SESSION_CLIENT_RID),
            Some(&Value::Scalar(Scalar::Rid(ids::CLIENT_RID)))
        );
        assert_eq!(request.object.children().len(), 1);
        assert_eq!(request.protocol_version(), ProtocolVersion::V1);
        assert!(!request.with_integrity_id());

        let pdu = encode_request(&request, 2, ids::OBJECT_NULL_SERVER_SESSION, None).unwrap();
        let payload = payload_of(&pdu, false);
        assert_eq!(&payload[..4], &[0x00, 0x00, 0x01, 0x1D]);
        let mut reader = &payload[4..];
        assert_eq!(
            Value::decode(&mut reader).unwrap(),
            Value::Scalar(Scalar::UDInt(0))
        );
        assert_eq!(&reader[..4], &[0, 0, 0, 0]);
        let mut object_bytes = &reader[4..];
        let object = Object::decode(&mut object_bytes).unwrap();
        assert_eq!(object, request.object);
    }

    #[test]
    fn test_delete_object_payload() {
        let request = DeleteObjectRequest::new(0x3A0);
        assert_eq!(request.function_code().counter_kind(), crate::CounterKind::Mutating);
        let pdu = encode_request(&request, 9, 0x3A0, Some(1)).unwrap();
        assert_eq!(payload_of(&pdu, true), &[0x00, 0x00, 0x03, 0xA0]);
    }

    #[test]
    fn test_set_variable_payload() {
        let request = SetVariableRequest::new(
            0x3A0,
            ids::SERVER_SESSION_RESPONSE,
            Value::Array(Array::USInt(vec![0xAA])),
        );
        let pdu = encode_request(&request, 4, 0x3A0, Some(2)).unwrap();
        // object id, count 1, attribute 304, array of one USInt
        assert_eq!(
            hex::encode(payload_of(&pdu, true)),
            "000003a0018230100201aa"
        );
    }

    #[test]
    fn test_explore_payload() {
        let request = ExploreRequest::new(ids::OBJECT_ROOT).with_attributes(vec![233]);
        let pdu = encode_request(&request, 1, 1, Some(0)).unwrap();
        assert_eq!(
            hex::encode(payload_of(&pdu, true)),
            "000000c900010100018169"
        );
    }
}
