//! S7comm-plus PDU headers, opcodes and function codes.
//!
//! Every PDU starts with the protocol version byte, followed by the header
//! defined here. Requests and responses use different layouts:
//!
//! # Request header (14 bytes)
//!
//! | Offset | Field | Size |
//! |--------|-------|------|
//! | 0 | Opcode (0x31) | 1 |
//! | 1 | Reserved | 2 |
//! | 3 | Function code | 2 |
//! | 5 | Reserved | 2 |
//! | 7 | Sequence number | 2 |
//! | 9 | Session id | 4 |
//! | 13 | Transport flags | 1 |
//!
//! # Response header (10 bytes)
//!
//! | Offset | Field | Size |
//! |--------|-------|------|
//! | 0 | Opcode (0x32) | 1 |
//! | 1 | Reserved | 2 |
//! | 3 | Function code | 2 |
//! | 5 | Reserved | 2 |
//! | 7 | Sequence number | 2 |
//! | 9 | Transport flags | 1 |
//!
//! All multi-byte fields are big-endian.
//!
//! # Example
//!
//! ```
//! use s7commplus::{FunctionCode, RequestHeader};
//!
//! let header = RequestHeader::new(FunctionCode::GetMultiVariables, 1, 0x0000_0120);
//! let bytes = header.to_bytes();
//! assert_eq!(bytes[0], 0x31);
//! assert_eq!(bytes.len(), 14);
//! ```

use std::fmt;

use crate::error::{Result, S7Error};

/// Request header size in bytes.
pub const REQUEST_HEADER_SIZE: usize = 14;

/// Response header size in bytes.
pub const RESPONSE_HEADER_SIZE: usize = 10;

/// Transport flags sent with regular requests.
pub const TRANSPORT_FLAGS_DEFAULT: u8 = 0x34;

/// Transport flags sent with the TLS bootstrap request.
pub const TRANSPORT_FLAGS_INIT_SSL: u8 = 0x30;

/// Protocol version byte of a PDU.
///
/// | Version | Used for |
/// |---------|----------|
/// | V1 | TLS bootstrap and session creation |
/// | V2 | Session setup |
/// | V3 | Everything else, carries integrity ids |
/// | SystemEvent | Unsolicited events from the PLC |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProtocolVersion {
    /// Version 1.
    V1 = 0x01,
    /// Version 2.
    V2 = 0x02,
    /// Version 3.
    V3 = 0x03,
    /// System event frame.
    SystemEvent = 0xFE,
}

impl ProtocolVersion {
    /// Returns the wire byte.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parses a version byte.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::V1),
            0x02 => Some(Self::V2),
            0x03 => Some(Self::V3),
            0xFE => Some(Self::SystemEvent),
            _ => None,
        }
    }
}

/// PDU opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Client request.
    Request = 0x31,
    /// Server response.
    Response = 0x32,
    /// Unsolicited notification.
    Notification = 0x33,
    /// Alternative response opcode.
    Response2 = 0x02,
}

impl Opcode {
    /// Parses an opcode byte.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x31 => Some(Self::Request),
            0x32 => Some(Self::Response),
            0x33 => Some(Self::Notification),
            0x02 => Some(Self::Response2),
            _ => None,
        }
    }
}

/// Integrity counter a function code draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterKind {
    /// Requests that change state on the PLC.
    Mutating,
    /// Everything else.
    NonMutating,
}

/// S7comm-plus function codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FunctionCode {
    /// Error response.
    Error = 0x04B1,
    /// Browse the object tree.
    Explore = 0x04BB,
    /// Create an object.
    CreateObject = 0x04CA,
    /// Delete an object.
    DeleteObject = 0x04D4,
    /// Write one attribute.
    SetVariable = 0x04F2,
    /// Read one attribute.
    GetVariable = 0x04FC,
    /// Add a link.
    AddLink = 0x0506,
    /// Remove a link.
    RemoveLink = 0x051A,
    /// Read a link.
    GetLink = 0x0524,
    /// Write several variables.
    SetMultiVariables = 0x0542,
    /// Read several variables.
    GetMultiVariables = 0x054C,
    /// Begin a sequence.
    BeginSequence = 0x0556,
    /// End a sequence.
    EndSequence = 0x0560,
    /// Invoke a method.
    Invoke = 0x056B,
    /// Streamed write.
    SetVarSubStreamed = 0x057C,
    /// Streamed read.
    GetVarSubStreamed = 0x0586,
    /// Resolve variable addresses.
    GetVariablesAddress = 0x0590,
    /// Abort.
    Abort = 0x059A,
    /// Alternative error response.
    Error2 = 0x05A9,
    /// TLS bootstrap.
    InitSsl = 0x05B3,
}

impl FunctionCode {
    /// Returns the wire value.
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parses a wire value.
    pub fn from_u16(value: u16) -> Option<Self> {
        use FunctionCode::*;
        let code = match value {
            0x04B1 => Error,
            0x04BB => Explore,
            0x04CA => CreateObject,
            0x04D4 => DeleteObject,
            0x04F2 => SetVariable,
            0x04FC => GetVariable,
            0x0506 => AddLink,
            0x051A => RemoveLink,
            0x0524 => GetLink,
            0x0542 => SetMultiVariables,
            0x054C => GetMultiVariables,
            0x0556 => BeginSequence,
            0x0560 => EndSequence,
            0x056B => Invoke,
            0x057C => SetVarSubStreamed,
            0x0586 => GetVarSubStreamed,
            0x0590 => GetVariablesAddress,
            0x059A => Abort,
            0x05A9 => Error2,
            0x05B3 => InitSsl,
            _ => return None,
        };
        Some(code)
    }

    /// Returns the integrity counter used by requests with this function.
    ///
    /// # Example
    ///
    /// ```
    /// use s7commplus::{CounterKind, FunctionCode};
    ///
    /// assert_eq!(FunctionCode::SetMultiVariables.counter_kind(), CounterKind::Mutating);
    /// assert_eq!(FunctionCode::GetMultiVariables.counter_kind(), CounterKind::NonMutating);
    /// ```
    pub fn counter_kind(self) -> CounterKind {
        match self {
            FunctionCode::CreateObject
            | FunctionCode::DeleteObject
            | FunctionCode::SetVariable
            | FunctionCode::SetMultiVariables
            | FunctionCode::SetVarSubStreamed => CounterKind::Mutating,
            _ => CounterKind::NonMutating,
        }
    }

    /// Returns `true` for the error response codes.
    pub fn is_error(self) -> bool {
        matches!(self, FunctionCode::Error | FunctionCode::Error2)
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(0x{:04X})", self, self.to_u16())
    }
}

/// Request header following the version byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    /// Function of the request.
    pub function: FunctionCode,
    /// Sequence number.
    pub sequence: u16,
    /// Session id, or [`OBJECT_NULL_SERVER_SESSION`](crate::ids::OBJECT_NULL_SERVER_SESSION)
    /// before a session exists.
    pub session_id: u32,
    /// Transport flags.
    pub transport_flags: u8,
}

impl RequestHeader {
    /// Creates a request header with default transport flags.
    pub fn new(function: FunctionCode, sequence: u16, session_id: u32) -> Self {
        Self {
            function,
            sequence,
            session_id,
            transport_flags: TRANSPORT_FLAGS_DEFAULT,
        }
    }

    /// Sets the transport flags.
    pub fn with_transport_flags(mut self, transport_flags: u8) -> Self {
        self.transport_flags = transport_flags;
        self
    }

    /// Serializes the header to bytes.
    pub fn to_bytes(self) -> [u8; REQUEST_HEADER_SIZE] {
        let function = self.function.to_u16().to_be_bytes();
        let sequence = self.sequence.to_be_bytes();
        let session = self.session_id.to_be_bytes();
        [
            Opcode::Request as u8,
            0x00,
            0x00,
            function[0],
            function[1],
            0x00,
            0x00,
            sequence[0],
            sequence[1],
            session[0],
            session[1],
            session[2],
            session[3],
            self.transport_flags,
        ]
    }

    /// Parses a request header.
    ///
    /// # Errors
    ///
    /// Returns `S7Error::InvalidPdu` if the slice is too short or does not
    /// carry a known request function.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < REQUEST_HEADER_SIZE {
            return Err(S7Error::invalid_pdu(format!(
                "request header too short: expected {} bytes, got {}",
                REQUEST_HEADER_SIZE,
                data.len()
            )));
        }
        if data[0] != Opcode::Request as u8 {
            return Err(S7Error::invalid_pdu(format!(
                "expected request opcode, got 0x{:02X}",
                data[0]
            )));
        }
        let raw = u16::from_be_bytes([data[3], data[4]]);
        let function = FunctionCode::from_u16(raw)
            .ok_or_else(|| S7Error::invalid_pdu(format!("unknown function code 0x{raw:04X}")))?;
        Ok(Self {
            function,
            sequence: u16::from_be_bytes([data[7], data[8]]),
            session_id: u32::from_be_bytes([data[9], data[10], data[11], data[12]]),
            transport_flags: data[13],
        })
    }
}

/// Response header following the version byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Opcode, `Response` or `Response2`.
    pub opcode: Opcode,
    /// Raw function code.
    pub function: u16,
    /// Sequence number echoed from the request.
    pub sequence: u16,
    /// Transport flags.
    pub transport_flags: u8,
}

impl ResponseHeader {
    /// Creates a response header.
    pub fn new(function: FunctionCode, sequence: u16) -> Self {
        Self {
            opcode: Opcode::Response,
            function: function.to_u16(),
            sequence,
            transport_flags: 0x00,
        }
    }

    /// Serializes the header to bytes.
    pub fn to_bytes(self) -> [u8; RESPONSE_HEADER_SIZE] {
        let function = self.function.to_be_bytes();
        let sequence = self.sequence.to_be_bytes();
        [
            self.opcode as u8,
            0x00,
            0x00,
            function[0],
            function[1],
            0x00,
            0x00,
            sequence[0],
            sequence[1],
            self.transport_flags,
        ]
    }

    /// Parses a response header.
    ///
    /// # Errors
    ///
    /// Returns `S7Error::InvalidResponse` if the slice is too short or the
    /// opcode is not a response opcode.
    ///
    /// # Example
    ///
    /// ```
    /// use s7commplus::ResponseHeader;
    ///
    /// let bytes = [0x32, 0x00, 0x00, 0x05, 0x4C, 0x00, 0x00, 0x00, 0x07, 0x00];
    /// let header = ResponseHeader::from_bytes(&bytes).unwrap();
    /// assert_eq!(header.function, 0x054C);
    /// assert_eq!(header.sequence, 7);
    /// ```
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < RESPONSE_HEADER_SIZE {
            return Err(S7Error::invalid_response(format!(
                "response header too short: expected {} bytes, got {}",
                RESPONSE_HEADER_SIZE,
                data.len()
            )));
        }
        let opcode = match Opcode::from_u8(data[0]) {
            Some(op @ (Opcode::Response | Opcode::Response2)) => op,
            _ => {
                return Err(S7Error::invalid_response(format!(
                    "expected response opcode, got 0x{:02X}",
                    data[0]
                )))
            }
        };
        Ok(Self {
            opcode,
            function: u16::from_be_bytes([data[3], data[4]]),
            sequence: u16::from_be_bytes([data[7], data[8]]),
            transport_flags: data[9],
        })
    }

    /// Returns the function code if it is known.
    pub fn function_code(self) -> Option<FunctionCode> {
        FunctionCode::from_u16(self.function)
    }
}
