//! Error types for the S7comm-plus protocol.
//!
//! Two layers of errors exist:
//!
//! - [`DecodeError`] is produced by the binary codec ([`vlq`](crate::vlq),
//!   [`Value`](crate::Value), [`Object`](crate::Object)) and is fatal to the
//!   decode call that raised it.
//! - [`S7Error`] is the error type of every client operation. Codec errors are
//!   wrapped in [`S7Error::Decode`].
//!
//! Per-item failures inside a bulk read or write are *not* errors: they are
//! reported through the per-item return codes of
//! [`Client::read_values`](crate::Client::read_values) and
//! [`Client::write_values`](crate::Client::write_values).

use std::io;
use thiserror::Error;

/// Result type alias for S7comm-plus operations.
pub type Result<T> = std::result::Result<T, S7Error>;

/// Errors raised while decoding VLQ integers, values or objects.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The stream ended before the encoded item was complete.
    #[error("unexpected end of stream")]
    UnexpectedEndOfStream,

    /// A 32-bit VLQ still carried the continuation bit after five groups.
    #[error("VLQ integer exceeds {width} bits")]
    VlqOverflow {
        /// Width of the integer being decoded.
        width: u8,
    },

    /// The flags/type-tag pair has no defined decoder.
    #[error("unsupported value variant: flags 0x{flags:02X}, type 0x{type_tag:02X}")]
    Unsupported {
        /// Flags byte as read from the stream.
        flags: u8,
        /// Type tag byte as read from the stream.
        type_tag: u8,
    },

    /// A string payload was not valid UTF-8.
    #[error("invalid string encoding")]
    InvalidString,

    /// Structurally invalid data.
    #[error("malformed data: {0}")]
    Malformed(String),

    /// Any other I/O failure of the underlying reader.
    #[error("I/O error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for DecodeError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::UnexpectedEndOfStream
        } else {
            Self::Io(err)
        }
    }
}

impl DecodeError {
    /// Creates a new `Unsupported` error.
    pub fn unsupported(flags: u8, type_tag: u8) -> Self {
        Self::Unsupported { flags, type_tag }
    }

    /// Creates a new `Malformed` error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }
}

/// Errors that can occur during S7comm-plus communication.
#[derive(Debug, Error)]
pub enum S7Error {
    /// Failure while decoding a response payload.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A frame did not follow the PDU framing rules.
    #[error("invalid PDU: {reason}")]
    InvalidPdu {
        /// Description of the framing violation.
        reason: String,
    },

    /// A response was well framed but did not have the expected content.
    #[error("invalid response: {reason}")]
    InvalidResponse {
        /// Description of the response error.
        reason: String,
    },

    /// Invalid parameter provided.
    #[error("invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// Name of the invalid parameter.
        parameter: String,
        /// Description of why the parameter is invalid.
        reason: String,
    },

    /// The server answered a request with a negative return value.
    #[error("server error: return value 0x{return_value:016X}")]
    ServerError {
        /// Raw 64-bit return value from the response.
        return_value: u64,
    },

    /// Sequence number of a response did not match the request.
    #[error("sequence mismatch: expected {expected}, received {received}")]
    SequenceMismatch {
        /// Sequence number of the request.
        expected: u16,
        /// Sequence number found in the response.
        received: u16,
    },

    /// Function code of a response did not match the request.
    #[error("unexpected function code: expected 0x{expected:04X}, received 0x{received:04X}")]
    UnexpectedFunction {
        /// Function code of the request.
        expected: u16,
        /// Function code found in the response.
        received: u16,
    },

    /// The PLC sent a system event with a negative status.
    #[error("fatal system event: status {status}")]
    FatalSystemEvent {
        /// Embedded status value.
        status: i64,
    },

    /// Password legitimation failed.
    #[error("legitimation failed: {reason}")]
    Legitimation {
        /// Description of the failure.
        reason: String,
    },

    /// No response arrived within the configured timeout.
    #[error("receive timeout")]
    Timeout,

    /// The connection has been closed by either side.
    #[error("connection closed")]
    ConnectionClosed,

    /// An operation was attempted without an established session.
    #[error("not connected")]
    NotConnected,

    /// I/O error during communication.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl S7Error {
    /// Creates a new `InvalidPdu` error.
    pub fn invalid_pdu(reason: impl Into<String>) -> Self {
        Self::InvalidPdu {
            reason: reason.into(),
        }
    }

    /// Creates a new `InvalidResponse` error.
    ///
    /// # Example
    ///
    /// ```
    /// use s7commplus::S7Error;
    ///
    /// let err = S7Error::invalid_response("missing session ids");
    /// assert_eq!(err.to_string(), "invalid response: missing session ids");
    /// ```
    pub fn invalid_response(reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            reason: reason.into(),
        }
    }

    /// Creates a new `InvalidParameter` error.
    pub fn invalid_parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `Legitimation` error.
    pub fn legitimation(reason: impl Into<String>) -> Self {
        Self::Legitimation {
            reason: reason.into(),
        }
    }

    /// Creates a new `SequenceMismatch` error.
    pub fn sequence_mismatch(expected: u16, received: u16) -> Self {
        Self::SequenceMismatch { expected, received }
    }

    /// Returns `true` if the error leaves the connection unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidPdu { .. }
                | Self::SequenceMismatch { .. }
                | Self::FatalSystemEvent { .. }
                | Self::Legitimation { .. }
                | Self::ConnectionClosed
                | Self::Io(_)
        )
    }
}
