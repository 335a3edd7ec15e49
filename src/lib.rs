//! # S7comm-plus Protocol Library
//!
//! A Rust library for talking to Siemens S7-1200/1500 PLCs over the
//! S7comm-plus protocol.
//!
//! This is a **protocol core**: the binary codecs, PDU framing and a session
//! engine that runs the handshake and correlates requests with responses.
//! The TCP/ISO-on-TCP/TLS stack is supplied by the application through the
//! [`Transport`] trait. No automatic retries, caching, or reconnection.
//!
//! ## Features
//!
//! - **Complete codec** for VLQ integers, typed values and objects
//! - **Framing** of PDUs into fragments, with system event detection
//! - **Session engine** with dual integrity counters and sequence numbers
//! - **Bulk reads and writes**, chunked to the limits the PLC reports
//! - **Password legitimation** for protected PLCs
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use s7commplus::{Area, Client, ClientConfig, ItemAddress, Transport};
//!
//! # fn open_transport() -> Arc<dyn Transport> { unimplemented!() }
//! fn main() -> s7commplus::Result<()> {
//!     // An ISO-on-TCP connection to port 102, TLS capable
//!     let transport = open_transport();
//!     let client = Client::connect(transport, ClientConfig::new())?;
//!
//!     // Read two variables of DB1
//!     let addresses = [
//!         ItemAddress::new(Area::DataBlock(1), vec![0x0A]),
//!         ItemAddress::new(Area::DataBlock(1), vec![0x0B]),
//!     ];
//!     let (values, errors) = client.read_values(&addresses)?;
//!     println!("{:?} {:?}", values, errors);
//!
//!     client.disconnect()
//! }
//! ```
//!
//! ## Codec
//!
//! Values and objects encode to and decode from any byte stream:
//!
//! ```
//! use s7commplus::{Scalar, Value};
//!
//! let value = Value::Scalar(Scalar::UDInt(300));
//! let mut buf = Vec::new();
//! value.encode(&mut buf).unwrap();
//! assert_eq!(buf, [0x00, 0x04, 0x82, 0x2C]);
//!
//! let decoded = Value::decode(&mut buf.as_slice()).unwrap();
//! assert_eq!(decoded, value);
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, S7Error>`]. Failures of single items in
//! a bulk request are reported through per-item return codes instead.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use s7commplus::{Area, Client, ClientConfig, ItemAddress, S7Error, Transport};
//! # fn open_transport() -> Arc<dyn Transport> { unimplemented!() }
//! # let client = Client::connect(open_transport(), ClientConfig::new())?;
//! let addresses = [ItemAddress::new(Area::Merker, vec![0x10])];
//! match client.read_values(&addresses) {
//!     Ok((values, errors)) => println!("{:?} {:?}", values, errors),
//!     Err(S7Error::Timeout) => println!("Communication timeout"),
//!     Err(S7Error::ServerError { return_value }) => {
//!         println!("PLC error: 0x{:016X}", return_value);
//!     }
//!     Err(e) => println!("Error: {}", e),
//! }
//! # Ok::<(), S7Error>(())
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod address;
mod client;
mod error;
mod framing;
mod header;
pub mod ids;
mod object;
mod receiver;
mod request;
mod response;
mod session;
mod transport;
mod value;
pub mod vlq;

// Public re-exports
pub use address::{Area, ItemAddress};
pub use client::{Client, ClientConfig, DEFAULT_CHANNEL_CAPACITY};
pub use error::{DecodeError, Result, S7Error};
pub use framing::{
    FramerState, PduFramer, Received, SystemEvent, DEFAULT_MAX_FRAGMENT_DATA, FRAME_HEADER_SIZE,
    FRAME_MARKER, FRAME_TRAILER_SIZE,
};
pub use header::{
    CounterKind, FunctionCode, Opcode, ProtocolVersion, RequestHeader, ResponseHeader,
    REQUEST_HEADER_SIZE, RESPONSE_HEADER_SIZE, TRANSPORT_FLAGS_DEFAULT, TRANSPORT_FLAGS_INIT_SSL,
};
pub use object::{
    decode_object_list, Object, OffsetInfoKind, VarnameList, VartypeElement, VartypeList,
};
pub use request::{
    encode_request, CreateObjectRequest, DeleteObjectRequest, ExploreRequest,
    GetMultiVariablesRequest, GetVariableRequest, InitSslRequest, Request,
    SetMultiVariablesRequest, SetVariableRequest, WriteTarget,
};
pub use response::{
    encode_response, is_error_return, CreateObjectResponse, DeleteObjectResponse,
    ExploreResponse, GetMultiVariablesResponse, GetVariableResponse, InitSslResponse, Response,
    ResponseFrame, SetMultiVariablesResponse, SetVariableResponse,
};
pub use session::{
    expected_integrity_id, legitimation_response, ConnectionState, ResourceLimits, SessionState,
    DEFAULT_TAGS_PER_REQUEST,
};
pub use transport::{TlsOptions, TlsVersion, Transport, DEFAULT_TIMEOUT, ISO_TCP_PORT};
pub use value::{Array, Blob, DataType, PackedStruct, Scalar, SparseArray, Struct, StructBody, Value};
