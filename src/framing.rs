//! Frame reassembly and fragmentation.
//!
//! On the wire a PDU travels in one or more frames. Every frame starts with
//! a 4-byte header; the last frame of a PDU also carries a 4-byte trailer:
//!
//! | Part | Bytes |
//! |------|-------|
//! | Header | `0x72`, version, data length (u16 BE) |
//! | Data | `data length` bytes |
//! | Trailer | `0x72`, version, `0x00 0x00` (last frame only) |
//!
//! A frame without trailer is an intermediate fragment. The reassembled PDU
//! is the version byte followed by the concatenated data of all fragments.
//!
//! Frames with version `0xFE` are system events. They are never fragmented
//! and their data starts with a signed 64-bit status; a negative status
//! means the PLC dropped the connection.
//!
//! # Example
//!
//! ```
//! use s7commplus::{PduFramer, Received};
//!
//! let pdu = [0x03, 0x32, 0x00, 0x00, 0x05, 0x4C];
//! let frames = PduFramer::frame(&pdu, 3).unwrap();
//! assert_eq!(frames.len(), 2);
//!
//! let mut framer = PduFramer::new();
//! assert!(framer.push(&frames[0]).unwrap().is_none());
//! match framer.push(&frames[1]).unwrap() {
//!     Some(Received::Pdu(reassembled)) => assert_eq!(reassembled, pdu),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

use tracing::trace;

use crate::error::{Result, S7Error};
use crate::header::ProtocolVersion;

/// First byte of every frame header and trailer.
pub const FRAME_MARKER: u8 = 0x72;

/// Size of the frame header.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Size of the trailer on the last frame of a PDU.
pub const FRAME_TRAILER_SIZE: usize = 4;

/// Default upper bound for the data carried by one outbound frame.
pub const DEFAULT_MAX_FRAGMENT_DATA: usize = 1024;

/// Reassembly state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    /// Waiting for the first frame of a PDU.
    Idle,
    /// At least one intermediate fragment has been buffered.
    AccumulatingFragment,
    /// The last PDU was handed out; the next frame starts a new one.
    Complete,
}

/// Unsolicited event from the PLC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemEvent {
    /// Status carried in the first eight data bytes.
    pub status: i64,
    /// Complete event data, status included.
    pub data: Vec<u8>,
}

impl SystemEvent {
    /// Returns `true` if the event ends the connection.
    pub fn is_fatal(&self) -> bool {
        self.status < 0
    }
}

/// Result of pushing a frame into the framer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A complete PDU, version byte first.
    Pdu(Vec<u8>),
    /// A system event.
    SystemEvent(SystemEvent),
}

/// Reassembles inbound frames into PDUs.
#[derive(Debug)]
pub struct PduFramer {
    state: FramerState,
    version: u8,
    buffer: Vec<u8>,
}

impl Default for PduFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl PduFramer {
    /// Creates an idle framer.
    pub fn new() -> Self {
        Self {
            state: FramerState::Idle,
            version: 0,
            buffer: Vec::new(),
        }
    }

    /// Returns the reassembly state.
    pub fn state(&self) -> FramerState {
        self.state
    }

    /// Drops any partially reassembled PDU.
    pub fn reset(&mut self) {
        self.state = FramerState::Idle;
        self.buffer.clear();
    }

    /// Feeds one frame.
    ///
    /// Returns `Ok(None)` after an intermediate fragment and `Ok(Some(_))`
    /// once a PDU is complete or a system event arrived.
    ///
    /// # Errors
    ///
    /// Returns `S7Error::InvalidPdu` if the frame violates the framing
    /// rules. The partial PDU is discarded in that case.
    pub fn push(&mut self, frame: &[u8]) -> Result<Option<Received>> {
        let result = self.push_frame(frame);
        if result.is_err() {
            self.reset();
        }
        result
    }

    fn push_frame(&mut self, frame: &[u8]) -> Result<Option<Received>> {
        if frame.len() < FRAME_HEADER_SIZE {
            return Err(S7Error::invalid_pdu(format!(
                "frame too short: {} bytes",
                frame.len()
            )));
        }
        if frame[0] != FRAME_MARKER {
            return Err(S7Error::invalid_pdu(format!(
                "bad frame marker 0x{:02X}",
                frame[0]
            )));
        }
        let version = frame[1];
        let data_len = usize::from(u16::from_be_bytes([frame[2], frame[3]]));
        let data_end = FRAME_HEADER_SIZE + data_len;
        if frame.len() < data_end {
            return Err(S7Error::invalid_pdu(format!(
                "frame declares {} data bytes but carries {}",
                data_len,
                frame.len() - FRAME_HEADER_SIZE
            )));
        }
        let data = &frame[FRAME_HEADER_SIZE..data_end];

        match ProtocolVersion::from_u8(version) {
            Some(ProtocolVersion::SystemEvent) => return Self::system_event(data).map(Some),
            Some(_) => {}
            None => {
                return Err(S7Error::invalid_pdu(format!(
                    "unknown protocol version 0x{version:02X}"
                )))
            }
        }

        let last = if frame.len() == data_end {
            false
        } else if frame.len() == data_end + FRAME_TRAILER_SIZE {
            if frame[data_end] != FRAME_MARKER {
                return Err(S7Error::invalid_pdu("bad trailer marker"));
            }
            true
        } else {
            return Err(S7Error::invalid_pdu(format!(
                "frame length {} does not match declared data length {}",
                frame.len(),
                data_len
            )));
        };

        if self.state == FramerState::AccumulatingFragment {
            if version != self.version {
                return Err(S7Error::invalid_pdu(format!(
                    "fragment version 0x{version:02X} differs from 0x{:02X}",
                    self.version
                )));
            }
        } else {
            self.buffer.clear();
            self.buffer.push(version);
            self.version = version;
        }
        self.buffer.extend_from_slice(data);

        if last {
            self.state = FramerState::Complete;
            trace!(len = self.buffer.len(), "PDU reassembled");
            Ok(Some(Received::Pdu(std::mem::take(&mut self.buffer))))
        } else {
            self.state = FramerState::AccumulatingFragment;
            trace!(buffered = self.buffer.len(), "fragment buffered");
            Ok(None)
        }
    }

    fn system_event(data: &[u8]) -> Result<Received> {
        let status: [u8; 8] = data
            .get(..8)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| S7Error::invalid_pdu("system event shorter than its status"))?;
        Ok(Received::SystemEvent(SystemEvent {
            status: i64::from_be_bytes(status),
            data: data.to_vec(),
        }))
    }

    /// Splits a PDU into outbound frames.
    ///
    /// The first byte of `pdu` is the protocol version; the rest is spread
    /// over frames of at most `max_data` bytes. Only the last frame carries
    /// the trailer.
    ///
    /// # Errors
    ///
    /// Returns `S7Error::InvalidParameter` if `pdu` is empty or `max_data`
    /// is zero or larger than `u16::MAX`.
    pub fn frame(pdu: &[u8], max_data: usize) -> Result<Vec<Vec<u8>>> {
        let (&version, data) = pdu
            .split_first()
            .ok_or_else(|| S7Error::invalid_parameter("pdu", "empty PDU"))?;
        if max_data == 0 || max_data > usize::from(u16::MAX) {
            return Err(S7Error::invalid_parameter(
                "max_data",
                format!("must be between 1 and {}", u16::MAX),
            ));
        }

        let chunks: Vec<&[u8]> = if data.is_empty() {
            vec![data]
        } else {
            data.chunks(max_data).collect()
        };
        let last = chunks.len() - 1;
        Ok(chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| {
                let mut frame =
                    Vec::with_capacity(FRAME_HEADER_SIZE + chunk.len() + FRAME_TRAILER_SIZE);
                frame.push(FRAME_MARKER);
                frame.push(version);
                // chunk.len() <= max_data <= u16::MAX
                frame.extend_from_slice(&(chunk.len() as u16).to_be_bytes());
                frame.extend_from_slice(chunk);
                if index == last {
                    frame.extend_from_slice(&[FRAME_MARKER, version, 0x00, 0x00]);
                }
                frame
            })
            .collect())
    }
}
