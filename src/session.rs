//! Session state: handshake progress, sequence numbers and integrity ids.
//!
//! # Correlation
//!
//! Every request carries a sequence number. Counting starts at 0, so the
//! first request is sent with 1; after 65535 the counter wraps to 1 and 0 is
//! never used.
//!
//! V3 requests also carry an integrity id. Two independent counters exist,
//! one for requests that change state on the PLC and one for everything
//! else ([`FunctionCode::counter_kind`](crate::FunctionCode::counter_kind)).
//! The response to a request is expected to carry
//! `sequence + request integrity id` (wrapping).
//!
//! # Example
//!
//! ```
//! use s7commplus::{CounterKind, SessionState};
//!
//! let mut session = SessionState::new();
//! assert_eq!(session.next_sequence(), 1);
//! assert_eq!(session.next_integrity_id(CounterKind::Mutating), 0);
//! assert_eq!(session.next_integrity_id(CounterKind::Mutating), 1);
//! assert_eq!(session.next_integrity_id(CounterKind::NonMutating), 0);
//! ```

use std::fmt;

use sha1::{Digest, Sha1};

use crate::error::{Result, S7Error};
use crate::header::CounterKind;
use crate::ids;
use crate::value::Value;

/// Fallback chunk size when the PLC does not report its limits.
pub const DEFAULT_TAGS_PER_REQUEST: u32 = 20;

/// Handshake progress of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No session.
    Disconnected,
    /// The PLC accepted the TLS bootstrap request.
    TlsBootstrapped,
    /// TLS is active on the transport.
    TlsActive,
    /// The server session exists.
    SessionCreated,
    /// The session version has been confirmed.
    SessionConfigured,
    /// The system limits have been read.
    LimitsKnown,
    /// The password challenge has been answered.
    PasswordChallenged,
    /// Ready for reads and writes.
    Ready,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Limits reported by the PLC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Maximum number of items in one read request.
    pub tags_per_read_request_max: u32,
    /// Maximum number of items in one write request.
    pub tags_per_write_request_max: u32,
    /// Maximum number of subscriptions.
    pub plc_subscriptions_max: u32,
    /// Maximum number of attributes per subscription.
    pub plc_attributes_max: u32,
    /// Memory available for subscriptions.
    pub subscription_memory_max: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            tags_per_read_request_max: DEFAULT_TAGS_PER_REQUEST,
            tags_per_write_request_max: DEFAULT_TAGS_PER_REQUEST,
            plc_subscriptions_max: 0,
            plc_attributes_max: 0,
            subscription_memory_max: 0,
        }
    }
}

impl ResourceLimits {
    /// LIDs below [`SYSTEM_LIMITS`](ids::SYSTEM_LIMITS), in the order
    /// [`ResourceLimits::apply`] expects them.
    pub const LIDS: [u32; 5] = [
        ids::limits::TAGS_PER_READ_REQUEST_MAX,
        ids::limits::TAGS_PER_WRITE_REQUEST_MAX,
        ids::limits::PLC_SUBSCRIPTIONS_MAX,
        ids::limits::PLC_ATTRIBUTES_MAX,
        ids::limits::SUBSCRIPTION_MEMORY_MAX,
    ];

    /// Stores the value read for the LID at `index` of [`Self::LIDS`].
    ///
    /// Non-integer values and a zero request size are ignored.
    pub fn apply(&mut self, index: usize, value: &Value) {
        let Some(limit) = value
            .as_i64()
            .and_then(|v| u32::try_from(v).ok())
        else {
            return;
        };
        match index {
            0 if limit > 0 => self.tags_per_read_request_max = limit,
            1 if limit > 0 => self.tags_per_write_request_max = limit,
            2 => self.plc_subscriptions_max = limit,
            3 => self.plc_attributes_max = limit,
            4 => self.subscription_memory_max = limit,
            _ => {}
        }
    }
}

/// Sequence and integrity counters plus session identity.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    /// Handshake progress.
    pub state: ConnectionState,
    /// Session id assigned by the PLC.
    pub session_id: u32,
    /// Secondary session id assigned by the PLC.
    pub session_id2: u32,
    /// Server session version echoed during setup.
    pub server_session_version: Option<Value>,
    /// Limits read during the handshake.
    pub limits: ResourceLimits,
    /// Protection level granted to the session, once read.
    pub protection_level: Option<u32>,
    sequence: u16,
    integrity_mutating: u32,
    integrity_non_mutating: u32,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    /// Creates the state of a disconnected client.
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            session_id: ids::OBJECT_NULL_SERVER_SESSION,
            session_id2: ids::NONE,
            server_session_version: None,
            limits: ResourceLimits::default(),
            protection_level: None,
            sequence: 0,
            integrity_mutating: 0,
            integrity_non_mutating: 0,
        }
    }

    /// Current sequence number.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Advances the sequence number and returns it. Skips 0 on wrap.
    pub fn next_sequence(&mut self) -> u16 {
        self.sequence = match self.sequence.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        self.sequence
    }

    /// Returns the next integrity id of the given counter.
    pub fn next_integrity_id(&mut self, kind: CounterKind) -> u32 {
        let counter = match kind {
            CounterKind::Mutating => &mut self.integrity_mutating,
            CounterKind::NonMutating => &mut self.integrity_non_mutating,
        };
        let id = *counter;
        *counter = counter.wrapping_add(1);
        id
    }

    /// Number of integrity ids drawn from the given counter.
    pub fn integrity_counter(&self, kind: CounterKind) -> u32 {
        match kind {
            CounterKind::Mutating => self.integrity_mutating,
            CounterKind::NonMutating => self.integrity_non_mutating,
        }
    }

    /// Returns `true` once the handshake has completed.
    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }
}

/// Integrity id a response to `(sequence, request_integrity)` must carry.
pub fn expected_integrity_id(sequence: u16, request_integrity: u32) -> u32 {
    u32::from(sequence).wrapping_add(request_integrity)
}

/// Computes the answer to a legitimation challenge.
///
/// The answer is the SHA-1 digest of the password XORed byte-wise with the
/// challenge.
///
/// # Errors
///
/// Returns `S7Error::Legitimation` if the challenge is not 20 bytes long.
///
/// # Example
///
/// ```
/// use s7commplus::legitimation_response;
///
/// let challenge = [0u8; 20];
/// let answer = legitimation_response("secret", &challenge).unwrap();
/// assert_eq!(answer.len(), 20);
/// assert!(legitimation_response("secret", &[0u8; 16]).is_err());
/// ```
pub fn legitimation_response(password: &str, challenge: &[u8]) -> Result<Vec<u8>> {
    let digest = Sha1::digest(password.as_bytes());
    if challenge.len() != digest.len() {
        return Err(S7Error::legitimation(format!(
            "challenge has {} bytes, expected {}",
            challenge.len(),
            digest.len()
        )));
    }
    Ok(digest
        .iter()
        .zip(challenge)
        .map(|(d, c)| d ^ c)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Scalar;

    #[test]
    fn test_sequence_starts_at_one() {
        let mut session = SessionState::new();
        assert_eq!(session.sequence(), 0);
        assert_eq!(session.next_sequence(), 1);
        assert_eq!(session.next_sequence(), 2);
    }

    #[test]
    fn test_sequence_wraps_skipping_zero() {
        let mut session = SessionState::new();
        for _ in 0..65535 {
            session.next_sequence();
        }
        assert_eq!(session.sequence(), 65535);
        assert_eq!(session.next_sequence(), 1);
    }

    #[test]
    fn test_sequence_after_many_cycles() {
        let mut session = SessionState::new();
        let mut seen_zero = false;
        for _ in 0..200_000 {
            seen_zero |= session.next_sequence() == 0;
        }
        assert!(!seen_zero);
        // 200000 steps over the 65535 nonzero values
        assert_eq!(session.sequence(), (200_000 % 65535) as u16);
    }

    #[test]
    fn test_integrity_counters_independent() {
        let mut session = SessionState::new();
        assert_eq!(session.next_integrity_id(CounterKind::Mutating), 0);
        assert_eq!(session.next_integrity_id(CounterKind::Mutating), 1);
        assert_eq!(session.next_integrity_id(CounterKind::NonMutating), 0);
        assert_eq!(session.integrity_counter(CounterKind::Mutating), 2);
        assert_eq!(session.integrity_counter(CounterKind::NonMutating), 1);
    }

    #[test]
    fn test_integrity_counter_wraps() {
        let mut session = SessionState::new();
        session.integrity_non_mutating = u32::MAX;
        assert_eq!(session.next_integrity_id(CounterKind::NonMutating), u32::MAX);
        assert_eq!(session.next_integrity_id(CounterKind::NonMutating), 0);
    }

    #[test]
    fn test_expected_integrity_id() {
        assert_eq!(expected_integrity_id(5, 10), 15);
        assert_eq!(expected_integrity_id(2, u32::MAX), 1);
    }

    #[test]
    fn test_initial_state() {
        let session = SessionState::new();
        assert_eq!(session.state, ConnectionState::Disconnected);
        assert_eq!(session.session_id, ids::OBJECT_NULL_SERVER_SESSION);
        assert!(!session.is_ready());
        assert_eq!(session.limits, ResourceLimits::default());
    }

    #[test]
    fn test_limits_apply() {
        let mut limits = ResourceLimits::default();
        limits.apply(0, &Scalar::DInt(100).into());
        limits.apply(1, &Scalar::UDInt(50).into());
        limits.apply(4, &Scalar::UDInt(4096).into());
        assert_eq!(limits.tags_per_read_request_max, 100);
        assert_eq!(limits.tags_per_write_request_max, 50);
        assert_eq!(limits.subscription_memory_max, 4096);
    }

    #[test]
    fn test_limits_ignore_invalid() {
        let mut limits = ResourceLimits::default();
        limits.apply(0, &Scalar::DInt(0).into());
        limits.apply(1, &Scalar::DInt(-1).into());
        limits.apply(2, &Value::Null);
        limits.apply(9, &Scalar::UDInt(7).into());
        assert_eq!(limits, ResourceLimits::default());
    }

    #[test]
    fn test_legitimation_response() {
        // SHA-1("abc") = a9993e364706816aba3e25717850c26c9cd0d89d
        let challenge = [0xFFu8; 20];
        let answer = legitimation_response("abc", &challenge).unwrap();
        assert_eq!(hex::encode(answer), "5666c1c9b8f97e9545c1da8e87af3d93632f2762");
    }

    #[test]
    fn test_legitimation_zero_challenge_is_digest() {
        let answer = legitimation_response("abc", &[0u8; 20]).unwrap();
        assert_eq!(hex::encode(answer), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_legitimation_length_mismatch() {
        assert!(matches!(
            legitimation_response("abc", &[0u8; 19]),
            Err(S7Error::Legitimation { .. })
        ));
    }
}
