//! High-level S7comm-plus client for Siemens S7-1200/1500 PLCs.
//!
//! This module provides the [`Client`] struct, which runs the session
//! handshake and then offers bulk reads and writes on top of a
//! [`Transport`].
//!
//! # Overview
//!
//! The client handles:
//! - The handshake (TLS bootstrap, session creation and setup, limits,
//!   optional password legitimation)
//! - Request/response correlation via sequence numbers and integrity ids
//! - Splitting PDUs into frames and waiting for the reassembled response
//! - Chunking bulk requests to the limits reported by the PLC
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use s7commplus::{Area, Client, ClientConfig, ItemAddress, Scalar, Transport, Value};
//!
//! # fn open_transport() -> Arc<dyn Transport> { unimplemented!() }
//! let transport = open_transport();
//! let client = Client::connect(transport, ClientConfig::new().with_password("secret"))?;
//!
//! let addresses = [ItemAddress::new(Area::DataBlock(1), vec![1])];
//! let (values, errors) = client.read_values(&addresses)?;
//! println!("{:?} {:?}", values, errors);
//!
//! client.write_values(&addresses, &[Value::Scalar(Scalar::Int(42))])?;
//! client.disconnect()?;
//! # Ok::<(), s7commplus::S7Error>(())
//! ```
//!
//! # Thread Safety
//!
//! `Client` is `Send + Sync`. Exchanges are serialized by an internal
//! mutex: one request is outstanding at a time and no pipelining happens.
//! Responses are received by a single background thread that lives as long
//! as the client.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam::channel::RecvTimeoutError;
use tracing::{debug, trace, warn};

use crate::address::ItemAddress;
use crate::error::{Result, S7Error};
use crate::framing::{PduFramer, DEFAULT_MAX_FRAGMENT_DATA};
use crate::ids::{self, access_level};
use crate::object::Object;
use crate::receiver::{PduReceiver, ReceiveThread};
use crate::request::{
    encode_request, CreateObjectRequest, DeleteObjectRequest, ExploreRequest,
    GetMultiVariablesRequest, GetVariableRequest, InitSslRequest, Request,
    SetMultiVariablesRequest, SetVariableRequest,
};
use crate::response::{
    CreateObjectResponse, DeleteObjectResponse, ExploreResponse, GetMultiVariablesResponse,
    GetVariableResponse, InitSslResponse, Response, ResponseFrame, SetMultiVariablesResponse,
    SetVariableResponse,
};
use crate::session::{
    expected_integrity_id, legitimation_response, ConnectionState, ResourceLimits, SessionState,
};
use crate::transport::{TlsOptions, Transport, DEFAULT_TIMEOUT};
use crate::value::{Array, Value};

/// Default capacity of the channel between receive thread and client.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Configuration for connecting a client.
#[derive(Clone)]
pub struct ClientConfig {
    /// Time to wait for each response.
    pub timeout: Duration,
    /// Password for legitimation, if the PLC is protected.
    pub password: Option<String>,
    /// Parameters of the TLS upgrade.
    pub tls: TlsOptions,
    /// Largest amount of PDU data sent in one frame.
    pub max_fragment_data: usize,
    /// Number of received PDUs buffered before the receive thread waits.
    pub channel_capacity: usize,
}

impl ClientConfig {
    /// Creates a configuration with default values.
    ///
    /// | Setting | Default |
    /// |---------|---------|
    /// | timeout | 5 s |
    /// | password | none |
    /// | TLS | 1.3, AES-GCM suites |
    /// | fragment data | 1024 bytes |
    /// | channel capacity | 32 |
    ///
    /// # Example
    ///
    /// ```
    /// use s7commplus::ClientConfig;
    /// use std::time::Duration;
    ///
    /// let config = ClientConfig::new();
    /// assert_eq!(config.timeout, Duration::from_secs(5));
    /// assert!(config.password.is_none());
    /// ```
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            password: None,
            tls: TlsOptions::default(),
            max_fragment_data: DEFAULT_MAX_FRAGMENT_DATA,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Sets the response timeout.
    ///
    /// # Example
    ///
    /// ```
    /// use s7commplus::ClientConfig;
    /// use std::time::Duration;
    ///
    /// let config = ClientConfig::new().with_timeout(Duration::from_millis(500));
    /// assert_eq!(config.timeout, Duration::from_millis(500));
    /// ```
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the password used to answer the legitimation challenge.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the TLS parameters.
    pub fn with_tls_options(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    /// Sets the largest amount of PDU data per outbound frame.
    pub fn with_max_fragment_data(mut self, max_fragment_data: usize) -> Self {
        self.max_fragment_data = max_fragment_data;
        self
    }

    /// Sets the capacity of the receive channel.
    pub fn with_channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.channel_capacity = channel_capacity;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(S7Error::invalid_parameter("timeout", "must be nonzero"));
        }
        if self.max_fragment_data == 0 || self.max_fragment_data > usize::from(u16::MAX) {
            return Err(S7Error::invalid_parameter(
                "max_fragment_data",
                format!("must be between 1 and {}", u16::MAX),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(S7Error::invalid_parameter(
                "channel_capacity",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("timeout", &self.timeout)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("tls", &self.tls)
            .field("max_fragment_data", &self.max_fragment_data)
            .field("channel_capacity", &self.channel_capacity)
            .finish()
    }
}

/// S7comm-plus client for communicating with S7-1200/1500 PLCs.
///
/// Each operation produces one or more request/response round trips. No
/// automatic retries, caching, or reconnection.
pub struct Client {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    session: Mutex<SessionState>,
    responses: PduReceiver,
    receiver: Mutex<ReceiveThread>,
}

impl Client {
    /// Connects over an established transport and runs the handshake.
    ///
    /// On failure the transport is closed and the receive thread stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - Any handshake step fails or times out
    /// - The legitimation challenge cannot be answered
    pub fn connect(transport: Arc<dyn Transport>, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let (receiver, responses) =
            ReceiveThread::spawn(Arc::clone(&transport), config.channel_capacity)?;
        let client = Self {
            transport,
            config,
            session: Mutex::new(SessionState::new()),
            responses,
            receiver: Mutex::new(receiver),
        };

        let result = {
            let mut session = client.lock_session();
            let result = client.handshake(&mut session);
            if result.is_err() {
                session.state = ConnectionState::Disconnected;
            }
            result
        };
        match result {
            Ok(()) => Ok(client),
            Err(err) => {
                warn!(error = %err, "handshake failed");
                client.shutdown();
                Err(err)
            }
        }
    }

    fn handshake(&self, session: &mut SessionState) -> Result<()> {
        let _: InitSslResponse = self.exchange(session, &InitSslRequest)?;
        advance(session, ConnectionState::TlsBootstrapped);

        self.transport.start_tls(&self.config.tls)?;
        advance(session, ConnectionState::TlsActive);

        let created: CreateObjectResponse =
            self.exchange(session, &CreateObjectRequest::session())?;
        let (session_id, session_id2) = match created.object_ids[..] {
            [first, second, ..] => (first, second),
            _ => {
                return Err(S7Error::invalid_response(format!(
                    "session creation returned {} object ids, expected 2",
                    created.object_ids.len()
                )))
            }
        };
        let version = created
            .object
            .attribute(ids::SERVER_SESSION_VERSION)
            .cloned()
            .ok_or_else(|| S7Error::invalid_response("session object lacks a session version"))?;
        session.session_id = session_id;
        session.session_id2 = session_id2;
        session.server_session_version = Some(version.clone());
        debug!(session_id, session_id2, "session created");
        advance(session, ConnectionState::SessionCreated);

        let setup = SetMultiVariablesRequest::session_setup(session_id, version);
        let confirmed: SetMultiVariablesResponse = self.exchange(session, &setup)?;
        if let Some((_, code)) = confirmed.errors.first() {
            return Err(S7Error::invalid_response(format!(
                "session setup rejected with 0x{code:X}"
            )));
        }
        advance(session, ConnectionState::SessionConfigured);

        self.read_limits(session)?;
        advance(session, ConnectionState::LimitsKnown);

        if let Some(password) = &self.config.password {
            if self.legitimate(session, password)? {
                advance(session, ConnectionState::PasswordChallenged);
            }
        }

        advance(session, ConnectionState::Ready);
        Ok(())
    }

    fn read_limits(&self, session: &mut SessionState) -> Result<()> {
        let addresses = ResourceLimits::LIDS
            .iter()
            .map(|lid| ItemAddress::raw(ids::OBJECT_ROOT, ids::SYSTEM_LIMITS, vec![*lid]))
            .collect();
        let response: GetMultiVariablesResponse =
            self.exchange(session, &GetMultiVariablesRequest::new(addresses))?;

        let mut limits = ResourceLimits::default();
        for (item, value) in &response.values {
            limits.apply((*item as usize).saturating_sub(1), value);
        }
        for (item, code) in &response.errors {
            debug!(item, code, "system limit not available");
        }
        debug!(?limits, "system limits read");
        session.limits = limits;
        Ok(())
    }

    /// Answers the password challenge if the session lacks full access.
    /// Returns `true` if a challenge was answered.
    fn legitimate(&self, session: &mut SessionState, password: &str) -> Result<bool> {
        let session_id = session.session_id;
        let level: GetVariableResponse = self.exchange(
            session,
            &GetVariableRequest::new(session_id, ids::EFFECTIVE_PROTECTION_LEVEL),
        )?;
        let level = level
            .value
            .as_u32()
            .ok_or_else(|| S7Error::legitimation("protection level is not an integer"))?;
        session.protection_level = Some(level);
        if level <= access_level::FULL_ACCESS {
            debug!(level, "full access granted, skipping legitimation");
            return Ok(false);
        }

        let challenge: GetVariableResponse = self.exchange(
            session,
            &GetVariableRequest::new(session_id, ids::SERVER_SESSION_REQUEST),
        )?;
        let challenge = challenge
            .value
            .as_bytes()
            .ok_or_else(|| S7Error::legitimation("challenge is not a byte array"))?;
        let answer = legitimation_response(password, challenge)?;

        let _: SetVariableResponse = self.exchange(
            session,
            &SetVariableRequest::new(
                session_id,
                ids::SERVER_SESSION_RESPONSE,
                Value::Array(Array::USInt(answer)),
            ),
        )?;
        debug!(level, "legitimation answered");
        Ok(true)
    }

    fn lock_session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ready_session(&self) -> Result<MutexGuard<'_, SessionState>> {
        let session = self.lock_session();
        if !session.is_ready() {
            return Err(S7Error::NotConnected);
        }
        Ok(session)
    }

    /// Sends a request and waits for its response.
    fn exchange<Q: Request, P: Response>(
        &self,
        session: &mut SessionState,
        request: &Q,
    ) -> Result<P> {
        self.exchange_with(session, request, true)
    }

    fn exchange_with<Q: Request, P: Response>(
        &self,
        session: &mut SessionState,
        request: &Q,
        response_integrity: bool,
    ) -> Result<P> {
        let result = self.round_trip(session, request, response_integrity);
        if let Err(err) = &result {
            if err.is_fatal() {
                warn!(error = %err, "connection lost");
                session.state = ConnectionState::Disconnected;
                self.shutdown();
            }
        }
        result
    }

    fn round_trip<Q: Request, P: Response>(
        &self,
        session: &mut SessionState,
        request: &Q,
        response_integrity: bool,
    ) -> Result<P> {
        self.discard_stale()?;

        let function = request.function_code();
        let sequence = session.next_sequence();
        let integrity_id = request
            .with_integrity_id()
            .then(|| session.next_integrity_id(function.counter_kind()));

        let pdu = encode_request(request, sequence, session.session_id, integrity_id)?;
        for frame in PduFramer::frame(&pdu, self.config.max_fragment_data)? {
            self.transport.send(&frame)?;
        }
        trace!(%function, sequence, len = pdu.len(), "request sent");

        let reply = match self.responses.recv_timeout(self.config.timeout) {
            Ok(reply) => reply?,
            Err(RecvTimeoutError::Timeout) => return Err(S7Error::Timeout),
            Err(RecvTimeoutError::Disconnected) => return Err(S7Error::ConnectionClosed),
        };
        let frame = ResponseFrame::from_bytes(&reply)?;
        frame.validate(function, sequence)?;

        let response = P::decode(&frame.payload, response_integrity && integrity_id.is_some())?;
        if let (Some(sent), Some(received)) = (integrity_id, response.integrity_id()) {
            let expected = expected_integrity_id(sequence, sent);
            if received != expected {
                warn!(%function, sequence, expected, received, "integrity id mismatch");
            }
        }
        if response.return_value() != 0 {
            debug!(%function, return_value = response.return_value(), "nonzero return value");
        }
        Ok(response)
    }

    /// Drops responses that arrived after their request timed out.
    fn discard_stale(&self) -> Result<()> {
        while let Ok(stale) = self.responses.try_recv() {
            match stale {
                Ok(pdu) => debug!(len = pdu.len(), "discarding stale PDU"),
                Err(err @ (S7Error::FatalSystemEvent { .. } | S7Error::ConnectionClosed)) => {
                    return Err(err)
                }
                Err(S7Error::Io(err)) => return Err(S7Error::Io(err)),
                Err(err) => debug!(error = %err, "discarding stale receive error"),
            }
        }
        Ok(())
    }

    /// Reads several items.
    ///
    /// Requests are split into chunks of at most `tags_per_read_request_max`
    /// items. The result has one entry per address, in input order: the
    /// value (or `None` if the item failed) and the item's error code (0 on
    /// success).
    ///
    /// # Errors
    ///
    /// Returns an error if the client is not connected or a round trip
    /// fails. Failures of single items are not errors.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use std::sync::Arc;
    /// # use s7commplus::{Area, Client, ClientConfig, ItemAddress, Transport};
    /// # fn open_transport() -> Arc<dyn Transport> { unimplemented!() }
    /// let client = Client::connect(open_transport(), ClientConfig::new())?;
    /// let addresses: Vec<_> = (1..=3)
    ///     .map(|lid| ItemAddress::new(Area::DataBlock(1), vec![lid]))
    ///     .collect();
    /// let (values, errors) = client.read_values(&addresses)?;
    /// for (value, error) in values.iter().zip(&errors) {
    ///     println!("{value:?} (error 0x{error:X})");
    /// }
    /// # Ok::<(), s7commplus::S7Error>(())
    /// ```
    pub fn read_values(&self, addresses: &[ItemAddress]) -> Result<(Vec<Option<Value>>, Vec<u64>)> {
        let mut session = self.ready_session()?;
        let mut values = vec![None; addresses.len()];
        let mut errors = vec![0u64; addresses.len()];
        let chunk_size = session.limits.tags_per_read_request_max.max(1) as usize;

        for (index, chunk) in addresses.chunks(chunk_size).enumerate() {
            let offset = index * chunk_size;
            let request = GetMultiVariablesRequest::new(chunk.to_vec());
            let response: GetMultiVariablesResponse = self.exchange(&mut session, &request)?;
            for (item, value) in response.values {
                values[item_slot(offset, item, chunk.len())?] = Some(value);
            }
            for (item, code) in response.errors {
                errors[item_slot(offset, item, chunk.len())?] = code;
            }
        }
        Ok((values, errors))
    }

    /// Writes several items.
    ///
    /// Requests are split into chunks of at most
    /// `tags_per_write_request_max` items. Returns one error code per
    /// address, in input order (0 on success).
    ///
    /// # Errors
    ///
    /// Returns `S7Error::InvalidParameter` if the slices differ in length,
    /// and an error if the client is not connected or a round trip fails.
    pub fn write_values(&self, addresses: &[ItemAddress], values: &[Value]) -> Result<Vec<u64>> {
        if addresses.len() != values.len() {
            return Err(S7Error::invalid_parameter(
                "values",
                format!(
                    "{} values given for {} addresses",
                    values.len(),
                    addresses.len()
                ),
            ));
        }
        let mut session = self.ready_session()?;
        let mut errors = vec![0u64; addresses.len()];
        let chunk_size = session.limits.tags_per_write_request_max.max(1) as usize;

        for (index, (chunk, chunk_values)) in addresses
            .chunks(chunk_size)
            .zip(values.chunks(chunk_size))
            .enumerate()
        {
            let offset = index * chunk_size;
            let request = SetMultiVariablesRequest::items(chunk.to_vec(), chunk_values.to_vec())?;
            let response: SetMultiVariablesResponse = self.exchange(&mut session, &request)?;
            for (item, code) in response.errors {
                errors[item_slot(offset, item, chunk.len())?] = code;
            }
        }
        Ok(errors)
    }

    /// Reads one attribute of an object.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is not connected, the round trip
    /// fails or the PLC reports an error.
    pub fn get_variable(&self, object_id: u32, attribute: u32) -> Result<Value> {
        let mut session = self.ready_session()?;
        let response: GetVariableResponse =
            self.exchange(&mut session, &GetVariableRequest::new(object_id, attribute))?;
        Ok(response.value)
    }

    /// Writes one attribute of an object.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is not connected, the round trip
    /// fails or the PLC reports an error.
    pub fn set_variable(&self, object_id: u32, attribute: u32, value: Value) -> Result<()> {
        let mut session = self.ready_session()?;
        let _: SetVariableResponse = self.exchange(
            &mut session,
            &SetVariableRequest::new(object_id, attribute, value),
        )?;
        Ok(())
    }

    /// Reads the object tree below `object_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is not connected, the round trip
    /// fails or the PLC reports an error.
    pub fn explore(&self, object_id: u32) -> Result<Vec<Object>> {
        let mut session = self.ready_session()?;
        let response: ExploreResponse =
            self.exchange(&mut session, &ExploreRequest::new(object_id))?;
        Ok(response.objects)
    }

    /// Deletes the session and closes the connection.
    ///
    /// Calling it again after the connection is gone is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the error of the delete round trip. The connection is closed
    /// either way.
    pub fn disconnect(&self) -> Result<()> {
        let result = {
            let mut session = self.lock_session();
            if session.state == ConnectionState::Disconnected {
                drop(session);
                self.shutdown();
                return Ok(());
            }
            // The confirmation of a self-deletion carries no integrity id.
            let request = DeleteObjectRequest::new(session.session_id);
            let result = self
                .exchange_with::<_, DeleteObjectResponse>(&mut session, &request, false)
                .map(|_| ());
            advance(&mut session, ConnectionState::Disconnected);
            result
        };
        self.shutdown();
        result
    }

    /// Returns a snapshot of the session state.
    pub fn session_state(&self) -> SessionState {
        self.lock_session().clone()
    }

    /// Returns the handshake state.
    pub fn state(&self) -> ConnectionState {
        self.lock_session().state
    }

    /// Returns the limits read during the handshake.
    pub fn limits(&self) -> ResourceLimits {
        self.lock_session().limits
    }

    /// Returns the configuration the client was connected with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn shutdown(&self) {
        self.receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stop(self.transport.as_ref());
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self.lock_session();
        let receiving = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_running();
        f.debug_struct("Client")
            .field("state", &session.state)
            .field("session_id", &session.session_id)
            .field("receiving", &receiving)
            .field("config", &self.config)
            .finish()
    }
}

fn advance(session: &mut SessionState, next: ConnectionState) {
    debug!(from = %session.state, to = %next, "session state change");
    session.state = next;
}

/// Maps a 1-based item number of a chunk to its position in the full request.
fn item_slot(offset: usize, item: u32, chunk_len: usize) -> Result<usize> {
    (item as usize)
        .checked_sub(1)
        .filter(|position| *position < chunk_len)
        .map(|position| offset + position)
        .ok_or_else(|| {
            S7Error::invalid_response(format!(
                "item number {item} outside a request of {chunk_len} items"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TlsVersion;

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::new();
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(config.password.is_none());
        assert_eq!(config.tls.min_version, TlsVersion::Tls13);
        assert_eq!(config.max_fragment_data, 1024);
        assert_eq!(config.channel_capacity, 32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::new()
            .with_timeout(Duration::from_secs(1))
            .with_password("secret")
            .with_tls_options(TlsOptions::new(TlsVersion::Tls12, vec![]))
            .with_max_fragment_data(256)
            .with_channel_capacity(4);
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.tls.min_version, TlsVersion::Tls12);
        assert_eq!(config.max_fragment_data, 256);
        assert_eq!(config.channel_capacity, 4);
    }

    #[test]
    fn test_client_config_validation() {
        assert!(ClientConfig::new()
            .with_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(ClientConfig::new()
            .with_max_fragment_data(0)
            .validate()
            .is_err());
        assert!(ClientConfig::new()
            .with_max_fragment_data(70_000)
            .validate()
            .is_err());
        assert!(ClientConfig::new()
            .with_channel_capacity(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_client_config_debug_hides_password() {
        let debug = format!("{:?}", ClientConfig::new().with_password("hunter2"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_item_slot() {
        assert_eq!(item_slot(0, 1, 3).unwrap(), 0);
        assert_eq!(item_slot(20, 3, 3).unwrap(), 22);
        assert!(item_slot(0, 0, 3).is_err());
        assert!(item_slot(0, 4, 3).is_err());
    }
}
