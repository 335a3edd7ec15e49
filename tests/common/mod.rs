//! Scripted PLC used by the integration tests.
//!
//! The mock implements [`Transport`]: frames sent by the client are
//! reassembled, answered according to a [`Behavior`], and the answer is
//! queued for the client's receive thread.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use s7commplus::ids::{self, access_level};
use s7commplus::{
    encode_response, expected_integrity_id, legitimation_response, vlq, Array, Client,
    ClientConfig, CounterKind, CreateObjectResponse, DeleteObjectResponse, ExploreResponse,
    FunctionCode, GetMultiVariablesResponse, GetVariableResponse, InitSslResponse, ItemAddress,
    Object, PduFramer, ProtocolVersion, Received, RequestHeader, Result, S7Error, Scalar,
    SetMultiVariablesResponse, SetVariableResponse, TlsOptions, Transport, Value,
    REQUEST_HEADER_SIZE,
};

pub const SESSION_ID: u32 = 0x0000_03E8;
pub const SESSION_ID2: u32 = 0x0000_03E9;
pub const CHALLENGE: [u8; 20] = [0x5A; 20];
/// Error code reported for items listed in `Behavior::failing_lids`.
pub const ITEM_ERROR: u64 = 0x0000_0000_0002_000A;
/// Return value of a rejected request.
pub const REJECTED: u64 = 0x8000_0000_0000_0011;

pub fn server_session_version() -> Value {
    Scalar::UDInt(0x0001_0203).into()
}

/// How the mock answers.
#[derive(Debug, Clone)]
pub struct Behavior {
    pub read_limit: u32,
    pub write_limit: u32,
    pub protection_level: u32,
    pub password: Option<String>,
    pub failing_lids: Vec<u32>,
    pub fragment_size: usize,
    pub fatal_on: Option<FunctionCode>,
    pub silent_on: Option<FunctionCode>,
    pub bad_sequence_on: Option<FunctionCode>,
    pub bad_integrity_on: Option<FunctionCode>,
    /// Return value of bulk answers with failed items; 1 if unset.
    pub bulk_return_value: Option<u64>,
    pub chatter: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            read_limit: 20,
            write_limit: 20,
            protection_level: access_level::FULL_ACCESS,
            password: None,
            failing_lids: Vec::new(),
            fragment_size: 1024,
            fatal_on: None,
            silent_on: None,
            bad_sequence_on: None,
            bad_integrity_on: None,
            bulk_return_value: None,
            chatter: false,
        }
    }
}

/// A request as seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub version: u8,
    pub function: FunctionCode,
    pub sequence: u16,
    pub session_id: u32,
    pub item_count: usize,
}

#[derive(Debug, Default)]
pub struct PlcState {
    pub requests: Vec<RecordedRequest>,
    pub integrity_errors: Vec<String>,
    pub writes: Vec<(u32, Value)>,
    pub setup_version: Option<Value>,
    pub tls_started: bool,
    pub legitimated: bool,
    pub mutating: u32,
    pub non_mutating: u32,
}

pub struct MockPlc {
    behavior: Behavior,
    inbound: Mutex<PduFramer>,
    outbound: Mutex<VecDeque<Vec<u8>>>,
    ready: Condvar,
    closed: AtomicBool,
    frames_received: AtomicUsize,
    state: Mutex<PlcState>,
}

impl MockPlc {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            inbound: Mutex::new(PduFramer::new()),
            outbound: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            closed: AtomicBool::new(false),
            frames_received: AtomicUsize::new(0),
            state: Mutex::new(PlcState::default()),
        })
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, PlcState> {
        self.state.lock().unwrap()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state().requests.clone()
    }

    pub fn functions(&self) -> Vec<FunctionCode> {
        self.requests().iter().map(|r| r.function).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn frames_received(&self) -> usize {
        self.frames_received.load(Ordering::Acquire)
    }

    fn queue(&self, frames: Vec<Vec<u8>>) {
        let mut outbound = self.outbound.lock().unwrap();
        outbound.extend(frames);
        self.ready.notify_all();
    }

    fn handle(&self, pdu: &[u8]) {
        let version = ProtocolVersion::from_u8(pdu[0]).expect("request version");
        let header = RequestHeader::from_bytes(&pdu[1..]).expect("request header");
        let body = &pdu[1 + REQUEST_HEADER_SIZE..];
        let function = header.function;

        let mut state = self.state();
        let integrity = (version == ProtocolVersion::V3).then(|| {
            let counter = match function.counter_kind() {
                CounterKind::Mutating => &mut state.mutating,
                CounterKind::NonMutating => &mut state.non_mutating,
            };
            let id = *counter;
            *counter += 1;
            let mut tail = Vec::new();
            vlq::encode_u32(&mut tail, id).unwrap();
            tail.extend_from_slice(&[0; 4]);
            if !body.ends_with(&tail) {
                state.integrity_errors.push(format!(
                    "{function} seq {}: expected integrity id {id}",
                    header.sequence
                ));
            }
            id
        });
        let response_integrity = integrity.map(|id| {
            let expected = expected_integrity_id(header.sequence, id);
            if self.behavior.bad_integrity_on == Some(function) {
                expected.wrapping_add(1)
            } else {
                expected
            }
        });
        let bulk_return_value = |failed: bool| match (failed, self.behavior.bulk_return_value) {
            (false, _) => 0,
            (true, Some(value)) => value,
            (true, None) => 1,
        };
        let sequence = if self.behavior.bad_sequence_on == Some(function) {
            header.sequence.wrapping_add(1)
        } else {
            header.sequence
        };

        let mut item_count = 0;
        let response = match function {
            FunctionCode::InitSsl => encode_response(&InitSslResponse { return_value: 0 }, version, sequence),
            FunctionCode::CreateObject => {
                let mut object = Object::new(SESSION_ID, ids::CLASS_SERVER_SESSION, 0, 0);
                object.set_attribute(ids::SERVER_SESSION_VERSION, server_session_version());
                let response = CreateObjectResponse {
                    return_value: 0,
                    object_ids: vec![SESSION_ID, SESSION_ID2],
                    object,
                    integrity_id: response_integrity,
                };
                encode_response(&response, version, sequence)
            }
            FunctionCode::SetMultiVariables => {
                let writes = parse_writes(body);
                item_count = writes.len();
                let errors = writes
                    .iter()
                    .enumerate()
                    .filter(|(_, (key, _))| self.behavior.failing_lids.contains(key))
                    .map(|(index, _)| (index as u32 + 1, ITEM_ERROR))
                    .collect::<Vec<_>>();
                for (key, value) in writes {
                    if header.session_id == SESSION_ID && key == ids::SERVER_SESSION_VERSION {
                        state.setup_version = Some(value);
                    } else {
                        state.writes.push((key, value));
                    }
                }
                let response = SetMultiVariablesResponse {
                    return_value: bulk_return_value(!errors.is_empty()),
                    errors,
                    integrity_id: response_integrity,
                };
                encode_response(&response, version, sequence)
            }
            FunctionCode::GetMultiVariables => {
                let addresses = parse_addresses(body);
                item_count = addresses.len();
                let mut values = Vec::new();
                let mut errors = Vec::new();
                for (index, address) in addresses.iter().enumerate() {
                    let item = index as u32 + 1;
                    let lid = address.lids[0];
                    if address.access_area == ids::OBJECT_ROOT
                        && address.access_sub_area == ids::SYSTEM_LIMITS
                    {
                        let limit = match lid {
                            ids::limits::TAGS_PER_READ_REQUEST_MAX => self.behavior.read_limit,
                            ids::limits::TAGS_PER_WRITE_REQUEST_MAX => self.behavior.write_limit,
                            _ => 0,
                        };
                        values.push((item, Scalar::DInt(limit as i32).into()));
                    } else if self.behavior.failing_lids.contains(&lid) {
                        errors.push((item, ITEM_ERROR));
                    } else {
                        values.push((item, Scalar::UDInt(lid).into()));
                    }
                }
                let response = GetMultiVariablesResponse {
                    return_value: bulk_return_value(!errors.is_empty()),
                    values,
                    errors,
                    integrity_id: response_integrity,
                };
                encode_response(&response, version, sequence)
            }
            FunctionCode::GetVariable => {
                let (_, attribute) = parse_object_attribute(body);
                let value = match attribute {
                    ids::EFFECTIVE_PROTECTION_LEVEL => {
                        Scalar::UDInt(self.behavior.protection_level).into()
                    }
                    ids::SERVER_SESSION_REQUEST => Value::Array(Array::USInt(CHALLENGE.to_vec())),
                    other => Scalar::UDInt(other).into(),
                };
                let response = GetVariableResponse {
                    return_value: 0,
                    value,
                    integrity_id: response_integrity,
                };
                encode_response(&response, version, sequence)
            }
            FunctionCode::SetVariable => {
                let mut r = body;
                let object_id = vlq::read_u32(&mut r).unwrap();
                vlq::decode_u32(&mut r).unwrap();
                let (attribute, _) = vlq::decode_u32(&mut r).unwrap();
                let value = Value::decode(&mut r).unwrap();
                let mut return_value = 0;
                if object_id == SESSION_ID && attribute == ids::SERVER_SESSION_RESPONSE {
                    let expected = self
                        .behavior
                        .password
                        .as_deref()
                        .map(|password| legitimation_response(password, &CHALLENGE).unwrap());
                    if expected.as_deref() == value.as_bytes() {
                        state.legitimated = true;
                    } else {
                        return_value = REJECTED;
                    }
                } else {
                    state.writes.push((attribute, value));
                }
                let response = SetVariableResponse {
                    return_value,
                    integrity_id: response_integrity,
                };
                encode_response(&response, version, sequence)
            }
            FunctionCode::Explore => {
                let mut r = body;
                let explore_id = vlq::read_u32(&mut r).unwrap();
                let mut object = Object::new(explore_id, 0x0000_1000, 0, 0);
                object.set_attribute(233, Scalar::WString("Main".to_string()).into());
                let response = ExploreResponse {
                    return_value: 0,
                    explore_id,
                    objects: vec![object],
                    integrity_id: response_integrity,
                };
                encode_response(&response, version, sequence)
            }
            FunctionCode::DeleteObject => {
                let response = DeleteObjectResponse {
                    return_value: 0,
                    integrity_id: None,
                };
                encode_response(&response, version, sequence)
            }
            other => panic!("mock PLC cannot answer {other}"),
        }
        .expect("encode response");

        state.requests.push(RecordedRequest {
            version: version.to_u8(),
            function,
            sequence: header.sequence,
            session_id: header.session_id,
            item_count,
        });
        drop(state);

        if self.behavior.silent_on == Some(function) {
            return;
        }
        if self.behavior.fatal_on == Some(function) {
            self.queue(vec![system_event(-1)]);
            return;
        }
        let mut frames = Vec::new();
        if self.behavior.chatter {
            frames.extend(PduFramer::frame(&[0x03, 0x33, 0x00, 0x00, 0x00, 0x01], 1024).unwrap());
            frames.push(system_event(0));
        }
        frames.extend(PduFramer::frame(&response, self.behavior.fragment_size).unwrap());
        self.queue(frames);
    }
}

impl Transport for MockPlc {
    fn send(&self, data: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(S7Error::ConnectionClosed);
        }
        self.frames_received.fetch_add(1, Ordering::AcqRel);
        let received = self.inbound.lock().unwrap().push(data)?;
        if let Some(Received::Pdu(pdu)) = received {
            self.handle(&pdu);
        }
        Ok(())
    }

    fn receive(&self) -> Result<Vec<u8>> {
        let mut outbound = self.outbound.lock().unwrap();
        loop {
            if let Some(frame) = outbound.pop_front() {
                return Ok(frame);
            }
            if self.is_closed() {
                return Err(S7Error::ConnectionClosed);
            }
            outbound = self
                .ready
                .wait_timeout(outbound, Duration::from_millis(20))
                .unwrap()
                .0;
        }
    }

    fn start_tls(&self, _options: &TlsOptions) -> Result<()> {
        self.state().tls_started = true;
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.ready.notify_all();
    }
}

fn system_event(status: i64) -> Vec<u8> {
    let mut frame = vec![0x72, 0xFE, 0x00, 0x08];
    frame.extend_from_slice(&status.to_be_bytes());
    frame
}

/// Parses the addresses of a GetMultiVariables payload.
fn parse_addresses(body: &[u8]) -> Vec<ItemAddress> {
    let mut r = body;
    vlq::read_u32(&mut r).unwrap();
    let (count, _) = vlq::decode_u32(&mut r).unwrap();
    vlq::decode_u32(&mut r).unwrap();
    (0..count)
        .map(|_| ItemAddress::decode(&mut r).unwrap())
        .collect()
}

/// Parses a SetMultiVariables payload into `(first LID or attribute, value)`.
fn parse_writes(body: &[u8]) -> Vec<(u32, Value)> {
    let mut r = body;
    let object_id = vlq::read_u32(&mut r).unwrap();
    let (count, _) = vlq::decode_u32(&mut r).unwrap();
    vlq::decode_u32(&mut r).unwrap();
    let keys: Vec<u32> = (0..count)
        .map(|_| {
            if object_id == 0 {
                ItemAddress::decode(&mut r).unwrap().lids[0]
            } else {
                vlq::decode_u32(&mut r).unwrap().0
            }
        })
        .collect();
    keys.into_iter()
        .map(|key| {
            vlq::decode_u32(&mut r).unwrap();
            (key, Value::decode(&mut r).unwrap())
        })
        .collect()
}

fn parse_object_attribute(body: &[u8]) -> (u32, u32) {
    let mut r = body;
    let object_id = vlq::read_u32(&mut r).unwrap();
    vlq::decode_u32(&mut r).unwrap();
    let (attribute, _) = vlq::decode_u32(&mut r).unwrap();
    (object_id, attribute)
}

pub fn test_config() -> ClientConfig {
    ClientConfig::new().with_timeout(Duration::from_millis(500))
}

/// Connects a client to a fresh mock.
pub fn connect(behavior: Behavior) -> (Arc<MockPlc>, Client) {
    connect_with(behavior, test_config())
}

pub fn connect_with(behavior: Behavior, config: ClientConfig) -> (Arc<MockPlc>, Client) {
    let plc = MockPlc::new(behavior);
    let client = Client::connect(plc.clone(), config).expect("handshake");
    (plc, client)
}
