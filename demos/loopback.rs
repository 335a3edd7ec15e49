//! Example: Reading and writing through an in-process PLC
//!
//! Run with: cargo run --example loopback
//!
//! The crate does not open sockets. An application supplies the connection
//! through the `Transport` trait. This example plugs in a small loopback
//! PLC that keeps a data block in memory, so the full client flow can run
//! without hardware:
//! - Handshake (session creation, setup, system limits)
//! - Bulk writes and reads, chunked to the PLC's limits
//! - Per-item errors for unknown addresses
//! - Disconnect

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use s7commplus::ids::{self, limits};
use s7commplus::{
    encode_response, expected_integrity_id, vlq, Area, Client, ClientConfig, CounterKind,
    CreateObjectResponse, DeleteObjectResponse, FunctionCode, GetMultiVariablesResponse,
    GetVariableResponse, InitSslResponse, ItemAddress, Object, PduFramer, ProtocolVersion,
    Received, RequestHeader, Result, S7Error, Scalar, SetMultiVariablesResponse, TlsOptions,
    Transport, Value, REQUEST_HEADER_SIZE,
};

const SESSION_ID: u32 = 0x0000_0400;
const TAGS_PER_REQUEST: u32 = 4;
const UNKNOWN_ITEM: u64 = 0x0000_0000_0002_000A;

/// Data block 1 with LIDs 1..=8 and a per-kind integrity counter pair.
#[derive(Default)]
struct PlcMemory {
    tags: HashMap<u32, Value>,
    mutating: u32,
    non_mutating: u32,
}

#[derive(Default)]
struct LoopbackPlc {
    inbound: Mutex<PduFramer>,
    outbound: Mutex<VecDeque<Vec<u8>>>,
    ready: Condvar,
    closed: Mutex<bool>,
    memory: Mutex<PlcMemory>,
}

impl LoopbackPlc {
    fn new() -> Arc<Self> {
        let plc = Self::default();
        {
            let mut memory = plc.memory.lock().unwrap_or_else(PoisonError::into_inner);
            for lid in 1..=8 {
                memory.tags.insert(lid, Scalar::Int(0).into());
            }
        }
        Arc::new(plc)
    }

    fn answer(&self, pdu: &[u8]) -> Result<Vec<u8>> {
        let version = ProtocolVersion::from_u8(pdu[0])
            .ok_or_else(|| S7Error::invalid_response("unknown request version"))?;
        let header = RequestHeader::from_bytes(&pdu[1..])?;
        let mut body = &pdu[1 + REQUEST_HEADER_SIZE..];
        let sequence = header.sequence;

        let mut memory = self.memory.lock().unwrap_or_else(PoisonError::into_inner);
        let integrity_id = (version == ProtocolVersion::V3).then(|| {
            let counter = match header.function.counter_kind() {
                CounterKind::Mutating => &mut memory.mutating,
                CounterKind::NonMutating => &mut memory.non_mutating,
            };
            let id = *counter;
            *counter = counter.wrapping_add(1);
            expected_integrity_id(sequence, id)
        });

        match header.function {
            FunctionCode::InitSsl => {
                encode_response(&InitSslResponse { return_value: 0 }, version, sequence)
            }
            FunctionCode::CreateObject => {
                let mut object = Object::new(SESSION_ID, ids::CLASS_SERVER_SESSION, 0, 0);
                object.set_attribute(ids::SERVER_SESSION_VERSION, Scalar::UDInt(3).into());
                let response = CreateObjectResponse {
                    return_value: 0,
                    object_ids: vec![SESSION_ID, SESSION_ID + 1],
                    object,
                    integrity_id,
                };
                encode_response(&response, version, sequence)
            }
            FunctionCode::SetMultiVariables => {
                let object_id = vlq::read_u32(&mut body)?;
                let (count, _) = vlq::decode_u32(&mut body)?;
                vlq::decode_u32(&mut body)?;
                let mut keys = Vec::new();
                for _ in 0..count {
                    if object_id == 0 {
                        keys.push(ItemAddress::decode(&mut body)?.lids[0]);
                    } else {
                        keys.push(vlq::decode_u32(&mut body)?.0);
                    }
                }
                let mut errors = Vec::new();
                for (index, key) in keys.into_iter().enumerate() {
                    vlq::decode_u32(&mut body)?;
                    let value = Value::decode(&mut body)?;
                    // Session setup writes attributes of the session object.
                    if object_id != 0 {
                        continue;
                    }
                    match memory.tags.get_mut(&key) {
                        Some(slot) => *slot = value,
                        None => errors.push((index as u32 + 1, UNKNOWN_ITEM)),
                    }
                }
                let response = SetMultiVariablesResponse {
                    return_value: u64::from(!errors.is_empty()),
                    errors,
                    integrity_id,
                };
                encode_response(&response, version, sequence)
            }
            FunctionCode::GetMultiVariables => {
                vlq::read_u32(&mut body)?;
                let (count, _) = vlq::decode_u32(&mut body)?;
                vlq::decode_u32(&mut body)?;
                let mut values = Vec::new();
                let mut errors = Vec::new();
                for item in 1..=count {
                    let address = ItemAddress::decode(&mut body)?;
                    let lid = address.lids[0];
                    if address.access_sub_area == ids::SYSTEM_LIMITS {
                        let limit = match lid {
                            limits::TAGS_PER_READ_REQUEST_MAX
                            | limits::TAGS_PER_WRITE_REQUEST_MAX => TAGS_PER_REQUEST,
                            _ => 0,
                        };
                        values.push((item, Scalar::DInt(limit as i32).into()));
                    } else if let Some(value) = memory.tags.get(&lid) {
                        values.push((item, value.clone()));
                    } else {
                        errors.push((item, UNKNOWN_ITEM));
                    }
                }
                let response = GetMultiVariablesResponse {
                    return_value: u64::from(!errors.is_empty()),
                    values,
                    errors,
                    integrity_id,
                };
                encode_response(&response, version, sequence)
            }
            FunctionCode::GetVariable => {
                let response = GetVariableResponse {
                    return_value: 0,
                    value: Scalar::UDInt(ids::access_level::FULL_ACCESS).into(),
                    integrity_id,
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
            other => Err(S7Error::invalid_response(format!(
                "loopback PLC does not answer {other}"
            ))),
        }
    }

    fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for LoopbackPlc {
    fn send(&self, data: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(S7Error::ConnectionClosed);
        }
        let received = self
            .inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(data)?;
        if let Some(Received::Pdu(pdu)) = received {
            let response = self.answer(&pdu)?;
            let frames = PduFramer::frame(&response, 1024)?;
            let mut outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
            outbound.extend(frames);
            self.ready.notify_all();
        }
        Ok(())
    }

    fn receive(&self) -> Result<Vec<u8>> {
        let mut outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(frame) = outbound.pop_front() {
                return Ok(frame);
            }
            if self.is_closed() {
                return Err(S7Error::ConnectionClosed);
            }
            outbound = self
                .ready
                .wait_timeout(outbound, Duration::from_millis(50))
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn start_tls(&self, _options: &TlsOptions) -> Result<()> {
        Ok(())
    }

    fn close(&self) {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.ready.notify_all();
    }
}

fn main() -> s7commplus::Result<()> {
    // =========================================================================
    // Connect
    // =========================================================================

    let plc = LoopbackPlc::new();
    let config = ClientConfig::new().with_timeout(Duration::from_secs(1));
    let client = Client::connect(plc, config)?;

    let session = client.session_state();
    println!("=== Connected ===\n");
    println!("Session id:      0x{:08X}", session.session_id);
    println!("Tags per read:   {}", client.limits().tags_per_read_request_max);
    println!("Tags per write:  {}", client.limits().tags_per_write_request_max);

    // =========================================================================
    // Bulk write (split into chunks of 4)
    // =========================================================================

    println!("\n=== Writing DB1 ===\n");

    let addresses: Vec<ItemAddress> = (1..=6)
        .map(|lid| ItemAddress::new(Area::DataBlock(1), vec![lid]))
        .collect();
    let values: Vec<Value> = (1..=6).map(|i| Scalar::Int(i * 100).into()).collect();
    let errors = client.write_values(&addresses, &values)?;
    println!("Write errors: {errors:?}");

    // =========================================================================
    // Bulk read, including one unknown LID
    // =========================================================================

    println!("\n=== Reading DB1 ===\n");

    let mut addresses = addresses;
    addresses.push(ItemAddress::new(Area::DataBlock(1), vec![99]));
    let (values, errors) = client.read_values(&addresses)?;
    for ((address, value), error) in addresses.iter().zip(&values).zip(&errors) {
        match value {
            Some(value) => println!("{address} = {value:?}"),
            None => println!("{address} failed with 0x{error:X}"),
        }
    }

    client.disconnect()?;
    println!("\nLoopback example completed!");
    Ok(())
}
