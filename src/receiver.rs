//! Background receive thread.
//!
//! A single thread blocks in [`Transport::receive`], feeds the frames into a
//! [`PduFramer`] and hands complete PDUs to the client through a bounded
//! channel. System events and notifications never reach the channel; a
//! fatal system event closes the transport and is delivered as
//! [`S7Error::FatalSystemEvent`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, SendTimeoutError, Sender};
use tracing::{debug, trace, warn};

use crate::error::{Result, S7Error};
use crate::framing::{PduFramer, Received};
use crate::header::Opcode;
use crate::transport::Transport;

/// How often a blocked delivery re-checks the stop flag.
const SEND_POLL: Duration = Duration::from_millis(100);

/// Channel end the client reads PDUs from.
pub(crate) type PduReceiver = Receiver<Result<Vec<u8>>>;

/// Handle of the running receive thread.
#[derive(Debug)]
pub(crate) struct ReceiveThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ReceiveThread {
    /// Starts the thread and returns it with the channel it delivers into.
    pub(crate) fn spawn(
        transport: Arc<dyn Transport>,
        capacity: usize,
    ) -> Result<(Self, PduReceiver)> {
        let (tx, rx) = channel::bounded(capacity);
        let stop = Arc::new(AtomicBool::new(false));
        let handle = thread::Builder::new()
            .name("s7commplus-receiver".to_string())
            .spawn({
                let stop = Arc::clone(&stop);
                move || receive_loop(transport.as_ref(), &tx, &stop)
            })?;
        Ok((
            Self {
                stop,
                handle: Some(handle),
            },
            rx,
        ))
    }

    /// Stops the thread. Closes the transport to unblock it, then joins.
    pub(crate) fn stop(&mut self, transport: &dyn Transport) {
        self.stop.store(true, Ordering::Release);
        transport.close();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("receive thread panicked");
            }
        }
    }

    /// Returns `true` while the thread is running.
    pub(crate) fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

fn receive_loop(transport: &dyn Transport, tx: &Sender<Result<Vec<u8>>>, stop: &AtomicBool) {
    debug!("receive thread started");
    let mut framer = PduFramer::new();

    while !stop.load(Ordering::Acquire) {
        let frame = match transport.receive() {
            Ok(frame) => frame,
            Err(err) => {
                if !stop.load(Ordering::Acquire) {
                    debug!(error = %err, "transport receive failed");
                    deliver(tx, Err(err), stop);
                }
                break;
            }
        };
        trace!(len = frame.len(), "frame received");

        match framer.push(&frame) {
            Ok(None) => {}
            Ok(Some(Received::Pdu(pdu))) => {
                if is_notification(&pdu) {
                    debug!(len = pdu.len(), "discarding notification");
                    continue;
                }
                if !deliver(tx, Ok(pdu), stop) {
                    break;
                }
            }
            Ok(Some(Received::SystemEvent(event))) if event.is_fatal() => {
                warn!(status = event.status, "fatal system event, closing connection");
                transport.close();
                deliver(
                    tx,
                    Err(S7Error::FatalSystemEvent {
                        status: event.status,
                    }),
                    stop,
                );
                break;
            }
            Ok(Some(Received::SystemEvent(event))) => {
                debug!(status = event.status, "discarding system event");
            }
            Err(err) => {
                warn!(error = %err, "discarding malformed frame");
                if !deliver(tx, Err(err), stop) {
                    break;
                }
            }
        }
    }

    debug!("receive thread stopped");
}

/// Hands an item to the client. Returns `false` if the client is gone or
/// the thread is being stopped.
fn deliver(tx: &Sender<Result<Vec<u8>>>, item: Result<Vec<u8>>, stop: &AtomicBool) -> bool {
    let mut item = item;
    loop {
        match tx.send_timeout(item, SEND_POLL) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(returned)) => {
                if stop.load(Ordering::Acquire) {
                    return false;
                }
                item = returned;
            }
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

fn is_notification(pdu: &[u8]) -> bool {
    pdu.get(1) == Some(&(Opcode::Notification as u8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TlsOptions;
    use crossbeam::channel::RecvTimeoutError;
    use std::sync::Mutex;

    /// Replays scripted frames, then reports the connection as closed.
    struct Scripted {
        frames: Mutex<Vec<Vec<u8>>>,
        closed: AtomicBool,
    }

    impl Scripted {
        fn new(mut frames: Vec<Vec<u8>>) -> Arc<Self> {
            frames.reverse();
            Arc::new(Self {
                frames: Mutex::new(frames),
                closed: AtomicBool::new(false),
            })
        }
    }

    impl Transport for Scripted {
        fn send(&self, _data: &[u8]) -> Result<()> {
            Ok(())
        }

        fn receive(&self) -> Result<Vec<u8>> {
            match self.frames.lock().unwrap().pop() {
                Some(frame) => Ok(frame),
                None => {
                    // Park like a socket until closed.
                    while !self.closed.load(Ordering::Acquire) {
                        thread::sleep(Duration::from_millis(5));
                    }
                    Err(S7Error::ConnectionClosed)
                }
            }
        }

        fn start_tls(&self, _options: &TlsOptions) -> Result<()> {
            Ok(())
        }

        fn close(&self) {
            self.closed.store(true, Ordering::Release);
        }
    }

    fn pdu_frame(opcode: u8) -> Vec<u8> {
        vec![0x72, 0x03, 0x00, 0x02, opcode, 0x00, 0x72, 0x03, 0x00, 0x00]
    }

    fn event_frame(status: i64) -> Vec<u8> {
        let mut frame = vec![0x72, 0xFE, 0x00, 0x08];
        frame.extend_from_slice(&status.to_be_bytes());
        frame
    }

    #[test]
    fn test_delivers_pdus_and_skips_notifications() {
        let transport = Scripted::new(vec![
            pdu_frame(0x33),
            event_frame(0),
            pdu_frame(0x32),
        ]);
        let (mut thread, rx) = ReceiveThread::spawn(transport.clone(), 4).unwrap();

        let pdu = rx.recv_timeout(Duration::from_secs(1)).unwrap().unwrap();
        assert_eq!(pdu, vec![0x03, 0x32, 0x00]);
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(50)),
            Err(RecvTimeoutError::Timeout)
        ));

        thread.stop(transport.as_ref());
        assert!(!thread.is_running());
    }

    #[test]
    fn test_fatal_event_closes_transport() {
        let transport = Scripted::new(vec![event_frame(-1)]);
        let (mut thread, rx) = ReceiveThread::spawn(transport.clone(), 4).unwrap();

        let item = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(matches!(item, Err(S7Error::FatalSystemEvent { status: -1 })));
        assert!(transport.closed.load(Ordering::Acquire));

        thread.stop(transport.as_ref());
    }

    #[test]
    fn test_malformed_frame_is_reported() {
        let transport = Scripted::new(vec![vec![0x00, 0x03, 0x00, 0x00]]);
        let (mut thread, rx) = ReceiveThread::spawn(transport.clone(), 4).unwrap();

        let item = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(matches!(item, Err(S7Error::InvalidPdu { .. })));

        thread.stop(transport.as_ref());
    }

    #[test]
    fn test_stop_with_full_channel() {
        let transport = Scripted::new(vec![pdu_frame(0x32), pdu_frame(0x32), pdu_frame(0x32)]);
        let (mut thread, _rx) = ReceiveThread::spawn(transport.clone(), 1).unwrap();
        thread::sleep(Duration::from_millis(50));
        thread.stop(transport.as_ref());
        assert!(!thread.is_running());
    }
}
