//! Transport abstraction for S7comm-plus communication.
//!
//! The protocol layer never touches sockets. It talks to a [`Transport`]
//! that delivers one ISO-on-TCP data unit per call and can be upgraded to
//! TLS in place. TCP connection setup, TPKT/COTP framing and the TLS binding
//! live behind this trait.
//!
//! # Design
//!
//! - **Byte oriented**: `send` and `receive` move whole data units; the
//!   client splits and reassembles PDUs on top
//! - **Blocking**: `receive` blocks until data arrives or the transport is
//!   closed; it is called from a single background thread
//! - **Shared**: the transport is used by the caller thread for `send` and by
//!   the receive thread for `receive`, so implementations are `Send + Sync`
//!
//! # Constants
//!
//! - [`ISO_TCP_PORT`] - Default ISO-on-TCP port (102)
//! - [`DEFAULT_TIMEOUT`] - Default response timeout (5 seconds)
//!
//! # Example
//!
//! A transport that loops requests back can be written in a few lines:
//!
//! ```
//! use std::sync::Mutex;
//! use s7commplus::{Result, S7Error, TlsOptions, Transport};
//!
//! struct Loopback(Mutex<Vec<Vec<u8>>>);
//!
//! impl Transport for Loopback {
//!     fn send(&self, data: &[u8]) -> Result<()> {
//!         self.0.lock().unwrap().push(data.to_vec());
//!         Ok(())
//!     }
//!
//!     fn receive(&self) -> Result<Vec<u8>> {
//!         self.0.lock().unwrap().pop().ok_or(S7Error::ConnectionClosed)
//!     }
//!
//!     fn start_tls(&self, _options: &TlsOptions) -> Result<()> {
//!         Ok(())
//!     }
//!
//!     fn close(&self) {}
//! }
//!
//! let transport = Loopback(Mutex::new(Vec::new()));
//! transport.send(&[0x72]).unwrap();
//! assert_eq!(transport.receive().unwrap(), [0x72]);
//! ```

use std::fmt;
use std::time::Duration;

use crate::error::Result;

/// Default ISO-on-TCP port.
pub const ISO_TCP_PORT: u16 = 102;

/// Default time to wait for a response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// TLS protocol versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TlsVersion {
    /// TLS 1.2.
    Tls12,
    /// TLS 1.3.
    Tls13,
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsVersion::Tls12 => write!(f, "TLSv1.2"),
            TlsVersion::Tls13 => write!(f, "TLSv1.3"),
        }
    }
}

/// Parameters for the in-place TLS upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsOptions {
    /// Lowest protocol version to accept.
    pub min_version: TlsVersion,
    /// Allowed cipher suites, by IANA name, in order of preference.
    pub cipher_suites: Vec<String>,
}

impl TlsOptions {
    /// Creates options with an explicit version floor and cipher list.
    pub fn new(min_version: TlsVersion, cipher_suites: Vec<String>) -> Self {
        Self {
            min_version,
            cipher_suites,
        }
    }
}

impl Default for TlsOptions {
    /// TLS 1.3 with the two AES-GCM suites the PLC firmware offers.
    fn default() -> Self {
        Self::new(
            TlsVersion::Tls13,
            vec![
                "TLS_AES_256_GCM_SHA384".to_string(),
                "TLS_AES_128_GCM_SHA256".to_string(),
            ],
        )
    }
}

/// Connection to a PLC.
///
/// Implementations wrap an already connected ISO-on-TCP stream.
pub trait Transport: Send + Sync {
    /// Sends one data unit.
    ///
    /// # Errors
    ///
    /// Returns `S7Error::Io` or `S7Error::ConnectionClosed` if the data
    /// cannot be written.
    fn send(&self, data: &[u8]) -> Result<()>;

    /// Blocks until one data unit has been received.
    ///
    /// # Errors
    ///
    /// Returns `S7Error::ConnectionClosed` once the transport is closed, and
    /// `S7Error::Io` for other failures.
    fn receive(&self) -> Result<Vec<u8>>;

    /// Upgrades the connection to TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake fails.
    fn start_tls(&self, options: &TlsOptions) -> Result<()>;

    /// Closes the connection. A blocked `receive` must return.
    fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tls_options() {
        let options = TlsOptions::default();
        assert_eq!(options.min_version, TlsVersion::Tls13);
        assert_eq!(
            options.cipher_suites,
            ["TLS_AES_256_GCM_SHA384", "TLS_AES_128_GCM_SHA256"]
        );
    }

    #[test]
    fn test_tls_version_order() {
        assert!(TlsVersion::Tls12 < TlsVersion::Tls13);
        assert_eq!(TlsVersion::Tls13.to_string(), "TLSv1.3");
    }

    #[test]
    fn test_defaults() {
        assert_eq!(ISO_TCP_PORT, 102);
        assert_eq!(DEFAULT_TIMEOUT, Duration::from_secs(5));
    }
}
