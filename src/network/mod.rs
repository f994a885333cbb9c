//! Network link and report delivery.
//!
//! The controller only needs three things from the network: bring the link
//! up with a set of credentials, push one report line to the collector, and
//! tear the link down again before sleep.
//!
//! - **ESP32** (`esp32` feature): [`WifiNetwork`] over the station interface
//! - **Host**: [`HostNetwork`], the OS is already connected
//!
//! Both deliver over a fresh TCP connection per report via [`send_over_tcp`].

#[cfg(feature = "esp32")]
mod wifi;

mod host;
mod report;

#[cfg(feature = "esp32")]
pub use wifi::WifiNetwork;

pub use host::HostNetwork;
pub use report::Report;

use crate::config::WifiCredentials;
use log::debug;
use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Link to the collector network.
pub trait NetworkLink {
    /// Bring the link up with `credentials`, giving up after `timeout`.
    fn connect(&mut self, credentials: &WifiCredentials, timeout: Duration)
        -> Result<(), NetworkError>;

    /// Whether the link is currently up.
    fn is_connected(&self) -> bool;

    /// Deliver one report payload. Returns the number of bytes written.
    fn send(&mut self, payload: &[u8]) -> Result<usize, NetworkError>;

    /// Tear the link down. Best effort.
    fn disconnect(&mut self);
}

/// Network errors.
#[derive(Debug)]
pub enum NetworkError {
    /// `send` called while the link is down.
    NotConnected,
    /// Collector address did not resolve.
    UnresolvedAddress(String),
    /// WiFi driver failure (ESP32).
    #[cfg(feature = "esp32")]
    Wifi(crate::wifi::WifiError),
    /// Socket I/O error.
    Io(std::io::Error),
}

impl std::fmt::Display for NetworkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "network not connected"),
            Self::UnresolvedAddress(addr) => write!(f, "cannot resolve {}", addr),
            #[cfg(feature = "esp32")]
            Self::Wifi(e) => write!(f, "WiFi error: {}", e),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for NetworkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            #[cfg(feature = "esp32")]
            Self::Wifi(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for NetworkError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(feature = "esp32")]
impl From<crate::wifi::WifiError> for NetworkError {
    fn from(e: crate::wifi::WifiError) -> Self {
        Self::Wifi(e)
    }
}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for NetworkError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Wifi(crate::wifi::WifiError::EspError(e))
    }
}

/// Open a connection to `addr`, write `payload`, close.
pub fn send_over_tcp(addr: &str, payload: &[u8], timeout: Duration) -> Result<usize, NetworkError> {
    let target = addr
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| NetworkError::UnresolvedAddress(addr.to_string()))?;

    let mut stream = TcpStream::connect_timeout(&target, timeout)?;
    stream.set_write_timeout(Some(timeout))?;
    stream.set_read_timeout(Some(timeout))?;
    stream.write_all(payload)?;
    stream.flush()?;
    debug!("Sent {} bytes to {}", payload.len(), target);
    Ok(payload.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_send_over_tcp_delivers_payload() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut received = String::new();
            conn.read_to_string(&mut received).unwrap();
            received
        });

        let sent = send_over_tcp(&addr, b"hello collector\n", Duration::from_secs(2)).unwrap();
        assert_eq!(sent, 16);
        assert_eq!(server.join().unwrap(), "hello collector\n");
    }

    #[test]
    fn test_send_over_tcp_refused() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let result = send_over_tcp(
            &format!("127.0.0.1:{}", port),
            b"x",
            Duration::from_millis(500),
        );
        assert!(matches!(result, Err(NetworkError::Io(_))));
    }

    #[test]
    fn test_bad_address_is_error() {
        let result = send_over_tcp("not an address", b"x", Duration::from_millis(100));
        assert!(result.is_err());
    }
}
