//! Host network link.
//!
//! On host systems the OS owns the network. "Connecting" only records the
//! SSID being simulated.

use super::{send_over_tcp, NetworkError, NetworkLink};
use crate::config::WifiCredentials;
use log::info;
use std::time::Duration;

/// Host network link delivering reports over the OS TCP stack.
pub struct HostNetwork {
    collector: String,
    socket_timeout: Duration,
    connected: bool,
}

impl HostNetwork {
    pub fn new(collector: impl Into<String>, socket_timeout: Duration) -> Self {
        Self {
            collector: collector.into(),
            socket_timeout,
            connected: false,
        }
    }
}

impl NetworkLink for HostNetwork {
    fn connect(&mut self, credentials: &WifiCredentials, _timeout: Duration) -> Result<(), NetworkError> {
        self.connected = true;
        info!("Host network ready as '{}', collector {}", credentials.ssid, self.collector);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn send(&mut self, payload: &[u8]) -> Result<usize, NetworkError> {
        if !self.connected {
            return Err(NetworkError::NotConnected);
        }
        send_over_tcp(&self.collector, payload, self.socket_timeout)
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}
