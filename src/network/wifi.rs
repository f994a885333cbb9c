//! ESP32 WiFi network link.
//!
//! Joins the access point with whatever credentials the controller picked
//! (retained snapshot or flash) and delivers reports over lwIP TCP.

use super::{send_over_tcp, NetworkError, NetworkLink};
use crate::config::WifiCredentials;
use crate::wifi::WifiManager;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use log::{info, warn};
use std::time::Duration;

/// WiFi station link.
pub struct WifiNetwork<'a> {
    wifi: WifiManager<'a>,
    collector: String,
    socket_timeout: Duration,
}

impl<'a> WifiNetwork<'a> {
    /// Bring up the driver (not the connection) and set the DHCP hostname.
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        hostname: &str,
        collector: impl Into<String>,
        socket_timeout: Duration,
    ) -> Result<Self, NetworkError> {
        let mut wifi = WifiManager::new(modem, sysloop)?;
        if let Err(e) = wifi.set_hostname(hostname) {
            warn!("Failed to set hostname '{}': {:?}", hostname, e);
        }

        Ok(Self {
            wifi,
            collector: collector.into(),
            socket_timeout,
        })
    }
}

impl NetworkLink for WifiNetwork<'_> {
    fn connect(&mut self, credentials: &WifiCredentials, timeout: Duration) -> Result<(), NetworkError> {
        self.wifi.connect(credentials, timeout)?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.wifi.is_connected()
    }

    fn send(&mut self, payload: &[u8]) -> Result<usize, NetworkError> {
        if !self.is_connected() {
            return Err(NetworkError::NotConnected);
        }
        send_over_tcp(&self.collector, payload, self.socket_timeout)
    }

    fn disconnect(&mut self) {
        if let Err(e) = self.wifi.disconnect() {
            warn!("WiFi disconnect failed: {:?}", e);
        } else {
            info!("WiFi down");
        }
    }
}
