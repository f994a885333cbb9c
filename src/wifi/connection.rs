//! WiFi station connection management.
//!
//! Wraps the ESP-IDF blocking WiFi driver for joining one access point.

use super::Deadline;
use crate::config::WifiCredentials;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use esp_idf_sys::EspError;
use log::info;
use std::time::Duration;

/// WiFi connection manager.
pub struct WifiManager<'a> {
    wifi: BlockingWifi<EspWifi<'a>>,
}

impl<'a> WifiManager<'a> {
    pub fn new(modem: Modem, sysloop: EspSystemEventLoop) -> Result<Self, EspError> {
        let esp_wifi = EspWifi::new(modem, sysloop.clone(), None)?;
        let wifi = BlockingWifi::wrap(esp_wifi, sysloop)?;

        Ok(Self { wifi })
    }

    /// Set the DHCP hostname of the station interface.
    pub fn set_hostname(&mut self, hostname: &str) -> Result<(), EspError> {
        self.wifi.wifi_mut().sta_netif_mut().set_hostname(hostname)
    }

    /// Join the access point and wait for an IP address.
    ///
    /// Driver start, association and DHCP together take at most `timeout`.
    pub fn connect(&mut self, credentials: &WifiCredentials, timeout: Duration) -> Result<(), WifiError> {
        let deadline = Deadline::after(timeout);
        info!("Connecting to WiFi: {}", credentials.ssid);

        let auth_method = if credentials.is_open() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        let wifi_config = Configuration::Client(ClientConfiguration {
            ssid: credentials
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| WifiError::InvalidSsid)?,
            password: credentials
                .password
                .as_str()
                .try_into()
                .map_err(|_| WifiError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        });

        self.wifi.set_configuration(&wifi_config)?;

        if !self.wifi.is_started()? {
            self.wifi.wifi_mut().start()?;
            let left = Self::stage_budget(&deadline, "start")?;
            self.wifi
                .wifi_wait_while(|| self.wifi.is_started().map(|started| !started), Some(left))?;
        }

        self.wifi
            .wifi_mut()
            .connect()
            .map_err(WifiError::ConnectionFailed)?;
        let left = Self::stage_budget(&deadline, "association")?;
        self.wifi
            .wifi_wait_while(|| self.wifi.is_connected().map(|up| !up), Some(left))
            .map_err(WifiError::ConnectionFailed)?;

        let left = Self::stage_budget(&deadline, "DHCP")?;
        self.wifi
            .ip_wait_while(|| self.wifi.is_up().map(|up| !up), Some(left))
            .map_err(WifiError::DhcpFailed)?;

        let ip_info = self.wifi.wifi().sta_netif().get_ip_info()?;
        info!("Connected to WiFi, IP: {}", ip_info.ip);
        Ok(())
    }

    fn stage_budget(deadline: &Deadline, stage: &'static str) -> Result<Duration, WifiError> {
        deadline.remaining().ok_or(WifiError::Timeout(stage))
    }

    /// Disconnect and stop the driver.
    pub fn disconnect(&mut self) -> Result<(), EspError> {
        info!("Disconnecting from WiFi");
        if self.wifi.is_connected()? {
            self.wifi.disconnect()?;
        }
        self.wifi.stop()?;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }
}

/// Errors that can occur during WiFi operations.
#[derive(Debug)]
pub enum WifiError {
    /// SSID is invalid (too long or contains invalid characters).
    InvalidSsid,
    /// Password is invalid.
    InvalidPassword,
    /// Failed to associate with the access point.
    ConnectionFailed(EspError),
    /// No IP address before the timeout.
    DhcpFailed(EspError),
    /// Connect budget spent before the named stage began.
    Timeout(&'static str),
    /// ESP-IDF error.
    EspError(EspError),
}

impl From<EspError> for WifiError {
    fn from(e: EspError) -> Self {
        Self::EspError(e)
    }
}

impl std::fmt::Display for WifiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "invalid SSID"),
            Self::InvalidPassword => write!(f, "invalid password"),
            Self::ConnectionFailed(e) => write!(f, "connection failed: {:?}", e),
            Self::DhcpFailed(e) => write!(f, "DHCP failed: {:?}", e),
            Self::Timeout(stage) => write!(f, "connect timed out before {}", stage),
            Self::EspError(e) => write!(f, "ESP error: {:?}", e),
        }
    }
}

impl std::error::Error for WifiError {}
