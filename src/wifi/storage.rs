//! Persistence for WiFi credentials.
//!
//! Credentials live in their own flash namespace so that provisioning and
//! the measurement cycle never touch each other's keys.

use crate::config::{ConfigError, WifiCredentials};
use crate::flash::{FlashError, KeyValueFlash};
use log::warn;
use std::fmt;

/// Flash namespace for WiFi configuration.
pub const CREDENTIALS_NAMESPACE: &str = "wifi_config";

/// Key for the stored credentials.
pub const CREDENTIALS_KEY: &str = "credentials";

/// Load stored credentials.
///
/// Returns `None` if nothing is stored, the read fails, or the stored bytes
/// do not decode.
pub fn load_credentials(flash: &dyn KeyValueFlash) -> Option<WifiCredentials> {
    let bytes = match flash.get(CREDENTIALS_KEY) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(e) => {
            warn!("Failed to read WiFi credentials: {}", e);
            return None;
        }
    };
    match WifiCredentials::from_bytes(&bytes) {
        Ok(creds) => Some(creds),
        Err(e) => {
            warn!("Stored WiFi credentials are corrupted: {}", e);
            None
        }
    }
}

/// Store credentials, replacing any previous value.
pub fn save_credentials(
    flash: &mut dyn KeyValueFlash,
    credentials: &WifiCredentials,
) -> Result<(), FlashError> {
    flash.set(CREDENTIALS_KEY, &credentials.to_bytes())
}

/// Validate `ssid`/`password`, store them and read them back.
///
/// Returns the credentials exactly as the node will load them.
pub fn provision_credentials(
    flash: &mut dyn KeyValueFlash,
    ssid: &str,
    password: &str,
) -> Result<WifiCredentials, ProvisionError> {
    let credentials = WifiCredentials::new(ssid, password)?;
    save_credentials(flash, &credentials)?;

    match load_credentials(&*flash) {
        Some(stored) if stored == credentials => Ok(stored),
        _ => Err(ProvisionError::NotPersisted),
    }
}

/// Provisioning failures.
#[derive(Debug)]
pub enum ProvisionError {
    /// SSID or password rejected before anything was written.
    Invalid(ConfigError),
    /// Flash refused the write.
    Flash(FlashError),
    /// The write reported success but the credentials did not read back.
    NotPersisted,
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(e) => write!(f, "invalid credentials: {}", e),
            Self::Flash(e) => write!(f, "cannot store credentials: {}", e),
            Self::NotPersisted => write!(f, "stored credentials did not read back"),
        }
    }
}

impl std::error::Error for ProvisionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Invalid(e) => Some(e),
            Self::Flash(e) => Some(e),
            Self::NotPersisted => None,
        }
    }
}

impl From<ConfigError> for ProvisionError {
    fn from(e: ConfigError) -> Self {
        Self::Invalid(e)
    }
}

impl From<FlashError> for ProvisionError {
    fn from(e: FlashError) -> Self {
        Self::Flash(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryFlash;

    #[test]
    fn test_save_and_load() {
        let mut flash = MemoryFlash::new();
        assert!(load_credentials(&flash).is_none());

        let creds = WifiCredentials::new("Office", "hunter2hunter2").unwrap();
        save_credentials(&mut flash, &creds).unwrap();

        assert_eq!(load_credentials(&flash), Some(creds));
    }

    #[test]
    fn test_save_replaces_previous() {
        let mut flash = MemoryFlash::new();
        save_credentials(&mut flash, &WifiCredentials::open("Cafe").unwrap()).unwrap();
        let office = WifiCredentials::new("Office", "hunter2hunter2").unwrap();
        save_credentials(&mut flash, &office).unwrap();
        assert_eq!(load_credentials(&flash), Some(office));
    }

    #[test]
    fn test_corrupted_entry_ignored() {
        let mut flash = MemoryFlash::new();
        flash.set(CREDENTIALS_KEY, &[40, b'x']).unwrap();
        assert!(load_credentials(&flash).is_none());
    }

    #[test]
    fn test_read_error_ignored() {
        let mut flash = MemoryFlash::new();
        save_credentials(&mut flash, &WifiCredentials::open("Cafe").unwrap()).unwrap();
        flash.fail_reads = true;
        assert!(load_credentials(&flash).is_none());
    }

    #[test]
    fn test_provision_stores_and_reads_back() {
        let mut flash = MemoryFlash::new();
        let stored = provision_credentials(&mut flash, "Greenhouse", "tomatoes42").unwrap();
        assert_eq!(stored.ssid, "Greenhouse");
        assert_eq!(load_credentials(&flash), Some(stored));
    }

    #[test]
    fn test_provision_open_network() {
        let mut flash = MemoryFlash::new();
        let stored = provision_credentials(&mut flash, "Cafe", "").unwrap();
        assert!(stored.is_open());
    }

    #[test]
    fn test_provision_rejects_invalid_before_writing() {
        let mut flash = MemoryFlash::new();
        let result = provision_credentials(&mut flash, "Cafe", "short");
        assert!(matches!(
            result,
            Err(ProvisionError::Invalid(ConfigError::PasswordTooShort { .. }))
        ));
        assert_eq!(flash.writes, 0);
    }

    #[test]
    fn test_provision_detects_lost_write() {
        let mut flash = MemoryFlash::new();
        flash.drop_writes = true;
        assert!(matches!(
            provision_credentials(&mut flash, "Cafe", ""),
            Err(ProvisionError::NotPersisted)
        ));
    }

    #[test]
    fn test_provision_reports_flash_error() {
        let mut flash = MemoryFlash::new();
        flash.fail_writes = true;
        let err = provision_credentials(&mut flash, "Cafe", "").unwrap_err();
        assert!(matches!(err, ProvisionError::Flash(_)));
        assert!(err.to_string().starts_with("cannot store credentials"));
    }
}
