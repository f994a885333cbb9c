//! Durable key/value storage.
//!
//! A namespace-scoped key/value layer that survives full power loss:
//! - **ESP32** (`esp32` feature): NVS partition ([`NvsFlash`])
//! - **Host**: one file per key under a directory ([`FileFlash`])
//!
//! Callers treat a missing key and a read error the same way, so `get`
//! distinguishes them only for logging.

mod file;
#[cfg(feature = "esp32")]
mod nvs;

pub use file::{default_root, FileFlash};
#[cfg(feature = "esp32")]
pub use nvs::{default_partition, NvsFlash};

/// Key/value primitive over durable flash.
pub trait KeyValueFlash {
    /// Read a value. `Ok(None)` means the key was never written.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, FlashError>;

    /// Write a value, replacing any previous one.
    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), FlashError>;
}

/// Write a value and read it back.
///
/// Catches flash write failures that do not return an error code.
pub fn set_verified(
    flash: &mut dyn KeyValueFlash,
    key: &str,
    value: &[u8],
) -> Result<(), FlashError> {
    flash.set(key, value)?;

    match flash.get(key)? {
        Some(read_back) if read_back == value => Ok(()),
        Some(_) => Err(FlashError::VerifyFailed(key.to_string())),
        None => Err(FlashError::VerifyFailed(key.to_string())),
    }
}

/// Flash errors.
#[derive(Debug)]
pub enum FlashError {
    /// Host file I/O failed.
    Io(std::io::Error),
    /// ESP-IDF NVS call failed.
    #[cfg(feature = "esp32")]
    Esp(esp_idf_sys::EspError),
    /// Data read back after a write did not match.
    VerifyFailed(String),
}

impl std::fmt::Display for FlashError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            #[cfg(feature = "esp32")]
            Self::Esp(e) => write!(f, "NVS error: {:?}", e),
            Self::VerifyFailed(key) => write!(f, "read-back verification failed for '{}'", key),
        }
    }
}

impl std::error::Error for FlashError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FlashError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for FlashError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Esp(e)
    }
}
