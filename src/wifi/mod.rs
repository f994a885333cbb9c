//! WiFi driver and credential storage.
//!
//! - [`connection`] - ESP-IDF WiFi driver wrapper (ESP32 only)
//! - [`deadline`] - one time budget shared by the stages of a connect
//! - [`storage`] - credential persistence over any [`KeyValueFlash`](crate::flash::KeyValueFlash)
//!
//! Credential validation and encoding live in [`crate::config`].

#[cfg(feature = "esp32")]
mod connection;
mod deadline;
mod storage;

#[cfg(feature = "esp32")]
pub use connection::{WifiError, WifiManager};
pub use deadline::Deadline;
pub use storage::{
    load_credentials, provision_credentials, save_credentials, ProvisionError, CREDENTIALS_KEY,
    CREDENTIALS_NAMESPACE,
};
