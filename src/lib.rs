//! Thermonode ESP32 firmware library.
//!
//! A battery temperature node that wakes from deep sleep, measures, reports
//! to a collector and sleeps again. Everything except the hardware bindings
//! is platform-independent and tested on the host.

pub mod config;
pub mod controller;
pub mod flash;
pub mod network;
pub mod platform;
pub mod sensor;
pub mod store;
pub mod watchdog;
pub mod wifi;

#[cfg(test)]
mod testing;

// Re-export commonly used items
pub use config::{ConfigError, NodeConfig, ThermistorParams, WifiCredentials};
pub use controller::{CycleController, CycleOutcome, NodeIo, SleepPlan, SleepReason};
pub use network::{NetworkError, NetworkLink, Report};
pub use sensor::{SensorFault, ThermistorModel};
pub use store::{DurableBackup, RetainedState, RetainedStore};
