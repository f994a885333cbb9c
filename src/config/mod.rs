//! Node configuration.
//!
//! Every tunable that differed between firmware revisions (sleep durations,
//! retry budgets, resistor values) lives here as data rather than as a
//! behavioral branch.
//!
//! # Components
//!
//! - [`NodeConfig`] - cycle timing, retry budgets and report settings
//! - [`ThermistorParams`] - divider and Beta model constants
//! - [`WifiCredentials`] - access point credentials (stored in NVS)

mod wifi;

use std::time::Duration;

pub use wifi::{
    ConfigError, WifiCredentials, MAX_CREDENTIALS_LEN, MAX_PASSWORD_LEN, MAX_SSID_LEN,
    MIN_PASSWORD_LEN,
};

/// Full-scale reading of the 12-bit ADC.
pub const MAX_RAW: u16 = 4095;

/// Offset between Kelvin and Celsius.
pub const KELVIN_OFFSET: f64 = 273.15;

/// Constants of the thermistor front end.
///
/// The thermistor sits on the low side of a divider fed from `vref`, with the
/// series reference resistor on the high side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermistorParams {
    /// Beta material constant (K).
    pub beta: f64,
    /// Thermistor resistance at `nominal_kelvin` (ohms).
    pub nominal_resistance: f64,
    /// Reference temperature for `nominal_resistance` (K).
    pub nominal_kelvin: f64,
    /// Divider supply voltage (V).
    pub vref: f64,
    /// ADC full-scale raw value; a reading equal to it means saturation.
    pub max_raw: u16,
    /// Series resistor used until a calibration has been stored (ohms).
    pub default_reference: f32,
    /// Temperature of the calibration bath (°C).
    pub calibration_celsius: f64,
}

impl Default for ThermistorParams {
    fn default() -> Self {
        Self {
            beta: 3976.0,
            nominal_resistance: 10_000.0,
            nominal_kelvin: 298.15,
            vref: 3.3,
            max_raw: MAX_RAW,
            default_reference: 15_000.0,
            calibration_celsius: 0.0,
        }
    }
}

/// Configuration of one node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Measurements per window before the long sleep.
    pub required_measurements: i32,
    /// Upper bound of a measurement window; older windows are abandoned.
    pub measurement_window: Duration,
    /// Sleep between measurements inside a window.
    pub measurement_sleep: Duration,
    /// Sleep after a completed window.
    pub window_sleep: Duration,
    /// Sleep after a failed cycle (network or sensor).
    pub retry_sleep: Duration,

    /// Network bring-up attempts per cycle.
    pub max_connect_attempts: u32,
    /// Pause between bring-up attempts.
    pub connect_retry_delay_ms: u32,
    /// Total time for one bring-up attempt, from driver start to DHCP lease.
    pub connect_timeout: Duration,

    /// Liveness guard timeout.
    pub watchdog_timeout: Duration,

    /// Debounce delay for the two buttons.
    pub debounce_ms: u32,
    /// Poll interval while waiting for a button release.
    pub release_poll_ms: u32,
    /// Pause after a calibration before polling again.
    pub calibration_settle_ms: u32,
    /// Pause between idle polls.
    pub idle_poll_ms: u32,

    /// Raw samples per measurement.
    pub measurement_samples: usize,
    /// Raw samples per calibration.
    pub calibration_samples: usize,
    /// Delay between raw samples.
    pub sample_delay_ms: u32,

    /// Polls of the clock before a report is given up.
    pub time_sync_polls: u32,
    /// Delay between clock polls.
    pub time_sync_poll_ms: u32,

    /// Whether reports are sent at all.
    pub send_reports: bool,
    /// Collector `host:port`.
    pub collector_addr: &'static str,
    /// Group id column of the report line.
    pub group_id: u32,
    /// Free-text tag column of the report line.
    pub report_tag: &'static str,
    /// Socket connect/read/write timeout for a report.
    pub socket_timeout: Duration,
    /// DHCP hostname of the station interface.
    pub hostname: &'static str,

    /// Thermistor front-end constants.
    pub thermistor: ThermistorParams,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            required_measurements: 10,
            measurement_window: Duration::from_secs(300),
            measurement_sleep: Duration::from_secs(30),
            window_sleep: Duration::from_secs(300),
            retry_sleep: Duration::from_secs(30),

            max_connect_attempts: 3,
            connect_retry_delay_ms: 1000,
            connect_timeout: Duration::from_secs(10),

            watchdog_timeout: Duration::from_secs(30),

            debounce_ms: 50,
            release_poll_ms: 10,
            calibration_settle_ms: 1000,
            idle_poll_ms: 100,

            measurement_samples: 5,
            calibration_samples: 10,
            sample_delay_ms: 10,

            time_sync_polls: 15,
            time_sync_poll_ms: 2000,

            send_reports: true,
            collector_addr: "138.232.18.37:22504",
            group_id: 1,
            report_tag: "Group 1 Temperature Sensor",
            socket_timeout: Duration::from_secs(5),
            hostname: "Group 1",

            thermistor: ThermistorParams::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_consistent() {
        let config = NodeConfig::default();
        assert!(config.required_measurements > 0);
        assert!(config.max_connect_attempts > 0);
        assert!(config.calibration_samples > config.measurement_samples);
        // Every blocking wait has to fit inside the watchdog timeout.
        // connect_timeout bounds a whole attempt, start to DHCP lease.
        assert!(config.connect_timeout < config.watchdog_timeout);
        assert!(
            Duration::from_millis(config.time_sync_poll_ms as u64) < config.watchdog_timeout
        );
    }

    #[test]
    fn test_thermistor_defaults() {
        let params = ThermistorParams::default();
        assert_eq!(params.max_raw, MAX_RAW);
        assert!(params.default_reference > 0.0);
    }
}
