//! Platform collaborators.
//!
//! Thin interfaces over the hardware the cycle controller drives:
//! - **ESP32** (`esp32` feature): RTC timer + SNTP, FreeRTOS delays, GPIO
//!   buttons, deep sleep
//! - **Host**: system clock, thread sleeps, simulated buttons, a file-backed
//!   stand-in for deep sleep
//!
//! The controller only ever sees these traits, which keeps it testable on the
//! host with scripted fakes.

#[cfg(feature = "esp32")]
mod esp32;
mod host;

#[cfg(feature = "esp32")]
pub use esp32::{DeepSleep, EspClock, FreeRtosDelay, GpioButtons};
pub use host::{HostButtons, HostPower, RetainedImage, StdDelay, SystemClock};

use chrono::{DateTime, Datelike, Utc};
use std::time::Duration;

/// Earliest year a synchronized wall clock can report.
pub const MIN_SYNCED_YEAR: i32 = 2024;

/// Time source.
pub trait Clock {
    /// Microseconds on a counter that keeps running through deep sleep.
    fn monotonic_us(&self) -> u64;

    /// Current wall-clock time in UTC.
    fn wall_clock(&self) -> DateTime<Utc>;

    /// Whether the wall clock has been set from the network.
    fn is_synchronized(&self) -> bool {
        self.wall_clock().year() >= MIN_SYNCED_YEAR
    }
}

/// Blocking delay.
pub trait Delay {
    fn delay_ms(&mut self, ms: u32);
}

/// The two momentary inputs polled while idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    /// Run a calibration at the reference temperature.
    Calibrate,
    /// Reset progress and start measuring.
    Start,
}

/// Debounce-free view of the buttons; the controller debounces.
pub trait Buttons {
    /// True while the button is held down.
    fn is_pressed(&mut self, button: Button) -> bool;
}

/// Why the process is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartCause {
    /// Deep-sleep timer wakeup: the node is mid-cycle.
    TimedResume,
    /// Power-on, reset button, panic or watchdog.
    Other,
}

/// Low-power control.
pub trait PowerControl {
    /// Classify the current boot.
    fn restart_cause(&self) -> RestartCause;

    /// Enter deep sleep. The process ends here; the next event is a boot.
    fn suspend_for(&mut self, duration: Duration) -> !;
}
