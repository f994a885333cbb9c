//! Host stand-ins for the device platform.
//!
//! Deep sleep is emulated across process runs: `suspend_for` saves a resume
//! marker and exits, and the next run reads it back as a timer wakeup.
//! Retained memory is emulated by [`RetainedImage`], a file holding the raw
//! record.

use super::{Button, Buttons, Clock, Delay, PowerControl, RestartCause};
use crate::store::RetainedState;
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall clock of the host; assumed synchronized.
pub struct SystemClock;

impl Clock for SystemClock {
    fn monotonic_us(&self) -> u64 {
        // Must keep counting between process runs, so Instant won't do
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0)
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// `thread::sleep` delay.
pub struct StdDelay;

impl Delay for StdDelay {
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }
}

/// Simulated buttons: each requested press is held for a few polls and then
/// released, which is enough to pass the debounce check.
pub struct HostButtons {
    calibrate_reads: u32,
    start_reads: u32,
}

/// Reads a simulated press stays down for (press check, debounce check).
const HELD_READS: u32 = 2;

impl HostButtons {
    pub fn new(press_calibrate: bool, press_start: bool) -> Self {
        Self {
            calibrate_reads: if press_calibrate { HELD_READS } else { 0 },
            start_reads: if press_start { HELD_READS } else { 0 },
        }
    }
}

impl Buttons for HostButtons {
    fn is_pressed(&mut self, button: Button) -> bool {
        let reads = match button {
            Button::Calibrate => &mut self.calibrate_reads,
            Button::Start => &mut self.start_reads,
        };
        if *reads > 0 {
            *reads -= 1;
            true
        } else {
            false
        }
    }
}

/// File standing in for RTC memory.
pub struct RetainedImage {
    path: PathBuf,
}

impl RetainedImage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the image. A missing or malformed file reads as power-on memory.
    pub fn load(&self) -> RetainedState {
        match fs::read(&self.path) {
            Ok(bytes) => RetainedState::from_bytes(&bytes).unwrap_or_else(|| {
                warn!("Retained image {:?} has wrong size, ignoring it", self.path);
                RetainedState::ZEROED
            }),
            Err(_) => RetainedState::ZEROED,
        }
    }

    pub fn save(&self, state: &RetainedState) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, state.to_bytes())
    }
}

/// Emulated deep sleep.
pub struct HostPower {
    marker: PathBuf,
    cause: RestartCause,
}

impl HostPower {
    /// Read and consume the resume marker left by the previous run.
    ///
    /// The marker is removed immediately, so a run that crashes before
    /// suspending leaves the next run classified as a fresh boot.
    pub fn new(marker: impl Into<PathBuf>) -> Self {
        let marker = marker.into();
        let cause = if fs::remove_file(&marker).is_ok() {
            RestartCause::TimedResume
        } else {
            RestartCause::Other
        };
        Self { marker, cause }
    }
}

impl PowerControl for HostPower {
    fn restart_cause(&self) -> RestartCause {
        self.cause
    }

    fn suspend_for(&mut self, duration: Duration) -> ! {
        if let Err(e) = fs::write(&self.marker, duration.as_secs().to_string()) {
            warn!("Failed to write resume marker: {}", e);
        }
        info!(
            "Entering simulated deep sleep for {} s; run again to resume",
            duration.as_secs()
        );
        std::process::exit(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{RetainedStore, StoreLimits};
    use std::env;
    use std::sync::atomic::{AtomicU32, Ordering};

    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn unique_path(name: &str) -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let pid = std::process::id();
        env::temp_dir().join(format!("thermonode-{}-{}-{}", name, pid, id))
    }

    #[test]
    fn test_missing_image_reads_as_zeroed() {
        let image = RetainedImage::new(unique_path("image"));
        assert_eq!(image.load(), RetainedState::ZEROED);
    }

    #[test]
    fn test_image_roundtrip() {
        let path = unique_path("image");
        let image = RetainedImage::new(&path);

        let mut state = RetainedState::ZEROED;
        RetainedStore::new(&mut state, StoreLimits::new(10, 15_000.0)).update(1, 2, 3, 4.0);
        image.save(&state).unwrap();

        assert_eq!(image.load(), state);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_marker_classifies_restart() {
        let marker = unique_path("marker");
        assert_eq!(HostPower::new(&marker).restart_cause(), RestartCause::Other);

        fs::write(&marker, "30").unwrap();
        assert_eq!(
            HostPower::new(&marker).restart_cause(),
            RestartCause::TimedResume
        );
        // Consumed by the previous call
        assert_eq!(HostPower::new(&marker).restart_cause(), RestartCause::Other);
    }

    #[test]
    fn test_host_buttons_release_after_debounce() {
        let mut buttons = HostButtons::new(false, true);
        assert!(!buttons.is_pressed(Button::Calibrate));
        assert!(buttons.is_pressed(Button::Start));
        assert!(buttons.is_pressed(Button::Start));
        assert!(!buttons.is_pressed(Button::Start));
    }

    #[test]
    fn test_system_clock_is_synchronized() {
        assert!(SystemClock.is_synchronized());
        assert!(SystemClock.monotonic_us() > 0);
    }
}
