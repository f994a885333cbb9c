//! ESP32 implementations of the platform collaborators.

use super::{Button, Buttons, Clock, Delay, PowerControl, RestartCause};
use chrono::{DateTime, Datelike, Utc};
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{AnyInputPin, Input, PinDriver, Pull};
use esp_idf_svc::sntp::{EspSntp, SyncStatus};
use esp_idf_sys::EspError;
use log::info;
use std::time::Duration;

/// RTC timer for monotonic time, SNTP-disciplined system time for the wall
/// clock.
pub struct EspClock {
    sntp: Option<EspSntp<'static>>,
}

impl EspClock {
    /// Clock without network time; `is_synchronized` stays false until
    /// [`start_sync`](Self::start_sync) succeeds.
    pub fn new() -> Self {
        Self { sntp: None }
    }

    /// Start polling `pool.ntp.org`. Requires the network stack to exist.
    pub fn start_sync(&mut self) -> Result<(), EspError> {
        if self.sntp.is_none() {
            info!("Initializing SNTP");
            self.sntp = Some(EspSntp::new_default()?);
        }
        Ok(())
    }
}

impl Default for EspClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for EspClock {
    fn monotonic_us(&self) -> u64 {
        // esp_timer restarts at every boot; the RTC counter survives deep sleep
        unsafe { esp_idf_sys::esp_rtc_get_time_us() }
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn is_synchronized(&self) -> bool {
        let completed = self
            .sntp
            .as_ref()
            .is_some_and(|sntp| sntp.get_sync_status() == SyncStatus::Completed);
        completed && self.wall_clock().year() >= super::MIN_SYNCED_YEAR
    }
}

/// FreeRTOS task delay.
pub struct FreeRtosDelay;

impl Delay for FreeRtosDelay {
    fn delay_ms(&mut self, ms: u32) {
        FreeRtos::delay_ms(ms);
    }
}

/// Active-low buttons with internal pull-ups.
pub struct GpioButtons<'d> {
    calibrate: PinDriver<'d, AnyInputPin, Input>,
    start: PinDriver<'d, AnyInputPin, Input>,
}

impl<'d> GpioButtons<'d> {
    pub fn new(calibrate: AnyInputPin, start: AnyInputPin) -> Result<Self, EspError> {
        let mut calibrate = PinDriver::input(calibrate)?;
        calibrate.set_pull(Pull::Up)?;
        let mut start = PinDriver::input(start)?;
        start.set_pull(Pull::Up)?;
        Ok(Self { calibrate, start })
    }
}

impl Buttons for GpioButtons<'_> {
    fn is_pressed(&mut self, button: Button) -> bool {
        match button {
            Button::Calibrate => self.calibrate.is_low(),
            Button::Start => self.start.is_low(),
        }
    }
}

/// Timer-wakeup deep sleep.
pub struct DeepSleep;

impl PowerControl for DeepSleep {
    fn restart_cause(&self) -> RestartCause {
        let cause = unsafe { esp_idf_sys::esp_sleep_get_wakeup_cause() };
        if cause == esp_idf_sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_TIMER {
            RestartCause::TimedResume
        } else {
            RestartCause::Other
        }
    }

    fn suspend_for(&mut self, duration: Duration) -> ! {
        info!("Entering deep sleep for {} s", duration.as_secs());
        unsafe { esp_idf_sys::esp_deep_sleep(duration.as_micros() as u64) }
    }
}
