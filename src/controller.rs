//! Wake/measure/report/sleep cycle.
//!
//! Every boot runs the machine once from the top:
//!
//! ```text
//!   boot ──(timer wakeup)──────────────────────────┐
//!     │                                            v
//!     └─(any other cause)──> Idle ──(start)──> Measuring ──> Sleeping
//!                            │  ^                             (process ends)
//!                            └──┘ (calibrate)
//! ```
//!
//! Sleeping is terminal: the controller hands back a [`SleepPlan`] and the
//! caller suspends, which ends the process. Everything the next boot needs to
//! pick up where this one left off lives in the [`RetainedState`].

use crate::config::{NodeConfig, WifiCredentials};
use crate::flash::KeyValueFlash;
use crate::network::{NetworkLink, Report};
use crate::platform::{Button, Buttons, Clock, Delay, RestartCause};
use crate::sensor::{sample_average, AdcSource, SensorFault, ThermistorModel};
use crate::store::{DurableBackup, InitOutcome, RetainedState, RetainedStore, StoreLimits};
use crate::watchdog::LivenessGuard;
use crate::wifi::load_credentials;
use log::{debug, error, info, warn};
use std::time::Duration;

/// Where the machine is within the current boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Measuring,
    Sleeping,
}

/// Entry state chosen from the restart cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleDecision {
    /// Fresh start: wait for the operator.
    Idle,
    /// Timer wakeup: the node is mid-window, measure right away.
    ResumeMeasuring,
}

impl CycleDecision {
    pub fn from_restart(cause: RestartCause) -> Self {
        match cause {
            RestartCause::TimedResume => Self::ResumeMeasuring,
            RestartCause::Other => Self::Idle,
        }
    }
}

/// How the measuring phase ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// A temperature was taken and counted.
    Measured(f32),
    /// The bring-up budget ran out.
    NetworkUnavailable,
    /// Sampling or conversion failed.
    SensorFault(SensorFault),
}

/// Why a sleep duration was picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepReason {
    /// Quota reached; long sleep until the next window.
    WindowComplete,
    /// Window in progress; short sleep until the next sample.
    NextMeasurement,
    /// Window ran out of time before the quota; progress dropped.
    StaleWindow,
    NetworkUnavailable,
    SensorFault,
}

/// Result of the sleep decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepPlan {
    pub duration: Duration,
    pub reason: SleepReason,
    /// Clear `measurement_count` and `first_measurement_time` before sleeping.
    pub reset_progress: bool,
}

/// Pick the sleep duration for `outcome` given the window progress.
///
/// A window whose first sample is at least `measurement_window` old resets
/// even though the quota was not met. A monotonic clock behind the window
/// start (counter restarted after power loss) counts as stale too.
pub fn decide_sleep(
    config: &NodeConfig,
    measurement_count: i32,
    first_measurement_time: u64,
    now_us: u64,
    outcome: &CycleOutcome,
) -> SleepPlan {
    let window_us = config.measurement_window.as_micros() as u64;
    let stale = first_measurement_time != 0
        && measurement_count < config.required_measurements
        && (now_us < first_measurement_time || now_us - first_measurement_time >= window_us);

    let plan = |duration, reason, reset_progress| SleepPlan {
        duration,
        reason,
        reset_progress,
    };

    match outcome {
        CycleOutcome::SensorFault(_) => plan(config.retry_sleep, SleepReason::SensorFault, true),
        CycleOutcome::NetworkUnavailable => {
            plan(config.retry_sleep, SleepReason::NetworkUnavailable, stale)
        }
        CycleOutcome::Measured(_) if measurement_count >= config.required_measurements => {
            plan(config.window_sleep, SleepReason::WindowComplete, true)
        }
        CycleOutcome::Measured(_) if stale => {
            plan(config.measurement_sleep, SleepReason::StaleWindow, true)
        }
        CycleOutcome::Measured(_) => {
            plan(config.measurement_sleep, SleepReason::NextMeasurement, false)
        }
    }
}

/// Hardware the controller drives.
pub struct NodeIo<'a> {
    pub adc: &'a mut dyn AdcSource,
    pub network: &'a mut dyn NetworkLink,
    pub clock: &'a dyn Clock,
    pub buttons: &'a mut dyn Buttons,
    pub delay: &'a mut dyn Delay,
    pub watchdog: &'a mut dyn LivenessGuard,
    /// Namespace holding the retained-state backup.
    pub backup_flash: &'a mut dyn KeyValueFlash,
    /// Namespace holding the WiFi credentials.
    pub credentials_flash: &'a dyn KeyValueFlash,
}

/// One boot's worth of the measurement cycle.
pub struct CycleController<'a> {
    config: &'a NodeConfig,
    model: ThermistorModel,
    store: RetainedStore<'a>,
    io: NodeIo<'a>,
    state: CycleState,
}

impl<'a> CycleController<'a> {
    pub fn new(config: &'a NodeConfig, retained: &'a mut RetainedState, io: NodeIo<'a>) -> Self {
        let limits = StoreLimits::new(
            config.required_measurements,
            config.thermistor.default_reference,
        );
        Self {
            config,
            model: ThermistorModel::new(config.thermistor),
            store: RetainedStore::new(retained, limits),
            io,
            state: CycleState::Idle,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn store(&self) -> &RetainedStore<'a> {
        &self.store
    }

    /// Run the whole cycle and return how long to sleep.
    ///
    /// The retained state is final and the watchdog disarmed when this
    /// returns; the caller only has to suspend.
    pub fn run(&mut self, cause: RestartCause) -> SleepPlan {
        if self.boot(cause) == CycleDecision::Idle {
            self.poll_idle();
        }
        let outcome = self.measure_cycle();
        self.enter_sleep(&outcome)
    }

    /// Arm the watchdog, make the retained state usable and pick the entry
    /// state.
    pub fn boot(&mut self, cause: RestartCause) -> CycleDecision {
        if let Err(e) = self.io.watchdog.arm(self.config.watchdog_timeout) {
            error!("Failed to arm watchdog: {}", e);
        }

        let outcome = self.store.init(&mut DurableBackup::new(&mut *self.io.backup_flash));
        if outcome != InitOutcome::Retained {
            info!("Retained state {:?}", outcome);
        }

        let decision = CycleDecision::from_restart(cause);
        match decision {
            CycleDecision::ResumeMeasuring => {
                info!(
                    "Timer wakeup: {}/{} measurements, boot count {}",
                    self.store.measurement_count(),
                    self.config.required_measurements,
                    self.store.boot_count()
                );
                self.state = CycleState::Measuring;
            }
            CycleDecision::Idle => {
                info!("Cold boot, waiting for input");
                self.store.update(
                    0,
                    self.store.measurement_count(),
                    self.store.first_measurement_time(),
                    self.store.calibrated_reference(),
                );
                self.state = CycleState::Idle;
            }
        }
        decision
    }

    /// Wait for the operator. Calibrate requests are served in place; start
    /// resets progress and leaves for Measuring.
    pub fn poll_idle(&mut self) {
        self.state = CycleState::Idle;
        loop {
            self.io.watchdog.acknowledge();

            if self.debounced(Button::Calibrate) {
                self.wait_for_release(Button::Calibrate);
                info!("Calibration requested");
                if let Err(e) = self.calibrate() {
                    warn!("Calibration failed, keeping previous reference: {}", e);
                }
                self.io.delay.delay_ms(self.config.calibration_settle_ms);
                continue;
            }

            if self.debounced(Button::Start) {
                self.wait_for_release(Button::Start);
                info!("Start requested, resetting measurement window");
                self.store.update(
                    self.store.boot_count(),
                    0,
                    0,
                    self.store.calibrated_reference(),
                );
                self.state = CycleState::Measuring;
                return;
            }

            self.io.delay.delay_ms(self.config.idle_poll_ms);
        }
    }

    fn debounced(&mut self, button: Button) -> bool {
        if !self.io.buttons.is_pressed(button) {
            return false;
        }
        self.io.delay.delay_ms(self.config.debounce_ms);
        self.io.buttons.is_pressed(button)
    }

    fn wait_for_release(&mut self, button: Button) {
        while self.io.buttons.is_pressed(button) {
            self.io.watchdog.acknowledge();
            self.io.delay.delay_ms(self.config.release_poll_ms);
        }
    }

    /// Derive a new series reference from a reading at the calibration
    /// temperature, restart the window with it and back it up.
    pub fn calibrate(&mut self) -> Result<f32, SensorFault> {
        let params = self.model.params();
        let average = sample_average(
            &mut *self.io.adc,
            &mut *self.io.delay,
            &mut *self.io.watchdog,
            self.config.calibration_samples,
            self.config.sample_delay_ms,
            params.max_raw,
        )?;
        let reference = self.model.reference_for(average, params.calibration_celsius)?;

        info!(
            "Calibrated at {:.1} °C: raw {:.1}, reference {:.2} -> {:.2}",
            params.calibration_celsius,
            average,
            self.store.calibrated_reference(),
            reference
        );

        self.store.update(self.store.boot_count(), 0, 0, reference);
        DurableBackup::new(&mut *self.io.backup_flash).backup(&self.store.snapshot());
        Ok(reference)
    }

    /// Network bring-up, sampling and delivery.
    pub fn measure_cycle(&mut self) -> CycleOutcome {
        self.state = CycleState::Measuring;

        if self.config.send_reports && !self.bring_up_network() {
            return CycleOutcome::NetworkUnavailable;
        }

        match self.measure() {
            Ok(celsius) => {
                if self.config.send_reports {
                    self.deliver(celsius);
                }
                CycleOutcome::Measured(celsius)
            }
            Err(fault) => {
                warn!("Measurement failed: {}", fault);
                CycleOutcome::SensorFault(fault)
            }
        }
    }

    /// Take one temperature and count it in the window.
    pub fn measure(&mut self) -> Result<f32, SensorFault> {
        let average = sample_average(
            &mut *self.io.adc,
            &mut *self.io.delay,
            &mut *self.io.watchdog,
            self.config.measurement_samples,
            self.config.sample_delay_ms,
            self.model.params().max_raw,
        )?;
        let celsius = self
            .model
            .to_temperature(average, self.store.calibrated_reference())?;

        let count = (self.store.measurement_count() + 1).min(self.config.required_measurements);
        let first = match self.store.first_measurement_time() {
            // 0 marks "not started", so never stamp 0 itself
            0 => self.io.clock.monotonic_us().max(1),
            t => t,
        };
        self.store.update(
            self.store.boot_count(),
            count,
            first,
            self.store.calibrated_reference(),
        );

        info!(
            "Temperature {:.2} °C (raw {:.1}), measurement {}/{}",
            celsius, average, count, self.config.required_measurements
        );
        Ok(celsius)
    }

    /// Connect with a bounded number of attempts.
    ///
    /// On success the used credentials are remembered and the boot count
    /// goes up. On exhaustion the boot count is cleared so the next cycle
    /// re-reads credentials from flash.
    pub fn bring_up_network(&mut self) -> bool {
        let Some(credentials) = self.select_credentials() else {
            warn!("No WiFi credentials available");
            self.record_network_failure();
            return false;
        };

        let attempts = self.config.max_connect_attempts;
        for attempt in 1..=attempts {
            self.io.watchdog.acknowledge();
            match self.io.network.connect(&credentials, self.config.connect_timeout) {
                Ok(()) => {
                    self.store.record_connection(&credentials);
                    info!(
                        "Network up on attempt {}/{} (boot count {})",
                        attempt,
                        attempts,
                        self.store.boot_count()
                    );
                    return true;
                }
                Err(e) => {
                    warn!("Connection attempt {}/{} failed: {}", attempt, attempts, e);
                    if attempt < attempts {
                        self.io.watchdog.acknowledge();
                        self.io.delay.delay_ms(self.config.connect_retry_delay_ms);
                    }
                }
            }
        }

        error!("Network unavailable after {} attempts", attempts);
        self.record_network_failure();
        false
    }

    fn record_network_failure(&mut self) {
        self.store.update(
            0,
            self.store.measurement_count(),
            self.store.first_measurement_time(),
            self.store.calibrated_reference(),
        );
    }

    /// Retained snapshot while the node has connected since the last cold
    /// boot, flash otherwise.
    fn select_credentials(&self) -> Option<WifiCredentials> {
        if self.store.boot_count() > 0 {
            if let Some(credentials) = self.store.network().credentials() {
                debug!("Quick connect with retained credentials");
                return Some(credentials);
            }
        }
        load_credentials(self.io.credentials_flash)
    }

    /// Poll for wall-clock synchronization, acknowledging the watchdog.
    pub fn wait_for_time_sync(&mut self) -> bool {
        let polls = self.config.time_sync_polls;
        for poll in 0..polls {
            self.io.watchdog.acknowledge();
            if self.io.clock.is_synchronized() {
                return true;
            }
            if poll + 1 < polls {
                debug!("Waiting for time sync ({}/{})", poll + 1, polls);
                self.io.delay.delay_ms(self.config.time_sync_poll_ms);
            }
        }
        false
    }

    /// Best-effort report. Failures never affect progress.
    pub fn deliver(&mut self, celsius: f32) {
        if !self.wait_for_time_sync() {
            warn!("Time not synchronized, skipping report");
            return;
        }

        let report = Report {
            timestamp: self.io.clock.wall_clock(),
            group_id: self.config.group_id,
            celsius,
            tag: self.config.report_tag,
        };
        let line = report.to_line();

        self.io.watchdog.acknowledge();
        match self.io.network.send(line.as_bytes()) {
            Ok(n) => info!("Report sent ({} bytes): {}", n, line.trim_end()),
            Err(e) => warn!("Report delivery failed: {}", e),
        }
    }

    /// Apply the sleep decision, tear down the link and disarm the watchdog.
    pub fn enter_sleep(&mut self, outcome: &CycleOutcome) -> SleepPlan {
        let plan = decide_sleep(
            self.config,
            self.store.measurement_count(),
            self.store.first_measurement_time(),
            self.io.clock.monotonic_us(),
            outcome,
        );

        if plan.reset_progress {
            self.store.update(
                self.store.boot_count(),
                0,
                0,
                self.store.calibrated_reference(),
            );
        }

        if self.io.network.is_connected() {
            self.io.network.disconnect();
        }

        info!(
            "Sleeping {} s ({:?}), {}/{} measurements",
            plan.duration.as_secs(),
            plan.reason,
            self.store.measurement_count(),
            self.config.required_measurements
        );

        self.io.watchdog.disarm();
        self.state = CycleState::Sleeping;
        plan
    }
}
