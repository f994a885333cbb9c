//! Liveness guard.
//!
//! The control loop must acknowledge the guard at least once per timeout on
//! every path, including inside blocking waits. A missed deadline aborts the
//! process; the next boot then sees a non-timer restart cause and starts
//! fresh.
//!
//! - **ESP32**: the ESP-IDF task watchdog, configured to panic on timeout
//! - **Host**: a monitor thread that aborts the process

use log::{error, info};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Forced-restart-on-stall guard.
pub trait LivenessGuard {
    /// Start supervising the calling task.
    fn arm(&mut self, timeout: Duration) -> Result<(), WatchdogError>;

    /// Reset the deadline.
    fn acknowledge(&mut self);

    /// Stop supervising, before an intentional suspend.
    fn disarm(&mut self);
}

/// Watchdog setup errors.
#[derive(Debug)]
pub enum WatchdogError {
    /// ESP-IDF rejected the configuration (raw `esp_err_t`).
    Esp(i32),
    /// Host monitor thread could not be started.
    Io(std::io::Error),
}

impl std::fmt::Display for WatchdogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Esp(code) => write!(f, "task watchdog call failed with code {}", code),
            Self::Io(e) => write!(f, "watchdog thread error: {}", e),
        }
    }
}

impl std::error::Error for WatchdogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// ESP-IDF task watchdog bound to the calling task.
#[cfg(feature = "esp32")]
pub struct TaskWatchdog {
    armed: bool,
}

#[cfg(feature = "esp32")]
impl TaskWatchdog {
    pub fn new() -> Self {
        Self { armed: false }
    }
}

#[cfg(feature = "esp32")]
impl Default for TaskWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "esp32")]
impl LivenessGuard for TaskWatchdog {
    fn arm(&mut self, timeout: Duration) -> Result<(), WatchdogError> {
        use esp_idf_sys::{
            esp_task_wdt_add, esp_task_wdt_config_t, esp_task_wdt_deinit, esp_task_wdt_init,
            ESP_ERR_INVALID_STATE, ESP_OK,
        };

        // ESP-IDF starts its own TWDT at boot; replace it with ours
        if unsafe { esp_task_wdt_deinit() } == ESP_OK {
            info!("Previous watchdog deinitialized");
        }

        let config = esp_task_wdt_config_t {
            timeout_ms: timeout.as_millis() as u32,
            idle_core_mask: 0,
            trigger_panic: true,
        };
        let rc = unsafe { esp_task_wdt_init(&config) };
        if rc != ESP_OK && rc != ESP_ERR_INVALID_STATE {
            return Err(WatchdogError::Esp(rc));
        }

        let rc = unsafe { esp_task_wdt_add(core::ptr::null_mut()) };
        if rc != ESP_OK && rc != ESP_ERR_INVALID_STATE {
            return Err(WatchdogError::Esp(rc));
        }

        self.armed = true;
        info!("Task watchdog armed ({} ms)", timeout.as_millis());
        Ok(())
    }

    fn acknowledge(&mut self) {
        if self.armed {
            let _ = unsafe { esp_idf_sys::esp_task_wdt_reset() };
        }
    }

    fn disarm(&mut self) {
        if self.armed {
            let _ = unsafe { esp_idf_sys::esp_task_wdt_delete(core::ptr::null_mut()) };
            self.armed = false;
        }
    }
}

/// Host watchdog: a monitor thread that aborts the process on a missed
/// deadline.
///
/// Each `arm` starts a fresh monitor tagged with a new generation; a monitor
/// exits as soon as it is no longer the current one.
pub struct ThreadWatchdog {
    started: Instant,
    last_ack_ms: Arc<AtomicU64>,
    timeout_ms: Arc<AtomicU64>,
    generation: Arc<AtomicU64>,
    armed: Arc<AtomicBool>,
    monitor: Option<JoinHandle<()>>,
}

impl ThreadWatchdog {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            last_ack_ms: Arc::new(AtomicU64::new(0)),
            timeout_ms: Arc::new(AtomicU64::new(0)),
            generation: Arc::new(AtomicU64::new(0)),
            armed: Arc::new(AtomicBool::new(false)),
            monitor: None,
        }
    }

    fn elapsed_ms(started: Instant) -> u64 {
        started.elapsed().as_millis() as u64
    }

    /// Retire the current monitor and wait for it to exit.
    fn stop_monitor(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.monitor.take() {
            let _ = handle.join();
        }
    }
}

impl Default for ThreadWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadWatchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}

impl LivenessGuard for ThreadWatchdog {
    fn arm(&mut self, timeout: Duration) -> Result<(), WatchdogError> {
        self.stop_monitor();

        let timeout_ms = timeout.as_millis() as u64;
        self.timeout_ms.store(timeout_ms, Ordering::SeqCst);
        self.acknowledge();
        self.armed.store(true, Ordering::SeqCst);

        let started = self.started;
        let last_ack_ms = self.last_ack_ms.clone();
        let current_timeout = self.timeout_ms.clone();
        let generation = self.generation.clone();
        let armed = self.armed.clone();
        let own_generation = generation.load(Ordering::SeqCst);
        let poll = Duration::from_millis((timeout_ms / 10).clamp(1, 100));

        let handle = std::thread::Builder::new()
            .name("watchdog".into())
            .spawn(move || {
                while armed.load(Ordering::SeqCst)
                    && generation.load(Ordering::SeqCst) == own_generation
                {
                    let idle = Self::elapsed_ms(started)
                        .saturating_sub(last_ack_ms.load(Ordering::SeqCst));
                    if idle > current_timeout.load(Ordering::SeqCst) {
                        error!("Watchdog not acknowledged for {} ms, aborting", idle);
                        std::process::abort();
                    }
                    std::thread::sleep(poll);
                }
            })
            .map_err(|e| {
                self.armed.store(false, Ordering::SeqCst);
                WatchdogError::Io(e)
            })?;
        self.monitor = Some(handle);

        info!("Watchdog armed ({} ms)", timeout_ms);
        Ok(())
    }

    fn acknowledge(&mut self) {
        self.last_ack_ms
            .store(Self::elapsed_ms(self.started), Ordering::SeqCst);
    }

    fn disarm(&mut self) {
        self.armed.store(false, Ordering::SeqCst);
        self.stop_monitor();
    }
}
