//! In-memory fakes for every collaborator the controller drives.
//!
//! Compiled only for unit tests.

use crate::config::WifiCredentials;
use crate::flash::{FlashError, KeyValueFlash};
use crate::network::{NetworkError, NetworkLink};
use crate::platform::{Button, Buttons, Clock, Delay};
use crate::sensor::{AdcSource, SensorFault};
use crate::watchdog::{LivenessGuard, WatchdogError};
use chrono::{DateTime, TimeZone, Utc};
use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::time::Duration;

/// Flash that lives in a `HashMap`.
#[derive(Default)]
pub struct MemoryFlash {
    entries: HashMap<String, Vec<u8>>,
    /// Accept writes without storing them.
    pub drop_writes: bool,
    /// Fail every write.
    pub fail_writes: bool,
    /// Fail every read.
    pub fail_reads: bool,
    pub writes: usize,
}

impl MemoryFlash {
    pub fn new() -> Self {
        Self::default()
    }

    fn simulated(what: &str) -> FlashError {
        FlashError::Io(io::Error::new(io::ErrorKind::Other, format!("simulated {} failure", what)))
    }
}

impl KeyValueFlash for MemoryFlash {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, FlashError> {
        if self.fail_reads {
            return Err(Self::simulated("read"));
        }
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), FlashError> {
        if self.fail_writes {
            return Err(Self::simulated("write"));
        }
        self.writes += 1;
        if !self.drop_writes {
            self.entries.insert(key.to_string(), value.to_vec());
        }
        Ok(())
    }
}

/// ADC returning a fixed sequence of readings, wrapping around at the end.
pub struct ScriptedAdc {
    readings: Vec<u16>,
    fail_after: Option<usize>,
    pub reads: usize,
}

impl ScriptedAdc {
    pub fn new(readings: impl IntoIterator<Item = u16>) -> Self {
        Self {
            readings: readings.into_iter().collect(),
            fail_after: None,
            reads: 0,
        }
    }

    pub fn constant(raw: u16) -> Self {
        Self::new([raw])
    }

    /// Return a driver error from read number `n` (0-based) onwards.
    pub fn fail_after(&mut self, n: usize) {
        self.fail_after = Some(n);
    }
}

impl AdcSource for ScriptedAdc {
    fn read_raw(&mut self) -> Result<u16, SensorFault> {
        let index = self.reads;
        self.reads += 1;
        if self.fail_after.is_some_and(|n| index >= n) || self.readings.is_empty() {
            return Err(SensorFault::Read("scripted failure".into()));
        }
        Ok(self.readings[index % self.readings.len()])
    }
}

/// Buttons that replay a queue of steps. A press reads as held for a number
/// of reads; a pause reads as released for a number of polls.
#[derive(Default)]
pub struct ScriptedButtons {
    steps: VecDeque<(Option<Button>, u32)>,
    pub polls: usize,
}

impl ScriptedButtons {
    const MAX_POLLS: usize = 100_000;

    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a press that reads as held `reads` times.
    pub fn press(mut self, button: Button, reads: u32) -> Self {
        assert!(reads > 0);
        self.steps.push_back((Some(button), reads));
        self
    }

    /// A press long enough to pass debounce and one release poll.
    pub fn tap(self, button: Button) -> Self {
        self.press(button, 3)
    }

    /// Nothing pressed for `polls` reads.
    pub fn pause(mut self, polls: u32) -> Self {
        assert!(polls > 0);
        self.steps.push_back((None, polls));
        self
    }
}

impl Buttons for ScriptedButtons {
    fn is_pressed(&mut self, button: Button) -> bool {
        self.polls += 1;
        assert!(self.polls < Self::MAX_POLLS, "idle loop never left");

        let Some((held, remaining)) = self.steps.front_mut() else {
            return false;
        };
        let pressed = *held == Some(button);
        if pressed || held.is_none() {
            *remaining -= 1;
            if *remaining == 0 {
                self.steps.pop_front();
            }
        }
        pressed
    }
}

/// Network whose connect outcome is scripted.
#[derive(Default)]
pub struct ScriptedNetwork {
    /// Number of connect calls that fail before one succeeds.
    pub failing_connects: u32,
    pub fail_sends: bool,
    pub connected: bool,
    pub connect_attempts: u32,
    pub connected_ssids: Vec<String>,
    pub sent: Vec<Vec<u8>>,
    pub disconnects: u32,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreachable() -> Self {
        Self {
            failing_connects: u32::MAX,
            ..Self::default()
        }
    }

    pub fn sent_lines(&self) -> Vec<String> {
        self.sent
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }
}

impl NetworkLink for ScriptedNetwork {
    fn connect(&mut self, credentials: &WifiCredentials, _timeout: Duration) -> Result<(), NetworkError> {
        self.connect_attempts += 1;
        if self.connect_attempts <= self.failing_connects {
            return Err(NetworkError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "scripted connect failure",
            )));
        }
        self.connected = true;
        self.connected_ssids.push(credentials.ssid.clone());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn send(&mut self, payload: &[u8]) -> Result<usize, NetworkError> {
        if !self.connected {
            return Err(NetworkError::NotConnected);
        }
        if self.fail_sends {
            return Err(NetworkError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "scripted send failure",
            )));
        }
        self.sent.push(payload.to_vec());
        Ok(payload.len())
    }

    fn disconnect(&mut self) {
        self.connected = false;
        self.disconnects += 1;
    }
}

/// Clock set by hand.
pub struct ManualClock {
    pub monotonic: Cell<u64>,
    pub wall: DateTime<Utc>,
    /// Number of `is_synchronized` polls that report false first; `None`
    /// never synchronizes.
    pub synced_after: Option<u32>,
    pub sync_polls: Cell<u32>,
}

impl ManualClock {
    pub fn at(monotonic_us: u64) -> Self {
        Self {
            monotonic: Cell::new(monotonic_us),
            wall: Utc.with_ymd_and_hms(2024, 5, 14, 8, 30, 0).unwrap(),
            synced_after: Some(0),
            sync_polls: Cell::new(0),
        }
    }

    pub fn never_synced(mut self) -> Self {
        self.synced_after = None;
        self
    }

    pub fn synced_after(mut self, polls: u32) -> Self {
        self.synced_after = Some(polls);
        self
    }
}

impl Clock for ManualClock {
    fn monotonic_us(&self) -> u64 {
        self.monotonic.get()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        self.wall
    }

    fn is_synchronized(&self) -> bool {
        let previous = self.sync_polls.get();
        self.sync_polls.set(previous + 1);
        self.synced_after.is_some_and(|n| previous >= n)
    }
}

/// Delay that only records how long it was asked to wait.
#[derive(Default)]
pub struct NoDelay {
    pub calls: u32,
    pub total_ms: u64,
}

impl Delay for NoDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.calls += 1;
        self.total_ms += ms as u64;
    }
}

/// Watchdog that counts calls.
#[derive(Default)]
pub struct CountingWatchdog {
    pub armed: bool,
    pub timeout: Option<Duration>,
    pub arms: u32,
    pub acks: u32,
    pub disarms: u32,
}

impl LivenessGuard for CountingWatchdog {
    fn arm(&mut self, timeout: Duration) -> Result<(), WatchdogError> {
        self.arms += 1;
        self.armed = true;
        self.timeout = Some(timeout);
        Ok(())
    }

    fn acknowledge(&mut self) {
        self.acks += 1;
    }

    fn disarm(&mut self) {
        self.disarms += 1;
        self.armed = false;
    }
}
