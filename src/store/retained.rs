//! Retained state store.
//!
//! The record lives in memory that survives a deep-sleep restart but not a
//! power loss (RTC slow memory on ESP32, a file on the host). Every boot
//! validates it before trusting any field.
//!
//! Validation combines a CRC32 over a canonical little-endian encoding of the
//! fields with range checks. The CRC catches bit flips in the retained
//! region; the range checks catch values that were written with a matching
//! checksum but are logically impossible.
//!
//! # Example
//!
//! ```
//! use thermonode_esp32::store::{RetainedState, RetainedStore, StoreLimits};
//!
//! let mut state = RetainedState::ZEROED;
//! let mut store = RetainedStore::new(&mut state, StoreLimits::new(10, 15_000.0));
//! assert!(!store.validate());
//!
//! store.update(0, 3, 1_000, 15_000.0);
//! assert!(store.validate());
//! assert_eq!(store.measurement_count(), 3);
//! ```

use super::backup::{BackupRecord, DurableBackup};
use crate::config::{WifiCredentials, MAX_CREDENTIALS_LEN};
use log::{info, warn};
use std::fmt;
use zeroize::Zeroize;

/// Bytes covered by the checksum.
pub const PAYLOAD_LEN: usize = 4 + 4 + 8 + 4 + 1 + MAX_CREDENTIALS_LEN;

/// Checksum followed by payload.
pub const IMAGE_LEN: usize = 4 + PAYLOAD_LEN;

/// Last credentials that produced a working connection.
///
/// Fixed-size so the whole record stays plain data that can sit in a
/// `.rtc.data` static.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct NetworkSnapshot {
    len: u8,
    bytes: [u8; MAX_CREDENTIALS_LEN],
}

impl NetworkSnapshot {
    /// No credentials recorded.
    pub const EMPTY: Self = Self {
        len: 0,
        bytes: [0; MAX_CREDENTIALS_LEN],
    };

    /// Capture serialized credentials.
    pub fn from_credentials(creds: &WifiCredentials) -> Self {
        let mut encoded = creds.to_bytes();
        let mut snapshot = Self::EMPTY;
        // Validated credentials never exceed MAX_CREDENTIALS_LEN
        let len = encoded.len().min(MAX_CREDENTIALS_LEN);
        snapshot.bytes[..len].copy_from_slice(&encoded[..len]);
        snapshot.len = len as u8;
        encoded.zeroize();
        snapshot
    }

    /// Decode the stored credentials, if any.
    pub fn credentials(&self) -> Option<WifiCredentials> {
        if self.is_empty() || self.len as usize > MAX_CREDENTIALS_LEN {
            return None;
        }
        WifiCredentials::from_bytes(&self.bytes[..self.len as usize]).ok()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Wipe the stored credentials.
    pub fn clear(&mut self) {
        self.bytes.zeroize();
        self.len = 0;
    }
}

impl fmt::Debug for NetworkSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkSnapshot")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// The record kept across deep sleep.
///
/// Fields are private: the only writers are [`RetainedStore::update`] and the
/// store's own repair paths, all of which recompute the checksum.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetainedState {
    checksum: u32,
    boot_count: i32,
    measurement_count: i32,
    first_measurement_time: u64,
    calibrated_reference: f32,
    network: NetworkSnapshot,
}

impl RetainedState {
    /// Power-on contents of the retained region. Never valid.
    pub const ZEROED: Self = Self {
        checksum: 0,
        boot_count: 0,
        measurement_count: 0,
        first_measurement_time: 0,
        calibrated_reference: 0.0,
        network: NetworkSnapshot::EMPTY,
    };

    fn with_fields(
        boot_count: i32,
        measurement_count: i32,
        first_measurement_time: u64,
        calibrated_reference: f32,
        network: NetworkSnapshot,
    ) -> Self {
        let mut state = Self {
            checksum: 0,
            boot_count,
            measurement_count,
            first_measurement_time,
            calibrated_reference,
            network,
        };
        state.checksum = state.compute_checksum();
        state
    }

    /// Successful network bring-ups since the last cold boot.
    pub fn boot_count(&self) -> i32 {
        self.boot_count
    }

    /// Progress within the current measurement window.
    pub fn measurement_count(&self) -> i32 {
        self.measurement_count
    }

    /// Monotonic microseconds of the window's first measurement; 0 when the
    /// window has not started.
    pub fn first_measurement_time(&self) -> u64 {
        self.first_measurement_time
    }

    /// Series reference resistance used by the thermistor model.
    pub fn calibrated_reference(&self) -> f32 {
        self.calibrated_reference
    }

    /// Credentials of the last successful bring-up.
    pub fn network(&self) -> &NetworkSnapshot {
        &self.network
    }

    /// Stored checksum.
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Canonical encoding of everything the checksum covers.
    pub fn payload(&self) -> [u8; PAYLOAD_LEN] {
        let mut out = [0u8; PAYLOAD_LEN];
        out[0..4].copy_from_slice(&self.boot_count.to_le_bytes());
        out[4..8].copy_from_slice(&self.measurement_count.to_le_bytes());
        out[8..16].copy_from_slice(&self.first_measurement_time.to_le_bytes());
        out[16..20].copy_from_slice(&self.calibrated_reference.to_le_bytes());
        out[20] = self.network.len;
        out[21..].copy_from_slice(&self.network.bytes);
        out
    }

    /// CRC32 of [`payload`](Self::payload).
    pub fn compute_checksum(&self) -> u32 {
        crc32fast::hash(&self.payload())
    }

    /// Checksum plus payload, for images that have to leave memory.
    pub fn to_bytes(&self) -> [u8; IMAGE_LEN] {
        let mut out = [0u8; IMAGE_LEN];
        out[0..4].copy_from_slice(&self.checksum.to_le_bytes());
        out[4..].copy_from_slice(&self.payload());
        out
    }

    /// Rebuild a record from an image without validating it.
    ///
    /// Returns `None` only when the length is wrong; contents are checked by
    /// [`RetainedStore::validate`].
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != IMAGE_LEN {
            return None;
        }
        let p = &bytes[4..];
        let mut network = NetworkSnapshot::EMPTY;
        network.len = p[20];
        network.bytes.copy_from_slice(&p[21..]);

        Some(Self {
            checksum: u32::from_le_bytes(bytes[0..4].try_into().ok()?),
            boot_count: i32::from_le_bytes(p[0..4].try_into().ok()?),
            measurement_count: i32::from_le_bytes(p[4..8].try_into().ok()?),
            first_measurement_time: u64::from_le_bytes(p[8..16].try_into().ok()?),
            calibrated_reference: f32::from_le_bytes(p[16..20].try_into().ok()?),
            network,
        })
    }
}

/// Range limits applied by validation, plus the fallback reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoreLimits {
    /// Upper bound of `measurement_count`.
    pub required_measurements: i32,
    /// Reference resistance used when nothing else is available.
    pub default_reference: f32,
}

impl StoreLimits {
    pub fn new(required_measurements: i32, default_reference: f32) -> Self {
        Self {
            required_measurements,
            default_reference,
        }
    }
}

/// How `init` ended up with a usable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// Retained memory was valid.
    Retained,
    /// Retained memory was invalid and was reseeded from flash.
    Restored,
    /// Neither source was usable; defaults were written.
    Defaulted,
}

/// Owner of the retained record.
pub struct RetainedStore<'a> {
    state: &'a mut RetainedState,
    limits: StoreLimits,
}

impl<'a> RetainedStore<'a> {
    pub fn new(state: &'a mut RetainedState, limits: StoreLimits) -> Self {
        Self { state, limits }
    }

    /// Range checks plus checksum.
    pub fn validate(&self) -> bool {
        let s = &*self.state;
        let in_range = s.boot_count >= 0
            && s.measurement_count >= 0
            && s.measurement_count <= self.limits.required_measurements
            && s.calibrated_reference.is_finite()
            && s.calibrated_reference > 0.0
            && s.network.len as usize <= MAX_CREDENTIALS_LEN;

        in_range && s.compute_checksum() == s.checksum
    }

    /// Replace the four progress fields and the checksum in one write.
    ///
    /// The new record is built off to the side and stored with a single
    /// assignment so no reader sees a half-updated record.
    pub fn update(
        &mut self,
        boot_count: i32,
        measurement_count: i32,
        first_measurement_time: u64,
        calibrated_reference: f32,
    ) {
        *self.state = RetainedState::with_fields(
            boot_count,
            measurement_count,
            first_measurement_time,
            calibrated_reference,
            self.state.network,
        );
    }

    /// Record a successful network bring-up with the credentials it used.
    pub fn record_connection(&mut self, creds: &WifiCredentials) {
        let s = *self.state;
        *self.state = RetainedState::with_fields(
            s.boot_count.saturating_add(1),
            s.measurement_count,
            s.first_measurement_time,
            s.calibrated_reference,
            NetworkSnapshot::from_credentials(creds),
        );
    }

    /// Make the record usable: keep it if valid, else reseed from the
    /// backup, else fall back to defaults.
    pub fn init(&mut self, backup: &mut DurableBackup<'_>) -> InitOutcome {
        if self.validate() {
            return InitOutcome::Retained;
        }

        info!("Retained state invalid, attempting restore from flash");
        if let Some(record) = backup.restore() {
            if self.accepts(&record) {
                self.reseed(
                    record.measurement_count,
                    record.first_measurement_time,
                    record.calibrated_reference,
                );
                info!(
                    "Restored from flash: {}/{} measurements, reference {:.2}",
                    record.measurement_count,
                    self.limits.required_measurements,
                    record.calibrated_reference
                );
                return InitOutcome::Restored;
            }
            warn!("Backup record out of range, ignoring it");
        }

        info!("No usable backup, resetting retained state to defaults");
        self.reseed(0, 0, self.limits.default_reference);
        InitOutcome::Defaulted
    }

    fn accepts(&self, record: &BackupRecord) -> bool {
        record.measurement_count >= 0
            && record.measurement_count <= self.limits.required_measurements
            && record.calibrated_reference.is_finite()
            && record.calibrated_reference > 0.0
    }

    /// Rebuild from scratch. The boot count and network snapshot are not
    /// recoverable, so the next bring-up starts from flash credentials.
    fn reseed(&mut self, measurement_count: i32, first: u64, reference: f32) {
        self.state.network.clear();
        *self.state = RetainedState::with_fields(
            0,
            measurement_count,
            first,
            reference,
            NetworkSnapshot::EMPTY,
        );
    }

    /// Read-only copy for collaborators.
    pub fn snapshot(&self) -> RetainedState {
        *self.state
    }

    pub fn boot_count(&self) -> i32 {
        self.state.boot_count
    }

    pub fn measurement_count(&self) -> i32 {
        self.state.measurement_count
    }

    pub fn first_measurement_time(&self) -> u64 {
        self.state.first_measurement_time
    }

    pub fn calibrated_reference(&self) -> f32 {
        self.state.calibrated_reference
    }

    pub fn network(&self) -> &NetworkSnapshot {
        &self.state.network
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::KeyValueFlash;
    use crate::store::backup::BACKUP_KEY;
    use crate::testing::MemoryFlash;

    const REQUIRED: i32 = 10;
    const DEFAULT_REF: f32 = 15_000.0;

    fn limits() -> StoreLimits {
        StoreLimits::new(REQUIRED, DEFAULT_REF)
    }

    fn valid_state() -> RetainedState {
        let creds = WifiCredentials::new("Beste", "password123").unwrap();
        let mut state = RetainedState::ZEROED;
        let mut store = RetainedStore::new(&mut state, limits());
        store.update(2, 4, 123_456_789, 14_321.5);
        store.record_connection(&creds);
        state
    }

    #[test]
    fn test_zeroed_state_is_invalid() {
        let mut state = RetainedState::ZEROED;
        let store = RetainedStore::new(&mut state, limits());
        assert!(!store.validate());
    }

    #[test]
    fn test_update_then_validate() {
        let mut state = RetainedState::ZEROED;
        let mut store = RetainedStore::new(&mut state, limits());
        for (boot, count, first, reference) in [
            (0, 0, 0, 1.0),
            (5, REQUIRED, u64::MAX, DEFAULT_REF),
            (i32::MAX, 1, 42, 0.001),
        ] {
            store.update(boot, count, first, reference);
            assert!(store.validate());
        }
    }

    #[test]
    fn test_range_checks_reject_even_with_matching_checksum() {
        let cases: [(i32, i32, f32); 5] = [
            (-1, 0, DEFAULT_REF),
            (0, -1, DEFAULT_REF),
            (0, REQUIRED + 1, DEFAULT_REF),
            (0, 0, 0.0),
            (0, 0, -5.0),
        ];
        for (boot, count, reference) in cases {
            let mut state = RetainedState::ZEROED;
            let mut store = RetainedStore::new(&mut state, limits());
            store.update(boot, count, 0, reference);
            assert!(
                !store.validate(),
                "accepted boot={} count={} ref={}",
                boot,
                count,
                reference
            );
        }
    }

    #[test]
    fn test_non_finite_reference_rejected() {
        for reference in [f32::NAN, f32::INFINITY] {
            let mut state = RetainedState::ZEROED;
            let mut store = RetainedStore::new(&mut state, limits());
            store.update(0, 0, 0, reference);
            assert!(!store.validate());
        }
    }

    #[test]
    fn test_single_bit_flip_detected() {
        let image = valid_state().to_bytes();
        for byte in 4..IMAGE_LEN {
            for bit in 0..8 {
                let mut corrupted = image;
                corrupted[byte] ^= 1 << bit;
                let mut state = RetainedState::from_bytes(&corrupted).unwrap();
                let store = RetainedStore::new(&mut state, limits());
                assert!(!store.validate(), "flip at byte {} bit {} undetected", byte, bit);
            }
        }
    }

    #[test]
    fn test_stale_checksum_detected() {
        let mut image = valid_state().to_bytes();
        image[0] ^= 0xFF;
        let mut state = RetainedState::from_bytes(&image).unwrap();
        assert!(!RetainedStore::new(&mut state, limits()).validate());
    }

    #[test]
    fn test_image_roundtrip_preserves_validity() {
        let original = valid_state();
        let mut restored = RetainedState::from_bytes(&original.to_bytes()).unwrap();
        assert_eq!(original, restored);
        assert!(RetainedStore::new(&mut restored, limits()).validate());
    }

    #[test]
    fn test_from_bytes_rejects_wrong_length() {
        assert!(RetainedState::from_bytes(&[0u8; IMAGE_LEN - 1]).is_none());
        assert!(RetainedState::from_bytes(&[]).is_none());
    }

    #[test]
    fn test_update_keeps_network_snapshot() {
        let mut state = valid_state();
        let mut store = RetainedStore::new(&mut state, limits());
        store.update(0, 0, 0, DEFAULT_REF);
        assert_eq!(store.network().credentials().unwrap().ssid, "Beste");
    }

    #[test]
    fn test_record_connection_increments_boot_count() {
        let creds = WifiCredentials::open("Cafe").unwrap();
        let mut state = RetainedState::ZEROED;
        let mut store = RetainedStore::new(&mut state, limits());
        store.update(0, 1, 10, DEFAULT_REF);

        store.record_connection(&creds);
        store.record_connection(&creds);

        assert_eq!(store.boot_count(), 2);
        assert_eq!(store.measurement_count(), 1);
        assert_eq!(store.network().credentials(), Some(creds));
        assert!(store.validate());
    }

    #[test]
    fn test_init_keeps_valid_state() {
        let mut state = valid_state();
        let mut flash = MemoryFlash::new();
        let mut backup = DurableBackup::new(&mut flash);
        let mut store = RetainedStore::new(&mut state, limits());

        assert_eq!(store.init(&mut backup), InitOutcome::Retained);
        assert_eq!(store.boot_count(), 3);
        assert_eq!(store.measurement_count(), 4);
    }

    #[test]
    fn test_init_cold_boot_without_backup_uses_defaults() {
        let mut state = RetainedState::ZEROED;
        let mut flash = MemoryFlash::new();
        let mut backup = DurableBackup::new(&mut flash);
        let mut store = RetainedStore::new(&mut state, limits());

        assert_eq!(store.init(&mut backup), InitOutcome::Defaulted);
        assert!(store.validate());
        assert_eq!(store.boot_count(), 0);
        assert_eq!(store.measurement_count(), 0);
        assert_eq!(store.first_measurement_time(), 0);
        assert_eq!(store.calibrated_reference(), DEFAULT_REF);
        assert!(store.network().is_empty());
    }

    #[test]
    fn test_init_restores_from_backup() {
        let mut flash = MemoryFlash::new();
        let record = BackupRecord {
            measurement_count: 7,
            first_measurement_time: 99,
            calibrated_reference: 16_100.0,
        };
        flash.set(BACKUP_KEY, &record.to_bytes()).unwrap();

        let mut image = valid_state().to_bytes();
        image[10] ^= 0x01;
        let mut state = RetainedState::from_bytes(&image).unwrap();
        let mut backup = DurableBackup::new(&mut flash);
        let mut store = RetainedStore::new(&mut state, limits());

        assert_eq!(store.init(&mut backup), InitOutcome::Restored);
        assert!(store.validate());
        assert_eq!(store.boot_count(), 0);
        assert_eq!(store.measurement_count(), 7);
        assert_eq!(store.first_measurement_time(), 99);
        assert_eq!(store.calibrated_reference(), 16_100.0);
        assert!(store.network().is_empty());
    }

    #[test]
    fn test_init_ignores_out_of_range_backup() {
        let mut flash = MemoryFlash::new();
        let record = BackupRecord {
            measurement_count: REQUIRED + 5,
            first_measurement_time: 0,
            calibrated_reference: 16_100.0,
        };
        flash.set(BACKUP_KEY, &record.to_bytes()).unwrap();

        let mut state = RetainedState::ZEROED;
        let mut backup = DurableBackup::new(&mut flash);
        let mut store = RetainedStore::new(&mut state, limits());

        assert_eq!(store.init(&mut backup), InitOutcome::Defaulted);
        assert_eq!(store.calibrated_reference(), DEFAULT_REF);
    }

    #[test]
    fn test_init_flash_error_falls_back_to_defaults() {
        let mut flash = MemoryFlash::new();
        flash.fail_reads = true;
        let mut state = RetainedState::ZEROED;
        let mut backup = DurableBackup::new(&mut flash);
        let mut store = RetainedStore::new(&mut state, limits());

        assert_eq!(store.init(&mut backup), InitOutcome::Defaulted);
        assert!(store.validate());
    }

    #[test]
    fn test_snapshot_roundtrip_and_clear() {
        let creds = WifiCredentials::new("s".repeat(32), "p".repeat(64)).unwrap();
        let mut snapshot = NetworkSnapshot::from_credentials(&creds);
        assert_eq!(snapshot.credentials(), Some(creds));

        snapshot.clear();
        assert!(snapshot.is_empty());
        assert!(snapshot.credentials().is_none());
    }
}
