//! Durable backup of calibration and progress.
//!
//! A small flash-resident copy of the retained fields worth keeping across a
//! power loss. Written after every calibration, read only when the retained
//! record fails validation.
//!
//! Record format (21 bytes, little-endian):
//! `[version:1][measurement_count:4][first_measurement_time:8][reference:4][crc32:4]`

use super::retained::RetainedState;
use crate::flash::{set_verified, KeyValueFlash};
use log::{debug, error, info, warn};

/// NVS namespace holding the backup.
pub const BACKUP_NAMESPACE: &str = "storage";

/// Key of the backup record.
pub const BACKUP_KEY: &str = "rtc_data";

const RECORD_VERSION: u8 = 1;
const RECORD_LEN: usize = 1 + 4 + 8 + 4 + 4;

/// The subset of [`RetainedState`] that survives power loss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackupRecord {
    pub measurement_count: i32,
    pub first_measurement_time: u64,
    pub calibrated_reference: f32,
}

impl BackupRecord {
    pub fn from_state(state: &RetainedState) -> Self {
        Self {
            measurement_count: state.measurement_count(),
            first_measurement_time: state.first_measurement_time(),
            calibrated_reference: state.calibrated_reference(),
        }
    }

    pub fn to_bytes(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        out[0] = RECORD_VERSION;
        out[1..5].copy_from_slice(&self.measurement_count.to_le_bytes());
        out[5..13].copy_from_slice(&self.first_measurement_time.to_le_bytes());
        out[13..17].copy_from_slice(&self.calibrated_reference.to_le_bytes());
        let crc = crc32fast::hash(&out[..17]);
        out[17..].copy_from_slice(&crc.to_le_bytes());
        out
    }

    /// Decode a record; any size, version or checksum mismatch yields `None`.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != RECORD_LEN || bytes[0] != RECORD_VERSION {
            return None;
        }
        let stored_crc = u32::from_le_bytes(bytes[17..21].try_into().ok()?);
        if crc32fast::hash(&bytes[..17]) != stored_crc {
            return None;
        }
        Some(Self {
            measurement_count: i32::from_le_bytes(bytes[1..5].try_into().ok()?),
            first_measurement_time: u64::from_le_bytes(bytes[5..13].try_into().ok()?),
            calibrated_reference: f32::from_le_bytes(bytes[13..17].try_into().ok()?),
        })
    }
}

/// Flash-backed fallback for the retained store.
pub struct DurableBackup<'a> {
    flash: &'a mut dyn KeyValueFlash,
}

impl<'a> DurableBackup<'a> {
    pub fn new(flash: &'a mut dyn KeyValueFlash) -> Self {
        Self { flash }
    }

    /// Overwrite the backup with the current state.
    ///
    /// Failures are logged and otherwise ignored: the in-memory state stays
    /// authoritative for this cycle. Returns whether the write was verified.
    pub fn backup(&mut self, state: &RetainedState) -> bool {
        let record = BackupRecord::from_state(state);
        match set_verified(self.flash, BACKUP_KEY, &record.to_bytes()) {
            Ok(()) => {
                info!(
                    "Backed up to flash: reference {:.2}, {} measurements",
                    record.calibrated_reference, record.measurement_count
                );
                true
            }
            Err(e) => {
                error!("Failed to back up retained state: {}", e);
                false
            }
        }
    }

    /// Read the backup back. Absence, I/O errors and corrupt data all
    /// produce `None`.
    pub fn restore(&mut self) -> Option<BackupRecord> {
        let bytes = match self.flash.get(BACKUP_KEY) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!("No backup record in flash");
                return None;
            }
            Err(e) => {
                error!("Failed to read backup record: {}", e);
                return None;
            }
        };

        let record = BackupRecord::from_bytes(&bytes);
        if record.is_none() {
            warn!("Backup record is corrupt ({} bytes)", bytes.len());
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{RetainedStore, StoreLimits};
    use crate::testing::MemoryFlash;

    fn state_with(count: i32, first: u64, reference: f32) -> RetainedState {
        let mut state = RetainedState::ZEROED;
        RetainedStore::new(&mut state, StoreLimits::new(10, 15_000.0))
            .update(4, count, first, reference);
        state
    }

    #[test]
    fn test_backup_then_restore() {
        let mut flash = MemoryFlash::new();
        let mut backup = DurableBackup::new(&mut flash);

        assert!(backup.backup(&state_with(3, 5_000_000, 14_250.0)));
        let record = backup.restore().unwrap();

        assert_eq!(record.measurement_count, 3);
        assert_eq!(record.first_measurement_time, 5_000_000);
        assert_eq!(record.calibrated_reference, 14_250.0);
    }

    #[test]
    fn test_backup_overwrites_previous() {
        let mut flash = MemoryFlash::new();
        let mut backup = DurableBackup::new(&mut flash);

        backup.backup(&state_with(3, 1, 14_000.0));
        backup.backup(&state_with(0, 0, 16_000.0));

        assert_eq!(backup.restore().unwrap().calibrated_reference, 16_000.0);
    }

    #[test]
    fn test_restore_missing_is_none() {
        let mut flash = MemoryFlash::new();
        assert!(DurableBackup::new(&mut flash).restore().is_none());
    }

    #[test]
    fn test_restore_read_error_is_none() {
        let mut flash = MemoryFlash::new();
        DurableBackup::new(&mut flash).backup(&state_with(1, 1, 1.0));
        flash.fail_reads = true;
        assert!(DurableBackup::new(&mut flash).restore().is_none());
    }

    #[test]
    fn test_restore_corrupt_is_none() {
        let mut flash = MemoryFlash::new();
        let mut bytes = BackupRecord::from_state(&state_with(2, 2, 2.0)).to_bytes();
        bytes[6] ^= 0x40;
        flash.set(BACKUP_KEY, &bytes).unwrap();
        assert!(DurableBackup::new(&mut flash).restore().is_none());

        flash.set(BACKUP_KEY, &[RECORD_VERSION, 0, 0]).unwrap();
        assert!(DurableBackup::new(&mut flash).restore().is_none());
    }

    #[test]
    fn test_backup_write_failure_is_not_fatal() {
        let mut flash = MemoryFlash::new();
        flash.fail_writes = true;
        let mut backup = DurableBackup::new(&mut flash);
        assert!(!backup.backup(&state_with(1, 1, 1.0)));
    }

    #[test]
    fn test_record_rejects_unknown_version() {
        let mut bytes = BackupRecord::from_state(&state_with(2, 2, 2.0)).to_bytes();
        bytes[0] = RECORD_VERSION + 1;
        assert!(BackupRecord::from_bytes(&bytes).is_none());
    }
}
