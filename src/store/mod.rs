//! Persistent progress tracking.
//!
//! - [`retained`]: the checksummed record that survives deep sleep
//! - [`backup`]: its flash-resident fallback that survives power loss

mod backup;
mod retained;

pub use backup::{BackupRecord, DurableBackup, BACKUP_KEY, BACKUP_NAMESPACE};
pub use retained::{
    InitOutcome, NetworkSnapshot, RetainedState, RetainedStore, StoreLimits, IMAGE_LEN,
    PAYLOAD_LEN,
};
