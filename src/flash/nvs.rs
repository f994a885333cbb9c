//! NVS-backed flash for ESP32.
//!
//! # Security
//!
//! Development builds do not encrypt NVS data; WiFi credentials stored here
//! are readable by anyone with physical access to the flash chip.

use super::{FlashError, KeyValueFlash};
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use esp_idf_sys::EspError;
use std::sync::OnceLock;

static DEFAULT_PARTITION: OnceLock<EspDefaultNvsPartition> = OnceLock::new();

/// Shared handle to the default NVS partition.
///
/// `EspNvsPartition::take()` may only succeed once per boot, so the handle is
/// cached and cloned. Safe to call multiple times.
pub fn default_partition() -> Result<EspDefaultNvsPartition, EspError> {
    if let Some(partition) = DEFAULT_PARTITION.get() {
        return Ok(partition.clone());
    }
    let partition = EspDefaultNvsPartition::take()?;
    Ok(DEFAULT_PARTITION.get_or_init(|| partition).clone())
}

/// One NVS namespace.
pub struct NvsFlash {
    nvs: EspNvs<NvsDefault>,
}

impl NvsFlash {
    /// Open (and create if needed) a namespace on the default partition.
    pub fn open(namespace: &str) -> Result<Self, EspError> {
        let nvs = EspNvs::new(default_partition()?, namespace, true)?;
        Ok(Self { nvs })
    }
}

impl KeyValueFlash for NvsFlash {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, FlashError> {
        let Some(len) = self.nvs.blob_len(key)? else {
            return Ok(None);
        };
        let mut buf = vec![0u8; len];
        let bytes = self.nvs.get_raw(key, &mut buf)?;
        Ok(bytes.map(|b| b.to_vec()))
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), FlashError> {
        self.nvs.set_raw(key, value)?;
        Ok(())
    }
}
