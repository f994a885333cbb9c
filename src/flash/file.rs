//! File-backed flash for host (development) builds.
//!
//! Each namespace is a directory and each key a file inside it. Uses
//! `~/.thermonode/<namespace>/` by default.

use super::{FlashError, KeyValueFlash};
use std::fs;
use std::io;
use std::path::PathBuf;

/// Directory-per-namespace key/value store.
pub struct FileFlash {
    dir: PathBuf,
}

impl FileFlash {
    /// Open a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.bin", key))
    }
}

/// Root directory for host-side node state.
///
/// Returns `~/.thermonode`
pub fn default_root() -> io::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
    Ok(PathBuf::from(home).join(".thermonode"))
}

impl KeyValueFlash for FileFlash {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, FlashError> {
        match fs::read(self.key_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("No value for '{}' in {:?}", key, self.dir);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), FlashError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.key_path(key), value)?;
        Ok(())
    }
}
