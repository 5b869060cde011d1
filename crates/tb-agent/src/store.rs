//! JSON file implementation of the device config store.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tb_device::{ConfigStore, DeviceConfig, StoreResult};

/// Device document kept as a JSON file.
///
/// A missing or unreadable document is replaced by fail-safe defaults,
/// which are written back so the next load sees them. Saves go through a
/// temporary file and a rename, so a crash never leaves half a document.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
    fallback_name: String,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>, fallback_name: &str) -> Self {
        Self {
            path: path.into(),
            fallback_name: fallback_name.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reset(&self) -> StoreResult<DeviceConfig> {
        let config = DeviceConfig::fail_safe(self.fallback_name.as_str());
        self.save(&config)?;
        tracing::warn!(path = %self.path.display(), "device config reset to fail-safe defaults");
        Ok(config)
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> StoreResult<DeviceConfig> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return self.reset(),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "device config unreadable");
                self.reset()
            }
        }
    }

    fn save(&self, config: &DeviceConfig) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&serde_json::to_vec_pretty(config)?)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
