//! File-backed firmware image writer.
//!
//! The image is written to a staging file; `commit` renames it over the
//! target path, `abort` deletes it.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tb_device::{FlashError, FlashResult, FlashWriter};

#[derive(Debug)]
pub struct FileFlash {
    staging: PathBuf,
    target: PathBuf,
    open: Option<OpenImage>,
}

#[derive(Debug)]
struct OpenImage {
    file: File,
    expected: u64,
    written: u64,
}

impl FileFlash {
    pub fn new(staging: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            staging: staging.into(),
            target: target.into(),
            open: None,
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    fn remove_staging(&self) {
        match fs::remove_file(&self.staging) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.staging.display(), error = %e, "cannot remove staging file"),
        }
    }
}

impl FlashWriter for FileFlash {
    fn open(&mut self, size: u64) -> FlashResult<()> {
        self.abort();
        if let Some(parent) = self.staging.parent() {
            fs::create_dir_all(parent).map_err(|e| FlashError::Open(e.to_string()))?;
        }
        let file = File::create(&self.staging).map_err(|e| FlashError::Open(e.to_string()))?;
        // Reserve the full image up front so a full disk fails here.
        file.set_len(size)
            .map_err(|e| FlashError::Open(e.to_string()))?;
        tracing::info!(path = %self.staging.display(), size, "staging firmware image");
        self.open = Some(OpenImage {
            file,
            expected: size,
            written: 0,
        });
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> FlashResult<usize> {
        let image = self.open.as_mut().ok_or(FlashError::NotOpen)?;
        image
            .file
            .write_all(data)
            .map_err(|e| FlashError::Write(e.to_string()))?;
        image.written += data.len() as u64;
        Ok(data.len())
    }

    fn commit(&mut self) -> FlashResult<()> {
        let image = self.open.take().ok_or(FlashError::NotOpen)?;
        if image.written != image.expected {
            self.remove_staging();
            return Err(FlashError::Commit(format!(
                "wrote {} of {} bytes",
                image.written, image.expected
            )));
        }
        image
            .file
            .sync_all()
            .map_err(|e| FlashError::Commit(e.to_string()))?;
        drop(image);
        fs::rename(&self.staging, &self.target).map_err(|e| FlashError::Commit(e.to_string()))?;
        tracing::info!(path = %self.target.display(), "firmware image installed");
        Ok(())
    }

    fn abort(&mut self) {
        if self.open.take().is_some() {
            tracing::info!("discarding staged firmware image");
        }
        self.remove_staging();
    }
}
