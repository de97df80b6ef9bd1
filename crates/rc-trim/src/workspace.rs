//! Temp/backup path management and the atomic swap.
//!
//! A [`TrimWorkspace`] owns the temporary output of one trim. Dropping it
//! before [`swap`](TrimWorkspace::swap) deletes the temporary file, so a
//! failed copy never leaves partial output next to the source.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use rc_core::config::TrimConfig;
use rc_core::{Error, Result, SwapStage};
use rc_media::FileSystem;

/// Paths and cleanup for one trim of `source`.
pub struct TrimWorkspace<'a> {
    fs: &'a dyn FileSystem,
    source: PathBuf,
    temp: PathBuf,
    backup: PathBuf,
    /// Cleared once the temp file has been promoted or deliberately kept.
    owns_temp: bool,
}

impl<'a> TrimWorkspace<'a> {
    /// Compute temp and backup paths for `source`. Touches nothing on disk.
    pub fn new(fs: &'a dyn FileSystem, source: &Path, config: &TrimConfig) -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        Self {
            fs,
            source: source.to_path_buf(),
            temp: temp_path(source, config.temp_infix(), millis),
            backup: backup_path(source, config.backup_suffix()),
            owns_temp: true,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Where the trimmed output is written before the swap.
    pub fn temp(&self) -> &Path {
        &self.temp
    }

    /// Where the original is parked during the swap.
    pub fn backup(&self) -> &Path {
        &self.backup
    }

    /// Check that the output exists and is larger than `min_bytes`.
    /// Returns its size.
    pub fn validate_output(&self, min_bytes: u64) -> Result<u64> {
        if !self.fs.exists(&self.temp) {
            return Err(Error::OutputValidation {
                path: self.temp.clone(),
                reason: "output file was not created".into(),
            });
        }
        let size = self.fs.file_size(&self.temp)?;
        if size <= min_bytes {
            return Err(Error::OutputValidation {
                path: self.temp.clone(),
                reason: format!("output is {size} bytes, expected more than {min_bytes}"),
            });
        }
        Ok(size)
    }

    /// Replace the source with the temp file: source → backup, temp →
    /// source, then delete the backup.
    ///
    /// If the second rename fails the backup is moved back. Only when that
    /// also fails is the original left away from its path, reported as
    /// [`Error::SwapUnrecoverable`].
    pub fn swap(mut self) -> Result<()> {
        if let Err(e) = self.fs.rename(&self.source, &self.backup) {
            tracing::warn!(
                source = %self.source.display(),
                backup = %self.backup.display(),
                error = %e,
                "Could not move original aside; leaving it untouched"
            );
            return Err(Error::Swap {
                stage: SwapStage::Backup,
                source: e,
            });
        }

        if let Err(promote_err) = self.fs.rename(&self.temp, &self.source) {
            return Err(self.restore(promote_err));
        }
        self.owns_temp = false;

        if let Err(e) = self.fs.remove_file(&self.backup) {
            tracing::warn!(
                backup = %self.backup.display(),
                error = %e,
                "Trim succeeded but the backup could not be deleted"
            );
        }
        Ok(())
    }

    fn restore(&mut self, promote_err: io::Error) -> Error {
        match self.fs.rename(&self.backup, &self.source) {
            Ok(()) => {
                tracing::warn!(
                    source = %self.source.display(),
                    error = %promote_err,
                    "Could not promote trimmed output; original restored"
                );
                Error::Swap {
                    stage: SwapStage::Promote,
                    source: promote_err,
                }
            }
            Err(restore_err) => {
                // Keep both files for manual recovery.
                self.owns_temp = false;
                tracing::error!(
                    source = %self.source.display(),
                    backup = %self.backup.display(),
                    trimmed = %self.temp.display(),
                    promote_error = %promote_err,
                    restore_error = %restore_err,
                    "Original is only available at its backup path"
                );
                Error::SwapUnrecoverable {
                    original: self.source.clone(),
                    backup: self.backup.clone(),
                    source: restore_err,
                }
            }
        }
    }

    fn discard_temp(&self) {
        if !self.fs.exists(&self.temp) {
            return;
        }
        match self.fs.remove_file(&self.temp) {
            Ok(()) => tracing::debug!(temp = %self.temp.display(), "Removed partial output"),
            Err(e) => tracing::warn!(
                temp = %self.temp.display(),
                error = %e,
                "Failed to remove partial output"
            ),
        }
    }
}

impl Drop for TrimWorkspace<'_> {
    fn drop(&mut self) {
        if self.owns_temp {
            self.discard_temp();
        }
    }
}

/// `<dir>/<stem><infix><millis><.ext>`, with `.mp4` when the source has no
/// extension.
pub fn temp_path(source: &Path, infix: &str, millis: i64) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    let ext = source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_else(|| ".mp4".to_string());
    let name = format!("{stem}{infix}{millis}{ext}");
    match source.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// `source` with `suffix` appended to the full file name.
pub fn backup_path(source: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(source.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
