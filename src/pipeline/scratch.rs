//! # Scratch Files
//!
//! Temporary on-disk artifacts used while a run is in progress: the
//! materialized upload that the media toolkit reads from, and one encoder
//! output per segment.
//!
//! ## Ownership Rules:
//! - Every artifact is a [`ScratchFile`] guard owned by exactly one run or unit
//! - Dropping the guard deletes the file, so success, failure and
//!   cancellation all release it
//! - [`ScratchSpace`] counts live guards so leaks are observable

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Factory for scratch files, shared by every run of a pipeline.
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    dir: Option<PathBuf>,
    outstanding: Arc<AtomicUsize>,
}

impl Default for ScratchSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl ScratchSpace {
    /// Scratch files go to the system temporary directory.
    pub fn new() -> Self {
        Self {
            dir: None,
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Scratch files go to `dir`, which must already exist.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create an empty scratch file named `<prefix>XXXX<suffix>`.
    pub fn create(&self, prefix: &str, suffix: &str) -> std::io::Result<ScratchFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix).suffix(suffix);

        let file = match &self.dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        self.outstanding.fetch_add(1, Ordering::SeqCst);
        Ok(ScratchFile {
            file,
            outstanding: Arc::clone(&self.outstanding),
        })
    }

    /// Create a scratch file holding `bytes`.
    pub fn write(&self, prefix: &str, suffix: &str, bytes: &[u8]) -> std::io::Result<ScratchFile> {
        let mut scratch = self.create(prefix, suffix)?;
        scratch.file.write_all(bytes)?;
        scratch.file.flush()?;
        Ok(scratch)
    }

    /// Number of scratch files currently alive.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }
}

/// A temporary file deleted when the guard is dropped.
#[derive(Debug)]
pub struct ScratchFile {
    file: NamedTempFile,
    outstanding: Arc<AtomicUsize>,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        // NamedTempFile removes the file itself once this drop returns.
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_files_are_counted_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let space = ScratchSpace::in_dir(dir.path());

        let first = space.write("upload-", ".bin", b"abc").unwrap();
        let second = space.create("chunk-", ".mp3").unwrap();
        assert_eq!(space.outstanding(), 2);
        assert_eq!(std::fs::read(first.path()).unwrap(), b"abc");
        assert!(first.path().to_string_lossy().ends_with(".bin"));

        let first_path = first.path().to_path_buf();
        drop(first);
        assert!(!first_path.exists());
        assert_eq!(space.outstanding(), 1);

        drop(second);
        assert_eq!(space.outstanding(), 0);
    }

    #[test]
    fn test_clones_share_the_counter() {
        let space = ScratchSpace::new();
        let clone = space.clone();
        let file = clone.create("shared-", "").unwrap();
        assert_eq!(space.outstanding(), 1);
        drop(file);
        assert_eq!(space.outstanding(), 0);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let space = ScratchSpace::in_dir("/nonexistent/chunk-scribe-scratch");
        assert!(space.create("x-", "").is_err());
        assert_eq!(space.outstanding(), 0);
    }
}
