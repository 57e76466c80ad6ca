//! Filesystem helpers for artifact output.
//!
//! Artifacts are replaced atomically so a daemon never reads a half-written
//! flagfile, and a node's artifacts are written as one batch that can be
//! rolled back.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Replace `path` with `contents` through a temporary file in the same
/// directory.
///
/// # Errors
///
/// Propagates any I/O error; the target is untouched on failure.
///
/// # Examples
///
/// ```
/// use ipmeshd::util::write_atomic;
///
/// let dir = tempfile::tempdir().expect("create tempdir");
/// let path = dir.path().join("openr.cfg");
/// write_atomic(&path, b"--verbosity=1\n").expect("write");
/// assert_eq!(std::fs::read(&path).expect("read"), b"--verbosity=1\n");
/// ```
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Writes belonging to one node, remembered so they can be undone.
#[derive(Debug, Default)]
pub struct ArtifactBatch {
    written: Vec<(PathBuf, Option<Vec<u8>>)>,
}

impl ArtifactBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically write one artifact, creating parent directories.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors. Earlier writes of the batch stay in place
    /// until [`ArtifactBatch::rollback`] is called.
    pub fn write(&mut self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let previous = match fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_atomic(path, contents)?;
        self.written.push((path.to_path_buf(), previous));
        Ok(())
    }

    /// Restore every file touched by the batch, newest first.
    pub fn rollback(self) {
        for (path, previous) in self.written.into_iter().rev() {
            let restored = match previous {
                Some(bytes) => write_atomic(&path, &bytes),
                None => fs::remove_file(&path),
            };
            if let Err(e) = restored {
                tracing::warn!(path = %path.display(), error = %e, "artifact rollback failed");
            }
        }
    }

    /// Keep every write and return the paths in write order.
    #[must_use]
    pub fn commit(self) -> Vec<PathBuf> {
        self.written.into_iter().map(|(path, _)| path).collect()
    }
}
