use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;

/// What a smart update did to the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// Content already matched; nothing was touched.
    Unchanged,
    /// The target did not exist.
    Created,
    /// The target was replaced. `backup` is `None` if saving the old bytes failed.
    Replaced { backup: Option<PathBuf> },
}

impl UpdateOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, UpdateOutcome::Unchanged)
    }

    pub fn label(&self) -> &'static str {
        match self {
            UpdateOutcome::Unchanged => "unchanged",
            UpdateOutcome::Created => "created",
            UpdateOutcome::Replaced { .. } => "replaced",
        }
    }
}

/// Errors from the read, stage or rename phases.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("{path} has no parent directory")]
    NoParent { path: PathBuf },

    #[error("failed to stage {path}: {source}")]
    Stage { path: PathBuf, source: io::Error },

    #[error("failed to set permissions on {path}: {source}")]
    Permissions { path: PathBuf, source: io::Error },

    #[error("failed to rename staged file onto {path}: {source}")]
    Commit { path: PathBuf, source: io::Error },

    #[error("failed to create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
}

/// `<path>.bak`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".bak");
    PathBuf::from(name)
}

/// A fully written, synced temp file next to its target, not yet visible.
#[derive(Debug)]
pub struct StagedFile {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedFile {
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Where the staged bytes live until commit.
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Atomically rename the staged file over the target.
    pub fn commit(self) -> Result<(), UpdateError> {
        let target = self.target;
        self.temp.persist(&target).map_err(|e| UpdateError::Commit {
            path: target.clone(),
            source: e.error,
        })?;
        Ok(())
    }
}

/// Write `content` to a temp file in the target's directory, set its mode and
/// flush it to disk. The target itself is not touched.
pub fn stage(path: &Path, content: &[u8], mode: u32) -> Result<StagedFile, UpdateError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => {
            return Err(UpdateError::NoParent {
                path: path.to_path_buf(),
            })
        }
    };
    let stage_err = |source| UpdateError::Stage {
        path: path.to_path_buf(),
        source,
    };

    let mut temp = NamedTempFile::new_in(dir).map_err(stage_err)?;
    temp.write_all(content).map_err(stage_err)?;
    set_mode(temp.as_file(), mode).map_err(|source| UpdateError::Permissions {
        path: path.to_path_buf(),
        source,
    })?;
    temp.as_file().sync_all().map_err(stage_err)?;

    Ok(StagedFile {
        temp,
        target: path.to_path_buf(),
    })
}

#[cfg(unix)]
fn set_mode(file: &fs::File, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_file: &fs::File, _mode: u32) -> io::Result<()> {
    Ok(())
}

/// Permission bits of an existing file.
#[cfg(unix)]
pub fn current_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).ok().map(|m| m.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
pub fn current_mode(_path: &Path) -> Option<u32> {
    None
}

/// Replace `path` with `content` unless it already holds exactly those bytes.
pub fn smart_update(path: &Path, content: &[u8], mode: u32) -> Result<UpdateOutcome, UpdateError> {
    let existing = match fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(source) => {
            return Err(UpdateError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if existing.as_deref() == Some(content) {
        tracing::debug!(path = ?path, "Content unchanged, skipping write");
        return Ok(UpdateOutcome::Unchanged);
    }

    let backup = existing.as_ref().and_then(|old| {
        let backup = backup_path(path);
        match fs::write(&backup, old) {
            Ok(()) => Some(backup),
            Err(e) => {
                tracing::warn!(path = ?backup, error = %e, "Failed to write backup, continuing");
                None
            }
        }
    });

    stage(path, content, mode)?.commit()?;

    Ok(match existing {
        Some(_) => UpdateOutcome::Replaced { backup },
        None => UpdateOutcome::Created,
    })
}

/// Create `path` and its parents, applying `mode` to directories this call creates.
pub fn ensure_dir(path: &Path, mode: u32) -> Result<(), UpdateError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    builder.create(path).map_err(|source| UpdateError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}
