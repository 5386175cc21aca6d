// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic-rename persistence for the single `State` document: serialize,
//! write to a temp file, fsync, rename over the target, fsync the
//! directory. The I/O is behind a trait so tests can observe/inject
//! failures without touching a real filesystem.

use crate::state::State;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to parse state file {path}: {source}")]
    Parse { path: PathBuf, #[source] source: serde_json::Error },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Abstracts the write-temp/fsync/rename/fsync-dir sequence so the save
/// path is unit-testable without touching a real filesystem.
pub trait StateWriter: Send + Sync {
    fn write_tmp(&self, tmp_path: &Path, bytes: &[u8]) -> std::io::Result<()>;
    fn fsync_file(&self, path: &Path) -> std::io::Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()>;
    fn fsync_dir(&self, dir: &Path) -> std::io::Result<()>;
    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>>;
    fn exists(&self, path: &Path) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct FsStateWriter;

impl StateWriter for FsStateWriter {
    fn write_tmp(&self, tmp_path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = std::fs::File::create(tmp_path)?;
        file.write_all(bytes)?;
        file.flush()
    }

    fn fsync_file(&self, path: &Path) -> std::io::Result<()> {
        std::fs::File::open(path)?.sync_all()
    }

    fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        std::fs::rename(from, to)
    }

    fn fsync_dir(&self, dir: &Path) -> std::io::Result<()> {
        // Not all platforms allow opening a directory as a File (Windows);
        // best-effort only, matching the teacher's checkpoint writer.
        if let Ok(dir_file) = std::fs::File::open(dir) {
            let _ = dir_file.sync_all();
        }
        Ok(())
    }

    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Serializes `state`, writes it to `path.tmp`, fsyncs, renames over
/// `path`, then fsyncs the parent directory so the rename is durable.
pub fn save(writer: &dyn StateWriter, path: &Path, state: &State) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(state).map_err(StoreError::Serialize)?;
    let tmp_path = tmp_path_for(path);

    writer.write_tmp(&tmp_path, &bytes)?;
    writer.fsync_file(&tmp_path)?;
    writer.rename(&tmp_path, path)?;
    if let Some(parent) = path.parent() {
        writer.fsync_dir(parent)?;
    }
    Ok(())
}

/// Loads `State` from `path`. A missing file yields an empty `State`
/// (first run); a file that fails to parse also falls back to an empty
/// `State` rather than refusing to start, per component B's documented
/// failure mode — the temp-rename discipline means a partially written
/// file should never be observable, but defense in depth costs nothing.
pub fn load(writer: &dyn StateWriter, path: &Path) -> State {
    if !writer.exists(path) {
        return State::default();
    }
    match writer.read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
        Err(_) => State::default(),
    }
}

/// Tries to load strictly, surfacing parse errors instead of silently
/// falling back — used by diagnostics tooling that wants to know *why*
/// a state file didn't load.
pub fn load_strict(writer: &dyn StateWriter, path: &Path) -> Result<State, StoreError> {
    if !writer.exists(path) {
        return Ok(State::default());
    }
    let bytes = writer.read(path)?;
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Parse { path: path.to_path_buf(), source })
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
