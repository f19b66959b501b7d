//! # ledger-storage
//!
//! The overlay key-value store (`Overlay`) and the `WorldTrie` wrapper that
//! binds an authenticated [`ledger_trie::Trie`] to it. This is the "Overlay
//! DB" and part of the "Authenticated Trie" layers from the engine's
//! layering (see the crate-level docs of `ledger-blockchain`).

pub mod backend;
pub mod error;
pub mod overlay;
pub mod world_trie;

pub use backend::{InMemoryBackend, RedbBackend, StoreBackend};
pub use error::StoreError;
pub use overlay::Overlay;
pub use world_trie::WorldTrie;

use std::path::Path;
use std::sync::Arc;

/// Opens (or creates) a durable `Overlay` at `path`.
///
/// An empty `path` selects a default location under the user's data
/// directory (`directories::ProjectDirs`). If `kill_existing` is set, any
/// existing database file at that location is removed first.
pub fn open_db(path: &str, kill_existing: bool) -> Result<Overlay, StoreError> {
    let path = resolve_path(path);
    if kill_existing && path.exists() {
        std::fs::remove_file(&path).map_err(|e| StoreError::Io(e.to_string()))?;
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
    }
    let backend = RedbBackend::open(&path)?;
    Ok(Overlay::new(Arc::new(backend)))
}

/// An `Overlay` with a purely in-memory backend — never touches disk. Used
/// by tests and by ephemeral per-call storage tries.
pub fn open_ephemeral() -> Overlay {
    Overlay::new(Arc::new(InMemoryBackend::new()))
}

fn resolve_path(path: &str) -> std::path::PathBuf {
    if !path.is_empty() {
        return Path::new(path).to_path_buf();
    }
    directories::ProjectDirs::from("dev", "ledger", "ledger")
        .map(|dirs| dirs.data_dir().join("overlay.redb"))
        .unwrap_or_else(|| Path::new("./ledger-data/overlay.redb").to_path_buf())
}
