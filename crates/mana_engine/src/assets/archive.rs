//! Sources of bundle files
//!
//! The importer reads every file through an [`Archive`], so bundles can come
//! from a directory on disk or from memory.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use super::AssetError;

/// Read-only file source addressed by `/` separated relative paths
pub trait Archive: Send + Sync {
    /// Open a file for reading
    ///
    /// # Errors
    ///
    /// `NotFound` when the archive has no file at `path`.
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>, AssetError>;

    /// Whether the archive has a file at `path`
    fn exists(&self, path: &str) -> bool;

    /// Read a whole file
    fn read(&self, path: &str) -> Result<Vec<u8>, AssetError> {
        let mut bytes = Vec::new();
        self.open(path)?.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

/// Files below a root directory
#[derive(Debug, Clone)]
pub struct DirectoryArchive {
    root: PathBuf,
}

impl DirectoryArchive {
    /// Archive rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of `path`, `None` if it would leave the root
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
        (!escapes && !path.is_empty()).then(|| self.root.join(relative))
    }
}

impl Archive for DirectoryArchive {
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>, AssetError> {
        let full = self
            .resolve(path)
            .ok_or_else(|| AssetError::NotFound(format!("{path} (outside archive root)")))?;
        if !full.is_file() {
            return Err(AssetError::NotFound(path.to_string()));
        }
        Ok(Box::new(File::open(full)?))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_some_and(|full| full.is_file())
    }
}

/// Files held in memory
#[derive(Debug, Default)]
pub struct MemoryArchive {
    files: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl MemoryArchive {
    /// Empty archive
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file
    pub fn insert(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.write().insert(path.into(), Arc::from(bytes.into()));
    }

    /// Builder form of [`insert`](Self::insert)
    #[must_use]
    pub fn with_file(self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(path, bytes);
        self
    }

    /// Remove a file, returning whether it existed
    pub fn remove(&self, path: &str) -> bool {
        self.files.write().remove(path).is_some()
    }
}

impl Archive for MemoryArchive {
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>, AssetError> {
        let bytes = self
            .files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(path.to_string()))?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn exists(&self, path: &str) -> bool {
        self.files.read().contains_key(path)
    }
}
