//! Artifact storage seam.
//!
//! Every component that touches capture data or stage artifacts goes through
//! the `ArtifactStore` trait instead of a process-wide path registry. Two
//! backends ship: the local filesystem (production) and an in-memory map
//! (tests). An object-store backend would implement the same trait.
//!
//! Writes are all-or-nothing: `put` lands the full payload or nothing, so a
//! crash mid-stage never leaves a partial artifact behind.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context as _, Result};

pub trait ArtifactStore: Send + Sync {
    /// Read a whole object.
    fn get(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write a whole object, replacing any previous content. Must be atomic:
    /// readers never observe a partially-written object.
    fn put(&self, path: &Path, data: &[u8]) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;

    /// File names (not full paths) of the direct children of `dir`, sorted.
    fn list(&self, dir: &Path) -> Result<Vec<String>>;

    /// Create a directory and all of its parents. A no-op for backends
    /// without real directories.
    fn create_dir_all(&self, dir: &Path) -> Result<()>;

    /// Remove a directory tree if it exists.
    fn remove_tree(&self, dir: &Path) -> Result<()>;

    /// Remove a single object if it exists.
    fn remove(&self, path: &Path) -> Result<()>;
}

// ----------------------------------------------------------------------------
// Local filesystem backend
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct LocalArtifactStore;

impl LocalArtifactStore {
    pub fn new() -> Self {
        Self
    }
}

impl ArtifactStore for LocalArtifactStore {
    fn get(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
    }

    fn put(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        // Write to a sibling temp file, then rename into place.
        let tmp = path.with_extension("tmp");
        {
            let mut file = std::fs::File::create(&tmp)
                .with_context(|| format!("failed to create {}", tmp.display()))?;
            file.write_all(data)
                .with_context(|| format!("failed to write {}", tmp.display()))?;
            file.sync_all().ok();
        }
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to move {} into place", tmp.display()))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list(&self, dir: &Path) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("failed to list {}", dir.display()))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn create_dir_all(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))
    }

    fn remove_tree(&self, dir: &Path) -> Result<()> {
        if dir.exists() {
            std::fs::remove_dir_all(dir)
                .with_context(|| format!("failed to remove {}", dir.display()))?;
        }
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// In-memory backend (tests)
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct InMemoryArtifactStore {
    objects: Arc<Mutex<BTreeMap<PathBuf, Vec<u8>>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, BTreeMap<PathBuf, Vec<u8>>> {
        self.objects.lock().expect("artifact store lock poisoned")
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn get(&self, path: &Path) -> Result<Vec<u8>> {
        self.locked()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("no such object: {}", path.display()))
    }

    fn put(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.locked().insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.locked().contains_key(path)
    }

    fn list(&self, dir: &Path) -> Result<Vec<String>> {
        let objects = self.locked();
        let mut names: Vec<String> = objects
            .keys()
            .filter_map(|key| key.strip_prefix(dir).ok())
            .filter_map(|rest| {
                let mut components = rest.components();
                let first = components.next()?;
                Some(first.as_os_str().to_string_lossy().into_owned())
            })
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn create_dir_all(&self, _dir: &Path) -> Result<()> {
        Ok(())
    }

    fn remove_tree(&self, dir: &Path) -> Result<()> {
        self.locked().retain(|key, _| !key.starts_with(dir));
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        self.locked().remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_round_trip_and_listing() {
        let store = InMemoryArtifactStore::new();
        let base = Path::new("/cache/dataset");
        store.put(&base.join("data.json"), b"{}").expect("put");
        store
            .put(&base.join("frames/cam01/000000.jpg"), b"jpg")
            .expect("put");

        assert!(store.exists(&base.join("data.json")));
        assert_eq!(store.get(&base.join("data.json")).expect("get"), b"{}");

        let names = store.list(base).expect("list");
        assert_eq!(names, vec!["data.json", "frames"]);

        store.remove_tree(&base.join("frames")).expect("remove");
        assert!(!store.exists(&base.join("frames/cam01/000000.jpg")));
    }

    #[test]
    fn local_put_is_atomic_rename() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalArtifactStore::new();
        let path = dir.path().join("nested/bbox.json");

        store.put(&path, b"first").expect("put");
        assert_eq!(store.get(&path).expect("get"), b"first");

        store.put(&path, b"second").expect("overwrite");
        assert_eq!(store.get(&path).expect("get"), b"second");
        assert!(!path.with_extension("tmp").exists());
    }
}
