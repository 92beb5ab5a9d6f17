//! The persisted gallery ("model file").
//!
//! A bincode-encoded [`Gallery`]. Every write holds an exclusive lock on
//! `<model_file>.lock` and replaces the file by write-to-temp + rename, so a
//! reader sees either the old gallery or the new one, never a torn file, and
//! concurrent appends are serialized instead of lost.

use crate::lock::FileLock;
use crate::StoreError;
use rollcall_core::{Embedding, Gallery};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Handle to the gallery file on disk.
#[derive(Debug, Clone)]
pub struct ModelStore {
    path: PathBuf,
}

impl ModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn lock_path(&self) -> PathBuf {
        sibling(&self.path, "lock")
    }

    fn lock(&self) -> Result<FileLock, StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(FileLock::exclusive(&self.lock_path())?)
    }

    /// Load the gallery. A missing file is [`StoreError::ModelMissing`].
    pub fn load(&self) -> Result<Gallery, StoreError> {
        let file = File::open(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::ModelMissing(self.path.clone()),
            _ => StoreError::Io(e),
        })?;
        let gallery: Gallery = bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", self.path.display())))?;
        gallery
            .validate()
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", self.path.display())))?;

        tracing::debug!(path = %self.path.display(), entries = gallery.len(), "gallery loaded");
        Ok(gallery)
    }

    /// Create an empty gallery file if none exists yet.
    pub fn ensure_exists(&self) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        if !self.path.exists() {
            self.write_atomic(&Gallery::new())?;
            tracing::info!(path = %self.path.display(), "created empty gallery");
        }
        Ok(())
    }

    /// Replace the whole gallery with the one `build` returns.
    ///
    /// The lock is held while `build` runs, so an [`append`](Self::append)
    /// from another process waits and then lands on top of the new gallery
    /// instead of being overwritten by it. If `build` fails the file is left
    /// untouched.
    pub fn rebuild<E>(&self, build: impl FnOnce() -> Result<Gallery, E>) -> Result<usize, E>
    where
        E: From<StoreError>,
    {
        let _guard = self.lock()?;
        let gallery = build()?;
        self.write_atomic(&gallery)?;
        tracing::info!(path = %self.path.display(), entries = gallery.len(), "gallery rebuilt");
        Ok(gallery.len())
    }

    /// Append one entry under the lock and return the new entry count.
    pub fn append(&self, name: &str, embedding: &Embedding) -> Result<usize, StoreError> {
        let _guard = self.lock()?;
        let mut gallery = match self.load() {
            Ok(g) => g,
            Err(StoreError::ModelMissing(_)) => Gallery::new(),
            Err(e) => return Err(e),
        };
        gallery.push(name, embedding);
        self.write_atomic(&gallery)?;
        tracing::info!(name, entries = gallery.len(), "gallery entry appended");
        Ok(gallery.len())
    }

    /// Caller must hold the lock.
    fn write_atomic(&self, gallery: &Gallery) -> Result<(), StoreError> {
        let tmp = sibling(&self.path, "tmp");
        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            bincode::serialize_into(&mut writer, gallery)
                .map_err(|e| StoreError::Encode(e.to_string()))?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// `gallery.bin` → `gallery.bin.<ext>`
fn sibling(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(ext);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("gallery.bin"));
        assert!(matches!(store.load(), Err(StoreError::ModelMissing(_))));
    }

    #[test]
    fn test_ensure_exists_creates_empty_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("gallery.bin"));
        store.ensure_exists().unwrap();
        assert!(store.load().unwrap().is_empty());

        store.append("alice", &emb(&[1.0])).unwrap();
        store.ensure_exists().unwrap();
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn test_roundtrip_is_bit_exact() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("gallery.bin"));

        let tricky = vec![0.1f32, -0.0, f32::MIN_POSITIVE, 1.0 / 3.0, f32::MAX, -7.25e-12];
        let mut gallery = Gallery::new();
        gallery.push("alice", &emb(&tricky));
        gallery.push("bob", &emb(&[0.5, 0.25]));
        store.rebuild(|| Ok::<_, StoreError>(gallery.clone())).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.names(), gallery.names());
        let bits = |v: &[f32]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&loaded.embeddings()[0]), bits(&tricky));
        assert_eq!(loaded, gallery);
    }

    #[test]
    fn test_append_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("nested/gallery.bin"));
        assert_eq!(store.append("alice", &emb(&[1.0, 0.0])).unwrap(), 1);
        assert_eq!(store.append("bob", &emb(&[0.0, 1.0])).unwrap(), 2);

        let g = store.load().unwrap();
        assert_eq!(g.names(), &["alice".to_string(), "bob".to_string()]);
        assert_eq!(g.embeddings()[1], vec![0.0, 1.0]);
    }

    #[test]
    fn test_rebuild_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("gallery.bin"));
        store.append("stale", &emb(&[9.0])).unwrap();

        let count = store
            .rebuild(|| {
                let mut fresh = Gallery::new();
                fresh.push("fresh", &emb(&[1.0]));
                Ok::<_, StoreError>(fresh)
            })
            .unwrap();
        assert_eq!(count, 1);

        assert_eq!(store.load().unwrap().names(), &["fresh".to_string()]);
        assert!(!sibling(store.path(), "tmp").exists());
    }

    #[test]
    fn test_failed_rebuild_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("gallery.bin"));
        store.append("alice", &emb(&[1.0])).unwrap();

        let err = store
            .rebuild(|| Err::<Gallery, _>(StoreError::Encode("boom".into())))
            .unwrap_err();
        assert!(matches!(err, StoreError::Encode(_)));
        assert_eq!(store.load().unwrap().names(), &["alice".to_string()]);
    }

    #[test]
    fn test_append_during_rebuild_survives() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.bin");
        let store = ModelStore::new(&path);

        let mut late = None;
        store
            .rebuild(|| {
                let other = ModelStore::new(&path);
                late = Some(std::thread::spawn(move || other.append("late", &emb(&[2.0])).unwrap()));
                // The appender must still be waiting on the lock.
                std::thread::sleep(std::time::Duration::from_millis(100));
                assert!(!late.as_ref().unwrap().is_finished());

                let mut g = Gallery::new();
                g.push("rebuilt", &emb(&[1.0]));
                Ok::<_, StoreError>(g)
            })
            .unwrap();
        late.unwrap().join().unwrap();

        let g = store.load().unwrap();
        assert_eq!(g.names(), &["rebuilt".to_string(), "late".to_string()]);
    }

    #[test]
    fn test_corrupt_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.bin");
        std::fs::write(&path, b"\xff\xff\xff\xff\xff\xff\xff\xff\x01").unwrap();
        assert!(matches!(ModelStore::new(&path).load(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_concurrent_appends_all_survive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.bin");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = ModelStore::new(&path);
                std::thread::spawn(move || {
                    store.append(&format!("p{i}"), &emb(&[i as f32])).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let g = ModelStore::new(&path).load().unwrap();
        assert_eq!(g.len(), 8);
        for i in 0..8 {
            assert!(g.contains(&format!("p{i}")));
        }
    }

    #[test]
    fn test_sibling_paths() {
        assert_eq!(sibling(Path::new("/a/gallery.bin"), "lock"), PathBuf::from("/a/gallery.bin.lock"));
    }
}
