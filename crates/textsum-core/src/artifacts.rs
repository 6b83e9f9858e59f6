//! Artifact Store: stage-keyed registry of filesystem artifacts
//!
//! Stages publish their output with [`ArtifactStore::put`] and downstream
//! stages look it up with [`ArtifactStore::get`]. The filesystem store keeps
//! its index in `<root>/artifacts.json` so a later process (a re-run, the
//! prediction service) sees what earlier runs produced.

use crate::data_model::ArtifactRef;
use chrono::Utc;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use walkdir::WalkDir;

pub trait ArtifactStore: Send + Sync {
    /// Conventional directory owned by `stage`
    fn stage_dir(&self, stage: &str) -> PathBuf;

    /// Registers `path` as the artifact of `stage`. The path must exist.
    fn put(&self, stage: &str, path: &Path) -> io::Result<ArtifactRef>;

    /// Artifact registered by `stage`, if it is still present on disk.
    fn get(&self, stage: &str) -> Option<ArtifactRef>;
}

pub struct FsArtifactStore {
    root: PathBuf,
    index: Mutex<BTreeMap<String, ArtifactRef>>,
}

impl FsArtifactStore {
    pub const INDEX_FILE: &'static str = "artifacts.json";

    /// Opens (or starts) the store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let index_path = root.join(Self::INDEX_FILE);
        let index = match std::fs::read(&index_path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e),
        };
        Ok(Self {
            root,
            index: Mutex::new(index),
        })
    }

    fn persist(&self, index: &BTreeMap<String, ArtifactRef>) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(index)?;
        std::fs::write(self.root.join(Self::INDEX_FILE), json)
    }
}

impl ArtifactStore for FsArtifactStore {
    fn stage_dir(&self, stage: &str) -> PathBuf {
        self.root.join(stage)
    }

    fn put(&self, stage: &str, path: &Path) -> io::Result<ArtifactRef> {
        if !path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("artifact path does not exist: {}", path.display()),
            ));
        }

        let artifact = ArtifactRef {
            stage: stage.to_string(),
            path: path.to_path_buf(),
            fingerprint: fingerprint(path)?,
            produced_at: Utc::now(),
        };

        let mut index = self
            .index
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "artifact index poisoned"))?;
        index.insert(stage.to_string(), artifact.clone());
        self.persist(&index)?;

        tracing::debug!(stage, path = %path.display(), fingerprint = %artifact.fingerprint, "artifact registered");
        Ok(artifact)
    }

    fn get(&self, stage: &str) -> Option<ArtifactRef> {
        let index = self.index.lock().ok()?;
        index.get(stage).filter(|a| a.path.exists()).cloned()
    }
}

/// blake3 over every file below `path` (relative name + contents), in
/// sorted order so the result does not depend on directory iteration.
pub fn fingerprint(path: &Path) -> io::Result<String> {
    let mut hasher = blake3::Hasher::new();
    if path.is_file() {
        hasher.update(&std::fs::read(path)?);
    } else {
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(path).unwrap_or(entry.path());
            hasher.update(rel.to_string_lossy().as_bytes());
            hasher.update(&std::fs::read(entry.path())?);
        }
    }
    Ok(format!("blake3:{}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_then_get() {
        let temp = TempDir::new().unwrap();
        let store = FsArtifactStore::open(temp.path().join("artifacts")).unwrap();
        let dir = store.stage_dir("data_ingestion");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("train.csv"), "id,dialogue,summary\n").unwrap();

        let artifact = store.put("data_ingestion", &dir).unwrap();
        assert_eq!(artifact.stage, "data_ingestion");
        assert!(artifact.fingerprint.starts_with("blake3:"));
        assert_eq!(store.get("data_ingestion").unwrap().path, dir);
        assert!(store.get("model_trainer").is_none());
    }

    #[test]
    fn test_index_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("artifacts");
        let file = temp.path().join("status.txt");
        std::fs::write(&file, "Validation status: True").unwrap();

        FsArtifactStore::open(&root)
            .unwrap()
            .put("data_validation", &file)
            .unwrap();

        let reopened = FsArtifactStore::open(&root).unwrap();
        assert_eq!(reopened.get("data_validation").unwrap().path, file);
    }

    #[test]
    fn test_put_missing_path_fails() {
        let temp = TempDir::new().unwrap();
        let store = FsArtifactStore::open(temp.path()).unwrap();
        let err = store.put("x", &temp.path().join("nope")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_get_ignores_deleted_artifact() {
        let temp = TempDir::new().unwrap();
        let store = FsArtifactStore::open(temp.path().join("a")).unwrap();
        let file = temp.path().join("metrics.csv");
        std::fs::write(&file, "rouge1\n0.5\n").unwrap();
        store.put("model_evaluation", &file).unwrap();

        std::fs::remove_file(&file).unwrap();
        assert!(store.get("model_evaluation").is_none());
    }

    #[test]
    fn test_fingerprint_tracks_contents() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.txt"), "one").unwrap();
        let first = fingerprint(temp.path()).unwrap();
        assert_eq!(first, fingerprint(temp.path()).unwrap());

        std::fs::write(temp.path().join("a.txt"), "two").unwrap();
        assert_ne!(first, fingerprint(temp.path()).unwrap());
    }
}
