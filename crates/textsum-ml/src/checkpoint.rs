//! Pretrained checkpoint resolution: local directory, local cache, then remote hub.

use crate::error::{MlError, MlResult};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub trait CheckpointProvider: Send + Sync {
    /// Local directory holding `files` for checkpoint `id`, fetching them
    /// when they are not available locally.
    fn resolve(&self, id: &str, files: &[&str]) -> MlResult<PathBuf>;
}

/// Hub-style provider: `<endpoint>/<id>/resolve/main/<file>`, cached under
/// `<cache_dir>/<id with '/' replaced by "--">`.
#[derive(Debug, Clone)]
pub struct HubCheckpointProvider {
    cache_dir: PathBuf,
    endpoint: String,
    timeout: Duration,
}

impl HubCheckpointProvider {
    pub fn new(cache_dir: impl Into<PathBuf>, endpoint: impl Into<String>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cache_dir_for(&self, id: &str) -> PathBuf {
        self.cache_dir.join(id.replace('/', "--"))
    }

    fn file_url(&self, id: &str, file: &str) -> String {
        format!("{}/{}/resolve/main/{}", self.endpoint.trim_end_matches('/'), id, file)
    }

    fn download(&self, id: &str, files: &[&str], target: &Path) -> MlResult<()> {
        std::fs::create_dir_all(target)?;
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;

        for file in files {
            let dest = target.join(file);
            if dest.exists() {
                continue;
            }
            let url = self.file_url(id, file);
            info!(%url, "downloading checkpoint file");
            let bytes = client.get(&url).send()?.error_for_status()?.bytes()?;
            // write to a temp name first so an interrupted download is not mistaken for a cached file
            let partial = target.join(format!("{file}.partial"));
            std::fs::write(&partial, &bytes)?;
            std::fs::rename(&partial, &dest)?;
        }
        Ok(())
    }
}

impl CheckpointProvider for HubCheckpointProvider {
    fn resolve(&self, id: &str, files: &[&str]) -> MlResult<PathBuf> {
        if id.trim().is_empty() {
            return Err(MlError::Checkpoint("empty checkpoint id".to_string()));
        }

        let local = Path::new(id);
        if local.is_dir() {
            return Ok(local.to_path_buf());
        }

        let cached = self.cache_dir_for(id);
        if files.iter().all(|f| cached.join(f).exists()) {
            info!(checkpoint = id, path = %cached.display(), "using cached checkpoint");
            return Ok(cached);
        }

        self.download(id, files, &cached)
            .map_err(|e| MlError::Checkpoint(format!("failed to fetch {id}: {e}")))?;
        Ok(cached)
    }
}
