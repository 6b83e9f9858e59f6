//! Data ingestion: fetch the dataset archive and unpack it.

use crate::{ids, into_stage_error};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use textsum_config::{get_size, DataIngestionConfig};
use textsum_core::{ExecutionContext, Stage, StageError, StageResult};
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Remote(String),
    Local(PathBuf),
}

impl Source {
    fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.starts_with("http://") || raw.starts_with("https://") {
            Source::Remote(raw.to_string())
        } else if let Some(path) = raw.strip_prefix("file://") {
            Source::Local(PathBuf::from(path))
        } else {
            Source::Local(PathBuf::from(raw))
        }
    }
}

/// Relative output path for an archive entry, or `None` when the entry
/// would escape the extraction directory.
pub fn safe_entry_path(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

fn is_populated(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

pub struct DataIngestionStage {
    config: DataIngestionConfig,
}

impl DataIngestionStage {
    pub fn new(config: DataIngestionConfig) -> Self {
        Self { config }
    }

    /// Fetches the archive into `local_data_file`. Returns `false` when the
    /// file was already there.
    pub fn download_file(&self) -> Result<bool, StageError> {
        let target = &self.config.local_data_file;
        if target.exists() {
            info!("File already exists of size: {}", get_size(target).map_err(into_stage_error)?);
            return Ok(false);
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match Source::parse(&self.config.source_url) {
            Source::Remote(url) => {
                let response = reqwest::blocking::get(&url)
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| StageError::ExecutionFailed(format!("download of {url} failed: {e}")))?;
                let bytes = response
                    .bytes()
                    .map_err(|e| StageError::ExecutionFailed(format!("download of {url} failed: {e}")))?;
                let partial = target.with_extension("partial");
                std::fs::write(&partial, &bytes)?;
                std::fs::rename(&partial, target)?;
                info!("{} downloaded from {}", target.display(), url);
            }
            Source::Local(path) if path.is_file() => {
                std::fs::copy(&path, target)?;
                info!("{} copied from {}", target.display(), path.display());
            }
            Source::Local(path) => {
                return Err(StageError::MissingArtifact(format!(
                    "source archive not found: {}",
                    path.display()
                )))
            }
        }
        Ok(true)
    }

    /// Extracts `local_data_file` into `unzip_dir`. Entries are placed under
    /// `<dataset_name>/` unless the archive already uses that top-level folder.
    /// Returns `false` when the dataset directory was already populated.
    pub fn extract_zip_file(&self) -> Result<bool, StageError> {
        let dataset_dir = self.config.dataset_dir();
        if is_populated(&dataset_dir) {
            info!(path = %dataset_dir.display(), "dataset already extracted");
            return Ok(false);
        }

        let file = File::open(&self.config.local_data_file)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| StageError::ValidationFailed(format!("not a zip archive: {e}")))?;

        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive
                .by_index(i)
                .map_err(|e| StageError::ValidationFailed(format!("corrupt archive entry {i}: {e}")))?;
            let rel = safe_entry_path(entry.name()).ok_or_else(|| {
                StageError::ValidationFailed(format!("archive entry escapes target directory: {}", entry.name()))
            })?;
            entries.push((i, rel, entry.is_dir()));
        }

        let dataset_prefix = Path::new(&self.config.dataset_name);
        let base = if entries.iter().all(|(_, rel, _)| rel.starts_with(dataset_prefix)) {
            self.config.unzip_dir.clone()
        } else {
            dataset_dir.clone()
        };

        for (i, rel, is_dir) in entries {
            let out = base.join(&rel);
            if is_dir {
                std::fs::create_dir_all(&out)?;
                continue;
            }
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut entry = archive
                .by_index(i)
                .map_err(|e| StageError::ValidationFailed(format!("corrupt archive entry {i}: {e}")))?;
            let mut writer = File::create(&out)?;
            io::copy(&mut entry, &mut writer)?;
            writer.flush()?;
        }

        info!(path = %dataset_dir.display(), "archive extracted");
        Ok(true)
    }

    /// Copies a directory source into `<unzip_dir>/<dataset_name>`.
    fn copy_directory(&self, source: &Path) -> Result<bool, StageError> {
        let dataset_dir = self.config.dataset_dir();
        if is_populated(&dataset_dir) {
            info!(path = %dataset_dir.display(), "dataset already copied");
            return Ok(false);
        }
        for entry in WalkDir::new(source) {
            let entry = entry.map_err(|e| StageError::Io(io::Error::from(e)))?;
            let rel = entry.path().strip_prefix(source).unwrap_or(entry.path());
            let out = dataset_dir.join(rel);
            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&out)?;
            } else if entry.file_type().is_file() {
                std::fs::copy(entry.path(), &out)?;
            }
        }
        info!(from = %source.display(), to = %dataset_dir.display(), "dataset directory copied");
        Ok(true)
    }
}

impl Stage for DataIngestionStage {
    fn id(&self) -> &'static str {
        ids::DATA_INGESTION
    }

    fn name(&self) -> &'static str {
        "Data Ingestion Stage"
    }

    fn run(&self, ctx: &ExecutionContext) -> Result<StageResult, StageError> {
        std::fs::create_dir_all(&self.config.root_dir)?;

        let changed = match Source::parse(&self.config.source_url) {
            Source::Local(dir) if dir.is_dir() => self.copy_directory(&dir)?,
            _ => {
                let downloaded = self.download_file()?;
                let extracted = self.extract_zip_file()?;
                downloaded || extracted
            }
        };

        let dataset_dir = self.config.dataset_dir();
        if !dataset_dir.is_dir() {
            warn!(path = %dataset_dir.display(), "ingestion produced no dataset directory");
            return Err(StageError::MissingArtifact(format!(
                "dataset directory not produced: {}",
                dataset_dir.display()
            )));
        }
        let artifact = ctx.artifacts.put(self.id(), &dataset_dir)?;

        let message = format!("dataset available at {}", dataset_dir.display());
        Ok(if changed {
            StageResult::success(message, Some(artifact))
        } else {
            StageResult::skipped(message, Some(artifact))
        })
    }
}
