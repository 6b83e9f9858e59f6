//! Small filesystem helpers shared by the configuration layer and the stages.

use std::path::Path;
use textsum_core::{TextsumError, TextsumResult};
use tracing::info;

/// Reads a YAML document. Empty or comment-only documents are rejected.
pub fn read_yaml(path: &Path) -> TextsumResult<serde_yaml::Value> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| TextsumError::ConfigParse(format!("failed to read {}: {}", path.display(), e)))?;
    let value = parse_yaml(&content)
        .map_err(|e| TextsumError::ConfigParse(format!("{}: {}", path.display(), e)))?;
    info!("yaml file: {} loaded successfully", path.display());
    Ok(value)
}

pub(crate) fn parse_yaml(content: &str) -> Result<serde_yaml::Value, String> {
    if content.trim().is_empty() {
        return Err("yaml file is empty".to_string());
    }
    let value: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| format!("malformed yaml: {e}"))?;
    if value.is_null() {
        return Err("yaml file is empty".to_string());
    }
    Ok(value)
}

pub fn create_directories<P: AsRef<Path>>(paths: &[P]) -> TextsumResult<()> {
    for path in paths {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        info!("created directory at: {}", path.display());
    }
    Ok(())
}

/// File size in whole kilobytes, e.g. `~ 7 KB`.
pub fn get_size(path: &Path) -> TextsumResult<String> {
    let bytes = std::fs::metadata(path)?.len();
    Ok(format!("~ {} KB", (bytes as f64 / 1024.0).round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_yaml_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty.yaml");
        std::fs::write(&path, "# nothing here\n").unwrap();

        let err = read_yaml(&path).unwrap_err();
        assert!(matches!(err, TextsumError::ConfigParse(_)));
        assert!(err.to_string().contains("yaml file is empty"));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = read_yaml(Path::new("/nonexistent/config.yaml")).unwrap_err();
        assert!(matches!(err, TextsumError::ConfigParse(_)));
    }

    #[test]
    fn test_create_directories_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let dirs = [temp.path().join("a/b"), temp.path().join("c")];
        create_directories(&dirs).unwrap();
        create_directories(&dirs).unwrap();
        assert!(dirs.iter().all(|d| d.is_dir()));
    }

    #[test]
    fn test_get_size_rounds_to_kb() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data.zip");
        std::fs::write(&path, vec![0u8; 2600]).unwrap();
        assert_eq!(get_size(&path).unwrap(), "~ 3 KB");
    }
}
