//! Dialogue datasets: CSV splits in, directory-backed encoded dataset out.
//!
//! An encoded dataset is a directory with one `<split>.jsonl` file per split
//! and a `dataset_dict.json` manifest listing the splits and their row counts.

use crate::error::{MlError, MlResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

pub const SPLITS: [&str; 3] = ["train", "validation", "test"];

/// One row of a raw dialogue split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueRecord {
    #[serde(default)]
    pub id: String,
    pub dialogue: String,
    pub summary: String,
}

/// A dialogue row with its model-ready encodings; the original columns are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedExample {
    pub id: String,
    pub dialogue: String,
    pub summary: String,
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u8>,
    pub labels: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DatasetManifest {
    splits: Vec<String>,
    num_rows: BTreeMap<String, usize>,
}

/// Reads one CSV split with `id,dialogue,summary` columns. A missing
/// `dialogue` or `summary` column is an error; `id` may be absent.
pub fn read_csv_split(path: &Path) -> MlResult<Vec<DialogueRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

/// Loads `<dir>/<split>.csv` for each split name.
pub fn load_csv_splits(dir: &Path, splits: &[&str]) -> MlResult<BTreeMap<String, Vec<DialogueRecord>>> {
    let mut out = BTreeMap::new();
    for split in splits {
        let path = dir.join(format!("{split}.csv"));
        if !path.exists() {
            return Err(MlError::Format(format!("split file missing: {}", path.display())));
        }
        let rows = read_csv_split(&path)?;
        tracing::debug!(split, rows = rows.len(), "loaded csv split");
        out.insert(split.to_string(), rows);
    }
    Ok(out)
}

/// Named splits of encoded examples.
#[derive(Debug, Clone, Default)]
pub struct DatasetDict {
    pub splits: BTreeMap<String, Vec<EncodedExample>>,
}

impl DatasetDict {
    pub const MANIFEST: &'static str = "dataset_dict.json";

    pub fn split(&self, name: &str) -> MlResult<&[EncodedExample]> {
        self.splits
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| MlError::Format(format!("dataset has no '{name}' split")))
    }

    pub fn num_rows(&self) -> BTreeMap<String, usize> {
        self.splits.iter().map(|(k, v)| (k.clone(), v.len())).collect()
    }

    pub fn save_to_disk(&self, dir: &Path) -> MlResult<()> {
        std::fs::create_dir_all(dir)?;
        for (name, rows) in &self.splits {
            let file = std::fs::File::create(dir.join(format!("{name}.jsonl")))?;
            let mut writer = BufWriter::new(file);
            for row in rows {
                serde_json::to_writer(&mut writer, row)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
        let manifest = DatasetManifest {
            splits: self.splits.keys().cloned().collect(),
            num_rows: self.num_rows(),
        };
        std::fs::write(dir.join(Self::MANIFEST), serde_json::to_vec_pretty(&manifest)?)?;
        Ok(())
    }

    pub fn load_from_disk(dir: &Path) -> MlResult<Self> {
        let manifest_path = dir.join(Self::MANIFEST);
        if !manifest_path.exists() {
            return Err(MlError::Format(format!(
                "not a saved dataset (no {}): {}",
                Self::MANIFEST,
                dir.display()
            )));
        }
        let manifest: DatasetManifest = serde_json::from_slice(&std::fs::read(&manifest_path)?)?;

        let mut splits = BTreeMap::new();
        for name in manifest.splits {
            let file = std::fs::File::open(dir.join(format!("{name}.jsonl")))?;
            let mut rows = Vec::new();
            for (idx, line) in BufReader::new(file).lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let row: EncodedExample = serde_json::from_str(&line).map_err(|e| {
                    MlError::Format(format!("{name}.jsonl line {}: {}", idx + 1, e))
                })?;
                rows.push(row);
            }
            let expected = manifest.num_rows.get(&name).copied().unwrap_or(rows.len());
            if expected != rows.len() {
                return Err(MlError::Format(format!(
                    "split {name}: manifest says {expected} rows, found {}",
                    rows.len()
                )));
            }
            splits.insert(name, rows);
        }
        Ok(Self { splits })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn example(id: &str) -> EncodedExample {
        EncodedExample {
            id: id.to_string(),
            dialogue: "A: hi".to_string(),
            summary: "greeting".to_string(),
            input_ids: vec![4, 5, 1],
            attention_mask: vec![1, 1, 1],
            labels: vec![6, 1],
        }
    }

    #[test]
    fn test_read_csv_with_quoted_newlines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("train.csv");
        std::fs::write(
            &path,
            "id,dialogue,summary\n13818513,\"Amanda: I baked cookies.\r\nJerry: Sure!\",Amanda baked cookies.\n",
        )
        .unwrap();

        let rows = read_csv_split(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].dialogue.contains("Jerry: Sure!"));
        assert_eq!(rows[0].summary, "Amanda baked cookies.");
    }

    #[test]
    fn test_wrong_columns_are_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("train.csv");
        std::fs::write(&path, "id,text,abstract\n1,Amanda: hi,greeting\n").unwrap();
        assert!(matches!(read_csv_split(&path), Err(MlError::Csv(_))));
    }

    #[test]
    fn test_id_column_is_optional() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("train.csv");
        std::fs::write(&path, "dialogue,summary\nAmanda: hi,greeting\n").unwrap();
        let rows = read_csv_split(&path).unwrap();
        assert_eq!(rows[0].id, "");
        assert_eq!(rows[0].summary, "greeting");
    }

    #[test]
    fn test_missing_split_is_an_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("train.csv"), "id,dialogue,summary\n").unwrap();
        assert!(load_csv_splits(temp.path(), &SPLITS).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let mut dict = DatasetDict::default();
        dict.splits.insert("train".into(), vec![example("1"), example("2")]);
        dict.splits.insert("test".into(), vec![example("3")]);

        dict.save_to_disk(temp.path()).unwrap();
        let loaded = DatasetDict::load_from_disk(temp.path()).unwrap();

        assert_eq!(loaded.split("train").unwrap().len(), 2);
        assert_eq!(loaded.split("test").unwrap()[0], example("3"));
        assert!(loaded.split("validation").is_err());
    }

    #[test]
    fn test_load_rejects_plain_directory() {
        let temp = TempDir::new().unwrap();
        assert!(DatasetDict::load_from_disk(temp.path()).is_err());
    }
}
