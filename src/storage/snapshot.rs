use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde_json::Value;
use tracing::{debug, info};

use crate::crawler::models::Apartment;

/// Writes one timestamped JSON file per batch flush into the data directory.
pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Pretty-printed JSON array, UTF-8 kept as-is.
    pub fn write(&self, apartments: &[Apartment]) -> anyhow::Result<PathBuf> {
        let filename = format!("apartments__{}.json", Local::now().format("%Y%m%d%H%M%S"));
        let path = self.dir.join(filename);
        fs::write(&path, serde_json::to_string_pretty(apartments)?)?;
        Ok(path)
    }
}

/// Merges every snapshot in `dir` into one combined file and removes the
/// inputs. Safe to run repeatedly: a combined file is just another snapshot
/// to fold in, and the file being written is never deleted.
pub fn combine_snapshots(dir: &Path) -> anyhow::Result<(PathBuf, usize)> {
    let mut inputs: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    inputs.sort();

    let mut combined: Vec<Value> = Vec::new();
    for path in &inputs {
        let text = fs::read_to_string(path)?;
        let records: Vec<Value> = serde_json::from_str(&text)?;
        debug!(path = %path.display(), count = records.len(), "Read snapshot");
        combined.extend(records);
    }

    let output = dir.join(format!(
        "combined_apartments__{}.json",
        Local::now().format("%Y%m%d%H%M%S")
    ));
    fs::write(&output, serde_json::to_string_pretty(&combined)?)?;

    let mut removed = 0usize;
    for path in &inputs {
        if *path != output {
            fs::remove_file(path)?;
            removed += 1;
        }
    }

    info!(output = %output.display(), records = combined.len(), removed, "Snapshots combined");
    Ok((output, combined.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apartment(url: &str) -> Apartment {
        Apartment::new(url)
    }

    #[test]
    fn writer_names_files_with_the_fixed_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path()).unwrap();

        let path = writer.write(&[apartment("https://www.kv.ee/en/apartment/1")]).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("apartments__"));
        assert!(name.ends_with(".json"));

        let text = fs::read_to_string(&path).unwrap();
        let records: Vec<Value> = serde_json::from_str(&text).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["apurl"], "https://www.kv.ee/en/apartment/1");
        assert_eq!(records[0]["images"], serde_json::json!([]));
        assert_eq!(records[0]["price"], Value::Null);
    }

    #[test]
    fn snapshots_keep_non_ascii_text() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path()).unwrap();

        let mut record = apartment("https://www.kv.ee/en/apartment/2");
        record.subdistrict = Some("Sibulaküla".to_string());
        let path = writer.write(std::slice::from_ref(&record)).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("Sibulaküla"));
    }

    #[test]
    fn combining_twice_keeps_the_same_record_set() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("apartments__20250101000000.json"),
            serde_json::to_string_pretty(&[apartment("https://www.kv.ee/en/apartment/1")]).unwrap(),
        )
        .unwrap();
        fs::write(
            dir.path().join("apartments__20250101000100.json"),
            serde_json::to_string_pretty(&[
                apartment("https://www.kv.ee/en/apartment/2"),
                apartment("https://www.kv.ee/en/apartment/3"),
            ])
            .unwrap(),
        )
        .unwrap();

        let (first_output, first_count) = combine_snapshots(dir.path()).unwrap();
        assert_eq!(first_count, 3);
        assert!(first_output.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);

        let (second_output, second_count) = combine_snapshots(dir.path()).unwrap();
        assert_eq!(second_count, 3);
        assert!(second_output.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);

        let records: Vec<Value> =
            serde_json::from_str(&fs::read_to_string(&second_output).unwrap()).unwrap();
        let mut urls: Vec<&str> = records
            .iter()
            .map(|r| r["apurl"].as_str().unwrap())
            .collect();
        urls.sort_unstable();
        assert_eq!(
            urls,
            vec![
                "https://www.kv.ee/en/apartment/1",
                "https://www.kv.ee/en/apartment/2",
                "https://www.kv.ee/en/apartment/3",
            ]
        );
    }

    #[test]
    fn combining_an_empty_directory_yields_an_empty_combined_file() {
        let dir = tempfile::tempdir().unwrap();
        let (output, count) = combine_snapshots(dir.path()).unwrap();
        assert_eq!(count, 0);
        assert!(output.exists());
    }
}
