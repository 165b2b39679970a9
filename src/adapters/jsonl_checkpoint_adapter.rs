//! JSON-lines sweep checkpoint: one [`SweepRecord`] per line.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::domain::error::AlgotronError;
use crate::domain::sweep::SweepRecord;
use crate::ports::checkpoint_port::CheckpointPort;

pub struct JsonlCheckpointAdapter {
    path: PathBuf,
}

impl JsonlCheckpointAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CheckpointPort for JsonlCheckpointAdapter {
    fn load(&self) -> Result<Vec<SweepRecord>, AlgotronError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SweepRecord>(line) {
                Ok(record) => records.push(record),
                // a crash mid-write leaves a torn final line
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = line_no + 1,
                    error = %e,
                    "skipping unreadable checkpoint line"
                ),
            }
        }
        Ok(records)
    }

    fn append(&mut self, record: &SweepRecord) -> Result<(), AlgotronError> {
        let line = serde_json::to_string(record).map_err(|e| AlgotronError::Checkpoint {
            reason: format!("serialize record: {e}"),
        })?;
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AlgotronError::Checkpoint {
                reason: format!("open {}: {e}", self.path.display()),
            })?;
        // a torn final line must not swallow the new record
        let torn = ends_mid_line(&mut file).map_err(|e| AlgotronError::Checkpoint {
            reason: format!("read {}: {e}", self.path.display()),
        })?;
        let prefix = if torn { "\n" } else { "" };
        file.write_all(format!("{prefix}{line}\n").as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| AlgotronError::Checkpoint {
                reason: format!("write {}: {e}", self.path.display()),
            })
    }
}

/// True when the file is non-empty and its last byte is not a newline.
fn ends_mid_line(file: &mut fs::File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::Metrics;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn record(lookback: &str, sharpe: f64) -> SweepRecord {
        let mut params = BTreeMap::new();
        params.insert("lookback".to_string(), lookback.to_string());
        SweepRecord {
            params,
            metrics: Metrics {
                sharpe,
                ..Metrics::from_values(&[100.0, 101.0])
            },
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let adapter = JsonlCheckpointAdapter::new(dir.path().join("sweep.jsonl"));
        assert!(adapter.load().unwrap().is_empty());
    }

    #[test]
    fn appended_records_reload_in_order() {
        let dir = TempDir::new().unwrap();
        let mut adapter = JsonlCheckpointAdapter::new(dir.path().join("sweep.jsonl"));
        adapter.append(&record("10", 0.5)).unwrap();
        adapter.append(&record("21", 0.7)).unwrap();

        let loaded = adapter.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].params["lookback"], "10");
        assert_eq!(loaded[1].metrics.sharpe, 0.7);
    }

    #[test]
    fn torn_line_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sweep.jsonl");
        let mut adapter = JsonlCheckpointAdapter::new(&path);
        adapter.append(&record("10", 0.5)).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"look").unwrap();

        let loaded = adapter.load().unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn append_after_torn_line_starts_fresh_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sweep.jsonl");
        let mut adapter = JsonlCheckpointAdapter::new(&path);
        adapter.append(&record("10", 0.5)).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"lookback\":\"2").unwrap();
        drop(file);

        adapter.append(&record("63", 0.9)).unwrap();
        adapter.append(&record("126", 1.1)).unwrap();

        let loaded = adapter.load().unwrap();
        let lookbacks: Vec<&str> = loaded.iter().map(|r| r.params["lookback"].as_str()).collect();
        assert_eq!(lookbacks, ["10", "63", "126"]);
        assert!(fs::read_to_string(&path).unwrap().ends_with('\n'));
    }

    #[test]
    fn records_are_flat_objects() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sweep.jsonl");
        let mut adapter = JsonlCheckpointAdapter::new(&path);
        adapter.append(&record("10", 0.5)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(content.trim_end()).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object["lookback"], "10");
        assert_eq!(object["sharpe"], 0.5);
        assert!(!object.contains_key("params"));
        assert!(!object.contains_key("metrics"));
    }
}
