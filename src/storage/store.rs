//! Append-only JSONL record store with in-memory id index.
//!
//! The durable log is the source of truth; the index is rebuilt by scanning
//! the log at open time, which is what makes resume correctness provable.
//! Appends are flushed and fsynced before returning, so a crash after a
//! successful append never loses it. `rewrite_all` goes through a temp file
//! and an atomic rename so a reader never observes a partial store.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{AppError, Result};

/// A record that can be keyed by its identifier.
pub trait Keyed {
    fn key(&self) -> String;
}

impl Keyed for crate::models::Project {
    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Keyed for crate::models::ProjectDetail {
    fn key(&self) -> String {
        self.id.to_string()
    }
}

/// Append-only, identifier-keyed persisted record set.
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    ids: HashSet<String>,
}

impl RecordStore {
    /// Open a store, creating parent directories and scanning any existing
    /// log to rebuild the id index. Corrupt lines are skipped with a warning.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut ids = HashSet::new();
        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for (lineno, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<serde_json::Value>(&line) {
                    Ok(value) => {
                        if let Some(key) = Self::extract_key(&value) {
                            ids.insert(key);
                        }
                    }
                    Err(e) => {
                        log::warn!(
                            "Skipping corrupt line {} in {}: {}",
                            lineno + 1,
                            path.display(),
                            e
                        );
                    }
                }
            }
            log::debug!("Indexed {} record ids from {}", ids.len(), path.display());
        }

        Ok(Self { path, ids })
    }

    fn extract_key(value: &serde_json::Value) -> Option<String> {
        match value.get("id") {
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            _ => None,
        }
    }

    /// Whether a record with this identifier is indexed.
    pub fn contains(&self, key: &str) -> bool {
        self.ids.contains(key)
    }

    /// Number of indexed records.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record; errors with `DuplicateKey` if the id is indexed.
    ///
    /// Discovery callers check `contains` first, so a duplicate here is a
    /// contract violation and propagates.
    pub fn append<T: Serialize + Keyed>(&mut self, record: &T) -> Result<()> {
        let key = record.key();
        if self.ids.contains(&key) {
            return Err(AppError::DuplicateKey { id: key });
        }
        self.write_line(record)?;
        self.ids.insert(key);
        Ok(())
    }

    /// Append unless the id is already indexed; returns whether a write
    /// happened. Detail-store usage, where a duplicate is a benign no-op.
    pub fn append_if_absent<T: Serialize + Keyed>(&mut self, record: &T) -> Result<bool> {
        if self.ids.contains(&record.key()) {
            return Ok(false);
        }
        self.append(record)?;
        Ok(true)
    }

    fn write_line<T: Serialize>(&self, record: &T) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }

    /// Atomically replace the entire store with the given records.
    ///
    /// Writes to a temp file in the same directory, fsyncs, then renames over
    /// the log, so interruption leaves the prior store intact.
    pub fn rewrite_all<T: Serialize + Keyed>(&mut self, records: &[T]) -> Result<()> {
        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            for record in records {
                let line = serde_json::to_string(record)?;
                writer.write_all(line.as_bytes())?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }
        fs::rename(&tmp, &self.path)?;

        self.ids = records.iter().map(|r| r.key()).collect();
        Ok(())
    }

    /// Lazily iterate records as stored at open time. Corrupt lines are
    /// skipped with a warning, matching the open-time scan.
    pub fn iter<T: DeserializeOwned>(&self) -> Result<impl Iterator<Item = T> + use<T>> {
        let path = self.path.clone();
        let lines: Box<dyn Iterator<Item = std::io::Result<String>>> = if path.exists() {
            Box::new(BufReader::new(File::open(&path)?).lines())
        } else {
            Box::new(std::iter::empty())
        };

        Ok(lines.filter_map(move |line| {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    log::warn!("Read error in {}: {}", path.display(), e);
                    return None;
                }
            };
            if line.trim().is_empty() {
                return None;
            }
            match serde_json::from_str::<T>(&line) {
                Ok(record) => Some(record),
                Err(e) => {
                    log::warn!("Skipping corrupt record in {}: {}", path.display(), e);
                    None
                }
            }
        }))
    }

    /// Load every record into memory.
    pub fn load_all<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        Ok(self.iter()?.collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Project, ProjectState};
    use tempfile::TempDir;

    fn sample_project(id: u64) -> Project {
        Project {
            id,
            slug: Some(format!("project-{id}")),
            name: format!("Project {id}"),
            blurb: None,
            url: None,
            country: None,
            category: None,
            backers_count: 0,
            goal: 100.0,
            pledged: 0.0,
            currency: Some("USD".into()),
            usd_pledged: None,
            fx_rate: None,
            state: ProjectState::Live,
            launched_at: None,
            deadline: None,
            created_at: None,
            state_changed_at: None,
            location: None,
            comments_count: None,
            updates_count: None,
            watches_count: None,
            is_staff_pick: false,
            is_project_we_love: false,
            spotlight: false,
            has_video: false,
            video_url: None,
            image_url: None,
        }
    }

    #[test]
    fn append_then_contains() {
        let tmp = TempDir::new().unwrap();
        let mut store = RecordStore::open(tmp.path().join("projects.jsonl")).unwrap();

        store.append(&sample_project(1)).unwrap();
        assert!(store.contains("1"));
        assert!(!store.contains("2"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn append_rejects_duplicate_key() {
        let tmp = TempDir::new().unwrap();
        let mut store = RecordStore::open(tmp.path().join("projects.jsonl")).unwrap();

        store.append(&sample_project(7)).unwrap();
        let err = store.append(&sample_project(7)).unwrap_err();
        assert!(matches!(err, AppError::DuplicateKey { id } if id == "7"));
    }

    #[test]
    fn append_if_absent_is_a_noop_on_duplicate() {
        let tmp = TempDir::new().unwrap();
        let mut store = RecordStore::open(tmp.path().join("details.jsonl")).unwrap();

        assert!(store.append_if_absent(&sample_project(3)).unwrap());
        assert!(!store.append_if_absent(&sample_project(3)).unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn reopen_rebuilds_index_from_log() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("projects.jsonl");

        {
            let mut store = RecordStore::open(&path).unwrap();
            store.append(&sample_project(1)).unwrap();
            store.append(&sample_project(2)).unwrap();
        }

        let store = RecordStore::open(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.contains("1"));
        assert!(store.contains("2"));

        let loaded: Vec<Project> = store.load_all().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, 1);
        assert_eq!(loaded[1].id, 2);
    }

    #[test]
    fn corrupt_lines_are_skipped_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("projects.jsonl");

        {
            let mut store = RecordStore::open(&path).unwrap();
            store.append(&sample_project(1)).unwrap();
        }
        // Inject a torn write between two valid records
        {
            use std::io::Write;
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(file, "{{\"id\": 99, \"truncat").unwrap();
        }
        {
            let mut store = RecordStore::open(&path).unwrap();
            assert_eq!(store.len(), 1);
            store.append(&sample_project(2)).unwrap();
        }

        let store = RecordStore::open(&path).unwrap();
        let loaded: Vec<Project> = store.load_all().unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(!store.contains("99"));
    }

    #[test]
    fn rewrite_all_replaces_contents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("details.jsonl");

        let mut store = RecordStore::open(&path).unwrap();
        store.append(&sample_project(1)).unwrap();
        store.append(&sample_project(2)).unwrap();

        store
            .rewrite_all(&[sample_project(2), sample_project(3)])
            .unwrap();

        assert_eq!(store.len(), 2);
        assert!(!store.contains("1"));
        assert!(store.contains("3"));

        let reopened = RecordStore::open(&path).unwrap();
        let loaded: Vec<Project> = reopened.load_all().unwrap();
        assert_eq!(loaded.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn rewrite_all_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("details.jsonl");

        let mut store = RecordStore::open(&path).unwrap();
        store.rewrite_all(&[sample_project(5)]).unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("jsonl.tmp").exists());
    }

    #[test]
    fn iter_on_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = RecordStore::open(tmp.path().join("never-written.jsonl")).unwrap();
        let loaded: Vec<Project> = store.load_all().unwrap();
        assert!(loaded.is_empty());
    }
}
