use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::StoreError;
use crate::model::NormalizedRecord;

pub const SNAPSHOT_FILE: &str = "messages.json";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpsertStats {
    pub inserted: usize,
    pub updated: usize,
}

/// Id-keyed record store backed by a single JSON snapshot.
///
/// `records` keeps first-seen order. The snapshot order (date descending,
/// first-seen on ties) is derived from it on every write.
pub struct MergeStore {
    path: PathBuf,
    records: Vec<NormalizedRecord>,
    index: HashMap<i64, usize>,
}

impl MergeStore {
    /// Load the snapshot at `path`. A missing file is created as `[]`; an
    /// unreadable one is logged and treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let records = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Vec<NormalizedRecord>>(&content) {
                Ok(records) => {
                    info!("Loaded {} records from {}", records.len(), path.display());
                    records
                }
                Err(e) => {
                    warn!("Snapshot {} is unreadable ({}), starting empty", path.display(), e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                write_atomic(&path, b"[]")?;
                info!("Created snapshot file {}", path.display());
                Vec::new()
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        let mut store = MergeStore {
            path,
            records: Vec::with_capacity(records.len()),
            index: HashMap::with_capacity(records.len()),
        };
        for record in records {
            if !store.index.contains_key(&record.id) {
                store.insert(record);
            }
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, id: i64) -> Option<&NormalizedRecord> {
        self.index.get(&id).map(|&i| &self.records[i])
    }

    /// Merge a batch in memory.
    ///
    /// New ids are inserted whole. For a known id only the body and a
    /// non-empty photo path are taken from the incoming record; heading,
    /// tags, media and date keep their first-seen values.
    pub fn merge(&mut self, batch: Vec<NormalizedRecord>) -> UpsertStats {
        let mut stats = UpsertStats::default();
        for incoming in batch {
            match self.index.get(&incoming.id).copied() {
                Some(i) => {
                    let existing = &mut self.records[i];
                    existing.body = incoming.body;
                    if let Some(photo) = incoming.photo_path.filter(|p| !p.is_empty()) {
                        existing.photo_path = Some(photo);
                    }
                    stats.updated += 1;
                }
                None => {
                    self.insert(incoming);
                    stats.inserted += 1;
                }
            }
        }
        stats
    }

    /// Merge a batch and rewrite the whole snapshot.
    pub fn upsert(&mut self, batch: Vec<NormalizedRecord>) -> Result<UpsertStats, StoreError> {
        let stats = self.merge(batch);
        self.persist()?;
        Ok(stats)
    }

    /// Records in snapshot order: date descending, stable on ties.
    pub fn snapshot(&self) -> Vec<&NormalizedRecord> {
        let mut sorted: Vec<&NormalizedRecord> = self.records.iter().collect();
        sorted.sort_by(|a, b| b.date.cmp(&a.date));
        sorted
    }

    /// Replace the snapshot file in one rename.
    pub fn persist(&self) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(&self.snapshot())?;
        write_atomic(&self.path, &json)
    }

    /// (oldest, newest) message dates.
    pub fn date_span(&self) -> Option<(i64, i64)> {
        let oldest = self.records.iter().map(|r| r.date).min()?;
        let newest = self.records.iter().map(|r| r.date).max()?;
        Some((oldest, newest))
    }

    fn insert(&mut self, record: NormalizedRecord) {
        self.index.insert(record.id, self.records.len());
        self.records.push(record);
    }
}

/// Write to a sibling temp file, fsync, then rename over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = tmp_path(path);
    let io_err = |source| StoreError::Io {
        path: tmp.clone(),
        source,
    };

    let mut file = fs::File::create(&tmp).map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);

    fs::rename(&tmp, path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: i64, date: i64, body: &str) -> NormalizedRecord {
        NormalizedRecord {
            id,
            date,
            body: Some(body.to_string()),
            media_kind: "None".into(),
            photo_path: None,
            heading: Some(format!("heading {id}")),
            tags: vec![format!("t{id}")],
        }
    }

    fn open(dir: &TempDir) -> MergeStore {
        MergeStore::open(dir.path().join(SNAPSHOT_FILE)).unwrap()
    }

    fn ids(store: &MergeStore) -> Vec<i64> {
        store.snapshot().iter().map(|r| r.id).collect()
    }

    #[test]
    fn missing_snapshot_is_created_empty() {
        let dir = TempDir::new().unwrap();
        let store = MergeStore::open(dir.path().join("out").join(SNAPSHOT_FILE)).unwrap();
        assert!(store.is_empty());
        let content = fs::read_to_string(store.path()).unwrap();
        assert_eq!(content, "[]");
    }

    #[test]
    fn corrupt_snapshot_loads_as_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SNAPSHOT_FILE);
        fs::write(&path, "{ not json").unwrap();
        let store = MergeStore::open(&path).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn snapshot_is_sorted_by_date_desc_stable() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store
            .upsert(vec![record(1, 100, "a"), record(2, 300, "b"), record(3, 100, "c"), record(4, 200, "d")])
            .unwrap();
        assert_eq!(ids(&store), vec![2, 4, 1, 3]);

        let dates: Vec<i64> = store.snapshot().iter().map(|r| r.date).collect();
        assert!(dates.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn upsert_twice_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let batch = vec![record(1, 100, "a"), record(2, 200, "b")];

        let mut store = open(&dir);
        store.upsert(batch.clone()).unwrap();
        let once = fs::read_to_string(store.path()).unwrap();

        let stats = store.upsert(batch).unwrap();
        let twice = fs::read_to_string(store.path()).unwrap();

        assert_eq!(stats, UpsertStats { inserted: 0, updated: 2 });
        assert_eq!(once, twice);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn merge_only_touches_body_and_photo() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store.merge(vec![record(5, 100, "first")]);

        let edited = NormalizedRecord {
            id: 5,
            date: 999,
            body: Some("edited".into()),
            media_kind: "Photo".into(),
            photo_path: Some("photos/photo_5.jpg".into()),
            heading: Some("other heading".into()),
            tags: vec!["other".into()],
        };
        store.merge(vec![edited]);

        let r = store.get(5).unwrap();
        assert_eq!(r.body.as_deref(), Some("edited"));
        assert_eq!(r.photo_path.as_deref(), Some("photos/photo_5.jpg"));
        assert_eq!(r.heading.as_deref(), Some("heading 5"));
        assert_eq!(r.tags, vec!["t5"]);
        assert_eq!(r.media_kind, "None");
        assert_eq!(r.date, 100);
    }

    #[test]
    fn empty_photo_does_not_clear_existing() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        let mut first = record(8, 1, "x");
        first.photo_path = Some("photos/photo_8.jpg".into());
        store.merge(vec![first]);

        let mut again = record(8, 1, "y");
        again.photo_path = Some(String::new());
        store.merge(vec![again]);
        store.merge(vec![record(8, 1, "z")]);

        let r = store.get(8).unwrap();
        assert_eq!(r.body.as_deref(), Some("z"));
        assert_eq!(r.photo_path.as_deref(), Some("photos/photo_8.jpg"));
    }

    #[test]
    fn reopen_keeps_first_seen_order_for_ties() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store.upsert(vec![record(10, 50, "a"), record(11, 50, "b")]).unwrap();
        drop(store);

        let mut store = open(&dir);
        assert_eq!(store.len(), 2);
        store.upsert(vec![record(12, 50, "c"), record(10, 50, "a2")]).unwrap();
        assert_eq!(ids(&store), vec![10, 11, 12]);
        assert_eq!(store.get(10).unwrap().body.as_deref(), Some("a2"));
    }

    #[test]
    fn persisted_file_is_valid_json_array() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store.upsert(vec![record(1, 1, "a")]).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(value[0]["id"], 1);
        assert_eq!(value[0]["text"], "a");
        assert!(!tmp_path(store.path()).exists());
    }
}
