// libs/shared/database/src/snapshot.rs
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::store::{tables, StoreError};

/// Tables written to the snapshot. Availability is kept in memory only.
pub const SNAPSHOT_TABLES: [&str; 3] = [tables::APPOINTMENTS, tables::CONVERSATIONS, tables::MESSAGES];

/// On-disk layout: one JSON document with one array per table.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SnapshotDocument {
    #[serde(default)]
    pub appointments: Vec<Value>,
    #[serde(default)]
    pub conversations: Vec<Value>,
    #[serde(default)]
    pub messages: Vec<Value>,
}

impl SnapshotDocument {
    pub fn from_tables(tables: &HashMap<String, BTreeMap<String, Value>>) -> Self {
        let rows = |table: &str| -> Vec<Value> {
            tables.get(table)
                .map(|rows| rows.values().cloned().collect())
                .unwrap_or_default()
        };

        Self {
            appointments: rows(tables::APPOINTMENTS),
            conversations: rows(tables::CONVERSATIONS),
            messages: rows(tables::MESSAGES),
        }
    }

    /// Rows regrouped per table and keyed by their `id` field. Rows without a string id are dropped.
    pub fn into_tables(self) -> HashMap<String, BTreeMap<String, Value>> {
        let mut result = HashMap::new();

        for (table, rows) in [
            (tables::APPOINTMENTS, self.appointments),
            (tables::CONVERSATIONS, self.conversations),
            (tables::MESSAGES, self.messages),
        ] {
            let keyed: BTreeMap<String, Value> = rows.into_iter()
                .filter_map(|row| {
                    let id = row.get("id")?.as_str()?.to_string();
                    Some((id, row))
                })
                .collect();
            result.insert(table.to_string(), keyed);
        }

        result
    }

    pub fn row_count(&self) -> usize {
        self.appointments.len() + self.conversations.len() + self.messages.len()
    }
}

/// Full-document persistence for the fallback store. Every save overwrites the file.
#[derive(Debug, Clone)]
pub struct PersistenceSnapshot {
    path: PathBuf,
}

impl PersistenceSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot. A missing file is an empty document.
    pub fn load(&self) -> Result<SnapshotDocument, StoreError> {
        if !self.path.exists() {
            info!("No fallback snapshot at {}, starting empty", self.path.display());
            return Ok(SnapshotDocument::default());
        }

        let raw = fs::read_to_string(&self.path)?;
        let document: SnapshotDocument = serde_json::from_str(&raw)?;

        info!("Loaded fallback snapshot from {} ({} rows)", self.path.display(), document.row_count());
        Ok(document)
    }

    /// Move an unreadable snapshot aside as `<name>.corrupt-<timestamp>` so the
    /// next save does not overwrite it. Returns the new location.
    pub fn quarantine(&self) -> Result<PathBuf, StoreError> {
        let name = self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot".to_string());
        let target = self.path.with_file_name(format!(
            "{}.corrupt-{}",
            name,
            Utc::now().format("%Y%m%dT%H%M%S%.3f")
        ));

        fs::rename(&self.path, &target)?;
        warn!("Moved unreadable fallback snapshot {} to {}", self.path.display(), target.display());
        Ok(target)
    }

    /// Write the whole document through a temp file in the same directory, then rename over the target.
    pub fn save(&self, document: &SnapshotDocument) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut file = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut file, document)?;
        file.write_all(b"\n")?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| StoreError::Snapshot(e.error))?;

        debug!("Fallback snapshot written to {} ({} rows)", self.path.display(), document.row_count());
        Ok(())
    }
}
