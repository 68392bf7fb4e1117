// libs/shared/database/src/fallback.rs
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::snapshot::{PersistenceSnapshot, SnapshotDocument, SNAPSHOT_TABLES};
use crate::store::{Entity, Filter, Repository, StoreError};

type Tables = HashMap<String, BTreeMap<String, Value>>;

/// In-process substitute for the primary store.
///
/// Records are kept as JSON per table and id behind one lock, so every
/// mutation is serialized. Mutations of snapshotted tables rewrite the
/// snapshot before the lock is released.
pub struct FallbackStore {
    tables: RwLock<Tables>,
    snapshot: Option<PersistenceSnapshot>,
}

impl FallbackStore {
    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            snapshot: None,
        }
    }

    /// Restore from `snapshot` and persist every later mutation to it.
    ///
    /// An unreadable snapshot is moved aside and the store starts empty. If it
    /// cannot be moved, the store runs without persistence rather than overwrite it.
    pub fn open(snapshot: PersistenceSnapshot) -> Self {
        let (tables, snapshot) = match snapshot.load() {
            Ok(document) => (document.into_tables(), Some(snapshot)),
            Err(e) => {
                error!("Unreadable fallback snapshot {}: {}", snapshot.path().display(), e);
                match snapshot.quarantine() {
                    Ok(_) => (HashMap::new(), Some(snapshot)),
                    Err(move_error) => {
                        error!(
                            "Could not move {} aside, fallback writes will not be persisted: {}",
                            snapshot.path().display(), move_error
                        );
                        (HashMap::new(), None)
                    }
                }
            }
        };

        Self {
            tables: RwLock::new(tables),
            snapshot,
        }
    }

    pub async fn count<T: Entity>(&self) -> usize {
        self.tables.read().await
            .get(T::TABLE)
            .map(|rows| rows.len())
            .unwrap_or(0)
    }

    async fn read_row<T: Entity>(&self, id: &str) -> Result<Option<T>, StoreError> {
        let tables = self.tables.read().await;
        tables.get(T::TABLE)
            .and_then(|rows| rows.get(id))
            .map(|row| serde_json::from_value(row.clone()))
            .transpose()
            .map_err(StoreError::from)
    }

    /// Apply `change` to the table under the write lock; snapshot if it reports a change.
    async fn mutate<T, R, F>(&self, change: F) -> Result<R, StoreError>
    where
        T: Entity,
        F: FnOnce(&mut BTreeMap<String, Value>) -> Result<(R, bool), StoreError>,
    {
        let mut tables = self.tables.write().await;
        let rows = tables.entry(T::TABLE.to_string()).or_default();
        let (result, changed) = change(rows)?;

        if changed {
            debug!("Fallback store mutated {}", T::TABLE);
            self.persist(&tables);
        }

        Ok(result)
    }

    fn persist(&self, tables: &Tables) {
        let Some(snapshot) = &self.snapshot else {
            return;
        };

        if let Err(e) = snapshot.save(&SnapshotDocument::from_tables(tables)) {
            // The in-memory write stands; the next successful save carries it.
            error!("Failed to write fallback snapshot {}: {}", snapshot.path().display(), e);
        }
    }

    fn is_snapshotted(table: &str) -> bool {
        SNAPSHOT_TABLES.contains(&table)
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for FallbackStore {
    async fn insert(&self, entity: &T) -> Result<T, StoreError> {
        let row = serde_json::to_value(entity)?;
        let id = entity.id().to_string();

        self.mutate::<T, _, _>(move |rows| {
            rows.insert(id, row);
            Ok(((), FallbackStore::is_snapshotted(T::TABLE)))
        }).await?;

        Ok(entity.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        self.read_row(id).await
    }

    async fn list(&self, filter: &Filter) -> Result<Vec<T>, StoreError> {
        let rows: Vec<Value> = {
            let tables = self.tables.read().await;
            tables.get(T::TABLE)
                .map(|rows| rows.values().cloned().collect())
                .unwrap_or_default()
        };

        filter.apply(rows)
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(StoreError::from))
            .collect()
    }

    async fn update(&self, entity: &T) -> Result<Option<T>, StoreError> {
        let row = serde_json::to_value(entity)?;
        let id = entity.id().to_string();

        let updated = self.mutate::<T, _, _>(move |rows| {
            match rows.get_mut(&id) {
                Some(existing) => {
                    *existing = row;
                    Ok((true, FallbackStore::is_snapshotted(T::TABLE)))
                }
                None => Ok((false, false)),
            }
        }).await?;

        if !updated {
            warn!("Fallback update skipped, {}/{} not present", T::TABLE, entity.id());
            return Ok(None);
        }

        Ok(Some(entity.clone()))
    }

    async fn update_where(&self, entity: &T, guard: &Filter) -> Result<Option<T>, StoreError> {
        let row = serde_json::to_value(entity)?;
        let id = entity.id().to_string();

        let updated = self.mutate::<T, _, _>(move |rows| {
            match rows.get_mut(&id) {
                Some(existing) if !guard.matches(existing) => {
                    Err(StoreError::Conflict { table: T::TABLE, id: id.clone() })
                }
                Some(existing) => {
                    *existing = row;
                    Ok((true, FallbackStore::is_snapshotted(T::TABLE)))
                }
                None => Ok((false, false)),
            }
        }).await?;

        Ok(updated.then(|| entity.clone()))
    }

    async fn insert_if_absent(&self, entity: &T) -> Result<(T, bool), StoreError> {
        let row = serde_json::to_value(entity)?;
        let id = entity.id().to_string();

        let existing = self.mutate::<T, _, _>(move |rows| {
            if let Some(existing) = rows.get(&id) {
                return Ok((Some(existing.clone()), false));
            }
            rows.insert(id, row);
            Ok((None, FallbackStore::is_snapshotted(T::TABLE)))
        }).await?;

        match existing {
            Some(row) => Ok((serde_json::from_value(row)?, false)),
            None => Ok((entity.clone(), true)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tables;
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: String,
        body: String,
    }

    impl Entity for Note {
        const TABLE: &'static str = tables::MESSAGES;

        fn id(&self) -> &str {
            &self.id
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Slot {
        id: String,
    }

    impl Entity for Slot {
        const TABLE: &'static str = tables::AVAILABILITY;

        fn id(&self) -> &str {
            &self.id
        }
    }

    fn note(id: &str, body: &str) -> Note {
        Note { id: id.to_string(), body: body.to_string() }
    }

    #[tokio::test]
    async fn test_insert_if_absent_keeps_first_write() {
        let store = FallbackStore::in_memory();

        let (_, created) = store.insert_if_absent(&note("n1", "first")).await.unwrap();
        assert!(created);

        let (stored, created) = store.insert_if_absent(&note("n1", "second")).await.unwrap();
        assert!(!created);
        assert_eq!(stored.body, "first");
        assert_eq!(store.count::<Note>().await, 1);
    }

    #[tokio::test]
    async fn test_update_missing_returns_none() {
        let store = FallbackStore::in_memory();
        let result: Option<Note> = store.update(&note("missing", "x")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_update_where_checks_guard_under_lock() {
        let store = FallbackStore::in_memory();
        store.insert(&note("n1", "draft")).await.unwrap();

        let stale = Filter::new().eq("body", "pending");
        let result = store.update_where(&note("n1", "final"), &stale).await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));

        let current = Filter::new().eq("body", "draft");
        let updated = store.update_where(&note("n1", "final"), &current).await.unwrap();
        assert_eq!(updated, Some(note("n1", "final")));

        let missing: Option<Note> = store.update_where(&note("n2", "x"), &current).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_mutations_survive_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fallback.json");

        {
            let store = FallbackStore::open(PersistenceSnapshot::new(&path));
            store.insert(&note("n1", "hello")).await.unwrap();
            store.insert(&Slot { id: "s1".to_string() }).await.unwrap();
        }

        let reopened = FallbackStore::open(PersistenceSnapshot::new(&path));
        let restored = Repository::<Note>::get(&reopened, "n1").await.unwrap();
        assert_eq!(restored, Some(note("n1", "hello")));

        // Availability is not part of the snapshot.
        assert_eq!(reopened.count::<Slot>().await, 0);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_preserved_on_next_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fallback.json");
        std::fs::write(&path, "{\"appointments\": [truncated").unwrap();

        let store = FallbackStore::open(PersistenceSnapshot::new(&path));
        assert_eq!(store.count::<Note>().await, 0);
        store.insert(&note("n1", "after restart")).await.unwrap();

        let quarantined: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("fallback.json.corrupt-"))
            .collect();
        assert_eq!(quarantined.len(), 1);
        let kept = std::fs::read_to_string(dir.path().join(&quarantined[0])).unwrap();
        assert_eq!(kept, "{\"appointments\": [truncated");

        let reopened = FallbackStore::open(PersistenceSnapshot::new(&path));
        assert_eq!(reopened.count::<Note>().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_are_not_lost() {
        let store = Arc::new(FallbackStore::in_memory());

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store.insert(&note(&format!("n{}", i), "x")).await.unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.count::<Note>().await, 32);
    }
}
