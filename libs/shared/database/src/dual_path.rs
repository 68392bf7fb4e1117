// libs/shared/database/src/dual_path.rs
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::store::{Entity, Filter, ReadPolicy, Repository, Sourced, StoreError, StoreSource};

/// Two-tier repository: the primary store is the system of record, the
/// fallback store takes writes the primary cannot and fills in reads the
/// primary cannot answer.
///
/// - writes go to the primary first; any primary error (including a timeout)
///   diverts the write to the fallback, and only a fallback failure is returned
/// - reads query the primary first and consult the fallback according to
///   [`ReadPolicy`]; merged results keep the primary copy on id collision
/// - every result is tagged with the store that produced it
pub struct DualPathStore<T: Entity> {
    primary: Arc<dyn Repository<T>>,
    fallback: Arc<dyn Repository<T>>,
    read_policy: ReadPolicy,
    primary_timeout: Duration,
}

impl<T: Entity> Clone for DualPathStore<T> {
    fn clone(&self) -> Self {
        Self {
            primary: Arc::clone(&self.primary),
            fallback: Arc::clone(&self.fallback),
            read_policy: self.read_policy,
            primary_timeout: self.primary_timeout,
        }
    }
}

impl<T: Entity> DualPathStore<T> {
    pub fn new(
        primary: Arc<dyn Repository<T>>,
        fallback: Arc<dyn Repository<T>>,
        primary_timeout: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            read_policy: ReadPolicy::default(),
            primary_timeout,
        }
    }

    pub fn with_read_policy(mut self, read_policy: ReadPolicy) -> Self {
        self.read_policy = read_policy;
        self
    }

    pub fn read_policy(&self) -> ReadPolicy {
        self.read_policy
    }

    /// Run a primary call under the configured timeout.
    async fn on_primary<R, F>(&self, call: F) -> Result<R, StoreError>
    where
        F: Future<Output = Result<R, StoreError>>,
    {
        match tokio::time::timeout(self.primary_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.primary_timeout)),
        }
    }

    // ==========================================================================
    // WRITES
    // ==========================================================================

    pub async fn put(&self, entity: T) -> Result<Sourced<T>, StoreError> {
        self.put_with(entity, |entity| async move { entity }).await
    }

    /// Like [`put`](Self::put), but `prepare` rewrites the entity before it is
    /// written to the fallback store. It is not called when the primary accepts the write.
    #[instrument(skip_all, fields(table = T::TABLE, id = entity.id()))]
    pub async fn put_with<F, Fut>(&self, entity: T, prepare: F) -> Result<Sourced<T>, StoreError>
    where
        F: FnOnce(T) -> Fut + Send,
        Fut: Future<Output = T> + Send,
    {
        match self.on_primary(self.primary.insert(&entity)).await {
            Ok(stored) => {
                debug!("Stored {}/{} in primary", T::TABLE, stored.id());
                return Ok(Sourced::primary(stored));
            }
            Err(e) => {
                warn!("Primary write to {} failed, using fallback store: {}", T::TABLE, e);
            }
        }

        let prepared = prepare(entity).await;
        let stored = self.fallback.insert(&prepared).await?;

        info!("Stored {}/{} in fallback store", T::TABLE, stored.id());
        Ok(Sourced::fallback(stored))
    }

    /// Replace a record in the store that holds it, without moving it across stores.
    ///
    /// A record located in the primary is updated there; if that update fails
    /// the fallback copy (if any) is updated instead.
    pub async fn update_in(&self, source: StoreSource, entity: &T) -> Result<Sourced<T>, StoreError> {
        self.update_located(source, entity, None).await
    }

    /// [`update_in`](Self::update_in) as a compare-and-set: the write only lands
    /// while the stored record still matches `guard`, otherwise `Conflict`.
    pub async fn update_in_where(
        &self,
        source: StoreSource,
        entity: &T,
        guard: &Filter,
    ) -> Result<Sourced<T>, StoreError> {
        self.update_located(source, entity, Some(guard)).await
    }

    async fn update_located(
        &self,
        source: StoreSource,
        entity: &T,
        guard: Option<&Filter>,
    ) -> Result<Sourced<T>, StoreError> {
        let mut primary_failed = false;

        if source == StoreSource::Primary {
            let call = async {
                match guard {
                    Some(guard) => self.primary.update_where(entity, guard).await,
                    None => self.primary.update(entity).await,
                }
            };
            match self.on_primary(call).await {
                Ok(Some(updated)) => return Ok(Sourced::primary(updated)),
                Ok(None) => {
                    warn!("{}/{} vanished from primary before update", T::TABLE, entity.id());
                }
                Err(e @ StoreError::Conflict { .. }) => return Err(e),
                Err(e) => {
                    warn!("Primary update of {}/{} failed, trying fallback store: {}", T::TABLE, entity.id(), e);
                    primary_failed = true;
                }
            }
        }

        let updated = match guard {
            Some(guard) => self.fallback.update_where(entity, guard).await?,
            None => self.fallback.update(entity).await?,
        };

        match updated {
            Some(updated) => Ok(Sourced::fallback(updated)),
            None if primary_failed => Err(StoreError::Unavailable {
                table: T::TABLE,
                id: entity.id().to_string(),
            }),
            None => Err(StoreError::NotFound {
                table: T::TABLE,
                id: entity.id().to_string(),
            }),
        }
    }

    /// Create `entity` unless a record with its id exists in either store.
    ///
    /// The existence check against the fallback and the insert are one atomic
    /// step. A newly created record is mirrored to the primary best-effort;
    /// a failed mirror is logged and the fallback copy stands.
    /// Returns the stored record and whether this call created it.
    #[instrument(skip_all, fields(table = T::TABLE, id = entity.id()))]
    pub async fn insert_if_absent_mirrored(&self, entity: T) -> Result<(Sourced<T>, bool), StoreError> {
        match self.on_primary(self.primary.get(entity.id())).await {
            Ok(Some(existing)) => return Ok((Sourced::primary(existing), false)),
            Ok(None) => {}
            Err(e) => warn!("Primary lookup of {}/{} failed: {}", T::TABLE, entity.id(), e),
        }

        let (stored, created) = self.fallback.insert_if_absent(&entity).await?;
        if !created {
            debug!("{}/{} already present in fallback store", T::TABLE, stored.id());
            return Ok((Sourced::fallback(stored), false));
        }

        match self.on_primary(self.primary.insert_if_absent(&stored)).await {
            Ok(_) => debug!("Mirrored {}/{} to primary", T::TABLE, stored.id()),
            Err(e) => warn!(
                "Mirror of {}/{} to primary failed, fallback copy is authoritative: {}",
                T::TABLE, stored.id(), e
            ),
        }

        Ok((Sourced::fallback(stored), true))
    }

    // ==========================================================================
    // READS
    // ==========================================================================

    pub async fn get(&self, id: &str) -> Result<Option<Sourced<T>>, StoreError> {
        match self.on_primary(self.primary.get(id)).await {
            Ok(Some(found)) => return Ok(Some(Sourced::primary(found))),
            Ok(None) => debug!("{}/{} not in primary, checking fallback", T::TABLE, id),
            Err(e) => warn!("Primary read of {}/{} failed, checking fallback: {}", T::TABLE, id, e),
        }

        Ok(self.fallback.get(id).await?.map(Sourced::fallback))
    }

    /// [`get`](Self::get) that reports absence from both stores as `NotFound`.
    pub async fn require(&self, id: &str) -> Result<Sourced<T>, StoreError> {
        self.get(id).await?.ok_or_else(|| StoreError::NotFound {
            table: T::TABLE,
            id: id.to_string(),
        })
    }

    pub async fn list(&self, filter: &Filter) -> Result<Vec<Sourced<T>>, StoreError> {
        let primary_rows = match self.on_primary(self.primary.list(filter)).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Primary list of {} failed, using fallback store: {}", T::TABLE, e);
                Vec::new()
            }
        };

        if self.read_policy == ReadPolicy::FallbackOnEmpty && !primary_rows.is_empty() {
            return Ok(primary_rows.into_iter().map(Sourced::primary).collect());
        }

        let fallback_rows = self.fallback.list(filter).await?;
        merge(primary_rows, fallback_rows, filter)
    }

    /// [`list`](Self::list) without provenance.
    pub async fn list_values(&self, filter: &Filter) -> Result<Vec<T>, StoreError> {
        Ok(self.list(filter).await?.into_iter().map(Sourced::into_inner).collect())
    }
}

/// Union by id with the primary copy winning, re-ordered and re-limited by `filter`.
fn merge<T: Entity>(primary: Vec<T>, fallback: Vec<T>, filter: &Filter) -> Result<Vec<Sourced<T>>, StoreError> {
    let primary_ids: HashSet<String> = primary.iter().map(|e| e.id().to_string()).collect();

    let union: Vec<T> = primary.into_iter()
        .chain(fallback.into_iter().filter(|e| !primary_ids.contains(e.id())))
        .collect();

    let arranged = filter.arrange_entities(union)?;

    Ok(arranged.into_iter()
        .map(|entity| {
            if primary_ids.contains(entity.id()) {
                Sourced::primary(entity)
            } else {
                Sourced::fallback(entity)
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::FallbackStore;
    use crate::store::tables;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: String,
        owner: String,
        label: String,
    }

    impl Entity for Item {
        const TABLE: &'static str = tables::APPOINTMENTS;

        fn id(&self) -> &str {
            &self.id
        }
    }

    fn item(id: &str, label: &str) -> Item {
        Item { id: id.to_string(), owner: "o1".to_string(), label: label.to_string() }
    }

    /// Primary backed by memory that can be switched off.
    struct Switchable {
        inner: FallbackStore,
        up: AtomicBool,
    }

    impl Switchable {
        fn new(up: bool) -> Self {
            Self { inner: FallbackStore::in_memory(), up: AtomicBool::new(up) }
        }

        fn check(&self) -> Result<(), StoreError> {
            if self.up.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(StoreError::Primary("connection refused".to_string()))
            }
        }
    }

    #[async_trait]
    impl Repository<Item> for Switchable {
        async fn insert(&self, entity: &Item) -> Result<Item, StoreError> {
            self.check()?;
            self.inner.insert(entity).await
        }

        async fn get(&self, id: &str) -> Result<Option<Item>, StoreError> {
            self.check()?;
            Repository::<Item>::get(&self.inner, id).await
        }

        async fn list(&self, filter: &Filter) -> Result<Vec<Item>, StoreError> {
            self.check()?;
            Repository::<Item>::list(&self.inner, filter).await
        }

        async fn update(&self, entity: &Item) -> Result<Option<Item>, StoreError> {
            self.check()?;
            self.inner.update(entity).await
        }

        async fn update_where(&self, entity: &Item, guard: &Filter) -> Result<Option<Item>, StoreError> {
            self.check()?;
            self.inner.update_where(entity, guard).await
        }

        async fn insert_if_absent(&self, entity: &Item) -> Result<(Item, bool), StoreError> {
            self.check()?;
            self.inner.insert_if_absent(entity).await
        }
    }

    /// Primary that never answers.
    struct Hung;

    #[async_trait]
    impl Repository<Item> for Hung {
        async fn insert(&self, _: &Item) -> Result<Item, StoreError> {
            std::future::pending().await
        }
        async fn get(&self, _: &str) -> Result<Option<Item>, StoreError> {
            std::future::pending().await
        }
        async fn list(&self, _: &Filter) -> Result<Vec<Item>, StoreError> {
            std::future::pending().await
        }
        async fn update(&self, _: &Item) -> Result<Option<Item>, StoreError> {
            std::future::pending().await
        }
        async fn update_where(&self, _: &Item, _: &Filter) -> Result<Option<Item>, StoreError> {
            std::future::pending().await
        }
        async fn insert_if_absent(&self, _: &Item) -> Result<(Item, bool), StoreError> {
            std::future::pending().await
        }
    }

    fn store(primary: Arc<Switchable>, fallback: Arc<FallbackStore>) -> DualPathStore<Item> {
        DualPathStore::new(primary, fallback, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_put_prefers_primary() {
        let primary = Arc::new(Switchable::new(true));
        let fallback = Arc::new(FallbackStore::in_memory());
        let store = store(primary.clone(), fallback.clone());

        let stored = store.put(item("i1", "a")).await.unwrap();
        assert_eq!(stored.source, StoreSource::Primary);
        assert_eq!(fallback.count::<Item>().await, 0);
    }

    #[tokio::test]
    async fn test_put_falls_back_and_runs_prepare() {
        let primary = Arc::new(Switchable::new(false));
        let fallback = Arc::new(FallbackStore::in_memory());
        let store = store(primary, fallback.clone());

        let stored = store
            .put_with(item("i1", "raw"), |mut e| async move {
                e.label = "prepared".to_string();
                e
            })
            .await
            .unwrap();

        assert!(stored.is_fallback());
        assert_eq!(stored.value.label, "prepared");
        assert_eq!(fallback.count::<Item>().await, 1);
    }

    #[tokio::test]
    async fn test_hung_primary_times_out_into_fallback() {
        let fallback = Arc::new(FallbackStore::in_memory());
        let store = DualPathStore::<Item>::new(Arc::new(Hung), fallback.clone(), Duration::from_millis(50));

        let stored = store.put(item("i1", "a")).await.unwrap();
        assert!(stored.is_fallback());

        let found = store.require("i1").await.unwrap();
        assert!(found.is_fallback());
    }

    #[tokio::test]
    async fn test_get_primary_wins_then_fallback() {
        let primary = Arc::new(Switchable::new(true));
        let fallback = Arc::new(FallbackStore::in_memory());
        primary.inner.insert(&item("i1", "primary")).await.unwrap();
        fallback.insert(&item("i1", "fallback")).await.unwrap();
        fallback.insert(&item("i2", "fallback only")).await.unwrap();
        let store = store(primary, fallback);

        let found = store.require("i1").await.unwrap();
        assert_eq!(found.value.label, "primary");

        let found = store.require("i2").await.unwrap();
        assert!(found.is_fallback());

        assert!(matches!(store.require("i3").await, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_policies() {
        let primary = Arc::new(Switchable::new(true));
        let fallback = Arc::new(FallbackStore::in_memory());
        primary.inner.insert(&item("i1", "primary")).await.unwrap();
        fallback.insert(&item("i1", "stale")).await.unwrap();
        fallback.insert(&item("i2", "fallback")).await.unwrap();
        let filter = Filter::new().eq("owner", "o1").order_by("id", crate::store::Direction::Asc);

        let on_empty = store(primary.clone(), fallback.clone());
        let rows = on_empty.list(&filter).await.unwrap();
        assert_eq!(rows.len(), 1);

        let merged = on_empty.with_read_policy(ReadPolicy::AlwaysMerge);
        let rows = merged.list(&filter).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value.label, "primary");
        assert_eq!(rows[0].source, StoreSource::Primary);
        assert_eq!(rows[1].source, StoreSource::Fallback);

        primary.up.store(false, Ordering::SeqCst);
        let rows = merged.list(&filter).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(Sourced::is_fallback));
    }

    #[tokio::test]
    async fn test_update_in_stays_in_locating_store() {
        let primary = Arc::new(Switchable::new(false));
        let fallback = Arc::new(FallbackStore::in_memory());
        let store = store(primary.clone(), fallback.clone());

        let stored = store.put(item("i1", "a")).await.unwrap();
        primary.up.store(true, Ordering::SeqCst);

        let updated = store.update_in(stored.source, &item("i1", "b")).await.unwrap();
        assert!(updated.is_fallback());
        assert!(Repository::<Item>::get(&primary.inner, "i1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_in_unreachable_primary_without_copy() {
        let primary = Arc::new(Switchable::new(false));
        let store = store(primary, Arc::new(FallbackStore::in_memory()));

        let result = store.update_in(StoreSource::Primary, &item("i1", "b")).await;
        assert!(matches!(result, Err(StoreError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_guarded_update_conflict_is_not_retried_in_fallback() {
        let primary = Arc::new(Switchable::new(true));
        let fallback = Arc::new(FallbackStore::in_memory());
        primary.inner.insert(&item("i1", "taken")).await.unwrap();
        fallback.insert(&item("i1", "open")).await.unwrap();
        let store = store(primary, fallback.clone());

        let guard = Filter::new().eq("label", "open");
        let result = store.update_in_where(StoreSource::Primary, &item("i1", "mine"), &guard).await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));

        let untouched = Repository::<Item>::get(fallback.as_ref(), "i1").await.unwrap().unwrap();
        assert_eq!(untouched.label, "open");
    }

    #[tokio::test]
    async fn test_insert_if_absent_mirrored_is_idempotent() {
        let primary = Arc::new(Switchable::new(false));
        let fallback = Arc::new(FallbackStore::in_memory());
        let store = store(primary.clone(), fallback.clone());

        let (first, created) = store.insert_if_absent_mirrored(item("i1", "first")).await.unwrap();
        assert!(created);
        assert!(first.is_fallback());

        primary.up.store(true, Ordering::SeqCst);
        let (second, created) = store.insert_if_absent_mirrored(item("i1", "second")).await.unwrap();
        assert!(!created);
        assert_eq!(second.value.label, "first");
        assert_eq!(fallback.count::<Item>().await, 1);
        assert_eq!(primary.inner.count::<Item>().await, 0);
    }

    #[tokio::test]
    async fn test_insert_if_absent_mirrors_to_live_primary() {
        let primary = Arc::new(Switchable::new(true));
        let fallback = Arc::new(FallbackStore::in_memory());
        let store = store(primary.clone(), fallback.clone());

        let (_, created) = store.insert_if_absent_mirrored(item("i1", "a")).await.unwrap();
        assert!(created);
        assert_eq!(primary.inner.count::<Item>().await, 1);
        assert_eq!(fallback.count::<Item>().await, 1);

        let (again, created) = store.insert_if_absent_mirrored(item("i1", "b")).await.unwrap();
        assert!(!created);
        assert_eq!(again.source, StoreSource::Primary);
    }
}
