// libs/shared/database/src/primary.rs
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use tracing::debug;

use crate::store::{Entity, Filter, Repository, StoreError};
use crate::supabase::{ignore_duplicates, return_representation, SupabaseClient};

/// Primary-store adapter: one PostgREST table per entity type.
pub struct SupabaseRepository<T> {
    supabase: Arc<SupabaseClient>,
    bearer: Option<String>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> SupabaseRepository<T> {
    pub fn new(supabase: Arc<SupabaseClient>, bearer: Option<String>) -> Self {
        Self {
            supabase,
            bearer,
            _entity: PhantomData,
        }
    }

    fn table_path(&self) -> String {
        format!("/rest/v1/{}", T::TABLE)
    }

    fn row_path(&self, id: &str) -> String {
        format!("{}?id=eq.{}", self.table_path(), urlencoding::encode(id))
    }

    fn body(entity: &T) -> Result<serde_json::Value, StoreError> {
        Ok(serde_json::to_value(entity)?)
    }

    async fn rows(&self, method: Method, path: &str, body: Option<serde_json::Value>,
                  prefer: Option<reqwest::header::HeaderMap>) -> Result<Vec<T>, StoreError> {
        self.supabase
            .request_with_headers::<Vec<T>>(method, path, self.bearer.as_deref(), body, prefer)
            .await
            .map_err(|e| StoreError::Primary(e.to_string()))
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for SupabaseRepository<T> {
    async fn insert(&self, entity: &T) -> Result<T, StoreError> {
        debug!("Primary insert {}/{}", T::TABLE, entity.id());

        let rows = self.rows(
            Method::POST,
            &self.table_path(),
            Some(Self::body(entity)?),
            Some(return_representation()),
        ).await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Primary(format!("insert into {} returned no rows", T::TABLE)))
    }

    async fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        let path = format!("{}&limit=1", self.row_path(id));
        let rows = self.rows(Method::GET, &path, None, None).await?;
        Ok(rows.into_iter().next())
    }

    async fn list(&self, filter: &Filter) -> Result<Vec<T>, StoreError> {
        let query = filter.to_query();
        let path = if query.is_empty() {
            self.table_path()
        } else {
            format!("{}?{}", self.table_path(), query)
        };

        self.rows(Method::GET, &path, None, None).await
    }

    async fn update(&self, entity: &T) -> Result<Option<T>, StoreError> {
        debug!("Primary update {}/{}", T::TABLE, entity.id());

        let rows = self.rows(
            Method::PATCH,
            &self.row_path(entity.id()),
            Some(Self::body(entity)?),
            Some(return_representation()),
        ).await?;

        Ok(rows.into_iter().next())
    }

    async fn update_where(&self, entity: &T, guard: &Filter) -> Result<Option<T>, StoreError> {
        debug!("Primary guarded update {}/{}", T::TABLE, entity.id());

        let guard_query = guard.to_query();
        let path = if guard_query.is_empty() {
            self.row_path(entity.id())
        } else {
            format!("{}&{}", self.row_path(entity.id()), guard_query)
        };

        let rows = self.rows(
            Method::PATCH,
            &path,
            Some(Self::body(entity)?),
            Some(return_representation()),
        ).await?;

        if let Some(updated) = rows.into_iter().next() {
            return Ok(Some(updated));
        }

        // Nothing matched: either the row is gone or the guard no longer holds.
        match Repository::<T>::get(self, entity.id()).await? {
            Some(_) => Err(StoreError::Conflict { table: T::TABLE, id: entity.id().to_string() }),
            None => Ok(None),
        }
    }

    async fn insert_if_absent(&self, entity: &T) -> Result<(T, bool), StoreError> {
        let rows = self.rows(
            Method::POST,
            &self.table_path(),
            Some(Self::body(entity)?),
            Some(ignore_duplicates()),
        ).await?;

        // PostgREST echoes nothing when the row already existed.
        if let Some(created) = rows.into_iter().next() {
            return Ok((created, true));
        }

        match Repository::<T>::get(self, entity.id()).await? {
            Some(existing) => Ok((existing, false)),
            None => Err(StoreError::Primary(format!(
                "insert into {} ignored but {} is not readable", T::TABLE, entity.id()
            ))),
        }
    }
}
