// libs/shared/database/src/store.rs
use std::cmp::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Table names shared by the primary adapter, the fallback store and the snapshot.
pub mod tables {
    pub const AVAILABILITY: &str = "doctor_availability";
    pub const APPOINTMENTS: &str = "appointments";
    pub const CONVERSATIONS: &str = "conversations";
    pub const MESSAGES: &str = "messages";
}

/// A record that can live in either store, keyed by a string id.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TABLE: &'static str;

    fn id(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Primary store error: {0}")]
    Primary(String),

    #[error("Primary store did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Record {table}/{id} not found")]
    NotFound { table: &'static str, id: String },

    #[error("Record {table}/{id} no longer matches the update guard")]
    Conflict { table: &'static str, id: String },

    #[error("Record {table}/{id} is held only by an unreachable store")]
    Unavailable { table: &'static str, id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Snapshot I/O error: {0}")]
    Snapshot(#[from] std::io::Error),

    #[error("Fallback store error: {0}")]
    Fallback(String),
}

impl StoreError {
    /// Errors the dual-path layer recovers from by switching to the fallback store.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Primary(_) | StoreError::Timeout(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreSource {
    Primary,
    Fallback,
}

/// A value tagged with the store that produced it.
#[derive(Debug, Clone)]
pub struct Sourced<T> {
    pub value: T,
    pub source: StoreSource,
}

impl<T> Sourced<T> {
    pub fn primary(value: T) -> Self {
        Self { value, source: StoreSource::Primary }
    }

    pub fn fallback(value: T) -> Self {
        Self { value, source: StoreSource::Fallback }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == StoreSource::Fallback
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sourced<U> {
        Sourced { value: f(self.value), source: self.source }
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

/// When a read also consults the fallback store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPolicy {
    /// Only when the primary errors or returns nothing.
    #[default]
    FallbackOnEmpty,
    /// Always; results are unioned with primary taking precedence.
    AlwaysMerge,
}

/// Result of a user-facing list view. `placeholder` marks a synthesized
/// explanatory entry that does not exist in any store.
#[derive(Debug, Clone, Serialize)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub placeholder: bool,
}

impl<T> Listing<T> {
    pub fn records(items: Vec<T>) -> Self {
        Self { items, placeholder: false }
    }

    pub fn placeholder(item: T) -> Self {
        Self { items: vec![item], placeholder: true }
    }

    /// Real records, never the placeholder.
    pub fn records_only(&self) -> &[T] {
        if self.placeholder { &[] } else { &self.items }
    }
}

#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    /// Insert or replace by id.
    async fn insert(&self, entity: &T) -> Result<T, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<T>, StoreError>;

    async fn list(&self, filter: &Filter) -> Result<Vec<T>, StoreError>;

    /// Replace an existing record. `None` when no record has that id.
    async fn update(&self, entity: &T) -> Result<Option<T>, StoreError>;

    /// [`update`](Self::update) that only applies while the stored record
    /// matches `guard`. A record that exists but fails the guard is a `Conflict`.
    async fn update_where(&self, entity: &T, guard: &Filter) -> Result<Option<T>, StoreError>;

    /// Insert unless the id is taken. Returns the stored record and whether it was created.
    async fn insert_if_absent(&self, entity: &T) -> Result<(T, bool), StoreError>;
}

// ==============================================================================
// FILTERS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq { field: String, value: Value },
    Lt { field: String, value: Value },
}

/// Field conditions plus ordering and limit. Rendered as PostgREST query
/// parameters for the primary store and evaluated over JSON for the fallback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
    pub order: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq { field: field.to_string(), value: value.into() });
        self
    }

    pub fn lt(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Lt { field: field.to_string(), value: value.into() });
        self
    }

    pub fn lt_time(self, field: &str, value: DateTime<Utc>) -> Self {
        self.lt(field, value.to_rfc3339())
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn to_query(&self) -> String {
        let mut params: Vec<String> = self.conditions.iter()
            .map(|condition| match condition {
                Condition::Eq { field, value } => {
                    format!("{}=eq.{}", field, urlencoding::encode(&value_text(value)))
                }
                Condition::Lt { field, value } => {
                    format!("{}=lt.{}", field, urlencoding::encode(&value_text(value)))
                }
            })
            .collect();

        if let Some((field, direction)) = &self.order {
            let dir = match direction {
                Direction::Asc => "asc",
                Direction::Desc => "desc",
            };
            params.push(format!("order={}.{}", field, dir));
        }

        if let Some(limit) = self.limit {
            params.push(format!("limit={}", limit));
        }

        params.join("&")
    }

    pub fn matches(&self, record: &Value) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::Eq { field, value } => record.get(field)
                .map(|actual| value_text(actual) == value_text(value))
                .unwrap_or(false),
            Condition::Lt { field, value } => record.get(field)
                .map(|actual| compare_values(actual, value) == Ordering::Less)
                .unwrap_or(false),
        })
    }

    /// Sort and truncate already-filtered JSON records.
    pub fn arrange(&self, mut records: Vec<Value>) -> Vec<Value> {
        if let Some((field, direction)) = &self.order {
            records.sort_by(|a, b| {
                let ordering = compare_values(
                    a.get(field).unwrap_or(&Value::Null),
                    b.get(field).unwrap_or(&Value::Null),
                )
                .then_with(|| compare_values(
                    a.get("id").unwrap_or(&Value::Null),
                    b.get("id").unwrap_or(&Value::Null),
                ));
                match direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = self.limit {
            records.truncate(limit);
        }

        records
    }

    /// Filter, sort and truncate JSON records.
    pub fn apply(&self, records: impl IntoIterator<Item = Value>) -> Vec<Value> {
        let matching = records.into_iter()
            .filter(|record| self.matches(record))
            .collect();
        self.arrange(matching)
    }

    /// Sort and truncate typed entities using their JSON representation.
    pub fn arrange_entities<T: Entity>(&self, entities: Vec<T>) -> Result<Vec<T>, StoreError> {
        if self.order.is_none() && self.limit.is_none() {
            return Ok(entities);
        }

        let values = entities.iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;

        self.arrange(values)
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(StoreError::from))
            .collect()
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Timestamps compare chronologically, numbers numerically, everything else as text.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => {
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        _ => value_text(a).cmp(&value_text(b)),
    }
}
