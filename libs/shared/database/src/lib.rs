//! Persistence for the clinic cells.
//!
//! The primary store is Supabase (PostgREST). [`FallbackStore`] is an
//! in-process substitute persisted through [`PersistenceSnapshot`], and
//! [`DualPathStore`] combines the two behind the [`Repository`] interface
//! so services never branch on which store answered.

pub mod dual_path;
pub mod fallback;
pub mod identity;
pub mod primary;
pub mod snapshot;
pub mod state;
pub mod store;
pub mod supabase;

pub use dual_path::DualPathStore;
pub use fallback::FallbackStore;
pub use identity::{IdentityLookup, SupabaseIdentityLookup, UserIdentity};
pub use primary::SupabaseRepository;
pub use snapshot::{PersistenceSnapshot, SnapshotDocument};
pub use state::AppState;
pub use store::{
    tables, Condition, Direction, Entity, Filter, Listing, ReadPolicy, Repository, Sourced,
    StoreError, StoreSource,
};
