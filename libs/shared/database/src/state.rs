// libs/shared/database/src/state.rs
use std::sync::Arc;

use shared_config::AppConfig;

use crate::dual_path::DualPathStore;
use crate::fallback::FallbackStore;
use crate::identity::{IdentityLookup, SupabaseIdentityLookup};
use crate::primary::SupabaseRepository;
use crate::snapshot::PersistenceSnapshot;
use crate::store::{Entity, Repository};
use crate::supabase::SupabaseClient;

/// Process-wide state shared by every cell router.
pub struct AppState {
    pub config: AppConfig,
    pub supabase: Arc<SupabaseClient>,
    pub fallback: Arc<FallbackStore>,
    pub identity: Arc<dyn IdentityLookup>,
}

impl AppState {
    /// Restores the fallback store from the configured snapshot.
    pub fn new(config: AppConfig) -> Self {
        let snapshot = PersistenceSnapshot::new(config.fallback_snapshot_path.clone());
        Self::with_fallback(config, Arc::new(FallbackStore::open(snapshot)))
    }

    pub fn with_fallback(config: AppConfig, fallback: Arc<FallbackStore>) -> Self {
        let supabase = Arc::new(SupabaseClient::new(&config));
        let identity = Arc::new(SupabaseIdentityLookup::new(
            Arc::clone(&supabase),
            config.primary_bearer().map(str::to_string),
        ));

        Self {
            config,
            supabase,
            fallback,
            identity,
        }
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentityLookup>) -> Self {
        self.identity = identity;
        self
    }

    /// Dual-path store for `T` over the Supabase table and the shared fallback.
    pub fn store<T: Entity>(&self) -> DualPathStore<T> {
        let primary: Arc<dyn Repository<T>> = Arc::new(SupabaseRepository::<T>::new(
            Arc::clone(&self.supabase),
            self.config.primary_bearer().map(str::to_string),
        ));
        let fallback: Arc<dyn Repository<T>> = self.fallback.clone();

        DualPathStore::new(primary, fallback, self.config.primary_timeout())
    }
}
