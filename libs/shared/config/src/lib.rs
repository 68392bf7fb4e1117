use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_SNAPSHOT_PATH: &str = "data/fallback-store.json";
const DEFAULT_PRIMARY_TIMEOUT_MS: u64 = 3000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub supabase_service_role_key: String,
    pub fallback_snapshot_path: PathBuf,
    pub primary_timeout_ms: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    info!("SUPABASE_SERVICE_ROLE_KEY not set, primary store will use the anon key");
                    String::new()
                }),
            fallback_snapshot_path: env::var("FALLBACK_SNAPSHOT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    info!("FALLBACK_SNAPSHOT_PATH not set, using default: {}", DEFAULT_SNAPSHOT_PATH);
                    PathBuf::from(DEFAULT_SNAPSHOT_PATH)
                }),
            primary_timeout_ms: env::var("PRIMARY_STORE_TIMEOUT_MS")
                .ok()
                .and_then(|raw| {
                    raw.parse::<u64>()
                        .map_err(|e| warn!("Invalid PRIMARY_STORE_TIMEOUT_MS value {}: {}", raw, e))
                        .ok()
                })
                .unwrap_or(DEFAULT_PRIMARY_TIMEOUT_MS),
        };

        if !config.is_configured() {
            warn!("Primary store not configured - requests will be served from the fallback store");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn primary_timeout(&self) -> Duration {
        Duration::from_millis(self.primary_timeout_ms)
    }

    /// Bearer token for primary-store calls. `None` means "apikey header only".
    pub fn primary_bearer(&self) -> Option<&str> {
        if self.supabase_service_role_key.is_empty() {
            None
        } else {
            Some(&self.supabase_service_role_key)
        }
    }
}
