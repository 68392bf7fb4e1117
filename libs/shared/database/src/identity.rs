// libs/shared/database/src/identity.rs
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::supabase::SupabaseClient;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// Resolves a user id to a human-readable identity. Callers treat every error as "unknown".
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn lookup(&self, user_id: &str) -> Result<Option<UserIdentity>>;
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    username: Option<String>,
    full_name: Option<String>,
    avatar_url: Option<String>,
}

/// Reads the `profiles` table of the primary store.
pub struct SupabaseIdentityLookup {
    supabase: Arc<SupabaseClient>,
    bearer: Option<String>,
}

impl SupabaseIdentityLookup {
    pub fn new(supabase: Arc<SupabaseClient>, bearer: Option<String>) -> Self {
        Self { supabase, bearer }
    }
}

#[async_trait]
impl IdentityLookup for SupabaseIdentityLookup {
    async fn lookup(&self, user_id: &str) -> Result<Option<UserIdentity>> {
        let path = format!(
            "/rest/v1/profiles?id=eq.{}&select=username,full_name,avatar_url&limit=1",
            urlencoding::encode(user_id)
        );

        let rows: Vec<ProfileRow> = self.supabase
            .request(Method::GET, &path, self.bearer.as_deref(), None)
            .await?;

        let identity = rows.into_iter().next().and_then(|row| {
            let display_name = row.username.or(row.full_name)?;
            Some(UserIdentity { display_name, avatar_url: row.avatar_url })
        });

        debug!("Identity lookup for {}: found={}", user_id, identity.is_some());
        Ok(identity)
    }
}
