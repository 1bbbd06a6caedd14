use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::Mutex as AsyncMutex;

use crate::Credential;

use super::state::CredentialId;

/// Lifecycle status of an `Auth` record, independent of the transient
/// cooldown bookkeeping `CredentialPool` already tracks per-model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    Active,
    Disabled,
    Cooldown,
    Expired,
}

/// Per-model quota bookkeeping for a single `Auth` record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelQuota {
    pub used: u64,
    pub limit: Option<u64>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub exceeded_until: Option<OffsetDateTime>,
}

impl ModelQuota {
    pub fn is_exhausted(&self, now: OffsetDateTime) -> bool {
        match self.exceeded_until {
            Some(until) => until > now,
            None => false,
        }
    }
}

/// The secret material backing one or more `Auth` records. Virtual/shared
/// accounts point several `Auth::runtime` handles at the same cell so a
/// single token refresh is visible to every record sharing it.
pub type SharedRuntime = Arc<AsyncMutex<Credential>>;

/// Unified credential record, per the external auth-directory contract:
/// one of these is synthesized per source (config block or hot-reloaded
/// file) and carries everything the selector and refresher need.
#[derive(Debug, Clone)]
pub struct Auth {
    pub id: CredentialId,
    pub provider: String,
    pub label: Option<String>,
    pub prefix: Option<String>,
    pub status: AuthStatus,
    pub attributes: HashMap<String, String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub runtime: SharedRuntime,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub last_refreshed_at: Option<OffsetDateTime>,
    pub next_refresh_after: Option<OffsetDateTime>,
    pub disabled: bool,
    pub proxy_url: Option<String>,
    pub quota: HashMap<String, ModelQuota>,
}

impl Auth {
    pub fn new(id: CredentialId, provider: impl Into<String>, credential: Credential) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id,
            provider: provider.into(),
            label: None,
            prefix: None,
            status: AuthStatus::Active,
            attributes: HashMap::new(),
            metadata: HashMap::new(),
            runtime: Arc::new(AsyncMutex::new(credential)),
            created_at: now,
            updated_at: now,
            last_refreshed_at: None,
            next_refresh_after: None,
            disabled: false,
            proxy_url: None,
            quota: HashMap::new(),
        }
    }

    /// Creates a second virtual record sharing this record's `Runtime`, so a
    /// refresh performed through either handle is visible to both.
    pub fn share(&self, id: CredentialId) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id,
            provider: self.provider.clone(),
            label: self.label.clone(),
            prefix: self.prefix.clone(),
            status: self.status,
            attributes: self.attributes.clone(),
            metadata: self.metadata.clone(),
            runtime: self.runtime.clone(),
            created_at: now,
            updated_at: now,
            last_refreshed_at: self.last_refreshed_at,
            next_refresh_after: self.next_refresh_after,
            disabled: self.disabled,
            proxy_url: self.proxy_url.clone(),
            quota: HashMap::new(),
        }
    }

    pub fn is_selectable(&self, now: OffsetDateTime) -> bool {
        if self.disabled || matches!(self.status, AuthStatus::Disabled | AuthStatus::Expired) {
            return false;
        }
        if matches!(self.status, AuthStatus::Cooldown) {
            return false;
        }
        !self
            .quota
            .values()
            .any(|q| q.limit.is_some() && q.is_exhausted(now))
    }

    pub fn quota_exhausted_for(&self, model: &str, now: OffsetDateTime) -> bool {
        self.quota
            .get(model)
            .map(|q| q.is_exhausted(now))
            .unwrap_or(false)
    }

    pub fn needs_refresh(&self, now: OffsetDateTime, lead_time: time::Duration) -> bool {
        match self.next_refresh_after {
            Some(at) => at <= now + lead_time,
            None => false,
        }
    }

    pub async fn snapshot_credential(&self) -> Credential {
        self.runtime.lock().await.clone()
    }
}
