use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::events::{Event, ModelUnavailableStartEvent, OperationalEvent, UnavailableStartEvent};
use crate::{Credential, CredentialId, CredentialState, EventHub, UnavailableReason};

use super::auth::{Auth, AuthStatus, ModelQuota};
use super::model_unavailable_queue::ModelUnavailableQueue;
use super::selector::{FillFirstSelector, RetryConfig, Selector};
use super::unavailable_queue::UnavailableQueue;

type ModelStateKey = (CredentialId, String);
type ModelStateValue = (Instant, UnavailableReason);

#[derive(Debug, Clone)]
pub enum AcquireError {
    ProviderUnknown,
    NoActiveCredentials,
}

pub struct CredentialPool {
    auths: RwLock<HashMap<CredentialId, Auth>>,
    by_provider: RwLock<HashMap<String, Vec<CredentialId>>>,
    states: Arc<RwLock<HashMap<CredentialId, CredentialState>>>,
    model_states: Arc<RwLock<HashMap<ModelStateKey, ModelStateValue>>>,
    events: EventHub,
    queue: Arc<UnavailableQueue>,
    model_queue: Arc<ModelUnavailableQueue>,
    selector: RwLock<Box<dyn Selector>>,
    retry_config: RwLock<RetryConfig>,
}

impl CredentialPool {
    pub fn new(events: EventHub) -> Self {
        let states = Arc::new(RwLock::new(HashMap::new()));
        let model_states = Arc::new(RwLock::new(HashMap::new()));
        let queue = Arc::new(UnavailableQueue::new());
        let model_queue = Arc::new(ModelUnavailableQueue::new());
        queue
            .clone()
            .spawn_recover_task(states.clone(), events.clone());
        model_queue
            .clone()
            .spawn_recover_task(model_states.clone(), events.clone());
        Self {
            auths: RwLock::new(HashMap::new()),
            by_provider: RwLock::new(HashMap::new()),
            states,
            model_states,
            events,
            queue,
            model_queue,
            selector: RwLock::new(Box::new(FillFirstSelector)),
            retry_config: RwLock::new(RetryConfig::default()),
        }
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    /// Swaps the candidate-selection policy (fill-first vs round-robin).
    pub async fn set_selector(&self, selector: Box<dyn Selector>) {
        *self.selector.write().await = selector;
    }

    pub async fn set_retry_config(&self, config: RetryConfig) {
        *self.retry_config.write().await = config;
    }

    pub async fn retry_config(&self) -> RetryConfig {
        *self.retry_config.read().await
    }

    /// Inserts or overwrites a full `Auth` record (hot-reload Add/Modify,
    /// or a startup load from the auth directory), replacing everything
    /// except the `Runtime` cell identity of an existing record at the
    /// same id so in-flight holders of the old `Arc` still see updates.
    pub async fn upsert_full(&self, mut auth: Auth) {
        let provider = auth.provider.clone();
        let id = auth.id;
        let incoming_cred = auth.runtime.lock().await.clone();
        {
            let mut auths = self.auths.write().await;
            if let Some(existing) = auths.get(&id) {
                auth.runtime = existing.runtime.clone();
                *auth.runtime.lock().await = incoming_cred;
            }
            auths.insert(id, auth);
        }
        let mut by_provider = self.by_provider.write().await;
        let ids = by_provider.entry(provider).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
        drop(by_provider);
        self.states
            .write()
            .await
            .entry(id)
            .or_insert(CredentialState::Active);
    }

    pub async fn insert(&self, provider: impl Into<String>, id: CredentialId, cred: Credential) {
        let provider = provider.into();
        {
            let mut auths = self.auths.write().await;
            match auths.get_mut(&id) {
                Some(existing) => {
                    *existing.runtime.lock().await = cred;
                    existing.updated_at = time::OffsetDateTime::now_utc();
                }
                None => {
                    auths.insert(id, Auth::new(id, provider.clone(), cred));
                }
            }
        }
        let mut by_provider = self.by_provider.write().await;
        let ids = by_provider.entry(provider).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
        self.states
            .write()
            .await
            .entry(id)
            .or_insert(CredentialState::Active);
    }

    /// Registers a virtual credential that shares its secret `Runtime` with
    /// an existing record. A refresh performed on either id is visible to
    /// both, per the shared-account invariant.
    pub async fn insert_shared(&self, provider: impl Into<String>, shares_from: CredentialId, id: CredentialId) -> bool {
        let provider = provider.into();
        let shared = {
            let auths = self.auths.read().await;
            auths.get(&shares_from).map(|a| a.share(id))
        };
        let Some(shared) = shared else {
            return false;
        };
        self.auths.write().await.insert(id, shared);
        let mut by_provider = self.by_provider.write().await;
        let ids = by_provider.entry(provider).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
        self.states
            .write()
            .await
            .entry(id)
            .or_insert(CredentialState::Active);
        true
    }

    pub async fn update_credential(&self, id: CredentialId, cred: Credential) {
        let auths = self.auths.read().await;
        if let Some(auth) = auths.get(&id) {
            *auth.runtime.lock().await = cred;
        }
    }

    /// Writes a fresh credential into a shared `Runtime`, touching every
    /// record that points at it, and records the refresh timestamps.
    pub async fn refresh_credential(
        &self,
        id: CredentialId,
        cred: Credential,
        next_refresh_after: Option<time::OffsetDateTime>,
    ) {
        let mut auths = self.auths.write().await;
        if let Some(auth) = auths.get_mut(&id) {
            *auth.runtime.lock().await = cred;
            let now = time::OffsetDateTime::now_utc();
            auth.last_refreshed_at = Some(now);
            auth.updated_at = now;
            auth.next_refresh_after = next_refresh_after;
            if auth.status == AuthStatus::Expired {
                auth.status = AuthStatus::Active;
            }
        }
    }

    pub async fn set_status(&self, id: CredentialId, status: AuthStatus) {
        if let Some(auth) = self.auths.write().await.get_mut(&id) {
            auth.status = status;
            auth.updated_at = time::OffsetDateTime::now_utc();
        }
    }

    pub async fn set_quota(&self, id: CredentialId, model: impl Into<String>, quota: ModelQuota) {
        if let Some(auth) = self.auths.write().await.get_mut(&id) {
            auth.quota.insert(model.into(), quota);
            auth.updated_at = time::OffsetDateTime::now_utc();
        }
    }

    pub async fn get_auth(&self, id: CredentialId) -> Option<Auth> {
        self.auths.read().await.get(&id).cloned()
    }

    pub async fn list(&self) -> Vec<Auth> {
        self.auths.read().await.values().cloned().collect()
    }

    pub async fn list_by_provider(&self, provider: &str) -> Vec<Auth> {
        let ids = self.by_provider.read().await.get(provider).cloned();
        let Some(ids) = ids else {
            return Vec::new();
        };
        let auths = self.auths.read().await;
        ids.into_iter().filter_map(|id| auths.get(&id).cloned()).collect()
    }

    /// Removes a record entirely (hot-reload Delete), dropping it from every
    /// index. Safe to call on an id that no longer shares its `Runtime` with
    /// anything else; other records sharing the same `Runtime` are left
    /// untouched.
    pub async fn remove(&self, id: CredentialId) {
        self.auths.write().await.remove(&id);
        let mut by_provider = self.by_provider.write().await;
        for ids in by_provider.values_mut() {
            ids.retain(|x| *x != id);
        }
        drop(by_provider);
        self.states.write().await.remove(&id);
        let mut model_states = self.model_states.write().await;
        model_states.retain(|(cred_id, _), _| *cred_id != id);
    }

    pub async fn set_enabled(&self, provider: &str, id: CredentialId, enabled: bool) {
        if enabled {
            let mut by_provider = self.by_provider.write().await;
            let ids = by_provider.entry(provider.to_string()).or_default();
            if !ids.contains(&id) {
                ids.push(id);
            }
            drop(by_provider);

            // If the credential was never inserted before, keep state as Active.
            self.states
                .write()
                .await
                .entry(id)
                .or_insert(CredentialState::Active);
            if let Some(auth) = self.auths.write().await.get_mut(&id) {
                auth.disabled = false;
            }
        } else {
            let mut by_provider = self.by_provider.write().await;
            if let Some(ids) = by_provider.get_mut(provider) {
                ids.retain(|x| *x != id);
            }
            let mut model_states = self.model_states.write().await;
            model_states.retain(|(cred_id, _), _| *cred_id != id);
            if let Some(auth) = self.auths.write().await.get_mut(&id) {
                auth.disabled = true;
            }
        }
    }

    async fn eligible_candidates(&self, provider: &str, model: Option<&str>) -> Result<Vec<CredentialId>, AcquireError> {
        let ids = {
            let guard = self.by_provider.read().await;
            guard.get(provider).cloned()
        };
        let Some(ids) = ids else {
            return Err(AcquireError::ProviderUnknown);
        };

        let now = time::OffsetDateTime::now_utc();
        let states = self.states.read().await;
        let model_states = self.model_states.read().await;
        let auths = self.auths.read().await;
        let candidates: Vec<CredentialId> = ids
            .into_iter()
            .filter(|id| matches!(states.get(id), Some(CredentialState::Active)))
            .filter(|id| {
                if let Some(model) = model {
                    let key = (*id, model.to_string());
                    match model_states.get(&key) {
                        Some((until, _reason)) => *until <= Instant::now(),
                        None => true,
                    }
                } else {
                    true
                }
            })
            .filter(|id| match auths.get(id) {
                Some(auth) => {
                    auth.is_selectable(now) && !model.is_some_and(|m| auth.quota_exhausted_for(m, now))
                }
                None => false,
            })
            .collect();
        Ok(candidates)
    }

    pub async fn acquire(
        &self,
        provider: &str,
    ) -> Result<(CredentialId, Credential), AcquireError> {
        self.acquire_inner(provider, None).await
    }

    pub async fn acquire_for_model(
        &self,
        provider: &str,
        model: &str,
    ) -> Result<(CredentialId, Credential), AcquireError> {
        self.acquire_inner(provider, Some(model)).await
    }

    async fn acquire_inner(
        &self,
        provider: &str,
        model: Option<&str>,
    ) -> Result<(CredentialId, Credential), AcquireError> {
        let candidates = self.eligible_candidates(provider, model).await?;
        let chosen = {
            let selector = self.selector.read().await;
            selector.select(provider, model, &candidates)
        };
        let Some(id) = chosen else {
            return Err(AcquireError::NoActiveCredentials);
        };
        let cred = {
            let auths = self.auths.read().await;
            let auth = auths.get(&id).ok_or(AcquireError::NoActiveCredentials)?;
            auth.runtime.clone()
        };
        let cred = cred.lock().await.clone();
        Ok((id, cred))
    }

    pub async fn mark_unavailable(
        &self,
        credential_id: CredentialId,
        duration: Duration,
        reason: UnavailableReason,
    ) {
        let until_instant = Instant::now() + duration;
        {
            let mut guard = self.states.write().await;
            guard.insert(
                credential_id,
                CredentialState::Unavailable {
                    until: until_instant,
                    reason,
                },
            );
        }
        self.queue.push(until_instant, credential_id).await;

        let until_wall = SystemTime::now()
            .checked_add(duration)
            .unwrap_or_else(SystemTime::now);
        self.events
            .emit(Event::Operational(OperationalEvent::UnavailableStart(
                UnavailableStartEvent {
                    at: SystemTime::now(),
                    credential_id,
                    reason,
                    until: until_wall,
                },
            )))
            .await;
    }

    pub async fn mark_model_unavailable(
        &self,
        credential_id: CredentialId,
        model: impl Into<String>,
        duration: Duration,
        reason: UnavailableReason,
    ) {
        let model = model.into();
        let until_instant = Instant::now() + duration;
        {
            let mut guard = self.model_states.write().await;
            guard.insert((credential_id, model.clone()), (until_instant, reason));
        }
        self.model_queue
            .push(until_instant, credential_id, model.clone())
            .await;

        let until_wall = SystemTime::now()
            .checked_add(duration)
            .unwrap_or_else(SystemTime::now);
        self.events
            .emit(Event::Operational(OperationalEvent::ModelUnavailableStart(
                ModelUnavailableStartEvent {
                    at: SystemTime::now(),
                    credential_id,
                    model,
                    reason,
                    until: until_wall,
                },
            )))
            .await;
    }

    pub async fn state(&self, credential_id: CredentialId) -> Option<CredentialState> {
        self.states.read().await.get(&credential_id).cloned()
    }

    pub async fn model_states(
        &self,
        credential_id: CredentialId,
    ) -> Vec<(String, Instant, UnavailableReason)> {
        let now = Instant::now();
        let guard = self.model_states.read().await;
        let mut rows = Vec::new();
        for ((id, model), (until, reason)) in guard.iter() {
            if *id != credential_id {
                continue;
            }
            if *until <= now {
                continue;
            }
            rows.push((model.clone(), *until, *reason));
        }
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    /// True if at least one candidate for `provider`/`model` would currently
    /// be returned by `acquire`/`acquire_for_model` — used by the retry loop
    /// to decide whether another attempt is worth making before giving up.
    pub async fn has_candidate(&self, provider: &str, model: Option<&str>) -> bool {
        match self.eligible_candidates(provider, model).await {
            Ok(candidates) => !candidates.is_empty(),
            Err(_) => false,
        }
    }

    /// Iterates every record whose `next_refresh_after` has fallen within
    /// `lead_time` of now. The caller (background refresher) is responsible
    /// for actually exchanging the token and calling `refresh_credential`.
    pub async fn due_for_refresh(&self, lead_time: time::Duration) -> Vec<Auth> {
        let now = time::OffsetDateTime::now_utc();
        self.auths
            .read()
            .await
            .values()
            .filter(|a| a.needs_refresh(now, lead_time))
            .cloned()
            .collect()
    }
}
