//! Hot-reload watcher for the credential directory: detects file add/modify/
//! delete, debounces bursts of filesystem events, and diffs the observed
//! records against the last known set by content hash so unchanged files
//! never produce a spurious update.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use spx_provider_core::{Auth, Credential, CredentialId};
use spx_storage::{AuthFileRecord, AuthFileStore};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

const DEBOUNCE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WatcherState {
    Stopped = 0,
    Running = 1,
    Degraded = 2,
}

impl WatcherState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => WatcherState::Running,
            2 => WatcherState::Degraded,
            _ => WatcherState::Stopped,
        }
    }
}

#[derive(Debug, Clone)]
pub enum AuthUpdate {
    Add(Auth),
    Modify(Auth),
    Delete(CredentialId),
}

pub struct WatcherHandle {
    state: Arc<AtomicU8>,
    _watcher: RecommendedWatcher,
}

impl WatcherHandle {
    pub fn state(&self) -> WatcherState {
        WatcherState::from_u8(self.state.load(Ordering::Relaxed))
    }
}

/// Normalizes list-valued attributes (trim, case-fold, dedupe, sort) before
/// hashing so `"A, b"` and `"b, a"` hash identically to `"a,b"`.
fn normalize_list_attr(value: &str) -> String {
    let mut items: Vec<String> = value
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    items.sort();
    items.dedup();
    items.join(",")
}

const LIST_VALUED_ATTRS: &[&str] = &["models", "excluded-models"];

fn content_hash(record: &AuthFileRecord) -> blake3::Hash {
    let mut attrs: Vec<(String, String)> = record
        .attributes
        .iter()
        .map(|(k, v)| {
            let v = if LIST_VALUED_ATTRS.contains(&k.as_str()) {
                normalize_list_attr(v)
            } else {
                v.clone()
            };
            (k.clone(), v)
        })
        .collect();
    attrs.sort();

    let mut metadata: Vec<(String, String)> = record
        .metadata
        .iter()
        .map(|(k, v)| (k.clone(), v.to_string()))
        .collect();
    metadata.sort();

    let mut hasher = blake3::Hasher::new();
    hasher.update(record.provider.as_bytes());
    hasher.update(record.label.as_deref().unwrap_or("").as_bytes());
    hasher.update(record.prefix.as_deref().unwrap_or("").as_bytes());
    hasher.update(&[record.disabled as u8]);
    for (k, v) in &attrs {
        hasher.update(k.as_bytes());
        hasher.update(v.as_bytes());
    }
    for (k, v) in &metadata {
        hasher.update(k.as_bytes());
        hasher.update(v.as_bytes());
    }
    if let Ok(cred_bytes) = serde_json::to_vec(&record.credential) {
        hasher.update(&cred_bytes);
    }
    hasher.finalize()
}

/// Scans the store once, diffs it against `known` by content hash, and
/// returns both the updates to apply and the refreshed hash table.
async fn diff_once(
    store: &AuthFileStore,
    known: &HashMap<CredentialId, blake3::Hash>,
) -> anyhow::Result<(Vec<AuthUpdate>, HashMap<CredentialId, blake3::Hash>)> {
    let records = store.list().await?;

    let mut next = HashMap::with_capacity(records.len());
    let mut updates = Vec::new();

    for record in records {
        let hash = content_hash(&record);
        next.insert(record.id, hash);
        match known.get(&record.id) {
            None => updates.push(AuthUpdate::Add(record.into())),
            Some(prev) if *prev != hash => updates.push(AuthUpdate::Modify(record.into())),
            Some(_) => {}
        }
    }
    for id in known.keys() {
        if !next.contains_key(id) {
            updates.push(AuthUpdate::Delete(*id));
        }
    }
    Ok((updates, next))
}

/// Starts watching `dir` for credential file changes, debouncing bursts of
/// filesystem events into a single rescan ~100ms after the last event.
/// Diffed updates are pushed onto `tx`; the caller is responsible for
/// applying them to the Credential Manager / `CredentialPool`.
pub fn spawn_watcher(dir: PathBuf, tx: mpsc::Sender<AuthUpdate>) -> notify::Result<WatcherHandle> {
    let state = Arc::new(AtomicU8::new(WatcherState::Stopped as u8));
    let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = raw_tx.send(res);
        },
        notify::Config::default(),
    )?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    state.store(WatcherState::Running as u8, Ordering::Relaxed);

    let store = AuthFileStore::new(dir);
    let state_for_task = state.clone();
    tokio::spawn(async move {
        let mut known: HashMap<CredentialId, blake3::Hash> = HashMap::new();
        // Initial scan establishes the baseline without emitting Add for
        // every pre-existing file at startup.
        if let Ok((_initial_updates, next)) = diff_once(&store, &known).await {
            known = next;
        }

        loop {
            let Some(first) = raw_rx.recv().await else {
                state_for_task.store(WatcherState::Stopped as u8, Ordering::Relaxed);
                break;
            };
            if first.is_err() {
                state_for_task.store(WatcherState::Degraded as u8, Ordering::Relaxed);
            }
            // Debounce: drain anything else that arrives within the window.
            let deadline = Instant::now() + DEBOUNCE;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                match tokio::time::timeout(remaining, raw_rx.recv()).await {
                    Ok(Some(_)) => continue,
                    Ok(None) => return,
                    Err(_) => break,
                }
            }

            match diff_once(&store, &known).await {
                Ok((updates, next)) => {
                    known = next;
                    state_for_task.store(WatcherState::Running as u8, Ordering::Relaxed);
                    for update in updates {
                        if tx.send(update).await.is_err() {
                            return;
                        }
                    }
                }
                Err(_) => {
                    state_for_task.store(WatcherState::Degraded as u8, Ordering::Relaxed);
                }
            }
        }
    });

    Ok(WatcherHandle {
        state,
        _watcher: watcher,
    })
}

/// Applies a watcher-produced update to a provider's credential pool and
/// returns whether the model registry needs rebuilding.
pub async fn apply_update(pool: &spx_provider_core::CredentialPool, update: AuthUpdate) {
    match update {
        AuthUpdate::Add(auth) | AuthUpdate::Modify(auth) => pool.upsert_full(auth).await,
        AuthUpdate::Delete(id) => pool.remove(id).await,
    }
}

/// Applies a watcher-produced update against the live provider set: `Add`
/// and `Modify` route to the named provider's pool (a provider absent from
/// the running configuration is skipped, since there's nowhere to put it),
/// `Delete` is broadcast to every pool since the id's provider isn't known
/// without a lookup that's no longer there to do.
pub async fn apply_update_to_state(state: &crate::state::AppState, update: AuthUpdate) {
    let providers = state.providers.load();
    match update {
        AuthUpdate::Add(auth) | AuthUpdate::Modify(auth) => {
            if let Some(runtime) = providers.get(&auth.provider) {
                runtime.pool.upsert_full(auth).await;
            }
        }
        AuthUpdate::Delete(id) => {
            for runtime in providers.values() {
                runtime.pool.remove(id).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spx_provider_core::credential::ApiKeyCredential;
    use std::collections::HashMap as StdHashMap;

    fn record(id: CredentialId, models: &str) -> AuthFileRecord {
        let now = time::OffsetDateTime::now_utc();
        let mut attributes = StdHashMap::new();
        attributes.insert("models".to_string(), models.to_string());
        AuthFileRecord {
            id,
            provider: "openai".to_string(),
            label: None,
            prefix: None,
            disabled: false,
            attributes,
            metadata: StdHashMap::new(),
            proxy_url: None,
            created_at: now,
            updated_at: now,
            credential: Credential::OpenAI(ApiKeyCredential {
                api_key: "sk".to_string(),
            }),
        }
    }

    #[test]
    fn normalized_list_order_hashes_identically() {
        let a = record(1, "gpt-4o, gpt-4o-mini");
        let b = record(1, "GPT-4O-MINI,  gpt-4o");
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn different_models_hash_differently() {
        let a = record(1, "gpt-4o");
        let b = record(1, "gpt-4o-mini");
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[tokio::test]
    async fn diff_emits_add_then_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = AuthFileStore::new(tmp.path());
        store.write(record(1, "gpt-4o")).await.unwrap();

        let known = StdHashMap::new();
        let (updates, next) = diff_once(&store, &known).await.unwrap();
        assert_eq!(updates.len(), 1);
        assert!(matches!(updates[0], AuthUpdate::Add(_)));

        let (updates_again, _) = diff_once(&store, &next).await.unwrap();
        assert!(updates_again.is_empty());
    }

    #[tokio::test]
    async fn diff_emits_delete_when_file_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let store = AuthFileStore::new(tmp.path());
        store.write(record(7, "gpt-4o")).await.unwrap();
        let (_, known) = diff_once(&store, &StdHashMap::new()).await.unwrap();

        store.delete(7).await.unwrap();
        let (updates, _) = diff_once(&store, &known).await.unwrap();
        assert_eq!(updates.len(), 1);
        assert!(matches!(updates[0], AuthUpdate::Delete(7)));
    }
}
