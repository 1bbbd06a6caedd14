use std::collections::HashMap;
use std::sync::Mutex;

use super::state::CredentialId;

/// Chooses which of a set of eligible candidates to hand out next.
/// Candidates are pre-filtered by the pool (provider match, active state,
/// no cooldown) before being offered to the selector.
pub trait Selector: Send + Sync {
    fn select(&self, provider: &str, model: Option<&str>, candidates: &[CredentialId]) -> Option<CredentialId>;
}

/// Stable-order scan: always returns the first eligible candidate. This is
/// the pool's original behavior and remains the default.
#[derive(Default)]
pub struct FillFirstSelector;

impl Selector for FillFirstSelector {
    fn select(&self, _provider: &str, _model: Option<&str>, candidates: &[CredentialId]) -> Option<CredentialId> {
        candidates.first().copied()
    }
}

/// Round-robins across eligible candidates, keyed by (provider, model) so a
/// cursor advances independently per routing group. An id that drops out of
/// the candidate set (disabled, cooled down) is skipped without resetting
/// the cursor for ids that remain.
#[derive(Default)]
pub struct RoundRobinSelector {
    cursors: Mutex<HashMap<(String, Option<String>), usize>>,
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Selector for RoundRobinSelector {
    fn select(&self, provider: &str, model: Option<&str>, candidates: &[CredentialId]) -> Option<CredentialId> {
        if candidates.is_empty() {
            return None;
        }
        let key = (provider.to_string(), model.map(|m| m.to_string()));
        let mut cursors = self.cursors.lock().expect("selector cursor lock poisoned");
        let cursor = cursors.entry(key).or_insert(0);
        let idx = *cursor % candidates.len();
        *cursor = (*cursor + 1) % candidates.len();
        candidates.get(idx).copied()
    }
}

/// Retry budget used by the credential acquisition/retry loop.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub max_retry_interval: std::time::Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_retry_interval: std::time::Duration::from_secs(30),
        }
    }
}
