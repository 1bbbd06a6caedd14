//! Maps a requested model name to the providers that can currently serve
//! it, derived from each credential's `models`/`excluded-models`
//! attributes. Readers take an `Arc` snapshot (copy-on-write): a rebuild
//! never blocks an in-flight read.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::state::ProviderRuntime;

#[derive(Debug, Clone, Default)]
struct Snapshot {
    /// model name -> providers (in registration order) that serve it.
    by_model: HashMap<String, Vec<String>>,
}

pub struct ModelRegistry {
    snapshot: ArcSwap<Snapshot>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
        }
    }

    /// Returns providers that explicitly list `model`, in registration
    /// order. An empty result means no provider declared support for this
    /// exact model name; the caller should fall back to its default.
    pub fn providers_for_model(&self, model: &str) -> Vec<String> {
        self.snapshot
            .load()
            .by_model
            .get(model)
            .cloned()
            .unwrap_or_default()
    }

    /// Rebuilds the snapshot from the live provider map. Each credential's
    /// `models` attribute (comma-separated) lists what it serves; a
    /// credential with no `models` attribute is assumed to serve every
    /// model of its provider and is not indexed here (it's covered by the
    /// default-provider fallback instead). `excluded-models` removes a
    /// model from that credential's contribution.
    pub async fn rebuild(&self, providers: &HashMap<String, Arc<ProviderRuntime>>) {
        let mut by_model: HashMap<String, Vec<String>> = HashMap::new();
        for (name, runtime) in providers {
            for auth in runtime.pool.list().await {
                let Some(models) = auth.attributes.get("models") else {
                    continue;
                };
                let excluded: Vec<&str> = auth
                    .attributes
                    .get("excluded-models")
                    .map(|v| v.split(',').map(str::trim).collect())
                    .unwrap_or_default();
                for model in models.split(',').map(str::trim).filter(|m| !m.is_empty()) {
                    if excluded.contains(&model) {
                        continue;
                    }
                    let entry = by_model.entry(model.to_string()).or_default();
                    if !entry.contains(name) {
                        entry.push(name.clone());
                    }
                }
            }
        }
        self.snapshot.store(Arc::new(Snapshot { by_model }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_returns_no_providers() {
        let registry = ModelRegistry::new();
        assert!(registry.providers_for_model("gpt-4o").is_empty());
    }
}
