//! Default provider rows seeded into storage on first boot.
//!
//! Each entry lets a fresh deployment start with every built-in provider
//! present (disabled by default, using provider defaults) instead of forcing
//! an operator to hand-author a row for every supported channel before the
//! proxy will route anything.

use spx_provider_core::config::{LocalServerConfig, ProviderConfig};

pub struct BuiltinProviderSeed {
    pub name: &'static str,
    pub config_json: serde_json::Value,
    pub enabled: bool,
}

fn seed(name: &'static str, config: ProviderConfig) -> BuiltinProviderSeed {
    BuiltinProviderSeed {
        name,
        config_json: serde_json::to_value(&config).unwrap_or_default(),
        enabled: false,
    }
}

/// Seeds for every built-in provider that has a sensible default
/// configuration. `custom` is excluded: its config has no meaningful
/// default (id/base_url/dispatch are per-deployment) and is only ever
/// created through the operator-authored config file.
pub fn builtin_provider_seeds() -> Vec<BuiltinProviderSeed> {
    vec![
        seed("openai", ProviderConfig::OpenAI(Default::default())),
        seed("claude", ProviderConfig::Claude(Default::default())),
        seed("aistudio", ProviderConfig::AIStudio(Default::default())),
        seed(
            "vertexexpress",
            ProviderConfig::VertexExpress(Default::default()),
        ),
        seed("vertex", ProviderConfig::Vertex(Default::default())),
        seed("geminicli", ProviderConfig::GeminiCli(Default::default())),
        seed("claudecode", ProviderConfig::ClaudeCode(Default::default())),
        seed("codex", ProviderConfig::Codex(Default::default())),
        seed(
            "antigravity",
            ProviderConfig::Antigravity(Default::default()),
        ),
        seed("nvidia", ProviderConfig::Nvidia(Default::default())),
        seed("deepseek", ProviderConfig::DeepSeek(Default::default())),
        seed(
            "ollama",
            ProviderConfig::LocalServer(LocalServerConfig {
                base_url: None,
                default_port: 11434,
            }),
        ),
        seed(
            "opencode",
            ProviderConfig::LocalServer(LocalServerConfig {
                base_url: None,
                default_port: 4096,
            }),
        ),
    ]
}
