//! YAML configuration file support.
//!
//! The config file is optional: CLI flags and environment variables always
//! take precedence, the file fills in anything left unset, and built-in
//! defaults fill in the rest. See `resolve_config_path` for search order.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use spx_common::GlobalConfigPatch;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// `"round_robin"` or `"fill_first"`. Unrecognized values fall back to
    /// fill-first and are logged, not rejected.
    pub strategy: Option<String>,
}

/// Top-level shape of the YAML config file, per the external config
/// contract. Provider blocks are kept as opaque YAML values here; they are
/// interpreted when seeding provider configs, not at parse time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyFileConfig {
    pub port: Option<u16>,
    pub host: Option<String>,
    #[serde(rename = "auth-dir")]
    pub auth_dir: Option<String>,
    #[serde(default)]
    pub geminicli: Option<serde_yaml::Value>,
    #[serde(default)]
    pub claudecli: Option<serde_yaml::Value>,
    #[serde(default)]
    pub codex: Option<serde_yaml::Value>,
    #[serde(rename = "openai-compatibility", default)]
    pub openai_compatibility: Vec<serde_yaml::Value>,
    #[serde(rename = "switchai-key", default)]
    pub switchai_key: Vec<String>,
    #[serde(default)]
    pub ollama: Option<serde_yaml::Value>,
    #[serde(default)]
    pub opencode: Option<serde_yaml::Value>,
    #[serde(rename = "vertex-compat", default)]
    pub vertex_compat: Option<serde_yaml::Value>,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(rename = "request-retry")]
    pub request_retry: Option<u32>,
    #[serde(rename = "max-retry-interval")]
    pub max_retry_interval: Option<u64>,
    #[serde(rename = "oauth-excluded-models", default)]
    pub oauth_excluded_models: Vec<String>,
}

impl ProxyFileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config file {}: {e}", path.display()))?;
        let cfg: ProxyFileConfig = serde_yaml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("parsing config file {}: {e}", path.display()))?;
        Ok(cfg)
    }

    /// Projects the fields this file shares with `GlobalConfig` into an
    /// overlay patch. Host/port from CLI or ENV still win: the caller
    /// applies this patch before the CLI/ENV patch, not after.
    pub fn as_global_patch(&self) -> GlobalConfigPatch {
        GlobalConfigPatch {
            host: self.host.clone(),
            port: self.port,
            admin_key_hash: None,
            proxy: None,
            dsn: None,
            event_redact_sensitive: None,
        }
    }

    pub fn auth_dir_or_default(&self) -> PathBuf {
        if let Some(dir) = &self.auth_dir {
            return PathBuf::from(dir);
        }
        if let Ok(state_dir) = std::env::var("SWITCHAI_STATE_DIR") {
            return PathBuf::from(state_dir).join("auth");
        }
        PathBuf::from("./auth")
    }
}

/// Search order: explicit `--config`/`SWITCHPROXY_CONFIG` path, then
/// `./switchproxy.yaml` in the current directory if it exists. Returns
/// `None` when nothing is found, which is not an error: the file is
/// optional.
pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(explicit) = explicit {
        return Some(PathBuf::from(explicit));
    }
    if let Ok(env_path) = std::env::var("SWITCHPROXY_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    let default_path = PathBuf::from("switchproxy.yaml");
    if default_path.exists() {
        return Some(default_path);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_documented_keys() {
        let yaml = r#"
port: 8080
host: "0.0.0.0"
auth-dir: "/var/lib/switchproxy/auth"
geminicli:
  enabled: true
openai-compatibility:
  - name: "local"
    base-url: "http://localhost:1234"
switchai-key:
  - "sk-abc"
ollama:
  base-url: "http://localhost:11434"
routing:
  strategy: "round_robin"
request-retry: 5
max-retry-interval: 30
oauth-excluded-models:
  - "gpt-4o"
"#;
        let cfg: ProxyFileConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.port, Some(8080));
        assert_eq!(cfg.auth_dir.as_deref(), Some("/var/lib/switchproxy/auth"));
        assert_eq!(cfg.switchai_key, vec!["sk-abc".to_string()]);
        assert_eq!(cfg.routing.strategy.as_deref(), Some("round_robin"));
        assert_eq!(cfg.request_retry, Some(5));
        assert_eq!(cfg.oauth_excluded_models, vec!["gpt-4o".to_string()]);
    }

    #[test]
    fn explicit_path_wins_over_search() {
        let path = resolve_config_path(Some("custom.yaml")).unwrap();
        assert_eq!(path, PathBuf::from("custom.yaml"));
    }
}
