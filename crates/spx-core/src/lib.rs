pub mod bootstrap;
pub mod config;
pub mod model_registry;
pub mod proxy_engine;
pub mod router;
pub mod state;
pub mod upstream_client;
pub mod watcher;

pub use bootstrap::{Bootstrap, CliArgs, bootstrap, bootstrap_from_env};
pub use config::{ProxyFileConfig, RoutingConfig, resolve_config_path};
pub use model_registry::ModelRegistry;
pub use proxy_engine::{ProxyAuth, ProxyCall, ProxyEngine};
pub use router::build_router;
pub use state::{AppState, CredentialInsertInput, ProviderRuntime};
pub use upstream_client::{UpstreamClient, UpstreamClientConfig, WreqUpstreamClient};
pub use watcher::{AuthUpdate, WatcherHandle, WatcherState, spawn_watcher};
