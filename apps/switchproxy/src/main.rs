use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let boot = spx_core::bootstrap::bootstrap_from_env().await?;
    let global = boot.state.global.load();
    let state_for_proxy = boot.state.clone();

    let (watcher_tx, mut watcher_rx) = tokio::sync::mpsc::channel(64);
    match spx_core::watcher::spawn_watcher(boot.auth_store.dir().to_path_buf(), watcher_tx) {
        Ok(handle) => {
            let state_for_watcher = boot.state.clone();
            tokio::spawn(async move {
                let _handle = handle;
                while let Some(update) = watcher_rx.recv().await {
                    spx_core::watcher::apply_update_to_state(&state_for_watcher, update).await;
                    state_for_watcher.rebuild_model_registry().await;
                }
            });
        }
        Err(err) => {
            tracing::warn!(event = "auth_watcher_failed", error = %err, "hot-reload watcher disabled");
        }
    }

    let upstream_cfg = spx_core::upstream_client::UpstreamClientConfig::from_global(&global);
    let upstream_client: std::sync::Arc<dyn spx_core::upstream_client::UpstreamClient> =
        std::sync::Arc::new(
            spx_core::upstream_client::WreqUpstreamClient::new_with_proxy_resolver(
                upstream_cfg,
                move || state_for_proxy.global.load().proxy.clone(),
            )?,
        );
    let engine = std::sync::Arc::new(spx_core::proxy_engine::ProxyEngine::new(
        boot.state.clone(),
        boot.registry.clone(),
        upstream_client,
        boot.storage.clone(),
    ));

    let app = spx_core::build_router(engine);

    let bind = format!("{}:{}", global.host, global.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(event = "listening", addr = %bind);
    axum::serve(listener, app).await?;
    Ok(())
}
