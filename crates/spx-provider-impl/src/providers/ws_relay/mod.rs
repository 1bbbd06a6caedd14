//! Provider whose connectivity is an inbound persistent websocket rather than
//! an outbound HTTP call. The peer dials into a channel-scoped route owned by
//! the HTTP layer (see `spx-core`'s websocket route); this module only holds
//! the gateway registry and the provider that posts jobs into it.
//!
//! Each channel supports a single in-flight request at a time: `submit`
//! blocks until the previously queued job's reply arrives (or times out)
//! before a new job can be taken off the channel's queue by the gateway
//! route. A fully multiplexed, correlation-id based protocol would let a
//! channel serve concurrent requests, but the simpler model is enough for a
//! single connected peer and keeps the relay's wire format trivial.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use bytes::Bytes;

use spx_provider_core::{
    Credential, DispatchRule, DispatchTable, GenerateContentRequest, Headers, ProviderConfig,
    ProviderError, ProviderResult, Request, UpstreamBody, UpstreamCtx, UpstreamHttpResponse,
    UpstreamProvider, header_set,
};

const PROVIDER_NAME: &str = "ws_relay";

/// A unit of work handed to a connected peer: the serialized request body
/// and a one-shot channel the gateway route delivers the peer's reply into.
pub struct WsJob {
    pub payload: Bytes,
    pub reply: std::sync::mpsc::SyncSender<Bytes>,
}

#[derive(Default)]
pub struct WsGatewayRegistry {
    channels: Mutex<HashMap<String, tokio::sync::mpsc::UnboundedSender<WsJob>>>,
}

impl WsGatewayRegistry {
    /// Called by the websocket route handler when a peer connects to a
    /// channel. Replaces any prior sender for the same channel id, so a
    /// reconnecting peer takes over cleanly from a dead one.
    pub fn register_channel(
        &self,
        channel_id: &str,
    ) -> tokio::sync::mpsc::UnboundedReceiver<WsJob> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        self.channels
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .insert(channel_id.to_string(), tx);
        rx
    }

    pub fn unregister_channel(&self, channel_id: &str) {
        self.channels
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .remove(channel_id);
    }

    /// Posts a job onto the named channel's queue and blocks the calling
    /// thread for the peer's reply, up to `timeout`.
    pub fn submit(
        &self,
        channel_id: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> ProviderResult<Bytes> {
        let sender = self
            .channels
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .get(channel_id)
            .cloned()
            .ok_or_else(|| {
                ProviderError::Other(format!("no peer connected on channel {channel_id}"))
            })?;

        let (reply_tx, reply_rx) = std::sync::mpsc::sync_channel(1);
        sender
            .send(WsJob {
                payload,
                reply: reply_tx,
            })
            .map_err(|_| ProviderError::Other(format!("channel {channel_id} closed")))?;

        reply_rx
            .recv_timeout(timeout)
            .map_err(|_| ProviderError::Other(format!("channel {channel_id} reply timed out")))
    }
}

pub fn gateway() -> &'static WsGatewayRegistry {
    static REGISTRY: OnceLock<WsGatewayRegistry> = OnceLock::new();
    REGISTRY.get_or_init(WsGatewayRegistry::default)
}

const DISPATCH_TABLE: DispatchTable = DispatchTable::new([
    DispatchRule::Native, // ClaudeGenerate
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
    DispatchRule::Unsupported, // GeminiGenerate
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
    DispatchRule::Unsupported, // OpenAIChatGenerate
    DispatchRule::Unsupported,
    DispatchRule::Unsupported, // OpenAIResponseGenerate
    DispatchRule::Unsupported,
    DispatchRule::Unsupported, // OpenAIInputTokens
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
    DispatchRule::Unsupported, // OAuthStart
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
]);

#[derive(Debug, Default)]
pub struct WsRelayProvider;

impl WsRelayProvider {
    pub fn new() -> Self {
        Self
    }
}

fn relay_config(
    config: &ProviderConfig,
) -> ProviderResult<&spx_provider_core::config::WsRelayConfig> {
    match config {
        ProviderConfig::WsRelay(cfg) => Ok(cfg),
        _ => Err(ProviderError::InvalidConfig(
            "expected ProviderConfig::WsRelay".to_string(),
        )),
    }
}

#[async_trait::async_trait]
impl UpstreamProvider for WsRelayProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn dispatch_table(&self, _config: &ProviderConfig) -> DispatchTable {
        DISPATCH_TABLE
    }

    fn local_response(
        &self,
        _ctx: &UpstreamCtx,
        config: &ProviderConfig,
        _credential: &Credential,
        req: &Request,
    ) -> ProviderResult<Option<UpstreamHttpResponse>> {
        let Request::GenerateContent(GenerateContentRequest::Claude(claude_req)) = req else {
            return Ok(None);
        };
        let cfg = relay_config(config)?;

        let payload = serde_json::to_vec(&claude_req.body)
            .map_err(|err| ProviderError::Other(err.to_string()))?;

        let reply = gateway().submit(
            &cfg.channel,
            Bytes::from(payload),
            Duration::from_secs(cfg.timeout_secs),
        )?;

        let mut headers: Headers = Vec::new();
        header_set(&mut headers, "Content-Type", "application/json");
        Ok(Some(UpstreamHttpResponse {
            status: 200,
            headers,
            body: UpstreamBody::Bytes(reply),
        }))
    }
}
