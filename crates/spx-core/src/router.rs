//! Axum wiring for the inbound Request Router described in the external
//! interfaces: translates HTTP requests on the wire-format routes into
//! `ProxyCall`s and `ProxyEngine::handle` responses back into HTTP.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, Bytes as AxumBytes};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use futures_util::{SinkExt, StreamExt as _};

use spx_provider_core::{
    CountTokensRequest, GenerateContentRequest, ModelListRequest, Op, Proto, Request, UpstreamBody,
};

use crate::proxy_engine::{ProxyAuth, ProxyCall, ProxyEngine};

pub fn build_router(engine: Arc<ProxyEngine>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/chat/completions", post(openai_chat_completions))
        .route("/v1/responses", post(openai_responses))
        .route("/v1/messages", post(claude_messages))
        .route("/v1/messages/count_tokens", post(claude_count_tokens))
        .route(
            "/v1beta/models/{model_action}",
            post(gemini_generate_content),
        )
        .route("/v1/models", get(list_models_default))
        .route("/api/provider/{provider}/v1/models", get(list_models_for))
        .route("/ws/{channel}", get(ws_relay_channel))
        .with_state(engine)
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

/// Entry point for a `ws_relay` provider's peer: the channel id in the path
/// must match the `channel` configured on a `ws_relay` provider row.
async fn ws_relay_channel(
    Path(channel): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_ws_relay_channel(channel, socket))
}

async fn serve_ws_relay_channel(channel: String, socket: WebSocket) {
    let mut rx = spx_provider_impl::ws_gateway().register_channel(&channel);
    let (mut sink, mut stream) = socket.split();
    while let Some(job) = rx.recv().await {
        if sink.send(Message::Binary(job.payload.clone())).await.is_err() {
            break;
        }
        let reply = match stream.next().await {
            Some(Ok(Message::Binary(data))) => data,
            Some(Ok(Message::Text(text))) => bytes::Bytes::from(text.as_bytes().to_vec()),
            _ => break,
        };
        let _ = job.reply.send(reply);
    }
    spx_provider_impl::ws_gateway().unregister_channel(&channel);
}

fn authenticate(engine: &ProxyEngine, headers: &HeaderMap) -> Result<ProxyAuth, Response> {
    let api_key = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
        });

    let Some(api_key) = api_key else {
        return Err(unauthorized());
    };
    engine.authenticate_user_key(api_key).ok_or_else(unauthorized)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        axum::Json(serde_json::json!({"error": {"type": "unauthorized", "message": "missing or invalid API key"}})),
    )
        .into_response()
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        axum::Json(serde_json::json!({"error": {"type": "invalid_request", "message": message.into()}})),
    )
        .into_response()
}

/// Resolves which provider should serve a request. When `model` names a
/// model that the Model Registry has indexed to specific providers, the
/// first matching enabled provider wins; otherwise falls back to the first
/// enabled provider in the registry (the old default-routing behavior,
/// kept for providers that serve every model and never opted into the
/// `models` attribute).
fn resolve_provider(engine: &ProxyEngine, model: Option<&str>) -> Result<String, Response> {
    let enabled = engine.enabled_provider_names();
    if let Some(model) = model {
        let candidates = engine.model_registry().providers_for_model(model);
        if let Some(provider) = candidates.into_iter().find(|p| enabled.contains(p)) {
            return Ok(provider);
        }
    }
    enabled.into_iter().next().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(serde_json::json!({"error": {"type": "no_provider", "message": "no enabled provider"}})),
        )
            .into_response()
    })
}

fn default_provider(engine: &ProxyEngine) -> Result<String, Response> {
    resolve_provider(engine, None)
}

fn model_name_of<T: serde::Serialize>(model: &T) -> Option<String> {
    serde_json::to_value(model)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
}

fn trace_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .or_else(|| Some(uuid::Uuid::new_v4().to_string()))
}

async fn respond(engine: &ProxyEngine, call: ProxyCall) -> Response {
    let resp = engine.handle(call).await;
    let mut builder = Response::builder().status(resp.status);
    for (name, value) in &resp.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let built = match resp.body {
        UpstreamBody::Bytes(bytes) => builder.body(Body::from(bytes)),
        UpstreamBody::Stream(rx) => builder.body(Body::from_stream(
            tokio_stream::wrappers::ReceiverStream::new(rx).map(Ok::<_, std::io::Error>),
        )),
    };
    match built {
        Ok(response) => response.into_response(),
        Err(err) => (StatusCode::BAD_GATEWAY, err.to_string()).into_response(),
    }
}

async fn openai_chat_completions(
    State(engine): State<Arc<ProxyEngine>>,
    headers: HeaderMap,
    body: AxumBytes,
) -> Response {
    let auth = match authenticate(&engine, &headers) {
        Ok(auth) => auth,
        Err(resp) => return resp,
    };
    let body: spx_protocol::openai::create_chat_completions::request::CreateChatCompletionRequestBody =
        match serde_json::from_slice(&body) {
            Ok(b) => b,
            Err(err) => return bad_request(err.to_string()),
        };
    let provider = match resolve_provider(&engine, Some(body.model.as_str())) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let is_stream = body.stream.unwrap_or(false);
    let req = Request::GenerateContent(GenerateContentRequest::OpenAIChat(
        spx_protocol::openai::create_chat_completions::request::CreateChatCompletionRequest {
            body,
        },
    ));
    let call = ProxyCall::Protocol {
        trace_id: trace_id(&headers),
        auth,
        provider,
        response_model_prefix_provider: None,
        user_proto: Proto::OpenAIChat,
        user_op: if is_stream {
            Op::StreamGenerateContent
        } else {
            Op::GenerateContent
        },
        req: Box::new(req),
    };
    respond(&engine, call).await
}

async fn openai_responses(
    State(engine): State<Arc<ProxyEngine>>,
    headers: HeaderMap,
    body: AxumBytes,
) -> Response {
    let auth = match authenticate(&engine, &headers) {
        Ok(auth) => auth,
        Err(resp) => return resp,
    };
    let body: spx_protocol::openai::create_response::request::CreateResponseRequestBody =
        match serde_json::from_slice(&body) {
            Ok(b) => b,
            Err(err) => return bad_request(err.to_string()),
        };
    let provider = match resolve_provider(&engine, Some(body.model.as_str())) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let is_stream = body.stream.unwrap_or(false);
    let req = Request::GenerateContent(GenerateContentRequest::OpenAIResponse(
        spx_protocol::openai::create_response::request::CreateResponseRequest { body },
    ));
    let call = ProxyCall::Protocol {
        trace_id: trace_id(&headers),
        auth,
        provider,
        response_model_prefix_provider: None,
        user_proto: Proto::OpenAIResponse,
        user_op: if is_stream {
            Op::StreamGenerateContent
        } else {
            Op::GenerateContent
        },
        req: Box::new(req),
    };
    respond(&engine, call).await
}

fn anthropic_headers(headers: &HeaderMap) -> spx_protocol::claude::types::AnthropicHeaders {
    spx_protocol::claude::types::AnthropicHeaders {
        anthropic_version: headers
            .get("anthropic-version")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| serde_json::from_value(serde_json::Value::String(v.to_string())).ok())
            .unwrap_or_default(),
        anthropic_beta: None,
    }
}

async fn claude_messages(
    State(engine): State<Arc<ProxyEngine>>,
    headers: HeaderMap,
    body: AxumBytes,
) -> Response {
    let auth = match authenticate(&engine, &headers) {
        Ok(auth) => auth,
        Err(resp) => return resp,
    };
    let body: spx_protocol::claude::create_message::request::CreateMessageRequestBody =
        match serde_json::from_slice(&body) {
            Ok(b) => b,
            Err(err) => return bad_request(err.to_string()),
        };
    let provider = match resolve_provider(&engine, model_name_of(&body.model).as_deref()) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let is_stream = body.stream.unwrap_or(false);
    let req = Request::GenerateContent(GenerateContentRequest::Claude(
        spx_protocol::claude::create_message::request::CreateMessageRequest {
            headers: anthropic_headers(&headers),
            body,
        },
    ));
    let call = ProxyCall::Protocol {
        trace_id: trace_id(&headers),
        auth,
        provider,
        response_model_prefix_provider: None,
        user_proto: Proto::Claude,
        user_op: if is_stream {
            Op::StreamGenerateContent
        } else {
            Op::GenerateContent
        },
        req: Box::new(req),
    };
    respond(&engine, call).await
}

async fn claude_count_tokens(
    State(engine): State<Arc<ProxyEngine>>,
    headers: HeaderMap,
    body: AxumBytes,
) -> Response {
    let auth = match authenticate(&engine, &headers) {
        Ok(auth) => auth,
        Err(resp) => return resp,
    };
    let body: spx_protocol::claude::count_tokens::request::CountTokensRequestBody =
        match serde_json::from_slice(&body) {
            Ok(b) => b,
            Err(err) => return bad_request(err.to_string()),
        };
    let provider = match resolve_provider(&engine, model_name_of(&body.model).as_deref()) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let req = Request::CountTokens(CountTokensRequest::Claude(
        spx_protocol::claude::count_tokens::request::CountTokensRequest {
            headers: anthropic_headers(&headers),
            body,
        },
    ));
    let call = ProxyCall::Protocol {
        trace_id: trace_id(&headers),
        auth,
        provider,
        response_model_prefix_provider: None,
        user_proto: Proto::Claude,
        user_op: Op::CountTokens,
        req: Box::new(req),
    };
    respond(&engine, call).await
}

/// Splits a Gemini-style `{model}:action` path segment, e.g.
/// `gemini-1.5-pro:streamGenerateContent`.
fn split_model_action(segment: &str) -> Option<(&str, &str)> {
    segment.rsplit_once(':')
}

async fn gemini_generate_content(
    State(engine): State<Arc<ProxyEngine>>,
    Path(model_action): Path<String>,
    Query(raw_query): Query<std::collections::HashMap<String, String>>,
    headers: HeaderMap,
    body: AxumBytes,
) -> Response {
    let auth = match authenticate(&engine, &headers) {
        Ok(auth) => auth,
        Err(resp) => return resp,
    };
    let Some((model, action)) = split_model_action(&model_action) else {
        return bad_request("missing :action suffix on Gemini model path");
    };
    let model = model.trim_start_matches("models/").to_string();
    let provider = match resolve_provider(&engine, Some(&model)) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let query_string = if raw_query.is_empty() {
        None
    } else {
        serde_urlencoded::to_string(&raw_query).ok()
    };

    match action {
        "generateContent" => {
            let body: spx_protocol::gemini::generate_content::request::GenerateContentRequestBody =
                match serde_json::from_slice(&body) {
                    Ok(b) => b,
                    Err(err) => return bad_request(err.to_string()),
                };
            let req = Request::GenerateContent(GenerateContentRequest::Gemini(
                spx_protocol::gemini::generate_content::request::GenerateContentRequest {
                    path: spx_protocol::gemini::generate_content::request::GenerateContentPath {
                        model,
                    },
                    body,
                },
            ));
            let call = ProxyCall::Protocol {
                trace_id: trace_id(&headers),
                auth,
                provider,
                response_model_prefix_provider: None,
                user_proto: Proto::Gemini,
                user_op: Op::GenerateContent,
                req: Box::new(req),
            };
            respond(&engine, call).await
        }
        "streamGenerateContent" => {
            let body: spx_protocol::gemini::generate_content::request::GenerateContentRequestBody =
                match serde_json::from_slice(&body) {
                    Ok(b) => b,
                    Err(err) => return bad_request(err.to_string()),
                };
            let req = Request::GenerateContent(GenerateContentRequest::GeminiStream(
                spx_protocol::gemini::stream_content::request::StreamGenerateContentRequest {
                    path: spx_protocol::gemini::generate_content::request::GenerateContentPath {
                        model,
                    },
                    body,
                    query: query_string,
                },
            ));
            let call = ProxyCall::Protocol {
                trace_id: trace_id(&headers),
                auth,
                provider,
                response_model_prefix_provider: None,
                user_proto: Proto::Gemini,
                user_op: Op::StreamGenerateContent,
                req: Box::new(req),
            };
            respond(&engine, call).await
        }
        "countTokens" => {
            let body: spx_protocol::gemini::count_tokens::request::CountTokensRequestBody =
                match serde_json::from_slice(&body) {
                    Ok(b) => b,
                    Err(err) => return bad_request(err.to_string()),
                };
            let req = Request::CountTokens(CountTokensRequest::Gemini(
                spx_protocol::gemini::count_tokens::request::CountTokensRequest {
                    path: spx_protocol::gemini::count_tokens::request::CountTokensPath { model },
                    body,
                },
            ));
            let call = ProxyCall::Protocol {
                trace_id: trace_id(&headers),
                auth,
                provider,
                response_model_prefix_provider: None,
                user_proto: Proto::Gemini,
                user_op: Op::CountTokens,
                req: Box::new(req),
            };
            respond(&engine, call).await
        }
        other => bad_request(format!("unsupported Gemini action: {other}")),
    }
}

/// `GET /v1/models` does not encode a schema family in its path. Defaults to
/// the OpenAI model-list shape, the most common client convention; callers
/// that need a specific provider's native shape use `/api/provider/{name}/v1/models`.
async fn list_models_default(
    State(engine): State<Arc<ProxyEngine>>,
    headers: HeaderMap,
) -> Response {
    let auth = match authenticate(&engine, &headers) {
        Ok(auth) => auth,
        Err(resp) => return resp,
    };
    let provider = match default_provider(&engine) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    list_models(&engine, auth, provider, &headers).await
}

async fn list_models_for(
    State(engine): State<Arc<ProxyEngine>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
) -> Response {
    let auth = match authenticate(&engine, &headers) {
        Ok(auth) => auth,
        Err(resp) => return resp,
    };
    list_models(&engine, auth, provider, &headers).await
}

async fn list_models(
    engine: &ProxyEngine,
    auth: ProxyAuth,
    provider: String,
    headers: &HeaderMap,
) -> Response {
    let req = Request::ModelList(ModelListRequest::OpenAI(
        spx_protocol::openai::list_models::request::ListModelsRequest,
    ));
    let call = ProxyCall::Protocol {
        trace_id: trace_id(headers),
        auth,
        provider,
        response_model_prefix_provider: None,
        user_proto: Proto::OpenAI,
        user_op: Op::ModelList,
        req: Box::new(req),
    };
    respond(engine, call).await
}
