//! HTTP and WebSocket boundary of the hub.
//!
//! Every route lives under `/api/v1` except `/health` and `/metrics`.
//! Successful responses are wrapped as `{"data": ...}`; failures are rendered
//! from [`ErrorBody`] as `{"code", "message", "data"}` with the HTTP status
//! taken from the leading digits of the code.
//!
//! ## Endpoints
//!
//! - `GET  /api/v1/community/model_types`
//! - `GET  /api/v1/community/base_model_types`
//! - `GET  /api/v1/user/info`
//! - `GET  /api/v1/ws?clientId=`
//! - `GET  /api/v1/community/check_local_file?absolute_path=`
//! - `POST /api/v1/community/submit_upload?clientId=`
//! - `POST /api/v1/community/models`
//! - `PUT|DELETE /api/v1/community/models/:id`
//! - `GET  /api/v1/community/models/:id/detail?source=`
//! - `POST /api/v1/community/models/fork/:version_id`
//! - `POST /api/v1/community/models/query?mode=&current=&page_size=`
//! - `GET  /api/v1/files/:category?share_id=&refresh=`
//! - `POST /api/v1/files/refresh`
//! - `POST /api/v1/prompt/prepare`
//! - `GET  /health`, `GET /metrics`
//!
//! ## WebSocket Protocol
//!
//! On connect the server registers the client under `clientId` (or a freshly
//! minted id) and sends `{"type": "status", "data": {"status": "connected",
//! "client_id": ...}}`. A text frame `ping` is answered with `pong`. All
//! other frames pushed to the client are event frames produced by
//! [`ClientNotifier`](crate::notify::ClientNotifier).

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::models::{parse_id, validate_draft, QueryParams};
use crate::api::{upload_error_body, DataEnvelope, ErrorBody, ErrorCode};
use crate::cache::CacheError;
use crate::graph::PipelineGraph;
use crate::hub::{Hub, PreparedPrompt};
use crate::metrics;
use crate::notify::ClientNotifier;
use crate::registry::{ModelDraft, ModelQuery, RegistryError};
use crate::rewrite::RewriteError;
use crate::upload::UploadError;
use crate::HubError;

/// Maximum WebSocket message size (1 MiB).
const WS_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Event sent to a client right after it connects.
pub const STATUS_EVENT: &str = "status";

type SharedHub = Arc<Hub>;
type ApiResult<T> = Result<Json<DataEnvelope<T>>, ApiError>;

fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(DataEnvelope { data }))
}

// ============================================================================
// Errors
// ============================================================================

/// An [`ErrorBody`] ready to be served.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError(pub ErrorBody);

impl ApiError {
    /// Envelope for `code` with its default message.
    pub fn code(code: ErrorCode) -> Self {
        Self(ErrorBody::new(code))
    }

    /// HTTP status derived from the numeric code.
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(u16::try_from(self.0.code / 1000).unwrap_or(500))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.0)).into_response()
    }
}

impl From<ErrorBody> for ApiError {
    fn from(body: ErrorBody) -> Self {
        Self(body)
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        Self(upload_error_body(&err))
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        warn!(error = %err, "registry request failed");
        let data = match &err {
            RegistryError::Remote { code, message } => json!({"code": code, "message": message}),
            RegistryError::Status { status, .. } => json!({"status": status}),
            RegistryError::Transport(_) | RegistryError::Decode(_) => Value::Null,
        };
        Self(ErrorBody::new(ErrorCode::from(&err)).with_data(data))
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::UnknownCategory(category) => Self(
                ErrorBody::new(ErrorCode::UnknownCategory).with_data(json!({"category": category})),
            ),
            CacheError::InvalidShareId(share_id) => Self(
                ErrorBody::new(ErrorCode::InvalidShareId).with_data(json!({"share_id": share_id})),
            ),
            CacheError::Registry(inner) => inner.into(),
        }
    }
}

impl From<RewriteError> for ApiError {
    fn from(err: RewriteError) -> Self {
        match err {
            RewriteError::Unresolved {
                field,
                value,
                available,
            } => Self(
                ErrorBody::new(ErrorCode::UnresolvedFile)
                    .with_message(format!("{field} '{value}' is not available"))
                    .with_data(json!({"field": field, "value": value, "available": available})),
            ),
            RewriteError::Cache(inner) => inner.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(ErrorBody::new(ErrorCode::InvalidBody).with_data(json!(rejection.body_text())))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(ErrorBody::new(ErrorCode::InvalidBody).with_data(json!(rejection.body_text())))
    }
}

// ============================================================================
// Server
// ============================================================================

/// Build the application router over `hub`.
///
/// # Panics
///
/// This function never panics.
pub fn router(hub: SharedHub) -> Router {
    let max_request_size = hub.config.server.max_request_size;

    let api = Router::new()
        .route("/community/model_types", get(model_types_handler))
        .route("/community/base_model_types", get(base_model_types_handler))
        .route("/user/info", get(user_info_handler))
        .route("/ws", get(websocket_handler))
        .route("/community/check_local_file", get(check_local_file_handler))
        .route("/community/submit_upload", post(submit_upload_handler))
        .route("/community/models", post(create_model_handler))
        .route(
            "/community/models/:id",
            axum::routing::put(update_model_handler).delete(delete_model_handler),
        )
        .route("/community/models/:id/detail", get(model_detail_handler))
        .route("/community/models/fork/:version_id", post(fork_model_handler))
        .route("/community/models/query", post(query_models_handler))
        .route("/files/refresh", post(refresh_files_handler))
        .route("/files/:category", get(list_files_handler))
        .route("/prompt/prepare", post(prepare_prompt_handler));

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(middleware::from_fn_with_state(
            max_request_size,
            body_size_middleware,
        ))
        .layer(CorsLayer::permissive())
        .with_state(hub)
}

/// Serve the hub on an already bound listener until the server stops.
///
/// # Errors
///
/// Returns [`HubError::Io`] if serving fails.
pub async fn serve(listener: TcpListener, hub: SharedHub) -> Result<(), HubError> {
    let addr = listener.local_addr()?;
    info!(%addr, "hub API ready");
    axum::serve(listener, router(hub)).await?;
    Ok(())
}

/// Bind `server.host:server.port` from the hub's configuration and serve.
///
/// # Errors
///
/// Returns [`HubError::Io`] if the address cannot be bound or serving fails.
///
/// # Panics
///
/// This function never panics.
pub async fn start_server(hub: SharedHub) -> Result<(), HubError> {
    let addr = format!("{}:{}", hub.config.server.host, hub.config.server.port);
    info!("Starting hub API server on http://{}", addr);
    let listener = TcpListener::bind(&addr).await?;
    serve(listener, hub).await
}

// ============================================================================
// Middleware
// ============================================================================

/// Adds a unique `X-Request-ID` header to every response.
///
/// If the client sends an `X-Request-ID` header, it is preserved; otherwise
/// a new UUID v4 is generated.
async fn request_id_middleware(req: Request<Body>, next: Next) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut response = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }

    response
}

/// Rejects requests whose `Content-Length` exceeds `max_size` with 413.
async fn body_size_middleware(
    State(max_size): State<usize>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(content_length) = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<usize>().ok())
    {
        if content_length > max_size {
            return ApiError::code(ErrorCode::PayloadTooLarge).into_response();
        }
    }

    next.run(req).await
}

// ============================================================================
// Catalog and user
// ============================================================================

async fn model_types_handler(State(hub): State<SharedHub>) -> ApiResult<Vec<String>> {
    ok(hub.config.catalog.accepted_types.clone())
}

async fn base_model_types_handler(State(hub): State<SharedHub>) -> ApiResult<Vec<String>> {
    ok(hub.config.catalog.base_model_types.clone())
}

async fn user_info_handler(State(hub): State<SharedHub>) -> ApiResult<Value> {
    ok(hub.registry.user_info().await?)
}

// ============================================================================
// WebSocket
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct ClientParams {
    #[serde(default, rename = "clientId")]
    client_id: Option<String>,
}

/// `GET /api/v1/ws`: Upgrade to a client session.
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(hub): State<SharedHub>,
    params: Result<Query<ClientParams>, QueryRejection>,
) -> Response {
    let params = match params {
        Ok(Query(params)) => params,
        Err(rejection) => return ApiError::from(rejection).into_response(),
    };
    let client_id = params
        .client_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(ClientNotifier::mint_client_id);

    ws.max_message_size(WS_MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| client_session(socket, hub, client_id))
}

/// Pump frames between one socket and its notifier channel.
///
/// A writer task drains the client's channel into the socket while this task
/// reads client frames. The session ends when the client closes, the socket
/// errors, or a newer connection takes over the same client id (the old
/// channel is then closed and the writer finishes).
async fn client_session(socket: WebSocket, hub: SharedHub, client_id: String) {
    let notifier = &hub.notifier;
    let (connection_id, mut outbound) = notifier.register(&client_id);
    notifier.send(
        STATUS_EVENT,
        &json!({"status": "connected", "client_id": client_id}),
        Some(&client_id),
    );

    let (mut sink, mut stream) = socket.split();
    let mut writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            _ = &mut writer => {
                debug!(%client_id, connection_id, "writer finished");
                break;
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text == "ping" {
                            notifier.send_text(&client_id, "pong");
                        } else {
                            debug!(%client_id, len = text.len(), "ignoring client frame");
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(%client_id, error = %e, "socket error");
                        break;
                    }
                }
            }
        }
    }

    writer.abort();
    notifier.unregister_connection(&client_id, connection_id);
    info!(%client_id, connection_id, "websocket session closed");
}

// ============================================================================
// Uploads
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct LocalFileParams {
    #[serde(default)]
    absolute_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SubmitBody {
    #[serde(default)]
    upload_id: Option<String>,
}

/// `GET /api/v1/community/check_local_file`: Declare a local model file.
async fn check_local_file_handler(
    State(hub): State<SharedHub>,
    params: Result<Query<LocalFileParams>, QueryRejection>,
) -> ApiResult<Value> {
    let Query(params) = params?;
    let path = params.absolute_path.unwrap_or_default();
    let declaration = hub.uploads.declare(&path).await?;
    ok(json!({
        "upload_id": declaration.upload_id,
        "root": declaration.root,
        "files": declaration.files,
    }))
}

/// `POST /api/v1/community/submit_upload`: Enqueue a declaration.
///
/// The body is read leniently so that a missing or malformed `upload_id`
/// surfaces as its own error after the client id check.
async fn submit_upload_handler(
    State(hub): State<SharedHub>,
    params: Result<Query<ClientParams>, QueryRejection>,
    body: Bytes,
) -> ApiResult<Value> {
    let Query(params) = params?;
    let client_id = params.client_id.unwrap_or_default();
    let submit: SubmitBody = serde_json::from_slice(&body).unwrap_or_default();
    let upload_id = submit.upload_id.unwrap_or_default();

    let declaration = hub.uploads.submit(&upload_id, &client_id).await?;
    ok(json!({
        "upload_id": declaration.upload_id,
        "state": declaration.state,
    }))
}

// ============================================================================
// Models
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct DetailParams {
    #[serde(default)]
    source: Option<String>,
}

/// `POST /api/v1/community/models`: Publish a model.
async fn create_model_handler(
    State(hub): State<SharedHub>,
    body: Result<Json<ModelDraft>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(draft) = body?;
    validate_draft(&draft, &hub.config.catalog.accepted_types)?;

    let created = hub.registry.commit_model(&draft).await?;
    if let Some(model_type) = draft.model_type.as_deref() {
        hub.on_model_published(model_type);
    }
    ok(created)
}

/// `PUT /api/v1/community/models/:id`
async fn update_model_handler(
    State(hub): State<SharedHub>,
    Path(id): Path<String>,
    body: Result<Json<ModelDraft>, JsonRejection>,
) -> ApiResult<Value> {
    let id = parse_id(&id)?;
    let Json(draft) = body?;
    validate_draft(&draft, &hub.config.catalog.accepted_types)?;

    hub.registry.update_model(id, &draft).await?;
    ok(Value::Null)
}

/// `DELETE /api/v1/community/models/:id`
async fn delete_model_handler(
    State(hub): State<SharedHub>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let id = parse_id(&id)?;
    ok(hub.registry.delete_model(id).await?)
}

/// `GET /api/v1/community/models/:id/detail`
async fn model_detail_handler(
    State(hub): State<SharedHub>,
    Path(id): Path<String>,
    params: Result<Query<DetailParams>, QueryRejection>,
) -> ApiResult<Value> {
    let id = parse_id(&id)?;
    let Query(params) = params?;
    let source = params.source.unwrap_or_default();
    ok(hub.registry.model_detail(id, &source).await?)
}

/// `POST /api/v1/community/models/fork/:version_id`
async fn fork_model_handler(
    State(hub): State<SharedHub>,
    Path(version_id): Path<String>,
) -> ApiResult<Value> {
    let version_id = parse_id(&version_id)?;
    ok(hub.registry.fork_model_version(version_id).await?)
}

/// `POST /api/v1/community/models/query`: Page through models.
///
/// An empty body queries with no filters.
async fn query_models_handler(
    State(hub): State<SharedHub>,
    params: Result<Query<QueryParams>, QueryRejection>,
    body: Bytes,
) -> ApiResult<Value> {
    let Query(params) = params.map_err(|rejection| {
        ApiError(ErrorBody::new(ErrorCode::InvalidPage).with_data(json!(rejection.body_text())))
    })?;
    let (mode, page) = params.parse()?;

    let filter: ModelQuery = if body.is_empty() {
        ModelQuery::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            ApiError(ErrorBody::new(ErrorCode::InvalidBody).with_data(json!(e.to_string())))
        })?
    };

    ok(hub.registry.query_models(mode, page, &filter).await?)
}

// ============================================================================
// Files and prompts
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    #[serde(default)]
    share_id: Option<String>,
    #[serde(default)]
    refresh: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RefreshBody {
    categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PrepareBody {
    prompt: PipelineGraph,
}

/// `GET /api/v1/files/:category`: Filenames of a category.
///
/// With `share_id` the listing comes from that share namespace only.
async fn list_files_handler(
    State(hub): State<SharedHub>,
    Path(category): Path<String>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Vec<String>> {
    let Query(params) = params?;
    if let Some(share_id) = params.share_id.filter(|s| !s.is_empty()) {
        return ok(hub.cache.list_share_files(&category, &share_id).await?);
    }
    if params.refresh == Some(true) {
        hub.refresh.enable([category.as_str()]);
    }
    ok(hub.cache.filename_list(&category).await?)
}

/// `POST /api/v1/files/refresh`: Mark categories stale.
async fn refresh_files_handler(
    State(hub): State<SharedHub>,
    body: Result<Json<RefreshBody>, JsonRejection>,
) -> ApiResult<Vec<String>> {
    let Json(body) = body?;
    hub.refresh.enable(body.categories.iter().map(String::as_str));
    info!(categories = ?body.categories, "categories marked for refresh");
    ok(body.categories)
}

/// `POST /api/v1/prompt/prepare`: Rewrite labels and route loaders.
async fn prepare_prompt_handler(
    State(hub): State<SharedHub>,
    body: Result<Json<PrepareBody>, JsonRejection>,
) -> ApiResult<PreparedPrompt> {
    let Json(body) = body?;
    ok(hub.prepare(&body.prompt).await?)
}

// ============================================================================
// Health and metrics
// ============================================================================

/// `GET /health`: Liveness with a short status summary.
async fn health_handler(State(hub): State<SharedHub>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "clients": hub.notifier.client_count(),
        "pending_uploads": hub.uploads.pending_count(),
        "metrics": metrics::get_metrics_summary(),
    }))
}

/// `GET /metrics`: Prometheus text exposition.
async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}
