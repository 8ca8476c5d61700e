use crate::adapter::external::ExternalConfig;
use crate::envelope::Envelope;
use crate::errors::{Kind, RegistryError};
use crate::health::HealthMonitor;
use crate::metadata::ToolOrigin;
use crate::registry::{MatchMode, Registry};
use crate::tool::InvocationContext;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub health: Arc<HealthMonitor>,
}

/// A thin, stateless translation layer (§4.9): parse the request, call one
/// C4/C5/C6/C7 method, serialize the resulting envelope with the matching
/// HTTP status. No business logic lives here.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/registry/ping", get(ping))
        .route("/registry/tools", get(list_tools))
        .route("/registry/tool/{tool_id}", get(get_tool).delete(deregister))
        .route("/registry/tool/{tool_id}/actions", get(tool_actions))
        .route("/registry/tool/{tool_id}/action/{name}", get(action_schema))
        .route("/registry/call/{tool_id}/{action}", post(call_tool))
        .route("/registry/tool/{tool_id}/health", get(tool_health))
        .route("/registry/external/add", post(add_external))
        .route("/registry/remote/add", post(add_remote))
        .route("/registry/remote/sync", post(sync_remote))
        .route("/registry/capabilities", get(capabilities))
        .route("/registry/categories", get(categories))
        .route("/registry/export", get(export))
        .route("/registry/import", post(import))
        .route("/registry/health", get(all_health))
        .route("/registry/handshake", post(handshake))
        .route("/registry/schema", get(schema))
        .with_state(state)
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let status = self.http_status();
        (status, Json(self)).into_response()
    }
}

async fn ping() -> impl IntoResponse {
    Envelope::ok(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    origin: Option<String>,
    category: Option<String>,
    capability: Option<String>,
    tag: Option<String>,
}

async fn list_tools(State(state): State<AppState>, Query(q): Query<ListQuery>) -> impl IntoResponse {
    let origin = match q.origin.as_deref() {
        Some(o) => match ToolOrigin::parse(o) {
            Ok(origin) => Some(origin),
            Err(e) => return Envelope::from(e),
        },
        None => None,
    };
    let tools = state
        .registry
        .list(origin, q.category.as_deref(), q.capability.as_deref(), q.tag.as_deref())
        .await;
    Envelope::ok(serde_json::to_value(tools).unwrap())
}

async fn get_tool(State(state): State<AppState>, Path(tool_id): Path<String>) -> impl IntoResponse {
    match state.registry.describe(&tool_id).await {
        Ok((meta, actions)) => Envelope::ok(json!({ "metadata": meta, "actions": actions })),
        Err(e) => Envelope::from(e),
    }
}

async fn deregister(State(state): State<AppState>, Path(tool_id): Path<String>) -> impl IntoResponse {
    match state.registry.deregister(&tool_id).await {
        Ok(env) => env,
        Err(e) => Envelope::from(e),
    }
}

async fn tool_actions(State(state): State<AppState>, Path(tool_id): Path<String>) -> impl IntoResponse {
    match state.registry.describe(&tool_id).await {
        Ok((_, actions)) => Envelope::ok(json!(actions)),
        Err(e) => Envelope::from(e),
    }
}

async fn action_schema(
    State(state): State<AppState>,
    Path((tool_id, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.registry.action_schema(&tool_id, &name).await {
        Ok(descriptor) => Envelope::ok(json!({
            "name": descriptor.name,
            "description": descriptor.description,
            "required_parameters": descriptor.required_parameters,
            "optional_parameters": descriptor.optional_parameters,
        })),
        Err(e) => Envelope::from(e),
    }
}

#[derive(Debug, Deserialize, Default)]
struct CallBody {
    #[serde(default)]
    params: Value,
    #[serde(default)]
    context: Option<CallContext>,
}

#[derive(Debug, Deserialize, Default)]
struct CallContext {
    #[serde(default)]
    user_id: Option<String>,
}

async fn call_tool(
    State(state): State<AppState>,
    Path((tool_id, action)): Path<(String, String)>,
    body: Option<Json<CallBody>>,
) -> impl IntoResponse {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let ctx = InvocationContext::new(
        body.context
            .and_then(|c| c.user_id)
            .unwrap_or_else(|| "anonymous".to_string()),
    );
    state.registry.dispatch(&tool_id, &action, body.params, ctx).await
}

async fn tool_health(State(state): State<AppState>, Path(tool_id): Path<String>) -> impl IntoResponse {
    let record = state.health.status(Some(&tool_id)).await;
    if record.is_null() {
        Envelope::from(RegistryError::not_found(format!(
            "no health record for {tool_id}"
        )))
    } else {
        Envelope::ok(record)
    }
}

async fn all_health(State(state): State<AppState>) -> impl IntoResponse {
    Envelope::ok(state.health.status(None).await)
}

#[derive(Debug, Deserialize)]
struct AddExternalBody {
    name: String,
    #[serde(default)]
    version: Option<String>,
    config: ExternalConfig,
    #[serde(default)]
    capabilities: Vec<String>,
}

async fn add_external(State(state): State<AppState>, Json(body): Json<AddExternalBody>) -> impl IntoResponse {
    let capabilities: BTreeSet<String> = body.capabilities.into_iter().collect();
    let version = body.version.unwrap_or_else(|| "1.0.0".to_string());
    match state
        .registry
        .register_external(body.name, version, body.config, capabilities)
        .await
    {
        Ok(env) => env,
        Err(e) => Envelope::from(e),
    }
}

#[derive(Debug, Deserialize)]
struct AddRemoteBody {
    name: String,
    #[serde(default)]
    version: Option<String>,
    remote_url: String,
    #[serde(default)]
    auth_reference: Option<String>,
}

async fn add_remote(State(state): State<AppState>, Json(body): Json<AddRemoteBody>) -> impl IntoResponse {
    let version = body.version.unwrap_or_else(|| "1.0.0".to_string());
    match state
        .registry
        .register_remote(body.name, version, body.remote_url, body.auth_reference)
        .await
    {
        Ok(env) => env,
        Err(e) => Envelope::from(e),
    }
}

#[derive(Debug, Deserialize)]
struct SyncRemoteBody {
    remote_url: String,
    #[serde(default)]
    auth_reference: Option<String>,
}

async fn sync_remote(State(state): State<AppState>, Json(body): Json<SyncRemoteBody>) -> impl IntoResponse {
    match state.registry.sync_remote(body.remote_url, body.auth_reference).await {
        Ok(env) => env,
        Err(e) => Envelope::from(e),
    }
}

async fn capabilities(State(state): State<AppState>) -> impl IntoResponse {
    Envelope::ok(json!(state.registry.capabilities().await))
}

async fn categories(State(state): State<AppState>) -> impl IntoResponse {
    Envelope::ok(json!(state.registry.categories().await))
}

/// Returns the configuration document as a file download (spec §6), not an
/// `Envelope` — there is no dispatch result to report, only a document.
async fn export(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.registry.snapshot().await;
    let body = serde_json::to_string_pretty(&snapshot).unwrap();
    (
        [
            (header::CONTENT_TYPE, "application/json"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"registry_config.json\"",
            ),
        ],
        body,
    )
}

/// Accepts the document as a multipart upload (spec §6), pairing with
/// `export`'s file download. The uploaded field's raw bytes are parsed
/// directly as a `Snapshot`; the field name is not significant.
async fn import(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let field = match multipart.next_field().await {
        Ok(Some(field)) => field,
        Ok(None) => return Envelope::from(RegistryError::validation("missing upload field")).into_response(),
        Err(e) => return Envelope::from(RegistryError::validation(e.to_string())).into_response(),
    };
    let bytes = match field.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => return Envelope::from(RegistryError::validation(e.to_string())).into_response(),
    };
    let snapshot: crate::persistence::Snapshot = match serde_json::from_slice(&bytes) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            return Envelope::from(RegistryError::validation(format!("malformed configuration document: {e}")))
                .into_response()
        }
    };
    crate::startup::reimport(&state.registry, snapshot).await;
    Envelope::ok(json!({ "imported": true })).into_response()
}

#[derive(Debug, Deserialize)]
struct HandshakeBody {
    #[allow(dead_code)]
    client: String,
    #[allow(dead_code)]
    version: String,
}

async fn handshake(Json(_body): Json<HandshakeBody>) -> impl IntoResponse {
    Envelope::ok(json!({ "compatible": true }))
}

async fn schema() -> impl IntoResponse {
    Envelope::ok(json!({
        "routes": [
            "GET /registry/ping",
            "GET /registry/tools",
            "GET /registry/tool/{tool_id}",
            "DELETE /registry/tool/{tool_id}",
            "GET /registry/tool/{tool_id}/actions",
            "GET /registry/tool/{tool_id}/action/{name}",
            "POST /registry/call/{tool_id}/{action}",
            "GET /registry/tool/{tool_id}/health",
            "POST /registry/external/add",
            "POST /registry/remote/add",
            "POST /registry/remote/sync",
            "GET /registry/capabilities",
            "GET /registry/categories",
            "GET /registry/export",
            "POST /registry/import",
            "GET /registry/health",
            "POST /registry/handshake",
            "GET /registry/schema",
        ]
    }))
}

// Kept for the exhaustiveness check below — `Kind` values must all map to a
// distinct, documented HTTP status.
#[allow(dead_code)]
fn assert_every_kind_has_a_status(kind: Kind) -> StatusCode {
    kind.http_status()
}

#[cfg(test)]
mod tests;
