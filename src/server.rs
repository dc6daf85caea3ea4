//! HTTP tool server.
//!
//! Serves one [`Workspace`] through the [`ToolRegistry`]: every tool is
//! dispatched by the same `POST /tools/{name}` handler with a JSON object as
//! its parameters.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/tools/list` | List all registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call a tool by name |
//! | `GET`  | `/health` | Health check (returns version and workspace root) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "access_denied", "message": "Access denied: '../x' resolves outside the workspace" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `access_denied` | 403 |
//! | `not_found` | 404 |
//! | `unsupported`, `invalid_argument`, `bad_request` | 400 |
//! | `timeout` | 408 |
//! | `tool_failure`, `io`, `internal` | 500 |
//! | `provider_unavailable` | 503 |
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::error::CoreError;
use crate::tools::{ToolContext, ToolRegistry};
use crate::workspace::Workspace;

#[derive(Clone)]
struct AppState {
    ctx: ToolContext,
    tools: Arc<ToolRegistry>,
}

/// Build the router for `workspace` with the given tools.
pub fn router(workspace: Arc<Workspace>, tools: ToolRegistry) -> Router {
    let state = AppState {
        ctx: ToolContext::new(workspace),
        tools: Arc::new(tools),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Serve the built-in tools on `[server].bind` until the process exits.
pub async fn run_server(workspace: Arc<Workspace>) -> anyhow::Result<()> {
    run_server_with_extensions(workspace, ToolRegistry::new()).await
}

/// Like [`run_server`], with `extra` tools served after the built-ins.
pub async fn run_server_with_extensions(
    workspace: Arc<Workspace>,
    extra: ToolRegistry,
) -> anyhow::Result<()> {
    let bind_addr = workspace.config().server.bind.clone();

    let mut registry = ToolRegistry::with_builtins();
    for tool in extra.into_tools() {
        registry.register(tool);
    }
    for t in registry.tools() {
        tracing::debug!(tool = t.name(), builtin = t.is_builtin(), "registered tool");
    }

    let app = router(workspace, registry);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    eprintln!("devassist listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn status_for(err: &CoreError) -> StatusCode {
    match err {
        CoreError::SandboxViolation(_) => StatusCode::FORBIDDEN,
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::UnsupportedTool { .. } | CoreError::InvalidArgument(_) => {
            StatusCode::BAD_REQUEST
        }
        CoreError::ExecutionTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
        CoreError::ToolFailure { .. } | CoreError::Io { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        CoreError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Map a tool failure to a response. Workspace errors keep their own code;
/// anything else is an internal error.
fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    match err.downcast_ref::<CoreError>() {
        Some(core) => AppError {
            status: status_for(core),
            code: core.code().to_string(),
            message: core.to_string(),
        },
        None => {
            tracing::warn!(tool = tool_name, error = %format!("{:#}", err), "tool failed");
            AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "internal".to_string(),
                message: format!("{}: {:#}", tool_name, err),
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    workspace: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        workspace: state.ctx.workspace().root().display().to_string(),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolInfo {
    name: String,
    description: String,
    builtin: bool,
    parameters: Value,
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools = state
        .tools
        .tools()
        .iter()
        .map(|t| ToolInfo {
            name: t.name().to_string(),
            description: t.description().to_string(),
            builtin: t.is_builtin(),
            parameters: t.parameters_schema(),
        })
        .collect();
    Json(ToolListResponse { tools })
}

// ============ POST /tools/{name} ============

/// Returns `{ "result": ... }` on success. A `null` body is treated as `{}`.
async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let tool = state
        .tools
        .find(&name)
        .ok_or_else(|| not_found(format!("no tool registered with name: {}", name)))?;

    let params = match body {
        Value::Null => Value::Object(Default::default()),
        v @ Value::Object(_) => v,
        _ => {
            return Err(AppError {
                status: StatusCode::BAD_REQUEST,
                code: "bad_request".to_string(),
                message: "parameters must be a JSON object".to_string(),
            })
        }
    };

    let started = std::time::Instant::now();
    let result = tool
        .execute(params, &state.ctx)
        .await
        .map_err(|e| classify_tool_error(&name, e))?;
    tracing::info!(tool = %name, elapsed_ms = started.elapsed().as_millis() as u64, "tool call");

    Ok(Json(serde_json::json!({ "result": result })))
}
