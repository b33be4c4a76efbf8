//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use serde_json::{Value, json};

use crate::service::{BridgeError, BridgeService, HealthSnapshot, tool_arguments};

/// Body of `POST /tools/call`, checked field by field so each problem gets its own message.
#[derive(Debug)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn parse(body: &[u8]) -> Result<Self, BridgeError> {
        let body: Value = serde_json::from_slice(body).map_err(|e| {
            BridgeError::InvalidInput(format!("request body is not valid JSON: {}", e))
        })?;
        let Value::Object(mut fields) = body else {
            return Err(BridgeError::InvalidInput(
                "request body must be a JSON object".to_string(),
            ));
        };
        let name = match fields.remove("name") {
            Some(Value::String(name)) if !name.is_empty() => name,
            None | Some(Value::Null) | Some(Value::String(_)) => {
                return Err(BridgeError::InvalidInput(
                    "Tool name is required".to_string(),
                ));
            }
            Some(_) => {
                return Err(BridgeError::InvalidInput(
                    "Tool name must be a string".to_string(),
                ));
            }
        };
        let arguments = tool_arguments(fields.remove("arguments"))?;
        Ok(Self { name, arguments })
    }
}

fn error_status(error: &BridgeError) -> StatusCode {
    match error {
        BridgeError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
        BridgeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        BridgeError::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: BridgeError) -> (StatusCode, Json<Value>) {
    (
        error_status(&error),
        Json(json!({ "error": error.to_string() })),
    )
}

fn tool_error_response(error: BridgeError) -> (StatusCode, Json<Value>) {
    (
        error_status(&error),
        Json(json!({ "success": false, "error": error.to_string() })),
    )
}

async fn health(State(service): State<Arc<BridgeService>>) -> Json<HealthSnapshot> {
    Json(service.health())
}

async fn list_tools(State(service): State<Arc<BridgeService>>) -> impl IntoResponse {
    match service.list_tools().await {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(e) => {
            if matches!(e, BridgeError::Dispatch(_)) {
                tracing::error!(error = %e, "tools/list failed");
            }
            error_response(e)
        }
    }
}

async fn call_tool(State(service): State<Arc<BridgeService>>, body: Bytes) -> impl IntoResponse {
    let ToolCallRequest { name, arguments } = match ToolCallRequest::parse(&body) {
        Ok(request) => request,
        Err(e) => return tool_error_response(e),
    };

    match service.call_tool(&name, arguments).await {
        Ok(result) => (
            StatusCode::OK,
            Json(json!({
                "success": result.success,
                "result": result.data,
                "error": result.error_message,
                "toolCalled": name,
            })),
        ),
        Err(e) => {
            if matches!(e, BridgeError::Dispatch(_)) {
                tracing::error!(tool = %name, error = %e, "tools/call failed");
            }
            tool_error_response(e)
        }
    }
}

async fn forward(State(service): State<Arc<BridgeService>>, body: Bytes) -> impl IntoResponse {
    let request: Value = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return error_response(BridgeError::InvalidInput(format!(
                "request body is not valid JSON: {}",
                e
            )));
        }
    };

    match service.forward(request).await {
        Ok(Some(response)) => (StatusCode::OK, Json(response)),
        Ok(None) => (StatusCode::ACCEPTED, Json(json!({}))),
        Err(e) => {
            if matches!(e, BridgeError::Dispatch(_)) {
                tracing::error!(error = %e, "Forwarded request failed");
            }
            error_response(e)
        }
    }
}

async fn shutdown(State(service): State<Arc<BridgeService>>) -> impl IntoResponse {
    tracing::info!("Shutdown requested via HTTP");
    service.trigger_shutdown();
    (StatusCode::OK, Json(json!({})))
}

pub fn routes(service: Arc<BridgeService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tools", get(list_tools))
        .route("/tools/call", post(call_tool))
        .route("/mcp", post(forward))
        .route("/shutdown", post(shutdown))
        .with_state(service)
}
