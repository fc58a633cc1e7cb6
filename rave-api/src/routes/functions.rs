//! Agent function endpoints.
//!
//! `POST /functions/v1/:function` takes `{ "action": "...", ... }` and
//! answers `{ "success": true, ...payload }`.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use rave_agents::{actions, function_by_name};
use rave_core::AgentFunction;
use serde_json::{json, Map, Value};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Parse a request body. An empty body is an empty object.
pub fn parse_body(bytes: &[u8]) -> ApiResult<Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(ApiError::invalid_input("Request body must be a JSON object")),
        Err(e) => Err(ApiError::invalid_input(format!("Invalid JSON: {}", e))),
    }
}

/// Success envelope. Object payloads are flattened into it.
pub fn success(payload: Value) -> Value {
    let mut body = Map::new();
    body.insert("success".to_string(), Value::Bool(true));
    match payload {
        Value::Object(map) => body.extend(map),
        other => {
            body.insert("data".to_string(), other);
        }
    }
    Value::Object(body)
}

/// POST /functions/v1/:function
pub async fn invoke_function(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let function = function_by_name(&name)?;
    let body = parse_body(&body)?;
    tracing::debug!(%function, action = %rave_agents::request::action(&body), "Invoking agent function");
    let payload = rave_agents::invoke(&state.agents, function, &body).await?;
    Ok(Json(success(payload)))
}

/// OPTIONS /functions/v1/:function
///
/// Plain `OPTIONS` without preflight headers still gets a 200; the CORS
/// layer adds the headers.
pub async fn preflight() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// GET /functions/v1 - every function with its actions.
pub async fn catalog() -> Json<Value> {
    let functions: Vec<Value> = AgentFunction::ALL
        .iter()
        .map(|f| json!({ "name": f.as_db_str(), "actions": actions(*f) }))
        .collect();
    Json(success(json!({ "functions": functions })))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", get(catalog)).route(
        "/:function",
        axum::routing::post(invoke_function).options(preflight),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(b"").unwrap(), json!({}));
        assert_eq!(parse_body(b"  \n").unwrap(), json!({}));
        assert_eq!(
            parse_body(br#"{"action": "list"}"#).unwrap(),
            json!({"action": "list"})
        );
        assert_eq!(parse_body(b"[1, 2]").unwrap_err().code, ErrorCode::InvalidInput);
        assert!(parse_body(b"{action:")
            .unwrap_err()
            .message
            .starts_with("Invalid JSON"));
    }

    #[test]
    fn test_success_envelope_flattens_objects() {
        let body = success(json!({"run_id": "r-1", "status": "completed"}));
        assert_eq!(body["success"], true);
        assert_eq!(body["run_id"], "r-1");

        let wrapped = success(json!([1, 2]));
        assert_eq!(wrapped["data"], json!([1, 2]));
    }
}
