use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::http::server::AppState;
use crate::routing::{Route, RouteError};

/// Body of `/register` and `/unregister`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub endpoint: String,
    pub data: RouteSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSpec {
    pub host: String,
    pub path: String,
    #[serde(default = "default_method")]
    pub method: String,
}

fn default_method() -> String {
    "GET".to_string()
}

impl RegistrationRequest {
    fn into_route(self) -> Result<Route, ControlError> {
        let endpoint = Url::parse(&self.endpoint)
            .map_err(|e| ControlError::BadRequest(format!("invalid endpoint {:?}: {}", self.endpoint, e)))?;
        if endpoint.scheme() != "http" {
            return Err(ControlError::BadRequest(format!(
                "endpoint must be an http:// URL, got {:?}",
                self.endpoint
            )));
        }
        if self.data.method.trim().is_empty() {
            return Err(ControlError::BadRequest("method must not be empty".to_string()));
        }
        Ok(Route::new(self.data.host, self.data.method, self.data.path, endpoint))
    }
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub routes: usize,
}

/// Control-plane failures, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub enum ControlError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<RouteError> for ControlError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::RouteNotFound { .. } => Self::NotFound(err.to_string()),
            RouteError::InvalidPattern(_) => Self::BadRequest(err.to_string()),
            RouteError::Persist(_) => Self::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m),
            Self::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

fn parse(payload: Result<Json<RegistrationRequest>, JsonRejection>) -> Result<Route, ControlError> {
    let Json(request) = payload.map_err(|e| ControlError::BadRequest(e.body_text()))?;
    request.into_route()
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegistrationRequest>, JsonRejection>,
) -> Result<StatusCode, ControlError> {
    let route = parse(payload)?;
    state.routes.register(route).await.inspect_err(|e| {
        tracing::error!(error = %e, "Route registration failed");
    })?;
    Ok(StatusCode::CREATED)
}

pub async fn unregister(
    State(state): State<AppState>,
    payload: Result<Json<RegistrationRequest>, JsonRejection>,
) -> Result<StatusCode, ControlError> {
    let route = parse(payload)?;
    state.routes.unregister(&route).await.inspect_err(|e| {
        tracing::warn!(error = %e, "Route unregistration failed");
    })?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_routes(State(state): State<AppState>) -> Json<Vec<Route>> {
    Json(state.routes.routes().await)
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        routes: state.routes.len(),
    })
}
