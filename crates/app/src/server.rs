use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pdf_rag_core::{QueryError, QueryService, MISSING_QUERY_MESSAGE};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

#[derive(Clone)]
pub struct AppState {
    pub query: Arc<QueryService>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn missing_query() -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: MISSING_QUERY_MESSAGE.to_string(),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(error: QueryError) -> Self {
        let status = match &error {
            QueryError::Validation(_) => StatusCode::BAD_REQUEST,
            QueryError::IndexNotReady => StatusCode::SERVICE_UNAVAILABLE,
            QueryError::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/query", post(query))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// A body that is not JSON, or whose `query` is absent or not a string, is
/// answered the same way as an empty question.
async fn query(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let payload = match body {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            warn!(error = %rejection, "rejected query body");
            return Err(ApiError::missing_query());
        }
    };
    let Some(question) = payload.get("query").and_then(Value::as_str) else {
        return Err(ApiError::missing_query());
    };

    match state.query.answer(question).await {
        Ok(answer) => Ok(Json(answer).into_response()),
        Err(query_error) => {
            if let QueryError::Provider(provider_error) = &query_error {
                error!(error = %provider_error, "query failed");
            }
            Err(query_error.into())
        }
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.query.index().snapshot();
    Json(json!({
        "status": "ok",
        "index_ready": snapshot.is_some(),
        "chunk_count": snapshot.as_ref().map_or(0, |index| index.len()),
        "index_id": snapshot.as_ref().map(|index| index.id().to_string()),
        "built_at": snapshot.as_ref().map(|index| index.built_at().to_rfc3339()),
    }))
}
