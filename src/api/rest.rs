//! HTTP surface of the orchestrator.

use crate::api::models::{
    CalculateRequest, CalculateResponse, ErrorResponse, ExpressionView,
};
use crate::api::{auth, AppState};
use crate::error::EngineError;
use crate::model::{ExprId, UserId};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Build the API router. Calculation endpoints sit behind the bearer-token
/// middleware; registration and login do not.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/v1/calculate", post(calculate))
        .route("/api/v1/expressions", get(list_expressions))
        .route("/api/v1/expressions/:id", get(get_expression))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/api/v1/register", post(auth::register))
        .route("/api/v1/login", post(auth::login))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(state: AppState, port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "http api listening");
    axum::serve(listener, router(state)).await
}

/// `POST /api/v1/calculate`
async fn calculate(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    Json(request): Json<CalculateRequest>,
) -> Response {
    match state.scheduler.submit(user, &request.expression).await {
        Ok(submission) => {
            let body = CalculateResponse {
                id: submission.expr_id.0,
                error: submission.rejected.map(|e| e.to_string()),
            };
            let status = if submission.rejected.is_none() {
                StatusCode::CREATED
            } else {
                StatusCode::UNPROCESSABLE_ENTITY
            };
            (status, Json(body)).into_response()
        }
        Err(err) => store_error(err),
    }
}

/// `GET /api/v1/expressions`
async fn list_expressions(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
) -> Response {
    match state.scheduler.list(user).await {
        Ok(expressions) => {
            let views: Vec<ExpressionView> =
                expressions.into_iter().map(ExpressionView::from).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => store_error(err),
    }
}

/// `GET /api/v1/expressions/{id}`
async fn get_expression(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    Path(id): Path<i64>,
) -> Response {
    match state.scheduler.get(user, ExprId(id)).await {
        Ok(expression) => (StatusCode::OK, Json(ExpressionView::from(expression))).into_response(),
        Err(err) => store_error(err),
    }
}

fn store_error(err: EngineError) -> Response {
    warn!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}
