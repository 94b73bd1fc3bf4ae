//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};

use crate::coordinator::{OfferRequest, SignalingCoordinator};

/// Body of every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

async fn offer(
    State(coordinator): State<Arc<SignalingCoordinator>>,
    payload: Result<Json<OfferRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => {
            tracing::debug!(error = %rejection.body_text(), "Rejected offer body");
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    match coordinator.handle_offer(request).await {
        Ok(answer) => (StatusCode::OK, Json(answer)).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Offer failed");
            error_response(e.status_code(), e.to_string())
        }
    }
}

pub fn routes(coordinator: Arc<SignalingCoordinator>) -> Router {
    Router::new()
        .route("/api/offer", post(offer))
        .with_state(coordinator)
}
