//! Top-level error returned by the coordinator.

use axum::http::StatusCode;

use crate::bot::BotError;
use crate::connection::NegotiationError;

#[derive(Debug, thiserror::Error)]
pub enum BotletError {
    #[error(transparent)]
    Bot(#[from] BotError),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
}

impl BotletError {
    /// HTTP status for this failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            BotletError::Bot(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BotletError::Negotiation(NegotiationError::UnsupportedType(_)) => {
                StatusCode::BAD_REQUEST
            }
            BotletError::Negotiation(_) => StatusCode::BAD_GATEWAY,
        }
    }
}
