use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use huddle_shared::{RoomId, UserId};
use huddle_store::StoreError;

/// The hub actor is gone (its command queue is closed).
#[derive(Debug, Error)]
#[error("Hub unavailable")]
pub struct HubUnavailable;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),

    #[error("User {user} is not in room {room}")]
    UserNotInRoom { room: RoomId, user: UserId },

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Notification not found: {0}")]
    NotificationNotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Hub(#[from] HubUnavailable),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::RoomNotFound(_)
            | ServerError::MessageNotFound(_)
            | ServerError::NotificationNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::UserNotInRoom { .. } => (StatusCode::FORBIDDEN, self.to_string()),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::Store(e) => {
                tracing::error!(error = %e, "storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage error".to_string())
            }
            ServerError::Hub(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let cases = [
            (ServerError::RoomNotFound(RoomId::from("r")), StatusCode::NOT_FOUND),
            (
                ServerError::UserNotInRoom {
                    room: RoomId::from("r"),
                    user: UserId::from("u"),
                },
                StatusCode::FORBIDDEN,
            ),
            (ServerError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ServerError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (ServerError::Store(StoreError::NotFound), StatusCode::INTERNAL_SERVER_ERROR),
            (ServerError::Hub(HubUnavailable), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
