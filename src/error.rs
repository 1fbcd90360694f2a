use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Failure categories surfaced by the reservation core.
///
/// Expected validation failures carry the caller-facing message; `Internal`
/// and `ExternalUnavailable` log the detail and keep the surface terse.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    SeatConflict(String),
    #[error("{0}")]
    ExternalUnavailable(String),
    #[error("{0}")]
    RateLimited(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Machine-readable category tag, stable across message wording.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::Unauthenticated(_) => "UNAUTHENTICATED",
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::NotFound(_) => "NOT_FOUND",
            Error::InvalidState(_) => "INVALID_STATE",
            Error::SeatConflict(_) => "SEAT_CONFLICT",
            Error::ExternalUnavailable(_) => "EXTERNAL_UNAVAILABLE",
            Error::RateLimited(_) => "RATE_LIMITED",
            Error::Internal(_) => "INTERNAL",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Error::Unauthorized(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidState(_) => StatusCode::BAD_REQUEST,
            Error::SeatConflict(_) => StatusCode::CONFLICT,
            Error::ExternalUnavailable(_) => StatusCode::BAD_GATEWAY,
            Error::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn seat_conflict(seat_id: &str) -> Self {
        Error::SeatConflict(format!(
            "Seat {} is no longer available. Please choose another.",
            seat_id
        ))
    }

    pub fn event_not_bookable() -> Self {
        Error::InvalidState("This event is not currently available for booking.".to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), "request failed: {}", self);
        }
        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Error::NotFound("record not found".to_string()),
            other => Error::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_expected_status_codes() {
        assert_eq!(Error::InvalidInput("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::Unauthorized("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(Error::SeatConflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(Error::InvalidState("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::ExternalUnavailable("x".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            Error::RateLimited("x".into()).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn seat_conflict_message_names_the_seat() {
        let e = Error::seat_conflict("A-R1-S4");
        assert_eq!(e.kind(), "SEAT_CONFLICT");
        assert!(e.to_string().contains("A-R1-S4"));
    }
}
