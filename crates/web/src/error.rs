use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pawoo_home_mastodon::MastodonError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebError {
    #[error(transparent)]
    Mastodon(#[from] MastodonError),

    #[error("Template error: {0}")]
    Render(#[from] askama::Error),
}

pub type WebResult<T> = Result<T, WebError>;

fn status_for(error: &MastodonError) -> StatusCode {
    match error {
        MastodonError::StateMismatch | MastodonError::AuthExchange(_) => StatusCode::BAD_REQUEST,
        MastodonError::Api {
            status_code: 401, ..
        } => StatusCode::UNAUTHORIZED,
        MastodonError::Api { .. }
        | MastodonError::Registration { .. }
        | MastodonError::Network(_)
        | MastodonError::Json(_) => StatusCode::BAD_GATEWAY,
        MastodonError::Configuration(_) | MastodonError::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            WebError::Mastodon(e) => (status_for(e), e.user_message()),
            WebError::Render(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Could not render the page.",
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, %status, "Request failed");
        } else {
            tracing::warn!(error = %self, %status, "Request rejected");
        }

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&MastodonError::StateMismatch),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&MastodonError::Api {
                status_code: 401,
                body: String::new()
            }),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(&MastodonError::Api {
                status_code: 503,
                body: String::new()
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&MastodonError::Configuration("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_response_uses_user_message() {
        let response = WebError::from(MastodonError::StateMismatch).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
