use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    InvalidBody(#[from] JsonRejection),

    #[error(transparent)]
    Infra(#[from] atlas_infra::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        use atlas_infra::Error as Infra;

        match self {
            ApiError::BadRequest(_) | ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Infra(Infra::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Infra(Infra::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Infra(Infra::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Infra(
                Infra::Provider { .. } | Infra::ActionFailed { .. } | Infra::Configuration(_),
            ) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
