use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failures a single request can end with. None of them stop the server.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("cluster configuration error: {0}")]
    Config(String),

    #[error("terraform resource {0} was not found")]
    NotFound(String),

    #[error("terraform resource {0} already exists")]
    AlreadyExists(String),

    #[error("rejected by the API server: {0}")]
    Validation(String),

    #[error("conflicting update: {0}")]
    Conflict(String),

    #[error("Kubernetes API error: {0}")]
    Remote(String),

    #[error("template error: {0}")]
    Template(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Config(_) | Self::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyExists(_) | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Remote(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "ConfigError",
            Self::NotFound(_) => "NotFound",
            Self::AlreadyExists(_) => "AlreadyExists",
            Self::Validation(_) => "ValidationError",
            Self::Conflict(_) => "Conflict",
            Self::Remote(_) => "RemoteError",
            Self::Template(_) => "TemplateError",
        }
    }

    /// Errors caused by what the operator submitted rather than by the console or cluster.
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

impl From<handlebars::RenderError> for AppError {
    fn from(error: handlebars::RenderError) -> Self {
        Self::Template(error.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), format!("{}: {self}", self.kind())).into_response()
    }
}
