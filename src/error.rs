use axum::{Json, http::StatusCode, response::IntoResponse};
use oauth2::basic::BasicErrorResponseType;
use oauth2::{HttpClientError, RequestTokenError, StandardErrorResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;
use tracing::error;

#[derive(Debug, ThisError)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template error: {0}")]
    Template(String),

    #[error("OAuth2 token request error: {0}")]
    Oauth2Token(String),

    #[error("OAuth2 server error: {error}")]
    Oauth2Server { error: String },

    #[error("Login flow error: {0}")]
    OidcFlow(String),

    #[error("Database is not connected")]
    DatabaseUnavailable,

    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("Record not found")]
    NotFound,
}

impl From<RequestTokenError<HttpClientError<reqwest::Error>, StandardErrorResponse<BasicErrorResponseType>>>
    for AppError
{
    fn from(
        e: RequestTokenError<
            HttpClientError<reqwest::Error>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    ) -> Self {
        match e {
            RequestTokenError::ServerResponse(err) => AppError::Oauth2Server {
                error: err.error().to_string(),
            },
            RequestTokenError::Request(req_e) => {
                AppError::Oauth2Token(format!("request failed: {}", req_e))
            }
            RequestTokenError::Parse(parse_err, _body) => AppError::Json(parse_err.into_inner()),
            RequestTokenError::Other(s) => AppError::Oauth2Token(s),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, code, message) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", "Record not found."),
            AppError::DatabaseUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "DATABASE_UNAVAILABLE",
                "The database is not connected.",
            ),
            AppError::Json(_)
            | AppError::Oauth2Token(_)
            | AppError::Oauth2Server { .. }
            | AppError::OidcFlow(_) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Authentication error.")
            }
            AppError::Reqwest(_) | AppError::UrlParse(_) => (
                StatusCode::BAD_GATEWAY,
                "BAD_GATEWAY",
                "Identity provider is unavailable.",
            ),
            AppError::Config(_)
            | AppError::Io(_)
            | AppError::Template(_)
            | AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal server error occurred.",
            ),
        };

        if status.is_server_error() || status == StatusCode::UNAUTHORIZED {
            error!(error = %self, status = %status, "request failed");
        }

        let body = ApiErrorResponse {
            error: ApiErrorBody {
                code: code.to_string(),
                message: message.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Standardized error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}
