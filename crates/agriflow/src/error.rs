use crate::config::ConfigError;
use crate::lending::{DeskError, GeminiError, VerificationError};
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Gemini(GeminiError),
    Lending(DeskError),
    Verification(VerificationError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Gemini(err) => write!(f, "ai client error: {}", err),
            AppError::Lending(err) => write!(f, "lending error: {}", err),
            AppError::Verification(err) => write!(f, "market verification error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Gemini(err) => Some(err),
            AppError::Lending(err) => Some(err),
            AppError::Verification(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Lending(DeskError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Lending(DeskError::Lifecycle(_)) => StatusCode::CONFLICT,
            AppError::Verification(VerificationError::EmptyQuery) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Gemini(_) | AppError::Verification(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<GeminiError> for AppError {
    fn from(value: GeminiError) -> Self {
        Self::Gemini(value)
    }
}

impl From<DeskError> for AppError {
    fn from(value: DeskError) -> Self {
        Self::Lending(value)
    }
}

impl From<VerificationError> for AppError {
    fn from(value: VerificationError) -> Self {
        Self::Verification(value)
    }
}
