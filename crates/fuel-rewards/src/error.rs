use crate::commission::router::error_response;
use crate::commission::CommissionError;
use crate::config::ConfigError;
use crate::import::ImportError;
use crate::recalculation::RecalculationError;
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Commission(CommissionError),
    Recalculation(RecalculationError),
    Import(ImportError),
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::Commission(err) => err.code(),
            AppError::Recalculation(RecalculationError::SettingsMissing) => "NOT_FOUND",
            AppError::Recalculation(_) => "RECALCULATION_FAILED",
            AppError::Import(_) => "IMPORT_ERROR",
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Commission(err) => write!(f, "commission error: {}", err),
            AppError::Recalculation(err) => write!(f, "recalculation error: {}", err),
            AppError::Import(err) => write!(f, "import error: {}", err),
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
            AppError::Commission(err) => Some(err),
            AppError::Recalculation(err) => Some(err),
            AppError::Import(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Commission(CommissionError::Validation(_)) | AppError::Import(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Commission(CommissionError::NotFound(_))
            | AppError::Recalculation(RecalculationError::SettingsMissing) => StatusCode::NOT_FOUND,
            AppError::Commission(CommissionError::Computation(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Commission(CommissionError::Persistence(_))
            | AppError::Recalculation(_)
            | AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        error_response(status, self.code(), self.to_string())
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

impl From<CommissionError> for AppError {
    fn from(value: CommissionError) -> Self {
        Self::Commission(value)
    }
}

impl From<RecalculationError> for AppError {
    fn from(value: RecalculationError) -> Self {
        Self::Recalculation(value)
    }
}

impl From<ImportError> for AppError {
    fn from(value: ImportError) -> Self {
        Self::Import(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commission::NotFoundError;

    #[tokio::test]
    async fn responses_use_failure_envelope() {
        let error = AppError::from(CommissionError::from(NotFoundError::Settings));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), 4096)
            .await
            .expect("read body");
        let payload: serde_json::Value = serde_json::from_slice(&body).expect("json payload");
        assert_eq!(payload["success"], false);
        assert_eq!(payload["error"]["code"], "NOT_FOUND");
    }

    #[test]
    fn missing_settings_abort_recalculation_with_not_found_code() {
        let error = AppError::from(RecalculationError::SettingsMissing);
        assert_eq!(error.code(), "NOT_FOUND");
        assert!(error.to_string().contains("not been configured"));
    }
}
