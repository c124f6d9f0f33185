use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptchaError {
    #[error("OCR engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("OCR engine failed: {0}")]
    Recognition(String),

    #[error("Failed to reach recognition service: {0}")]
    Network(String),

    #[error("Recognition service rejected request (status {status}): {message}")]
    RemoteService { status: u16, message: String },

    #[error("Malformed response from recognition service: {0}")]
    MalformedResponse(String),

    #[error("{strategy} produced {value:?}, expected exactly 4 digits")]
    WrongLength { strategy: &'static str, value: String },

    #[error("No 4-digit candidate recognized across {attempts} threshold(s)")]
    NoCandidateRecognized { attempts: usize },

    #[error("Invalid manual input {0:?}: please input exactly 4 digits")]
    InvalidManualInput(String),

    #[error("No manual input received within {0:?}")]
    ManualInputTimeout(Duration),

    #[error("Manual input is disabled")]
    ManualInputDisabled,

    #[error("Unknown broker: {0}")]
    UnknownBroker(String),

    #[error("Failed to load image: {0}")]
    ImageLoad(String),

    #[error("Preprocessing failed: {0}")]
    Preprocessing(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used to decide whether a failure may trigger a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum FailureKind {
    Network,
    RemoteService,
    MalformedResponse,
    WrongLength,
    EngineUnavailable,
    NoCandidate,
    /// Never a fallback edge
    #[value(skip)]
    Other,
}

impl CaptchaError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CaptchaError::Network(_) => FailureKind::Network,
            CaptchaError::RemoteService { .. } => FailureKind::RemoteService,
            CaptchaError::MalformedResponse(_) => FailureKind::MalformedResponse,
            CaptchaError::WrongLength { .. } => FailureKind::WrongLength,
            CaptchaError::EngineUnavailable(_) => FailureKind::EngineUnavailable,
            CaptchaError::NoCandidateRecognized { .. } => FailureKind::NoCandidate,
            _ => FailureKind::Other,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    pub code: String,
}

impl IntoResponse for CaptchaError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            CaptchaError::EngineUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "ENGINE_UNAVAILABLE")
            }
            CaptchaError::Recognition(_) => (StatusCode::INTERNAL_SERVER_ERROR, "RECOGNITION_ERROR"),
            CaptchaError::NoCandidateRecognized { .. } | CaptchaError::WrongLength { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "NOT_RECOGNIZED")
            }
            CaptchaError::UnknownBroker(_) => (StatusCode::BAD_REQUEST, "UNKNOWN_BROKER"),
            CaptchaError::ImageLoad(_) => (StatusCode::BAD_REQUEST, "INVALID_IMAGE"),
            CaptchaError::Preprocessing(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "PREPROCESSING_ERROR")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(ErrorResponse {
            message: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_separates_transport_from_service_failures() {
        assert_eq!(
            CaptchaError::Network("connection refused".into()).kind(),
            FailureKind::Network
        );
        assert_eq!(
            CaptchaError::RemoteService {
                status: 500,
                message: "boom".into()
            }
            .kind(),
            FailureKind::RemoteService
        );
        assert_eq!(
            CaptchaError::InvalidManualInput("12a4".into()).kind(),
            FailureKind::Other
        );
    }

    #[test]
    fn test_other_is_not_selectable_as_fallback() {
        use clap::ValueEnum;

        assert!(FailureKind::from_str("other", true).is_err());
        assert!(!FailureKind::value_variants().contains(&FailureKind::Other));
        assert_eq!(
            FailureKind::from_str("no-candidate", true),
            Ok(FailureKind::NoCandidate)
        );
    }

    #[test]
    fn test_unknown_broker_maps_to_bad_request() {
        let response = CaptchaError::UnknownBroker("xq".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
