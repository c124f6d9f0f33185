//! Client for the hosted captcha recognition service
//!
//! One multipart upload per call, no retries. Transport failures, service
//! rejections and unreadable responses are reported as distinct errors so the
//! orchestrator can decide which of them fall back to local recognition.

use crate::config::Config;
use crate::engine::digits_only;
use crate::error::CaptchaError;
use reqwest::blocking::{multipart, Client};
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::Path;

/// Anything that can resolve a captcha image file remotely
pub trait RemoteRecognizer: Send + Sync {
    fn recognize_remote(&self, image_path: &Path) -> Result<String, CaptchaError>;
}

#[derive(Debug, Deserialize)]
struct SuccessBody {
    result: String,
}

#[derive(Debug, Deserialize)]
struct FailureBody {
    message: String,
}

pub struct RemoteClient {
    client: Client,
    endpoint: String,
}

impl RemoteClient {
    pub fn new(config: &Config) -> Result<Self, CaptchaError> {
        let client = Client::builder()
            .timeout(config.remote_timeout)
            .build()
            .map_err(|e| CaptchaError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.remote_endpoint.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl RemoteRecognizer for RemoteClient {
    fn recognize_remote(&self, image_path: &Path) -> Result<String, CaptchaError> {
        let bytes = std::fs::read(image_path).map_err(|e| {
            CaptchaError::ImageLoad(format!("{}: {}", image_path.display(), e))
        })?;

        let file_name = image_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "captcha".to_string());
        let form = multipart::Form::new().part("image", multipart::Part::bytes(bytes).file_name(file_name));

        tracing::debug!("Uploading {} to {}", image_path.display(), self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .map_err(|e| CaptchaError::Network(format!("request {} failed: {}", self.endpoint, e)))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| CaptchaError::Network(format!("reading response from {}: {}", self.endpoint, e)))?;

        let result = parse_response(status, &body)?;
        tracing::debug!("Recognition service answered {:?}", result);
        Ok(result)
    }
}

/// Interpret the service's answer; only `201 Created` carries a result
fn parse_response(status: StatusCode, body: &str) -> Result<String, CaptchaError> {
    if status != StatusCode::CREATED {
        let message = serde_json::from_str::<FailureBody>(body)
            .map(|failure| failure.message)
            .unwrap_or_else(|_| body.trim().to_string());
        return Err(CaptchaError::RemoteService {
            status: status.as_u16(),
            message,
        });
    }

    let success: SuccessBody = serde_json::from_str(body)
        .map_err(|e| CaptchaError::MalformedResponse(format!("{} (body: {:?})", e, body)))?;

    Ok(digits_only(&success.result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_created_response_keeps_only_digits() {
        let result = parse_response(StatusCode::CREATED, r#"{"result": "a1b2c3d4"}"#).unwrap();
        assert_eq!(result, "1234");
    }

    #[test]
    fn test_error_status_carries_service_message() {
        let err = parse_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"message": "recognition backend down"}"#,
        )
        .unwrap_err();

        match err {
            CaptchaError::RemoteService { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "recognition backend down");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_plain_ok_is_not_success() {
        let err = parse_response(StatusCode::OK, r#"{"result": "1234"}"#).unwrap_err();
        assert!(matches!(err, CaptchaError::RemoteService { status: 200, .. }));
    }

    #[test]
    fn test_error_without_json_uses_raw_body() {
        let err = parse_response(StatusCode::BAD_GATEWAY, "Bad Gateway\n").unwrap_err();
        assert!(matches!(
            err,
            CaptchaError::RemoteService { status: 502, ref message } if message == "Bad Gateway"
        ));
    }

    #[test]
    fn test_created_without_result_is_malformed() {
        let err = parse_response(StatusCode::CREATED, r#"{"answer": "1234"}"#).unwrap_err();
        assert!(matches!(err, CaptchaError::MalformedResponse(_)));

        let err = parse_response(StatusCode::CREATED, "<html>").unwrap_err();
        assert!(matches!(err, CaptchaError::MalformedResponse(_)));
    }

    #[test]
    fn test_unreadable_image_is_image_load_error() {
        let client = RemoteClient::new(&Config::default()).unwrap();
        let err = client
            .recognize_remote(Path::new("/nonexistent/captcha.png"))
            .unwrap_err();
        assert!(matches!(err, CaptchaError::ImageLoad(_)));
    }
}
