//! Error types for the Fastly provider.

use thiserror::Error;

use crate::setdiff::DiffError;

/// Errors that can occur while serving the provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// The provider has not been configured yet.
    #[error("Provider is not configured")]
    NotConfigured,

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HTTP request to the Fastly API could not be completed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The Fastly API answered with a non-success status.
    #[error("Fastly API error (status {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// Two sets of sub-resources could not be reconciled.
    #[error("Set diff failed: {0}")]
    Diff(#[from] DiffError),
}

impl ProviderError {
    /// Build an API error from a status code and message.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether this error is an API "not found" response.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }

    /// Get the error message as a string.
    pub fn message(&self) -> &str {
        match self {
            Self::Validation(msg)
            | Self::Configuration(msg)
            | Self::UnknownResource(msg) => msg,
            Self::Api { message, .. } => message,
            Self::NotConfigured => "provider is not configured",
            Self::Serialization(_) => "serialization error (see Debug output)",
            Self::Http(_) => "http error (see Debug output)",
            Self::Diff(_) => "set diff error (see Debug output)",
        }
    }
}

impl From<ProviderError> for tonic::Status {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Validation(msg) => tonic::Status::invalid_argument(msg),
            ProviderError::Configuration(msg) => tonic::Status::failed_precondition(msg),
            ProviderError::UnknownResource(msg) => tonic::Status::not_found(msg),
            ProviderError::NotConfigured => {
                tonic::Status::failed_precondition("provider is not configured")
            }
            ProviderError::Serialization(err) => {
                tonic::Status::invalid_argument(format!("Serialization error: {}", err))
            }
            ProviderError::Http(err) => tonic::Status::unavailable(format!("HTTP error: {}", err)),
            ProviderError::Diff(err) => tonic::Status::invalid_argument(err.to_string()),
            ProviderError::Api { status, message } => match status {
                404 => tonic::Status::not_found(message),
                401 | 403 => tonic::Status::permission_denied(message),
                409 => tonic::Status::already_exists(message),
                429 => tonic::Status::resource_exhausted(message),
                400 | 422 => tonic::Status::invalid_argument(message),
                500..=599 => tonic::Status::unavailable(message),
                _ => tonic::Status::unknown(message),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::Validation("version must be a positive integer".to_string());
        assert_eq!(format!("{}", err), "Validation error: version must be a positive integer");

        let err = ProviderError::UnknownResource("fastly_service_waf".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: fastly_service_waf");

        let err = ProviderError::api(409, "Duplicate record");
        assert_eq!(
            format!("{}", err),
            "Fastly API error (status 409): Duplicate record"
        );
    }

    #[test]
    fn test_diff_error_conversion() {
        let err: ProviderError = DiffError::KeyExtraction("no name".to_string()).into();
        assert_eq!(format!("{}", err), "Set diff failed: Failed to extract key: no name");

        let status: tonic::Status = err.into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[test]
    fn test_api_status_mapping() {
        let cases = [
            (404, tonic::Code::NotFound),
            (401, tonic::Code::PermissionDenied),
            (403, tonic::Code::PermissionDenied),
            (409, tonic::Code::AlreadyExists),
            (429, tonic::Code::ResourceExhausted),
            (400, tonic::Code::InvalidArgument),
            (503, tonic::Code::Unavailable),
            (418, tonic::Code::Unknown),
        ];
        for (status, code) in cases {
            let status: tonic::Status = ProviderError::api(status, "boom").into();
            assert_eq!(status.code(), code);
            assert_eq!(status.message(), "boom");
        }
    }

    #[test]
    fn test_is_not_found() {
        assert!(ProviderError::api(404, "gone").is_not_found());
        assert!(!ProviderError::api(500, "oops").is_not_found());
        assert!(!ProviderError::NotConfigured.is_not_found());
    }

    #[test]
    fn test_serialization_error() {
        let err: ProviderError = serde_json::from_slice::<serde_json::Value>(b"{bad")
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("Serialization error"));
        assert_eq!(tonic::Status::from(err).code(), tonic::Code::InvalidArgument);
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::Configuration("missing api_key".to_string());
        assert_eq!(err.message(), "missing api_key");

        let err = ProviderError::api(500, "internal");
        assert_eq!(err.message(), "internal");
    }
}
