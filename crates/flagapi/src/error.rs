//! Error types for remote API calls.
//!
//! Every failure is classified where the call is made: rate limits are
//! retried once by [`crate::retry`], everything else propagates with the
//! message the server sent.

use thiserror::Error;

/// Categories of API errors for retry and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connection, TLS or timeout failure
    Network,
    /// Entity does not exist (404)
    NotFound,
    /// Credentials rejected (401)
    Unauthorized,
    /// Too many requests (429)
    RateLimit,
    /// Entity already exists (409)
    Conflict,
    /// Any other non-2xx response
    Api,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether a single wait-and-retry is worth attempting.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimit)
    }

    /// Whether the error means "already done" for removals.
    pub fn is_ignorable(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::NotFound => "Resource not found",
            Self::Unauthorized => "Authentication failed",
            Self::RateLimit => "Rate limited",
            Self::Conflict => "Resource already exists",
            Self::Api => "API request rejected",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check your internet connection and the API base URL",
            Self::NotFound => "Verify the project, environment and resource keys",
            Self::Unauthorized => "Check that LAUNCHDARKLY_ACCESS_TOKEN holds a valid access token",
            Self::RateLimit => "Wait a moment and run the command again",
            Self::Conflict => "The resource exists already; reconcile it instead of creating it",
            Self::Api => "Read the server message above; the request was rejected as sent",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur while talking to the remote API.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested entity does not exist
    #[error("not found: {path}")]
    NotFound {
        /// Request path
        path: String,
    },

    /// Credentials were rejected
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Too many requests
    #[error("rate limited{}", reset_millis.map(|r| format!(" until {r}")).unwrap_or_default())]
    RateLimited {
        /// `X-RateLimit-Reset` header, epoch milliseconds
        reset_millis: Option<i64>,
    },

    /// The entity already exists
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// Any other non-2xx response
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        /// Message from the response body, or the raw body
        message: String,
    },

    /// Transport failure
    #[error("HTTP error: {message}")]
    Http { message: String },

    /// Response body was not what we expected
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Unauthorized { .. } => ErrorCategory::Unauthorized,
            Error::RateLimited { .. } => ErrorCategory::RateLimit,
            Error::Conflict { .. } => ErrorCategory::Conflict,
            Error::Api { .. } => ErrorCategory::Api,
            Error::Http { .. } => ErrorCategory::Network,
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this error is worth one wait-and-retry.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether this error can be safely ignored on removal.
    pub fn is_ignorable(&self) -> bool {
        self.category().is_ignorable()
    }

    /// Classify a non-2xx response.
    ///
    /// `body` is the raw response body; when it is a JSON object with a
    /// `message` field that message is used.
    pub fn from_status(status: u16, path: &str, body: &str, reset_millis: Option<i64>) -> Self {
        let message = server_message(body).unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("HTTP {status}")
            } else {
                body.trim().to_string()
            }
        });

        match status {
            401 => Error::Unauthorized { message },
            404 => Error::NotFound {
                path: path.to_string(),
            },
            409 => Error::Conflict { message },
            429 => Error::RateLimited { reset_millis },
            _ => Error::Api { status, message },
        }
    }
}

fn server_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("message")?.as_str().map(str::to_string)
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Api {
                status: code,
                message: format!("HTTP {code}"),
            },
            other => Self::Http {
                message: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Turn a `NotFound` into `Ok(None)`.
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for Result<T> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::RateLimit.is_retryable());
        assert!(!ErrorCategory::Network.is_retryable());
        assert!(!ErrorCategory::Conflict.is_retryable());
        assert!(!ErrorCategory::Unauthorized.is_retryable());
    }

    #[test]
    fn test_error_category_ignorable() {
        assert!(ErrorCategory::NotFound.is_ignorable());
        assert!(!ErrorCategory::Api.is_ignorable());
    }

    #[test]
    fn test_from_status_uses_server_message() {
        let err = Error::from_status(400, "/flags/p", r#"{"code":"invalid_request","message":"bad variation"}"#, None);
        assert_eq!(err.category(), ErrorCategory::Api);
        assert_eq!(err.to_string(), "API error (400): bad variation");
    }

    #[test]
    fn test_from_status_raw_body() {
        let err = Error::from_status(502, "/x", "upstream down\n", None);
        assert_eq!(err.to_string(), "API error (502): upstream down");
        let err = Error::from_status(500, "/x", "", None);
        assert_eq!(err.to_string(), "API error (500): HTTP 500");
    }

    #[test]
    fn test_from_status_categories() {
        assert_eq!(Error::from_status(401, "/", "", None).category(), ErrorCategory::Unauthorized);
        assert_eq!(Error::from_status(404, "/", "", None).category(), ErrorCategory::NotFound);
        assert_eq!(Error::from_status(409, "/", "", None).category(), ErrorCategory::Conflict);
        assert!(matches!(
            Error::from_status(429, "/", "", Some(42)),
            Error::RateLimited { reset_millis: Some(42) }
        ));
    }

    #[test]
    fn test_optional() {
        let missing: Result<u8> = Err(Error::NotFound { path: "/p".into() });
        assert_eq!(missing.optional().unwrap(), None);
        let found: Result<u8> = Ok(1);
        assert_eq!(found.optional().unwrap(), Some(1));
        let failed: Result<u8> = Err(Error::Other("x".into()));
        assert!(failed.optional().is_err());
    }
}
