//! Which download failures are worth another attempt.

use reqwest::StatusCode;

/// Attempts made per archive download.
pub const MAX_RETRIES: usize = 3;

/// Pause between attempts.
pub const RETRY_DELAY_MS: u64 = 1000;

/// A download failure another attempt cannot fix. Each variant carries the
/// URL that failed.
#[derive(Debug)]
pub enum NonRetryableError {
    /// HTTP 429
    RateLimitExceeded(String),
    /// HTTP 401
    AuthenticationFailed(String),
    /// HTTP 404
    NotFound(String),
    /// HTTP 403
    Forbidden(String),
    /// Any other 4xx
    ClientError(String),
}

impl std::fmt::Display for NonRetryableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NonRetryableError::RateLimitExceeded(url) => {
                write!(f, "Rate limit exceeded downloading {}", url)
            }
            NonRetryableError::AuthenticationFailed(url) => {
                write!(f, "{} requires credentials", url)
            }
            NonRetryableError::NotFound(url) => write!(f, "Not found: {}", url),
            NonRetryableError::Forbidden(url) => write!(f, "Access to {} is forbidden", url),
            NonRetryableError::ClientError(msg) => write!(f, "Request rejected: {}", msg),
        }
    }
}

impl std::error::Error for NonRetryableError {}

/// `Ok` when another attempt may succeed: server errors, timeouts and
/// dropped connections.
pub fn classify_error(error: &reqwest::Error) -> Result<(), NonRetryableError> {
    let Some(status) = error.status() else {
        return Ok(());
    };
    let url = url_of(error);
    match status {
        StatusCode::UNAUTHORIZED => Err(NonRetryableError::AuthenticationFailed(url)),
        StatusCode::FORBIDDEN => Err(NonRetryableError::Forbidden(url)),
        StatusCode::TOO_MANY_REQUESTS => Err(NonRetryableError::RateLimitExceeded(url)),
        StatusCode::NOT_FOUND => Err(NonRetryableError::NotFound(url)),
        s if s.is_client_error() => Err(NonRetryableError::ClientError(format!(
            "HTTP {} from {}",
            s.as_u16(),
            url
        ))),
        _ => Ok(()),
    }
}

fn url_of(error: &reqwest::Error) -> String {
    error
        .url()
        .map(|url| url.to_string())
        .unwrap_or_else(|| "<unknown url>".to_string())
}

/// Wraps a failed status check, tagging permanent failures with
/// [`NonRetryableError`] so the retry loop stops.
pub fn check_retryable(error: reqwest::Error) -> anyhow::Error {
    match classify_error(&error) {
        Ok(()) => anyhow::Error::from(error),
        Err(non_retryable) => anyhow::Error::from(non_retryable),
    }
}
