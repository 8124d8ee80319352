//! Fetch failure classification for retry log lines and metric labels.

use reqwest::StatusCode;

/// Coarse category of a failed feed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Request timed out
    Timeout,
    /// Connection refused, DNS failure or other offline scenario
    Connection,
    /// HTTP 429
    RateLimit,
    /// HTTP 5xx
    ServerError(u16),
    /// HTTP 4xx other than 429
    ClientError(u16),
    /// Feed answered `null`
    Missing,
    /// Body was not a valid item document
    Decode,
    /// Anything else
    Other,
}

impl FailureKind {
    /// Short description used in log messages
    pub fn description(&self) -> &'static str {
        match self {
            Self::Timeout => "network timeout",
            Self::Connection => "connection failed",
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::ClientError(code) => match code {
                401 | 403 => "access denied",
                404 => "resource not found",
                _ => "client error",
            },
            Self::Missing => "item not yet available",
            Self::Decode => "malformed item document",
            Self::Other => "network error",
        }
    }

    /// Stable label for metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::RateLimit => "rate_limit",
            Self::ServerError(_) => "server",
            Self::ClientError(_) => "client",
            Self::Missing => "missing",
            Self::Decode => "decode",
            Self::Other => "other",
        }
    }

    /// Classify from an HTTP status, `Other` when there is none
    pub fn from_status(status: Option<StatusCode>) -> Self {
        match status {
            Some(status) if status == StatusCode::TOO_MANY_REQUESTS => Self::RateLimit,
            Some(status) if status.is_server_error() => Self::ServerError(status.as_u16()),
            Some(status) if status.is_client_error() => Self::ClientError(status.as_u16()),
            _ => Self::Other,
        }
    }

    /// Recover the status classification from a `FeedError::HttpError` message.
    ///
    /// Messages are produced by the HTTP client as `"status <code>: ..."`.
    pub(crate) fn from_status_message(message: &str) -> Self {
        let code = message
            .strip_prefix("status ")
            .and_then(|rest| rest.split(|c: char| !c.is_ascii_digit()).next())
            .and_then(|digits| digits.parse::<u16>().ok())
            .and_then(|code| StatusCode::from_u16(code).ok());

        Self::from_status(code)
    }

    /// Recover the transport classification from a `FeedError::NetworkError` message.
    pub(crate) fn from_network_message(message: &str) -> Self {
        if message.starts_with("timeout") {
            Self::Timeout
        } else if message.starts_with("connect") {
            Self::Connection
        } else {
            Self::Other
        }
    }
}
