#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Input rejected locally, before any request was made.
    #[error("{0}")]
    Validation(String),

    /// The service answered with a non-success status or an unreadable body.
    #[error("{message}")]
    Http { status: u16, message: String },

    /// The service rejected the session token (HTTP 401).
    #[error("{message}")]
    Unauthorized { message: String },

    /// No response could be obtained from the service.
    #[error("Network error: {0}")]
    Network(String),

    /// The session ended (logout or expiry) while the request was in flight;
    /// its result was discarded.
    #[error("Session ended before the request completed")]
    SessionEnded,

    #[error("Session storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status carried by the error, if the service answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Unauthorized { .. } => Some(401),
            _ => None,
        }
    }

    /// `true` when the session has ended and the caller must treat the user as logged out.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// `true` for the registration conflict the service reports as a 400
    /// mentioning an existing username or email.
    #[must_use]
    pub fn is_already_registered(&self) -> bool {
        match self {
            Self::Http {
                status: 400,
                message,
            } => message.contains("already exists") || message.contains("already registered"),
            _ => false,
        }
    }
}

#[cfg(feature = "client")]
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// Builds the user-facing message for a failed response.
///
/// Uses the body's `detail` field when present (a string, or a list of
/// validation entries carrying `msg`), else `HTTP error <status>`.
#[cfg_attr(not(feature = "client"), allow(dead_code))]
pub(crate) fn detail_message(status: u16, body: &[u8]) -> String {
    let detail = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|json| json.get("detail").cloned());

    match detail {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s,
        Some(serde_json::Value::Array(items)) => {
            let msgs: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .collect();
            if msgs.is_empty() {
                format!("HTTP error {status}")
            } else {
                msgs.join("; ")
            }
        }
        _ => format!("HTTP error {status}"),
    }
}
