//! Errors raised while building or executing a scan.

use thiserror::Error;

/// Result type alias for scanner operations.
pub type Result<T> = std::result::Result<T, ScanError>;

/// Errors produced by the query builder and the scan transport.
#[derive(Debug, Error)]
pub enum ScanError {
    /// `and`/`or` called with no operands
    #[error("Logical expression requires at least one operand")]
    EmptyLogicalExpression,

    /// Non-2xx response from the scanner
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request exceeded its timeout
    #[error("Request timed out")]
    Timeout,

    /// Connection or protocol failure before a response arrived
    #[error("Network error: {0}")]
    Network(String),

    /// The query document could not be serialized
    #[error("Failed to encode query: {0}")]
    Encode(#[source] serde_json::Error),

    /// The response body was not a valid scan envelope
    #[error("Failed to decode scan response: {0}")]
    Decode(#[source] serde_json::Error),
}

impl ScanError {
    /// HTTP status of a rejected request, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if the error came from the transport rather than local construction.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Http { .. } | Self::Timeout | Self::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_message_contains_status_and_body() {
        let err = ScanError::Http {
            status: 400,
            body: r#"{"error":"Unknown field \"foo\""}"#.into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("400"));
        assert!(msg.contains("Unknown field"));
        assert_eq!(err.status(), Some(400));
        assert!(err.is_transport());
    }

    #[test]
    fn test_construction_error_is_not_transport() {
        let err = ScanError::EmptyLogicalExpression;
        assert!(!err.is_transport());
        assert_eq!(err.status(), None);
    }
}
