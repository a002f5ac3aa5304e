use thiserror::Error;

/// Errors raised by the venue plumbing and configuration layer.
///
/// None of these are fatal to the trading loop: a failing tick is logged
/// and abandoned, and the next tick starts from the last known good state.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },

    #[error("{endpoint} response is missing `{field}`")]
    MissingField { endpoint: String, field: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("order rejected: {reason}")]
    Rejected { reason: String },

    #[error("invalid symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BotError {
    pub fn missing(endpoint: &str, field: &str) -> Self {
        BotError::MissingField {
            endpoint: endpoint.to_string(),
            field: field.to_string(),
        }
    }

    /// The venue refused the credential; a new token is needed
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            BotError::Auth(_) | BotError::Status { status: 401 | 403, .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = BotError::missing("inquire-price", "output");
        assert_eq!(
            err.to_string(),
            "inquire-price response is missing `output`"
        );

        let err = BotError::Status {
            endpoint: "order-cash".to_string(),
            status: 500,
        };
        assert!(err.to_string().contains("500"));
        assert!(!err.is_auth_failure());
    }

    #[test]
    fn test_auth_failures() {
        assert!(BotError::Auth("expired".to_string()).is_auth_failure());
        assert!(BotError::Status {
            endpoint: "inquire-price".to_string(),
            status: 401,
        }
        .is_auth_failure());
        assert!(!BotError::InvalidSymbol("x".to_string()).is_auth_failure());
    }
}
