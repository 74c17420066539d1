use thiserror::Error;

/// Failures of an advisor run, each with its own exit code.
#[derive(Debug, Error)]
pub enum AdvisorError {
    /// An indicator is missing, unparsable or out of range.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Client settings are unusable (missing API key, bad endpoint).
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Request never produced an HTTP response (connect failure, timeout).
    #[error("network error: {0}")]
    Network(String),
    /// The service refused the request for quota or rate-limit reasons.
    #[error("quota exhausted: {0}")]
    Quota(String),
    /// The service answered with an error status.
    #[error("api error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message reported by the service.
        message: String,
    },
    /// The service answered 2xx with a body that could not be understood.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl AdvisorError {
    /// Process exit code for this failure.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidInput(_) => 2,
            Self::Configuration(_) => 3,
            Self::Network(_) => 4,
            Self::Quota(_) => 5,
            Self::Api { .. } => 6,
            Self::MalformedResponse(_) => 7,
        }
    }

    /// Stable identifier used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Configuration(_) => "configuration",
            Self::Network(_) => "network",
            Self::Quota(_) => "quota",
            Self::Api { .. } => "api",
            Self::MalformedResponse(_) => "malformed_response",
        }
    }
}

impl From<reqwest::Error> for AdvisorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else if err.is_builder() {
            Self::Configuration(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_and_nonzero() {
        let errors = [
            AdvisorError::InvalidInput(String::new()),
            AdvisorError::Configuration(String::new()),
            AdvisorError::Network(String::new()),
            AdvisorError::Quota(String::new()),
            AdvisorError::Api {
                status: 500,
                message: String::new(),
            },
            AdvisorError::MalformedResponse(String::new()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(AdvisorError::exit_code).collect();
        assert!(codes.iter().all(|code| *code != 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn api_error_message_includes_status() {
        let err = AdvisorError::Api {
            status: 403,
            message: "API key not valid".into(),
        };
        assert_eq!(err.to_string(), "api error (403): API key not valid");
        assert_eq!(err.kind(), "api");
    }
}
