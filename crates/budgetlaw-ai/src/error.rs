use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[cfg(feature = "openai")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed oracle response: {0}")]
    Schema(String),

    #[error("amounts were reported without converting them through the `calculate` tool")]
    ToolNotUsed,

    #[error("oracle did not submit proposals within {0} tool turns")]
    TooManyTurns(usize),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AiError {
    /// Worth another attempt: network trouble, rate limits, server errors, or a
    /// malformed generation the oracle may get right next time.
    pub fn is_transient(&self) -> bool {
        match self {
            #[cfg(feature = "openai")]
            Self::Http(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Json(_) | Self::Schema(_) | Self::ToolNotUsed | Self::TooManyTurns(_) => true,
            Self::Config(_) => false,
        }
    }

    /// The failure came from the generated output itself, so describing it to
    /// the oracle can help it correct the next attempt.
    pub fn is_generation_error(&self) -> bool {
        matches!(
            self,
            Self::Json(_) | Self::Schema(_) | Self::ToolNotUsed | Self::TooManyTurns(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        let api = |status| AiError::Api {
            status,
            body: String::new(),
        };
        assert!(api(429).is_transient());
        assert!(api(503).is_transient());
        assert!(!api(401).is_transient());
        assert!(!api(400).is_generation_error());
    }

    #[test]
    fn generation_errors_are_transient() {
        assert!(AiError::ToolNotUsed.is_transient());
        assert!(AiError::Schema("x".into()).is_generation_error());
        assert!(!AiError::Config("x".into()).is_transient());
    }
}
