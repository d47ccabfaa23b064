use serde::Serialize;
use ts_rs::TS;

/// Why a run produced no pixels. Every variant is reported to the caller as
/// a single failure message; none of them is retried.
#[derive(Debug, Clone, Serialize, TS, thiserror::Error)]
#[serde(tag = "code", content = "detail")]
#[ts(export)]
pub enum RunError {
    /// The program did not compile. `message` holds one formatted
    /// diagnostic per line.
    #[error("{message}")]
    Compile { message: String, count: usize },
    /// The program raised an error while evaluating one pixel.
    #[error("{message} at pixel ({x}, {y})")]
    Runtime { message: String, x: u32, y: u32 },
    /// The request was rejected before any evaluation.
    #[error("{message}")]
    InvalidRequest { message: String },
    /// The evaluator panicked; the run was torn down.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl RunError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// The message shown to the user: the display text with an `Error:` prefix.
    pub fn user_message(&self) -> String {
        format!("Error: {self}")
    }
}

/// Failures of the channel between a coordinator and the sandbox worker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    #[error("sandbox worker is not running")]
    Closed,
    #[error("request superseded by a newer one")]
    Superseded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_error_names_the_pixel() {
        let err = RunError::Runtime {
            message: "math.explode is not a function".into(),
            x: 3,
            y: 3,
        };
        assert_eq!(err.to_string(), "math.explode is not a function at pixel (3, 3)");
        assert_eq!(
            err.user_message(),
            "Error: math.explode is not a function at pixel (3, 3)"
        );
    }

    #[test]
    fn internal_error_display_prefix() {
        let err = RunError::internal("boom");
        assert!(err.to_string().starts_with("internal error:"));
    }

    #[test]
    fn serializes_with_code_tag() {
        let err = RunError::invalid_request("grid size must be positive");
        let json = serde_json::to_value(&err).unwrap_or_default();
        assert_eq!(json["code"], "InvalidRequest");
        assert_eq!(json["detail"]["message"], "grid size must be positive");
    }
}
