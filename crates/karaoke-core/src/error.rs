//! Error types for the job pipeline

use std::path::PathBuf;

use thiserror::Error;

use crate::tool::ToolKind;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed or missing request input
    #[error("{0}")]
    Validation(String),

    #[error("Invalid semitone value: {0}")]
    InvalidSemitones(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The binary could not be started at all
    #[error("Failed to start {tool}: {source}")]
    ToolSpawn {
        tool: ToolKind,
        #[source]
        source: std::io::Error,
    },

    /// Non-zero exit or death by signal
    #[error("{tool} failed ({}): {stderr}", describe_exit(.code))]
    ToolFailed {
        tool: ToolKind,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{tool} timed out after {timeout_secs}s")]
    ToolTimeout { tool: ToolKind, timeout_secs: u64 },

    #[error("No output found in {}", .path.display())]
    OutputNotFound { path: PathBuf },

    #[error("Ambiguous output in {}: {count} candidate directories", .path.display())]
    AmbiguousOutput { path: PathBuf, count: usize },

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// HTTP status the error maps to at the service edge
    pub fn status_code(&self) -> u16 {
        if self.is_client_error() { 400 } else { 500 }
    }

    /// True for errors caused by bad request input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CoreError::Validation(_) | CoreError::InvalidSemitones(_) | CoreError::InvalidUrl(_)
        )
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "terminated by signal".to_string(),
    }
}

/// Result type for pipeline operations
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_client_errors() {
        assert_eq!(CoreError::Validation("missing audio".into()).status_code(), 400);
        assert_eq!(CoreError::InvalidSemitones("abc".into()).status_code(), 400);
        assert_eq!(CoreError::InvalidUrl("".into()).status_code(), 400);
    }

    #[test]
    fn test_tool_and_output_errors_are_server_errors() {
        let failed = CoreError::ToolFailed {
            tool: ToolKind::Separator,
            code: Some(1),
            stderr: "boom".into(),
        };
        assert_eq!(failed.status_code(), 500);
        assert_eq!(failed.to_string(), "separator failed (exit code 1): boom");

        let missing = CoreError::OutputNotFound { path: PathBuf::from("/tmp/x") };
        assert_eq!(missing.status_code(), 500);
    }

    #[test]
    fn test_signal_exit_message() {
        let err = CoreError::ToolFailed {
            tool: ToolKind::Transcoder,
            code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("terminated by signal"));
    }
}
