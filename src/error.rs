//! Error types for querylab.
//!
//! Three error families matter to callers, who match on message
//! substrings: "Failed to parse arguments" (parser), "Unsupported
//! method" / "Invalid collection" (dispatcher) and "Validation Error"
//! (rejected writes, whether caught before dispatch or by the store).

use thiserror::Error;

/// The main error type for console operations.
#[derive(Debug, Error)]
pub enum ShellError {
    /// The line does not look like `db.collection.method(...)`.
    #[error("Invalid query format. Expected: db.collection.method(...)")]
    InvalidFormat,

    /// The argument span never closes.
    #[error("Unbalanced parentheses in query")]
    Unbalanced,

    /// The argument text is not valid literal syntax.
    #[error("Failed to parse arguments: {0}")]
    ParseArgs(String),

    /// Collection is not on the allow-list.
    #[error("Invalid collection: {0}")]
    UnknownCollection(String),

    /// Method is not in the fixed operation set.
    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    /// The arguments have the wrong shape for the method.
    #[error("{0}")]
    InvalidArguments(String),

    /// A write payload violates collection rules. Carries the joined
    /// list of rule messages.
    #[error("Validation Error: {0}")]
    Validation(String),

    /// Failure surfaced by the store collaborator.
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShellError {
    /// Create a parse-arguments error, trimming the offending fragment
    /// so messages stay one line.
    pub fn parse_args(fragment: &str) -> Self {
        let mut frag = fragment.trim().replace('\n', " ");
        if frag.chars().count() > 40 {
            let cut = frag
                .char_indices()
                .nth(40)
                .map(|(i, _)| i)
                .unwrap_or(frag.len());
            frag.truncate(cut);
            frag.push('…');
        }
        Self::ParseArgs(format!("unexpected input near '{frag}'"))
    }
}

/// Result type alias for console operations.
pub type ShellResult<T> = Result<T, ShellError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ShellError::UnknownCollection("orders".to_string());
        assert_eq!(err.to_string(), "Invalid collection: orders");

        let err = ShellError::Validation("Price cannot be negative".to_string());
        assert!(err.to_string().starts_with("Validation Error"));
    }

    #[test]
    fn test_parse_args_truncates_fragment() {
        let err = ShellError::parse_args(&"x".repeat(100));
        let msg = err.to_string();
        assert!(msg.starts_with("Failed to parse arguments"));
        assert!(msg.len() < 100);
    }
}
