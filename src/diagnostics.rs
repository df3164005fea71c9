//! Unified, `miette`-based error type for the json-tests engine.
//!
//! Every failure a suite or case can produce is a [`JsonTestError`]. Failures are data:
//! strategies hand them to a completion handle, they never unwind across a strategy.
//!
//! # Error Construction Macros
//!
//! - `err_msg!(Configuration, "missing `url` in request options")`
//! - `err_msg!(Lifecycle, "failed to spawn {}: {}", path, e)`

use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceCode};
use thiserror::Error;

pub type SourceArc = Arc<NamedSource<String>>;

/// Type-safe classification of a [`JsonTestError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Actual and expected values diverge
    Assertion,
    /// Missing, inconsistent or unresolvable suite fields
    Configuration,
    /// Request dispatch failed before any response arrived
    Transport,
    /// The subject under test raised an error
    Raised,
    /// Test server process could not be started or coordinated
    Lifecycle,
    /// Suite document could not be read or decoded
    Document,
    /// A completion handle was released without a result
    NotCompleted,
    /// No completion arrived within the configured time
    Timeout,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Assertion => "Assertion",
            ErrorKind::Configuration => "Configuration",
            ErrorKind::Transport => "Transport",
            ErrorKind::Raised => "Raised",
            ErrorKind::Lifecycle => "Lifecycle",
            ErrorKind::Document => "Document",
            ErrorKind::NotCompleted => "NotCompleted",
            ErrorKind::Timeout => "Timeout",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unified error type for all json-tests failure modes.
#[derive(Debug, Error)]
pub enum JsonTestError {
    #[error("{message}")]
    Mismatch {
        message: String,
        /// JSON path of the first divergence, `$` for the root.
        path: String,
        expected: String,
        actual: String,
        /// Status of the HTTP response the mismatch was found in, if any.
        status: Option<u16>,
    },
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        help: Option<String>,
    },
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },
    #[error("{message}")]
    Raised {
        message: String,
        kind: Option<String>,
    },
    #[error("Lifecycle error: {message}")]
    Lifecycle {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },
    #[error("Invalid suite document: {message}")]
    Parse {
        message: String,
        src: SourceArc,
        offset: usize,
    },
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
    #[error("Test finished without signalling completion")]
    NotCompleted,
    #[error("Timeout of {millis} ms exceeded waiting for completion")]
    Timeout { millis: u64 },
}

impl JsonTestError {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            JsonTestError::Mismatch { .. } => ErrorKind::Assertion,
            JsonTestError::Configuration { .. } => ErrorKind::Configuration,
            JsonTestError::Transport { .. } => ErrorKind::Transport,
            JsonTestError::Raised { .. } => ErrorKind::Raised,
            JsonTestError::Lifecycle { .. } => ErrorKind::Lifecycle,
            JsonTestError::Parse { .. } | JsonTestError::Io { .. } => ErrorKind::Document,
            JsonTestError::NotCompleted => ErrorKind::NotCompleted,
            JsonTestError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Status code of the response this failure was observed on.
    /// Transport failures never carry one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            JsonTestError::Mismatch { status, .. } => *status,
            _ => None,
        }
    }

    /// Attaches a response status to an assertion mismatch.
    pub fn with_status(self, code: u16) -> Self {
        match self {
            JsonTestError::Mismatch {
                message,
                path,
                expected,
                actual,
                ..
            } => JsonTestError::Mismatch {
                message,
                path,
                expected,
                actual,
                status: Some(code),
            },
            other => other,
        }
    }

    pub fn with_help(self, text: impl Into<String>) -> Self {
        match self {
            JsonTestError::Configuration { message, .. } => JsonTestError::Configuration {
                message,
                help: Some(text.into()),
            },
            other => other,
        }
    }

    /// Builds a [`JsonTestError::Parse`] from a `serde_json` failure on `source`.
    pub fn from_json(name: &str, source: &str, err: &serde_json::Error) -> Self {
        JsonTestError::Parse {
            message: err.to_string(),
            offset: line_col_to_offset(source, err.line(), err.column()),
            src: Arc::new(NamedSource::new(name, source.to_string())),
        }
    }
}

impl From<std::io::Error> for JsonTestError {
    fn from(err: std::io::Error) -> Self {
        JsonTestError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl Diagnostic for JsonTestError {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        Some(Box::new(format!("json_tests::{}", self.kind().as_str().to_lowercase())))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        match self {
            JsonTestError::Configuration { help: Some(h), .. } => {
                Some(Box::new(h) as Box<dyn std::fmt::Display + 'a>)
            }
            JsonTestError::Mismatch { path, .. } => {
                Some(Box::new(format!("first difference at {}", path)))
            }
            JsonTestError::Timeout { .. } => Some(Box::new(
                "raise the limit with --timeout, or pass 0 to wait indefinitely",
            )),
            _ => None,
        }
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        match self {
            JsonTestError::Parse { src, .. } => Some(src.as_ref() as &dyn SourceCode),
            _ => None,
        }
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let JsonTestError::Parse { message, offset, .. } = self else {
            return None;
        };
        let label = LabeledSpan::new(Some(message.clone()), *offset, 1);
        Some(Box::new(std::iter::once(label)))
    }
}

/// Converts serde_json's 1-based line/column into a byte offset clamped to the source.
fn line_col_to_offset(source: &str, line: usize, column: usize) -> usize {
    if line == 0 {
        return 0;
    }
    let line_start: usize = source
        .split_inclusive('\n')
        .take(line - 1)
        .map(str::len)
        .sum();
    let offset = line_start + column.saturating_sub(1);
    offset.min(source.len().saturating_sub(1))
}

/// Constructs a message-only [`JsonTestError`] variant.
///
/// Works with every variant shaped `{ message, <optional field> }`:
/// `Configuration`, `Transport`, `Raised`, `Lifecycle`, `Io`.
#[macro_export]
macro_rules! err_msg {
    (Configuration, $($arg:tt)+) => {
        $crate::JsonTestError::Configuration { message: format!($($arg)+), help: None }
    };
    (Raised, $($arg:tt)+) => {
        $crate::JsonTestError::Raised { message: format!($($arg)+), kind: None }
    };
    ($variant:ident, $($arg:tt)+) => {
        $crate::JsonTestError::$variant { message: format!($($arg)+), source: None }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use miette::Report;

    #[test]
    fn parse_errors_point_at_the_offending_byte() {
        let source = "{\n  \"tests\": [,]\n}";
        let err = serde_json::from_str::<serde_json::Value>(source).unwrap_err();
        let err = JsonTestError::from_json("suite.json", source, &err);
        let JsonTestError::Parse { offset, .. } = &err else {
            panic!("expected a parse error");
        };
        assert_eq!(&source[*offset..*offset + 1], ",");
        let output = format!("{:?}", Report::new(err));
        assert!(output.contains("suite.json"));
    }

    #[test]
    fn macro_builds_message_variants() {
        let err = err_msg!(Configuration, "missing `{}`", "url");
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.to_string(), "Configuration error: missing `url`");

        let err = err_msg!(Transport, "connection refused");
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn status_only_sticks_to_mismatches() {
        let mismatch = JsonTestError::Mismatch {
            message: "differs".into(),
            path: "$".into(),
            expected: "1".into(),
            actual: "2".into(),
            status: None,
        };
        assert_eq!(mismatch.with_status(404).status_code(), Some(404));
        assert_eq!(err_msg!(Transport, "down").with_status(404).status_code(), None);
    }

    #[test]
    fn configuration_help_is_rendered() {
        let err = err_msg!(Configuration, "no `method`").with_help("add `property` or `method`");
        let output = format!("{:?}", Report::new(err));
        assert!(output.contains("add `property` or `method`"));
    }
}
