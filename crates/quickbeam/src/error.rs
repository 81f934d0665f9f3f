//! Error types for Quickbeam evaluation and scanning

use thiserror::Error;

/// Main error type for Quickbeam operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Unquote was applied to a value at quote level zero
    #[error("Quote underflow: value is not quoted")]
    QuoteUnderflow,

    /// Quote was applied to a value already at the maximum quote level
    #[error("Quote overflow: quote level limit reached")]
    QuoteOverflow,

    /// An isotope was written into a slot of a persistent array
    #[error("Illegal isotope storage: {kind} isotope cannot be stored in an array")]
    IllegalIsotopeStorage {
        /// Datatype name of the offending isotope
        kind: String,
    },

    /// Mutation was attempted on frozen or protected data
    #[error("Protected: {what} cannot be modified")]
    ProtectedSeries {
        /// What was protected (series, cell, context)
        what: String,
    },

    /// A series was accessed through a handle whose slot has been freed
    #[error("Series freed: handle no longer refers to live data")]
    SeriesFreed,

    /// A series was accessed through the wrong element-width API
    #[error("Series type mismatch: expected {expected} content")]
    SeriesTypeMismatch {
        /// The content family the caller asked for
        expected: &'static str,
    },

    /// A frame's variables were read after the call returned uncaptured
    #[error("Frame expired{}", action_suffix(.action))]
    FrameExpired {
        /// Label of the action the frame instantiated, when known
        action: Option<String>,
    },

    /// Generic dispatch found no handler for (verb, kind)
    #[error("No handler: {verb} is not defined for {kind}")]
    NoHandlerForType {
        /// The generic verb that was invoked
        verb: String,
        /// Datatype name of the first argument
        kind: String,
    },

    /// An argument failed its declared type constraint
    #[error("Argument type mismatch: {action} expects {expected} for {param}, got {got}")]
    ArgumentTypeMismatch {
        /// Label of the invoked action
        action: String,
        /// Name of the offending parameter
        param: String,
        /// Rendered constraint
        expected: String,
        /// Datatype name of the value received
        got: String,
    },

    /// Input ran out while gathering an action's arguments
    #[error("Missing argument: {action} needs a value for {param}")]
    MissingArgument {
        /// Label of the invoked action
        action: String,
        /// Name of the unfilled parameter
        param: String,
    },

    /// A word was evaluated without a binding
    #[error("Name not bound: {name}")]
    NameNotBound {
        /// Spelling of the unbound word
        name: String,
    },

    /// An index fell outside a context's variable slots
    #[error("Out of range: no variable slot {index}")]
    OutOfRange {
        /// The offending slot index
        index: usize,
    },

    /// An action spec block could not be turned into a paramlist
    #[error("Bad action spec: {reason}")]
    BadActionSpec {
        /// What was wrong with the spec
        reason: String,
    },

    /// Call depth limit was exceeded
    #[error("Stack overflow: call depth {depth} exceeds maximum {max}")]
    StackOverflow {
        /// Depth at the point of failure
        depth: usize,
        /// Configured maximum
        max: usize,
    },

    /// Evaluation was interrupted via the interrupt flag
    #[error("Evaluation interrupted")]
    Interrupted,

    /// Scanning failed before evaluation could start
    #[error(transparent)]
    Scan(#[from] ScanError),
}

fn action_suffix(action: &Option<String>) -> String {
    match action {
        Some(label) => format!(" (was a frame of {})", label),
        None => String::new(),
    }
}

/// Result type alias for Quickbeam operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Error produced while scanning source bytes into arrays.
///
/// Carries the source position so interactive hosts can point at the
/// offending text without re-scanning.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", render_scan(.kind, .file, .line, .column))]
pub struct ScanError {
    /// What went wrong
    pub kind: ScanErrorKind,
    /// File label given to the scanner, if any
    pub file: Option<String>,
    /// 1-based line of the error (for missing delimiters, the line where
    /// the still-open construct began)
    pub line: u32,
    /// 1-based column of the error
    pub column: u32,
}

/// The specific scanning failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanErrorKind {
    /// Input ended while a construct was still open.
    ///
    /// Recoverable: an interactive host should prompt for more input.
    MissingDelimiter {
        /// The closer that would complete the construct
        expected: char,
    },

    /// A closing delimiter did not match the innermost open construct
    MismatchedDelimiter {
        /// The closer the innermost mode wanted, or `None` at top level
        expected: Option<char>,
        /// The closer actually scanned
        found: char,
    },

    /// A token was malformed beyond delimiter trouble
    Invalid {
        /// Description of the malformation
        what: String,
    },
}

impl ScanError {
    /// True when the error means "the input is fine so far, there is just
    /// not enough of it yet". Interactive hosts use this to keep reading
    /// instead of reporting failure.
    pub fn is_incomplete(&self) -> bool {
        matches!(self.kind, ScanErrorKind::MissingDelimiter { .. })
    }
}

fn render_scan(kind: &ScanErrorKind, file: &Option<String>, line: &u32, column: &u32) -> String {
    let place = match file {
        Some(file) => format!("{}:{}:{}", file, line, column),
        None => format!("{}:{}", line, column),
    };
    match kind {
        ScanErrorKind::MissingDelimiter { expected } => {
            format!("{}: missing '{}' before end of input", place, expected)
        }
        ScanErrorKind::MismatchedDelimiter {
            expected: Some(e),
            found,
        } => {
            format!("{}: found '{}' where '{}' was expected", place, found, e)
        }
        ScanErrorKind::MismatchedDelimiter {
            expected: None,
            found,
        } => {
            format!("{}: unexpected '{}' outside any open construct", place, found)
        }
        ScanErrorKind::Invalid { what } => format!("{}: {}", place, what),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_error_incomplete() {
        let err = ScanError {
            kind: ScanErrorKind::MissingDelimiter { expected: ']' },
            file: None,
            line: 1,
            column: 1,
        };
        assert!(err.is_incomplete());

        let err = ScanError {
            kind: ScanErrorKind::MismatchedDelimiter {
                expected: Some(')'),
                found: ']',
            },
            file: None,
            line: 1,
            column: 5,
        };
        assert!(!err.is_incomplete());
    }

    #[test]
    fn test_scan_error_render_with_file() {
        let err = ScanError {
            kind: ScanErrorKind::MissingDelimiter { expected: ']' },
            file: Some("boot.qb".to_string()),
            line: 3,
            column: 7,
        };
        assert_eq!(
            err.to_string(),
            "boot.qb:3:7: missing ']' before end of input"
        );
    }

    #[test]
    fn test_core_error_display() {
        let err = CoreError::NoHandlerForType {
            verb: "append".to_string(),
            kind: "integer!".to_string(),
        };
        assert_eq!(err.to_string(), "No handler: append is not defined for integer!");

        let err = CoreError::FrameExpired {
            action: Some("negate".to_string()),
        };
        assert_eq!(err.to_string(), "Frame expired (was a frame of negate)");
    }
}
