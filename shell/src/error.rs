use std::io;
use thiserror::Error;

/// Errors produced while turning a line into a [`Pipeline`](crate::parser::Pipeline).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A `'` or `"` was opened but never closed.
    #[error("unterminated {0} quote")]
    UnterminatedQuote(char),
    /// A redirection operator had no path after it.
    #[error("missing file name after '{0}'")]
    MalformedRedirect(&'static str),
    /// A stage without a command name, e.g. either side of a bare `|`.
    #[error("missing command")]
    EmptyStage,
    /// `&` appeared somewhere other than the end of the line.
    #[error("'&' is only allowed at the end of a line")]
    MisplacedBackground,
    /// Both `>` and `>>` were given for the same stage.
    #[error("both '>' and '>>' given for one command")]
    ConflictingOutput,
}

/// Errors produced by the raw line reader.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("input line longer than {limit} bytes")]
    LineTooLong { limit: usize },
    #[error("terminal read failed: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised while dispatching a parsed pipeline.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("{0}: command not found")]
    CommandNotFound(String),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("{name}: can't start: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl ShellError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        ShellError::Io {
            context: context.into(),
            source,
        }
    }
}
