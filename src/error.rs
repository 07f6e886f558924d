use std::fmt;
use std::io;

use crate::config::ValidationError;

/// Coarse classification of every failure the crate reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A configuration value is malformed.
    Validation,
    /// The operation is not valid in the current state (caller bug).
    State,
    /// The environment refused: OS errors, descriptors, pool capacity.
    Resource,
    /// A name or count did not match anything known.
    Lookup,
}

/// Administrative state of an interface, as reported in state errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Down,
    Up,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Down => write!(f, "down"),
            LinkState::Up => write!(f, "up"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("config error: {0}")]
    Config(String),

    #[error("{op} not permitted: interface {name} is {state}")]
    State {
        op: &'static str,
        name: String,
        state: LinkState,
    },

    #[error("a root pool is already live on this thread")]
    RootPoolLive,

    #[error("root pool still has {live} live interface pool(s)")]
    PoolBusy { live: usize },

    #[error("unable to {op} for {name}: {source}")]
    Os {
        op: &'static str,
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("pool exhausted: requested {requested} bytes, capacity {capacity}")]
    PoolExhausted { requested: usize, capacity: usize },

    #[error("short write on {name}: {written} of {len} bytes")]
    ShortWrite {
        name: String,
        written: usize,
        len: usize,
    },

    #[error("received frame of {len} bytes exceeds the 255-byte framing limit")]
    FrameTooLarge { len: usize },

    #[error("unknown statistic {name}")]
    UnknownStat { name: String },

    #[error("count mismatch: declared {declared}, found {actual} element(s)")]
    CountMismatch { declared: usize, actual: usize },

    #[error("malformed count prefix {0:?}")]
    BadCount(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::Config(_) => ErrorKind::Validation,
            Error::State { .. } | Error::RootPoolLive | Error::PoolBusy { .. } => ErrorKind::State,
            Error::Os { .. }
            | Error::Io(_)
            | Error::PoolExhausted { .. }
            | Error::ShortWrite { .. }
            | Error::FrameTooLarge { .. } => ErrorKind::Resource,
            Error::UnknownStat { .. } | Error::CountMismatch { .. } | Error::BadCount(_) => {
                ErrorKind::Lookup
            }
        }
    }

    /// True when the error comes from calling an operation out of sequence,
    /// as opposed to a transient or environmental failure.
    pub fn is_programming_error(&self) -> bool {
        self.kind() == ErrorKind::State
    }

    pub(crate) fn os(op: &'static str, name: &str, source: io::Error) -> Self {
        Error::Os {
            op,
            name: name.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A consuming operation refused to run; the handle is handed back.
pub struct Rejected<T> {
    handle: T,
    error: Error,
}

impl<T> Rejected<T> {
    pub(crate) fn new(handle: T, error: Error) -> Self {
        Self { handle, error }
    }

    pub fn error(&self) -> &Error {
        &self.error
    }

    pub fn into_inner(self) -> T {
        self.handle
    }

    pub fn into_parts(self) -> (T, Error) {
        (self.handle, self.error)
    }
}

impl<T> fmt::Debug for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<T> std::error::Error for Rejected<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<T> From<Rejected<T>> for Error {
    fn from(rejected: Rejected<T>) -> Self {
        rejected.error
    }
}
