//! Engine error taxonomy.
//!
//! `Silence` and `Noop` are not failures in the usual sense: they are
//! cheap signals a node can raise to mean "the correct output here is
//! zeros" or "I would not modify the data". Containers recover them
//! into the corresponding pass-through or zero-fill; everything else
//! bubbles up with `?`.

use std::fmt;

/// Result alias used by every fallible engine operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Error codes raised by engine operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The operation is not valid for this node.
    Invalid,
    /// A required entity was missing or a lookup failed.
    NoEntity,
    /// A duplicate key or entity was already present.
    Exists,
    /// The operation would yield only silence. Recoverable: the
    /// destination region is zero-filled for the requested range.
    Silence,
    /// The operation would not modify any data. Recoverable: input is
    /// copied straight through to the output.
    Noop,
    /// A backing OS or library call failed.
    System(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Invalid => write!(f, "operation not valid for this node"),
            Error::NoEntity => write!(f, "no such entity"),
            Error::Exists => write!(f, "entity already exists"),
            Error::Silence => write!(f, "operation would yield silence"),
            Error::Noop => write!(f, "operation would not modify data"),
            Error::System(msg) => write!(f, "system error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// True for the two signals that containers recover locally
    /// instead of propagating.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Silence | Error::Noop)
    }
}
