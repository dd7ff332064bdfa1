//! Error types for the shared-random-value commit-reveal engine.

use tor_error::{ErrorKind, HasKind};

/// An error produced by this crate.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A commit or SRV line (from a vote, or from the on-disk state file)
    /// could not be parsed, or violated one of the structural rules in
    /// §4.A/§4.B: wrong digest algorithm, unparseable identity, mismatched
    /// hash-of-reveal, mismatched timestamps, and so on.
    ///
    /// The caller should reject the offending commit and move on; it must
    /// not retry the same peer in the same round.
    #[error("malformed shared-random protocol data: {0}")]
    Protocol(String),

    /// The on-disk `sr-state` file was unreadable, had a bad magic version,
    /// or had already expired (`valid_until < now`).
    ///
    /// The caller should discard it and continue with a freshly initialized
    /// state, per §4.B "Validation on load".
    #[error("persisted shared-random state is invalid: {0}")]
    Persistence(String),

    /// Reading or writing the `sr-state` file in the data directory failed.
    #[error("i/o error accessing shared-random state: {0}")]
    Io(String),

    /// An internal invariant was violated: a caller tried to mutate phase
    /// or round counters through the wrong path, or the engine was asked
    /// to compute an SRV with no previous SRV and fewer than 3 reveals
    /// contradicting prior validation.
    #[error("internal error in shared-random engine: {0}")]
    Internal(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Protocol(_) => ErrorKind::TorProtocolViolation,
            Error::Persistence(_) => ErrorKind::PersistentStateCorrupted,
            Error::Io(_) => ErrorKind::PersistentStateAccessFailed,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// A `Result` type alias, for convenience.
pub type Result<T> = std::result::Result<T, Error>;
