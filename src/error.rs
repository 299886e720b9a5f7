//! Error types for recording, storing, and evaluating tapes.

use thiserror::Error;

use crate::store::TraceId;

/// Error variants for tape recording and evaluation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TapeError {
    /// Independent/dependent bookkeeping was inconsistent when the tape was
    /// finalized. Fatal to that recording.
    #[error("malformed trace: {0}")]
    MalformedTrace(String),

    /// A caller-supplied vector or matrix does not match the tape metadata.
    #[error("shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// What was being checked (e.g. `"inputs"`).
        what: &'static str,
        /// Length required by the tape.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },

    /// A second recording tried to take over a tape that is still being built.
    #[error("concurrent recording: {0}")]
    ConcurrentRecording(String),

    /// A different tape is already registered under this identifier.
    #[error("trace {0} is already registered with different records")]
    DuplicateId(TraceId),

    /// No finalized tape is registered under this identifier.
    #[error("no tape registered under trace {0}")]
    NotFound(TraceId),

    /// The worker pool for a parallel evaluation could not be built.
    #[error("worker pool: {0}")]
    WorkerPool(String),
}

/// Convenience alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, TapeError>;

/// Check a caller-supplied length against the length required by the tape.
pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(TapeError::ShapeMismatch {
            what,
            expected,
            actual,
        })
    }
}
