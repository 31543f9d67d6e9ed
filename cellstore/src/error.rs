//! Error types for the cell store.

use std::io;
use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Store error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Footer does not end in the expected magic byte sequence.
    #[error("cellstore: bad magic byte sequence")]
    BadMagic,

    /// A block carries an unknown compression marker.
    #[error("cellstore: invalid compression marker {0:#04x}")]
    InvalidCompression(u8),

    /// The caller supplied a cell ID that fails the S2 validity predicate.
    #[error("cellstore: invalid cell ID {0}")]
    InvalidCellId(u64),

    /// Append with a cell ID that is not strictly greater than the previous.
    #[error("cellstore: attempted an out-of-order append, {got} must be > {max}")]
    OutOfOrder { got: u64, max: u64 },

    /// Operation on a writer after `close`.
    #[error("cellstore: writer is closed")]
    Closed,

    /// The store bytes are structurally invalid.
    #[error("cellstore: corrupt store: {0}")]
    Corrupt(&'static str),

    /// I/O error from the underlying source or sink.
    #[error(transparent)]
    Io(#[from] io::Error),
}
