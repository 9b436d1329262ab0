//! Error types produced by the fingerprint pipeline.
//!
//! Errors are typed per concern so callers can tell a misconfigured batch
//! apart from a broken backing store or a corrupt persisted document.
//! Per-record problems never surface here: a record that cannot be fetched
//! or encoded is dropped from the output collection and only shows up in
//! the batch diagnostics.

use thiserror::Error;

use crate::fingerprint::{BlockSchema, StructureId};

/// Errors raised when constructing a [`crate::FeatureBlock`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShapeError {
    /// Row-wise construction received rows of differing lengths.
    #[error("ragged feature rows: row {row} has {found} values, expected {expected}")]
    Ragged {
        /// Index of the offending row.
        row: usize,
        /// Length established by the first row.
        expected: usize,
        /// Length actually found.
        found: usize,
    },

    /// Flat construction received a value count that does not fill the shape.
    #[error("{found} values do not fill a {rows}x{cols} feature block")]
    Count {
        /// Requested row count.
        rows: usize,
        /// Requested column count.
        cols: usize,
        /// Number of values supplied.
        found: usize,
    },
}

/// A fingerprint whose block layout disagrees with the schema already
/// established by a [`crate::FingerprintCollection`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("fingerprint {id} does not match collection schema: expected {expected}, found {found}")]
pub struct SchemaMismatch {
    /// Identifier of the rejected fingerprint.
    pub id: StructureId,
    /// Schema established by the collection.
    pub expected: BlockSchema,
    /// Schema of the rejected fingerprint.
    pub found: BlockSchema,
}

/// Failures of the fetch capability for a single identifier.
///
/// These never abort a batch; the orchestrator logs them and drops the
/// affected record.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// The backing store has no structure under this identifier.
    #[error("structure {id} not found in backing store")]
    NotFound {
        /// Identifier that could not be resolved.
        id: StructureId,
    },

    /// The backing store failed at the I/O level.
    #[error("backing store i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific failure (connection loss, protocol error, ...).
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Batch-level configuration errors. Raised before any fetch or encode.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GenerateError {
    /// The requested worker count is not a positive degree.
    #[error("parallelism must be at least 1, got {parallelism}")]
    InvalidParallelism {
        /// The rejected value.
        parallelism: usize,
    },

    /// The worker pool could not be constructed.
    #[error("worker pool construction failed: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Failures of [`crate::FingerprintCollection::save`] and
/// [`crate::FingerprintCollection::load`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PersistError {
    /// Destination unwritable on save, or source unreadable on load.
    #[error("fingerprint store i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// The document is not parseable as a fingerprint store.
    #[error("malformed fingerprint document: {0}")]
    Format(#[from] serde_json::Error),

    /// The document was written by an incompatible format revision.
    #[error("unsupported fingerprint store version {found}, this build reads version {expected}")]
    UnsupportedVersion {
        /// Version declared by the document.
        found: u32,
        /// Version this build understands.
        expected: u32,
    },

    /// A block inside one record does not fill its declared shape.
    #[error("record {id}, block {block}: {source}")]
    Block {
        /// Identifier of the offending record.
        id: StructureId,
        /// Name of the offending block.
        block: String,
        /// Underlying shape problem.
        source: ShapeError,
    },

    /// A record's block layout disagrees with the rest of the document.
    #[error(transparent)]
    Schema(#[from] SchemaMismatch),
}
