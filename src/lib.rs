//! Batch fingerprint encoding for structural records.
//!
//! This is the pipeline that turns a worklist of record identifiers into a
//! persistable set of numeric fingerprints. Raw structural input is pulled
//! through a [`FetchSession`] backend, encoded per record by a
//! [`FingerprintEncoder`], and the successes are collected, in worklist
//! order, into a [`FingerprintCollection`] that can be saved to and
//! reloaded from a versioned JSON document without losing a single bit of
//! any feature value.
//!
//! ## Contract
//!
//! - A record either yields a complete fingerprint or is dropped; there is
//!   no partial recovery. Per-record failures never abort the batch and
//!   are visible only in logs and the [`BatchReport`].
//! - Every fingerprint in a collection carries the same block schema, so
//!   features can be compared column-wise across records downstream.
//! - `load(save(c))` is value-identical to `c`, including `NaN`
//!   missing-value sentinels, for every identifier.
//! - The merged result is identical for every parallelism degree; worker
//!   completion order never leaks into the collection order.
//!
//! ## Example
//!
//! ```
//! use fingerprints::{
//!     FeatureBlock, Fingerprint, FingerprintGenerator, InMemorySession, StructureId,
//! };
//!
//! let session: InMemorySession<Vec<f64>> =
//!     [(109u32, vec![1.5, f64::NAN, -2.25])].into_iter().collect();
//!
//! let generator = FingerprintGenerator::new(|id: &StructureId, values: &Vec<f64>| {
//!     let block = FeatureBlock::from_flat(1, values.len(), values.clone()).ok()?;
//!     Some(Fingerprint::new(id.clone()).with_block("features", block))
//! });
//!
//! let worklist = vec![StructureId::from(109u32), StructureId::from(4040u32)];
//! let collection = generator.generate(&worklist, &session, 1).unwrap();
//!
//! // 4040 is unknown to the session and was dropped, not fatal.
//! assert_eq!(collection.len(), 1);
//! assert!(collection.contains(&109u32.into()));
//! ```

mod collection;
mod error;
mod fingerprint;
mod generator;
mod session;

pub use crate::collection::{FingerprintCollection, FORMAT_VERSION};
pub use crate::error::{GenerateError, PersistError, SchemaMismatch, SessionError, ShapeError};
pub use crate::fingerprint::{BlockSchema, FeatureBlock, Fingerprint, StructureId};
pub use crate::generator::{BatchReport, FingerprintEncoder, FingerprintGenerator};
pub use crate::session::{DirectorySession, FetchSession, InMemorySession};
