//! Batch orchestration: worklist in, fingerprint collection out.
//!
//! The generator drives one fetch + encode attempt per worklist entry,
//! sequentially or across a fixed-size worker pool, and merges the
//! successes into a [`FingerprintCollection`] in worklist order. A record
//! that cannot be fetched or yields no fingerprint is dropped and counted;
//! it never aborts the batch. Only configuration problems are surfaced as
//! errors, before any work starts.

use std::time::Instant;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{debug, info, warn, Level};

use crate::collection::FingerprintCollection;
use crate::error::GenerateError;
use crate::fingerprint::{Fingerprint, StructureId};
use crate::session::FetchSession;

/// Per-record feature extraction: raw structural input to fingerprint.
///
/// Returning `None` is the legitimate "no fingerprint for this record"
/// outcome, not an error; the orchestrator drops the record and moves on.
/// Implementations must be pure with respect to the batch: no shared
/// mutable state across records.
pub trait FingerprintEncoder<T> {
    /// Encode the structure fetched for `id`, or signal that no
    /// fingerprint can be produced.
    fn encode(&self, id: &StructureId, structure: &T) -> Option<Fingerprint>;
}

impl<T, F> FingerprintEncoder<T> for F
where
    F: Fn(&StructureId, &T) -> Option<Fingerprint>,
{
    fn encode(&self, id: &StructureId, structure: &T) -> Option<Fingerprint> {
        self(id, structure)
    }
}

/// Advisory diagnostics for one batch run. Logged via `tracing` and
/// returned by [`FingerprintGenerator::generate_with_report`]; never part
/// of the output data.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Worker degree the batch ran with.
    pub parallelism: usize,
    /// Number of worklist entries, duplicates included.
    pub n_input: usize,
    /// Attempts that produced a fingerprint accepted into the collection.
    pub n_produced: usize,
    /// Wall-clock start of the batch.
    pub started_at: DateTime<Utc>,
    /// Wall-clock end of the batch.
    pub finished_at: DateTime<Utc>,
}

/// Maps a worklist of identifiers to a fingerprint collection.
pub struct FingerprintGenerator<E> {
    encoder: E,
}

impl<E> FingerprintGenerator<E> {
    /// Generator around the given per-record encoder.
    pub fn new(encoder: E) -> Self {
        Self { encoder }
    }

    /// Compute one fingerprint per worklist entry and collect the
    /// successes, in worklist order, into one collection.
    ///
    /// `parallelism` is the worker degree: `1` processes entries one at a
    /// time with no pool, anything greater fans the worklist out across a
    /// dedicated pool of that many workers. `0` is a configuration error,
    /// raised before any fetch. The merged result is identical in content
    /// and order for every degree.
    pub fn generate<S>(
        &self,
        worklist: &[StructureId],
        session: &S,
        parallelism: usize,
    ) -> Result<FingerprintCollection, GenerateError>
    where
        S: FetchSession + Sync,
        S::Structure: Send,
        E: FingerprintEncoder<S::Structure> + Sync,
    {
        self.generate_with_report(worklist, session, parallelism)
            .map(|(collection, _)| collection)
    }

    /// Like [`Self::generate`], also returning the batch diagnostics.
    pub fn generate_with_report<S>(
        &self,
        worklist: &[StructureId],
        session: &S,
        parallelism: usize,
    ) -> Result<(FingerprintCollection, BatchReport), GenerateError>
    where
        S: FetchSession + Sync,
        S::Structure: Send,
        E: FingerprintEncoder<S::Structure> + Sync,
    {
        if parallelism == 0 {
            return Err(GenerateError::InvalidParallelism { parallelism });
        }

        let started_at = Utc::now();
        let timer = Instant::now();
        let span = tracing::span!(
            Level::INFO,
            "fingerprints.generate",
            parallelism,
            n_input = worklist.len()
        );
        let _guard = span.enter();
        info!(
            parallelism,
            n_input = worklist.len(),
            started_at = %started_at,
            "batch_start"
        );

        // Workers only ever produce into their own slots; the merge below
        // is the single writer of the collection. Indexed collection keeps
        // worklist order regardless of completion order.
        let results: Vec<Option<Fingerprint>> = if parallelism == 1 {
            worklist.iter().map(|id| self.encode_one(id, session)).collect()
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(parallelism)
                .build()?;
            pool.install(|| {
                worklist
                    .par_iter()
                    .map(|id| self.encode_one(id, session))
                    .collect()
            })
        };

        let mut collection = FingerprintCollection::new();
        let mut n_produced = 0usize;
        for fingerprint in results.into_iter().flatten() {
            let id = fingerprint.id().clone();
            match collection.insert(fingerprint) {
                Ok(()) => n_produced += 1,
                Err(err) => warn!(id = %id, error = %err, "record_failure"),
            }
        }

        let finished_at = Utc::now();
        info!(
            n_input = worklist.len(),
            n_produced,
            n_collected = collection.len(),
            finished_at = %finished_at,
            elapsed_ms = timer.elapsed().as_millis() as u64,
            "batch_done"
        );

        let report = BatchReport {
            parallelism,
            n_input: worklist.len(),
            n_produced,
            started_at,
            finished_at,
        };
        Ok((collection, report))
    }

    fn encode_one<S>(&self, id: &StructureId, session: &S) -> Option<Fingerprint>
    where
        S: FetchSession,
        E: FingerprintEncoder<S::Structure>,
    {
        let structure = match session.fetch(id) {
            Ok(structure) => structure,
            Err(err) => {
                warn!(id = %id, error = %err, "record_failure");
                return None;
            }
        };
        match self.encoder.encode(id, &structure) {
            Some(fingerprint) => Some(fingerprint),
            None => {
                // Not an error: the encoder may legitimately decline.
                debug!(id = %id, "record_skipped");
                None
            }
        }
    }
}
