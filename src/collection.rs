//! Ordered, schema-validated result set and its persistence.
//!
//! A [`FingerprintCollection`] maps identifiers to fingerprints in
//! insertion order and enforces one block layout across all members. The
//! persistence format is a versioned JSON document keyed by identifier;
//! missing-value sentinels are written as JSON `null` (JSON has no NaN
//! literal) and restored to `NaN` on load, and float formatting is
//! shortest-round-trip exact, so `load(save(c))` is value-identical to
//! `c`.

use std::fs;
use std::io::Write;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{PersistError, SchemaMismatch};
use crate::fingerprint::{BlockSchema, FeatureBlock, Fingerprint, StructureId};

/// Format revision of the persisted document.
pub const FORMAT_VERSION: u32 = 1;

/// Keyed, insertion-ordered set of fingerprints sharing one block schema.
#[derive(Debug, Clone, Default)]
pub struct FingerprintCollection {
    entries: IndexMap<StructureId, Fingerprint>,
    schema: Option<BlockSchema>,
}

impl FingerprintCollection {
    /// Empty collection with no schema established yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fingerprint, keyed by its own identifier.
    ///
    /// The first insert establishes the collection's schema; later inserts
    /// must match it. Re-inserting an identifier replaces the stored
    /// fingerprint but keeps its original position.
    pub fn insert(&mut self, fingerprint: Fingerprint) -> Result<(), SchemaMismatch> {
        let schema = fingerprint.schema();
        match &self.schema {
            Some(expected) if *expected != schema => {
                return Err(SchemaMismatch {
                    id: fingerprint.id().clone(),
                    expected: expected.clone(),
                    found: schema,
                });
            }
            Some(_) => {}
            None => self.schema = Some(schema),
        }
        self.entries.insert(fingerprint.id().clone(), fingerprint);
        Ok(())
    }

    /// Look up one fingerprint by identifier.
    pub fn get(&self, id: &StructureId) -> Option<&Fingerprint> {
        self.entries.get(id)
    }

    /// Whether the collection holds a fingerprint for `id`.
    pub fn contains(&self, id: &StructureId) -> bool {
        self.entries.contains_key(id)
    }

    /// Identifiers in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &StructureId> {
        self.entries.keys()
    }

    /// `(identifier, fingerprint)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&StructureId, &Fingerprint)> {
        self.entries.iter()
    }

    /// Number of fingerprints held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The established block schema, or `None` while empty.
    pub fn schema(&self) -> Option<&BlockSchema> {
        self.schema.as_ref()
    }

    /// NaN-aware value identity over identifiers, order, and every feature
    /// value; see [`Fingerprint::value_eq`].
    pub fn value_eq(&self, other: &FingerprintCollection) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .values()
                .zip(other.entries.values())
                .all(|(a, b)| a.value_eq(b))
    }

    /// Serialize the collection to `path` as a versioned JSON document.
    ///
    /// The document is written to a temporary file in the destination
    /// directory and renamed into place, so a failed save never leaves a
    /// partial file at `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let path = path.as_ref();
        let document = Document {
            format_version: FORMAT_VERSION,
            fingerprints: self
                .entries
                .iter()
                .map(|(id, fingerprint)| (id.clone(), RecordDocument::from(fingerprint)))
                .collect(),
        };

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staged = NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut staged, &document)?;
        staged.flush()?;
        staged.persist(path).map_err(|err| err.error)?;
        Ok(())
    }

    /// Reconstruct a collection from a document written by [`Self::save`].
    ///
    /// Fails without returning a partial collection if the document is
    /// malformed, written by another format revision, or internally
    /// inconsistent (block shapes that disagree across records or values
    /// that do not fill their declared shape).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let text = fs::read_to_string(path)?;
        let document: Document = serde_json::from_str(&text)?;
        if document.format_version != FORMAT_VERSION {
            return Err(PersistError::UnsupportedVersion {
                found: document.format_version,
                expected: FORMAT_VERSION,
            });
        }

        let mut collection = Self::new();
        for (id, record) in document.fingerprints {
            let mut fingerprint = Fingerprint::new(id.clone());
            for (name, block) in record.blocks {
                let (rows, cols) = block.shape;
                let values = block
                    .values
                    .into_iter()
                    .map(|value| value.unwrap_or(f64::NAN))
                    .collect();
                let block = FeatureBlock::from_flat(rows, cols, values).map_err(|source| {
                    PersistError::Block {
                        id: id.clone(),
                        block: name.clone(),
                        source,
                    }
                })?;
                fingerprint = fingerprint.with_block(name, block);
            }
            collection.insert(fingerprint)?;
        }
        Ok(collection)
    }
}

/// On-disk shape of the whole store.
#[derive(Serialize, Deserialize)]
struct Document {
    format_version: u32,
    fingerprints: IndexMap<StructureId, RecordDocument>,
}

/// On-disk shape of one fingerprint.
#[derive(Serialize, Deserialize)]
struct RecordDocument {
    blocks: IndexMap<String, BlockDocument>,
}

/// On-disk shape of one feature block. `None` is the missing-value
/// sentinel (`NaN` in memory).
#[derive(Serialize, Deserialize)]
struct BlockDocument {
    shape: (usize, usize),
    values: Vec<Option<f64>>,
}

impl From<&Fingerprint> for RecordDocument {
    fn from(fingerprint: &Fingerprint) -> Self {
        Self {
            blocks: fingerprint
                .blocks()
                .map(|(name, block)| {
                    (
                        name.to_owned(),
                        BlockDocument {
                            shape: block.shape(),
                            values: block
                                .values()
                                .iter()
                                .map(|v| if v.is_nan() { None } else { Some(*v) })
                                .collect(),
                        },
                    )
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint(id: u32, values: Vec<f64>) -> Fingerprint {
        let cols = values.len();
        Fingerprint::new(id)
            .with_block("features", FeatureBlock::from_flat(1, cols, values).unwrap())
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut collection = FingerprintCollection::new();
        for id in [109u32, 42, 7] {
            collection.insert(fingerprint(id, vec![1.0, 2.0])).unwrap();
        }
        let ids: Vec<&str> = collection.ids().map(StructureId::as_str).collect();
        assert_eq!(ids, ["109", "42", "7"]);
    }

    #[test]
    fn reinsert_replaces_value_but_keeps_position() {
        let mut collection = FingerprintCollection::new();
        collection.insert(fingerprint(1, vec![1.0, 1.0])).unwrap();
        collection.insert(fingerprint(2, vec![2.0, 2.0])).unwrap();
        collection.insert(fingerprint(1, vec![9.0, 9.0])).unwrap();
        let ids: Vec<&str> = collection.ids().map(StructureId::as_str).collect();
        assert_eq!(ids, ["1", "2"]);
        assert_eq!(
            collection.get(&1u32.into()).unwrap().flattened(),
            vec![9.0, 9.0]
        );
    }

    #[test]
    fn schema_mismatch_rejected_on_insert() {
        let mut collection = FingerprintCollection::new();
        collection.insert(fingerprint(1, vec![1.0, 2.0])).unwrap();
        let err = collection
            .insert(fingerprint(2, vec![1.0, 2.0, 3.0]))
            .unwrap_err();
        assert_eq!(err.id, StructureId::from(2u32));
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn save_load_round_trip_is_value_identical() {
        let mut collection = FingerprintCollection::new();
        // Precision-hostile values: the text encoding must recover each
        // one bit for bit.
        let hostile = vec![
            0.1 + 0.2,
            1e-300,
            f64::MIN_POSITIVE,
            5e-324, // smallest subnormal
            -2.25,
            f64::NAN,
        ];
        collection.insert(fingerprint(109, hostile)).unwrap();
        collection
            .insert(fingerprint(
                110,
                vec![1.5, f64::NAN, -2.25, 0.0, -0.0, 3.141592653589793],
            ))
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fingerprints.json");
        collection.save(&path).unwrap();
        let reloaded = FingerprintCollection::load(&path).unwrap();

        assert!(collection.value_eq(&reloaded));
        let ids: Vec<&str> = reloaded.ids().map(StructureId::as_str).collect();
        assert_eq!(ids, ["109", "110"]);
    }

    #[test]
    fn nan_round_trips_as_explicit_null_marker() {
        let mut collection = FingerprintCollection::new();
        collection
            .insert(fingerprint(1, vec![1.5, f64::NAN, -2.25]))
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        collection.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("null"));

        let reloaded = FingerprintCollection::load(&path).unwrap();
        let values = reloaded.get(&1u32.into()).unwrap().flattened();
        assert_eq!(values[0], 1.5);
        assert!(values[1].is_nan());
        assert_eq!(values[2], -2.25);
    }

    #[test]
    fn load_rejects_malformed_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ this is not json").unwrap();
        assert!(matches!(
            FingerprintCollection::load(&path),
            Err(PersistError::Format(_))
        ));
    }

    #[test]
    fn load_rejects_unknown_format_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.json");
        fs::write(&path, r#"{"format_version": 99, "fingerprints": {}}"#).unwrap();
        assert!(matches!(
            FingerprintCollection::load(&path),
            Err(PersistError::UnsupportedVersion {
                found: 99,
                expected: FORMAT_VERSION
            })
        ));
    }

    #[test]
    fn load_rejects_inconsistent_block_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inconsistent.json");
        fs::write(
            &path,
            r#"{
                "format_version": 1,
                "fingerprints": {
                    "109": {"blocks": {"features": {"shape": [1, 2], "values": [1.0, 2.0]}}},
                    "110": {"blocks": {"features": {"shape": [1, 3], "values": [1.0, 2.0, 3.0]}}}
                }
            }"#,
        )
        .unwrap();
        assert!(matches!(
            FingerprintCollection::load(&path),
            Err(PersistError::Schema(_))
        ));
    }

    #[test]
    fn load_rejects_values_that_do_not_fill_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.json");
        fs::write(
            &path,
            r#"{
                "format_version": 1,
                "fingerprints": {
                    "109": {"blocks": {"features": {"shape": [2, 2], "values": [1.0]}}}
                }
            }"#,
        )
        .unwrap();
        assert!(matches!(
            FingerprintCollection::load(&path),
            Err(PersistError::Block { .. })
        ));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        assert!(matches!(
            FingerprintCollection::load("/nonexistent/store.json"),
            Err(PersistError::Io(_))
        ));
    }

    #[test]
    fn save_to_missing_directory_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("store.json");
        let mut collection = FingerprintCollection::new();
        collection.insert(fingerprint(1, vec![1.0])).unwrap();
        assert!(matches!(collection.save(&path), Err(PersistError::Io(_))));
        assert!(!path.exists());
    }

    #[test]
    fn empty_collection_round_trips() {
        let collection = FingerprintCollection::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        collection.save(&path).unwrap();
        let reloaded = FingerprintCollection::load(&path).unwrap();
        assert!(reloaded.is_empty());
        assert!(reloaded.schema().is_none());
    }
}
