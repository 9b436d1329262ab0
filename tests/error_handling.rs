//! Error surface of the batch and persistence layers.
//!
//! Per-record problems must stay invisible here: only configuration,
//! format, schema, and I/O failures reach the caller.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fingerprints::{
    FeatureBlock, FetchSession, Fingerprint, FingerprintCollection, FingerprintGenerator,
    GenerateError, PersistError, SessionError, StructureId,
};

/// Session that counts fetches and can be told to fail everything.
struct CountingSession {
    calls: Arc<AtomicUsize>,
    fail_all: bool,
}

impl FetchSession for CountingSession {
    type Structure = Vec<f64>;

    fn fetch(&self, _id: &StructureId) -> Result<Vec<f64>, SessionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all {
            Err(SessionError::Backend("connection reset".into()))
        } else {
            Ok(vec![1.0, 2.0])
        }
    }
}

fn encode(id: &StructureId, values: &Vec<f64>) -> Option<Fingerprint> {
    let block = FeatureBlock::from_flat(1, values.len(), values.clone()).ok()?;
    Some(Fingerprint::new(id.clone()).with_block("features", block))
}

fn worklist(ids: &[u32]) -> Vec<StructureId> {
    ids.iter().map(|&id| StructureId::from(id)).collect()
}

#[test]
fn invalid_parallelism_rejected_before_any_fetch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let session = CountingSession {
        calls: Arc::clone(&calls),
        fail_all: false,
    };
    let generator = FingerprintGenerator::new(encode);

    let result = generator.generate(&worklist(&[109, 110, 118]), &session, 0);

    assert!(matches!(
        result,
        Err(GenerateError::InvalidParallelism { parallelism: 0 })
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0, "no fetch may have run");
}

#[test]
fn total_fetch_failure_is_an_empty_collection_not_an_error() {
    let session = CountingSession {
        calls: Arc::new(AtomicUsize::new(0)),
        fail_all: true,
    };
    let generator = FingerprintGenerator::new(encode);

    for degree in [1, 4] {
        let (collection, report) = generator
            .generate_with_report(&worklist(&[109, 110, 118]), &session, degree)
            .unwrap();
        assert!(collection.is_empty());
        assert_eq!(report.n_input, 3);
        assert_eq!(report.n_produced, 0);
    }
}

#[test]
fn load_never_returns_a_partial_collection() {
    // Second record's shape disagrees with the first; nothing of the
    // first may survive.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    std::fs::write(
        &path,
        r#"{
            "format_version": 1,
            "fingerprints": {
                "109": {"blocks": {"features": {"shape": [1, 2], "values": [1.0, null]}}},
                "110": {"blocks": {"other": {"shape": [1, 2], "values": [3.0, 4.0]}}}
            }
        }"#,
    )
    .unwrap();

    match FingerprintCollection::load(&path) {
        Err(PersistError::Schema(mismatch)) => {
            assert_eq!(mismatch.id, StructureId::from(110u32));
        }
        other => panic!("expected schema error, got {other:?}"),
    }
}

#[test]
fn load_surfaces_format_and_io_errors() {
    let dir = tempfile::tempdir().unwrap();

    let garbled = dir.path().join("garbled.json");
    std::fs::write(&garbled, "[1, 2, 3]").unwrap();
    assert!(matches!(
        FingerprintCollection::load(&garbled),
        Err(PersistError::Format(_))
    ));

    assert!(matches!(
        FingerprintCollection::load(dir.path().join("no-such-file.json")),
        Err(PersistError::Io(_))
    ));
}

#[test]
fn failed_save_leaves_destination_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");

    let mut collection = FingerprintCollection::new();
    collection
        .insert(
            Fingerprint::new(1u32)
                .with_block("features", FeatureBlock::from_flat(1, 1, vec![1.0]).unwrap()),
        )
        .unwrap();
    collection.save(&path).unwrap();
    let before = std::fs::read_to_string(&path).unwrap();

    // Saving elsewhere under a missing directory fails without touching
    // the existing document.
    let bad = dir.path().join("missing-dir").join("store.json");
    assert!(matches!(collection.save(&bad), Err(PersistError::Io(_))));
    assert!(!bad.exists());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
}
