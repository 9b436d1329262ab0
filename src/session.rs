//! Fetch capability: resolving an identifier to raw structural input.
//!
//! The batch orchestrator only ever sees the [`FetchSession`] trait, so a
//! local file store and a pre-resolved in-memory store (or a remote
//! backend supplied by the caller) are interchangeable. A session must be
//! safe to share read-only across workers; both backends here are, since
//! neither holds mutable connection state.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use crate::error::SessionError;
use crate::fingerprint::StructureId;

/// Capability to resolve one identifier to its raw structural input.
///
/// Implementations may fail per identifier (missing record, I/O problem)
/// without affecting any other identifier in the same batch.
pub trait FetchSession {
    /// Raw structural input handed to the encoder.
    type Structure;

    /// Resolve `id` to its structural input.
    fn fetch(&self, id: &StructureId) -> Result<Self::Structure, SessionError>;
}

/// Local backing store: one file per record under a root directory,
/// named `<id>.<extension>`. Fetch returns the raw file bytes.
#[derive(Debug, Clone)]
pub struct DirectorySession {
    root: PathBuf,
    extension: String,
}

impl DirectorySession {
    /// Session over `root`, resolving ids to `<root>/<id>.<extension>`.
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    /// Path the given identifier resolves to.
    pub fn path_for(&self, id: &StructureId) -> PathBuf {
        self.root.join(format!("{id}.{}", self.extension))
    }
}

impl FetchSession for DirectorySession {
    type Structure = Vec<u8>;

    fn fetch(&self, id: &StructureId) -> Result<Vec<u8>, SessionError> {
        match fs::read(self.path_for(id)) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(SessionError::NotFound { id: id.clone() })
            }
            Err(err) => Err(SessionError::Io(err)),
        }
    }
}

/// Pre-resolved backing store: structures held in memory, cloned on fetch.
///
/// Useful for tests and for callers that already resolved their inputs
/// through some other channel.
#[derive(Debug, Clone, Default)]
pub struct InMemorySession<T> {
    structures: HashMap<StructureId, T>,
}

impl<T> InMemorySession<T> {
    /// Empty session.
    pub fn new() -> Self {
        Self {
            structures: HashMap::new(),
        }
    }

    /// Register a structure under `id`, replacing any previous one.
    pub fn insert(&mut self, id: impl Into<StructureId>, structure: T) {
        self.structures.insert(id.into(), structure);
    }

    /// Number of registered structures.
    pub fn len(&self) -> usize {
        self.structures.len()
    }

    /// Whether the session holds no structures.
    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
    }
}

impl<T, I: Into<StructureId>> FromIterator<(I, T)> for InMemorySession<T> {
    fn from_iter<It: IntoIterator<Item = (I, T)>>(iter: It) -> Self {
        Self {
            structures: iter
                .into_iter()
                .map(|(id, structure)| (id.into(), structure))
                .collect(),
        }
    }
}

impl<T: Clone> FetchSession for InMemorySession<T> {
    type Structure = T;

    fn fetch(&self, id: &StructureId) -> Result<T, SessionError> {
        self.structures
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound { id: id.clone() })
    }
}
