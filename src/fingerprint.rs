//! Fingerprint value object and its feature blocks.
//!
//! A [`Fingerprint`] is the immutable result of encoding one structural
//! record: an identifier plus one or more named, fixed-shape blocks of
//! floating-point features. Individual features that could not be computed
//! for an otherwise successful record carry the `NaN` missing-value
//! sentinel; they are preserved through persistence, never coerced to zero
//! or dropped.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ShapeError;

/// Opaque key naming one structural record.
///
/// Backing stores commonly key records by a numeric id, so the numeric
/// `From` impls exist for ergonomics; internally the key is an opaque
/// string and serializes as one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructureId(String);

impl StructureId {
    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StructureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StructureId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for StructureId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u32> for StructureId {
    fn from(value: u32) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for StructureId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// One named block's worth of features: a fixed-shape, row-major 2-D array
/// of `f64` values where `NaN` marks an uncomputable feature.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBlock {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl FeatureBlock {
    /// Build a block from per-row feature vectors. Every row must have the
    /// same length as the first; ragged input is rejected.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, ShapeError> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        let mut values = Vec::with_capacity(rows.len() * cols);
        for (index, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(ShapeError::Ragged {
                    row: index,
                    expected: cols,
                    found: row.len(),
                });
            }
            values.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            values,
        })
    }

    /// Build a block from an already-flattened, row-major value vector.
    pub fn from_flat(rows: usize, cols: usize, values: Vec<f64>) -> Result<Self, ShapeError> {
        if values.len() != rows * cols {
            return Err(ShapeError::Count {
                rows,
                cols,
                found: values.len(),
            });
        }
        Ok(Self { rows, cols, values })
    }

    /// `(rows, cols)` of this block.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Flattened, row-major view of all values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// One row, or `None` past the end.
    pub fn row(&self, index: usize) -> Option<&[f64]> {
        if index < self.rows {
            Some(&self.values[index * self.cols..(index + 1) * self.cols])
        } else {
            None
        }
    }

    /// Iterate over rows in order. A zero-width block yields no rows.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.values.chunks_exact(self.cols.max(1))
    }

    /// Summarize each column's distribution as its first three moments:
    /// mean, population standard deviation (divisor N), and the cube root
    /// of the third central moment. `NaN` entries are omitted per column;
    /// a column with no finite entries yields `NaN` moments.
    ///
    /// The result is a `3 x cols` block (one row per moment).
    pub fn column_moments(&self) -> FeatureBlock {
        let mut values = vec![f64::NAN; 3 * self.cols];
        for col in 0..self.cols {
            let finite: Vec<f64> = (0..self.rows)
                .map(|row| self.values[row * self.cols + col])
                .filter(|v| !v.is_nan())
                .collect();
            if finite.is_empty() {
                continue;
            }
            let n = finite.len() as f64;
            let mean = finite.iter().sum::<f64>() / n;
            let variance = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let third = finite.iter().map(|v| (v - mean).powi(3)).sum::<f64>() / n;
            values[col] = mean;
            values[self.cols + col] = variance.sqrt();
            values[2 * self.cols + col] = third.cbrt();
        }
        FeatureBlock {
            rows: 3,
            cols: self.cols,
            values,
        }
    }

    /// Value identity that treats two `NaN` sentinels as equal, unlike
    /// `PartialEq`. This is the comparison the persistence round-trip
    /// contract is stated in.
    pub fn value_eq(&self, other: &FeatureBlock) -> bool {
        self.rows == other.rows
            && self.cols == other.cols
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| a == b || (a.is_nan() && b.is_nan()))
    }
}

/// Ordered block layout of a fingerprint: each block's name and shape.
///
/// Every fingerprint in a collection carries the identical schema, which is
/// what makes columnar comparison across records possible downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSchema(Vec<(String, (usize, usize))>);

impl BlockSchema {
    /// Iterate over `(name, (rows, cols))` entries in block order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, (usize, usize))> {
        self.0.iter().map(|(name, shape)| (name.as_str(), *shape))
    }

    /// Number of blocks in the schema.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the schema has no blocks.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for BlockSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (name, (rows, cols))) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}[{rows}x{cols}]")?;
        }
        Ok(())
    }
}

/// Numeric fingerprint computed for one structural record.
///
/// Immutable once built: construction goes through the consuming
/// [`Fingerprint::with_block`] builder, and no mutating accessors exist.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    id: StructureId,
    blocks: IndexMap<String, FeatureBlock>,
}

impl Fingerprint {
    /// Start a fingerprint for the given record with no blocks yet.
    pub fn new(id: impl Into<StructureId>) -> Self {
        Self {
            id: id.into(),
            blocks: IndexMap::new(),
        }
    }

    /// Attach a named feature block. Re-using a name replaces that block.
    pub fn with_block(mut self, name: impl Into<String>, block: FeatureBlock) -> Self {
        self.blocks.insert(name.into(), block);
        self
    }

    /// Identifier of the record this fingerprint was computed for.
    pub fn id(&self) -> &StructureId {
        &self.id
    }

    /// Look up one block by name.
    pub fn block(&self, name: &str) -> Option<&FeatureBlock> {
        self.blocks.get(name)
    }

    /// Structured view: named blocks in insertion order.
    pub fn blocks(&self) -> impl Iterator<Item = (&str, &FeatureBlock)> {
        self.blocks.iter().map(|(name, block)| (name.as_str(), block))
    }

    /// Flattened view: every block's values concatenated in block order.
    pub fn flattened(&self) -> Vec<f64> {
        self.blocks
            .values()
            .flat_map(|block| block.values().iter().copied())
            .collect()
    }

    /// The block layout of this fingerprint.
    pub fn schema(&self) -> BlockSchema {
        BlockSchema(
            self.blocks
                .iter()
                .map(|(name, block)| (name.clone(), block.shape()))
                .collect(),
        )
    }

    /// NaN-aware value identity; see [`FeatureBlock::value_eq`].
    pub fn value_eq(&self, other: &Fingerprint) -> bool {
        self.id == other.id
            && self.blocks.len() == other.blocks.len()
            && self
                .blocks
                .iter()
                .zip(&other.blocks)
                .all(|((na, ba), (nb, bb))| na == nb && ba.value_eq(bb))
    }
}
