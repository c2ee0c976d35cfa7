use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ndarray::{Array1, Array2, Array3, Axis};
use unicode_normalization::UnicodeNormalization;

use super::model::SupertonicError;

/// Token id emitted for codepoints outside the index table.
pub const UNKNOWN_TOKEN: i64 = -1;

/// Codepoint → token id lookup table (`unicode_indexer.json`).
///
/// The table is indexed by Unicode scalar value. Codepoints past the end of
/// the table map to [`UNKNOWN_TOKEN`].
#[derive(Debug, Clone)]
pub struct UnicodeIndexer {
    table: Vec<i64>,
}

/// Token ids for one chunk with its attention mask, batch size 1.
#[derive(Debug, Clone)]
pub struct TokenSequence {
    /// Shape `(1, len)`.
    pub ids: Array2<i64>,
    /// Shape `(1, 1, len)`, all ones.
    pub mask: Array3<f32>,
}

impl TokenSequence {
    pub fn len(&self) -> usize {
        self.ids.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UnicodeIndexer {
    pub fn new(table: Vec<i64>) -> Self {
        Self { table }
    }

    /// Load the index table from a JSON array of integers.
    pub fn load(path: &Path) -> Result<Self, SupertonicError> {
        let file = File::open(path)?;
        let table: Vec<i64> = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| SupertonicError::Config(format!("{}: {e}", path.display())))?;
        log::debug!("Loaded unicode indexer with {} entries", table.len());
        Ok(Self { table })
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn lookup(&self, ch: char) -> i64 {
        self.table
            .get(ch as usize)
            .copied()
            .unwrap_or(UNKNOWN_TOKEN)
    }

    /// NFKC-normalize `text` and map every codepoint to its token id.
    ///
    /// The sequence length is the codepoint count of the normalized text,
    /// which may differ from the input's.
    pub fn tokenize(&self, text: &str) -> TokenSequence {
        let ids: Vec<i64> = text.nfkc().map(|ch| self.lookup(ch)).collect();
        let len = ids.len();
        TokenSequence {
            ids: Array1::from_vec(ids).insert_axis(Axis(0)),
            mask: Array3::ones((1, 1, len)),
        }
    }
}
