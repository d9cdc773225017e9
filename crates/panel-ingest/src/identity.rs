//! Natural-key identity tables
//!
//! Every entity is deduplicated by its natural key and receives a surrogate
//! integer key on first sighting. Surrogate keys follow insertion order and
//! start at 1, so two builds over the same input assign the same keys.
//!
//! Tables are owned by a single build invocation and passed explicitly; no
//! memo survives between runs.

use crate::records::GeneRecord;
use panel_common::{PanelError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

/// Process-assigned integer key used for foreign-key links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurrogateKey(u64);

impl SurrogateKey {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    fn from_index(index: usize) -> Self {
        Self(index as u64 + 1)
    }

    fn index(self) -> Option<usize> {
        (self.0 as usize).checked_sub(1)
    }
}

impl fmt::Display for SurrogateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a natural key has already been assigned a surrogate key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sighting {
    Unseen,
    Seen(SurrogateKey),
}

// ============================================================================
// Keyed table
// ============================================================================

/// Arena of rows indexed by natural key
#[derive(Debug, Clone)]
pub struct KeyedTable<K, R> {
    keys: Vec<K>,
    rows: Vec<R>,
    index: HashMap<K, SurrogateKey>,
}

impl<K, R> Default for KeyedTable<K, R> {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<K, R> KeyedTable<K, R>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sighting(&self, key: &K) -> Sighting {
        match self.index.get(key) {
            Some(&pk) => Sighting::Seen(pk),
            None => Sighting::Unseen,
        }
    }

    /// Insert a row under a new natural key
    ///
    /// An already-seen key keeps its row and surrogate key; the new row is
    /// dropped.
    pub fn insert(&mut self, key: K, row: R) -> SurrogateKey {
        if let Some(&pk) = self.index.get(&key) {
            return pk;
        }
        let pk = SurrogateKey::from_index(self.rows.len());
        self.index.insert(key.clone(), pk);
        self.keys.push(key);
        self.rows.push(row);
        pk
    }

    /// Surrogate key for `key`, creating the row with `make` on first sighting
    pub fn intern_with(&mut self, key: K, make: impl FnOnce() -> R) -> SurrogateKey {
        match self.sighting(&key) {
            Sighting::Seen(pk) => pk,
            Sighting::Unseen => self.insert(key, make()),
        }
    }

    pub fn surrogate(&self, key: &K) -> Option<SurrogateKey> {
        self.index.get(key).copied()
    }

    pub fn get(&self, key: &K) -> Option<&R> {
        self.surrogate(key).and_then(|pk| self.row(pk))
    }

    pub fn row(&self, pk: SurrogateKey) -> Option<&R> {
        pk.index().and_then(|i| self.rows.get(i))
    }

    pub fn row_mut(&mut self, pk: SurrogateKey) -> Option<&mut R> {
        pk.index().and_then(|i| self.rows.get_mut(i))
    }

    pub fn key_of(&self, pk: SurrogateKey) -> Option<&K> {
        pk.index().and_then(|i| self.keys.get(i))
    }

    /// Rows in surrogate-key order
    pub fn iter(&self) -> impl Iterator<Item = (SurrogateKey, &K, &R)> + '_ {
        self.keys
            .iter()
            .zip(&self.rows)
            .enumerate()
            .map(|(i, (key, row))| (SurrogateKey::from_index(i), key, row))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// Link table
// ============================================================================

/// Association rows with exact-duplicate suppression
#[derive(Debug, Clone)]
pub struct LinkTable<R> {
    rows: Vec<R>,
    seen: HashSet<R>,
}

impl<R> Default for LinkTable<R> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            seen: HashSet::new(),
        }
    }
}

impl<R> LinkTable<R>
where
    R: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a link; returns `None` when the identical link already exists
    pub fn push(&mut self, row: R) -> Option<SurrogateKey> {
        if !self.seen.insert(row.clone()) {
            return None;
        }
        self.rows.push(row);
        Some(SurrogateKey::from_index(self.rows.len() - 1))
    }

    pub fn contains(&self, row: &R) -> bool {
        self.seen.contains(row)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SurrogateKey, &R)> + '_ {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| (SurrogateKey::from_index(i), row))
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// Gene identity
// ============================================================================

/// Which gene field serves as the natural key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneKeyStrategy {
    #[default]
    HgncId,
    Symbol,
}

impl GeneKeyStrategy {
    /// Natural key of a gene record, `None` when the record lacks the field
    pub fn key(&self, gene: &GeneRecord) -> Option<String> {
        match self {
            GeneKeyStrategy::HgncId => gene.hgnc_id.clone().filter(|id| !id.is_empty()),
            GeneKeyStrategy::Symbol => Some(gene.symbol.clone()).filter(|s| !s.is_empty()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GeneKeyStrategy::HgncId => "hgnc_id",
            GeneKeyStrategy::Symbol => "symbol",
        }
    }
}

impl FromStr for GeneKeyStrategy {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "hgnc_id" | "hgnc" => Ok(GeneKeyStrategy::HgncId),
            "symbol" => Ok(GeneKeyStrategy::Symbol),
            other => Err(PanelError::Config(format!("Unknown gene key strategy: {}", other))),
        }
    }
}

impl fmt::Display for GeneKeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
