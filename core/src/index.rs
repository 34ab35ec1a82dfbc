use crate::corpus::CorpusRecord;
use crate::error::{Result, RetrievalError};
use crate::tokenizer::tokenize;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

pub type TermId = u32;

/// How raw term counts become term frequencies. Applied identically to
/// records at fit time and to queries at rank time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TfMode {
    /// tf = count
    #[default]
    Raw,
    /// tf = 1 + ln(count)
    Sublinear,
}

impl TfMode {
    pub fn apply(self, count: u32) -> f32 {
        match self {
            TfMode::Raw => count as f32,
            TfMode::Sublinear if count > 0 => 1.0 + (count as f32).ln(),
            TfMode::Sublinear => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FitOptions {
    pub tf_mode: TfMode,
}

/// Term to column mapping. Columns follow sorted term order.
#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    terms: Vec<String>,
    lookup: HashMap<String, TermId>,
}

impl Vocabulary {
    pub(crate) fn from_terms(terms: Vec<String>) -> Result<Self> {
        let mut lookup = HashMap::with_capacity(terms.len());
        for (col, term) in terms.iter().enumerate() {
            if lookup.insert(term.clone(), col as TermId).is_some() {
                return Err(RetrievalError::CorruptIndex(format!("duplicate vocabulary term {term:?}")));
            }
        }
        Ok(Self { terms, lookup })
    }

    pub fn get(&self, term: &str) -> Option<TermId> {
        self.lookup.get(term).copied()
    }

    /// Terms in column order.
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Smoothed inverse document frequency: ln((1 + N) / (1 + df)) + 1.
pub fn smoothed_idf(num_records: usize, df: u32) -> f32 {
    ((1.0 + num_records as f32) / (1.0 + df as f32)).ln() + 1.0
}

/// Divide by the Euclidean norm in place. An all-zero vector is left as is.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 { return; }
    for x in v.iter_mut() { *x /= norm; }
}

/// A fitted model. Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    vocabulary: Vocabulary,
    weights: Vec<f32>,
    tf_mode: TfMode,
    records: Vec<CorpusRecord>,
    /// Row-major, `records.len() * vocabulary.len()`.
    vectors: Vec<f32>,
    positions: HashMap<String, usize>,
}

impl Index {
    /// Build vocabulary, weights and record vectors in one pass.
    pub fn fit(records: Vec<CorpusRecord>, options: FitOptions) -> Result<Index> {
        if records.is_empty() {
            return Err(RetrievalError::EmptyCorpus);
        }
        let mut seen: HashSet<&str> = HashSet::with_capacity(records.len());
        for r in &records {
            if !seen.insert(r.id.as_str()) {
                return Err(RetrievalError::DuplicateRecordId(r.id.clone()));
            }
        }

        let counts: Vec<BTreeMap<String, u32>> = records
            .iter()
            .map(|r| {
                let mut tf: BTreeMap<String, u32> = BTreeMap::new();
                for term in tokenize(&r.description) {
                    *tf.entry(term).or_insert(0) += 1;
                }
                tf
            })
            .collect();

        let mut df: BTreeMap<&str, u32> = BTreeMap::new();
        for tf in &counts {
            for term in tf.keys() {
                *df.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        let n = records.len();
        let weights: Vec<f32> = df.values().map(|&d| smoothed_idf(n, d)).collect();
        let vocabulary = Vocabulary::from_terms(df.keys().map(|t| t.to_string()).collect())?;
        let dim = vocabulary.len();

        let mut vectors = vec![0.0f32; n * dim];
        for (row, tf) in vectors.chunks_mut(dim.max(1)).zip(counts.iter()) {
            for (term, &count) in tf {
                if let Some(col) = vocabulary.get(term) {
                    let col = col as usize;
                    row[col] = options.tf_mode.apply(count) * weights[col];
                }
            }
            l2_normalize(row);
        }

        let empty = counts.iter().filter(|tf| tf.is_empty()).count();
        if empty > 0 {
            tracing::warn!(empty, "records without any terms can never match a query");
        }
        tracing::info!(records = n, dimension = dim, tf_mode = ?options.tf_mode, "index fit complete");
        Index::from_parts(vocabulary, weights, options.tf_mode, records, vectors)
    }

    /// Assemble an index from already computed parts, checking shapes.
    pub(crate) fn from_parts(
        vocabulary: Vocabulary,
        weights: Vec<f32>,
        tf_mode: TfMode,
        records: Vec<CorpusRecord>,
        vectors: Vec<f32>,
    ) -> Result<Index> {
        let dim = vocabulary.len();
        if weights.len() != dim {
            return Err(RetrievalError::CorruptIndex(format!(
                "{} term weights for a vocabulary of {dim}",
                weights.len()
            )));
        }
        if vectors.len() != records.len() * dim {
            return Err(RetrievalError::CorruptIndex(format!(
                "vector buffer holds {} values, expected {} records x {dim}",
                vectors.len(),
                records.len()
            )));
        }
        let mut positions = HashMap::with_capacity(records.len());
        for (i, r) in records.iter().enumerate() {
            if positions.insert(r.id.clone(), i).is_some() {
                return Err(RetrievalError::CorruptIndex(format!("duplicate record id {:?}", r.id)));
            }
        }
        Ok(Index { vocabulary, weights, tf_mode, records, vectors, positions })
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Term weights indexed by column.
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn tf_mode(&self) -> TfMode {
        self.tf_mode
    }

    pub fn dimension(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in corpus insertion order.
    pub fn records(&self) -> &[CorpusRecord] {
        &self.records
    }

    pub fn record(&self, id: &str) -> Option<&CorpusRecord> {
        self.positions.get(id).map(|&i| &self.records[i])
    }

    /// The unit-length vector of the record at `position`.
    pub fn vector(&self, position: usize) -> &[f32] {
        let dim = self.dimension();
        &self.vectors[position * dim..(position + 1) * dim]
    }

    /// (record id, vector) pairs in corpus order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[f32])> + '_ {
        (0..self.records.len()).map(move |i| (self.records[i].id.as_str(), self.vector(i)))
    }

    pub(crate) fn raw_vectors(&self) -> &[f32] {
        &self.vectors
    }
}
