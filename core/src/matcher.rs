use crate::error::{Result, RetrievalError};
use crate::index::{Index, TermId};
use crate::tokenizer::tokenize;
use serde::Serialize;
use std::collections::BTreeMap;

/// One ranked record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub id: String,
    pub score: f32,
    /// Position of the record in corpus order.
    pub position: usize,
}

/// Sparse unit-length query vector, keyed by column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryVector {
    weights: BTreeMap<TermId, f32>,
}

impl QueryVector {
    /// Project `text` into the index space. Terms outside the vocabulary are
    /// dropped; if none remain the vector is empty and scores every record 0.
    pub fn build(index: &Index, text: &str) -> Self {
        let mut counts: BTreeMap<TermId, u32> = BTreeMap::new();
        for term in tokenize(text) {
            if let Some(col) = index.vocabulary().get(&term) {
                *counts.entry(col).or_insert(0) += 1;
            }
        }
        let mut weights: BTreeMap<TermId, f32> = counts
            .into_iter()
            .map(|(col, count)| (col, index.tf_mode().apply(count) * index.weights()[col as usize]))
            .collect();
        let norm = weights.values().map(|w| w * w).sum::<f32>().sqrt();
        if norm > 0.0 {
            for w in weights.values_mut() { *w /= norm; }
        }
        Self { weights }
    }

    pub fn is_zero(&self) -> bool {
        self.weights.values().all(|&w| w == 0.0)
    }

    /// Cosine similarity with a unit-length dense record vector.
    pub fn dot(&self, record: &[f32]) -> f32 {
        // f32's Sum starts at -0.0; scores must stay in [0, 1]
        self.weights.iter().fold(0.0, |acc, (&col, &w)| acc + w * record[col as usize])
    }
}

/// Rank every record against `query` and keep the best `k`.
///
/// Ties keep corpus order. A query sharing no term with the vocabulary is not
/// an error: it yields `min(k, len)` records all scored 0.0.
pub fn rank(index: &Index, query: &str, k: usize) -> Result<Vec<Match>> {
    if k == 0 {
        return Err(RetrievalError::InvalidK(0));
    }
    let qv = QueryVector::build(index, query);
    let mut scored: Vec<Match> = index
        .entries()
        .enumerate()
        .map(|(position, (id, v))| Match { id: id.to_string(), score: qv.dot(v), position })
        .collect();
    // sort_by is stable, so equal scores stay in corpus order
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(k);
    tracing::debug!(k, zero_query = qv.is_zero(), top = ?scored.first().map(|m| m.score), "ranked query");
    Ok(scored)
}

/// `rank` for callers holding a signed `k`, such as request parameters.
pub fn rank_signed(index: &Index, query: &str, k: i64) -> Result<Vec<Match>> {
    let k = usize::try_from(k).ok().filter(|&k| k > 0).ok_or(RetrievalError::InvalidK(k))?;
    rank(index, query, k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::CorpusRecord;
    use crate::index::FitOptions;

    fn index() -> Index {
        Index::fit(
            vec![
                CorpusRecord::new("1", "contract law basics"),
                CorpusRecord::new("2", "cell biology intro"),
            ],
            FitOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn query_vector_drops_unknown_terms() {
        let idx = index();
        let qv = QueryVector::build(&idx, "quantum law");
        assert_eq!(qv.weights.len(), 1);
        assert!((qv.weights.values().next().unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn empty_query_is_zero() {
        let idx = index();
        assert!(QueryVector::build(&idx, "").is_zero());
        assert!(QueryVector::build(&idx, "?!").is_zero());
        let score = QueryVector::build(&idx, "astrophysics").dot(idx.vector(0));
        assert_eq!(score, 0.0);
        assert!(score.is_sign_positive());
    }

    #[test]
    fn negative_and_zero_k_are_rejected() {
        let idx = index();
        assert!(matches!(rank(&idx, "law", 0), Err(RetrievalError::InvalidK(0))));
        assert!(matches!(rank_signed(&idx, "law", -3), Err(RetrievalError::InvalidK(-3))));
        assert_eq!(rank_signed(&idx, "law", 1).unwrap().len(), 1);
    }
}
