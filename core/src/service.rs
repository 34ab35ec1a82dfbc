use crate::corpus::{CorpusRecord, CorpusSource};
use crate::error::Result;
use crate::index::{FitOptions, Index};
use crate::matcher::{rank, rank_signed};
use crate::persist::{load_index, save_index, IndexPaths};
use crate::prompt::{build_prompt, ContextItem, Prompt};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Owns the active index for a process.
///
/// Built once by the entry point (from a persisted model or a fresh fit) and
/// handed to request handlers by reference. Queries take an `Arc` snapshot and
/// never hold the lock while scoring; a refresh fits a new index off to the
/// side and swaps the pointer, so in-flight queries finish on the old one.
pub struct RetrievalService {
    active: RwLock<Arc<Index>>,
    refresh_lock: Mutex<()>,
}

/// A ranked record together with its stored fields.
#[derive(Debug, Clone)]
pub struct Hit {
    pub record: CorpusRecord,
    pub score: f32,
}

impl RetrievalService {
    pub fn new(index: Index) -> Self {
        Self { active: RwLock::new(Arc::new(index)), refresh_lock: Mutex::new(()) }
    }

    /// Load the persisted model under `paths`. Fails rather than starting empty.
    pub fn load(paths: &IndexPaths) -> Result<Self> {
        Ok(Self::new(load_index(paths)?))
    }

    pub fn snapshot(&self) -> Arc<Index> {
        self.active.read().clone()
    }

    /// Rank and resolve each match to its record, all against one snapshot.
    /// `k` comes straight from callers such as request parameters, so it is
    /// signed; `k <= 0` is rejected with `InvalidK`.
    pub fn search(&self, query: &str, k: i64) -> Result<Vec<Hit>> {
        let index = self.snapshot();
        let matches = rank_signed(&index, query, k)?;
        Ok(matches
            .into_iter()
            .map(|m| Hit { record: index.records()[m.position].clone(), score: m.score })
            .collect())
    }

    /// Rank `question` and assemble the completion prompt from the top `k`.
    pub fn prompt(&self, question: &str, k: usize, budget: usize) -> Result<Prompt> {
        let index = self.snapshot();
        let matches = rank(&index, question, k)?;
        let items: Vec<ContextItem<'_>> = matches
            .iter()
            .map(|m| ContextItem {
                id: m.id.as_str(),
                text: index.records()[m.position].description.as_str(),
                score: m.score,
            })
            .collect();
        Ok(build_prompt(question, &items, budget))
    }

    /// Re-fit from `source` with the active index's options, optionally
    /// persist, then swap. On any failure the active index is untouched.
    pub fn refresh(&self, source: &dyn CorpusSource, persist_to: Option<&IndexPaths>) -> Result<Arc<Index>> {
        let _guard = self.refresh_lock.lock();
        let options = FitOptions { tf_mode: self.snapshot().tf_mode() };
        let records = source.fetch_all()?;
        let index = Index::fit(records, options)?;
        if let Some(paths) = persist_to {
            save_index(paths, &index)?;
        }
        let index = Arc::new(index);
        *self.active.write() = index.clone();
        tracing::info!(records = index.len(), dimension = index.dimension(), "active index replaced");
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RetrievalError;

    fn service() -> RetrievalService {
        let records = vec![CorpusRecord::new("1", "contract law basics"), CorpusRecord::new("2", "cell biology intro")];
        RetrievalService::new(Index::fit(records, FitOptions::default()).unwrap())
    }

    #[test]
    fn refresh_swaps_without_touching_snapshots() {
        let svc = service();
        let before = svc.snapshot();
        let source = vec![CorpusRecord::new("9", "organic chemistry lab")];
        svc.refresh(&source, None).unwrap();
        assert_eq!(before.len(), 2);
        assert_eq!(rank(&before, "law", 1).unwrap()[0].id, "1");
        assert_eq!(svc.search("chemistry", 1).unwrap()[0].record.id, "9");
    }

    #[test]
    fn failed_refresh_keeps_active_index() {
        let svc = service();
        let empty: Vec<CorpusRecord> = vec![];
        assert!(matches!(svc.refresh(&empty, None), Err(RetrievalError::EmptyCorpus)));
        assert_eq!(svc.snapshot().len(), 2);
    }

    #[test]
    fn prompt_uses_ranked_records() {
        let p = service().prompt("law contract", 2, 100).unwrap();
        assert_eq!(p.sources, vec!["1"]);
        assert!(p.text.contains("contract law basics"));
    }

    #[test]
    fn search_resolves_records() {
        let hits = service().search("cell", 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.description, "cell biology intro");
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn search_rejects_non_positive_k() {
        let svc = service();
        assert!(matches!(svc.search("cell", 0), Err(RetrievalError::InvalidK(0))));
        assert!(matches!(svc.search("cell", -4), Err(RetrievalError::InvalidK(-4))));
    }
}
