pub mod corpus;
pub mod error;
pub mod index;
pub mod matcher;
pub mod persist;
pub mod prompt;
pub mod service;
pub mod tokenizer;

pub use corpus::{CorpusRecord, CorpusSource, JsonCorpusSource};
pub use error::{Result, RetrievalError};
pub use index::{FitOptions, Index, TermId, TfMode, Vocabulary};
pub use matcher::{rank, rank_signed, Match, QueryVector};
pub use persist::{load, persist};
pub use service::{Hit, RetrievalService};
