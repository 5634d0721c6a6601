//! Language-model engine behind code-completion services.
//!
//! This crate provides a trainable n-gram model of source-code tokens:
//! - Tokenization of source text into a canonical token stream
//! - An incremental n-gram store with a total backoff estimator
//! - Ranked prediction of continuations and cross-entropy scoring
//! - Named corpora with lazy loading, synchronous persistence and
//!   soft deletion to a backup artifact
//!
//! The `CorpusManager` is the single entry point: every request names a
//! corpus and goes through it.

/// Errors surfaced to the boundary layer.
pub mod error;

/// Source text to token sequence.
pub mod tokenizer;

/// Vocabulary, n-gram store, predictor and scorer.
pub mod model;

/// Named corpora: aggregate, persistence and manager.
pub mod corpus;

/// I/O utilities (artifact paths, file listing).
///
/// Not exposed
pub(crate) mod io;

/// Chunked worker threads for batch training.
pub(crate) mod parallel;

pub use corpus::manager::{CorpusHandle, CorpusManager, ManagerConfig, Summary};
pub use corpus::Corpus;
pub use error::{Error, PersistenceError, Result};
pub use model::predictor::PredictionCandidate;
pub use tokenizer::{tokenize, Token, TokenKind, TokenSequence, TokenizeError};
