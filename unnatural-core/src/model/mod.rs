//! Statistical model of token sequences.
//!
//! This module provides:
//! - The token vocabulary (`Vocabulary`, `TokenId`)
//! - Fixed-order n-gram counts (`NGramModel`) and their per-context `State`
//! - The multi-order store with its backoff estimator (`MultiGramModel`)
//! - Prediction of continuations and cross-entropy scoring

/// Bidirectional surface <-> id mapping, grown by training.
pub mod vocabulary;

/// Internal representation of a single n-gram context.
///
/// Tracks follower counts; not exposed publicly.
mod state;

/// Counts of a single n-gram order.
pub mod ngram_model;

/// All orders `1..=K` plus the interpolated backoff estimator.
pub mod multigram_model;

/// Ranked continuation candidates for a prefix.
pub mod predictor;

/// Cross-entropy of a sequence under the model.
pub mod scorer;
