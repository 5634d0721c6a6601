//! The named corpus: one independently trainable language model.
//!
//! A `Corpus` aggregates the vocabulary, the n-gram store, its order and the
//! number of training events. The `CorpusManager` owns every corpus and is
//! the only entry point that mutates one.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::multigram_model::MultiGramModel;
use crate::model::predictor::{self, PredictionCandidate};
use crate::model::scorer;
use crate::model::vocabulary::{TokenId, Vocabulary};
use crate::parallel::map_chunks;
use crate::tokenizer::{Token, TokenSequence};

/// Lifecycle and registry of named corpora.
pub mod manager;

/// Durable storage of a corpus (atomic save, load, backup).
pub mod persistence;

/// Vocabulary + n-gram store of one named model.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Corpus {
	vocabulary: Vocabulary,
	model: MultiGramModel,
	training_events: u64,
}

/// What a training call applied, so that it can be undone.
#[derive(Debug)]
pub(crate) struct Training {
	vocabulary_len: usize,
	sequences: Vec<Vec<TokenId>>,
}

impl Training {
	/// Number of tokens that were trained.
	pub(crate) fn tokens(&self) -> usize {
		self.sequences.iter().map(Vec::len).sum()
	}
}

impl Corpus {
	/// An empty corpus of the given model order.
	pub fn new(order: usize) -> Result<Self> {
		Ok(Self {
			vocabulary: Vocabulary::new(),
			model: MultiGramModel::new(order)?,
			training_events: 0,
		})
	}

	pub fn order(&self) -> usize {
		self.model.order()
	}

	pub fn vocabulary(&self) -> &Vocabulary {
		&self.vocabulary
	}

	pub fn model(&self) -> &MultiGramModel {
		&self.model
	}

	pub fn training_events(&self) -> u64 {
		self.training_events
	}

	/// Interns `tokens` and adds their n-grams. Counts are additive: training
	/// the same text twice doubles its counts.
	pub(crate) fn train(&mut self, tokens: &[Token]) -> Training {
		let vocabulary_len = self.vocabulary.len();
		let ids: Vec<TokenId> = tokens.iter().map(|t| self.vocabulary.intern(t.surface())).collect();
		self.model.update(&ids);
		self.training_events += 1;
		Training { vocabulary_len, sequences: vec![ids] }
	}

	/// Trains several sequences at once, counting n-grams in parallel.
	///
	/// Each non-empty sequence is one training event. Interning stays
	/// sequential so ids keep their first-seen order.
	///
	/// # Errors
	/// `Error::Merge` if the partial counts cannot be combined; the corpus
	/// is left as it was.
	pub(crate) fn train_many(&mut self, sequences: Vec<TokenSequence>) -> Result<Training> {
		let order = self.order();
		let vocabulary_len = self.vocabulary.len();
		let sequences: Vec<Vec<TokenId>> = sequences
			.iter()
			.filter(|tokens| !tokens.is_empty())
			.map(|tokens| tokens.iter().map(|t| self.vocabulary.intern(t.surface())).collect())
			.collect();

		let partials = map_chunks(sequences.clone(), move |chunk| -> Result<MultiGramModel> {
			let mut partial = MultiGramModel::new(order)?;
			for ids in &chunk {
				partial.update(ids);
			}
			Ok(partial)
		});

		let merged = merge_partials(order, partials).and_then(|batch| self.model.merge(&batch).map_err(Error::Merge));
		if let Err(e) = merged {
			for ids in sequences.iter().rev() {
				self.vocabulary.rollback(vocabulary_len, ids);
			}
			return Err(e);
		}

		self.training_events += sequences.len() as u64;
		Ok(Training { vocabulary_len, sequences })
	}

	/// Undoes a training whose persistence failed.
	pub(crate) fn rollback(&mut self, training: Training) {
		for ids in training.sequences.iter().rev() {
			self.model.retract(ids);
			self.vocabulary.rollback(training.vocabulary_len, ids);
		}
		self.training_events -= training.sequences.len() as u64;
	}

	/// Ranked continuations of `prefix`; empty if never trained.
	pub fn predict(&self, prefix: &[Token], limit: usize) -> Vec<PredictionCandidate> {
		predictor::predict(&self.vocabulary, &self.model, prefix, limit)
	}

	/// Bits per token of `sequence` under this corpus.
	pub fn cross_entropy(&self, sequence: &[Token]) -> Result<f64> {
		scorer::cross_entropy(&self.vocabulary, &self.model, sequence)
	}

	/// Restores derived indexes after decoding and checks the model shape.
	pub(crate) fn reindex(&mut self) -> std::result::Result<(), String> {
		self.model.validate()?;
		self.vocabulary.reindex();
		Ok(())
	}
}

/// Sums the per-chunk counts of a batch into one store.
fn merge_partials(order: usize, partials: Vec<Result<MultiGramModel>>) -> Result<MultiGramModel> {
	let mut batch = MultiGramModel::new(order)?;
	for partial in partials {
		batch.merge(&partial?).map_err(Error::Merge)?;
	}
	Ok(batch)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tokenizer::tokenize;

	fn tokens(surfaces: &[&str]) -> Vec<Token> {
		surfaces.iter().map(|s| Token::from_surface(s)).collect()
	}

	#[test]
	fn rollback_restores_counts_and_vocabulary() {
		let mut corpus = Corpus::new(3).unwrap();
		corpus.train(&tokens(&["a", "b"]));
		let model = corpus.model().clone();

		let training = corpus.train(&tokens(&["b", "c", "d"]));
		assert_eq!(training.tokens(), 3);
		corpus.rollback(training);

		assert_eq!(corpus.model(), &model);
		assert_eq!(corpus.vocabulary().len(), 2);
		assert_eq!(corpus.vocabulary().count(corpus.vocabulary().resolve("b")), 1);
		assert_eq!(corpus.training_events(), 1);
	}

	#[test]
	fn retraining_accumulates_counts() {
		let mut corpus = Corpus::new(3).unwrap();
		let text = tokens(&["x", "=", "1"]);
		let count = |corpus: &Corpus| {
			let x = corpus.vocabulary().resolve("x");
			corpus.model().count(&[TokenId::START, TokenId::START], x)
		};

		corpus.train(&text);
		assert_eq!(count(&corpus), 1);
		corpus.train(&text);
		assert_eq!(count(&corpus), 2);
		assert_eq!(corpus.model().total(&[]), 8);
		assert_eq!(corpus.vocabulary().len(), 3);
		assert_eq!(corpus.training_events(), 2);
	}

	#[test]
	fn train_many_matches_sequential_training() {
		let texts = ["x = 1\n", "def f(x):\n    return x\n", "", "y = x + 1\n"];
		let sequences: Vec<TokenSequence> = texts.iter().map(|t| tokenize(t, false).unwrap()).collect();

		let mut sequential = Corpus::new(3).unwrap();
		for tokens in sequences.iter().filter(|t| !t.is_empty()) {
			sequential.train(tokens);
		}

		let mut batched = Corpus::new(3).unwrap();
		let training = batched.train_many(sequences).unwrap();

		assert_eq!(batched.model(), sequential.model());
		assert_eq!(batched.training_events(), 3);
		assert_eq!(batched.vocabulary().len(), sequential.vocabulary().len());

		batched.rollback(training);
		assert!(!batched.model().is_trained());
		assert!(batched.vocabulary().is_empty());
	}

	#[test]
	fn partial_failures_are_propagated() {
		let mut good = MultiGramModel::new(2).unwrap();
		good.update(&[TokenId::from_index(0)]);
		let merged = merge_partials(2, vec![Ok(good.clone()), Ok(good.clone())]).unwrap();
		assert_eq!(merged.total(&[]), 4);

		let wrong_order = MultiGramModel::new(3).unwrap();
		assert!(matches!(merge_partials(2, vec![Ok(good.clone()), Ok(wrong_order)]), Err(Error::Merge(_))));
		assert!(matches!(
			merge_partials(2, vec![Ok(good), Err(Error::InvalidOrder(0))]),
			Err(Error::InvalidOrder(0))
		));
	}
}
