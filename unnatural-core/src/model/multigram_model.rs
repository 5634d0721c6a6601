use serde::{Deserialize, Serialize};

use super::ngram_model::NGramModel;
use super::vocabulary::TokenId;
use crate::error::{Error, Result};

/// Default context window: trigrams.
pub const DEFAULT_ORDER: usize = 3;

/// The n-gram store: counts for every order from 1 up to `order`.
///
/// This struct manages:
/// - `ngrams[n - 1]`: the `NGramModel` of order `n`
/// - boundary padding with `TokenId::START` / `TokenId::END`, so that
///   n-grams at the edges of a sequence are distinct from interior ones
/// - the backoff estimator shared by prediction and scoring
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MultiGramModel {
	order: usize,
	ngrams: Vec<NGramModel>,
}

impl MultiGramModel {
	/// Creates an empty store of the given order.
	///
	/// # Errors
	/// `Error::InvalidOrder` if `order < 1`.
	pub fn new(order: usize) -> Result<Self> {
		let ngrams = (1..=order)
			.map(NGramModel::new)
			.collect::<std::result::Result<Vec<_>, _>>()
			.map_err(|_| Error::InvalidOrder(order))?;
		if ngrams.is_empty() {
			return Err(Error::InvalidOrder(order));
		}
		Ok(Self { order, ngrams })
	}

	pub fn order(&self) -> usize {
		self.order
	}

	/// Pads `ids` with `order - 1` start sentinels and one end sentinel.
	fn padded(&self, ids: &[TokenId]) -> Vec<TokenId> {
		let mut padded = vec![TokenId::START; self.order - 1];
		padded.extend_from_slice(ids);
		padded.push(TokenId::END);
		padded
	}

	/// Calls `f(n, context, next)` for every n-gram a training sequence contributes.
	fn for_each_ngram(&self, ids: &[TokenId], mut f: impl FnMut(usize, &[TokenId], TokenId)) {
		let padded = self.padded(ids);
		for i in self.order - 1..padded.len() {
			let next = padded[i];
			for n in 1..=self.order {
				f(n, &padded[i + 1 - n..i], next);
			}
		}
	}

	/// Increments counts for every n-gram of length `1..=order` in `ids`,
	/// boundaries included.
	pub fn update(&mut self, ids: &[TokenId]) {
		let mut ngrams = std::mem::take(&mut self.ngrams);
		self.for_each_ngram(ids, |n, context, next| ngrams[n - 1].add(context, next));
		self.ngrams = ngrams;
	}

	/// Exactly undoes a previous `update(ids)`.
	pub fn retract(&mut self, ids: &[TokenId]) {
		let mut ngrams = std::mem::take(&mut self.ngrams);
		self.for_each_ngram(ids, |n, context, next| {
			ngrams[n - 1].remove(context, next);
		});
		self.ngrams = ngrams;
	}

	/// Occurrences of `candidate` after `context` (at most `order - 1` ids).
	pub fn count(&self, context: &[TokenId], candidate: TokenId) -> u64 {
		self.ngrams.get(context.len()).map_or(0, |model| model.count(context, candidate))
	}

	/// Sum of counts over every candidate following `context`.
	pub fn total(&self, context: &[TokenId]) -> u64 {
		self.ngrams.get(context.len()).map_or(0, |model| model.total(context))
	}

	/// Whether at least one training event reached the store.
	pub fn is_trained(&self) -> bool {
		self.total(&[]) > 0
	}

	/// Number of distinct n-gram records across all orders.
	pub fn ngram_count(&self) -> usize {
		self.ngrams.iter().map(NGramModel::len).sum()
	}

	/// The context used to predict the token after `history`: its trailing
	/// `order - 1` ids, left-padded with start sentinels.
	pub fn context_of(&self, history: &[TokenId]) -> Vec<TokenId> {
		let width = self.order - 1;
		let mut context = vec![TokenId::START; width.saturating_sub(history.len())];
		context.extend_from_slice(&history[history.len().saturating_sub(width)..]);
		context
	}

	/// Interpolated Witten-Bell estimate of `P(candidate | context)`.
	///
	/// Starts from a uniform floor over every known event plus the
	/// out-of-vocabulary mass, then refines it with each context length from
	/// the unigram up. A context never observed leaves the shorter estimate
	/// untouched (backoff). The result is always finite and `> 0`.
	pub fn probability(&self, context: &[TokenId], candidate: TokenId) -> f64 {
		let context = &context[context.len().saturating_sub(self.order - 1)..];

		// Distinct unigrams already include the end marker
		let events = self.ngrams[0].state(&[]).map_or(0, |state| state.distinct()) + 1;
		let mut probability = 1.0 / events as f64;

		for n in 1..=context.len() + 1 {
			let suffix = &context[context.len() + 1 - n..];
			let Some(state) = self.ngrams[n - 1].state(suffix) else {
				continue;
			};
			let total = state.total() as f64;
			let distinct = state.distinct() as f64;
			probability = (state.count(candidate) as f64 + distinct * probability) / (total + distinct);
		}

		probability
	}

	/// Checks the shape of a decoded store: one model per order `1..=order`.
	///
	/// # Errors
	/// A description of the first inconsistency found.
	pub fn validate(&self) -> std::result::Result<(), String> {
		if self.order < 1 {
			return Err(format!("invalid order {}", self.order));
		}
		if self.ngrams.len() != self.order {
			return Err(format!("order {} but {} n-gram tables", self.order, self.ngrams.len()));
		}
		match self.ngrams.iter().enumerate().find(|(i, model)| model.n() != i + 1) {
			Some((i, model)) => Err(format!("table {} has order {}", i + 1, model.n())),
			None => Ok(()),
		}
	}

	/// Merges another store of the same order into this one.
	pub fn merge(&mut self, other: &Self) -> std::result::Result<(), String> {
		if self.order != other.order {
			return Err(format!("Order mismatch: self={}, other={}", self.order, other.order));
		}
		for (mine, theirs) in self.ngrams.iter_mut().zip(&other.ngrams) {
			mine.merge(theirs)?;
		}
		Ok(())
	}
}
