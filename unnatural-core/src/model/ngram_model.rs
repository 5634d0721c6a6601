use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::state::State;
use super::vocabulary::TokenId;

/// Represents the n-gram counts of a single order `n`.
///
/// The `NGramModel` stores one `State` per observed context of length `n-1`.
/// Order 1 has a single state keyed by the empty context: the unigram
/// distribution.
///
/// # Responsibilities
/// - Record and retract (context, next) observations
/// - Answer `count` and `total` point queries for a context
/// - Merge with another n-gram model of the same order `n`
///
/// # Invariants
/// - `n` is always >= 1
/// - Each state in `states` corresponds to a unique context of length `n-1`
/// - No stored state is empty
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NGramModel {
	/// The order of the model (number of tokens in the n-gram)
	n: usize,

	/// Mapping from a context (length n-1) to its corresponding state
	states: HashMap<Vec<TokenId>, State>,
}

impl NGramModel {
	/// Creates a new n-gram model of order `n`.
	///
	/// # Errors
	/// Returns an error if `n < 1`.
	pub fn new(n: usize) -> Result<Self, String> {
		if n < 1 {
			return Err("n must be >= 1".to_owned());
		}
		Ok(Self { n, states: HashMap::new() })
	}

	pub fn n(&self) -> usize {
		self.n
	}

	/// Records one occurrence of `next` after `context`.
	///
	/// `context` must hold exactly `n-1` ids.
	pub fn add(&mut self, context: &[TokenId], next: TokenId) {
		debug_assert_eq!(context.len(), self.n - 1);
		self.states
			.entry(context.to_vec())
			.or_insert_with(|| State::new(context))
			.add_transition(next);
	}

	/// Removes one occurrence of `next` after `context`, pruning emptied states.
	pub fn remove(&mut self, context: &[TokenId], next: TokenId) -> bool {
		let Some(state) = self.states.get_mut(context) else {
			return false;
		};
		let removed = state.remove_transition(next);
		if state.is_empty() {
			self.states.remove(context);
		}
		removed
	}

	pub fn state(&self, context: &[TokenId]) -> Option<&State> {
		self.states.get(context)
	}

	/// Occurrences of `candidate` directly after `context`.
	pub fn count(&self, context: &[TokenId], candidate: TokenId) -> u64 {
		self.state(context).map_or(0, |state| state.count(candidate))
	}

	/// Sum of all occurrences following `context`.
	pub fn total(&self, context: &[TokenId]) -> u64 {
		self.state(context).map_or(0, State::total)
	}

	/// Number of distinct n-gram records.
	pub fn len(&self) -> usize {
		self.states.values().map(State::distinct).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.states.is_empty()
	}

	/// Merges another n-gram model into this one.
	///
	/// # Notes
	/// - Both models must have the same order `n`.
	/// - Occurrence counts for matching states and transitions are summed.
	///
	/// # Errors
	/// Returns an error if the model orders do not match.
	pub fn merge(&mut self, other: &Self) -> Result<(), String> {
		if self.n != other.n {
			return Err("N mismatch".to_owned());
		}

		for (key, state) in &other.states {
			if let Some(existing) = self.states.get_mut(key) {
				existing.merge(state)?;
			} else {
				self.states.insert(key.clone(), state.clone());
			}
		}

		Ok(())
	}
}
