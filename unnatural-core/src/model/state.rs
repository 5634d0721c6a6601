use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::vocabulary::TokenId;

/// Represents a context in an n-gram model.
///
/// A `State` corresponds to a fixed (n-1)-token context (`key`) and stores
/// every observed follower of that context with its number of observations.
///
/// Conceptually, this is a node in a Markov chain where outgoing edges
/// are weighted by their number of observations.
///
/// ## Responsibilities:
/// - Accumulate (and, on rollback, retract) follower occurrences
/// - Answer the point query `count(context, candidate)` and `total(context)`
/// - Merge with another state having the same key
///
/// ## Invariants
/// - All transitions belong to the same `key`
/// - Each transition occurrence count is strictly positive
/// - `total` is the sum of all transition counts
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct State {
	/// Identifier of the state (n-1 token context).
	key: Vec<TokenId>,
	/// Followers of the context, with how many times each was observed.
	transitions: HashMap<TokenId, u64>,
	total: u64,
}

impl State {
	/// Creates a new empty state for the given context.
	pub fn new(key: &[TokenId]) -> Self {
		Self {
			key: key.to_vec(),
			transitions: HashMap::new(),
			total: 0,
		}
	}

	/// Records an occurrence of `next` following this context.
	pub fn add_transition(&mut self, next: TokenId) {
		*self.transitions.entry(next).or_insert(0) += 1;
		self.total += 1;
	}

	/// Removes one occurrence of `next`, dropping the transition when it reaches zero.
	///
	/// Returns `false` if there was nothing to remove.
	pub fn remove_transition(&mut self, next: TokenId) -> bool {
		let Some(occurrence) = self.transitions.get_mut(&next) else {
			return false;
		};
		*occurrence -= 1;
		if *occurrence == 0 {
			self.transitions.remove(&next);
		}
		self.total -= 1;
		true
	}

	/// Occurrences of `next` after this context.
	pub fn count(&self, next: TokenId) -> u64 {
		self.transitions.get(&next).copied().unwrap_or(0)
	}

	/// Sum of all follower occurrences.
	pub fn total(&self) -> u64 {
		self.total
	}

	/// Number of distinct followers.
	pub fn distinct(&self) -> usize {
		self.transitions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.transitions.is_empty()
	}

	/// Merges another state into this one.
	///
	/// Both states must represent the same context (`key`).
	/// Transition occurrence counts are summed.
	///
	/// # Errors
	/// Returns an error if the state keys do not match.
	pub fn merge(&mut self, other: &Self) -> Result<(), String> {
		if self.key != other.key {
			return Err("Key mismatch".to_owned());
		}

		for (next, occurrence) in &other.transitions {
			*self.transitions.entry(*next).or_insert(0) += *occurrence;
		}
		self.total += other.total;

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn id(i: usize) -> TokenId {
		TokenId::from_index(i)
	}

	#[test]
	fn counts_and_total() {
		let (a, b) = (id(0), id(1));
		let mut state = State::new(&[a]);
		state.add_transition(b);
		state.add_transition(b);
		state.add_transition(a);

		assert_eq!(state.count(b), 2);
		assert_eq!(state.count(TokenId::UNKNOWN), 0);
		assert_eq!(state.total(), 3);
		assert_eq!(state.distinct(), 2);
	}

	#[test]
	fn remove_transition_drops_empty_edges() {
		let a = id(0);
		let mut state = State::new(&[]);
		state.add_transition(a);
		assert!(state.remove_transition(a));
		assert!(!state.remove_transition(a));
		assert!(state.is_empty());
		assert_eq!(state.total(), 0);
	}

	#[test]
	fn merge_sums_counts() {
		let (a, b) = (id(0), id(1));
		let mut left = State::new(&[a]);
		left.add_transition(b);
		let mut right = State::new(&[a]);
		right.add_transition(b);
		right.add_transition(a);

		left.merge(&right).unwrap();
		assert_eq!(left.count(b), 2);
		assert_eq!(left.total(), 3);

		assert!(left.merge(&State::new(&[b])).is_err());
	}
}
