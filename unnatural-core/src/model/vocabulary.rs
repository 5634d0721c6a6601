use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Compact identifier of a vocabulary token.
///
/// Real ids are allocated sequentially from 0. The sentinels sit at the top of
/// the `u32` range so they never collide with an allocated id.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(u32);

impl TokenId {
	/// Out-of-vocabulary token.
	pub const UNKNOWN: TokenId = TokenId(u32::MAX);
	/// Padding before the first token of a sequence.
	pub const START: TokenId = TokenId(u32::MAX - 1);
	/// Marker after the last token of a sequence.
	pub const END: TokenId = TokenId(u32::MAX - 2);

	pub(crate) fn from_index(index: usize) -> Self {
		TokenId(index as u32)
	}

	pub fn index(self) -> usize {
		self.0 as usize
	}
}

impl fmt::Display for TokenId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match *self {
			Self::UNKNOWN => f.write_str(UNKNOWN_SURFACE),
			Self::START => f.write_str(START_SURFACE),
			Self::END => f.write_str(END_SURFACE),
			TokenId(id) => write!(f, "#{id}"),
		}
	}
}

pub const UNKNOWN_SURFACE: &str = "<unk>";
pub const START_SURFACE: &str = "<s>";
pub const END_SURFACE: &str = "</s>";

/// One interned surface and how often training observed it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Entry {
	pub surface: String,
	pub count: u64,
}

/// Bidirectional mapping between token surfaces and `TokenId`s.
///
/// ## Invariants
/// - `entries[id]` is the token with id `id`; ids follow first-seen order
/// - `index` maps every surface in `entries` back to its position
/// - Entries are never removed, only rolled back by an aborted training
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Vocabulary {
	entries: Vec<Entry>,
	#[serde(skip)]
	index: HashMap<String, TokenId>,
}

impl Vocabulary {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the id of `surface`, allocating the next id if it is new,
	/// and records one observation.
	pub fn intern(&mut self, surface: &str) -> TokenId {
		let id = match self.index.get(surface) {
			Some(&id) => id,
			None => {
				let id = TokenId::from_index(self.entries.len());
				self.entries.push(Entry { surface: surface.to_owned(), count: 0 });
				self.index.insert(surface.to_owned(), id);
				id
			}
		};
		self.entries[id.index()].count += 1;
		id
	}

	/// Read-only counterpart of `intern`: unseen surfaces map to `TokenId::UNKNOWN`.
	pub fn resolve(&self, surface: &str) -> TokenId {
		self.id_of(surface).unwrap_or(TokenId::UNKNOWN)
	}

	pub fn id_of(&self, surface: &str) -> Option<TokenId> {
		self.index.get(surface).copied()
	}

	/// Surface of an id; sentinels have fixed surfaces.
	pub fn lookup(&self, id: TokenId) -> Option<&str> {
		match id {
			TokenId::UNKNOWN => Some(UNKNOWN_SURFACE),
			TokenId::START => Some(START_SURFACE),
			TokenId::END => Some(END_SURFACE),
			_ => self.entries.get(id.index()).map(|e| e.surface.as_str()),
		}
	}

	/// Number of training observations of `id`.
	pub fn count(&self, id: TokenId) -> u64 {
		self.entries.get(id.index()).map_or(0, |e| e.count)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Number of training observations across every token.
	pub fn observations(&self) -> u64 {
		self.ids().map(|id| self.count(id)).sum()
	}

	/// Iterates over every real id in allocation order.
	pub fn ids(&self) -> impl Iterator<Item = TokenId> + '_ {
		(0..self.entries.len()).map(TokenId::from_index)
	}

	/// Undoes the interning of `ids`, then drops entries allocated after `len`.
	///
	/// Only valid for ids interned since the vocabulary had `len` entries.
	pub(crate) fn rollback(&mut self, len: usize, ids: &[TokenId]) {
		for id in ids {
			if let Some(entry) = self.entries.get_mut(id.index()) {
				entry.count = entry.count.saturating_sub(1);
			}
		}
		for entry in self.entries.drain(len.min(self.entries.len())..) {
			self.index.remove(&entry.surface);
		}
	}

	/// Rebuilds the surface index after deserialization.
	pub(crate) fn reindex(&mut self) {
		self.index = self
			.entries
			.iter()
			.enumerate()
			.map(|(i, e)| (e.surface.clone(), TokenId::from_index(i)))
			.collect();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ids_follow_first_seen_order() {
		let mut vocabulary = Vocabulary::new();
		let def = vocabulary.intern("def");
		let foo = vocabulary.intern("foo");
		assert_eq!(vocabulary.intern("def"), def);
		assert_eq!((def.index(), foo.index()), (0, 1));
		assert_eq!(vocabulary.count(def), 2);
		assert_eq!(vocabulary.lookup(foo), Some("foo"));
		assert_eq!(vocabulary.len(), 2);
	}

	#[test]
	fn resolve_does_not_grow() {
		let vocabulary = Vocabulary::new();
		assert_eq!(vocabulary.resolve("never"), TokenId::UNKNOWN);
		assert!(vocabulary.is_empty());
	}

	#[test]
	fn sentinels_are_not_real_ids() {
		let mut vocabulary = Vocabulary::new();
		for surface in ["a", "b", "c"] {
			vocabulary.intern(surface);
		}
		assert!(vocabulary.ids().all(|id| id != TokenId::UNKNOWN && id != TokenId::START && id != TokenId::END));
		assert_eq!(Vocabulary::new().lookup(TokenId::START), Some(START_SURFACE));
	}

	#[test]
	fn rollback_restores_previous_state() {
		let mut vocabulary = Vocabulary::new();
		let a = vocabulary.intern("a");
		let len = vocabulary.len();

		let ids = vec![vocabulary.intern("a"), vocabulary.intern("b")];
		vocabulary.rollback(len, &ids);

		assert_eq!(vocabulary.len(), 1);
		assert_eq!(vocabulary.count(a), 1);
		assert_eq!(vocabulary.id_of("b"), None);
	}

	#[test]
	fn reindex_after_decode() {
		let mut vocabulary = Vocabulary::new();
		vocabulary.intern("x");
		let bytes = postcard::to_stdvec(&vocabulary).unwrap();
		let mut decoded: Vocabulary = postcard::from_bytes(&bytes).unwrap();
		assert_eq!(decoded.id_of("x"), None);
		decoded.reindex();
		assert_eq!(decoded.id_of("x"), Some(TokenId(0)));
	}
}
