use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::multigram_model::MultiGramModel;
use super::vocabulary::{TokenId, Vocabulary};
use crate::tokenizer::Token;

/// One ranked continuation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PredictionCandidate {
	/// Surface of the suggested token (`<unk>` for the out-of-vocabulary mass).
	pub token: String,
	/// Backoff-estimated probability of the token following the prefix.
	pub probability: f64,
}

/// Maps a token sequence to ids without touching the vocabulary.
pub fn resolve(vocabulary: &Vocabulary, tokens: &[Token]) -> Vec<TokenId> {
	tokens.iter().map(|token| vocabulary.resolve(token.surface())).collect()
}

/// Ranks the most likely tokens to follow `prefix`.
///
/// Every vocabulary token and the out-of-vocabulary sentinel is scored
/// against the trailing context of `prefix`. A short prefix is read as the
/// start of a file; an empty prefix falls back to the unconditional
/// (unigram) distribution. The `limit` best are returned sorted by
/// probability (descending), ties broken by surface.
///
/// Returns an empty list when the model was never trained.
pub fn predict(
	vocabulary: &Vocabulary,
	model: &MultiGramModel,
	prefix: &[Token],
	limit: usize,
) -> Vec<PredictionCandidate> {
	if limit == 0 || !model.is_trained() {
		return Vec::new();
	}

	let context = match prefix {
		[] => Vec::new(),
		_ => model.context_of(&resolve(vocabulary, prefix)),
	};

	let mut candidates: Vec<(TokenId, f64)> = vocabulary
		.ids()
		.chain(std::iter::once(TokenId::UNKNOWN))
		.map(|id| (id, model.probability(&context, id)))
		.collect();

	let surface = |id: TokenId| vocabulary.lookup(id).unwrap_or_default();
	let rank = |a: &(TokenId, f64), b: &(TokenId, f64)| -> Ordering {
		b.1.total_cmp(&a.1).then_with(|| surface(a.0).cmp(surface(b.0)))
	};

	if candidates.len() > limit {
		candidates.select_nth_unstable_by(limit - 1, rank);
		candidates.truncate(limit);
	}
	candidates.sort_by(rank);

	candidates
		.into_iter()
		.map(|(id, probability)| PredictionCandidate { token: surface(id).to_owned(), probability })
		.collect()
}
