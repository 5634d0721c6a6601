use super::multigram_model::MultiGramModel;
use super::predictor::resolve;
use super::vocabulary::{TokenId, Vocabulary};
use crate::error::{Error, Result};
use crate::tokenizer::Token;

/// Cross-entropy of `sequence` under the model, in bits per token.
///
/// Computes `-1/N * sum(log2 P(token_i | context_i))` with the same backoff
/// estimator the predictor uses. Lower means more natural. Unseen tokens are
/// scored as out-of-vocabulary and never mutate the vocabulary.
///
/// # Errors
/// `Error::EmptySequence` when `sequence` has no tokens.
pub fn cross_entropy(vocabulary: &Vocabulary, model: &MultiGramModel, sequence: &[Token]) -> Result<f64> {
	if sequence.is_empty() {
		return Err(Error::EmptySequence);
	}

	let width = model.order() - 1;
	let mut padded = vec![TokenId::START; width];
	padded.extend(resolve(vocabulary, sequence));

	let bits: f64 = (width..padded.len())
		.map(|i| -model.probability(&padded[i - width..i], padded[i]).log2())
		.sum();

	Ok(bits / sequence.len() as f64)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn tokens(surfaces: &[&str]) -> Vec<Token> {
		surfaces.iter().map(|s| Token::from_surface(s)).collect()
	}

	#[test]
	fn empty_sequence_is_rejected() {
		let model = MultiGramModel::new(3).unwrap();
		assert!(matches!(cross_entropy(&Vocabulary::new(), &model, &[]), Err(Error::EmptySequence)));
	}

	#[test]
	fn untrained_model_scores_zero_bits() {
		let model = MultiGramModel::new(3).unwrap();
		let score = cross_entropy(&Vocabulary::new(), &model, &tokens(&["x"])).unwrap();
		assert_eq!(score, 0.0);
	}

	#[test]
	fn trained_text_is_more_natural_than_unseen_text() {
		let mut vocabulary = Vocabulary::new();
		let mut model = MultiGramModel::new(3).unwrap();
		let trained = ["for", "i", "in", "range", "(", "n", ")", ":"];
		let ids: Vec<TokenId> = trained.iter().map(|s| vocabulary.intern(s)).collect();
		model.update(&ids);

		let familiar = cross_entropy(&vocabulary, &model, &tokens(&trained)).unwrap();
		let strange = cross_entropy(&vocabulary, &model, &tokens(&["lorem", "ipsum", "dolor"])).unwrap();
		assert!(familiar.is_finite() && strange.is_finite());
		assert!(familiar < strange);
	}
}
