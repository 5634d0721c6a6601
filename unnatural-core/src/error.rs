//! Error types for corpus operations.
//!
//! Every failure is reported upward; nothing is retried inside the core.

use std::path::PathBuf;
use thiserror::Error;

use crate::tokenizer::TokenizeError;

/// Result type alias for corpus operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Durable storage failures, before they are tied to a corpus path.
#[derive(Debug, Error)]
pub enum PersistenceError {
	/// Reading, writing or renaming the artifact failed.
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),

	/// The artifact could not be encoded or decoded.
	#[error("codec error: {0}")]
	Codec(#[from] postcard::Error),

	/// The artifact was written by an incompatible format version.
	#[error("unsupported format version {found}, expected {expected}")]
	Version { found: u16, expected: u16 },

	/// The artifact decoded but its content is inconsistent.
	#[error("corrupt artifact: {0}")]
	Corrupt(String),
}

/// Errors surfaced by the corpus manager.
#[derive(Debug, Error)]
pub enum Error {
	/// The name does not designate a known or creatable corpus.
	#[error("corpus not found: {name}")]
	CorpusNotFound { name: String },

	/// The input text could not be lexed at all.
	#[error(transparent)]
	Tokenize(#[from] TokenizeError),

	/// Cross-entropy of an empty token sequence is undefined.
	#[error("cannot score an empty token sequence")]
	EmptySequence,

	/// Durable storage is unreadable or unwritable. Safe to retry.
	#[error("persistence failed for {}: {source}", path.display())]
	Persistence {
		path: PathBuf,
		#[source]
		source: PersistenceError,
	},

	/// The model order must be at least 1.
	#[error("invalid model order {0}, must be >= 1")]
	InvalidOrder(usize),

	/// Partial counts of a batch could not be combined.
	#[error("cannot merge n-gram counts: {0}")]
	Merge(String),

	/// A thread panicked while holding the corpus lock.
	#[error("corpus lock poisoned: {name}")]
	Poisoned { name: String },
}

impl Error {
	/// Create a corpus-not-found error.
	#[must_use]
	pub fn not_found(name: impl Into<String>) -> Self {
		Self::CorpusNotFound { name: name.into() }
	}

	/// Attach the artifact path to a storage failure.
	#[must_use]
	pub fn persistence(path: impl Into<PathBuf>, source: impl Into<PersistenceError>) -> Self {
		Self::Persistence {
			path: path.into(),
			source: source.into(),
		}
	}

	/// Whether the caller sent something unusable (as opposed to a server-side failure).
	pub fn is_bad_input(&self) -> bool {
		matches!(self, Self::Tokenize(_) | Self::EmptySequence)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn persistence_message_names_the_path() {
		let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
		let err = Error::persistence("/tmp/py.corpus", io);
		let message = err.to_string();
		assert!(message.contains("/tmp/py.corpus"));
		assert!(message.contains("denied"));
	}

	#[test]
	fn bad_input_classification() {
		assert!(Error::EmptySequence.is_bad_input());
		assert!(!Error::not_found("py").is_bad_input());
	}
}
