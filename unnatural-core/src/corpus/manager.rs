use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::persistence;
use super::{Corpus, Training};
use crate::error::{Error, Result};
use crate::io::{build_backup_path, build_corpus_path, list_files, normalize_folder, read_file};
use crate::model::multigram_model::DEFAULT_ORDER;
use crate::model::predictor::PredictionCandidate;
use crate::parallel::map_chunks;
use crate::tokenizer::{tokenize, Token, TokenSequence, TokenizeError};

/// Where corpora live and how new ones are shaped.
#[derive(Clone, Debug)]
pub struct ManagerConfig {
	/// Directory holding one `<name>.corpus` artifact per corpus.
	pub storage_root: PathBuf,
	/// Model order of newly created corpora. Loaded corpora keep their own.
	pub order: usize,
	/// When set, only these names designate a corpus.
	pub known_corpora: Option<HashSet<String>>,
}

impl Default for ManagerConfig {
	fn default() -> Self {
		Self {
			storage_root: PathBuf::from("corpora"),
			order: DEFAULT_ORDER,
			known_corpora: None,
		}
	}
}

/// Summary record of a corpus.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Summary {
	pub name: String,
	pub vocabulary_size: usize,
	/// Tokens observed by training, repeats included.
	pub token_count: u64,
	pub training_events: u64,
	pub order: usize,
	pub ngram_count: usize,
	/// Size of the persisted artifact; `None` until the first flush.
	pub persisted_bytes: Option<u64>,
}

/// One named corpus slot in the registry.
///
/// The slot is `None` until first access (unloaded); once loaded it stays
/// loaded, a deletion swaps in a fresh empty corpus.
#[derive(Debug)]
pub struct CorpusHandle {
	name: String,
	path: PathBuf,
	backup_path: PathBuf,
	state: RwLock<Option<Corpus>>,
}

impl CorpusHandle {
	fn new(name: &str, storage_root: &Path) -> Self {
		let path = build_corpus_path(storage_root, name);
		Self {
			name: name.to_owned(),
			backup_path: build_backup_path(&path),
			path,
			state: RwLock::new(None),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Persisted artifact location.
	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn is_loaded(&self) -> bool {
		self.state.read().is_ok_and(|state| state.is_some())
	}

	fn poisoned(&self) -> Error {
		Error::Poisoned { name: self.name.clone() }
	}

	fn load(&self, order: usize) -> Result<Corpus> {
		match persistence::load(&self.path).map_err(|e| Error::persistence(&self.path, e))? {
			Some(corpus) => {
				debug!("Loaded corpus {} (order {})", self.name, corpus.order());
				Ok(corpus)
			}
			None => {
				debug!("Initialized empty corpus {}", self.name);
				Corpus::new(order)
			}
		}
	}

	/// Runs `f` under the shared lock, loading the corpus first if needed.
	fn read<R>(&self, order: usize, f: impl FnOnce(&Corpus) -> R) -> Result<R> {
		{
			let state = self.state.read().map_err(|_| self.poisoned())?;
			if let Some(corpus) = state.as_ref() {
				return Ok(f(corpus));
			}
		}
		self.write(order, |corpus| Ok(f(&*corpus)))
	}

	/// Runs `f` under the exclusive lock, loading the corpus first if needed.
	fn write<R>(&self, order: usize, f: impl FnOnce(&mut Corpus) -> Result<R>) -> Result<R> {
		let mut state = self.state.write().map_err(|_| self.poisoned())?;
		let corpus = match state.take() {
			Some(corpus) => corpus,
			None => self.load(order)?,
		};
		f(state.insert(corpus))
	}

	fn summarize(&self, corpus: &Corpus) -> Summary {
		Summary {
			name: self.name.clone(),
			vocabulary_size: corpus.vocabulary().len(),
			token_count: corpus.vocabulary().observations(),
			training_events: corpus.training_events(),
			order: corpus.order(),
			ngram_count: corpus.model().ngram_count(),
			persisted_bytes: persistence::persisted_size(&self.path),
		}
	}

	/// Flushes a freshly trained corpus, undoing the training if storage fails.
	fn commit(&self, corpus: &mut Corpus, training: Training) -> Result<usize> {
		let tokens = training.tokens();
		if let Err(source) = persistence::save(corpus, &self.path) {
			warn!("Rolling back training of {}: {source}", self.name);
			corpus.rollback(training);
			return Err(Error::persistence(&self.path, source));
		}
		info!(
			"Trained {} on {} tokens (vocabulary {}, {} events)",
			self.name,
			tokens,
			corpus.vocabulary().len(),
			corpus.training_events()
		);
		Ok(tokens)
	}
}

/// Registry and single entry point of every named corpus.
///
/// # Concurrency
/// - The registry mutex is held only to find or insert a handle, never
///   during disk I/O, so different corpora never block each other.
/// - Each corpus follows a single-writer, multi-reader discipline: predict,
///   cross-entropy and summary share its lock; train, delete and restore
///   take it exclusively.
/// - A training call returns only after the updated corpus is durably
///   stored, so later reads in this process observe it.
#[derive(Debug)]
pub struct CorpusManager {
	config: ManagerConfig,
	corpora: Mutex<HashMap<String, Arc<CorpusHandle>>>,
}

impl CorpusManager {
	/// Creates an empty registry; nothing is read from disk until first access.
	///
	/// # Errors
	/// `Error::InvalidOrder` if the configured order is 0.
	pub fn new(mut config: ManagerConfig) -> Result<Self> {
		if config.order < 1 {
			return Err(Error::InvalidOrder(config.order));
		}
		if let Some(root) = config.storage_root.to_str() {
			config.storage_root = normalize_folder(root);
		}
		info!("Corpus storage at {}", config.storage_root.display());
		Ok(Self { config, corpora: Mutex::new(HashMap::new()) })
	}

	/// Rejects names that cannot designate a corpus.
	fn validate(&self, name: &str) -> Result<()> {
		let known = self.config.known_corpora.as_ref().is_none_or(|known| known.contains(name));
		if !known || !is_valid_name(name) {
			return Err(Error::not_found(name));
		}
		Ok(())
	}

	fn lock_registry(&self, name: &str) -> Result<MutexGuard<'_, HashMap<String, Arc<CorpusHandle>>>> {
		self.corpora.lock().map_err(|_| Error::Poisoned { name: name.to_owned() })
	}

	/// Finds or registers the handle of `name` without loading it.
	fn handle(&self, name: &str) -> Result<Arc<CorpusHandle>> {
		self.validate(name)?;
		let mut corpora = self.lock_registry(name)?;
		let handle = corpora
			.entry(name.to_owned())
			.or_insert_with(|| Arc::new(CorpusHandle::new(name, &self.config.storage_root)));
		Ok(Arc::clone(handle))
	}

	/// The handle of `name` if it is registered or something is stored for it.
	///
	/// A name with neither an artifact nor a backup is left unregistered.
	fn existing(&self, name: &str) -> Result<Option<Arc<CorpusHandle>>> {
		self.validate(name)?;
		if let Some(handle) = self.lock_registry(name)?.get(name) {
			return Ok(Some(Arc::clone(handle)));
		}

		let candidate = CorpusHandle::new(name, &self.config.storage_root);
		if !candidate.path.exists() && !candidate.backup_path.exists() {
			return Ok(None);
		}
		let mut corpora = self.lock_registry(name)?;
		Ok(Some(Arc::clone(corpora.entry(name.to_owned()).or_insert_with(|| Arc::new(candidate)))))
	}

	/// Handle for read-only operations. An unknown name gets a detached handle
	/// over an empty corpus, so reads never grow the registry.
	fn reader(&self, name: &str) -> Result<Arc<CorpusHandle>> {
		Ok(match self.existing(name)? {
			Some(handle) => handle,
			None => Arc::new(CorpusHandle::new(name, &self.config.storage_root)),
		})
	}

	/// Loads the persisted corpus, or initializes an empty one.
	pub fn get_or_create(&self, name: &str) -> Result<Arc<CorpusHandle>> {
		let handle = self.handle(name)?;
		handle.read(self.config.order, |_| ())?;
		Ok(handle)
	}

	/// Vocabulary size, training events, order and persisted size.
	pub fn summary(&self, name: &str) -> Result<Summary> {
		let handle = self.reader(name)?;
		handle.read(self.config.order, |corpus| handle.summarize(corpus))
	}

	/// Tokenizes `text` for this corpus's language. Stateless.
	pub fn tokenize(&self, name: &str, text: &str, mid_line: bool) -> Result<TokenSequence> {
		self.validate(name)?;
		Ok(tokenize(text, mid_line)?)
	}

	/// Ranks continuations of an already tokenized prefix.
	pub fn predict(&self, name: &str, prefix: &[Token], limit: usize) -> Result<Vec<PredictionCandidate>> {
		let handle = self.reader(name)?;
		handle.read(self.config.order, |corpus| corpus.predict(prefix, limit))
	}

	/// Ranks continuations of raw text ending at the cursor.
	pub fn predict_text(&self, name: &str, text: &str, limit: usize) -> Result<Vec<PredictionCandidate>> {
		let prefix = self.tokenize(name, text, true)?;
		self.predict(name, &prefix, limit)
	}

	/// Cross-entropy of an already tokenized sequence.
	pub fn cross_entropy(&self, name: &str, sequence: &[Token]) -> Result<f64> {
		let handle = self.reader(name)?;
		handle.read(self.config.order, |corpus| corpus.cross_entropy(sequence))?
	}

	/// Cross-entropy of a complete snippet of source text.
	pub fn score(&self, name: &str, text: &str) -> Result<f64> {
		let sequence = self.tokenize(name, text, false)?;
		self.cross_entropy(name, &sequence)
	}

	/// Tokenizes `text` and trains the corpus on it. Returns the token count.
	pub fn train(&self, name: &str, text: &str) -> Result<usize> {
		let tokens = self.tokenize(name, text, false)?;
		self.train_tokens(name, &tokens)
	}

	/// Trains on a token sequence and flushes before returning.
	///
	/// All-or-nothing: if the flush fails the in-memory update is rolled back.
	/// An empty sequence changes nothing.
	pub fn train_tokens(&self, name: &str, tokens: &[Token]) -> Result<usize> {
		if tokens.is_empty() {
			self.validate(name)?;
			return Ok(0);
		}
		let handle = self.handle(name)?;
		handle.write(self.config.order, |corpus| {
			let training = corpus.train(tokens);
			handle.commit(corpus, training)
		})
	}

	/// Trains on many texts with a single flush.
	///
	/// Texts are tokenized and counted in parallel. Any tokenize error aborts
	/// the whole batch before the corpus is touched.
	pub fn train_batch(&self, name: &str, texts: Vec<String>) -> Result<usize> {
		self.validate(name)?;

		let tokenized = map_chunks(texts, |chunk| {
			chunk
				.iter()
				.map(|text| tokenize(text, false))
				.collect::<std::result::Result<Vec<_>, TokenizeError>>()
		});
		let mut sequences = Vec::new();
		for chunk in tokenized {
			sequences.extend(chunk?);
		}

		if sequences.iter().all(Vec::is_empty) {
			return Ok(0);
		}
		let handle = self.handle(name)?;
		handle.write(self.config.order, |corpus| {
			let training = corpus.train_many(sequences)?;
			handle.commit(corpus, training)
		})
	}

	/// Trains on every file with `extension` directly inside `dir`.
	pub fn train_files<P: AsRef<Path>>(&self, name: &str, dir: P, extension: &str) -> Result<usize> {
		let dir = dir.as_ref();
		let files = list_files(dir, extension).map_err(|e| Error::persistence(dir, e))?;
		let texts = files
			.iter()
			.map(|file| read_file(file).map_err(|e| Error::persistence(file, e)))
			.collect::<Result<Vec<_>>>()?;

		info!("Training {name} on {} files from {}", texts.len(), dir.display());
		self.train_batch(name, texts)
	}

	/// Soft-deletes a corpus: its artifact is moved to the `.bak` sibling
	/// (replacing any older backup) and the corpus starts over empty.
	///
	/// Returns whether an artifact was moved.
	pub fn delete(&self, name: &str) -> Result<bool> {
		let Some(handle) = self.existing(name)? else {
			debug!("Deleted {name}, nothing was stored");
			return Ok(false);
		};
		let mut state = handle.state.write().map_err(|_| handle.poisoned())?;

		let moved = persistence::backup(&handle.path, &handle.backup_path)
			.map_err(|e| Error::persistence(&handle.path, e))?;
		*state = Some(Corpus::new(self.config.order)?);

		if moved {
			info!("Deleted {name}, backup at {}", handle.backup_path.display());
		} else {
			debug!("Deleted {name}, nothing was persisted");
		}
		Ok(moved)
	}

	/// Puts the backup of a deleted corpus back in place and reloads it.
	///
	/// Whatever was trained since the deletion is overwritten.
	pub fn restore(&self, name: &str) -> Result<Summary> {
		let handle = self.reader(name)?;
		let mut state = handle.state.write().map_err(|_| handle.poisoned())?;

		persistence::restore(&handle.backup_path, &handle.path)
			.map_err(|e| Error::persistence(&handle.backup_path, e))?;
		let corpus = handle.load(self.config.order)?;
		let summary = handle.summarize(&corpus);
		*state = Some(corpus);

		info!("Restored {name} from {}", handle.backup_path.display());
		Ok(summary)
	}

	/// Persists every loaded, trained corpus. Called on shutdown.
	///
	/// Returns how many corpora were written.
	pub fn flush_all(&self) -> Result<usize> {
		let handles: Vec<Arc<CorpusHandle>> = {
			let corpora = self.corpora.lock().map_err(|_| Error::Poisoned { name: "*".to_owned() })?;
			corpora.values().cloned().collect()
		};

		let mut flushed = 0;
		for handle in handles {
			let state = handle.state.read().map_err(|_| handle.poisoned())?;
			if let Some(corpus) = state.as_ref().filter(|corpus| corpus.training_events() > 0) {
				persistence::save(corpus, &handle.path).map_err(|e| Error::persistence(&handle.path, e))?;
				flushed += 1;
			}
		}
		debug!("Flushed {flushed} corpora");
		Ok(flushed)
	}

	/// Names of the corpora accessed since startup.
	pub fn loaded_corpora(&self) -> Vec<String> {
		let mut names: Vec<String> = match self.corpora.lock() {
			Ok(corpora) => corpora.values().filter(|h| h.is_loaded()).map(|h| h.name.clone()).collect(),
			Err(_) => Vec::new(),
		};
		names.sort();
		names
	}
}

/// Corpus names map to file names, so they are restricted to a safe alphabet.
fn is_valid_name(name: &str) -> bool {
	!name.is_empty()
		&& !name.starts_with('.')
		&& name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::vocabulary::TokenId;
	use tempfile::tempdir;

	fn manager(root: &Path) -> CorpusManager {
		CorpusManager::new(ManagerConfig { storage_root: root.to_path_buf(), ..ManagerConfig::default() }).unwrap()
	}

	#[test]
	fn names_are_restricted() {
		assert!(is_valid_name("py"));
		assert!(is_valid_name("py-3.12_lib"));
		for bad in ["", ".hidden", "../etc", "a/b", "a b", "py\\x"] {
			assert!(!is_valid_name(bad), "{bad:?} accepted");
		}
	}

	#[test]
	fn invalid_or_unknown_names_are_not_found() {
		let dir = tempdir().unwrap();
		let config = ManagerConfig {
			storage_root: dir.path().to_path_buf(),
			known_corpora: Some(HashSet::from(["py".to_owned()])),
			..ManagerConfig::default()
		};
		let manager = CorpusManager::new(config).unwrap();

		assert!(manager.summary("py").is_ok());
		assert!(matches!(manager.summary("js"), Err(Error::CorpusNotFound { .. })));
		assert!(matches!(manager.train("../py", "x"), Err(Error::CorpusNotFound { .. })));
	}

	#[test]
	fn order_zero_is_rejected() {
		let config = ManagerConfig { order: 0, ..ManagerConfig::default() };
		assert!(matches!(CorpusManager::new(config), Err(Error::InvalidOrder(0))));
	}

	#[test]
	fn loading_is_lazy() {
		let dir = tempdir().unwrap();
		let manager = manager(dir.path());
		assert!(manager.loaded_corpora().is_empty());

		let handle = manager.get_or_create("py").unwrap();
		assert!(handle.is_loaded());
		assert_eq!(handle.path(), dir.path().join("py.corpus"));
		assert_eq!(manager.loaded_corpora(), ["py"]);
		assert!(!handle.path().exists());
	}

	#[test]
	fn reads_of_unknown_names_stay_unregistered() {
		let dir = tempdir().unwrap();
		let manager = manager(dir.path());
		manager.train("py", "x = 1\n").unwrap();

		for name in ["random0", "random1"] {
			assert_eq!(manager.summary(name).unwrap().vocabulary_size, 0);
			assert!(manager.predict_text(name, "x", 3).unwrap().is_empty());
			assert!(manager.score(name, "x\n").is_ok());
			assert!(!manager.delete(name).unwrap());
			assert!(manager.restore(name).is_err());
			assert_eq!(manager.train(name, "# nothing\n").unwrap(), 0);
		}
		assert_eq!(manager.loaded_corpora(), ["py"]);
		assert_eq!(manager.corpora.lock().unwrap().len(), 1);

		// A stored corpus is picked up by a read
		let other = super::CorpusManager::new(manager.config.clone()).unwrap();
		assert_eq!(other.summary("py").unwrap().training_events, 1);
		assert_eq!(other.loaded_corpora(), ["py"]);
	}

	#[test]
	fn retraining_doubles_persisted_counts() {
		let dir = tempdir().unwrap();
		let count = |manager: &CorpusManager| {
			let handle = manager.get_or_create("py").unwrap();
			handle
				.read(DEFAULT_ORDER, |corpus| {
					let x = corpus.vocabulary().resolve("x");
					corpus.model().count(&[TokenId::START, TokenId::START], x)
				})
				.unwrap()
		};

		let manager = manager(dir.path());
		manager.train("py", "x = 1\n").unwrap();
		assert_eq!(count(&manager), 1);
		manager.train("py", "x = 1\n").unwrap();
		assert_eq!(count(&manager), 2);

		let reloaded = super::CorpusManager::new(manager.config.clone()).unwrap();
		assert_eq!(count(&reloaded), 2);
	}

	#[test]
	fn empty_training_is_a_no_op() {
		let dir = tempdir().unwrap();
		let manager = manager(dir.path());
		assert_eq!(manager.train("py", "# only a comment\n").unwrap(), 0);

		let summary = manager.summary("py").unwrap();
		assert_eq!(summary.training_events, 0);
		assert_eq!(summary.persisted_bytes, None);
	}

	#[test]
	fn flush_all_writes_trained_corpora_only() {
		let dir = tempdir().unwrap();
		let manager = manager(dir.path());
		manager.train("py", "x = 1\n").unwrap();
		manager.summary("empty").unwrap();

		std::fs::remove_file(dir.path().join("py.corpus")).unwrap();
		assert_eq!(manager.flush_all().unwrap(), 1);
		assert!(dir.path().join("py.corpus").exists());
		assert!(!dir.path().join("empty.corpus").exists());
	}
}
