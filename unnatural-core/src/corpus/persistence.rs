use std::fs;
use std::io::{self, Write};
use std::path::Path;

use log::debug;
use serde::Serialize;
use tempfile::NamedTempFile;

use super::Corpus;
use crate::error::PersistenceError;

/// Version of the on-disk corpus layout.
pub const FORMAT_VERSION: u16 = 1;

#[derive(Serialize)]
struct PersistedCorpus<'a> {
	format_version: u16,
	corpus: &'a Corpus,
}

/// Writes `corpus` to `path` atomically and returns the number of bytes written.
///
/// The artifact is written to a temporary file in the same directory, synced,
/// then renamed over `path`, so a failed save never leaves a torn file.
pub fn save(corpus: &Corpus, path: &Path) -> Result<u64, PersistenceError> {
	let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
	fs::create_dir_all(parent_dir)?;

	let bytes = postcard::to_stdvec(&PersistedCorpus { format_version: FORMAT_VERSION, corpus })?;

	let mut temp_file = NamedTempFile::new_in(parent_dir)?;
	temp_file.write_all(&bytes)?;
	temp_file.as_file().sync_all()?;
	temp_file.persist(path).map_err(|e| e.error)?;

	debug!("Saved {} bytes to {}", bytes.len(), path.display());
	Ok(bytes.len() as u64)
}

/// Reads a corpus from `path`. A missing file is `Ok(None)`.
pub fn load(path: &Path) -> Result<Option<Corpus>, PersistenceError> {
	let bytes = match fs::read(path) {
		Ok(bytes) => bytes,
		Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
		Err(e) => return Err(e.into()),
	};

	let (format_version, rest): (u16, _) = postcard::take_from_bytes(&bytes)?;
	if format_version != FORMAT_VERSION {
		return Err(PersistenceError::Version { found: format_version, expected: FORMAT_VERSION });
	}
	let mut corpus: Corpus = postcard::from_bytes(rest)?;
	corpus.reindex().map_err(PersistenceError::Corrupt)?;

	debug!("Loaded {} bytes from {}", bytes.len(), path.display());
	Ok(Some(corpus))
}

/// Moves `path` to `backup`, replacing any previous backup.
///
/// Returns `false` when there was nothing to move.
pub fn backup(path: &Path, backup: &Path) -> Result<bool, PersistenceError> {
	if !path.exists() {
		return Ok(false);
	}
	replace(path, backup)?;
	Ok(true)
}

/// Moves `backup` back over `path`.
pub fn restore(backup: &Path, path: &Path) -> Result<(), PersistenceError> {
	if !backup.exists() {
		return Err(io::Error::new(io::ErrorKind::NotFound, "no backup to restore").into());
	}
	replace(backup, path)
}

/// Size of the artifact on disk, if any.
pub fn persisted_size(path: &Path) -> Option<u64> {
	fs::metadata(path).ok().map(|metadata| metadata.len())
}

fn replace(from: &Path, to: &Path) -> Result<(), PersistenceError> {
	// rename does not overwrite on every platform
	match fs::remove_file(to) {
		Ok(()) => (),
		Err(e) if e.kind() == io::ErrorKind::NotFound => (),
		Err(e) => return Err(e.into()),
	}
	fs::rename(from, to)?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tokenizer::tokenize;
	use tempfile::tempdir;

	fn trained() -> Corpus {
		let mut corpus = Corpus::new(3).unwrap();
		corpus.train(&tokenize("import os\nprint(os.sep)\n", false).unwrap());
		corpus
	}

	#[test]
	fn save_then_load() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("nested").join("py.corpus");
		let corpus = trained();

		let written = save(&corpus, &path).unwrap();
		assert_eq!(persisted_size(&path), Some(written));

		let loaded = load(&path).unwrap().unwrap();
		assert_eq!(loaded.model(), corpus.model());
		assert_eq!(loaded.training_events(), 1);
		assert_eq!(loaded.vocabulary().id_of("print"), corpus.vocabulary().id_of("print"));
	}

	#[test]
	fn missing_file_loads_as_none() {
		let dir = tempdir().unwrap();
		assert!(load(&dir.path().join("absent.corpus")).unwrap().is_none());
	}

	#[test]
	fn foreign_version_is_rejected() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("py.corpus");
		let mut bytes = postcard::to_stdvec(&(FORMAT_VERSION + 1)).unwrap();
		bytes.extend_from_slice(&[0, 0, 0]);
		fs::write(&path, bytes).unwrap();

		assert!(matches!(load(&path), Err(PersistenceError::Version { .. })));
	}

	#[test]
	fn inconsistent_store_is_corrupt() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("py.corpus");

		// Empty vocabulary, order 5 store without any table, one event
		let empty: Vec<u8> = Vec::new();
		for order in [5usize, 0] {
			let bytes = postcard::to_stdvec(&(FORMAT_VERSION, &empty, (order, &empty), 1u64)).unwrap();
			fs::write(&path, bytes).unwrap();
			assert!(matches!(load(&path), Err(PersistenceError::Corrupt(_))), "order {order} accepted");
		}
	}

	#[test]
	fn garbage_is_a_codec_error() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("py.corpus");
		fs::write(&path, [1u8, 0xff, 0xff]).unwrap();
		assert!(matches!(load(&path), Err(PersistenceError::Codec(_))));
	}

	#[test]
	fn backup_overwrites_and_restore_moves_back() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("py.corpus");
		let bak = dir.path().join("py.corpus.bak");

		assert!(!backup(&path, &bak).unwrap());

		fs::write(&bak, b"old backup").unwrap();
		fs::write(&path, b"current").unwrap();
		assert!(backup(&path, &bak).unwrap());
		assert!(!path.exists());
		assert_eq!(fs::read(&bak).unwrap(), b"current");

		restore(&bak, &path).unwrap();
		assert_eq!(fs::read(&path).unwrap(), b"current");
		assert!(restore(&bak, &path).is_err());
	}
}
