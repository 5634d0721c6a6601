use std::path::{Path, PathBuf};
use std::{env, fs, io};

/// Extension of a persisted corpus.
pub(crate) const CORPUS_EXTENSION: &str = "corpus";
/// Extension appended to a soft-deleted corpus.
pub(crate) const BACKUP_EXTENSION: &str = "bak";

/// Reads a whole text file.
pub(crate) fn read_file<P: AsRef<Path>>(filename: P) -> io::Result<String> {
	fs::read_to_string(filename)
}

/// Builds the artifact path of a corpus.
///
/// Example:
/// `corpora` + `"py"` → `corpora/py.corpus`
pub(crate) fn build_corpus_path<P: AsRef<Path>>(root: P, name: &str) -> PathBuf {
	root.as_ref().join(format!("{name}.{CORPUS_EXTENSION}"))
}

/// Builds the backup sibling of an artifact.
///
/// Example:
/// `corpora/py.corpus` → `corpora/py.corpus.bak`
pub(crate) fn build_backup_path<P: AsRef<Path>>(artifact: P) -> PathBuf {
	let mut backup = artifact.as_ref().as_os_str().to_owned();
	backup.push(".");
	backup.push(BACKUP_EXTENSION);
	PathBuf::from(backup)
}

/// Normalize a folder path.
///
/// - `"."` or `"./"` resolves to the current working directory
/// - Other paths are returned as-is (not canonicalized)
pub(crate) fn normalize_folder(input: &str) -> PathBuf {
	if input == "." || input == "./" {
		env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
	} else {
		PathBuf::from(input)
	}
}

/// Lists all files with a given extension in a directory, sorted by name.
///
/// Returns full paths; subdirectories are ignored.
pub(crate) fn list_files<P: AsRef<Path>>(dir: P, extension: &str) -> io::Result<Vec<PathBuf>> {
	let mut files = Vec::new();

	for entry in fs::read_dir(dir)? {
		let path = entry?.path();
		if path.is_file() && path.extension() == Some(std::ffi::OsStr::new(extension)) {
			files.push(path);
		}
	}

	files.sort();
	Ok(files)
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn corpus_and_backup_paths() {
		let artifact = build_corpus_path("corpora", "py");
		assert_eq!(artifact, PathBuf::from("corpora/py.corpus"));
		assert_eq!(build_backup_path(&artifact), PathBuf::from("corpora/py.corpus.bak"));
	}

	#[test]
	fn lists_matching_files_only() {
		let dir = tempdir().unwrap();
		fs::write(dir.path().join("b.py"), "b = 1").unwrap();
		fs::write(dir.path().join("a.py"), "a = 1").unwrap();
		fs::write(dir.path().join("notes.txt"), "").unwrap();
		fs::create_dir(dir.path().join("pkg.py")).unwrap();

		let files = list_files(dir.path(), "py").unwrap();
		let names: Vec<&str> = files.iter().filter_map(|p| p.file_name()?.to_str()).collect();
		assert_eq!(names, ["a.py", "b.py"]);
		assert_eq!(read_file(&files[0]).unwrap(), "a = 1");
	}

	#[test]
	fn dot_is_current_dir() {
		assert_eq!(normalize_folder("./"), env::current_dir().unwrap());
		assert_eq!(normalize_folder("data"), PathBuf::from("data"));
	}
}
