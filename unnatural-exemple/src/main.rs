use unnatural_core::{CorpusManager, ManagerConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	// Corpora are stored in (and lazily loaded from) the "corpora" directory
	let manager = CorpusManager::new(ManagerConfig { storage_root: "./corpora".into(), ..ManagerConfig::default() })?;

	// Train the "py" corpus on every .py file of the "data" directory.
	// Files are tokenized and counted in parallel, then flushed once
	let tokens = manager.train_files("py", "./data", "py")?;
	println!("Trained on {tokens} tokens");

	let summary = manager.summary("py")?;
	println!(
		"{}: {} words ({} tokens), {} training events, {} n-grams of order <= {}",
		summary.name,
		summary.vocabulary_size,
		summary.token_count,
		summary.training_events,
		summary.ngram_count,
		summary.order
	);

	// A complete snippet: the last line is closed and indentation unwound
	for token in manager.tokenize("py", "if ready:\n    go()", false)? {
		println!("{:>10}  {}", format!("{:?}", token.kind()), token.surface());
	}

	// The prefix is read mid-line: no NEWLINE is appended to it
	for candidate in manager.predict_text("py", "for i in range(", 5)? {
		println!("{:>12}  {:.4}", candidate.token, candidate.probability);
	}

	// Natural code scores lower (fewer bits per token) than shuffled code
	let natural = manager.score("py", "for i in range(10):\n    print(i)\n")?;
	let shuffled = manager.score("py", "range print for(i in):\n    (10 i)\n")?;
	println!("Cross-entropy natural={natural:.3} shuffled={shuffled:.3}");

	// Unknown corpus names are rejected
	match manager.summary("../etc") {
		Ok(_) => println!("Should not happen"),
		Err(e) => println!("{e}"),
	}

	// Soft delete keeps the artifact as a backup; restore puts it back
	manager.delete("py")?;
	println!("After delete: {} training events", manager.summary("py")?.training_events);
	println!("After restore: {} training events", manager.restore("py")?.training_events);

	Ok(())
}
