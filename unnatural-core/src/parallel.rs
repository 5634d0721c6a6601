use std::sync::{mpsc, Arc};
use std::thread;

/// How many chunks to cut per CPU core.
const CHUNKS_PER_CPU: usize = 8;

/// Splits `items` into chunks, runs `work` on each chunk in its own thread and
/// returns the per-chunk results in input order.
///
/// # Behavior
/// - Cuts `num_cpus * CHUNKS_PER_CPU` chunks (fewer when there are fewer items).
/// - Collects results through an MPSC channel, tagged with the chunk index.
/// - An empty input spawns nothing.
pub(crate) fn map_chunks<T, R, F>(items: Vec<T>, work: F) -> Vec<R>
where
	T: Send + 'static,
	R: Send + 'static,
	F: Fn(Vec<T>) -> R + Send + Sync + 'static,
{
	if items.is_empty() {
		return Vec::new();
	}

	let chunks = num_cpus::get() * CHUNKS_PER_CPU;
	let chunk_size = items.len().div_ceil(chunks).max(1);
	let work = Arc::new(work);

	let (tx, rx) = mpsc::channel();
	let mut items = items.into_iter().peekable();
	let mut spawned = 0;
	while items.peek().is_some() {
		let chunk: Vec<T> = items.by_ref().take(chunk_size).collect();
		let tx = tx.clone();
		let work = Arc::clone(&work);
		let index = spawned;

		thread::spawn(move || {
			// The receiver outlives every sender, a failed send means the caller is gone
			let _ = tx.send((index, work(chunk)));
		});
		spawned += 1;
	}
	drop(tx);

	let mut results: Vec<(usize, R)> = rx.iter().collect();
	results.sort_by_key(|(index, _)| *index);
	results.into_iter().map(|(_, result)| result).collect()
}
