//! Scoped worker pool for independent jobs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Worker count when nothing else is configured.
pub fn default_threads() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(8)
}

/// Apply `f` to every item on up to `threads` workers.
///
/// Results come back in input order regardless of scheduling.
pub fn parallel_map<T, R, F>(items: &[T], threads: usize, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let workers = threads.max(1).min(items.len());
    if workers <= 1 {
        return items.iter().map(f).collect();
    }

    let next = AtomicUsize::new(0);
    let mut indexed: Vec<(usize, R)> = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(|| {
                    let mut done = Vec::new();
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(item) = items.get(index) else {
                            break;
                        };
                        done.push((index, f(item)));
                    }
                    done
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(done) => done,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });

    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, result)| result).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preserves_order() {
        let items: Vec<u64> = (0..100).collect();
        let squares = parallel_map(&items, 4, |&n| n * n);
        assert_eq!(squares, items.iter().map(|n| n * n).collect::<Vec<_>>());
    }

    #[test]
    fn test_single_thread_and_empty() {
        let empty: Vec<u8> = Vec::new();
        assert!(parallel_map(&empty, 8, |&b| b).is_empty());
        assert_eq!(parallel_map(&[1, 2, 3], 1, |&n| n + 1), vec![2, 3, 4]);
    }

    #[test]
    fn test_results_can_be_fallible() {
        let results = parallel_map(&[1, 0, 2], 3, |&n: &i32| if n == 0 { Err("zero") } else { Ok(n) });
        assert_eq!(results, vec![Ok(1), Err("zero"), Ok(2)]);
    }

    #[test]
    fn test_default_threads_is_bounded() {
        let threads = default_threads();
        assert!((1..=8).contains(&threads));
    }
}
