//! Stress tests for the providers.
//!
//! These helpers hammer the two pieces of state shared between threads:
//! the read-only registry and the static mutexes.

use hostvfs_core::{
    HostVfs, IoMethods, MutexKind, MutexMethods, OpenFlags, OsError, OsResult, Vfs,
};
use hostvfs_platform::PlatformFile;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Operations that were refused (busy or conflicting).
    pub refused_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Highest number of simultaneous holders observed.
    pub max_concurrent_holders: usize,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, refused: usize, duration: Duration, max_holders: usize) -> Self {
        Self {
            total_ops: successful + refused,
            successful_ops: successful,
            refused_ops: refused,
            duration,
            max_concurrent_holders: max_holders,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Refused: {}", self.refused_ops);
        println!("Max concurrent holders: {}", self.max_concurrent_holders);
        println!("Duration: {:?}", self.duration);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 1_000,
            threads: 4,
        }
    }
}

/// Tracks how many threads are inside a critical section at once.
#[derive(Debug, Default)]
struct Occupancy {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl Occupancy {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// Opens and closes one read-only file from many threads at once.
///
/// Every open either succeeds or is refused by the registry; the result's
/// `max_concurrent_holders` must never exceed one. Any other open failure
/// stops the run and is returned.
pub fn stress_read_only_opens<P>(
    vfs: &Arc<HostVfs<P>>,
    path: &Path,
    config: &StressConfig,
) -> OsResult<StressTestResult>
where
    P: PlatformFile + 'static,
{
    let occupancy = Arc::new(Occupancy::default());
    let successful = Arc::new(AtomicUsize::new(0));
    let refused = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let vfs = Arc::clone(vfs);
            let path: PathBuf = path.to_path_buf();
            let occupancy = Arc::clone(&occupancy);
            let (successful, refused) = (Arc::clone(&successful), Arc::clone(&refused));
            let operations = config.operations;

            thread::spawn(move || -> OsResult<()> {
                for _ in 0..operations {
                    match vfs.open(Some(path.as_path()), OpenFlags::READONLY) {
                        Ok(file) => {
                            occupancy.enter();
                            thread::yield_now();
                            occupancy.leave();
                            vfs.close(file.id)?;
                            successful.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(OsError::ReadOnlyConflict { .. }) => {
                            refused.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("stress thread panicked")?;
    }

    Ok(StressTestResult::new(
        successful.load(Ordering::Relaxed),
        refused.load(Ordering::Relaxed),
        start.elapsed(),
        occupancy.max(),
    ))
}

/// Increments a shared counter under a mutex of `kind` from many threads.
///
/// For a static kind every thread shares one mutex; dynamic kinds give
/// each thread its own.
///
/// Alternates `enter` and `try_enter`; a refused try counts as refused.
/// Returns the result and the final counter, which equals the number of
/// successful operations when the mutex excludes properly.
pub fn stress_mutex(
    mutexes: &Arc<dyn MutexMethods>,
    kind: MutexKind,
    config: &StressConfig,
) -> OsResult<(StressTestResult, usize)> {
    let counter = Arc::new(AtomicUsize::new(0));
    let occupancy = Arc::new(Occupancy::default());
    let refused = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let mutexes = Arc::clone(mutexes);
            let (counter, occupancy, refused) =
                (Arc::clone(&counter), Arc::clone(&occupancy), Arc::clone(&refused));
            let operations = config.operations;

            thread::spawn(move || -> OsResult<()> {
                let mutex = mutexes.alloc(kind)?;
                for i in 0..operations {
                    if i % 2 == 0 {
                        mutexes.enter(&mutex);
                    } else if !mutexes.try_enter(&mutex) {
                        refused.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                    occupancy.enter();
                    let value = counter.load(Ordering::Relaxed);
                    thread::yield_now();
                    counter.store(value + 1, Ordering::Relaxed);
                    occupancy.leave();
                    mutexes.leave(&mutex);
                }
                mutexes.free(mutex);
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("stress thread panicked")?;
    }

    let count = counter.load(Ordering::SeqCst);
    let successful = config.threads * config.operations - refused.load(Ordering::Relaxed);
    Ok((
        StressTestResult::new(
            successful,
            refused.load(Ordering::Relaxed),
            start.elapsed(),
            occupancy.max(),
        ),
        count,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::memory_vfs_with_read_only;
    use hostvfs_core::MutexProvider;

    fn small() -> StressConfig {
        StressConfig {
            operations: 200,
            threads: 4,
        }
    }

    #[test]
    fn read_only_registry_admits_one_holder() {
        let vfs = Arc::new(memory_vfs_with_read_only(&["/pak/content.db"]));
        let result =
            stress_read_only_opens(&vfs, Path::new("/pak/content.db"), &small()).unwrap();

        assert_eq!(result.max_concurrent_holders, 1);
        assert!(result.successful_ops > 0);
        assert_eq!(result.total_ops, 800);
        assert_eq!(vfs.open_file_count(), 0);
        assert!(vfs.registry().is_empty());
    }

    #[test]
    fn read_only_open_failures_other_than_conflict_are_returned() {
        let vfs = Arc::new(crate::fixtures::memory_vfs());
        let err = stress_read_only_opens(&vfs, Path::new("/pak/absent.db"), &small()).unwrap_err();
        assert!(matches!(err, OsError::Missing { .. }), "{err:?}");
    }

    #[test]
    fn static_mutex_excludes() {
        let provider = MutexProvider::new();
        provider.init().unwrap();
        let mutexes: Arc<dyn MutexMethods> = Arc::new(provider);

        let (result, count) =
            stress_mutex(&mutexes, MutexKind::StaticLru, &small()).unwrap();
        assert_eq!(result.max_concurrent_holders, 1);
        assert_eq!(count, result.successful_ops);
        assert!(count >= 400);
    }

    #[test]
    fn dynamic_mutexes_do_not_share() {
        let mutexes: Arc<dyn MutexMethods> = Arc::new(MutexProvider::new());
        let (result, _) = stress_mutex(&mutexes, MutexKind::Fast, &StressConfig {
            operations: 50,
            threads: 2,
        })
        .unwrap();
        assert_eq!(result.refused_ops, 0);
    }
}
