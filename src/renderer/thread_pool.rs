use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use log::debug;

type Job = Arc<dyn Fn(usize) + Send + Sync>;

struct WorkerState {
    job: Option<Job>,
    busy: bool,
    exit: bool,
}

struct WorkerShared {
    state: Mutex<WorkerState>,
    signal: Condvar,
}

struct Worker {
    shared: Arc<WorkerShared>,
    handle: Option<JoinHandle<()>>,
}

/// A fixed pool of render threads. `run` is a synchronous barrier: it
/// installs a work function, wakes every worker, executes the function on
/// the calling thread as the last participant, and returns only once all
/// threads are idle again. Consecutive `run` calls never overlap, so a
/// later pass may freely read what an earlier pass wrote.
pub struct ThreadPool {
    workers: Vec<Worker>,
}

impl ThreadPool {
    /// A pool of `thread_count` participants: `thread_count - 1` spawned
    /// workers plus the thread that calls [`ThreadPool::run`].
    pub fn new(thread_count: usize) -> Self {
        let spawned = thread_count.max(1) - 1;
        debug!("spawning {} render worker threads", spawned);
        let workers = (0..spawned)
            .map(|idx| {
                let shared = Arc::new(WorkerShared {
                    state: Mutex::new(WorkerState {
                        job: None,
                        busy: false,
                        exit: false,
                    }),
                    signal: Condvar::new(),
                });
                let handle = {
                    let shared = Arc::clone(&shared);
                    std::thread::Builder::new()
                        .name(format!("render-{}", idx))
                        .spawn(move || worker_loop(&shared, idx))
                        .expect("Failed to spawn a render worker")
                };
                Worker {
                    shared,
                    handle: Some(handle),
                }
            })
            .collect();
        Self { workers }
    }

    /// Total participating threads, including the caller.
    pub fn thread_count(&self) -> usize {
        self.workers.len() + 1
    }

    pub fn run(&self, job: impl Fn(usize) + Send + Sync + 'static) {
        let job: Job = Arc::new(job);
        for worker in &self.workers {
            let mut state = lock(&worker.shared.state);
            state.job = Some(Arc::clone(&job));
            drop(state);
            worker.shared.signal.notify_all();
        }

        // The caller is the last participant
        job(self.workers.len());

        for worker in &self.workers {
            let mut state = lock(&worker.shared.state);
            while state.job.is_some() || state.busy {
                state = wait(&worker.shared.signal, state);
            }
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        for worker in &mut self.workers {
            {
                let mut state = lock(&worker.shared.state);
                state.exit = true;
            }
            worker.shared.signal.notify_all();
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

fn worker_loop(shared: &WorkerShared, idx: usize) {
    loop {
        let job = {
            let mut state = lock(&shared.state);
            loop {
                if state.exit {
                    return;
                }
                if let Some(job) = state.job.take() {
                    state.busy = true;
                    break job;
                }
                state = wait(&shared.signal, state);
            }
        };
        job(idx);
        let mut state = lock(&shared.state);
        state.busy = false;
        drop(state);
        shared.signal.notify_all();
    }
}

// A worker can only panic if the installed job panics; propagating that to
// the whole render is the right call anyway, so poisoning is ignored.
fn lock(mutex: &Mutex<WorkerState>) -> std::sync::MutexGuard<'_, WorkerState> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn wait<'a>(
    signal: &Condvar,
    guard: std::sync::MutexGuard<'a, WorkerState>,
) -> std::sync::MutexGuard<'a, WorkerState> {
    match signal.wait(guard) {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn run_acts_as_a_barrier() {
        let pool = ThreadPool::new(4);
        assert_eq!(pool.thread_count(), 4);

        // Every thread stamps cells it claims off a shared cursor; after
        // run returns, no cell may be left untouched
        let cells: Arc<Vec<AtomicUsize>> =
            Arc::new((0..1024).map(|_| AtomicUsize::new(usize::MAX)).collect());
        let cursor = Arc::new(AtomicUsize::new(0));
        {
            let cells = Arc::clone(&cells);
            let cursor = Arc::clone(&cursor);
            pool.run(move |thread_idx| loop {
                let i = cursor.fetch_add(1, Ordering::SeqCst);
                if i >= cells.len() {
                    break;
                }
                cells[i].store(thread_idx, Ordering::SeqCst);
            });
        }
        for cell in cells.iter() {
            assert!(cell.load(Ordering::SeqCst) < 4);
        }
    }

    #[test]
    fn runs_are_sequenced() {
        let pool = ThreadPool::new(3);
        let counter = Arc::new(AtomicUsize::new(0));
        // Each pass adds thread_count; passes never interleave, so after
        // each run the counter is an exact multiple
        for pass in 1usize..=5 {
            let pass_counter = Arc::clone(&counter);
            pool.run(move |_| {
                pass_counter.fetch_add(1, Ordering::SeqCst);
            });
            assert_eq!(counter.load(Ordering::SeqCst), pass * 3);
        }
    }

    #[test]
    fn single_threaded_pool_runs_on_the_caller() {
        let pool = ThreadPool::new(1);
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = Arc::clone(&ran);
        pool.run(move |thread_idx| {
            assert_eq!(thread_idx, 0);
            ran_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
