//! Driver binary: runs the sequential and parallel workloads against a
//! `SkipList` and verifies the results as it goes.
//!
//! A watchdog reports any worker that makes no progress for two seconds,
//! which is how a lock-ordering bug shows up in practice.
//!
//! Run with:
//! ```bash
//! cargo run --release --bin skiplock-driver
//! RUST_LOG=skiplock=debug cargo run --features tracing --bin skiplock-driver
//! SKIPLOCK_PROBABILITY=0.25 SKIPLOCK_SEED=7 cargo run --bin skiplock-driver
//! ```

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use skiplock::{Config, Key, SkipList};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const ADD_SIZE: i64 = 15;
const REMOVE_SIZE: usize = 10;
const SEQUENTIAL_MAX_LEVEL: usize = 19;
const OPS_PER_THREAD: usize = 20;
const THREADS: usize = 4;
const ROUNDS: usize = 10;

const STRESS_THREADS: usize = 8;
const STRESS_OPS: usize = 50_000;
const CONTENTION_KEYS: i64 = 256;

const STALL_REPORT_MS: u64 = 2_000;

// =============================================================================
// Thread progress tracking for stall detection
// =============================================================================

struct ThreadProgress {
    /// Current operation index per thread.
    current_op: Vec<AtomicUsize>,
    /// Key being processed per thread.
    current_key: Vec<AtomicI64>,
    /// Last time each thread made progress.
    last_progress_ms: Vec<AtomicU64>,
    done: Vec<AtomicBool>,
    start: Instant,
}

impl ThreadProgress {
    fn new(threads: usize) -> Self {
        Self {
            current_op: (0..threads).map(|_| AtomicUsize::new(0)).collect(),
            current_key: (0..threads).map(|_| AtomicI64::new(0)).collect(),
            last_progress_ms: (0..threads).map(|_| AtomicU64::new(0)).collect(),
            done: (0..threads).map(|_| AtomicBool::new(false)).collect(),
            start: Instant::now(),
        }
    }

    fn update(&self, thread_id: usize, op: usize, key: Key) {
        self.current_op[thread_id].store(op, Ordering::Relaxed);
        self.current_key[thread_id].store(key, Ordering::Relaxed);
        self.last_progress_ms[thread_id]
            .store(self.start.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    fn mark_done(&self, thread_id: usize) {
        self.done[thread_id].store(true, Ordering::Relaxed);
    }

    /// `(thread, op, key, stalled_ms)` for every thread idle past `timeout_ms`.
    fn stalled(&self, timeout_ms: u64) -> Vec<(usize, usize, Key, u64)> {
        let now_ms = self.start.elapsed().as_millis() as u64;
        (0..self.done.len())
            .filter(|&i| !self.done[i].load(Ordering::Relaxed))
            .filter_map(|i| {
                let last = self.last_progress_ms[i].load(Ordering::Relaxed);
                let idle = now_ms.saturating_sub(last);
                (idle > timeout_ms).then(|| {
                    (
                        i,
                        self.current_op[i].load(Ordering::Relaxed),
                        self.current_key[i].load(Ordering::Relaxed),
                        idle,
                    )
                })
            })
            .collect()
    }

    fn all_done(&self) -> bool {
        self.done.iter().all(|d| d.load(Ordering::Relaxed))
    }
}

/// Spawn a watchdog that prints stalled threads until all are done.
fn spawn_watchdog(progress: Arc<ThreadProgress>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while !progress.all_done() {
            thread::sleep(Duration::from_millis(100));
            for (tid, op, key, idle) in progress.stalled(STALL_REPORT_MS) {
                eprintln!("!!! STALLED: thread {tid} at op {op} key={key} for {idle}ms");
            }
        }
    })
}

// =============================================================================
// Sequential workload
// =============================================================================

fn run_sequential(base: Config) -> Result<(), Box<dyn Error>> {
    let list: SkipList<i64> = SkipList::with_config(base.max_level(SEQUENTIAL_MAX_LEVEL))?;
    let mut rng = rand::thread_rng();

    for key in 0..ADD_SIZE {
        println!("------Inserting {key}------");
        assert!(list.insert(rng.gen_range(0..ADD_SIZE), key));
        print!("{list}");
    }
    assert_eq!(list.len(), ADD_SIZE as usize);

    let removals: Vec<Key> = (0..REMOVE_SIZE)
        .map(|_| rng.gen_range(0..ADD_SIZE))
        .collect();
    let mut expected = list.len();

    for key in removals {
        println!("------Removing {key}------");
        if list.contains(key) {
            assert!(list.remove(key));
            expected -= 1;
        } else {
            assert!(!list.remove(key));
        }
        print!("{list}");
        assert!(!list.contains(key));
    }

    assert_eq!(list.len(), expected);
    list.check_invariants()?;
    Ok(())
}

// =============================================================================
// Parallel workload: private key blocks
// =============================================================================

fn run_parallel(base: Config, threads: usize, ops_per_thread: usize) -> Result<(), Box<dyn Error>> {
    let list: Arc<SkipList<usize>> = Arc::new(SkipList::with_config(base)?);
    let progress = Arc::new(ThreadProgress::new(threads));
    let watchdog = spawn_watchdog(Arc::clone(&progress));
    let start = Instant::now();

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let list = Arc::clone(&list);
            let progress = Arc::clone(&progress);
            thread::spawn(move || {
                let base_key = (t * ops_per_thread) as Key;
                let mut inserted = 0;
                let mut found = 0;

                for i in 0..ops_per_thread {
                    let key = base_key + i as Key;
                    progress.update(t, i, key);
                    if list.insert(i, key) {
                        inserted += 1;
                    }
                }
                for i in 0..ops_per_thread {
                    let key = base_key + i as Key;
                    progress.update(t, ops_per_thread + i, key);
                    if list.contains(key) {
                        found += 1;
                    }
                }

                progress.mark_done(t);
                (inserted, found)
            })
        })
        .collect();

    let mut inserted = 0;
    let mut found = 0;
    for handle in handles {
        let (i, f) = handle.join().map_err(|_| "worker panicked")?;
        inserted += i;
        found += f;
    }
    let _ = watchdog.join();

    let elapsed = start.elapsed();
    let total = threads * ops_per_thread;
    assert_eq!(inserted, total);
    assert_eq!(found, total);
    assert_eq!(list.len(), total);
    list.check_invariants()?;

    if total >= 10_000 {
        println!(
            "parallel: {total} inserts in {elapsed:?} ({:.0} ops/sec), height {}",
            total as f64 / elapsed.as_secs_f64(),
            list.height()
        );
    }
    Ok(())
}

// =============================================================================
// Contention workload: shared key space, mixed operations
// =============================================================================

fn run_contention(base: Config, threads: usize, ops_per_thread: usize) -> Result<(), Box<dyn Error>> {
    let list: Arc<SkipList<u64>> = Arc::new(SkipList::with_config(base)?);
    let progress = Arc::new(ThreadProgress::new(threads));
    let watchdog = spawn_watchdog(Arc::clone(&progress));
    let start = Instant::now();

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let list = Arc::clone(&list);
            let progress = Arc::clone(&progress);
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                let mut net: i64 = 0;
                for op in 0..ops_per_thread {
                    let key = rng.gen_range(0..CONTENTION_KEYS);
                    progress.update(t, op, key);
                    if rng.gen_bool(0.5) {
                        if list.insert(op as u64, key) {
                            net += 1;
                        }
                    } else if list.remove(key) {
                        net -= 1;
                    }
                }
                progress.mark_done(t);
                net
            })
        })
        .collect();

    let mut net: i64 = 0;
    for handle in handles {
        net += handle.join().map_err(|_| "worker panicked")?;
    }
    let _ = watchdog.join();

    assert_eq!(list.len() as i64, net);
    list.check_invariants()?;
    println!(
        "contention: {} ops in {:?}, final len {}, height {}\n{}",
        threads * ops_per_thread,
        start.elapsed(),
        list.len(),
        list.height(),
        list.stats()
    );
    Ok(())
}

// =============================================================================
// Main
// =============================================================================

#[cfg(feature = "tracing")]
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("skiplock=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(true)
        .with_target(true)
        .compact()
        .try_init();
}

#[cfg(not(feature = "tracing"))]
const fn init_tracing() {}

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let base = Config::from_env()?;

    eprintln!("SkipList driver ({base:?})");
    eprintln!("Watchdog reports any thread stalled for >{STALL_REPORT_MS}ms.");

    println!("Beginning sequential SkipList tests...");
    for _ in 0..ROUNDS {
        run_sequential(base)?;
    }
    println!("Successful completion of sequential SkipList tests.");

    println!("Beginning concurrent SkipList tests...");
    for _ in 0..ROUNDS {
        run_parallel(base, THREADS, OPS_PER_THREAD)?;
    }
    println!("Successful completion of concurrent SkipList tests.");

    println!("Beginning stress runs ({STRESS_THREADS} threads, {STRESS_OPS} ops/thread)...");
    run_parallel(base, STRESS_THREADS, STRESS_OPS)?;
    run_contention(base, STRESS_THREADS, STRESS_OPS)?;

    println!("All runs completed.");
    Ok(())
}
