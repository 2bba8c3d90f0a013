//! Benchmarks for `SkipList` using Divan.
//!
//! Run with: `cargo bench --bench skiplist`
//! With mimalloc: `cargo bench --bench skiplist --features mimalloc`
#![allow(clippy::pedantic)]
#![expect(clippy::unwrap_used)]

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use divan::{Bencher, black_box};
use skiplock::{Config, Key, SkipList};
use std::sync::Arc;
use std::thread;

fn main() {
    divan::main();
}

fn populated(n: usize) -> SkipList<u64> {
    let list = SkipList::with_config(Config::default().seed(42)).unwrap();
    for i in 0..n {
        list.insert(i as u64, i as Key);
    }
    list
}

/// Deterministic shuffled keys in `0..n`.
fn shuffled_keys(n: usize, seed: usize) -> Vec<Key> {
    let mut keys: Vec<Key> = (0..n as Key).collect();
    for i in 0..keys.len() {
        let j = (i.wrapping_mul(seed).wrapping_add(17)) % keys.len();
        keys.swap(i, j);
    }
    keys
}

// =============================================================================
// Construction
// =============================================================================

#[divan::bench_group]
mod construction {
    use super::{Config, SkipList};

    #[divan::bench]
    fn new_list() -> SkipList<u64> {
        SkipList::new()
    }

    #[divan::bench(args = [4, 16, 32])]
    fn with_max_level(max_level: usize) -> SkipList<u64> {
        SkipList::with_config(Config::default().max_level(max_level)).unwrap()
    }
}

// =============================================================================
// Insert Operations
// =============================================================================

#[divan::bench_group]
mod insert {
    use super::{Bencher, Key, SkipList, black_box, populated, shuffled_keys};

    #[divan::bench]
    fn insert_single(bencher: Bencher) {
        bencher
            .with_inputs(SkipList::<u64>::new)
            .bench_local_values(|list| {
                let _ = list.insert(black_box(42), black_box(7));
                list
            });
    }

    #[divan::bench(args = [100, 1_000, 10_000])]
    fn insert_into_populated(bencher: Bencher, n: usize) {
        bencher
            .with_inputs(|| populated(n))
            .bench_local_values(|list| {
                let _ = list.insert(black_box(0), black_box(-1));
                list
            });
    }

    #[divan::bench]
    fn insert_duplicate(bencher: Bencher) {
        let list = populated(1_000);
        bencher.bench_local(|| list.insert(black_box(0), black_box(500)));
    }

    #[divan::bench(args = [1_000, 10_000])]
    fn fill_sequential(bencher: Bencher, n: usize) {
        bencher
            .with_inputs(SkipList::<u64>::new)
            .bench_local_values(|list| {
                for i in 0..n {
                    list.insert(i as u64, i as Key);
                }
                list
            });
    }

    #[divan::bench(args = [1_000, 10_000])]
    fn fill_random(bencher: Bencher, n: usize) {
        let keys = shuffled_keys(n, 7919);
        bencher
            .with_inputs(SkipList::<u64>::new)
            .bench_local_values(|list| {
                for &k in &keys {
                    list.insert(0, k);
                }
                list
            });
    }
}

// =============================================================================
// Lookup Operations
// =============================================================================

#[divan::bench_group]
mod lookup {
    use super::{Bencher, Key, black_box, populated, shuffled_keys};

    #[divan::bench(args = [100, 10_000, 100_000])]
    fn contains_hit(bencher: Bencher, n: usize) {
        let list = populated(n);
        let lookups = shuffled_keys(n, 31);
        bencher.bench_local(|| {
            let mut hits = 0usize;
            for &k in lookups.iter().take(1_000) {
                hits += usize::from(list.contains(black_box(k)));
            }
            hits
        });
    }

    #[divan::bench(args = [100, 10_000, 100_000])]
    fn contains_miss(bencher: Bencher, n: usize) {
        let list = populated(n);
        bencher.bench_local(|| {
            let mut hits = 0usize;
            for k in 0..1_000 {
                hits += usize::from(list.contains(black_box(-(k as Key) - 1)));
            }
            hits
        });
    }

    #[divan::bench(args = [100, 10_000, 100_000])]
    fn get(bencher: Bencher, n: usize) {
        let list = populated(n);
        let lookups = shuffled_keys(n, 7);
        bencher.bench_local(|| {
            let mut sum = 0u64;
            for &k in lookups.iter().take(1_000) {
                if let Some(v) = list.get(black_box(k)) {
                    sum += v;
                }
            }
            sum
        });
    }
}

// =============================================================================
// Remove Operations
// =============================================================================

#[divan::bench_group]
mod remove {
    use super::{Bencher, Key, black_box, populated, shuffled_keys};

    #[divan::bench(args = [100, 10_000])]
    fn remove_single(bencher: Bencher, n: usize) {
        bencher
            .with_inputs(|| populated(n))
            .bench_local_values(|list| {
                let _ = list.remove(black_box((n / 2) as Key));
                list
            });
    }

    #[divan::bench]
    fn remove_missing(bencher: Bencher) {
        let list = populated(1_000);
        bencher.bench_local(|| list.remove(black_box(-5)));
    }

    #[divan::bench(args = [1_000, 10_000])]
    fn drain_random(bencher: Bencher, n: usize) {
        let keys = shuffled_keys(n, 104_729);
        bencher
            .with_inputs(|| populated(n))
            .bench_local_values(|list| {
                for &k in &keys {
                    list.remove(k);
                }
                list
            });
    }
}

// =============================================================================
// Concurrent Operations
// =============================================================================

#[divan::bench_group]
mod concurrent {
    use super::{Arc, Bencher, Key, SkipList, black_box, populated, thread};

    const OPS_PER_THREAD: usize = 5_000;

    #[divan::bench(args = [1, 2, 4, 8])]
    fn disjoint_inserts(bencher: Bencher, threads: usize) {
        bencher
            .with_inputs(|| Arc::new(SkipList::<u64>::new()))
            .bench_local_values(|list| {
                let handles: Vec<_> = (0..threads)
                    .map(|t| {
                        let list = Arc::clone(&list);
                        thread::spawn(move || {
                            let base = (t * OPS_PER_THREAD) as Key;
                            for i in 0..OPS_PER_THREAD {
                                list.insert(i as u64, base + i as Key);
                            }
                        })
                    })
                    .collect();

                for h in handles {
                    h.join().unwrap();
                }
                list
            });
    }

    #[divan::bench(args = [1, 2, 4, 8])]
    fn reads(bencher: Bencher, threads: usize) {
        let list = Arc::new(populated(100_000));

        bencher.bench_local(|| {
            let handles: Vec<_> = (0..threads)
                .map(|t| {
                    let list = Arc::clone(&list);
                    thread::spawn(move || {
                        let mut sum = 0u64;
                        let offset = t * 7919; // Prime offset per thread
                        for i in 0..OPS_PER_THREAD {
                            let k = ((i * 31 + offset) % 100_000) as Key;
                            if let Some(v) = list.get(k) {
                                sum += v;
                            }
                        }
                        black_box(sum);
                    })
                })
                .collect();

            for h in handles {
                h.join().unwrap();
            }
        });
    }

    /// Half inserts, half removes over a shared 1k key range.
    #[divan::bench(args = [1, 2, 4, 8])]
    fn contended_mixed(bencher: Bencher, threads: usize) {
        let list = Arc::new(populated(1_000));

        bencher.bench_local(|| {
            let handles: Vec<_> = (0..threads)
                .map(|t| {
                    let list = Arc::clone(&list);
                    thread::spawn(move || {
                        for i in 0..OPS_PER_THREAD {
                            let k = ((i * 7 + t * 131) % 1_000) as Key;
                            if (i + t) % 2 == 0 {
                                list.insert(0, k);
                            } else {
                                list.remove(k);
                            }
                        }
                    })
                })
                .collect();

            for h in handles {
                h.join().unwrap();
            }
        });
    }
}
