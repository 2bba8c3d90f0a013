//! Shared test helpers: tracing setup and list verification.
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//!
//! #[test]
//! fn my_test() {
//!     common::init_tracing();
//!     // ... test code
//! }
//! ```
//!
//! # Configuration
//!
//! Environment variables:
//! - `RUST_LOG`: filter directives (e.g. `skiplock=debug,skiplock::lockset=trace`)
//! - `SKIPLOCK_LOG_DIR`: log directory (default: `logs/`)
//! - `SKIPLOCK_LOG_CONSOLE`: set to "0" to disable console output
//!
//! Library events only appear when the crate is built with
//! `--features tracing`; test-side events always do.
//!
//! # Log Files
//!
//! Logs go to `logs/skiplock.jsonl`, one JSON object per line:
//!
//! ```bash
//! # Retries for one key
//! cat logs/skiplock.jsonl | jq 'select(.fields.key == 42)'
//!
//! # Contention warnings only
//! cat logs/skiplock.jsonl | jq 'select(.level == "WARN")'
//! ```

#![allow(dead_code)]

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Once;

use skiplock::{Key, SkipList};
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

static INIT: Once = Once::new();

/// Install the console + NDJSON file subscriber. Only the first call acts.
pub fn init_tracing() {
    INIT.call_once(setup_tracing);
}

/// Where and how test logs are written.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub log_dir: PathBuf,
    pub log_file: String,
    pub console_enabled: bool,
    /// Used when `RUST_LOG` is unset.
    pub default_level: Level,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            log_file: "skiplock.jsonl".to_string(),
            console_enabled: true,
            default_level: Level::INFO,
        }
    }
}

impl TracingConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = env::var("SKIPLOCK_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        if env::var("SKIPLOCK_LOG_CONSOLE").is_ok_and(|v| v == "0") {
            config.console_enabled = false;
        }

        config
    }
}

fn make_filter(default_level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("{default_level}")))
}

fn setup_tracing() {
    let config = TracingConfig::from_env();

    let console_layer = config.console_enabled.then(|| {
        tracing_subscriber::fmt::layer()
            .with_thread_ids(true)
            .with_target(true)
            .with_line_number(true)
            .with_test_writer()
            .compact()
            .with_filter(make_filter(config.default_level))
    });

    // A read-only checkout should not fail the tests; skip the file layer.
    let file_layer = std::fs::create_dir_all(&config.log_dir)
        .and_then(|()| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(config.log_dir.join(&config.log_file))
        })
        .ok()
        .map(|file| {
            tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_thread_ids(true)
                .with_target(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE)
                .json()
                .with_filter(make_filter(config.default_level))
        });

    let _ = Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

// ============================================================================
//  Verification helpers
// ============================================================================

/// Assert every key in `keys` is present, listing the missing ones if not.
pub fn verify_present<V>(list: &SkipList<V>, keys: impl IntoIterator<Item = Key>, test_name: &str) {
    let missing: Vec<Key> = keys.into_iter().filter(|&k| !list.contains(k)).collect();
    assert!(
        missing.is_empty(),
        "{test_name}: {} keys missing, first few: {:?}\n{}",
        missing.len(),
        &missing[..missing.len().min(10)],
        list.stats()
    );
}

/// Assert no key in `keys` is present.
pub fn verify_absent<V>(list: &SkipList<V>, keys: impl IntoIterator<Item = Key>, test_name: &str) {
    let present: Vec<Key> = keys.into_iter().filter(|&k| list.contains(k)).collect();
    assert!(
        present.is_empty(),
        "{test_name}: {} removed keys still present, first few: {:?}",
        present.len(),
        &present[..present.len().min(10)]
    );
}

/// Structural self-check with the dump attached on failure (small lists only).
pub fn verify_structure<V>(list: &SkipList<V>, test_name: &str) {
    if let Err(violation) = list.check_invariants() {
        let dump = if list.len() <= 64 {
            list.dump()
        } else {
            format!("<{} keys, dump omitted>", list.len())
        };
        panic!("{test_name}: {violation}\n{dump}");
    }
}

/// Print contention counters when anything retried.
pub fn report_stats<V>(list: &SkipList<V>, test_name: &str) {
    let stats = list.stats();
    if stats.retries() > 0 {
        tracing::info!(test_name, retries = stats.retries(), "contention");
        eprintln!("\n*** {test_name} ***\n{stats}\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_init() {
        init_tracing();
        tracing::info!("tracing initialized");
        tracing::debug!(key = 42, "debug event");
    }
}
