//! Construction parameters for [`SkipList`](crate::SkipList).
//!
//! A [`Config`] is validated once, when the list is built, and is immutable
//! afterwards.
//!
//! ```rust
//! use std::time::Duration;
//! use skiplock::{Config, SkipList};
//!
//! let config = Config::default()
//!     .probability(0.25)
//!     .max_level(12)
//!     .seed(7)
//!     .lock_timeout(Duration::from_millis(5));
//! let list: SkipList<String> = SkipList::with_config(config).unwrap();
//! assert_eq!(list.config().max_level, 12);
//! ```

use std::fmt as StdFmt;
use std::time::Duration;

/// Largest accepted `max_level`.
pub const MAX_LEVEL_LIMIT: usize = 64;

/// Default promotion probability.
pub const DEFAULT_PROBABILITY: f64 = 0.5;

/// Default level cap.
pub const DEFAULT_MAX_LEVEL: usize = 16;

/// Default bound on a single node-lock wait.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(10);

/// Environment variable read by [`Config::from_env`] for `probability`.
pub const ENV_PROBABILITY: &str = "SKIPLOCK_PROBABILITY";
/// Environment variable read by [`Config::from_env`] for `max_level`.
pub const ENV_MAX_LEVEL: &str = "SKIPLOCK_MAX_LEVEL";
/// Environment variable read by [`Config::from_env`] for `seed`.
pub const ENV_SEED: &str = "SKIPLOCK_SEED";
/// Environment variable read by [`Config::from_env`] for `lock_timeout`, in milliseconds.
pub const ENV_LOCK_TIMEOUT_MS: &str = "SKIPLOCK_LOCK_TIMEOUT_MS";

// ============================================================================
//  ConfigError
// ============================================================================

/// Rejected construction parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Probability outside the open interval (0, 1), or not a number.
    InvalidProbability(f64),

    /// `max_level` of zero or above [`MAX_LEVEL_LIMIT`].
    InvalidMaxLevel(usize),

    /// A zero lock timeout would make every contended acquisition fail.
    InvalidLockTimeout(Duration),

    /// An environment variable was set but could not be parsed.
    InvalidEnvVar {
        /// Variable name.
        name: &'static str,
        /// Raw value found.
        value: String,
    },
}

impl StdFmt::Display for ConfigError {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::InvalidProbability(p) => {
                write!(f, "probability must be in (0, 1), got {p}")
            }

            Self::InvalidMaxLevel(level) => {
                write!(
                    f,
                    "max_level must be in 1..={MAX_LEVEL_LIMIT}, got {level}"
                )
            }

            Self::InvalidLockTimeout(timeout) => {
                write!(f, "lock_timeout must be non-zero, got {timeout:?}")
            }

            Self::InvalidEnvVar { name, value } => {
                write!(f, "cannot parse {name}={value:?}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
//  Config
// ============================================================================

/// Skip list parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// Chance that a node is promoted one more level.
    pub probability: f64,

    /// Upper bound on the number of levels.
    pub max_level: usize,

    /// Seed for the height generator. `None` seeds from OS entropy.
    pub seed: Option<u64>,

    /// How long one node-lock acquisition may wait before the whole lock set
    /// is released and the operation retried.
    pub lock_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            probability: DEFAULT_PROBABILITY,
            max_level: DEFAULT_MAX_LEVEL,
            seed: None,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl Config {
    /// Set the promotion probability.
    #[must_use]
    pub const fn probability(mut self, probability: f64) -> Self {
        self.probability = probability;
        self
    }

    /// Set the level cap.
    #[must_use]
    pub const fn max_level(mut self, max_level: usize) -> Self {
        self.max_level = max_level;
        self
    }

    /// Fix the height generator seed.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the per-lock wait bound.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Check every parameter against its limits.
    ///
    /// # Errors
    ///
    /// Returns the first parameter that is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // NaN fails both comparisons.
        if !(self.probability > 0.0 && self.probability < 1.0) {
            return Err(ConfigError::InvalidProbability(self.probability));
        }

        if self.max_level == 0 || self.max_level > MAX_LEVEL_LIMIT {
            return Err(ConfigError::InvalidMaxLevel(self.max_level));
        }

        if self.lock_timeout.is_zero() {
            return Err(ConfigError::InvalidLockTimeout(self.lock_timeout));
        }

        Ok(())
    }

    /// Defaults overridden by `SKIPLOCK_*` environment variables.
    ///
    /// Unset variables keep their default. The result is validated.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidEnvVar`] if a variable does not parse, or the
    /// range error from [`Config::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// [`Config::from_env`] over an arbitrary variable source.
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(p) = parse_var::<f64, _>(&lookup, ENV_PROBABILITY)? {
            config.probability = p;
        }
        if let Some(level) = parse_var::<usize, _>(&lookup, ENV_MAX_LEVEL)? {
            config.max_level = level;
        }
        if let Some(seed) = parse_var::<u64, _>(&lookup, ENV_SEED)? {
            config.seed = Some(seed);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_LOCK_TIMEOUT_MS)? {
            config.lock_timeout = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&'static str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };

    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidEnvVar { name, value: raw })
}
