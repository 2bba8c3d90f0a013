//! Randomized level draw for new keys.

use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Coin-flip height generator shared by all inserting threads.
#[derive(Debug)]
pub(crate) struct HeightOracle {
    rng: Mutex<SmallRng>,
    probability: f64,
    max_level: usize,
}

impl HeightOracle {
    pub(crate) fn new(probability: f64, max_level: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };

        Self {
            rng: Mutex::new(rng),
            probability,
            max_level,
        }
    }

    /// Number of levels for a new key.
    ///
    /// Starts at 1 and adds a level per successful flip. Never exceeds
    /// `max_level`, nor `current_height + 1`, so the list grows by at most one
    /// level per insert.
    pub(crate) fn draw(&self, current_height: usize) -> usize {
        let cap = self.max_level.min(current_height.saturating_add(1));
        let mut rng = self.rng.lock();

        let mut height = 1;
        while height < cap && rng.gen_bool(self.probability) {
            height += 1;
        }
        height
    }
}
