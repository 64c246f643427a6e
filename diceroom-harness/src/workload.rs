//! Workload generation for convergence testing
//!
//! Generates the local actions a player takes: staging and unstaging dice,
//! rolling, and chatter that never touches the pool.

use diceroom_core::{DICE_TYPES, EMOJIS};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const COLORS: [&str; 5] = ["#dc143c", "#1e90ff", "#32cd32", "#ffd700", "#8a2be2"];

/// A single local action
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Stage a die
    Add { sides: u8 },
    /// Unstage one of our own dice, picked by index modulo our dice count
    Remove { pick: usize },
    /// Unstage all our dice
    Clear,
    /// Roll the whole pool
    Roll,
    /// Replace our dice with one die and roll
    Quick { sides: u8 },
    /// Change peer color
    Recolor { color: String },
    /// Send a reaction
    Emoji { emoji: String },
    /// Move the shared cursor
    Cursor { x: f64, y: f64 },
}

impl Operation {
    /// Whether the operation changes the pool
    pub fn touches_pool(&self) -> bool {
        matches!(
            self,
            Operation::Add { .. }
                | Operation::Remove { .. }
                | Operation::Clear
                | Operation::Roll
                | Operation::Quick { .. }
        )
    }
}

/// Workload configuration
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    /// Ratio of add operations (0.0-1.0)
    pub add_ratio: f64,
    /// Ratio of remove operations
    pub remove_ratio: f64,
    /// Ratio of clear operations
    pub clear_ratio: f64,
    /// Ratio of roll operations, a fifth of them quick rolls
    pub roll_ratio: f64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            add_ratio: 0.45,
            remove_ratio: 0.15,
            clear_ratio: 0.05,
            roll_ratio: 0.15,
        }
    }
}

/// Workload generator
pub struct WorkloadGenerator {
    config: WorkloadConfig,
    rng: StdRng,
}

impl WorkloadGenerator {
    /// Create a new workload generator
    pub fn new(config: WorkloadConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn sides(&mut self) -> u8 {
        DICE_TYPES[self.rng.gen_range(0..DICE_TYPES.len())]
    }

    /// Generate the next operation
    pub fn next(&mut self) -> Operation {
        let mut roll = self.rng.gen::<f64>();

        if roll < self.config.add_ratio {
            return Operation::Add { sides: self.sides() };
        }
        roll -= self.config.add_ratio;

        if roll < self.config.remove_ratio {
            return Operation::Remove {
                pick: self.rng.gen_range(0..64),
            };
        }
        roll -= self.config.remove_ratio;

        if roll < self.config.clear_ratio {
            return Operation::Clear;
        }
        roll -= self.config.clear_ratio;

        if roll < self.config.roll_ratio {
            if self.rng.gen_bool(0.2) {
                return Operation::Quick { sides: self.sides() };
            }
            return Operation::Roll;
        }

        match self.rng.gen_range(0..3) {
            0 => Operation::Recolor {
                color: COLORS.choose(&mut self.rng).copied().unwrap_or("#ffffff").to_string(),
            },
            1 => Operation::Emoji {
                emoji: EMOJIS.choose(&mut self.rng).copied().unwrap_or("👍").to_string(),
            },
            _ => Operation::Cursor {
                x: self.rng.gen_range(0.0..=1.0),
                y: self.rng.gen_range(0.0..=1.0),
            },
        }
    }

    /// Generate a batch of operations
    pub fn generate(&mut self, count: usize) -> Vec<Operation> {
        (0..count).map(|_| self.next()).collect()
    }
}
