//! Dual moving-average crossover state.

use serde::{Deserialize, Serialize};

/// sign(fast - slow): golden = +1, dead = -1, none = 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossoverState {
    Golden,
    Dead,
    None,
}

impl CrossoverState {
    pub fn as_i8(self) -> i8 {
        match self {
            CrossoverState::Golden => 1,
            CrossoverState::Dead => -1,
            CrossoverState::None => 0,
        }
    }
}

/// NaN on either side (warmup) reports `None`.
pub fn crossover_state(fast: f64, slow: f64) -> CrossoverState {
    if fast.is_nan() || slow.is_nan() {
        return CrossoverState::None;
    }
    if fast > slow {
        CrossoverState::Golden
    } else if fast < slow {
        CrossoverState::Dead
    } else {
        CrossoverState::None
    }
}
