//! Traffic priority classes and their contention-probability schedules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ChainError, Result};

/// Fewest backoff states a reference class is given, so every class has a
/// fresh state, a first-failure state and at least one halved state.
const MIN_REFERENCE_BACKOFF_STATES: usize = 2;

/// Static description of one traffic class.
///
/// Immutable once built; construct through [`PriorityClassConfig::new`] or
/// [`UserPriority::config`] so the parameters are always validated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriorityClassConfig {
    max_contention_probability: f64,
    min_contention_probability: f64,
    backoff_state_count: usize,
}

impl PriorityClassConfig {
    /// Creates a validated class configuration.
    ///
    /// # Errors
    ///
    /// - `ChainError::InvalidConfig` - Either probability is outside (0,1),
    ///   the minimum exceeds the maximum, or `backoff_state_count` is zero
    pub fn new(
        max_contention_probability: f64,
        min_contention_probability: f64,
        backoff_state_count: usize,
    ) -> Result<Self> {
        validate_open_unit("maximum contention probability", max_contention_probability)?;
        validate_open_unit("minimum contention probability", min_contention_probability)?;

        if min_contention_probability > max_contention_probability {
            return Err(ChainError::InvalidConfig {
                reason: format!(
                    "minimum contention probability {min_contention_probability} exceeds maximum {max_contention_probability}"
                ),
            });
        }

        if backoff_state_count < 1 {
            return Err(ChainError::InvalidConfig {
                reason: "at least one backoff state is required".to_string(),
            });
        }

        Ok(Self {
            max_contention_probability,
            min_contention_probability,
            backoff_state_count,
        })
    }

    /// Contention probability of the fresh state.
    pub fn max_contention_probability(&self) -> f64 {
        self.max_contention_probability
    }

    /// Floor the contention probability never drops below.
    pub fn min_contention_probability(&self) -> f64 {
        self.min_contention_probability
    }

    /// Number of backoff states after the fresh state.
    pub fn backoff_state_count(&self) -> usize {
        self.backoff_state_count
    }

    /// Index of the ceiling state.
    pub fn last_index(&self) -> usize {
        self.backoff_state_count
    }

    /// Contention probability assigned to the state reached after `index`
    /// consecutive failures.
    ///
    /// States 0 and 1 use the maximum; every further pair of failures halves
    /// the value until it is clamped at the class minimum.
    pub fn contention_probability(&self, index: usize) -> f64 {
        let halvings = i32::try_from(index / 2).unwrap_or(i32::MAX);
        (self.max_contention_probability * 0.5f64.powi(halvings))
            .max(self.min_contention_probability)
    }

    /// Returns a copy with a different number of backoff states.
    ///
    /// # Errors
    ///
    /// - `ChainError::InvalidConfig` - `backoff_state_count` is zero
    pub fn with_backoff_state_count(self, backoff_state_count: usize) -> Result<Self> {
        Self::new(
            self.max_contention_probability,
            self.min_contention_probability,
            backoff_state_count,
        )
    }
}

fn validate_open_unit(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(ChainError::InvalidConfig {
            reason: format!("{name} {value} is outside (0, 1)"),
        })
    }
}

/// IEEE 802.15.6 user priorities with a representable contention range.
///
/// UP7 is absent: its maximum contention probability is exactly 1, which
/// leaves the chain without an idle slot and without a steady state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum UserPriority {
    /// Background traffic
    Up0,
    /// Best effort
    Up1,
    /// Excellent effort
    Up2,
    /// Video
    Up3,
    /// Voice
    Up4,
    /// Medical data or network control
    Up5,
    /// High-priority medical data or network control
    Up6,
}

impl UserPriority {
    /// Every reference class, lowest priority first.
    pub const ALL: [UserPriority; 7] = [
        UserPriority::Up0,
        UserPriority::Up1,
        UserPriority::Up2,
        UserPriority::Up3,
        UserPriority::Up4,
        UserPriority::Up5,
        UserPriority::Up6,
    ];

    /// (CPmax, CPmin) pair of the standard's contention-probability table.
    pub fn contention_bounds(self) -> (f64, f64) {
        match self {
            UserPriority::Up0 => (1.0 / 8.0, 1.0 / 16.0),
            UserPriority::Up1 => (1.0 / 8.0, 3.0 / 32.0),
            UserPriority::Up2 => (1.0 / 4.0, 3.0 / 32.0),
            UserPriority::Up3 => (1.0 / 4.0, 1.0 / 8.0),
            UserPriority::Up4 => (3.0 / 8.0, 1.0 / 8.0),
            UserPriority::Up5 => (3.0 / 8.0, 3.0 / 16.0),
            UserPriority::Up6 => (1.0 / 2.0, 3.0 / 16.0),
        }
    }

    /// Short human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            UserPriority::Up0 => "background",
            UserPriority::Up1 => "best effort",
            UserPriority::Up2 => "excellent effort",
            UserPriority::Up3 => "video",
            UserPriority::Up4 => "voice",
            UserPriority::Up5 => "medical data",
            UserPriority::Up6 => "high-priority medical data",
        }
    }

    /// Builds the reference configuration for this class.
    ///
    /// The backoff state count is the first state index whose contention
    /// probability has reached the class floor, never fewer than two.
    ///
    /// # Errors
    ///
    /// - `ChainError::InvalidConfig` - Never for the built-in table; kept so
    ///   the constructor's validation is not bypassed
    pub fn config(self) -> Result<PriorityClassConfig> {
        let (max, min) = self.contention_bounds();
        let halving = PriorityClassConfig::new(max, min, MIN_REFERENCE_BACKOFF_STATES)?;

        let mut states = MIN_REFERENCE_BACKOFF_STATES;
        while halving.contention_probability(states) > min {
            states += 2;
        }

        halving.with_backoff_state_count(states)
    }
}

impl fmt::Display for UserPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let index = match self {
            UserPriority::Up0 => 0,
            UserPriority::Up1 => 1,
            UserPriority::Up2 => 2,
            UserPriority::Up3 => 3,
            UserPriority::Up4 => 4,
            UserPriority::Up5 => 5,
            UserPriority::Up6 => 6,
        };
        write!(f, "UP{index}")
    }
}

impl FromStr for UserPriority {
    type Err = ChainError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        let digits = normalized.strip_prefix("up").unwrap_or(&normalized);

        match digits {
            "0" => Ok(UserPriority::Up0),
            "1" => Ok(UserPriority::Up1),
            "2" => Ok(UserPriority::Up2),
            "3" => Ok(UserPriority::Up3),
            "4" => Ok(UserPriority::Up4),
            "5" => Ok(UserPriority::Up5),
            "6" => Ok(UserPriority::Up6),
            "7" => Err(ChainError::InvalidConfig {
                reason: "UP7 has a maximum contention probability of 1".to_string(),
            }),
            _ => Err(ChainError::InvalidInput {
                reason: format!("unknown priority class '{s}'"),
            }),
        }
    }
}

/// Looks up a reference class configuration by identifier (`"UP0"`, `"up5"`, `"3"`).
///
/// # Errors
///
/// - `ChainError::InvalidInput` - Identifier does not name a known class
/// - `ChainError::InvalidConfig` - Identifier names UP7
pub fn get_config(class_id: &str) -> Result<PriorityClassConfig> {
    class_id.parse::<UserPriority>()?.config()
}
