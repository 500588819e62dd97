//! Backoff states and their per-slot event probabilities.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::priority::PriorityClassConfig;
use crate::{ChainError, PROBABILITY_EPSILON, Result};

/// Outcome of one contention slot as seen by the tagged device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelEvent {
    /// Device transmitted and nobody else did
    Success,
    /// Device transmitted together with at least one other device
    Collision,
    /// Device stayed silent
    Idle,
}

impl ChannelEvent {
    /// Every event kind in display order.
    pub const ALL: [ChannelEvent; 3] = [
        ChannelEvent::Success,
        ChannelEvent::Collision,
        ChannelEvent::Idle,
    ];
}

impl fmt::Display for ChannelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelEvent::Success => write!(f, "success"),
            ChannelEvent::Collision => write!(f, "collision"),
            ChannelEvent::Idle => write!(f, "idle"),
        }
    }
}

/// One state of the backoff chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffState {
    /// Consecutive contention failures mapped to this state (0 = fresh)
    pub index: usize,
    /// Probability of attempting a transmission in a slot
    pub contention_probability: f64,
    /// Probability the attempt is the only one in the slot
    pub success_probability: f64,
    /// Probability the attempt overlaps another device's attempt
    pub collision_probability: f64,
    /// Probability the device stays silent
    pub idle_probability: f64,
}

impl BackoffState {
    /// Derives the slot probabilities for a state with `device_count`
    /// contenders, the tagged device included.
    pub fn derive(index: usize, contention_probability: f64, device_count: u32) -> Self {
        let idle_probability = 1.0 - contention_probability;
        let others_silent = others_silent_probability(contention_probability, device_count);

        Self {
            index,
            contention_probability,
            success_probability: contention_probability * others_silent,
            collision_probability: contention_probability * (1.0 - others_silent),
            idle_probability,
        }
    }

    /// Sum of the three event probabilities; one for a well-formed state.
    pub fn total_probability(&self) -> f64 {
        self.success_probability + self.collision_probability + self.idle_probability
    }

    /// Probability of `event` happening in one slot from this state.
    pub fn event_probability(&self, event: ChannelEvent) -> f64 {
        match event {
            ChannelEvent::Success => self.success_probability,
            ChannelEvent::Collision => self.collision_probability,
            ChannelEvent::Idle => self.idle_probability,
        }
    }
}

fn others_silent_probability(contention_probability: f64, device_count: u32) -> f64 {
    let others = i32::try_from(device_count.saturating_sub(1)).unwrap_or(i32::MAX);
    (1.0 - contention_probability).powi(others)
}

/// Read-only view of one state for display layers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// State index
    pub index: usize,
    /// Whether this is the ceiling state
    pub is_last: bool,
    /// Contention probability
    pub contention_probability: f64,
    /// Success probability
    pub success: f64,
    /// Collision probability
    pub collision: f64,
    /// Idle probability
    pub idle: f64,
}

/// Ordered backoff states of one class for a fixed number of contenders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateModel {
    config: PriorityClassConfig,
    device_count: u32,
    states: Vec<BackoffState>,
}

impl StateModel {
    /// Class configuration the states were derived from.
    pub fn config(&self) -> &PriorityClassConfig {
        &self.config
    }

    /// Number of contending devices the probabilities assume.
    pub fn device_count(&self) -> u32 {
        self.device_count
    }

    /// All states, fresh state first.
    pub fn states(&self) -> &[BackoffState] {
        &self.states
    }

    /// State at `index`, if it exists.
    pub fn state(&self, index: usize) -> Option<&BackoffState> {
        self.states.get(index)
    }

    /// Number of states, fresh state included.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Always false; a model has at least two states.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Index of the ceiling state.
    pub fn last_index(&self) -> usize {
        self.states.len() - 1
    }

    /// Display snapshot of the state at `index`.
    pub fn snapshot(&self, index: usize) -> Option<StateSnapshot> {
        let last_index = self.last_index();
        self.state(index).map(|state| StateSnapshot {
            index: state.index,
            is_last: state.index == last_index,
            contention_probability: state.contention_probability,
            success: state.success_probability,
            collision: state.collision_probability,
            idle: state.idle_probability,
        })
    }

    /// Snapshots of every state in order.
    pub fn snapshots(&self) -> Vec<StateSnapshot> {
        (0..self.len()).filter_map(|index| self.snapshot(index)).collect()
    }
}

/// Builds the `backoff_state_count + 1` states of a class.
///
/// # Errors
///
/// - `ChainError::InvalidInput` - `device_count` is zero
/// - `ChainError::InvalidConfig` - A derived state does not form a
///   probability distribution
pub fn build_states(config: &PriorityClassConfig, device_count: u32) -> Result<StateModel> {
    if device_count < 1 {
        return Err(ChainError::InvalidInput {
            reason: "at least one contending device is required".to_string(),
        });
    }

    let states: Vec<BackoffState> = (0..=config.last_index())
        .map(|index| {
            BackoffState::derive(index, config.contention_probability(index), device_count)
        })
        .collect();

    if let Some(state) = states
        .iter()
        .find(|state| (state.total_probability() - 1.0).abs() > PROBABILITY_EPSILON)
    {
        return Err(ChainError::InvalidConfig {
            reason: format!(
                "state {} probabilities sum to {}",
                state.index,
                state.total_probability()
            ),
        });
    }

    debug!(
        states = states.len(),
        device_count,
        max_cp = config.max_contention_probability(),
        min_cp = config.min_contention_probability(),
        "Built backoff state model"
    );

    Ok(StateModel {
        config: *config,
        device_count,
        states,
    })
}
