//! Mutable state of one simulation run.

use std::collections::VecDeque;

use contention_core::{ChainError, ChannelEvent, Result};
use serde::{Deserialize, Serialize};

/// Transition records a session keeps unless configured otherwise.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// One realized step of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// State the device was in during the slot
    pub from: usize,
    /// State after the slot
    pub to: usize,
    /// What happened in the slot
    pub event: ChannelEvent,
    /// One-based step number
    pub step: u64,
}

/// Per-event tallies of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    /// Successful transmissions
    pub success: u64,
    /// Collided transmissions
    pub collision: u64,
    /// Silent slots
    pub idle: u64,
}

impl EventCounts {
    fn record(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Success => self.success += 1,
            ChannelEvent::Collision => self.collision += 1,
            ChannelEvent::Idle => self.idle += 1,
        }
    }

    /// Tally of `event`.
    pub fn get(&self, event: ChannelEvent) -> u64 {
        match event {
            ChannelEvent::Success => self.success,
            ChannelEvent::Collision => self.collision,
            ChannelEvent::Idle => self.idle,
        }
    }

    /// Slots in which the device transmitted.
    pub fn transmissions(&self) -> u64 {
        self.success + self.collision
    }

    /// All recorded slots.
    pub fn total(&self) -> u64 {
        self.success + self.collision + self.idle
    }
}

/// Serializable copy of what a renderer needs from a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Current backoff state
    pub current_state_index: usize,
    /// Steps taken so far
    pub step_count: u64,
    /// Most recent transitions, oldest first
    pub history: Vec<TransitionRecord>,
}

/// State of one simulation run.
///
/// Starts in the fresh state with an empty history. Only
/// [`crate::simulator::step`] moves it forward; the history keeps the most
/// recent transitions and drops the oldest once full.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSession {
    current_state_index: usize,
    step_count: u64,
    history: VecDeque<TransitionRecord>,
    history_capacity: usize,
    occupancy: Vec<u64>,
    event_counts: EventCounts,
}

impl Default for SimulationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationSession {
    /// Creates a session keeping the last ten transitions.
    pub fn new() -> Self {
        Self {
            current_state_index: 0,
            step_count: 0,
            history: VecDeque::with_capacity(DEFAULT_HISTORY_CAPACITY),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            occupancy: Vec::new(),
            event_counts: EventCounts::default(),
        }
    }

    /// Creates a session keeping the last `history_capacity` transitions.
    ///
    /// # Errors
    ///
    /// - `ChainError::InvalidInput` - `history_capacity` is zero
    pub fn with_history_capacity(history_capacity: usize) -> Result<Self> {
        if history_capacity == 0 {
            return Err(ChainError::InvalidInput {
                reason: "history capacity must be at least 1".to_string(),
            });
        }

        Ok(Self {
            history: VecDeque::with_capacity(history_capacity),
            history_capacity,
            ..Self::new()
        })
    }

    /// Returns the session to the fresh state with no history, keeping its
    /// history capacity.
    pub fn reset(&mut self) {
        self.current_state_index = 0;
        self.step_count = 0;
        self.history.clear();
        self.occupancy.clear();
        self.event_counts = EventCounts::default();
    }

    /// Current backoff state.
    pub fn current_state_index(&self) -> usize {
        self.current_state_index
    }

    /// Steps taken since creation or the last reset.
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = &TransitionRecord> + '_ {
        self.history.iter()
    }

    /// Maximum number of transitions kept.
    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    /// Most recent transition.
    pub fn last_transition(&self) -> Option<&TransitionRecord> {
        self.history.back()
    }

    /// Slots spent in each state, indexed by state.
    pub fn occupancy(&self) -> &[u64] {
        &self.occupancy
    }

    /// Per-event tallies.
    pub fn event_counts(&self) -> EventCounts {
        self.event_counts
    }

    /// Fraction of slots spent in `index`; zero before the first step.
    pub fn visit_frequency(&self, index: usize) -> f64 {
        if self.step_count == 0 {
            return 0.0;
        }
        self.occupancy.get(index).copied().unwrap_or(0) as f64 / self.step_count as f64
    }

    /// Copy of the renderable fields.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            current_state_index: self.current_state_index,
            step_count: self.step_count,
            history: self.history.iter().copied().collect(),
        }
    }

    /// Applies a validated transition.
    pub(crate) fn apply(&mut self, from: usize, to: usize, event: ChannelEvent) -> TransitionRecord {
        let record = TransitionRecord {
            from,
            to,
            event,
            step: self.step_count + 1,
        };

        self.history.push_back(record);
        while self.history.len() > self.history_capacity {
            self.history.pop_front();
        }

        if self.occupancy.len() <= from {
            self.occupancy.resize(from + 1, 0);
        }
        self.occupancy[from] += 1;
        self.event_counts.record(event);

        self.current_state_index = to;
        self.step_count += 1;
        record
    }
}
