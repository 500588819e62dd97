//! Fixed transition structure of the backoff chain.
//!
//! From state `i` a success returns the device to the fresh state, a
//! collision moves it one state deeper (staying put at the ceiling) and an
//! idle slot leaves it where it is.

use serde::Serialize;

use crate::model::{ChannelEvent, StateModel};
use crate::{ChainError, Result};

/// State reached from `from` after `event`, for a chain whose ceiling is
/// `last_index`.
pub fn successor(from: usize, event: ChannelEvent, last_index: usize) -> usize {
    match event {
        ChannelEvent::Success => 0,
        ChannelEvent::Collision => (from + 1).min(last_index),
        ChannelEvent::Idle => from,
    }
}

/// Dense row-stochastic transition matrix of a [`StateModel`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionMatrix {
    rows: Vec<Vec<f64>>,
}

impl TransitionMatrix {
    /// Builds the matrix by routing each state's event probabilities
    /// through [`successor`].
    pub fn from_model(model: &StateModel) -> Self {
        let size = model.len();
        let last_index = model.last_index();

        let rows = model
            .states()
            .iter()
            .map(|state| {
                let mut row = vec![0.0; size];
                for event in ChannelEvent::ALL {
                    row[successor(state.index, event, last_index)] +=
                        state.event_probability(event);
                }
                row
            })
            .collect();

        Self { rows }
    }

    /// Number of states.
    pub fn size(&self) -> usize {
        self.rows.len()
    }

    /// Probability of moving from `from` to `to` in one step; zero for
    /// indices outside the chain.
    pub fn probability(&self, from: usize, to: usize) -> f64 {
        self.rows
            .get(from)
            .and_then(|row| row.get(to))
            .copied()
            .unwrap_or(0.0)
    }

    /// Outgoing probabilities of state `from`.
    pub fn row(&self, from: usize) -> Option<&[f64]> {
        self.rows.get(from).map(Vec::as_slice)
    }

    /// Self-loop probability of state `index`.
    pub fn self_loop(&self, index: usize) -> f64 {
        self.probability(index, index)
    }

    /// Propagates a distribution one step: returns `distribution × P`.
    ///
    /// # Errors
    ///
    /// - `ChainError::InvalidInput` - Distribution length differs from the
    ///   number of states
    pub fn apply(&self, distribution: &[f64]) -> Result<Vec<f64>> {
        if distribution.len() != self.size() {
            return Err(ChainError::InvalidInput {
                reason: format!(
                    "distribution has {} entries, chain has {} states",
                    distribution.len(),
                    self.size()
                ),
            });
        }

        let mut next = vec![0.0; self.size()];
        for (weight, row) in distribution.iter().zip(&self.rows) {
            for (target, probability) in next.iter_mut().zip(row) {
                *target += weight * probability;
            }
        }
        Ok(next)
    }

    /// Largest deviation of any row sum from one.
    pub fn max_row_error(&self) -> f64 {
        self.rows
            .iter()
            .map(|row| (row.iter().sum::<f64>() - 1.0).abs())
            .fold(0.0, f64::max)
    }

    /// Dobrushin contraction coefficient: the largest total variation
    /// distance between any two rows.
    ///
    /// Below one, every starting state forgets itself and the chain
    /// converges to its stationary distribution.
    pub fn contraction_coefficient(&self) -> f64 {
        let mut worst: f64 = 0.0;
        for (i, left) in self.rows.iter().enumerate() {
            for right in &self.rows[i + 1..] {
                let distance: f64 = left
                    .iter()
                    .zip(right)
                    .map(|(a, b)| (a - b).abs())
                    .sum::<f64>()
                    * 0.5;
                worst = worst.max(distance);
            }
        }
        worst
    }
}
