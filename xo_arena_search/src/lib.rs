#![cfg_attr(not(test), forbid(clippy::unwrap_used))]

use std::ops::Add;

use xo_arena::prelude::*;

pub mod transposition_table;

/// Implementation for Monte-Carlo Tree Search
pub mod mcts;

/// Implementation for exhaustive negamax search
pub mod negamax;

/// Tabular temporal-difference learner with a bounded value cache
pub mod rl;

mod strategy;
pub use strategy::*;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SearchCounter {
    /// Number of board positions produced by search or playouts.
    pub states_visited: u64,
    /// Number of times a board was scored statically (terminal or depth limit).
    pub evals: u64,
    /// Number of times there is a transposition table hit
    pub tt_hits: u64,
    /// MCTS iterations abandoned because the tree reached its node limit.
    pub aborted_iterations: u64,
}

impl SearchCounter {
    pub const ZERO: SearchCounter = SearchCounter {
        states_visited: 0,
        evals: 0,
        tt_hits: 0,
        aborted_iterations: 0,
    };

    pub const EVAL: SearchCounter = SearchCounter {
        states_visited: 1,
        evals: 1,
        ..Self::ZERO
    };

    pub const HIT: SearchCounter = SearchCounter {
        tt_hits: 1,
        ..Self::ZERO
    };

    #[inline]
    pub fn add_in_place(&mut self, c: &SearchCounter) {
        self.states_visited += c.states_visited;
        self.evals += c.evals;
        self.tt_hits += c.tt_hits;
        self.aborted_iterations += c.aborted_iterations;
    }

    pub fn summary(&self, dt_ns: u128) -> String {
        let dt_ms: f64 = 1e-6 * (dt_ns as f64);
        let rate: f64 = 1e3 * (self.states_visited as f64) / (dt_ns.max(1) as f64);
        format!("dt={dt_ms:.2}ms rate={rate:.4} Mstates/s")
    }
}

impl Add for SearchCounter {
    type Output = SearchCounter;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        let mut a = self;
        a.add_in_place(&rhs);
        a
    }
}

/// Outcome of one move decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchResult {
    /// `None` when the board has no legal move.
    pub best_move: Option<Cell>,
    /// Estimated value of the position for the searching player, when the strategy has one.
    pub eval: Option<Fixed>,
    pub counter: SearchCounter,
}

impl SearchResult {
    #[inline]
    pub(crate) fn new(best_move: Option<Cell>, eval: Option<Fixed>, counter: SearchCounter) -> Self {
        SearchResult {
            best_move,
            eval,
            counter,
        }
    }
}
