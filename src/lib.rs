#![cfg_attr(not(test), forbid(clippy::unwrap_used))]
#![doc = include_str!("../README.md")]

/// Packed 4x4 board, win segments, terminal detection and static evaluation.
pub mod board;

/// 8- and 16-fraction-bit fixed-point numbers.
pub mod fixed_point;

/// Pseudorandom number generation
pub mod rng;

/// Players, per-player pairs and move records.
pub mod types;

/// Re-exports the `smallvec` crate
pub use smallvec;

/// Re-exports the `rand` create
pub use rand;

pub mod prelude {
    pub use crate::board::{terminal_value, Board, BoardError, Cell, Moves, Outcome, StateKey};
    pub use crate::fixed_point::{Fixed, RlFixed};
    pub use crate::rng::{RngSource, RngState};
    pub use crate::types::{ByPlayer, Mark, MoveRecord, Player};
}

#[cfg(test)]
mod tests;
