use std::fmt::Display;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use enum_map::Enum;
use thiserror::Error;
use xo_arena::prelude::*;
use xo_arena::rand::Rng;
use xo_arena::smallvec::SmallVec;

use crate::mcts::{Mcts, MctsConfig};
use crate::negamax::{Negamax, NegamaxConfig};
use crate::rl::{RlAgent, RlConfig};
use crate::SearchResult;

/// Move selection contract shared by all strategies.
///
/// Implementations are shared between worker threads, so any state they keep
/// across calls sits behind interior locking.
pub trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn search(&self, board: Board, player: Player, rng: &mut RngState) -> SearchResult;

    /// `None` means there is no legal move, and the caller should pass.
    fn select_move(&self, board: Board, player: Player, rng: &mut RngState) -> Option<Cell> {
        self.search(board, player, rng).best_move
    }
}

/// The registry of named strategies. The discriminant is the 4-bit id used in snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Enum)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum StrategyKind {
    #[default]
    Mcts = 0,
    Negamax = 1,
    Rl = 2,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [StrategyKind::Mcts, StrategyKind::Negamax, StrategyKind::Rl];

    #[inline]
    pub const fn id(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn from_id(id: u8) -> Option<StrategyKind> {
        match id {
            0 => Some(StrategyKind::Mcts),
            1 => Some(StrategyKind::Negamax),
            2 => Some(StrategyKind::Rl),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            StrategyKind::Mcts => "mcts",
            StrategyKind::Negamax => "negamax",
            StrategyKind::Rl => "rl",
        }
    }
}

impl Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown strategy: {0:?} (expected mcts, negamax or rl)")]
pub struct ParseStrategyError(pub String);

impl FromStr for StrategyKind {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mcts" => Ok(StrategyKind::Mcts),
            "negamax" | "minimax" => Ok(StrategyKind::Negamax),
            "rl" => Ok(StrategyKind::Rl),
            _ => Err(ParseStrategyError(s.to_string())),
        }
    }
}

/// One instance of every strategy, shared by all matches.
///
/// The learner can be marked unavailable while it is being pre-trained. It is
/// then left out of random selection, and matches that already hold it are
/// served by MCTS instead.
pub struct StrategySet {
    mcts: Mcts,
    negamax: Negamax,
    rl: RlAgent,
    rl_ready: AtomicBool,
}

impl std::fmt::Debug for StrategySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategySet")
            .field("mcts", &self.mcts.config)
            .field("negamax", &self.negamax.config)
            .field("rl_ready", &self.rl_ready.load(Ordering::Relaxed))
            .finish()
    }
}

impl StrategySet {
    pub fn new(mcts: MctsConfig, negamax: NegamaxConfig, rl: RlConfig) -> Self {
        Self {
            mcts: Mcts::new(mcts),
            negamax: Negamax::new(negamax),
            rl: RlAgent::new(rl),
            rl_ready: AtomicBool::new(true),
        }
    }

    #[inline]
    pub fn get(&self, kind: StrategyKind) -> &dyn Strategy {
        match kind {
            StrategyKind::Mcts => &self.mcts,
            StrategyKind::Negamax => &self.negamax,
            StrategyKind::Rl => &self.rl,
        }
    }

    /// Drops what searches remember between decisions. Learned values are kept.
    pub fn clear_search_tables(&self) {
        self.negamax.clear_table();
    }

    #[inline]
    pub fn rl(&self) -> &RlAgent {
        &self.rl
    }

    pub fn set_rl_ready(&self, ready: bool) {
        self.rl_ready.store(ready, Ordering::Release);
    }

    #[inline]
    pub fn is_available(&self, kind: StrategyKind) -> bool {
        kind != StrategyKind::Rl || self.rl_ready.load(Ordering::Acquire)
    }

    pub fn available(&self) -> SmallVec<[StrategyKind; 3]> {
        StrategyKind::ALL
            .into_iter()
            .filter(|&k| self.is_available(k))
            .collect()
    }

    /// Uniform choice among available strategies.
    pub fn random_kind<R: Rng + ?Sized>(&self, rng: &mut R) -> StrategyKind {
        let available = self.available();
        available
            .get(rng.gen_range(0..available.len().max(1)))
            .copied()
            .unwrap_or_default()
    }

    /// The strategy that will actually play for `kind` right now.
    #[inline]
    pub fn resolve(&self, kind: StrategyKind) -> StrategyKind {
        if self.is_available(kind) {
            kind
        } else {
            StrategyKind::Mcts
        }
    }

    pub fn search(&self, kind: StrategyKind, board: Board, player: Player, rng: &mut RngState) -> SearchResult {
        self.get(self.resolve(kind)).search(board, player, rng)
    }
}
