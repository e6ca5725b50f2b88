use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use xo_arena::prelude::*;
use xo_arena_search::rl::EpisodeTrace;
use xo_arena_search::StrategyKind;

use crate::snapshot::SnapshotRecord;

/// Mutable state of one match, guarded by the slot lock.
#[derive(Debug, Clone)]
pub struct SlotState {
    pub board: Board,
    pub moves: MoveRecord,
    pub steps: u8,
    pub strategies: ByPlayer<StrategyKind>,
    pub turn: Player,
    /// The final board was published and the match waits for a restart.
    pub parked: bool,
    /// After-states seen since the match started, for the learner.
    pub trace: EpisodeTrace,
}

impl SlotState {
    pub fn new(strategies: ByPlayer<StrategyKind>) -> Self {
        Self {
            board: Board::EMPTY,
            moves: MoveRecord::EMPTY,
            steps: 0,
            strategies,
            turn: Player::O,
            parked: false,
            trace: EpisodeTrace::default(),
        }
    }

    #[inline]
    pub fn uses(&self, kind: StrategyKind) -> bool {
        self.strategies.0 == kind || self.strategies.1 == kind
    }

    /// Clears the board for a new round.
    pub fn reset(&mut self, strategies: ByPlayer<StrategyKind>) {
        *self = Self::new(strategies);
    }

    pub fn record(&self, match_id: u32) -> SnapshotRecord {
        SnapshotRecord {
            match_id,
            board: self.board,
            moves: self.moves,
            strategies: self.strategies,
            steps: self.steps,
        }
    }
}

/// One running match.
///
/// `finished` is set when no move computation is in flight. The tick takes
/// it with acquire ordering before dispatching, and the worker stores it with
/// release ordering after its last write to the state, so a tick that sees it
/// set also sees the move the worker applied.
#[derive(Debug)]
pub struct MatchSlot {
    pub id: u32,
    state: Mutex<SlotState>,
    finished: AtomicBool,
}

impl MatchSlot {
    pub fn new(id: u32, strategies: ByPlayer<StrategyKind>) -> Self {
        Self {
            id,
            state: Mutex::new(SlotState::new(strategies)),
            finished: AtomicBool::new(true),
        }
    }

    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `true` if no computation is in flight.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Claims the slot for one computation. Fails if one is already in flight.
    #[inline]
    pub fn try_acquire(&self) -> bool {
        self.finished
            .compare_exchange(true, false, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Hands the slot back after a computation.
    #[inline]
    pub fn release(&self) {
        self.finished.store(true, Ordering::Release);
    }
}
