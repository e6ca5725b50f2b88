use std::sync::{Mutex, MutexGuard, PoisonError};

use log::debug;
use xo_arena::prelude::*;
use xo_arena::rand::Rng;
use xo_arena::smallvec::SmallVec;

use crate::{SearchCounter, SearchResult, Strategy, StrategyKind};

mod value_cache;
pub use value_cache::ValueCache;

pub mod train;

#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RlConfig {
    /// Maximum number of cached states.
    pub capacity: usize,
    pub learning_rate: f32,
    pub gamma: f32,
    /// Scale applied to the static heuristic when a state is first seen.
    pub initial_multiplier: f32,
    /// Scale applied to the static heuristic of each step's reward.
    pub heuristic_weight: f32,
    /// Exploration rate at the start of self-play training.
    pub epsilon_start: f32,
    /// Exploration rate at the end of self-play training.
    pub epsilon_end: f32,
}

impl Default for RlConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            learning_rate: 0.02,
            gamma: 0.99,
            initial_multiplier: 0.0001,
            heuristic_weight: 0.01,
            epsilon_start: 0.5,
            epsilon_end: 0.001,
        }
    }
}

/// Constants of [`RlConfig`] converted once to fixed point.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RlParams {
    pub alpha: RlFixed,
    pub gamma: RlFixed,
    pub initial_multiplier: RlFixed,
    pub heuristic_weight: RlFixed,
}

impl From<&RlConfig> for RlParams {
    fn from(config: &RlConfig) -> Self {
        Self {
            alpha: RlFixed::from_f32(config.learning_rate),
            gamma: RlFixed::from_f32(config.gamma),
            initial_multiplier: RlFixed::from_f32(config.initial_multiplier),
            heuristic_weight: RlFixed::from_f32(config.heuristic_weight),
        }
    }
}

/// After-states of one match in play order, with the player who made each
/// step and its reward from that player's point of view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpisodeTrace {
    pub states: SmallVec<[StateKey; 16]>,
    pub movers: SmallVec<[Player; 16]>,
    pub rewards: SmallVec<[RlFixed; 16]>,
}

impl EpisodeTrace {
    #[inline]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn push(&mut self, after: Board, mover: Player, reward: RlFixed) {
        self.states.push(after.canonical_key());
        self.movers.push(mover);
        self.rewards.push(reward);
    }

    /// The player who made step `step`.
    #[inline]
    pub fn mover(&self, step: usize) -> Option<Player> {
        self.movers.get(step).copied()
    }

    /// Adds the terminal value of `outcome` to the reward of the final step.
    pub fn finish(&mut self, outcome: Outcome) {
        let Some(last) = self.len().checked_sub(1) else { return };
        let Some(mover) = self.mover(last) else { return };
        self.rewards[last] += RlFixed::from(terminal_value(outcome, mover));
    }

    pub fn clear(&mut self) {
        self.states.clear();
        self.movers.clear();
        self.rewards.clear();
    }
}

/// Tabular learner over after-states.
///
/// Moves are chosen by the cached value of the resulting board. All matches
/// share one cache behind one lock; lookups, inserts and evictions happen
/// entirely inside that lock.
#[derive(Debug)]
pub struct RlAgent {
    pub config: RlConfig,
    pub params: RlParams,
    cache: Mutex<ValueCache>,
}

impl RlAgent {
    pub fn new(config: RlConfig) -> Self {
        Self {
            params: RlParams::from(&config),
            cache: Mutex::new(ValueCache::new(config.capacity)),
            config,
        }
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, ValueCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starting estimates for a state never seen before.
    pub fn initial_values(&self, board: Board) -> ByPlayer<RlFixed> {
        let m = self.params.initial_multiplier;
        ByPlayer::new(
            m.mul_int(board.heuristic(Player::O)),
            m.mul_int(board.heuristic(Player::X)),
        )
    }

    /// Shaping reward for `mover` having produced `after`.
    pub fn step_reward(&self, after: Board, mover: Player) -> RlFixed {
        self.params.heuristic_weight.mul_int(after.heuristic(mover))
    }

    /// Appends the after-state of `mover`'s move to `trace`.
    pub fn record_step(&self, trace: &mut EpisodeTrace, after: Board, mover: Player) {
        trace.push(after, mover, self.step_reward(after, mover));
    }

    /// Cached estimate of `board` for `player`, creating the entry if needed.
    pub fn value(&self, board: Board, player: Player) -> RlFixed {
        let mut cache = self.lock();
        cache.get_or_insert_with(board.canonical_key(), || self.initial_values(board))[player]
    }

    pub fn cache_len(&self) -> usize {
        self.lock().len()
    }

    pub fn evictions(&self) -> u64 {
        self.lock().evictions()
    }

    /// Greedy choice over after-state values. Equal values are resolved by
    /// reservoir sampling: the k-th tied candidate replaces the incumbent with
    /// probability 1/k, so every tied move is equally likely.
    pub fn greedy_move<R: Rng + ?Sized>(&self, board: Board, player: Player, rng: &mut R) -> (Option<Cell>, RlFixed) {
        if board.check_terminal().is_terminal() {
            return (None, RlFixed::MIN);
        }
        let moves = board.legal_moves();
        let mut best: Option<Cell> = None;
        let mut best_value = RlFixed::MIN;
        let mut candidates = 0u32;
        {
            let mut cache = self.lock();
            for mv in moves.iter().copied() {
                let after = board.set_cell(mv, player.mark());
                let value = cache.get_or_insert_with(after.canonical_key(), || self.initial_values(after))[player];
                if value == RlFixed::MIN {
                    continue;
                }
                if best.is_none() || value > best_value {
                    best = Some(mv);
                    best_value = value;
                    candidates = 1;
                } else if value == best_value {
                    candidates += 1;
                    if rng.gen_range(0..candidates) == 0 {
                        best = Some(mv);
                    }
                }
            }
        }
        match best {
            Some(mv) => (Some(mv), best_value),
            None => (moves.last().copied(), RlFixed::MIN),
        }
    }

    /// With probability `epsilon` a uniformly random legal move, otherwise the greedy move.
    pub fn explore_move<R: Rng + ?Sized>(&self, board: Board, player: Player, epsilon: f32, rng: &mut R) -> Option<Cell> {
        if board.check_terminal().is_terminal() {
            return None;
        }
        if rng.gen::<f32>() < epsilon {
            let moves = board.legal_moves();
            return moves.get(rng.gen_range(0..moves.len().max(1))).copied();
        }
        self.greedy_move(board, player, rng).0
    }

    /// Temporal-difference update over one episode, last step first.
    ///
    /// For each step, `target = reward - gamma * next` and the estimate moves
    /// to `(1 - alpha) * value + alpha * target`; `target` then becomes `next`
    /// for the preceding step. Each step updates the estimate of the side that
    /// made it. `next` is negated only when the following step was made by the
    /// opponent, so a passed turn keeps both sides' views apart.
    pub fn update_episode(&self, states: &[StateKey], rewards: &[RlFixed], movers: &[Player]) {
        let RlParams { alpha, gamma, .. } = self.params;
        let keep = RlFixed::ONE - alpha;
        let mut next: Option<(Player, RlFixed)> = None;
        let mut cache = self.lock();
        for ((&key, &reward), &mover) in states.iter().zip(rewards).zip(movers).rev() {
            let target = match next {
                Some((p, v)) if p == mover => reward + gamma * v,
                Some((_, v)) => reward - gamma * v,
                None => reward,
            };
            let values = cache.get_or_insert_with(key, || self.initial_values(Board::from_canonical_key(key)));
            values[mover] = keep * values[mover] + alpha * target;
            next = Some((mover, target));
        }
    }

    pub fn apply_trace(&self, trace: &EpisodeTrace) {
        if trace.is_empty() {
            return;
        }
        self.update_episode(&trace.states, &trace.rewards, &trace.movers);
        debug!("rl: learned from {} steps, cache holds {}", trace.len(), self.cache_len());
    }
}

impl Strategy for RlAgent {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Rl
    }

    fn search(&self, board: Board, player: Player, rng: &mut RngState) -> SearchResult {
        let (best_move, _) = self.greedy_move(board, player, rng);
        let counter = SearchCounter {
            states_visited: board.legal_moves().len() as u64,
            ..SearchCounter::ZERO
        };
        SearchResult::new(best_move, None, counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(capacity: usize) -> RlAgent {
        RlAgent::new(RlConfig {
            capacity,
            ..Default::default()
        })
    }

    fn board(s: &str) -> Board {
        s.parse().unwrap()
    }

    #[test]
    fn test_initial_values_follow_heuristic() {
        let a = agent(16);
        let b = board("O... .... .... ....");
        let m = a.params.initial_multiplier;
        assert_eq!(ByPlayer(m.mul_int(3), m.mul_int(-3)), a.initial_values(b));
        assert_eq!(m.mul_int(3), a.value(b, Player::O));
        assert_eq!(1, a.cache_len());
    }

    #[test]
    fn test_td_update_decays_toward_zero() {
        let a = agent(16);
        let key = board("O... .X.. .... ....").canonical_key();
        let start = RlFixed::ONE;
        a.lock().get_or_insert_with(key, || ByPlayer::splat(start));
        let keep = RlFixed::ONE - a.params.alpha;
        let mut expected = start;
        for _ in 0..5 {
            a.update_episode(&[key], &[RlFixed::ZERO], &[Player::O]);
            expected = keep * expected;
            let got = a.lock().peek(key).unwrap()[Player::O];
            assert_eq!(expected, got);
            assert!(got > RlFixed::ZERO);
        }
        assert!(expected < start);
        // only the mover's estimate changes
        assert_eq!(start, a.lock().peek(key).unwrap()[Player::X]);
    }

    #[test]
    fn test_target_carries_backward() {
        let a = agent(16);
        let k0 = board("O... .... .... ....").canonical_key();
        let k1 = board("O... .X.. .... ....").canonical_key();
        a.lock().get_or_insert_with(k0, || ByPlayer::splat(RlFixed::ZERO));
        a.lock().get_or_insert_with(k1, || ByPlayer::splat(RlFixed::ZERO));
        a.update_episode(&[k0, k1], &[RlFixed::ZERO, RlFixed::ONE], &[Player::O, Player::X]);
        let RlParams { alpha, gamma, .. } = a.params;
        assert_eq!(alpha * RlFixed::ONE, a.lock().peek(k1).unwrap()[Player::X]);
        let target0 = RlFixed::ZERO - gamma * RlFixed::ONE;
        assert_eq!(alpha * target0, a.lock().peek(k0).unwrap()[Player::O]);
    }

    #[test]
    fn test_repeated_mover_keeps_its_own_view() {
        // X passed between O's two moves
        let a = agent(16);
        let k0 = board("O... .... .... ....").canonical_key();
        let k1 = board("OO.. .... .... ....").canonical_key();
        a.lock().get_or_insert_with(k0, || ByPlayer::splat(RlFixed::ZERO));
        a.lock().get_or_insert_with(k1, || ByPlayer::splat(RlFixed::ZERO));
        a.update_episode(&[k0, k1], &[RlFixed::ZERO, RlFixed::ONE], &[Player::O, Player::O]);
        let RlParams { alpha, gamma, .. } = a.params;
        assert_eq!(alpha * RlFixed::ONE, a.lock().peek(k1).unwrap()[Player::O]);
        assert_eq!(alpha * (gamma * RlFixed::ONE), a.lock().peek(k0).unwrap()[Player::O]);
        assert_eq!(RlFixed::ZERO, a.lock().peek(k0).unwrap()[Player::X]);
        assert_eq!(RlFixed::ZERO, a.lock().peek(k1).unwrap()[Player::X]);
    }

    #[test]
    fn test_prefers_higher_value() {
        let a = agent(64);
        let b = board("OO.. XX.. .... ....");
        let win = b.set_cell(Cell::new(2).unwrap(), Mark::O);
        a.lock().get_or_insert_with(win.canonical_key(), || ByPlayer::splat(RlFixed::ONE));
        let mut rng = RngState::seed_from_u64(3);
        assert_eq!(Cell::new(2), a.select_move(b, Player::O, &mut rng));
    }

    #[test]
    fn test_ties_are_sampled_uniformly() {
        let a = agent(64);
        let b = Board::EMPTY;
        // give four corner moves the same top value
        let corners = [0u8, 3, 12, 15];
        for c in corners {
            let after = b.set_cell(Cell::new(c).unwrap(), Mark::O);
            a.lock().get_or_insert_with(after.canonical_key(), || ByPlayer::splat(RlFixed::ONE));
        }
        let mut rng = RngState::seed_from_u64(11);
        let mut counts = [0u32; 16];
        for _ in 0..4000 {
            let mv = a.greedy_move(b, Player::O, &mut rng).0.unwrap();
            counts[mv.index()] += 1;
        }
        for c in corners {
            let n = counts[c as usize];
            assert!((800..1200).contains(&n), "corner {c} chosen {n} times");
        }
        assert_eq!(4000, corners.iter().map(|&c| counts[c as usize]).sum::<u32>());
    }

    #[test]
    fn test_falls_back_to_last_legal_cell() {
        let a = agent(64);
        let b = board("OXXO XOOX .... ....");
        // mark every after-state unusable
        for mv in b.legal_moves() {
            let after = b.set_cell(mv, Mark::O);
            a.lock().get_or_insert_with(after.canonical_key(), || ByPlayer::splat(RlFixed::MIN));
        }
        let mut rng = RngState::seed_from_u64(1);
        assert_eq!(b.legal_moves().last().copied(), a.select_move(b, Player::O, &mut rng));
    }

    #[test]
    fn test_bounded_cache_evicts() {
        let a = agent(4);
        let mut rng = RngState::seed_from_u64(2);
        a.select_move(Board::EMPTY, Player::O, &mut rng);
        assert_eq!(4, a.cache_len());
        assert_eq!(12, a.evictions());
    }

    #[test]
    fn test_trace_finish_rewards_last_mover() {
        let a = agent(16);
        let mut trace = EpisodeTrace::default();
        let b1 = board("O... .... .... ....");
        let b2 = board("O... .X.. .... ....");
        a.record_step(&mut trace, b1, Player::O);
        a.record_step(&mut trace, b2, Player::X);
        let before = trace.rewards[1];
        trace.finish(Outcome::Win(Player::X));
        assert_eq!(Some(Player::X), trace.mover(1));
        assert_eq!(before + RlFixed::ONE, trace.rewards[1]);
        assert_eq!(a.step_reward(b1, Player::O), trace.rewards[0]);
    }
}
