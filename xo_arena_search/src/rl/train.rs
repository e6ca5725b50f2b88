use instant::Instant;
use log::{debug, info};
use xo_arena::prelude::*;

use super::{EpisodeTrace, RlAgent};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrainStats {
    pub episodes: u32,
    pub wins: ByPlayer<u32>,
    pub draws: u32,
}

impl TrainStats {
    fn record(&mut self, outcome: Outcome) {
        self.episodes += 1;
        match outcome {
            Outcome::Win(p) => self.wins[p] += 1,
            Outcome::Draw | Outcome::InProgress => self.draws += 1,
        }
    }
}

/// Exploration rate for episode `i` of `n`, moving linearly from `start` to `end`.
pub fn epsilon_at(i: u32, n: u32, start: f32, end: f32) -> f32 {
    if n <= 1 {
        return end;
    }
    let t = i.min(n - 1) as f32 / (n - 1) as f32;
    start + (end - start) * t
}

/// Plays one epsilon-greedy self-play game from the empty board and returns
/// the outcome and the recorded trace, without learning from it.
pub fn play_episode(agent: &RlAgent, epsilon: f32, rng: &mut RngState) -> (Outcome, EpisodeTrace) {
    let mut board = Board::EMPTY;
    let mut player = Player::O;
    let mut trace = EpisodeTrace::default();
    loop {
        let outcome = board.check_terminal();
        if outcome.is_terminal() {
            trace.finish(outcome);
            return (outcome, trace);
        }
        let Some(mv) = agent.explore_move(board, player, epsilon, rng) else {
            return (outcome, trace);
        };
        board = board.set_cell(mv, player.mark());
        agent.record_step(&mut trace, board, player);
        player = player.opposite();
    }
}

/// Self-play training for `episodes` games, both sides played by `agent`.
pub fn self_play(agent: &RlAgent, episodes: u32, rng: &mut RngState) -> TrainStats {
    let t0 = Instant::now();
    let (start, end) = (agent.config.epsilon_start, agent.config.epsilon_end);
    let log_every = (episodes / 10).max(1);
    let mut stats = TrainStats::default();
    for i in 0..episodes {
        let epsilon = epsilon_at(i, episodes, start, end);
        let (outcome, trace) = play_episode(agent, epsilon, rng);
        agent.apply_trace(&trace);
        stats.record(outcome);
        if (i + 1) % log_every == 0 {
            debug!(
                "rl train: {}/{episodes} epsilon={epsilon:.3} O={} X={} draw={}",
                i + 1,
                stats.wins.0,
                stats.wins.1,
                stats.draws
            );
        }
    }
    info!(
        "rl train: {episodes} episodes in {:.2}s, cache {} entries, {} evictions",
        t0.elapsed().as_secs_f32(),
        agent.cache_len(),
        agent.evictions()
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::RlConfig;

    #[test]
    fn test_epsilon_schedule() {
        assert_eq!(0.5, epsilon_at(0, 11, 0.5, 0.0));
        assert!((epsilon_at(5, 11, 0.5, 0.0) - 0.25).abs() < 1e-6);
        assert_eq!(0.0, epsilon_at(10, 11, 0.5, 0.0));
        assert_eq!(0.0, epsilon_at(100, 11, 0.5, 0.0));
        assert_eq!(0.1, epsilon_at(0, 1, 0.5, 0.1));
    }

    #[test]
    fn test_episode_ends_terminal() {
        let agent = RlAgent::new(RlConfig::default());
        let mut rng = RngState::seed_from_u64(9);
        let (outcome, trace) = play_episode(&agent, 1.0, &mut rng);
        assert!(outcome.is_terminal());
        assert!(trace.len() >= 5);
        assert!(trace.len() <= 16);
        let last = Board::from_canonical_key(trace.states[trace.len() - 1]);
        assert_eq!(outcome, last.check_terminal());
    }

    #[test]
    fn test_self_play_counts_episodes() {
        let agent = RlAgent::new(RlConfig {
            capacity: 64,
            ..Default::default()
        });
        let mut rng = RngState::seed_from_u64(4);
        let stats = self_play(&agent, 20, &mut rng);
        assert_eq!(20, stats.episodes);
        assert_eq!(20, stats.wins.0 + stats.wins.1 + stats.draws);
        assert!(agent.cache_len() <= 64);
    }
}
