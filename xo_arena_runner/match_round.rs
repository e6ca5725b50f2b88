use instant::{Duration, Instant};
use log::warn;
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

use xo_arena::prelude::*;
use xo_arena_search::{SearchCounter, SearchResult, Strategy};

/// A finished game: the final board, its outcome and how it got there.
#[derive(Debug, Clone, Copy)]
pub struct RoundResult {
    pub board: Board,
    pub outcome: Outcome,
    pub moves: MoveRecord,
    pub steps: u8,
    pub dt: Duration,
    pub counter: SearchCounter,
}

/// Plays one game from the empty board, O first.
pub fn match_round<T: Strategy>(searches: ByPlayer<&T>, rng: &mut RngState) -> RoundResult {
    let t0 = Instant::now();
    let mut board = Board::EMPTY;
    let mut moves = MoveRecord::EMPTY;
    let mut steps = 0u8;
    let mut total_counter = SearchCounter::default();
    let mut player = Player::O;
    while !board.check_terminal().is_terminal() {
        let SearchResult {
            best_move, counter: c, ..
        } = searches[player].search(board, player, rng);
        total_counter.add_in_place(&c);
        let Some(cell) = best_move else { break };
        board = match board.play(cell, player) {
            Ok(next) => next,
            Err(e) => {
                warn!("match_round: {} played {cell}: {e}", searches[player].kind());
                break;
            }
        };
        moves = moves.with_step(steps as usize, cell);
        steps += 1;
        player = player.opposite();
    }
    RoundResult {
        board,
        outcome: board.check_terminal(),
        moves,
        steps,
        dt: t0.elapsed(),
        counter: total_counter,
    }
}

#[derive(Debug, Default)]
pub struct IterateMatchOpts {
    pub rounds: u32,
    pub random_seed: u64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MatchSummary {
    /// 2 per win, 1 per draw, from the point of view of the first strategy.
    pub score: u32,
    /// `score / (2 * rounds)`.
    pub rate: f32,
    pub counter: SearchCounter,
}

/// Plays `rounds` games between `searches.0` and `searches.1` in parallel.
/// Sides alternate: `searches.0` plays X in even rounds.
pub fn iterate_match<T: Strategy>(searches: &ByPlayer<T>, opts: IterateMatchOpts) -> MatchSummary {
    let IterateMatchOpts { rounds, random_seed } = opts;
    let matches_started = AtomicU32::default();
    let (score, counter) = (0..rounds)
        .into_par_iter()
        .map(|_| {
            let i = matches_started.fetch_add(1, Ordering::SeqCst);
            let flip = i % 2 == 0;
            let mut sides = searches.as_ref();
            if flip {
                std::mem::swap(&mut sides.0, &mut sides.1);
            }
            let mut rng = RngState::seed_from_u64(random_seed.wrapping_add(2).wrapping_mul(i as u64 + 1));

            println!("+ Round {:3}", i + 1);
            let round = match_round(sides, &mut rng);
            let (winner_str, d_score) = get_winner_value(round.outcome.winner(), flip);
            println!(
                "- Round {:3} ... {winner_str} {:2} moves dt={:6.2}ms, states_visited={:8}",
                i + 1,
                round.steps,
                round.dt.as_secs_f64() * 1e3,
                round.counter.states_visited
            );
            (d_score, round.counter)
        })
        .reduce(
            || (Default::default(), Default::default()),
            |(s, mut c), (s1, c1)| {
                c.add_in_place(&c1);
                (s + s1, c)
            },
        );

    MatchSummary {
        score,
        rate: score as f32 / (2 * rounds.max(1)) as f32,
        counter,
    }
}

/// Result string with O's score first, and the points earned by the first strategy.
pub fn get_winner_value(winner: Option<Player>, flip: bool) -> (&'static str, u32) {
    match winner {
        Some(Player::O) => {
            if flip {
                ("0-1", 0)
            } else {
                ("1-0", 2)
            }
        }
        Some(Player::X) => {
            if flip {
                ("1-0", 2)
            } else {
                ("0-1", 0)
            }
        }
        None => ("1/2", 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xo_arena_search::mcts::{Mcts, MctsConfig};

    fn mcts(iterations: u32) -> Mcts {
        Mcts::new(MctsConfig {
            iterations,
            ..Default::default()
        })
    }

    #[test]
    fn test_winner_value() {
        assert_eq!(("1-0", 2), get_winner_value(Some(Player::O), false));
        assert_eq!(("0-1", 0), get_winner_value(Some(Player::O), true));
        assert_eq!(("1-0", 2), get_winner_value(Some(Player::X), true));
        assert_eq!(("0-1", 0), get_winner_value(Some(Player::X), false));
        assert_eq!(("1/2", 1), get_winner_value(None, true));
    }

    #[test]
    fn test_round_is_played_to_the_end() {
        let (a, b) = (mcts(64), mcts(64));
        let mut rng = RngState::seed_from_u64(11);
        let round = match_round(ByPlayer(&a, &b), &mut rng);
        assert!(round.outcome.is_terminal());
        assert_eq!(round.steps as u32, 16 - round.board.count(Mark::Empty));
        let mut replay = Board::EMPTY;
        let mut player = Player::O;
        for cell in round.moves.iter(round.steps as usize) {
            replay = replay.play(cell, player).unwrap();
            player = player.opposite();
        }
        assert_eq!(round.board, replay);
    }

    #[test]
    fn test_scores_add_up() {
        let searches = ByPlayer(mcts(32), mcts(32));
        let summary = iterate_match(
            &searches,
            IterateMatchOpts {
                rounds: 4,
                random_seed: 3,
            },
        );
        assert!(summary.score <= 8);
        assert_eq!(summary.score as f32 / 8.0, summary.rate);
        assert!(summary.counter.states_visited > 0);
    }
}
