use instant::Instant;
use log::debug;
use xo_arena::prelude::*;
use xo_arena::smallvec::SmallVec;

use crate::{SearchCounter, SearchResult, Strategy, StrategyKind};

pub mod transposition_table;
use transposition_table::{TTEntry, TTFlag, TTKey, TT};

/// Score of a won position for the side that won it.
pub const WIN: i32 = 1 << 20;

/// Static scores are clamped below this, so they never read as a decided game.
const MAX_STATIC: i32 = WIN / 2;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NegamaxConfig {
    /// Plies searched before falling back to the static heuristic.
    /// 16 or more searches every line to the end.
    pub max_depth: u8,
    pub tt_size_mb: u32,
}

impl Default for NegamaxConfig {
    fn default() -> Self {
        Self {
            max_depth: 16,
            tt_size_mb: transposition_table::DEFAULT_SIZE_MB,
        }
    }
}

/// Maps a search score onto the terminal value scale: a forced win reads 1,
/// a forced loss 0, a draw 1/2. Depth-limited static scores land in between.
pub fn to_fixed(value: i32) -> Fixed {
    match value {
        v if v >= WIN => Fixed::ONE,
        v if v <= -WIN => Fixed::ZERO,
        v => {
            let half = Fixed::HALF.0 as i32;
            Fixed((half + v.clamp(1 - half, half - 1)) as u32)
        }
    }
}

struct SearchContext<'a> {
    counter: SearchCounter,
    tt: &'a TT,
}

/// Alpha-beta negamax over a transposition table shared by all calls.
///
/// The root is scanned in ascending cell order with a strict comparison, so
/// among equally scored moves the lowest cell is returned, as a plain
/// unpruned negamax would. The single exception is an immediate win, which
/// is always preferred over a slower forced win.
#[derive(Debug)]
pub struct Negamax {
    pub config: NegamaxConfig,
    tt: TT,
}

impl Negamax {
    pub fn new(config: NegamaxConfig) -> Self {
        Self {
            config,
            tt: TT::new(config.tt_size_mb),
        }
    }

    /// Forgets every stored position.
    pub fn clear_table(&self) {
        let n = self.tt.occupied();
        self.tt.clear();
        debug!("negamax: cleared {n} table entries");
    }

    /// Best score for `player` (on the terminal value scale) and the move achieving it.
    pub fn evaluate(&self, board: Board, player: Player) -> (Fixed, Option<Cell>) {
        let result = self.search_root(board, player);
        (result.eval.unwrap_or(Fixed::HALF), result.best_move)
    }

    fn search_root(&self, board: Board, player: Player) -> SearchResult {
        let outcome = board.check_terminal();
        if outcome.is_terminal() {
            let counter = SearchCounter::EVAL;
            return SearchResult::new(None, Some(terminal_value(outcome, player)), counter);
        }
        let mut ctx = SearchContext {
            counter: SearchCounter::ZERO,
            tt: &self.tt,
        };
        let moves = board.legal_moves();
        if let Some(&mv) = moves.iter().find(|&&mv| wins_with(board, mv, player)) {
            ctx.counter.add_in_place(&SearchCounter::EVAL);
            return SearchResult::new(Some(mv), Some(Fixed::ONE), ctx.counter);
        }

        let depth = self.config.max_depth.max(1);
        let (mut alpha, beta) = (-WIN, WIN);
        let mut best = (i32::MIN, None);
        for mv in moves {
            let child = board.set_cell(mv, player.mark());
            ctx.counter.states_visited += 1;
            let v = -negamax(child, player.opposite(), depth - 1, (-beta, -alpha), &mut ctx);
            if v > best.0 {
                best = (v, Some(mv));
            }
            alpha = alpha.max(v);
        }
        SearchResult::new(best.1, Some(to_fixed(best.0)), ctx.counter)
    }
}

#[inline]
fn wins_with(board: Board, mv: Cell, player: Player) -> bool {
    board.set_cell(mv, player.mark()).check_terminal() == Outcome::Win(player)
}

/// Immediate wins first, then the remembered best move, then ascending order.
fn ordered_moves(board: Board, player: Player, tt_move: Option<Cell>) -> SmallVec<[Cell; 16]> {
    let mut moves = board.legal_moves();
    moves.sort_by_key(|&mv| {
        if wins_with(board, mv, player) {
            0
        } else if Some(mv) == tt_move {
            1
        } else {
            2
        }
    });
    moves
}

/// How `best` bounds the true value, given the window it was searched with.
/// In a zero-width window a cut value is also `<= alpha0`; it is still a lower bound.
#[inline]
fn bound_flag(best: i32, alpha0: i32, beta: i32) -> TTFlag {
    if best >= beta {
        TTFlag::Lower
    } else if best <= alpha0 {
        TTFlag::Upper
    } else {
        TTFlag::Exact
    }
}

/// Value of `board` for `player`, the side to move.
fn negamax(board: Board, player: Player, depth: u8, ab: (i32, i32), ctx: &mut SearchContext) -> i32 {
    match board.check_terminal() {
        Outcome::Win(p) => {
            ctx.counter.evals += 1;
            return if p == player { WIN } else { -WIN };
        }
        Outcome::Draw => {
            ctx.counter.evals += 1;
            return 0;
        }
        Outcome::InProgress => {}
    }
    if depth == 0 {
        ctx.counter.evals += 1;
        return board.heuristic(player).clamp(-MAX_STATIC, MAX_STATIC);
    }

    let (mut alpha, mut beta) = ab;
    let key = TTKey::new(board, player);
    let mut tt_move = None;
    if let Some(entry) = ctx.tt.get(&key) {
        tt_move = entry.best_move;
        if entry.depth >= depth {
            ctx.counter.tt_hits += 1;
            match entry.flag {
                TTFlag::Exact => return entry.value,
                TTFlag::Lower => alpha = alpha.max(entry.value),
                TTFlag::Upper => beta = beta.min(entry.value),
            }
            if alpha >= beta {
                return entry.value;
            }
        }
    }

    let alpha0 = alpha;
    let mut best = i32::MIN;
    let mut best_move = None;
    for mv in ordered_moves(board, player, tt_move) {
        let child = board.set_cell(mv, player.mark());
        ctx.counter.states_visited += 1;
        let v = -negamax(child, player.opposite(), depth - 1, (-beta, -alpha), ctx);
        if v > best {
            best = v;
            best_move = Some(mv);
        }
        alpha = alpha.max(v);
        if alpha >= beta {
            break;
        }
    }

    ctx.tt.insert(
        key,
        TTEntry {
            flag: bound_flag(best, alpha0, beta),
            depth,
            value: best,
            best_move,
        },
    );
    best
}

impl Strategy for Negamax {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Negamax
    }

    fn search(&self, board: Board, player: Player, _rng: &mut RngState) -> SearchResult {
        let t0 = Instant::now();
        let result = self.search_root(board, player);
        debug!(
            "negamax: {player} plays {:?} eval={:?} {}",
            result.best_move,
            result.eval,
            result.counter.summary(t0.elapsed().as_nanos())
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use xo_arena::rand::Rng;

    use super::*;

    fn board(s: &str) -> Board {
        s.parse().unwrap()
    }

    fn negamax_default() -> Negamax {
        Negamax::new(NegamaxConfig {
            tt_size_mb: 4,
            ..Default::default()
        })
    }

    /// Plain negamax without pruning or tables, for comparison.
    fn reference(board: Board, player: Player) -> i32 {
        match board.check_terminal() {
            Outcome::Win(p) => return if p == player { WIN } else { -WIN },
            Outcome::Draw => return 0,
            Outcome::InProgress => {}
        }
        board
            .legal_moves()
            .into_iter()
            .map(|mv| -reference(board.set_cell(mv, player.mark()), player.opposite()))
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn test_terminal_board_scores_terminal_value() {
        let nm = negamax_default();
        let won = board("OOO. XX.. .... ....");
        assert_eq!((Fixed::ONE, None), nm.evaluate(won, Player::O));
        assert_eq!((Fixed::ZERO, None), nm.evaluate(won, Player::X));
        let draw = board("OOXX XXOO OOXX XXOO");
        assert_eq!((Fixed::HALF, None), nm.evaluate(draw, Player::O));
    }

    #[test]
    fn test_takes_immediate_win() {
        // X threatens 15; O completes the top row first
        let b = board("OO.. .X.. ..X. ....");
        let (score, mv) = negamax_default().evaluate(b, Player::O);
        assert_eq!(Cell::new(2), mv);
        assert_eq!(Fixed::ONE, score);
    }

    #[test]
    fn test_blocks_only_threat() {
        // X threatens 5; blocking there also wins for O
        let b = board("O..X X..O ..XO .O.X");
        let (score, mv) = negamax_default().evaluate(b, Player::O);
        assert_eq!(Cell::new(5), mv);
        assert_eq!(Fixed::ONE, score);
    }

    #[test]
    fn test_matches_plain_negamax() {
        let positions = [
            ".X.O O.XX ..O. XO..",
            "O..X X..O ..XO .O.X",
            ".OX. ..X. ..OO O..X",
            ".XOX OO.O ..X. O..X",
        ];
        let nm = negamax_default();
        for p in positions {
            let b = board(p);
            let player = b.to_move().unwrap();
            let (score, mv) = nm.evaluate(b, player);
            let expected = reference(b, player);
            assert_eq!(to_fixed(expected), score, "{p}");
            let mv = mv.unwrap();
            let after = -reference(b.set_cell(mv, player.mark()), player.opposite());
            assert_eq!(expected, after, "{p}: {mv} is not a best move");
        }
    }

    fn solve(board: Board, player: Player, memo: &mut HashMap<(Board, Player), i32>) -> i32 {
        match board.check_terminal() {
            Outcome::Win(p) => return if p == player { WIN } else { -WIN },
            Outcome::Draw => return 0,
            Outcome::InProgress => {}
        }
        if let Some(&v) = memo.get(&(board, player)) {
            return v;
        }
        let mut best = i32::MIN;
        for mv in board.legal_moves() {
            best = best.max(-solve(board.set_cell(mv, player.mark()), player.opposite(), memo));
        }
        memo.insert((board, player), best);
        best
    }

    /// Positions with at most `max_empty` free cells from seeded random games.
    fn random_positions(games: u32, max_empty: u32, seed: u64) -> Vec<Board> {
        let mut rng = RngState::seed_from_u64(seed);
        let mut positions = Vec::new();
        for _ in 0..games {
            let mut b = Board::EMPTY;
            let mut player = Player::O;
            while !b.check_terminal().is_terminal() {
                if b.count(Mark::Empty) <= max_empty {
                    positions.push(b);
                }
                let moves = b.legal_moves();
                b = b.set_cell(moves[rng.gen_range(0..moves.len())], player.mark());
                player = player.opposite();
            }
        }
        positions
    }

    #[test]
    fn test_shared_table_matches_solver() {
        // one instance for every position, as in a running arena
        let nm = negamax_default();
        let mut memo = HashMap::new();
        let positions = random_positions(300, 10, 17);
        assert!(positions.len() > 100);
        for b in positions {
            let player = b.to_move().unwrap();
            let expected = solve(b, player, &mut memo);
            let (score, mv) = nm.evaluate(b, player);
            assert_eq!(to_fixed(expected), score, "{b:?}");
            let mv = mv.unwrap();
            let after = -solve(b.set_cell(mv, player.mark()), player.opposite(), &mut memo);
            assert_eq!(expected, after, "{b:?}: {mv} is not a best move");
        }
    }

    #[test]
    fn test_clear_table() {
        let nm = Negamax::new(NegamaxConfig {
            max_depth: 3,
            tt_size_mb: 1,
        });
        let b = board("O... .X.. .... ....");
        let first = nm.evaluate(b, Player::O);
        assert!(nm.tt.occupied() > 0);
        nm.clear_table();
        assert_eq!(0, nm.tt.occupied());
        assert_eq!(first, nm.evaluate(b, Player::O));
    }

    #[test]
    fn test_cut_in_zero_width_window_is_lower_bound() {
        assert_eq!(TTFlag::Lower, bound_flag(WIN, WIN, WIN));
        assert_eq!(TTFlag::Lower, bound_flag(3, -2, 3));
        assert_eq!(TTFlag::Upper, bound_flag(-5, -2, 3));
        assert_eq!(TTFlag::Exact, bound_flag(1, -2, 3));
    }

    #[test]
    #[ignore = "full game tree; run with --release"]
    fn test_first_player_wins_from_empty_board() {
        let nm = Negamax::new(NegamaxConfig {
            tt_size_mb: 64,
            ..Default::default()
        });
        let (score, mv) = nm.evaluate(Board::EMPTY, Player::O);
        assert_eq!(Fixed::ONE, score);
        assert!(mv.is_some());
    }

    #[test]
    fn test_depth_limited_still_legal() {
        let nm = Negamax::new(NegamaxConfig {
            max_depth: 2,
            tt_size_mb: 1,
        });
        let b = board("O... .X.. .... ....");
        let (score, mv) = nm.evaluate(b, Player::O);
        assert!(b.is_empty_cell(mv.unwrap()));
        assert!(score > Fixed::ZERO && score < Fixed::ONE);
    }

    #[test]
    fn test_to_fixed() {
        assert_eq!(Fixed::ONE, to_fixed(WIN));
        assert_eq!(Fixed::ZERO, to_fixed(-WIN));
        assert_eq!(Fixed::HALF, to_fixed(0));
        assert_eq!(Fixed(255), to_fixed(1000));
        assert_eq!(Fixed(1), to_fixed(-1000));
    }
}
