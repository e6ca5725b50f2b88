use super::*;

use crate::board::{Board, Cell, Outcome, WIN_SEGMENTS};
use crate::types::Player;

fn wins_for(board: Board, player: Player) -> bool {
    WIN_SEGMENTS.iter().any(|seg| {
        let mask = match player {
            Player::O => seg.o_mask(),
            Player::X => seg.x_mask(),
        };
        board.0 & mask == mask
    })
}

proptest! {
    #[test]
    fn legal_moves_partition_the_board(board in arb_board()) {
        let moves = board.legal_moves();
        for w in moves.windows(2) {
            prop_assert!(w[0] < w[1]);
        }
        for cell in Cell::all() {
            prop_assert_eq!(board.is_empty_cell(cell), moves.contains(&cell));
        }
    }

    #[test]
    fn reachable_boards_never_have_two_winners(board in arb_reachable_board()) {
        prop_assert!(!(wins_for(board, Player::O) && wins_for(board, Player::X)));
        prop_assert!(board.to_move().is_some());
    }

    #[test]
    fn check_terminal_agrees_with_segment_scan(board in arb_reachable_board()) {
        let expected = if wins_for(board, Player::O) {
            Outcome::Win(Player::O)
        } else if wins_for(board, Player::X) {
            Outcome::Win(Player::X)
        } else if board.legal_moves().is_empty() {
            Outcome::Draw
        } else {
            Outcome::InProgress
        };
        prop_assert_eq!(expected, board.check_terminal());
    }

    #[test]
    fn canonical_key_round_trip(board in arb_board()) {
        let key = board.canonical_key();
        prop_assert_eq!(key, Board::from_canonical_key(key).canonical_key());
        prop_assert_eq!(board, Board::from_canonical_key(key));
    }

    #[test]
    fn heuristic_is_antisymmetric(board in arb_reachable_board()) {
        prop_assert_eq!(board.heuristic(Player::O), -board.heuristic(Player::X));
    }
}
