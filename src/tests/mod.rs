use crate::board::{Board, Cell};
use crate::types::Player;

pub mod prop_tests;

pub mod games;

/// Plays `cells` alternately starting with O. Panics on an illegal move.
pub(crate) fn play_all(cells: &[u8]) -> Board {
    let mut board = Board::EMPTY;
    let mut player = Player::O;
    for &c in cells {
        board = board.play(Cell::new(c).unwrap(), player).unwrap();
        player = player.opposite();
    }
    board
}
