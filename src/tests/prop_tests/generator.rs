use proptest::prelude::*;

use crate::board::{Board, Cell, N_CELLS};
use crate::types::{Mark, Player};

pub fn arb_mark() -> impl Strategy<Value = Mark> {
    prop_oneof![Just(Mark::Empty), Just(Mark::O), Just(Mark::X)]
}

/// Any assignment of marks, legal or not.
pub fn arb_board() -> impl Strategy<Value = Board> {
    proptest::array::uniform16(arb_mark()).prop_map(|marks| {
        Cell::all()
            .zip(marks)
            .fold(Board::EMPTY, |b, (cell, mark)| b.set_cell(cell, mark))
    })
}

/// Boards reached by alternating legal placement from empty, stopping at the
/// first terminal position.
pub fn arb_reachable_board() -> impl Strategy<Value = Board> {
    let order: Vec<u8> = (0..N_CELLS as u8).collect();
    (Just(order).prop_shuffle(), 0..=N_CELLS).prop_map(|(order, len)| {
        let mut board = Board::EMPTY;
        let mut player = Player::O;
        for &c in order.iter().take(len) {
            let Some(cell) = Cell::new(c) else { break };
            match board.play(cell, player) {
                Ok(next) => board = next,
                Err(_) => break,
            }
            player = player.opposite();
        }
        board
    })
}
