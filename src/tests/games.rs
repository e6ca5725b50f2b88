use super::play_all;
use crate::board::{terminal_value, Board, Cell, Outcome};
use crate::fixed_point::Fixed;
use crate::types::{Mark, MoveRecord, Player};

#[test]
fn row_win_ends_game() {
    // O: 0 1 2, X: 4 5
    let board = play_all(&[0, 4, 1, 5, 2]);
    assert_eq!(Outcome::Win(Player::O), board.check_terminal());
    assert_eq!(Fixed::ONE, terminal_value(board.check_terminal(), Player::O));
    assert_eq!(Fixed::ZERO, terminal_value(board.check_terminal(), Player::X));
}

#[test]
fn secondary_diagonal_win() {
    // X: 3 6 9
    let board = play_all(&[0, 3, 1, 6, 12, 9]);
    assert_eq!(Outcome::Win(Player::X), board.check_terminal());
}

#[test]
fn move_record_replays_to_same_board() {
    let cells = [5u8, 0, 10, 15, 6, 9];
    let board = play_all(&cells);
    let record = cells
        .iter()
        .enumerate()
        .fold(MoveRecord::EMPTY, |r, (i, &c)| r.with_step(i, Cell::new(c).unwrap()));
    let mut replay = Board::EMPTY;
    for (i, cell) in record.iter(cells.len()).enumerate() {
        let mark = if i % 2 == 0 { Mark::O } else { Mark::X };
        replay = replay.set_cell(cell, mark);
    }
    assert_eq!(board, replay);
}
