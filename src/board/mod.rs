//! The 4x4 board packed into a `u32`, two bits per cell.
//!
//! Cell `i` (row-major, `0..16`) occupies bits `2i..2i+2`. Codes follow
//! [`Mark`]: 0 empty, 1 O, 2 X.
use std::fmt::{Display, Write};
use std::str::FromStr;

use smallvec::SmallVec;
use thiserror::Error;

use crate::fixed_point::Fixed;
use crate::types::{Mark, Player};

mod heuristic;
pub mod patterns;

pub use patterns::{Segment, WIN_PATTERN_COUNT, WIN_SEGMENTS};

pub const BOARD_SIZE: usize = 4;
pub const GOAL: usize = 3;
pub const N_CELLS: usize = BOARD_SIZE * BOARD_SIZE;

/// A cell index in `0..16`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cell(u8);

impl Cell {
    #[inline]
    pub const fn new(index: u8) -> Option<Cell> {
        if (index as usize) < N_CELLS {
            Some(Cell(index))
        } else {
            None
        }
    }

    #[inline]
    pub const fn from_row_col(row: i32, col: i32) -> Option<Cell> {
        if row < 0 || col < 0 || row >= BOARD_SIZE as i32 || col >= BOARD_SIZE as i32 {
            return None;
        }
        Some(Cell((row as usize * BOARD_SIZE + col as usize) as u8))
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn row(self) -> usize {
        self.index() / BOARD_SIZE
    }

    #[inline]
    pub const fn col(self) -> usize {
        self.index() % BOARD_SIZE
    }

    pub fn all() -> impl DoubleEndedIterator<Item = Cell> + ExactSizeIterator {
        (0..N_CELLS as u8).map(Cell)
    }
}

impl TryFrom<usize> for Cell {
    type Error = BoardError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .and_then(Cell::new)
            .ok_or(BoardError::CellOutOfRange(value))
    }
}

impl Display for Cell {
    /// Column letter then row number, e.g. `a1` for cell 0.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_char((b'a' + self.col() as u8) as char)?;
        write!(f, "{}", self.row() + 1)
    }
}

/// Result of scanning a board for completed segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Outcome {
    InProgress,
    Win(Player),
    Draw,
}

impl Outcome {
    #[inline]
    pub fn is_terminal(self) -> bool {
        self != Outcome::InProgress
    }

    #[inline]
    pub fn winner(self) -> Option<Player> {
        match self {
            Outcome::Win(p) => Some(p),
            _ => None,
        }
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::InProgress => f.write_str("in progress"),
            Outcome::Win(p) => write!(f, "{p} wins"),
            Outcome::Draw => f.write_str("draw"),
        }
    }
}

/// Value of `outcome` for `player`: 1 for a win, 0 for a loss, 1/2 otherwise.
#[inline]
pub fn terminal_value(outcome: Outcome, player: Player) -> Fixed {
    match outcome {
        Outcome::Win(p) if p == player => Fixed::ONE,
        Outcome::Win(_) => Fixed::ZERO,
        Outcome::Draw | Outcome::InProgress => Fixed::HALF,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("cell index out of range: {0}")]
    CellOutOfRange(usize),
    #[error("cell is occupied: {0}")]
    CellOccupied(Cell),
    #[error("game is over")]
    GameOver,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseBoardError {
    #[error("invalid cell character: {0:?}")]
    InvalidChar(char),
    #[error("expected 16 cells, found {0}")]
    WrongLength(usize),
}

/// Legal moves, ascending.
pub type Moves = SmallVec<[Cell; N_CELLS]>;

/// Base-3 encoding of a board: `sum(code(cell_i) * 3^i)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateKey(pub u32);

impl StateKey {
    /// 3^16
    pub const COUNT: u32 = 43_046_721;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Board(pub u32);

const LOW_BITS: u32 = 0x5555_5555;

impl Board {
    pub const EMPTY: Board = Board(0);

    #[inline]
    pub const fn get_cell(self, cell: Cell) -> Mark {
        Mark::from_bits(self.0 >> (2 * cell.index()))
    }

    #[inline]
    pub const fn set_cell(self, cell: Cell, mark: Mark) -> Board {
        let shift = 2 * cell.index();
        Board((self.0 & !(0b11 << shift)) | (mark.bits() << shift))
    }

    #[inline]
    pub const fn is_empty_cell(self, cell: Cell) -> bool {
        (self.0 >> (2 * cell.index())) & 0b11 == 0
    }

    /// True if any cell is empty.
    #[inline]
    pub const fn has_empty_cell(self) -> bool {
        let occupied = (self.0 | (self.0 >> 1)) & LOW_BITS;
        occupied != LOW_BITS
    }

    #[inline]
    pub const fn count(self, mark: Mark) -> u32 {
        match mark {
            Mark::Empty => N_CELLS as u32 - self.count(Mark::O) - self.count(Mark::X),
            Mark::O => (self.0 & !(self.0 >> 1) & LOW_BITS).count_ones(),
            Mark::X => ((self.0 >> 1) & !self.0 & LOW_BITS).count_ones(),
        }
    }

    /// Side to move on a board reached by alternating play from empty, `None` otherwise.
    pub const fn to_move(self) -> Option<Player> {
        let (o, x) = (self.count(Mark::O), self.count(Mark::X));
        if o == x {
            Some(Player::O)
        } else if o == x + 1 {
            Some(Player::X)
        } else {
            None
        }
    }

    pub fn legal_moves(self) -> Moves {
        Cell::all().filter(|&c| self.is_empty_cell(c)).collect()
    }

    /// Scans the win segments in table order, O before X per segment.
    pub fn check_terminal(self) -> Outcome {
        if self.0 == 0 {
            return Outcome::InProgress;
        }
        for seg in WIN_SEGMENTS.iter() {
            if self.0 & seg.o_mask() == seg.o_mask() {
                return Outcome::Win(Player::O);
            }
            if self.0 & seg.x_mask() == seg.x_mask() {
                return Outcome::Win(Player::X);
            }
        }
        if self.has_empty_cell() {
            Outcome::InProgress
        } else {
            Outcome::Draw
        }
    }

    /// Places `player`'s mark on `cell`.
    pub fn play(self, cell: Cell, player: Player) -> Result<Board, BoardError> {
        if self.check_terminal().is_terminal() {
            return Err(BoardError::GameOver);
        }
        if !self.is_empty_cell(cell) {
            return Err(BoardError::CellOccupied(cell));
        }
        Ok(self.set_cell(cell, player.mark()))
    }

    pub fn canonical_key(self) -> StateKey {
        let key = Cell::all()
            .rev()
            .fold(0u32, |acc, c| acc * 3 + self.get_cell(c).bits());
        StateKey(key)
    }

    pub fn from_canonical_key(key: StateKey) -> Board {
        let mut k = key.0;
        let mut board = Board::EMPTY;
        for cell in Cell::all() {
            board = board.set_cell(cell, Mark::from_bits(k % 3));
            k /= 3;
        }
        board
    }
}

impl Display for Board {
    /// Four rows of `O`, `X` and `.`, separated by newlines.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for cell in Cell::all() {
            if cell.index() > 0 && cell.col() == 0 {
                f.write_char('\n')?;
            }
            f.write_char(self.get_cell(cell).to_char())?;
        }
        Ok(())
    }
}

impl FromStr for Board {
    type Err = ParseBoardError;

    /// Accepts 16 cells of `O`, `X`, `.` or `_`; whitespace and `/` are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut board = Board::EMPTY;
        let mut n = 0usize;
        for ch in s.chars().filter(|c| !c.is_whitespace() && *c != '/') {
            let mark = match ch {
                'O' | 'o' => Mark::O,
                'X' | 'x' => Mark::X,
                '.' | '_' => Mark::Empty,
                c => return Err(ParseBoardError::InvalidChar(c)),
            };
            if let Some(cell) = u8::try_from(n).ok().and_then(Cell::new) {
                board = board.set_cell(cell, mark);
            }
            n += 1;
        }
        if n != N_CELLS {
            return Err(ParseBoardError::WrongLength(n));
        }
        Ok(board)
    }
}
