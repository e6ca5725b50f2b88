//! The fixed table of three-cell win segments.
//!
//! Segments are produced from four line directions. Each direction carries the
//! step between consecutive cells and the half-open ranges of start rows and
//! columns. Every start position inside the range yields one segment, so the
//! table holds 8 row, 8 column, 4 primary-diagonal and 4 secondary-diagonal
//! segments, in that order.
use lazy_static::lazy_static;

use super::{Cell, BOARD_SIZE, GOAL};

pub const WIN_PATTERN_COUNT: usize = 24;

struct LineSpec {
    di: i32,
    dj: i32,
    i_lo: i32,
    j_lo: i32,
    i_hi: i32,
    j_hi: i32,
}

const LINES: [LineSpec; 4] = [
    // rows
    LineSpec { di: 0, dj: 1, i_lo: 0, j_lo: 0, i_hi: BOARD_SIZE as i32, j_hi: 2 },
    // columns
    LineSpec { di: 1, dj: 0, i_lo: 0, j_lo: 0, i_hi: 2, j_hi: BOARD_SIZE as i32 },
    // primary diagonals
    LineSpec { di: 1, dj: 1, i_lo: 0, j_lo: 0, i_hi: 2, j_hi: 2 },
    // secondary diagonals
    LineSpec { di: 1, dj: -1, i_lo: 0, j_lo: 2, i_hi: 2, j_hi: BOARD_SIZE as i32 },
];

/// Three cells in a line, plus the board bits that mean "all O" on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub cells: [Cell; GOAL],
    o_mask: u32,
}

impl Segment {
    fn new(cells: [Cell; GOAL]) -> Self {
        let o_mask = cells.iter().fold(0, |m, c| m | (1 << (2 * c.index())));
        Self { cells, o_mask }
    }

    /// Board bits set when O holds every cell of the segment.
    #[inline]
    pub const fn o_mask(&self) -> u32 {
        self.o_mask
    }

    /// Board bits set when X holds every cell of the segment.
    #[inline]
    pub const fn x_mask(&self) -> u32 {
        self.o_mask << 1
    }
}

fn generate() -> Vec<Segment> {
    let mut segments = Vec::with_capacity(WIN_PATTERN_COUNT);
    for line in &LINES {
        for i in line.i_lo..line.i_hi {
            for j in line.j_lo..line.j_hi {
                let mut cells = [Cell::default(); GOAL];
                let mut valid = true;
                for (k, slot) in cells.iter_mut().enumerate() {
                    let (r, c) = (i + line.di * k as i32, j + line.dj * k as i32);
                    match Cell::from_row_col(r, c) {
                        Some(cell) => *slot = cell,
                        None => valid = false,
                    }
                }
                if valid {
                    segments.push(Segment::new(cells));
                }
            }
        }
    }
    segments
}

lazy_static! {
    pub static ref WIN_SEGMENTS: Vec<Segment> = generate();
}
