//! Static evaluation of non-terminal boards.
use super::patterns::WIN_SEGMENTS;
use super::{Board, Mark};
use crate::types::Player;

/// Score of one segment for `player`: `10^(k-1)` for k own marks on an
/// otherwise empty segment, the negation for k opponent marks, and zero for a
/// mixed or empty segment.
fn segment_score(board: Board, cells: &[super::Cell], player: Player) -> i32 {
    let own = player.mark();
    let mut score = 0i32;
    for &cell in cells {
        match board.get_cell(cell) {
            Mark::Empty => {}
            mark if mark == own => {
                if score < 0 {
                    return 0;
                }
                score = if score == 0 { 1 } else { score * 10 };
            }
            _ => {
                if score > 0 {
                    return 0;
                }
                score = if score == 0 { -1 } else { score * 10 };
            }
        }
    }
    score
}

impl Board {
    /// Sum of segment scores over all win segments, from `player`'s point of view.
    pub fn heuristic(self, player: Player) -> i32 {
        WIN_SEGMENTS
            .iter()
            .map(|seg| segment_score(self, &seg.cells, player))
            .sum()
    }
}
