use std::fmt::Display;

use crate::board::Cell;

/// Ordered log of played cells, 4 bits per step with step 0 in the lowest nibble.
///
/// Holds up to [`MoveRecord::MAX_STEPS`] steps. The record does not know its own
/// length; callers keep the step count next to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MoveRecord(pub u64);

impl MoveRecord {
    pub const MAX_STEPS: usize = 16;
    const STEP_BITS: usize = 4;
    const STEP_MASK: u64 = 0xf;

    pub const EMPTY: MoveRecord = MoveRecord(0);

    /// Writes `cell` at `step`, replacing the whole nibble. Steps past the end are ignored.
    #[inline]
    pub const fn with_step(self, step: usize, cell: Cell) -> Self {
        if step >= Self::MAX_STEPS {
            return self;
        }
        let shift = step * Self::STEP_BITS;
        let cleared = self.0 & !(Self::STEP_MASK << shift);
        Self(cleared | ((cell.index() as u64) << shift))
    }

    #[inline]
    pub fn step(self, step: usize) -> Option<Cell> {
        if step >= Self::MAX_STEPS {
            return None;
        }
        Cell::new(((self.0 >> (step * Self::STEP_BITS)) & Self::STEP_MASK) as u8)
    }

    /// The first `len` recorded cells in play order.
    pub fn iter(self, len: usize) -> impl Iterator<Item = Cell> {
        (0..len.min(Self::MAX_STEPS)).filter_map(move |i| self.step(i))
    }

    /// Displays the first `len` steps as `a1 b2 ...`.
    pub fn display(self, len: usize) -> MoveRecordDisplay {
        MoveRecordDisplay { record: self, len }
    }
}

pub struct MoveRecordDisplay {
    record: MoveRecord,
    len: usize,
}

impl Display for MoveRecordDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, cell) in self.record.iter(self.len).enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{cell}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(i: u8) -> Cell {
        Cell::new(i).unwrap()
    }

    #[test]
    fn test_steps_are_nibbles() {
        let r = MoveRecord::EMPTY.with_step(0, cell(5)).with_step(1, cell(15));
        assert_eq!(0xf5, r.0);
        assert_eq!(vec![cell(5), cell(15)], r.iter(2).collect::<Vec<_>>());
    }

    #[test]
    fn test_overwrite_clears_all_four_bits() {
        let r = MoveRecord::EMPTY.with_step(3, cell(15)).with_step(3, cell(0));
        assert_eq!(Some(cell(0)), r.step(3));
        assert_eq!(0, r.0);
    }

    #[test]
    fn test_last_step() {
        let r = MoveRecord::EMPTY.with_step(15, cell(9));
        assert_eq!(Some(cell(9)), r.step(15));
        assert_eq!(r, r.with_step(16, cell(1)));
        assert_eq!(None, r.step(16));
    }

    #[test]
    fn test_display() {
        let r = MoveRecord::EMPTY.with_step(0, cell(0)).with_step(1, cell(6));
        assert_eq!("a1 c2", r.display(2).to_string());
    }
}
