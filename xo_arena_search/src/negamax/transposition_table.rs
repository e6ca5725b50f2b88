use xo_arena::prelude::*;

use crate::transposition_table::CacheTable;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TTFlag {
    /// Search raised alpha and was not pruned (PV-node)
    Exact,
    /// Search was beta pruned (CUT-node)
    Lower,
    /// Search did not raise alpha (ALL-node)
    Upper,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TTEntry {
    pub flag: TTFlag,
    /// Remaining search depth the value was computed with.
    pub depth: u8,
    pub value: i32,
    pub best_move: Option<Cell>,
}

/// Board and side to move.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct TTKey(pub u64);

impl TTKey {
    #[inline]
    pub fn new(board: Board, to_move: Player) -> Self {
        Self(board.0 as u64 | ((to_move.index() as u64) << 32))
    }
}

impl From<TTKey> for usize {
    /// Fibonacci hashing, so that boards differing in one cell spread over the table.
    #[inline]
    fn from(value: TTKey) -> Self {
        (value.0.wrapping_mul(0x9e37_79b9_7f4a_7c15) >> 16) as usize
    }
}

pub struct TT {
    pub table: CacheTable<TTKey, TTEntry>,
}

impl std::fmt::Debug for TT {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TT").field("megabytes", &self.table.megabytes()).finish()
    }
}

pub const DEFAULT_SIZE_MB: u32 = 16;

impl TT {
    pub fn new(size_mb: u32) -> Self {
        Self {
            table: CacheTable::new(size_mb as usize),
        }
    }

    #[inline]
    pub fn get(&self, key: &TTKey) -> Option<TTEntry> {
        self.table.get(key)
    }

    #[inline]
    pub fn occupied(&self) -> usize {
        self.table.occupied_count()
    }

    pub fn clear(&self) {
        self.table.clear();
    }

    /// Keeps the deeper of the old and the new entry.
    #[inline]
    pub fn insert(&self, key: TTKey, entry: TTEntry) {
        let depth = entry.depth;
        self.table.replace_if(&key, entry, |old| old.depth <= depth);
    }
}

impl Default for TT {
    fn default() -> Self {
        Self::new(DEFAULT_SIZE_MB)
    }
}
