use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use heapless::Deque;
use log::{debug, warn};
use thiserror::Error;
use xo_arena::prelude::*;
use xo_arena_search::StrategyKind;

/// Encoded size of one [`SnapshotRecord`].
pub const RECORD_SIZE: usize = 18;

/// Records that fit in one 4 KiB page.
pub const DEFAULT_CAPACITY: usize = 4096 / RECORD_SIZE;

/// Published state of one match.
///
/// Byte layout, little endian: match id (4), board (4), move record (8),
/// strategy ids with O in the low nibble (1), step count (1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub match_id: u32,
    pub board: Board,
    pub moves: MoveRecord,
    pub strategies: ByPlayer<StrategyKind>,
    pub steps: u8,
}

impl SnapshotRecord {
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        out[0..4].copy_from_slice(&self.match_id.to_le_bytes());
        out[4..8].copy_from_slice(&self.board.0.to_le_bytes());
        out[8..16].copy_from_slice(&self.moves.0.to_le_bytes());
        out[16] = self.strategies.0.id() | (self.strategies.1.id() << 4);
        out[17] = self.steps;
        out
    }

    /// `None` if the strategy byte names an unknown strategy.
    pub fn from_bytes(bytes: &[u8; RECORD_SIZE]) -> Option<Self> {
        let mut u32_at = [0u8; 4];
        let mut u64_at = [0u8; 8];
        u32_at.copy_from_slice(&bytes[0..4]);
        let match_id = u32::from_le_bytes(u32_at);
        u32_at.copy_from_slice(&bytes[4..8]);
        let board = Board(u32::from_le_bytes(u32_at));
        u64_at.copy_from_slice(&bytes[8..16]);
        let moves = MoveRecord(u64::from_le_bytes(u64_at));
        let strategies = ByPlayer(
            StrategyKind::from_id(bytes[16] & 0xf)?,
            StrategyKind::from_id(bytes[16] >> 4)?,
        );
        Some(Self {
            match_id,
            board,
            moves,
            strategies,
            steps: bytes[17],
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("no snapshot available")]
    WouldBlock,
    #[error("snapshot stream closed")]
    Closed,
    #[error("buffer holds {0} bytes, a snapshot needs 18")]
    BufferTooSmall(usize),
}

struct Queue<const N: usize> {
    records: Deque<SnapshotRecord, N>,
    closed: bool,
}

/// Bounded FIFO of snapshots between match workers and observers.
///
/// Publishing never waits: a record that does not fit is dropped and counted.
/// Reads either fail with [`ReadError::WouldBlock`] or wait until a record
/// arrives or the stream is closed.
pub struct SnapshotStream<const N: usize = DEFAULT_CAPACITY> {
    queue: Mutex<Queue<N>>,
    ready: Condvar,
    dropped: AtomicU64,
}

impl<const N: usize> std::fmt::Debug for SnapshotStream<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStream")
            .field("capacity", &N)
            .field("len", &self.len())
            .field("dropped", &self.dropped())
            .finish()
    }
}

impl<const N: usize> Default for SnapshotStream<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SnapshotStream<N> {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(Queue {
                records: Deque::new(),
                closed: false,
            }),
            ready: Condvar::new(),
            dropped: AtomicU64::new(0),
        }
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, Queue<N>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Records dropped because the stream was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Returns `false` if the record was dropped.
    pub fn publish(&self, record: SnapshotRecord) -> bool {
        let mut queue = self.lock();
        if queue.closed {
            return false;
        }
        if queue.records.push_back(record).is_err() {
            drop(queue);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("snapshot: {RECORD_SIZE} bytes dropped for match {}", record.match_id);
            return false;
        }
        debug!("snapshot: in {}/{} records", queue.records.len(), N);
        drop(queue);
        self.ready.notify_one();
        true
    }

    pub fn read(&self, blocking: bool) -> Result<SnapshotRecord, ReadError> {
        let mut queue = self.lock();
        loop {
            if let Some(record) = queue.records.pop_front() {
                return Ok(record);
            }
            if queue.closed {
                return Err(ReadError::Closed);
            }
            if !blocking {
                return Err(ReadError::WouldBlock);
            }
            queue = self.ready.wait(queue).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Copies as many whole records as fit into `buf` and returns the number
    /// of bytes written. Waits for the first record when `blocking`.
    pub fn read_into(&self, buf: &mut [u8], blocking: bool) -> Result<usize, ReadError> {
        if buf.len() < RECORD_SIZE {
            return Err(ReadError::BufferTooSmall(buf.len()));
        }
        let first = self.read(blocking)?;
        buf[..RECORD_SIZE].copy_from_slice(&first.to_bytes());
        let mut written = RECORD_SIZE;
        let mut queue = self.lock();
        for chunk in buf[RECORD_SIZE..].chunks_exact_mut(RECORD_SIZE) {
            let Some(record) = queue.records.pop_front() else { break };
            chunk.copy_from_slice(&record.to_bytes());
            written += RECORD_SIZE;
        }
        Ok(written)
    }

    /// Discards queued records and accepts new ones again.
    pub fn clear(&self) {
        let mut queue = self.lock();
        queue.records.clear();
        queue.closed = false;
    }

    /// Wakes every waiting reader. Queued records stay readable.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }
}
