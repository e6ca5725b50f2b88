use std::sync::{Arc, Condvar, Mutex, PoisonError};

use instant::Instant;
use log::{debug, info, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};
use xo_arena::prelude::*;
use xo_arena::smallvec::SmallVec;
use xo_arena_search::{StrategyKind, StrategySet};

use crate::config::ArenaConfig;
use crate::control::Control;
use crate::error::ArenaError;
use crate::snapshot::SnapshotStream;
use crate::stats::LoadAggregator;

mod slot;
pub use slot::*;

/// Counts jobs handed to the pool that have not completed yet.
#[derive(Debug, Default)]
pub struct JobTracker {
    pending: Mutex<usize>,
    idle: Condvar,
}

struct JobDone<'a>(&'a JobTracker);

impl Drop for JobDone<'_> {
    fn drop(&mut self) {
        self.0.end();
    }
}

impl JobTracker {
    fn begin(&self) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn end(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }

    pub fn pending(&self) -> usize {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until every dispatched job has completed.
    pub fn wait_idle(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        while *pending > 0 {
            pending = self.idle.wait(pending).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// What one tick observed and dispatched.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Matches still being played, with or without a computation in flight.
    pub unfinished: usize,
    /// Unfinished matches whose previous computation has not completed.
    pub in_flight: usize,
    /// Move computations handed to the pool.
    pub dispatched: usize,
    /// Snapshot jobs handed to the pool.
    pub publish_jobs: usize,
    /// Finished matches restarted on this tick.
    pub resets: usize,
    /// Finished matches left waiting because of the stop flag.
    pub parked: usize,
    /// Whether the driver should schedule another tick.
    pub reschedule: bool,
}

/// Everything the scheduler and its jobs share.
#[derive(Debug)]
pub struct Context {
    pub slots: Vec<MatchSlot>,
    pub strategies: StrategySet,
    pub control: Arc<Control>,
    pub snapshots: Arc<SnapshotStream>,
    pub stats: Arc<LoadAggregator>,
    pub jobs: JobTracker,
    rng: RngSource,
    randomize: bool,
    fixed: Option<ByPlayer<StrategyKind>>,
    continuous: bool,
}

impl Context {
    fn pick_strategies(&self) -> ByPlayer<StrategyKind> {
        if let Some(fixed) = self.fixed {
            return fixed;
        }
        let mut rng = self.rng.fork();
        ByPlayer(
            self.strategies.random_kind(&mut rng),
            self.strategies.random_kind(&mut rng),
        )
    }

    /// Computes and applies one move of `player` in slot `index`.
    fn play_move(&self, index: usize, player: Player) {
        let slot = &self.slots[index];
        let t0 = Instant::now();
        let kind;
        {
            let mut st = slot.lock();
            kind = self.strategies.resolve(st.strategies[player]);
            let board = st.board;
            let mut rng = self.rng.fork();
            let result = self.strategies.get(kind).search(board, player, &mut rng);
            if let Err(err) = self.apply_move(&mut st, player, result.best_move) {
                warn!("match {}: {kind} chose {:?} for {player}: {err}", slot.id, result.best_move);
            }
        }
        slot.release();

        let nanos = t0.elapsed().as_nanos() as u64;
        self.stats.record(index, player, nanos);
        debug!("match {}: {player} ({kind}) completed in {} usec", slot.id, nanos >> 10);
    }

    /// Plays `mv` for `player` and hands the turn over. `None` passes, and so
    /// does a move the board rejects.
    fn apply_move(&self, st: &mut SlotState, player: Player, mv: Option<Cell>) -> Result<(), BoardError> {
        st.turn = player.opposite();
        let Some(mv) = mv else { return Ok(()) };
        let next = st.board.play(mv, player)?;
        st.board = next;
        st.moves = st.moves.with_step(st.steps as usize, mv);
        st.steps += 1;
        if st.uses(StrategyKind::Rl) {
            self.strategies.rl().record_step(&mut st.trace, next, player);
        }
        Ok(())
    }

    fn publish(&self, index: usize) {
        if !self.control.display() {
            return;
        }
        let slot = &self.slots[index];
        let record = slot.lock().record(slot.id);
        self.snapshots.publish(record);
    }

    /// Learns from a finished match and starts the next one.
    fn restart(&self, st: &mut SlotState, outcome: Outcome) {
        if st.uses(StrategyKind::Rl) && self.strategies.is_available(StrategyKind::Rl) {
            let mut trace = std::mem::take(&mut st.trace);
            trace.finish(outcome);
            self.strategies.rl().apply_trace(&trace);
        }
        st.reset(if self.randomize { self.pick_strategies() } else { st.strategies });
    }
}

/// Drives every match slot: one tick inspects all of them, restarts or parks
/// finished matches and hands out move computations to the worker pool.
///
/// The tick never waits on a computation. A slot whose previous computation
/// is still running is skipped until its `finished` flag is set again.
pub struct Scheduler {
    ctx: Arc<Context>,
    pool: ThreadPool,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("matches", &self.ctx.slots.len())
            .field("workers", &self.pool.current_num_threads())
            .finish()
    }
}

impl Scheduler {
    pub fn new(
        config: &ArenaConfig,
        control: Arc<Control>,
        snapshots: Arc<SnapshotStream>,
        stats: Arc<LoadAggregator>,
    ) -> Result<Self, ArenaError> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers.unwrap_or(0))
            .thread_name(|i| format!("xo-worker-{i}"))
            .build()?;
        let mut ctx = Context {
            slots: Vec::with_capacity(config.matches),
            strategies: config.strategy_set(),
            control,
            snapshots,
            stats,
            jobs: JobTracker::default(),
            rng: RngSource::new(config.seed),
            randomize: config.randomize_strategies,
            fixed: config.strategies,
            continuous: config.continuous,
        };
        for id in 0..config.matches {
            let strategies = ctx.pick_strategies();
            ctx.slots.push(MatchSlot::new(id as u32, strategies));
        }
        Ok(Self {
            ctx: Arc::new(ctx),
            pool,
        })
    }

    #[inline]
    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    #[inline]
    pub fn strategies(&self) -> &StrategySet {
        &self.ctx.strategies
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ctx.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ctx.slots.is_empty()
    }

    pub fn slot_state(&self, index: usize) -> Option<SlotState> {
        self.ctx.slots.get(index).map(|slot| slot.lock().clone())
    }

    /// Runs `f` on a slot's state under its lock.
    pub fn with_slot<R>(&self, index: usize, f: impl FnOnce(&mut SlotState) -> R) -> Option<R> {
        self.ctx.slots.get(index).map(|slot| f(&mut slot.lock()))
    }

    /// Starts every match over. Only valid while no job is in flight.
    pub fn reset_all(&self) {
        self.ctx.jobs.wait_idle();
        for slot in &self.ctx.slots {
            let strategies = self.ctx.pick_strategies();
            slot.lock().reset(strategies);
        }
    }

    pub fn wait_idle(&self) {
        self.ctx.jobs.wait_idle();
    }

    /// A random stream independent of every match.
    pub fn fork_rng(&self) -> RngState {
        self.ctx.rng.fork()
    }

    fn spawn<F: FnOnce(&Context) + Send + 'static>(&self, f: F) {
        let ctx = self.ctx.clone();
        ctx.jobs.begin();
        self.pool.spawn(move || {
            let _done = JobDone(&ctx.jobs);
            f(&ctx);
        });
    }

    pub fn tick(&self) -> TickReport {
        let t0 = Instant::now();
        let ctx = &*self.ctx;
        let stop = ctx.control.stopped();
        let display = ctx.control.display();
        let mut report = TickReport::default();
        // (slot, side to move if no computation is in flight)
        let mut unfinished: SmallVec<[(usize, Option<Player>); 16]> = SmallVec::new();

        for (index, slot) in ctx.slots.iter().enumerate() {
            if !slot.is_finished() {
                unfinished.push((index, None));
                continue;
            }
            let mut st = slot.lock();
            let outcome = st.board.check_terminal();
            if !outcome.is_terminal() {
                unfinished.push((index, Some(st.turn)));
                continue;
            }
            if !st.parked {
                info!(
                    "match {}: {outcome} after {} moves [{}]",
                    slot.id,
                    st.steps,
                    st.moves.display(st.steps as usize)
                );
                if display {
                    ctx.snapshots.publish(st.record(slot.id));
                }
            }
            if stop {
                st.parked = true;
                report.parked += 1;
            } else {
                ctx.restart(&mut st, outcome);
                report.resets += 1;
            }
        }

        report.unfinished = unfinished.len();
        for (index, turn) in unfinished {
            match turn {
                Some(player) if self.ctx.slots[index].try_acquire() => {
                    self.spawn(move |ctx| ctx.play_move(index, player));
                    report.dispatched += 1;
                }
                _ => report.in_flight += 1,
            }
            if display {
                self.spawn(move |ctx| ctx.publish(index));
                report.publish_jobs += 1;
            }
        }

        let finished = ctx.slots.len() - report.unfinished;
        report.reschedule = report.unfinished > 0 || (!stop && finished > 0) || ctx.continuous;
        debug!(
            "tick: unfinished={} dispatched={} resets={} parked={} in {} usec",
            report.unfinished,
            report.dispatched,
            report.resets,
            report.parked,
            t0.elapsed().as_nanos() >> 10
        );
        report
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.ctx.jobs.wait_idle();
    }
}

#[cfg(test)]
mod tests {
    use xo_arena_search::mcts::MctsConfig;

    use super::*;
    use crate::control::ControlFlag;
    use crate::stats::EXP_1;

    fn config(matches: usize, strategies: ByPlayer<StrategyKind>) -> ArenaConfig {
        ArenaConfig {
            matches,
            workers: Some(2),
            strategies: Some(strategies),
            randomize_strategies: false,
            seed: Some(5),
            mcts: MctsConfig {
                iterations: 64,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn scheduler(config: &ArenaConfig) -> (Scheduler, Arc<Control>, Arc<SnapshotStream>) {
        let control = Arc::new(Control::default());
        let snapshots = Arc::new(SnapshotStream::new());
        let stats = Arc::new(LoadAggregator::new(config.matches, EXP_1));
        let s = Scheduler::new(config, control.clone(), snapshots.clone(), stats).unwrap();
        (s, control, snapshots)
    }

    const MCTS_PAIR: ByPlayer<StrategyKind> = ByPlayer(StrategyKind::Mcts, StrategyKind::Mcts);

    #[test]
    fn test_one_dispatch_per_unfinished_match() {
        let (s, _, _) = scheduler(&config(3, MCTS_PAIR));
        for round in 1..=3u8 {
            let report = s.tick();
            assert_eq!(3, report.unfinished);
            assert_eq!(3, report.dispatched);
            assert_eq!(0, report.in_flight);
            assert!(report.reschedule);
            s.wait_idle();
            for i in 0..3 {
                let st = s.slot_state(i).unwrap();
                assert_eq!(round, st.steps);
                assert_eq!(round as u32, st.board.count(Mark::O) + st.board.count(Mark::X));
                assert_eq!(if round % 2 == 1 { Player::X } else { Player::O }, st.turn);
            }
        }
    }

    #[test]
    fn test_no_second_dispatch_while_in_flight() {
        let (s, _, _) = scheduler(&config(4, MCTS_PAIR));
        let mut dispatched = 0;
        for _ in 0..3 {
            let report = s.tick();
            assert_eq!(4, report.dispatched + report.in_flight);
            dispatched += report.dispatched;
        }
        s.wait_idle();
        let steps: usize = (0..4).map(|i| s.slot_state(i).unwrap().steps as usize).sum();
        assert_eq!(dispatched, steps);
    }

    #[test]
    fn test_stop_with_all_terminal_dispatches_nothing() {
        let (s, control, snapshots) = scheduler(&config(3, MCTS_PAIR));
        let won: Board = "OOO. XX.. .... ....".parse().unwrap();
        for i in 0..3 {
            s.with_slot(i, |st| st.board = won);
        }
        control.set(ControlFlag::Stop, true);

        let report = s.tick();
        assert_eq!(0, report.dispatched);
        assert_eq!(0, report.publish_jobs);
        assert_eq!(3, report.parked);
        assert_eq!(0, report.resets);
        assert!(!report.reschedule);
        s.wait_idle();
        assert_eq!(3, snapshots.len());

        // parked matches publish their final board once
        let report = s.tick();
        assert_eq!(0, report.dispatched);
        assert_eq!(3, snapshots.len());
        assert!(s.slot_state(0).unwrap().parked);
    }

    #[test]
    fn test_finished_matches_restart() {
        let (s, _, _) = scheduler(&config(2, MCTS_PAIR));
        let won: Board = "OOO. XX.. .... ....".parse().unwrap();
        s.with_slot(1, |st| st.board = won);

        let report = s.tick();
        assert_eq!(1, report.resets);
        assert_eq!(1, report.dispatched);
        assert!(report.reschedule);
        s.wait_idle();
        assert_eq!(0, s.slot_state(1).unwrap().steps);

        let report = s.tick();
        assert_eq!(2, report.dispatched);
    }

    #[test]
    fn test_display_off_publishes_nothing() {
        let (s, control, snapshots) = scheduler(&config(2, MCTS_PAIR));
        control.set(ControlFlag::Display, false);
        let report = s.tick();
        assert_eq!(0, report.publish_jobs);
        s.wait_idle();
        assert!(snapshots.is_empty());

        control.set(ControlFlag::Display, true);
        let report = s.tick();
        assert_eq!(2, report.publish_jobs);
        s.wait_idle();
        assert_eq!(2, snapshots.len());
    }

    #[test]
    fn test_records_compute_time() {
        let (s, _, _) = scheduler(&config(1, MCTS_PAIR));
        s.tick();
        s.wait_idle();
        let stats = s.context().stats.clone();
        stats.decay_elapsed(1);
        let loads = stats.snapshot();
        assert!(loads[0].0 .0 > 0);
        assert_eq!(0, loads[0].1 .0);
    }

    #[test]
    fn test_pass_flips_turn_and_keeps_trace_aligned() {
        let (s, _, _) = scheduler(&config(1, ByPlayer(StrategyKind::Rl, StrategyKind::Mcts)));
        s.tick();
        s.wait_idle();
        let before = s.slot_state(0).unwrap();
        assert_eq!(Player::X, before.turn);

        let ctx = s.context().clone();
        s.with_slot(0, |st| ctx.apply_move(st, Player::X, None)).unwrap().unwrap();
        let st = s.slot_state(0).unwrap();
        assert_eq!(Player::O, st.turn);
        assert_eq!(before.board, st.board);
        assert_eq!(1, st.steps);

        // O moves again; the trace credits both steps to O
        s.tick();
        s.wait_idle();
        let st = s.slot_state(0).unwrap();
        assert_eq!(2, st.steps);
        assert_eq!(2, st.trace.len());
        assert_eq!(Some(Player::O), st.trace.mover(0));
        assert_eq!(Some(Player::O), st.trace.mover(1));
        assert_eq!(Player::X, st.turn);
    }

    #[test]
    fn test_rejected_move_passes() {
        let (s, _, _) = scheduler(&config(1, MCTS_PAIR));
        s.tick();
        s.wait_idle();
        let before = s.slot_state(0).unwrap();
        let taken = before.moves.iter(1).next();
        let ctx = s.context().clone();
        let result = s.with_slot(0, |st| ctx.apply_move(st, Player::X, taken)).unwrap();
        assert!(matches!(result, Err(BoardError::CellOccupied(_))));
        let st = s.slot_state(0).unwrap();
        assert_eq!(Player::O, st.turn);
        assert_eq!(before.board, st.board);
        assert_eq!(before.steps, st.steps);
    }

    #[test]
    fn test_learner_trace_follows_match() {
        let (s, _, _) = scheduler(&config(1, ByPlayer(StrategyKind::Rl, StrategyKind::Mcts)));
        let mut restarted = false;
        for _ in 0..40 {
            let report = s.tick();
            s.wait_idle();
            if report.resets > 0 {
                restarted = true;
                break;
            }
            let st = s.slot_state(0).unwrap();
            assert_eq!(st.steps as usize, st.trace.len());
        }
        assert!(restarted);
        assert!(s.slot_state(0).unwrap().trace.is_empty());
        assert!(s.strategies().rl().cache_len() > 0);
    }
}
