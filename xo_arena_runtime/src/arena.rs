use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use instant::Instant;
use log::{debug, info};
use xo_arena_search::rl::train;
use xo_arena_search::StrategyKind;

use crate::config::ArenaConfig;
use crate::control::Control;
use crate::error::ArenaError;
use crate::scheduler::Scheduler;
use crate::snapshot::SnapshotStream;
use crate::stats::LoadAggregator;

/// Shutdown request that wakes sleeping driver threads.
#[derive(Debug, Default)]
struct Signal {
    shutdown: Mutex<bool>,
    wake: Condvar,
}

impl Signal {
    /// Sleeps for `dur` and returns `true` if shutdown was requested meanwhile.
    fn sleep(&self, dur: Duration) -> bool {
        let guard = self.shutdown.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .wake
            .wait_timeout_while(guard, dur, |shutdown| !*shutdown)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    fn set(&self, value: bool) {
        *self.shutdown.lock().unwrap_or_else(PoisonError::into_inner) = value;
        self.wake.notify_all();
    }
}

fn spawn_named<F: FnOnce() + Send + 'static>(name: &'static str, f: F) -> Result<JoinHandle<()>, ArenaError> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|source| ArenaError::Spawn { name, source })
}

/// One arena: the scheduler with its observers and the threads that drive it.
///
/// A session can be started and stopped repeatedly. Matches, learned values
/// and statistics survive a stop; control flags go back to their defaults on
/// every start.
#[derive(Debug)]
pub struct Session {
    config: ArenaConfig,
    control: Arc<Control>,
    snapshots: Arc<SnapshotStream>,
    stats: Arc<LoadAggregator>,
    scheduler: Arc<Scheduler>,
    signal: Arc<Signal>,
    pretrained: Arc<AtomicBool>,
    driver: Option<JoinHandle<()>>,
    helpers: Vec<JoinHandle<()>>,
}

/// Read-only view handed to observers.
pub type SessionHandle = Arc<Scheduler>;

impl Session {
    pub fn new(config: ArenaConfig) -> Result<Self, ArenaError> {
        config.validate()?;
        let control = Arc::new(Control::default());
        let snapshots = Arc::new(SnapshotStream::new());
        let stats = Arc::new(LoadAggregator::new(config.matches, config.decay_constant()));
        let scheduler = Scheduler::new(&config, control.clone(), snapshots.clone(), stats.clone())?;
        Ok(Self {
            config,
            control,
            snapshots,
            stats,
            scheduler: Arc::new(scheduler),
            signal: Arc::new(Signal::default()),
            pretrained: Arc::new(AtomicBool::new(false)),
            driver: None,
            helpers: Vec::new(),
        })
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    pub fn control(&self) -> &Arc<Control> {
        &self.control
    }

    pub fn snapshots(&self) -> &Arc<SnapshotStream> {
        &self.snapshots
    }

    pub fn stats(&self) -> &Arc<LoadAggregator> {
        &self.stats
    }

    pub fn handle(&self) -> SessionHandle {
        self.scheduler.clone()
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.driver.is_some()
    }

    /// Whether the tick driver has run out of work, i.e. every match is parked.
    pub fn is_parked(&self) -> bool {
        self.driver.as_ref().map_or(true, |d| d.is_finished())
    }

    pub fn is_pretrained(&self) -> bool {
        self.pretrained.load(Ordering::Acquire)
    }

    pub fn start(&mut self) -> Result<(), ArenaError> {
        if self.is_running() {
            return Err(ArenaError::AlreadyRunning);
        }
        self.control.reset();
        self.snapshots.clear();
        self.signal.set(false);
        self.scheduler.strategies().clear_search_tables();

        if self.config.rl_pretrain_episodes > 0 && !self.is_pretrained() {
            self.helpers.push(self.spawn_pretrain()?);
        } else {
            self.pretrained.store(true, Ordering::Release);
        }
        self.helpers.push(self.spawn_loadavg()?);
        self.driver = Some(self.spawn_driver()?);
        info!(
            "arena: started {} matches, tick {} ms",
            self.scheduler.len(),
            self.config.tick_ms
        );
        Ok(())
    }

    fn spawn_pretrain(&self) -> Result<JoinHandle<()>, ArenaError> {
        let scheduler = self.scheduler.clone();
        let pretrained = self.pretrained.clone();
        let episodes = self.config.rl_pretrain_episodes;
        scheduler.strategies().set_rl_ready(false);
        spawn_named("xo-rl-pretrain", move || {
            let mut rng = scheduler.fork_rng();
            let stats = train::self_play(scheduler.strategies().rl(), episodes, &mut rng);
            debug!("arena: pretraining done {stats:?}");
            scheduler.strategies().set_rl_ready(true);
            pretrained.store(true, Ordering::Release);
            info!("arena: {} is available", StrategyKind::Rl);
        })
    }

    fn spawn_loadavg(&self) -> Result<JoinHandle<()>, ArenaError> {
        let stats = self.stats.clone();
        let signal = self.signal.clone();
        let period = Duration::from_millis(self.config.loadavg_period_ms);
        spawn_named("xo-loadavg", move || {
            stats.decay();
            while !signal.sleep(period) {
                stats.decay();
            }
        })
    }

    fn spawn_driver(&self) -> Result<JoinHandle<()>, ArenaError> {
        let scheduler = self.scheduler.clone();
        let signal = self.signal.clone();
        let tick = Duration::from_millis(self.config.tick_ms);
        spawn_named("xo-tick", move || loop {
            let t0 = Instant::now();
            let report = scheduler.tick();
            if !report.reschedule {
                info!("arena: all matches parked");
                break;
            }
            if signal.sleep(tick.saturating_sub(t0.elapsed())) {
                break;
            }
        })
    }

    /// Blocks until every match is parked or the session is stopped.
    pub fn wait_parked(&mut self) {
        if let Some(driver) = self.driver.take() {
            let _ = driver.join();
        }
    }

    /// Stops the driver threads and drains in-flight jobs. Queued snapshots
    /// stay readable; blocked readers are released.
    pub fn stop(&mut self) {
        self.signal.set(true);
        self.wait_parked();
        for helper in self.helpers.drain(..) {
            let _ = helper.join();
        }
        self.scheduler.wait_idle();
        self.snapshots.close();
        info!("arena: stopped");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.is_running() || !self.helpers.is_empty() {
            self.stop();
        }
    }
}
