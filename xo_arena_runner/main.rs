use std::thread;

use instant::{Duration, Instant};
use log::info;
use structopt::StructOpt;
use thiserror::Error;

use xo_arena::prelude::*;
use xo_arena_cli_utils::cli_args::ArenaOpts;
use xo_arena_runtime::prelude::*;
use xo_arena_search::{rl::train, StrategyKind};

mod match_round;
use match_round::*;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Arena(#[from] ArenaError),
    #[error("failed to print config: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, StructOpt, Clone)]
#[structopt(about = "Concurrent 4x4 tic-tac-toe arena for MCTS, negamax and RL strategies")]
pub enum RunnerOpts {
    #[structopt(help = "Run the scheduler, then stop it and report finished games and load averages.")]
    Run {
        #[structopt(short = "t", long = "--seconds", help = "Time to run before setting the stop flag")]
        seconds: Option<f64>,

        #[structopt(long = "--no-display", help = "Do not publish snapshots")]
        no_display: bool,

        #[structopt(flatten)]
        arena: ArenaOpts,
    },
    #[structopt(help = "Play head-to-head rounds between the O and X strategies, alternating sides.")]
    Match {
        #[structopt(short = "r", long = "--rounds")]
        rounds: Option<u32>,

        #[structopt(flatten)]
        arena: ArenaOpts,
    },
    #[structopt(help = "Train the RL strategy by self-play and report the learned values.")]
    Train {
        #[structopt(short = "e", long = "--episodes")]
        episodes: Option<u32>,

        #[structopt(flatten)]
        arena: ArenaOpts,
    },
    #[structopt(help = "Print the effective configuration as JSON.")]
    Config {
        #[structopt(flatten)]
        arena: ArenaOpts,
    },
}

impl RunnerOpts {
    fn arena(&self) -> &ArenaOpts {
        match self {
            RunnerOpts::Run { arena, .. } => arena,
            RunnerOpts::Match { arena, .. } => arena,
            RunnerOpts::Train { arena, .. } => arena,
            RunnerOpts::Config { arena } => arena,
        }
    }
}

fn run(config: ArenaConfig, seconds: f64, no_display: bool) -> Result<(), RunnerError> {
    let continuous = config.continuous;
    let mut session = Session::new(config)?;
    session.start()?;
    if no_display {
        session.control().set(ControlFlag::Display, false);
    }

    let snapshots = session.snapshots().clone();
    let reader = thread::spawn(move || {
        let mut finished = 0usize;
        while let Ok(record) = snapshots.read(true) {
            let outcome = record.board.check_terminal();
            if !outcome.is_terminal() {
                continue;
            }
            finished += 1;
            println!(
                "match {:3} {} vs {}: {outcome} after {} moves [{}]",
                record.match_id,
                record.strategies.0,
                record.strategies.1,
                record.steps,
                record.moves.display(record.steps as usize)
            );
            println!("{}", record.board);
        }
        finished
    });

    thread::sleep(Duration::from_secs_f64(seconds.max(0.0)));
    info!("runner: stopping after {seconds:.1}s");
    session.control().set(ControlFlag::Stop, true);
    if !continuous {
        session.wait_parked();
    }
    session.stop();
    let finished = reader.join().unwrap_or_default();

    println!();
    println!("{finished} finished games, {} snapshots dropped", session.snapshots().dropped());
    for (i, load) in session.stats().snapshot().into_iter().enumerate() {
        println!("match {i:3}: O={} X={}", load.0, load.1);
    }
    Ok(())
}

fn do_match(config: ArenaConfig, opts: &ArenaOpts, rounds: u32) {
    let strategies = config
        .strategies
        .unwrap_or(ByPlayer(StrategyKind::Mcts, StrategyKind::Negamax));
    let searches = strategies.map(|kind| opts.search.make_strategy(kind, &config));
    let mut rng = RngSource::new(config.seed).fork();
    for (_, s) in searches.iter() {
        if let Some(stats) = s.pretrain(config.rl_pretrain_episodes, &mut rng) {
            info!("runner: pretrained {stats:?}");
        }
    }

    let t0 = Instant::now();
    let summary = iterate_match(
        &searches,
        IterateMatchOpts {
            rounds,
            random_seed: config.seed.unwrap_or_default(),
        },
    );
    let dt_ns = t0.elapsed().as_nanos();
    println!("{:?} {}", summary.counter, summary.counter.summary(dt_ns));
    println!(
        "{} vs {}: {} / {} = {:.3}, {:.2}ms",
        strategies.0,
        strategies.1,
        summary.score,
        2 * rounds,
        summary.rate,
        1e-6 * dt_ns as f64
    );
}

fn do_train(config: ArenaConfig, episodes: u32) {
    let set = config.strategy_set();
    let agent = set.rl();
    let mut rng = RngSource::new(config.seed).fork();
    let stats = train::self_play(agent, episodes, &mut rng);
    println!(
        "{} episodes: O won {}, X won {}, {} draws",
        stats.episodes, stats.wins.0, stats.wins.1, stats.draws
    );
    println!("{} cached states, {} evictions", agent.cache_len(), agent.evictions());

    let (cell, value) = agent.greedy_move(Board::EMPTY, Player::O, &mut rng);
    match cell {
        Some(cell) => println!("opening move: {cell} (value {:.4})", value.to_f32()),
        None => println!("opening move: none"),
    }
}

fn main() -> Result<(), RunnerError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opts = RunnerOpts::from_args();
    let config = opts.arena().load_config()?;

    match opts {
        RunnerOpts::Run {
            seconds, no_display, ..
        } => run(config, seconds.unwrap_or(5.0), no_display)?,
        RunnerOpts::Match { rounds, ref arena } => do_match(config, arena, rounds.unwrap_or(20)),
        RunnerOpts::Train { episodes, .. } => {
            let episodes = episodes.unwrap_or(config.rl_pretrain_episodes.max(1000));
            do_train(config, episodes)
        }
        RunnerOpts::Config { .. } => println!("{}", serde_json::to_string_pretty(&config)?),
    };

    Ok(())
}
