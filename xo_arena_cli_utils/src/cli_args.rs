use std::path::PathBuf;
use structopt::StructOpt;

use xo_arena::prelude::*;
use xo_arena_runtime::config::{ArenaConfig, ConfigError};
use xo_arena_search::{
    mcts::{Mcts, MctsConfig},
    negamax::{Negamax, NegamaxConfig},
    rl::{train, train::TrainStats, RlAgent, RlConfig},
    SearchResult, Strategy, StrategyKind,
};

#[derive(Debug, StructOpt, Clone, Default)]
pub struct SearchConfig {
    #[structopt(short = "I", long = "--mcts-iters", help = "MCTS: iterations per move")]
    pub mcts_iterations: Option<u32>,

    #[structopt(
        short = "C",
        long = "--mcts-c",
        help = "MCTS: UCT exploration constant. Higher value promotes wider search, while lower value promotes deeper search."
    )]
    pub mcts_exploration: Option<f32>,

    #[structopt(long = "--mcts-max-nodes", help = "MCTS: upper bound on tree nodes per move")]
    pub mcts_max_nodes: Option<usize>,

    #[structopt(
        short = "d",
        long = "--depth",
        help = "Negamax: search depth. 16 searches every line to the end of the game."
    )]
    pub negamax_depth: Option<u8>,

    #[structopt(long = "--tt-size-mb", help = "Negamax: transposition table size")]
    pub tt_size_mb: Option<u32>,

    #[structopt(long = "--rl-capacity", help = "RL: number of cached state values")]
    pub rl_capacity: Option<usize>,

    #[structopt(long = "--rl-alpha", help = "RL: learning rate")]
    pub rl_learning_rate: Option<f32>,

    #[structopt(long = "--rl-gamma", help = "RL: discount factor")]
    pub rl_gamma: Option<f32>,
}

impl SearchConfig {
    pub fn mcts_config(&self, base: MctsConfig) -> MctsConfig {
        MctsConfig {
            iterations: self.mcts_iterations.unwrap_or(base.iterations),
            exploration: self.mcts_exploration.unwrap_or(base.exploration),
            max_nodes: self.mcts_max_nodes.unwrap_or(base.max_nodes),
        }
    }

    pub fn negamax_config(&self, base: NegamaxConfig) -> NegamaxConfig {
        NegamaxConfig {
            max_depth: self.negamax_depth.unwrap_or(base.max_depth),
            tt_size_mb: self.tt_size_mb.unwrap_or(base.tt_size_mb),
        }
    }

    pub fn rl_config(&self, base: RlConfig) -> RlConfig {
        RlConfig {
            capacity: self.rl_capacity.unwrap_or(base.capacity),
            learning_rate: self.rl_learning_rate.unwrap_or(base.learning_rate),
            gamma: self.rl_gamma.unwrap_or(base.gamma),
            ..base
        }
    }

    /// Overrides the strategy sections of `config` with the flags that were given.
    pub fn apply(&self, config: &mut ArenaConfig) {
        config.mcts = self.mcts_config(config.mcts);
        config.negamax = self.negamax_config(config.negamax);
        config.rl = self.rl_config(config.rl);
    }

    pub fn make_strategy(&self, kind: StrategyKind, base: &ArenaConfig) -> GenericStrategy {
        match kind {
            StrategyKind::Mcts => GenericStrategy::Mcts(Mcts::new(self.mcts_config(base.mcts))),
            StrategyKind::Negamax => GenericStrategy::Negamax(Negamax::new(self.negamax_config(base.negamax))),
            StrategyKind::Rl => GenericStrategy::Rl(RlAgent::new(self.rl_config(base.rl))),
        }
    }
}

#[derive(Debug, StructOpt, Clone, Default)]
pub struct ArenaOpts {
    #[structopt(
        parse(from_os_str),
        short = "c",
        long = "--config",
        help = "Path to a JSON config file. Flags given on the command line take precedence."
    )]
    pub config: Option<PathBuf>,

    #[structopt(short = "n", long = "--matches", help = "Number of concurrent matches")]
    pub matches: Option<usize>,

    #[structopt(long = "--tick-ms", help = "Scheduler tick period in milliseconds")]
    pub tick_ms: Option<u64>,

    #[structopt(short = "j", long = "--workers", help = "Worker threads (default: one per CPU)")]
    pub workers: Option<usize>,

    #[structopt(short = "S", long = "--seed", help = "Random seed for strategy choice and search")]
    pub seed: Option<u64>,

    #[structopt(
        short = "o",
        long = "--player-o",
        help = "mcts|negamax|rl: strategy of O in every match. Strategies are drawn at random unless a side is fixed."
    )]
    pub player_o: Option<StrategyKind>,

    #[structopt(short = "x", long = "--player-x", help = "mcts|negamax|rl: strategy of X in every match")]
    pub player_x: Option<StrategyKind>,

    #[structopt(long = "--continuous", help = "Keep ticking after every match is parked")]
    pub continuous: bool,

    #[structopt(long = "--rl-pretrain", help = "RL: self-play episodes before the learner may be chosen")]
    pub rl_pretrain_episodes: Option<u32>,

    #[structopt(flatten)]
    pub search: SearchConfig,
}

impl ArenaOpts {
    /// The config file (or the defaults) with command line overrides applied, validated.
    pub fn load_config(&self) -> Result<ArenaConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ArenaConfig::load(path)?,
            None => ArenaConfig::default(),
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&self, config: &mut ArenaConfig) {
        config.matches = self.matches.unwrap_or(config.matches);
        config.tick_ms = self.tick_ms.unwrap_or(config.tick_ms);
        config.workers = self.workers.or(config.workers);
        config.seed = self.seed.or(config.seed);
        config.continuous |= self.continuous;
        config.rl_pretrain_episodes = self.rl_pretrain_episodes.unwrap_or(config.rl_pretrain_episodes);
        if self.player_o.is_some() || self.player_x.is_some() {
            let base = config.strategies.unwrap_or_default();
            config.strategies = Some(ByPlayer(
                self.player_o.unwrap_or(base.0),
                self.player_x.unwrap_or(base.1),
            ));
            config.randomize_strategies = false;
        }
        self.search.apply(config);
    }
}

/// Any registered strategy, owned. Used where a caller builds its own
/// instances instead of sharing a scheduler's.
pub enum GenericStrategy {
    Mcts(Mcts),
    Negamax(Negamax),
    Rl(RlAgent),
}

impl GenericStrategy {
    /// Runs self-play training when this is the learner; other strategies have nothing to learn.
    pub fn pretrain(&self, episodes: u32, rng: &mut RngState) -> Option<TrainStats> {
        match self {
            Self::Rl(agent) if episodes > 0 => Some(train::self_play(agent, episodes, rng)),
            _ => None,
        }
    }
}

impl Strategy for GenericStrategy {
    fn kind(&self) -> StrategyKind {
        match self {
            Self::Mcts(s) => s.kind(),
            Self::Negamax(s) => s.kind(),
            Self::Rl(s) => s.kind(),
        }
    }

    fn search(&self, board: Board, player: Player, rng: &mut RngState) -> SearchResult {
        match self {
            Self::Mcts(s) => s.search(board, player, rng),
            Self::Negamax(s) => s.search(board, player, rng),
            Self::Rl(s) => s.search(board, player, rng),
        }
    }
}
