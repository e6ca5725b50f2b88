use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use xo_arena::prelude::*;
use xo_arena_search::mcts::{MctsConfig, MIN_MAX_NODES};
use xo_arena_search::negamax::NegamaxConfig;
use xo_arena_search::rl::RlConfig;
use xo_arena_search::{StrategyKind, StrategySet};

use crate::stats;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    FileLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Deserialize(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings of one arena session. Every field has a default, so a config
/// file only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Number of concurrent match slots.
    pub matches: usize,
    /// Period of the scheduler tick.
    pub tick_ms: u64,
    /// Period of the load average update.
    pub loadavg_period_ms: u64,
    /// Time constant of the load average smoothing.
    pub loadavg_time_constant_ms: u64,
    /// Worker threads; one per CPU when absent.
    pub workers: Option<usize>,
    /// Keep ticking even when every match is parked.
    pub continuous: bool,
    /// Draw new strategies for both sides whenever a match restarts.
    pub randomize_strategies: bool,
    /// Strategies of O and X in every match. Random when absent.
    pub strategies: Option<ByPlayer<StrategyKind>>,
    pub seed: Option<u64>,
    /// Self-play games for the learner before it may be chosen.
    pub rl_pretrain_episodes: u32,
    pub mcts: MctsConfig,
    pub negamax: NegamaxConfig,
    pub rl: RlConfig,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            matches: 8,
            tick_ms: 100,
            loadavg_period_ms: 1000,
            loadavg_time_constant_ms: 12_000,
            workers: None,
            continuous: false,
            randomize_strategies: true,
            strategies: None,
            seed: None,
            rl_pretrain_episodes: 0,
            mcts: Default::default(),
            negamax: Default::default(),
            rl: Default::default(),
        }
    }
}

fn check(ok: bool, msg: impl FnOnce() -> String) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::Invalid(msg()))
    }
}

fn check_rate(name: &str, value: f32) -> Result<(), ConfigError> {
    check((0.0..=1.0).contains(&value), || format!("{name} must be within [0, 1], got {value}"))
}

impl ArenaConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: ArenaConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::FileLoad {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check(self.matches > 0, || "matches must be positive".to_string())?;
        check(self.matches <= u32::MAX as usize, || format!("too many matches: {}", self.matches))?;
        check(self.tick_ms > 0, || "tick_ms must be positive".to_string())?;
        check(self.loadavg_period_ms > 0, || "loadavg_period_ms must be positive".to_string())?;
        check(self.loadavg_time_constant_ms > 0, || {
            "loadavg_time_constant_ms must be positive".to_string()
        })?;
        check(self.workers != Some(0), || "workers must be positive".to_string())?;
        check(self.mcts.iterations > 0, || "mcts.iterations must be positive".to_string())?;
        check(self.mcts.max_nodes >= MIN_MAX_NODES, || {
            format!("mcts.max_nodes must be at least {MIN_MAX_NODES}, got {}", self.mcts.max_nodes)
        })?;
        check(self.mcts.exploration.is_finite() && self.mcts.exploration >= 0.0, || {
            format!("mcts.exploration must be a non-negative number, got {}", self.mcts.exploration)
        })?;
        check(self.rl.capacity > 0, || "rl.capacity must be positive".to_string())?;
        check_rate("rl.learning_rate", self.rl.learning_rate)?;
        check_rate("rl.gamma", self.rl.gamma)?;
        check_rate("rl.epsilon_start", self.rl.epsilon_start)?;
        check_rate("rl.epsilon_end", self.rl.epsilon_end)?;
        Ok(())
    }

    /// Fixed-point decay factor applied once per load average period.
    pub fn decay_constant(&self) -> u64 {
        stats::decay_constant(self.loadavg_period_ms, self.loadavg_time_constant_ms)
    }

    pub fn strategy_set(&self) -> StrategySet {
        StrategySet::new(self.mcts, self.negamax, self.rl)
    }
}
