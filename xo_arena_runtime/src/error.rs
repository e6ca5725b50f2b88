use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("session is already running")]
    AlreadyRunning,
}
