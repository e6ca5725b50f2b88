#![cfg_attr(not(test), forbid(clippy::unwrap_used))]

//! Runs many matches at once. A periodic driver inspects every match slot and
//! hands one move computation per unfinished match to a worker pool; finished
//! boards are published to a bounded snapshot stream and per-side compute time
//! is smoothed into load averages.

pub mod config;
pub mod control;
pub mod error;
pub mod snapshot;
pub mod stats;

pub mod scheduler;

mod arena;
pub use arena::*;

pub mod prelude {
    pub use crate::config::{ArenaConfig, ConfigError};
    pub use crate::control::{Control, ControlFlag, ControlFlags};
    pub use crate::error::ArenaError;
    pub use crate::scheduler::{Scheduler, TickReport};
    pub use crate::snapshot::{ReadError, SnapshotRecord, SnapshotStream};
    pub use crate::stats::{LoadAggregator, LoadAvg};
    pub use crate::{Session, SessionHandle};
}
