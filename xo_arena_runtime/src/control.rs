use std::fmt::Display;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

use enumset::{enum_set, EnumSet, EnumSetType};
use thiserror::Error;

#[derive(Debug, PartialOrd, Ord, EnumSetType)]
#[enumset(repr = "u8")]
pub enum ControlFlag {
    /// Publish boards to the snapshot stream.
    Display,
    /// Reserved.
    Resume,
    /// Stop starting new rounds. Matches in progress play out and then park.
    Stop,
}

impl ControlFlag {
    pub const ALL: [ControlFlag; 3] = [ControlFlag::Display, ControlFlag::Resume, ControlFlag::Stop];
}

/// Flag set with the text form `"<display> <resume> <stop>"`, each `0` or `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlFlags(pub EnumSet<ControlFlag>);

impl ControlFlags {
    pub const DEFAULT: ControlFlags = ControlFlags(enum_set![ControlFlag::Display | ControlFlag::Resume]);
}

impl Default for ControlFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Display for ControlFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bit = |flag: ControlFlag| if self.0.contains(flag) { '1' } else { '0' };
        write!(
            f,
            "{} {} {}",
            bit(ControlFlag::Display),
            bit(ControlFlag::Resume),
            bit(ControlFlag::Stop)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseControlError {
    #[error("expected three flags, got {0}")]
    WrongCount(usize),
    #[error("invalid flag {0:?}, expected 0 or 1")]
    InvalidFlag(String),
}

impl FromStr for ControlFlags {
    type Err = ParseControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.split_whitespace().collect();
        if tokens.len() != ControlFlag::ALL.len() {
            return Err(ParseControlError::WrongCount(tokens.len()));
        }
        let mut flags = EnumSet::new();
        for (flag, token) in ControlFlag::ALL.into_iter().zip(tokens) {
            match token {
                "1" => {
                    flags.insert(flag);
                }
                "0" => {}
                _ => return Err(ParseControlError::InvalidFlag(token.to_string())),
            }
        }
        Ok(ControlFlags(flags))
    }
}

/// Externally settable switches read by the scheduler on every tick.
#[derive(Debug, Default)]
pub struct Control {
    flags: RwLock<ControlFlags>,
}

impl Control {
    pub fn new(flags: ControlFlags) -> Self {
        Self {
            flags: RwLock::new(flags),
        }
    }

    pub fn flags(&self) -> ControlFlags {
        *self.flags.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn replace(&self, flags: ControlFlags) -> ControlFlags {
        let mut guard = self.flags.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, flags)
    }

    pub fn set(&self, flag: ControlFlag, on: bool) {
        let mut guard = self.flags.write().unwrap_or_else(PoisonError::into_inner);
        if on {
            guard.0.insert(flag);
        } else {
            guard.0.remove(flag);
        }
    }

    #[inline]
    pub fn is_set(&self, flag: ControlFlag) -> bool {
        self.flags().0.contains(flag)
    }

    #[inline]
    pub fn display(&self) -> bool {
        self.is_set(ControlFlag::Display)
    }

    #[inline]
    pub fn stopped(&self) -> bool {
        self.is_set(ControlFlag::Stop)
    }

    /// Applies the text form, as written by an observer.
    pub fn write_str(&self, s: &str) -> Result<(), ParseControlError> {
        self.replace(s.parse()?);
        Ok(())
    }

    /// Back to display on, stop off.
    pub fn reset(&self) {
        self.replace(ControlFlags::DEFAULT);
    }
}
