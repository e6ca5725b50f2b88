use std::sync::{Mutex, PoisonError};

use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;

/// Random stream owned by one decision or one playout.
#[repr(transparent)]
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RngState(pub Xoshiro256PlusPlus);

impl RngCore for RngState {
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.0.try_fill_bytes(dest)
    }
}

impl From<Xoshiro256PlusPlus> for RngState {
    fn from(value: Xoshiro256PlusPlus) -> Self {
        Self(value)
    }
}

impl RngState {
    pub fn seed_from_u64(seed: u64) -> Self {
        Self(Xoshiro256PlusPlus::seed_from_u64(seed))
    }
}

/// Shared origin of per-decision random streams.
///
/// Each [`RngSource::fork`] hands out a copy of the master generator and then
/// jumps the master 2^128 steps ahead, so forked streams never overlap and
/// concurrent matches never share generator state.
#[derive(Debug)]
pub struct RngSource {
    master: Mutex<Xoshiro256PlusPlus>,
}

impl RngSource {
    pub fn seed_from_u64(seed: u64) -> Self {
        Self {
            master: Mutex::new(Xoshiro256PlusPlus::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            master: Mutex::new(Xoshiro256PlusPlus::from_entropy()),
        }
    }

    /// Seeded when `seed` is given, from OS entropy otherwise.
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seed_from_u64(seed),
            None => Self::from_entropy(),
        }
    }

    pub fn fork(&self) -> RngState {
        let mut master = self.master.lock().unwrap_or_else(PoisonError::into_inner);
        let stream = master.clone();
        master.jump();
        RngState(stream)
    }
}

impl Default for RngSource {
    fn default() -> Self {
        Self::from_entropy()
    }
}
