use std::fmt::Display;
use std::sync::{Mutex, MutexGuard, PoisonError};

use instant::Instant;
use log::debug;
use xo_arena::prelude::*;

/// Fraction bits of a load average.
pub const FSHIFT: u32 = 11;
/// 1.0 as a load average.
pub const FIXED_1: u64 = 1 << FSHIFT;
/// Decay per 1 s period with a 12 s time constant.
pub const EXP_1: u64 = 1884;

/// `FIXED_1 * exp(-period / time_constant)`, rounded.
pub fn decay_constant(period_ms: u64, time_constant_ms: u64) -> u64 {
    let x = -(period_ms as f64) / (time_constant_ms.max(1) as f64);
    ((FIXED_1 as f64) * x.exp()).round() as u64
}

/// One step of exponential smoothing, rounding up while the load rises.
#[inline]
pub fn calc_load(load: u64, exp: u64, active: u64) -> u64 {
    let mut newload = load * exp + active * (FIXED_1 - exp);
    if active >= load {
        newload += FIXED_1 - 1;
    }
    newload / FIXED_1
}

/// Largest integer part kept by [`LoadAvg::compact`].
pub const COMPACT_MAX_INT: u64 = 15;

/// Smoothed load average in 11-bit fixed point.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadAvg(pub u64);

impl LoadAvg {
    #[inline]
    pub fn int(self) -> u64 {
        self.0 >> FSHIFT
    }

    /// Hundredths.
    #[inline]
    pub fn frac(self) -> u64 {
        ((self.0 & (FIXED_1 - 1)) * 100) >> FSHIFT
    }

    /// `(int << 7) + (frac & 0x7f)`. The integer part has 4 bits; loads of
    /// 16 or more read as `15.99`.
    #[inline]
    pub fn compact(self) -> u16 {
        if self.int() > COMPACT_MAX_INT {
            return ((COMPACT_MAX_INT << 7) + 99) as u16;
        }
        ((self.int() << 7) + (self.frac() & 0x7f)) as u16
    }

    /// Splits a compact value into integer part and hundredths.
    #[inline]
    pub fn split_compact(compact: u16) -> (u16, u16) {
        ((compact & 0x780) >> 7, compact & 0x7f)
    }
}

impl Display for LoadAvg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.int(), self.frac())
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct MatchLoad {
    busy_ns: ByPlayer<u64>,
    load: ByPlayer<LoadAvg>,
}

#[derive(Debug)]
struct AggregatorState {
    matches: Vec<MatchLoad>,
    last_decay: Option<Instant>,
}

/// Per match and side, time spent choosing moves, smoothed over decay periods.
#[derive(Debug)]
pub struct LoadAggregator {
    exp: u64,
    state: Mutex<AggregatorState>,
}

impl LoadAggregator {
    pub fn new(matches: usize, exp: u64) -> Self {
        Self {
            exp: exp.min(FIXED_1),
            state: Mutex::new(AggregatorState {
                matches: vec![Default::default(); matches],
                last_decay: None,
            }),
        }
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, AggregatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `nanos` of compute time for `player` in match `id`.
    pub fn record(&self, id: usize, player: Player, nanos: u64) {
        if let Some(m) = self.lock().matches.get_mut(id) {
            m.busy_ns[player] = m.busy_ns[player].saturating_add(nanos);
        }
    }

    /// Decay step timed by the wall clock. The first call only starts the clock.
    pub fn decay(&self) {
        let now = Instant::now();
        let mut state = self.lock();
        let Some(last) = state.last_decay.replace(now) else { return };
        let elapsed = now.saturating_duration_since(last).as_nanos() as u64;
        Self::decay_state(&mut state, self.exp, elapsed);
    }

    /// Decay step over an explicit `elapsed_ns`.
    pub fn decay_elapsed(&self, elapsed_ns: u64) {
        let mut state = self.lock();
        Self::decay_state(&mut state, self.exp, elapsed_ns);
    }

    fn decay_state(state: &mut AggregatorState, exp: u64, elapsed_ns: u64) {
        if elapsed_ns == 0 {
            return;
        }
        for (id, m) in state.matches.iter_mut().enumerate() {
            for player in Player::ALL {
                let busy = m.busy_ns[player];
                if busy == 0 {
                    continue;
                }
                let ratio = (busy as u128 * FIXED_1 as u128) / elapsed_ns as u128;
                let ratio = ratio.min(u32::MAX as u128) as u64;
                m.load[player] = LoadAvg(calc_load(m.load[player].0, exp, ratio));
                m.busy_ns[player] = 0;
            }
            debug!("loadavg[{id}]: O={} X={}", m.load.0, m.load.1);
        }
    }

    /// Current load averages of every match.
    pub fn snapshot(&self) -> Vec<ByPlayer<LoadAvg>> {
        self.lock().matches.iter().map(|m| m.load).collect()
    }

    /// Compact form of every match's load averages.
    pub fn compact(&self) -> Vec<ByPlayer<u16>> {
        self.snapshot().into_iter().map(|l| l.map(LoadAvg::compact)).collect()
    }

    pub fn reset(&self) {
        let mut state = self.lock();
        state.matches.iter_mut().for_each(|m| *m = Default::default());
        state.last_decay = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decay_constant() {
        assert_eq!(EXP_1, decay_constant(1000, 12_000));
        assert_eq!(FIXED_1, decay_constant(0, 12_000));
    }

    #[test]
    fn test_full_load_from_zero() {
        let load = calc_load(0, EXP_1, FIXED_1);
        assert_eq!(164, load);
        assert_eq!("0.08", LoadAvg(load).to_string());
        assert_eq!(8, LoadAvg(load).compact());
    }

    #[test]
    fn test_converges_and_decays() {
        let mut load = 0;
        for _ in 0..200 {
            load = calc_load(load, EXP_1, FIXED_1);
        }
        assert!(load >= FIXED_1 - 1);
        let peak = load;
        load = calc_load(load, EXP_1, 0);
        assert!(load < peak);
        assert_eq!(peak * EXP_1 / FIXED_1, load);
    }

    #[test]
    fn test_compact_form() {
        let avg = LoadAvg(FIXED_1 * 3 + FIXED_1 / 2);
        assert_eq!("3.50", avg.to_string());
        assert_eq!((3 << 7) + 50, avg.compact());
        assert_eq!((3, 50), LoadAvg::split_compact(avg.compact()));
    }

    #[test]
    fn test_compact_saturates() {
        let edge = LoadAvg(FIXED_1 * 15 + FIXED_1 / 4);
        assert_eq!((15, 25), LoadAvg::split_compact(edge.compact()));
        for int in [16, 512, 70_000] {
            let avg = LoadAvg(FIXED_1 * int);
            assert_eq!((15, 99), LoadAvg::split_compact(avg.compact()), "{avg}");
        }
    }

    #[test]
    fn test_aggregator() {
        let agg = LoadAggregator::new(2, EXP_1);
        agg.record(0, Player::O, 500_000_000);
        agg.record(0, Player::O, 500_000_000);
        agg.record(1, Player::X, 250_000_000);
        agg.record(9, Player::X, 1);
        agg.decay_elapsed(1_000_000_000);
        let loads = agg.snapshot();
        assert_eq!(LoadAvg(164), loads[0].0);
        assert_eq!(LoadAvg(0), loads[0].1);
        // ratio 512: (512 * 164 + 2047) / 2048
        assert_eq!(LoadAvg(41), loads[1].1);

        // idle sides keep their value
        agg.decay_elapsed(1_000_000_000);
        assert_eq!(loads, agg.snapshot());
        assert_eq!(ByPlayer(8, 0), agg.compact()[0]);

        agg.reset();
        assert_eq!(vec![ByPlayer::default(); 2], agg.snapshot());
    }

    mod prop {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn load_moves_toward_active(load in 0u64..(8 * FIXED_1), active in 0u64..(8 * FIXED_1)) {
                let next = calc_load(load, EXP_1, active);
                prop_assert!(next >= load.min(active));
                prop_assert!(next <= load.max(active));
            }
        }
    }
}
