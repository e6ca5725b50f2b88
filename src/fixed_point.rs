//! Fixed-point numbers used by the search strategies and the learner.
//!
//! Two independent formats:
//!  - [`Fixed`]: 32-bit with 8 fraction bits. Values are unsigned, but bit 31
//!    doubles as a sign flag (sign-magnitude) for the few results that can be
//!    negative, such as the logarithm of a number below one.
//!  - [`RlFixed`]: signed 32-bit with 16 fraction bits, used for learned state values.
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

#[derive(Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fixed(pub u32);

/// Precision used internally by [`Fixed::ln`].
const LN_PRECISION: u32 = 40;

/// ln(2) with `LN_PRECISION` fraction bits.
const LN_2: u128 = 762_123_384_786;

impl Fixed {
    pub const FRACTION_BITS: u32 = 8;
    pub const ZERO: Fixed = Fixed(0);
    pub const ONE: Fixed = Fixed(1 << Self::FRACTION_BITS);
    pub const HALF: Fixed = Fixed(1 << (Self::FRACTION_BITS - 1));
    pub const MAX: Fixed = Fixed(u32::MAX);

    const SIGN_BIT: u32 = 1 << 31;

    /// Number of odd terms of the atanh series evaluated by `ln`.
    const LN_TERMS: u32 = 10;

    /// Largest integer whose magnitude fits below the sign bit.
    pub const MAX_INT: u32 = !Self::SIGN_BIT >> Self::FRACTION_BITS;

    /// Integers above [`Fixed::MAX_INT`] saturate to the largest positive value.
    #[inline]
    pub const fn from_int(n: u32) -> Self {
        if n > Self::MAX_INT {
            Self(!Self::SIGN_BIT)
        } else {
            Self(n << Self::FRACTION_BITS)
        }
    }

    /// Negative inputs clamp to zero.
    #[inline]
    pub fn from_f32(v: f32) -> Self {
        Self((v.max(0.0) * Self::ONE.0 as f32).round() as u32)
    }

    #[inline]
    pub fn to_f32(self) -> f32 {
        let m = self.magnitude() as f32 / Self::ONE.0 as f32;
        if self.is_negative() {
            -m
        } else {
            m
        }
    }

    #[inline]
    pub const fn is_negative(self) -> bool {
        self.0 & Self::SIGN_BIT != 0
    }

    #[inline]
    pub const fn set_sign(self) -> Self {
        Self(self.0 | Self::SIGN_BIT)
    }

    #[inline]
    pub const fn clear_sign(self) -> Self {
        Self(self.0 & !Self::SIGN_BIT)
    }

    #[inline]
    pub const fn magnitude(self) -> u32 {
        self.clear_sign().0
    }

    #[inline]
    pub fn mul_int(self, n: u32) -> Self {
        Self(self.0.saturating_mul(n))
    }

    /// Division by an integer. Dividing by zero saturates to `MAX`.
    #[inline]
    pub fn div_int(self, n: u32) -> Self {
        match n {
            0 => Self::MAX,
            n => Self(self.0 / n),
        }
    }

    /// `1.0 - self`, saturating at zero.
    #[inline]
    pub fn complement(self) -> Self {
        Self(Self::ONE.0.saturating_sub(self.0))
    }

    /// Square root, built one result bit at a time from the most significant bit.
    pub fn sqrt(self) -> Self {
        if self.0 == 0 || self == Self::ONE {
            return self;
        }
        let x = self.0 as u64;
        let top = (64 - (x << Self::FRACTION_BITS).leading_zeros()) / 2 + 1;
        let mut s = 0u64;
        for i in (0..=top).rev() {
            let t = 1u64 << i;
            if ((s + t) * (s + t)) >> Self::FRACTION_BITS <= x {
                s += t;
            }
        }
        Self(s as u32)
    }

    /// Natural logarithm of the magnitude.
    ///
    /// The argument is first reduced to `m * 2^k` with `m` in `[1, 2)`, then
    /// `ln(m) = 2 * atanh((m - 1) / (m + 1))` is evaluated by its power series.
    /// Results below zero carry the sign bit. `ln(0)` is reported as zero.
    pub fn ln(self) -> Self {
        let v = self.magnitude() as u128;
        if v == 0 || self == Self::ONE {
            return Self::ZERO;
        }
        let one: u128 = 1 << LN_PRECISION;
        let mut m = v << (LN_PRECISION - Self::FRACTION_BITS);
        let mut k: i64 = 0;
        while m >= 2 * one {
            m >>= 1;
            k += 1;
        }
        while m < one {
            m <<= 1;
            k -= 1;
        }

        let y = ((m - one) << LN_PRECISION) / (m + one);
        let y2 = (y * y) >> LN_PRECISION;
        let mut term = y;
        let mut series = 0u128;
        for i in 0..Self::LN_TERMS {
            series += term / (2 * i as u128 + 1);
            term = (term * y2) >> LN_PRECISION;
        }

        let total = k as i128 * LN_2 as i128 + 2 * series as i128;
        let shift = LN_PRECISION - Self::FRACTION_BITS;
        let rounded = (total.unsigned_abs() + (1 << (shift - 1))) >> shift;
        let magnitude = Self((rounded as u32).min(!Self::SIGN_BIT));
        if total < 0 {
            magnitude.set_sign()
        } else {
            magnitude
        }
    }
}

impl Add for Fixed {
    type Output = Fixed;

    #[inline]
    fn add(self, rhs: Fixed) -> Fixed {
        Fixed(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Fixed {
    #[inline]
    fn add_assign(&mut self, rhs: Fixed) {
        *self = *self + rhs;
    }
}

impl Sub for Fixed {
    type Output = Fixed;

    #[inline]
    fn sub(self, rhs: Fixed) -> Fixed {
        Fixed(self.0.saturating_sub(rhs.0))
    }
}

impl Mul for Fixed {
    type Output = Fixed;

    /// Widen, multiply, shift back down.
    #[inline]
    fn mul(self, rhs: Fixed) -> Fixed {
        let wide = (self.0 as u64 * rhs.0 as u64) >> Self::FRACTION_BITS;
        Fixed(wide.min(u32::MAX as u64) as u32)
    }
}

impl Debug for Fixed {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Fx({:.4})", self.to_f32())
    }
}

impl Display for Fixed {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{:.3}", self.to_f32())
    }
}

/// Signed fixed-point value with 16 fraction bits.
#[derive(Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RlFixed(pub i32);

impl RlFixed {
    pub const FRACTION_BITS: u32 = 16;
    pub const ZERO: RlFixed = RlFixed(0);
    pub const ONE: RlFixed = RlFixed(1 << Self::FRACTION_BITS);
    pub const MIN: RlFixed = RlFixed(i32::MIN);
    pub const MAX: RlFixed = RlFixed(i32::MAX);

    #[inline]
    pub const fn from_int(n: i32) -> Self {
        Self(n << Self::FRACTION_BITS)
    }

    #[inline]
    pub fn from_f32(v: f32) -> Self {
        Self((v * Self::ONE.0 as f32).round() as i32)
    }

    #[inline]
    pub fn to_f32(self) -> f32 {
        self.0 as f32 / Self::ONE.0 as f32
    }

    #[inline]
    pub fn mul_int(self, n: i32) -> Self {
        Self(self.0.saturating_mul(n))
    }
}

impl From<Fixed> for RlFixed {
    /// Rescales 8 to 16 fraction bits, honouring the sign flag.
    fn from(value: Fixed) -> Self {
        let shift = RlFixed::FRACTION_BITS - Fixed::FRACTION_BITS;
        let wide = (value.magnitude() as i64) << shift;
        let wide = if value.is_negative() { -wide } else { wide };
        RlFixed(wide.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
    }
}

impl Add for RlFixed {
    type Output = RlFixed;

    #[inline]
    fn add(self, rhs: RlFixed) -> RlFixed {
        RlFixed(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for RlFixed {
    #[inline]
    fn add_assign(&mut self, rhs: RlFixed) {
        *self = *self + rhs;
    }
}

impl Sub for RlFixed {
    type Output = RlFixed;

    #[inline]
    fn sub(self, rhs: RlFixed) -> RlFixed {
        RlFixed(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for RlFixed {
    #[inline]
    fn sub_assign(&mut self, rhs: RlFixed) {
        *self = *self - rhs;
    }
}

impl Neg for RlFixed {
    type Output = RlFixed;

    #[inline]
    fn neg(self) -> RlFixed {
        RlFixed(self.0.saturating_neg())
    }
}

impl Mul for RlFixed {
    type Output = RlFixed;

    #[inline]
    fn mul(self, rhs: RlFixed) -> RlFixed {
        let wide = (self.0 as i64 * rhs.0 as i64) >> Self::FRACTION_BITS;
        RlFixed(wide.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
    }
}

impl Debug for RlFixed {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Rl({:.5})", self.to_f32())
    }
}

impl Display for RlFixed {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{:.5}", self.to_f32())
    }
}
