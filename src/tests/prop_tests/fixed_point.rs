use super::*;

use crate::fixed_point::Fixed;

proptest! {
    #[test]
    fn ln_is_monotonic(a in 1u32..=u32::MAX, b in 1u32..=u32::MAX) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(Fixed::from_int(lo).ln() <= Fixed::from_int(hi).ln());
    }

    #[test]
    fn exploration_term_shrinks_with_child_visits(parent in 2u32..100_000, n in 1u32..1000) {
        let ln = Fixed::from_int(parent).ln();
        let wide = ln.div_int(n).sqrt();
        let narrow = ln.div_int(n + 1).sqrt();
        prop_assert!(narrow <= wide);
    }

    #[test]
    fn sqrt_squares_back(x in 0u32..(1 << 24)) {
        let v = Fixed(x);
        let s = v.sqrt();
        prop_assert!(s * s <= v);
        let up = Fixed(s.0 + 1);
        prop_assert!(up * up > v);
    }
}
