//! Wrap-around comparisons on the 32-bit sequence space.
//!
//! Sequence numbers are byte counters modulo 2^32.  Two numbers are ordered
//! by the signed distance between them, so the comparisons below hold as long
//! as the values being compared are less than `2^31` apart.  A stop-and-wait
//! sender never has more than one unit (≤ 1024 bytes) outstanding, which keeps
//! every comparison well inside that bound.

/// Signed distance from `a` to `b` in wrap-around space.
#[inline]
pub fn distance(a: u32, b: u32) -> i32 {
    b.wrapping_sub(a) as i32
}

/// `a < b` in wrap-around space.
#[inline]
pub fn seq_lt(a: u32, b: u32) -> bool {
    distance(a, b) > 0
}

/// `a <= b` in wrap-around space.
#[inline]
pub fn seq_le(a: u32, b: u32) -> bool {
    distance(a, b) >= 0
}

/// `a > b` in wrap-around space.
#[inline]
pub fn seq_gt(a: u32, b: u32) -> bool {
    seq_lt(b, a)
}

/// `a >= b` in wrap-around space.
#[inline]
pub fn seq_ge(a: u32, b: u32) -> bool {
    seq_le(b, a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_ordering() {
        assert!(seq_lt(1, 2));
        assert!(seq_le(2, 2));
        assert!(seq_gt(3, 2));
        assert!(seq_ge(3, 3));
        assert!(!seq_lt(2, 2));
    }

    #[test]
    fn ordering_across_wrap() {
        let near_max = u32::MAX - 10;
        let wrapped = near_max.wrapping_add(1024);
        assert!(wrapped < near_max, "numeric value wrapped");
        assert!(seq_lt(near_max, wrapped));
        assert!(seq_ge(wrapped, near_max));
        assert!(!seq_ge(near_max, wrapped));
    }

    #[test]
    fn distance_is_signed() {
        assert_eq!(distance(10, 15), 5);
        assert_eq!(distance(15, 10), -5);
        assert_eq!(distance(u32::MAX, 0), 1);
    }

    #[test]
    fn stale_ack_behind_offset_is_not_ge() {
        // An ACK that acknowledges less than the unit must not satisfy >=.
        let offset = 5u32;
        let unit_end = offset.wrapping_add(1024);
        assert!(!seq_ge(offset, unit_end));
        assert!(seq_ge(unit_end.wrapping_add(3), unit_end));
    }
}
