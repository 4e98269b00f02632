// Divide two integer, but round it to the ceil instead of the floor.
// Dividing by 0 will panic.
pub const fn div_ceil(lhs: u64, rhs: u64) -> u64 {
    if lhs == 0 {
        0
    } else {
        (lhs - 1) / rhs + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_testing() {
        assert_eq!(0, div_ceil(0, 1));
        assert_eq!(1, div_ceil(1, 1));
        assert_eq!(1, div_ceil(2, 2));

        assert_eq!(2, div_ceil(3, 2));
        assert_eq!(2, div_ceil(4, 2));
        assert_eq!(3, div_ceil(5, 2));
        assert_eq!(3, div_ceil(6, 2));
        assert_eq!(4, div_ceil(7, 2));
    }

    #[test]
    fn test_no_overflow() {
        assert_eq!(1, div_ceil(u64::MAX, u64::MAX));
        assert_eq!(u64::MAX / 2 + 1, div_ceil(u64::MAX, 2));
    }
}
