//! Time unit helpers
//!
//! The engine boundary speaks microseconds (and nanoseconds for raw engine
//! clock values); client notifications speak milliseconds.

/// Convert microseconds to milliseconds (truncating)
pub fn us_to_ms(us: i64) -> i64 {
    us / 1_000
}

/// Convert milliseconds to microseconds (saturating)
pub fn ms_to_us(ms: i64) -> i64 {
    ms.saturating_mul(1_000)
}

/// Convert nanoseconds to microseconds (truncating)
pub fn ns_to_us(ns: i64) -> i64 {
    ns / 1_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_us_ms_conversions() {
        assert_eq!(us_to_ms(5_000_000), 5_000);
        assert_eq!(us_to_ms(999), 0);
        assert_eq!(ms_to_us(5_000), 5_000_000);
        assert_eq!(ms_to_us(i64::MAX), i64::MAX);
    }

    #[test]
    fn test_ns_to_us() {
        assert_eq!(ns_to_us(1_500_000), 1_500);
    }
}
