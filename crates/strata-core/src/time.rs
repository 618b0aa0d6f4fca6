//! Wall-clock helpers.

use chrono::Utc;

/// Current wall-clock time in microseconds since the Unix epoch.
///
/// All persisted timestamps use this resolution.
#[must_use]
pub fn now_us() -> i64 {
    Utc::now().timestamp_micros()
}

#[cfg(test)]
mod tests {
    use super::now_us;

    #[test]
    fn now_is_monotonic_enough() {
        let a = now_us();
        let b = now_us();
        assert!(b >= a);
        // Sanity: we are well past 2020 in microseconds.
        assert!(a > 1_577_836_800_000_000);
    }
}
