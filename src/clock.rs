//! Wall-clock helpers.
//!
//! Deadlines are never enforced by timers: every read and write path asks
//! these helpers whether the stored deadline has passed at evaluation time,
//! so expiry is always observed lazily.

use time::{Duration, OffsetDateTime};

/// Current instant in UTC.
pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Deadline a whole number of seconds after `from`.
pub fn deadline_after(from: OffsetDateTime, seconds: u32) -> OffsetDateTime {
    from + Duration::seconds(i64::from(seconds))
}

/// Whether `deadline` has passed at `now`. A deadline landing exactly on
/// `now` has not expired yet.
pub fn is_expired(deadline: OffsetDateTime, now: OffsetDateTime) -> bool {
    now > deadline
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_on_the_instant_is_not_expired() {
        let base = now();
        let deadline = deadline_after(base, 60);
        assert!(!is_expired(deadline, deadline));
        assert!(!is_expired(deadline, base));
    }

    #[test]
    fn deadline_in_the_past_is_expired() {
        let base = now();
        let deadline = deadline_after(base, 30);
        assert!(is_expired(deadline, deadline + Duration::seconds(1)));
    }
}
