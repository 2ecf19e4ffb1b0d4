use chrono::{DateTime, Local, NaiveDate, Utc};

/// Current instant, used for breaker expiry comparisons.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Today's local calendar date, used for the day-rollover boundary on the
/// `today.*` counters. Deliberately local rather than UTC: operators read
/// `today.*` against their own wall clock, and a UTC midnight rollover would
/// shift the boundary away from what "today" means to them.
#[must_use]
pub fn today_local_date() -> NaiveDate {
    Local::now().date_naive()
}

#[must_use]
pub fn new_upstream_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_upstream_id_is_unique() {
        let a = new_upstream_id();
        let b = new_upstream_id();
        assert_ne!(a, b);
    }
}
