//! Calendar-date helpers.
//!
//! The cataloguer's post-import query needs a literal calendar date, not a
//! relative expression the cataloguer would have to evaluate itself.

use chrono::{Duration, NaiveDate, Utc};

/// Today's date, `days_ago` days in the past, as `YYYY-MM-DD`.
///
/// `days_ago(1)` is the date used to scope the cataloguer's "added since"
/// query to material staged in the last 24 hours.
pub fn days_ago(days_ago: i64) -> NaiveDate {
    (Utc::now() - Duration::days(days_ago)).date_naive()
}

/// Format a date the way the cataloguer's query syntax expects it.
pub fn as_query_literal(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_ago_is_strictly_before_today() {
        let today = Utc::now().date_naive();
        let yesterday = days_ago(1);
        assert!(yesterday < today);
        assert_eq!((today - yesterday).num_days(), 1);
    }

    #[test]
    fn query_literal_is_a_literal_date_not_an_offset() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        assert_eq!(as_query_literal(date), "2026-07-27");
    }
}
