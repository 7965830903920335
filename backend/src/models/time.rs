//! Calendar helpers for phenology statistics.
//!
//! Weeks here are plain 7-day buckets counted from January 1st, not ISO weeks.
//! Observations dated in the calendar year before the phenoyear they belong to
//! are bucketed into negative weeks counted backwards from December 31st.

use chrono::{DateTime, Datelike, Utc};

/// 1-based day of year of `date`.
pub fn day_of_year(date: &DateTime<Utc>) -> i32 {
    date.ordinal() as i32
}

/// Week bucket of `date` relative to `phenoyear`.
///
/// Week 1 covers days 1-7, week 2 days 8-14 and so on. A date from an earlier
/// calendar year maps to `-((365 - doy) div 7 + 1)`, floor division included, so
/// December 31st of a leap year lands in week 0.
pub fn week_of_year(phenoyear: i32, date: &DateTime<Utc>) -> i32 {
    let doy = day_of_year(date);
    if date.year() < phenoyear {
        -((365 - doy).div_euclid(7) + 1)
    } else {
        (doy - 1).div_euclid(7) + 1
    }
}

#[cfg(test)]
#[path = "time_tests.rs"]
mod time_tests;
