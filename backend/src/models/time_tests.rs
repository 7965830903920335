use super::{day_of_year, week_of_year};
use chrono::{TimeZone, Utc};

fn date(year: i32, month: u32, day: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

#[test]
fn test_day_of_year() {
    assert_eq!(day_of_year(&date(2000, 1, 1)), 1);
    assert_eq!(day_of_year(&date(2000, 12, 31)), 366);
    assert_eq!(day_of_year(&date(1999, 12, 31)), 365);
}

#[test]
fn test_week_boundaries_in_phenoyear() {
    assert_eq!(week_of_year(2000, &date(2000, 1, 1)), 1);
    assert_eq!(week_of_year(2000, &date(2000, 1, 7)), 1);
    assert_eq!(week_of_year(2000, &date(2000, 1, 8)), 2);
    assert_eq!(week_of_year(2000, &date(2000, 12, 31)), 53);
}

#[test]
fn test_weeks_before_season_start_are_negative() {
    assert_eq!(week_of_year(2000, &date(1999, 12, 31)), -1);
    assert_eq!(week_of_year(2000, &date(1999, 12, 25)), -1);
    assert_eq!(week_of_year(2000, &date(1999, 12, 24)), -2);
}

#[test]
fn test_leap_year_december_31_before_phenoyear() {
    // doy 366 in the prior year: floor(-1 / 7) = -1, so the bucket is 0.
    assert_eq!(week_of_year(2001, &date(2000, 12, 31)), 0);
    assert_eq!(week_of_year(2001, &date(2000, 12, 30)), -1);
}

#[test]
fn test_time_of_day_is_ignored() {
    let evening = Utc.with_ymd_and_hms(2000, 1, 7, 23, 59, 59).unwrap();
    assert_eq!(week_of_year(2000, &evening), 1);
}
