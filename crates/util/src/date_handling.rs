//! # Date Handling Utilities
//!
//! Restore points carry their creation stamp inside the point *name*, as a
//! `"<backup VM part>@<YYYY-MM-DD hh:mm:ss>"` suffix (the VM part of the
//! owning backup's name, with no job prefix), and the report files are
//! stamped with the operators' fixed UTC+1 clock. This module owns both
//! conventions.

use chrono::{Duration, NaiveDate, Utc};

/// Splits a restore point name into its backup VM part and creation stamp.
///
/// Returns `None` when the name carries no `@` separator; such points are
/// skipped by the selection logic rather than treated as errors.
///
/// # Example
/// ```rust
/// use vaultline_util::date_handling::split_point_name;
///
/// let (name, stamp) = split_point_name("web-01-vm1@2025-05-02 22:14:33").unwrap();
/// assert_eq!(name, "web-01-vm1");
/// assert_eq!(stamp, "2025-05-02 22:14:33");
/// assert!(split_point_name("no separator").is_none());
/// ```
pub fn split_point_name(point_name: &str) -> Option<(&str, &str)> {
    point_name.split_once('@')
}

/// Parses the calendar day out of a restore point creation stamp.
///
/// The stamp's date component precedes the first space; anything that does
/// not parse as `YYYY-MM-DD` yields `None`.
pub fn point_stamp_date(stamp: &str) -> Option<NaiveDate> {
    let date_part = stamp.split_whitespace().next()?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Parses an operator-supplied `YYYY-MM-DD` target day.
pub fn parse_target_date(input: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").ok()
}

/// Today's date on the operators' fixed UTC+1 report clock.
pub fn report_date() -> NaiveDate {
    (Utc::now() + Duration::hours(1)).date_naive()
}

/// Filename stamp of the form `YYYY-MM-DD_HH:MM` for report artifacts.
pub fn report_file_stamp() -> String {
    (Utc::now() + Duration::hours(1)).format("%Y-%m-%d_%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_point_names_on_the_first_at_sign() {
        let (name, stamp) = split_point_name("vm-1@2025-01-31 03:00:00").unwrap();
        assert_eq!(name, "vm-1");
        assert_eq!(stamp, "2025-01-31 03:00:00");
    }

    #[test]
    fn stamp_dates_parse_and_reject_garbage() {
        assert_eq!(
            point_stamp_date("2025-05-02 22:14:33"),
            Some(NaiveDate::from_ymd_opt(2025, 5, 2).unwrap())
        );
        assert_eq!(point_stamp_date("not a date"), None);
        assert_eq!(point_stamp_date(""), None);
    }

    #[test]
    fn target_dates_trim_whitespace() {
        assert_eq!(parse_target_date(" 2025-05-02 "), Some(NaiveDate::from_ymd_opt(2025, 5, 2).unwrap()));
        assert_eq!(parse_target_date("02/05/2025"), None);
    }
}
