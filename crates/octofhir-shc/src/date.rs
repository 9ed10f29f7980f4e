//! Calendar date parsing for FHIR `date` / `dateTime` values.
//!
//! Dates are kept as [`time::Date`], which carries no time-of-day or offset,
//! so a birth date never moves to the previous day when it is displayed in a
//! timezone west of UTC.

use time::Date;
use time::macros::format_description;

/// Parses the calendar date at the start of a FHIR `date` or `dateTime`.
///
/// Accepts `YYYY-MM-DD` and `YYYY-MM-DDThh:mm:ss[...]`; for the latter only
/// the date part is used, exactly as written by the issuer.
pub fn parse_calendar_date(value: &str) -> Result<Date, String> {
    let date_part = value.split_once('T').map_or(value, |(date, _)| date);
    Date::parse(date_part.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|e| format!("invalid date '{value}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_plain_date() {
        assert_eq!(parse_calendar_date("1960-01-20").unwrap(), date!(1960 - 01 - 20));
    }

    #[test]
    fn test_date_time_keeps_written_date() {
        assert_eq!(
            parse_calendar_date("2021-01-01T23:30:00-08:00").unwrap(),
            date!(2021 - 01 - 01)
        );
        assert_eq!(
            parse_calendar_date("2021-01-02T00:00:00Z").unwrap(),
            date!(2021 - 01 - 02)
        );
    }

    #[test]
    fn test_first_of_month_does_not_shift() {
        // The classic off-by-one: midnight UTC rendered in UTC-5 is the
        // previous day. Calendar dates have no offset to shift by.
        let parsed = parse_calendar_date("2021-03-01").unwrap();
        assert_eq!(parsed.day(), 1);
        assert_eq!(parsed.month(), time::Month::March);
        assert_eq!(parsed.year(), 2021);
    }

    #[test]
    fn test_invalid_dates() {
        for value in ["", "1960", "1960-01", "2021-02-30", "yesterday"] {
            assert!(parse_calendar_date(value).is_err(), "{value}");
        }
    }
}
