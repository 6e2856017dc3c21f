//! Object identifier parsing
//!
//! Landing zone objects are named `<prefix>_<DATASET TOKEN>_<MMDDYYYY>[.ext]`.
//! Parsing is positional and lenient: the date is split into its components
//! without range checks, and [`CalendarDate::validate`] is a separate step.

use std::fmt;

use crate::error::{Result, RouterError};

/// Segment delimiter inside object ids
pub const SEGMENT_DELIMITER: char = '_';

/// Token and raw date extracted from an object id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedIdentifier {
    pub dataset_token: String,
    pub raw_date: String,
}

impl ParsedIdentifier {
    pub fn date(&self) -> CalendarDate {
        CalendarDate::from_raw(&self.raw_date)
    }
}

/// Split an object id into dataset token and raw date
///
/// Takes segment 1 as the token and segment 2, cut at the first `.`, as the
/// raw date. Fewer than three segments is [`RouterError::MalformedIdentifier`].
pub fn parse_identifier(source_object_id: &str) -> Result<ParsedIdentifier> {
    let segments: Vec<&str> = source_object_id.split(SEGMENT_DELIMITER).collect();
    if segments.len() < 3 {
        return Err(RouterError::MalformedIdentifier {
            object_id: source_object_id.to_string(),
            segments: segments.len(),
        });
    }

    let raw_date = segments[2].split('.').next().unwrap_or_default();

    Ok(ParsedIdentifier {
        dataset_token: segments[1].to_string(),
        raw_date: raw_date.to_string(),
    })
}

/// Date components as they appear in the object id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarDate {
    pub month: String,
    pub day: String,
    pub year: String,
}

/// Reason a [`CalendarDate`] cannot be used as a partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateError {
    NotNumeric(String),
    MonthOutOfRange(u32),
    DayOutOfRange { day: u32, max: u32 },
}

impl fmt::Display for DateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateError::NotNumeric(field) => write!(f, "{} is not a fixed-width number", field),
            DateError::MonthOutOfRange(m) => write!(f, "month {} out of range", m),
            DateError::DayOutOfRange { day, max } => {
                write!(f, "day {} out of range (max {})", day, max)
            }
        }
    }
}

impl std::error::Error for DateError {}

impl CalendarDate {
    /// Slice `MMDDYYYY` positionally: month `[0,2)`, day `[2,4)`, year `[4,..)`
    ///
    /// Short input yields short or empty components rather than an error.
    pub fn from_raw(raw_date: &str) -> Self {
        Self {
            month: char_slice(raw_date, 0, Some(2)),
            day: char_slice(raw_date, 2, Some(4)),
            year: char_slice(raw_date, 4, None),
        }
    }

    /// Check the components form a real calendar date
    pub fn validate(&self) -> std::result::Result<(), DateError> {
        let month = fixed_width_number(&self.month, 2, "month")?;
        let day = fixed_width_number(&self.day, 2, "day")?;
        let year = fixed_width_number(&self.year, 4, "year")?;

        if !(1..=12).contains(&month) {
            return Err(DateError::MonthOutOfRange(month));
        }

        let max = days_in_month(year, month);
        if day == 0 || day > max {
            return Err(DateError::DayOutOfRange { day, max });
        }

        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

fn char_slice(s: &str, start: usize, end: Option<usize>) -> String {
    let chars = s.chars().skip(start);
    match end {
        Some(end) => chars.take(end.saturating_sub(start)).collect(),
        None => chars.collect(),
    }
}

fn fixed_width_number(
    field: &str,
    width: usize,
    name: &str,
) -> std::result::Result<u32, DateError> {
    if field.len() != width || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DateError::NotNumeric(name.to_string()));
    }
    field
        .parse()
        .map_err(|_| DateError::NotNumeric(name.to_string()))
}

fn days_in_month(year: u32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        _ => 28,
    }
}

fn is_leap_year(year: u32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_and_date() {
        let parsed = parse_identifier("abc_TOKEN123_04052023.csv").unwrap();
        assert_eq!(parsed.dataset_token, "TOKEN123");
        assert_eq!(parsed.raw_date, "04052023");

        let date = parsed.date();
        assert_eq!(date.month, "04");
        assert_eq!(date.day, "05");
        assert_eq!(date.year, "2023");
    }

    #[test]
    fn test_extra_segments_are_ignored() {
        let parsed = parse_identifier("lz_SALES_12312022_v2_final.tar.gz").unwrap();
        assert_eq!(parsed.dataset_token, "SALES");
        assert_eq!(parsed.raw_date, "12312022");
    }

    #[test]
    fn test_date_cut_at_first_dot() {
        let parsed = parse_identifier("a_B_01022024.part.csv").unwrap();
        assert_eq!(parsed.raw_date, "01022024");

        let no_ext = parse_identifier("a_B_01022024").unwrap();
        assert_eq!(no_ext.raw_date, "01022024");
    }

    #[test]
    fn test_too_few_segments() {
        for id in ["file.csv", "abc_TOKEN.csv", ""] {
            match parse_identifier(id) {
                Err(RouterError::MalformedIdentifier { object_id, segments }) => {
                    assert_eq!(object_id, id);
                    assert!(segments < 3);
                }
                other => panic!("expected MalformedIdentifier for {:?}, got {:?}", id, other),
            }
        }
    }

    #[test]
    fn test_empty_segments_still_parse() {
        let parsed = parse_identifier("__").unwrap();
        assert_eq!(parsed.dataset_token, "");
        assert_eq!(parsed.raw_date, "");
    }

    #[test]
    fn test_out_of_range_components_pass_through() {
        let date = CalendarDate::from_raw("13452023");
        assert_eq!(date.month, "13");
        assert_eq!(date.day, "45");
        assert_eq!(date.year, "2023");
    }

    #[test]
    fn test_short_raw_date() {
        let date = CalendarDate::from_raw("041");
        assert_eq!(date.month, "04");
        assert_eq!(date.day, "1");
        assert_eq!(date.year, "");
    }

    #[test]
    fn test_validate_accepts_real_dates() {
        assert!(CalendarDate::from_raw("04052023").is_valid());
        assert!(CalendarDate::from_raw("02292024").is_valid());
        assert!(CalendarDate::from_raw("12312000").is_valid());
    }

    #[test]
    fn test_validate_rejects_bad_dates() {
        assert_eq!(
            CalendarDate::from_raw("13012023").validate(),
            Err(DateError::MonthOutOfRange(13))
        );
        assert_eq!(
            CalendarDate::from_raw("02292023").validate(),
            Err(DateError::DayOutOfRange { day: 29, max: 28 })
        );
        assert_eq!(
            CalendarDate::from_raw("02291900").validate(),
            Err(DateError::DayOutOfRange { day: 29, max: 28 })
        );
        assert!(matches!(
            CalendarDate::from_raw("ab012023").validate(),
            Err(DateError::NotNumeric(_))
        ));
        assert!(matches!(
            CalendarDate::from_raw("0101202").validate(),
            Err(DateError::NotNumeric(_))
        ));
        assert!(!CalendarDate::from_raw("00012023").is_valid());
        assert!(!CalendarDate::from_raw("01002023").is_valid());
    }
}
