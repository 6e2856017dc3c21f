//! Destination key formatting for accepted files

use crate::catalog::{DatasetRecord, PartitioningScheme};
use crate::identifier::CalendarDate;

/// Prefix shared by datasets without a date partitioning policy
pub const DEFAULT_PREFIX: &str = "default/";

/// Directory prefix an accepted file is written under
pub fn destination_prefix(record: &DatasetRecord, date: &CalendarDate) -> String {
    match record.partitioning_scheme {
        PartitioningScheme::Ymd => format!(
            "{}Year={}/Month={}/Day={}/",
            record.dl_location_prefix, date.year, date.month, date.day
        ),
        PartitioningScheme::Default => DEFAULT_PREFIX.to_string(),
    }
}

/// Full data lake key: prefix followed by the unmodified source object id
pub fn destination_key(
    record: &DatasetRecord,
    date: &CalendarDate,
    source_object_id: &str,
) -> String {
    let mut key = destination_prefix(record, date);
    key.push_str(source_object_id);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(raw: &str) -> CalendarDate {
        CalendarDate::from_raw(raw)
    }

    #[test]
    fn test_ymd_prefix() {
        let record = DatasetRecord::new("T", "lake/", PartitioningScheme::Ymd);
        assert_eq!(
            destination_prefix(&record, &date("04052023")),
            "lake/Year=2023/Month=04/Day=05/"
        );
    }

    #[test]
    fn test_default_prefix_ignores_date() {
        let record = DatasetRecord::new("T", "lake/", PartitioningScheme::Default);
        assert_eq!(destination_prefix(&record, &date("04052023")), "default/");
        assert_eq!(destination_prefix(&record, &date("garbage")), "default/");
    }

    #[test]
    fn test_prefix_is_not_normalized() {
        let record = DatasetRecord::new("T", "sales", PartitioningScheme::Ymd);
        assert_eq!(
            destination_prefix(&record, &date("12312022")),
            "salesYear=2022/Month=12/Day=31/"
        );
    }

    #[test]
    fn test_destination_key() {
        let record = DatasetRecord::new("TOKEN123", "lake/", PartitioningScheme::Ymd);
        let id = "abc_TOKEN123_04052023.csv";
        assert_eq!(
            destination_key(&record, &date("04052023"), id),
            "lake/Year=2023/Month=04/Day=05/abc_TOKEN123_04052023.csv"
        );
    }
}
