//! Date-range filtering and ordering of records.

use crate::error::ExportError;
use crate::pipeline::ingest::Record;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Inclusive calendar-date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ExportError> {
        if start > end {
            return Err(ExportError::InvalidDateRange(format!(
                "start {} is later than end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse optional `YYYY-MM-DD` bounds. Both or neither must be given.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Option<Self>, ExportError> {
        let parse_one = |s: &str| {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
                ExportError::InvalidDateRange(format!("'{}' is not a YYYY-MM-DD date", s))
            })
        };
        match (start, end) {
            (None, None) => Ok(None),
            (Some(s), Some(e)) => Ok(Some(Self::new(parse_one(s)?, parse_one(e)?)?)),
            _ => Err(ExportError::InvalidDateRange(
                "date filter requires both a start and an end date".into(),
            )),
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Record order in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// Oldest first. (default)
    #[default]
    Ascending,
    /// Newest first.
    Descending,
}

/// Keep records inside `range` and sort them by timestamp.
///
/// The sort is stable, so records with equal timestamps keep their CSV order.
pub fn select(records: Vec<Record>, range: Option<DateRange>, order: SortOrder) -> Vec<Record> {
    let mut kept: Vec<Record> = match range {
        Some(r) => records
            .into_iter()
            .filter(|rec| r.contains(rec.created_at.date()))
            .collect(),
        None => records,
    };
    match order {
        SortOrder::Ascending => kept.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        SortOrder::Descending => kept.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ingest::parse_datetime;

    fn rec(id: &str, ts: &str) -> Record {
        Record {
            id: id.into(),
            created_at: parse_datetime(ts).unwrap(),
            text: String::new(),
            link: String::new(),
            media_urls: vec![],
        }
    }

    fn ids(rs: &[Record]) -> Vec<&str> {
        rs.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn range_requires_both_bounds() {
        assert!(DateRange::parse(None, None).unwrap().is_none());
        assert!(DateRange::parse(Some("2024-01-01"), None).is_err());
        assert!(DateRange::parse(Some("2024-02-01"), Some("2024-01-01")).is_err());
        assert!(DateRange::parse(Some("01/02/2024"), Some("2024-01-01")).is_err());
    }

    #[test]
    fn range_is_inclusive_by_date() {
        let r = DateRange::parse(Some("2024-01-02"), Some("2024-01-03"))
            .unwrap()
            .unwrap();
        let records = vec![
            rec("a", "2024-01-01 23:59:59"),
            rec("b", "2024-01-02 00:00:00"),
            rec("c", "2024-01-03 23:59:59"),
            rec("d", "2024-01-04 00:00:00"),
        ];
        assert_eq!(ids(&select(records, Some(r), SortOrder::Ascending)), ["b", "c"]);
    }

    #[test]
    fn sort_orders_are_stable() {
        let records = vec![
            rec("late", "2024-03-01"),
            rec("tie1", "2024-02-01"),
            rec("early", "2024-01-01"),
            rec("tie2", "2024-02-01"),
        ];
        assert_eq!(
            ids(&select(records.clone(), None, SortOrder::Ascending)),
            ["early", "tie1", "tie2", "late"]
        );
        assert_eq!(
            ids(&select(records, None, SortOrder::Descending)),
            ["late", "tie1", "tie2", "early"]
        );
    }
}
