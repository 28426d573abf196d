use chrono::NaiveDate;

use crate::models::{MonthPeriod, NormalizedRecord, Susceptibility, TestRecord};

/// A test row that cannot enter the pipeline. Rows are numbered from 1 in
/// input order (the CSV header does not count).
#[derive(Debug, thiserror::Error)]
pub enum InvalidRecord {
    #[error("row {row}: {field} is empty")]
    MissingField { row: usize, field: &'static str },

    #[error("row {row}: unparseable date {value:?}, expected YYYY-MM-DD")]
    BadDate { row: usize, value: String },

    #[error("row {row}: unknown result {value:?}, expected S, I or R")]
    BadResult { row: usize, value: String },
}

/// Validates every record and buckets it into its calendar month. When
/// `collapse_intermediate` is set, `I` results are relabeled `S` before any
/// counting happens downstream. Fails on the first bad row; surveillance
/// input should not be silently dropped.
pub fn normalize(
    records: &[TestRecord],
    collapse_intermediate: bool,
) -> Result<Vec<NormalizedRecord>, InvalidRecord> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| normalize_record(index + 1, record, collapse_intermediate))
        .collect()
}

/// Skip-and-continue variant for callers that opt into it: bad rows are
/// collected instead of aborting the batch.
pub fn normalize_lenient(
    records: &[TestRecord],
    collapse_intermediate: bool,
) -> (Vec<NormalizedRecord>, Vec<InvalidRecord>) {
    let mut normalized = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();

    for (index, record) in records.iter().enumerate() {
        match normalize_record(index + 1, record, collapse_intermediate) {
            Ok(record) => normalized.push(record),
            Err(problem) => rejected.push(problem),
        }
    }

    (normalized, rejected)
}

fn normalize_record(
    row: usize,
    record: &TestRecord,
    collapse_intermediate: bool,
) -> Result<NormalizedRecord, InvalidRecord> {
    let (date, mut result) = validate_record(row, record)?;

    if collapse_intermediate && result == Susceptibility::Intermediate {
        result = Susceptibility::Susceptible;
    }

    Ok(NormalizedRecord {
        bacteria: record.bacteria.trim().to_string(),
        antibiotic: record.antibiotic.trim().to_string(),
        month: MonthPeriod::from_date(date),
        result,
    })
}

/// Field-level validation for one raw row: all four fields present, date
/// parseable, result one of the three wire letters. Returns the parsed date
/// and result so importers can store them without re-parsing.
pub fn validate_record(
    row: usize,
    record: &TestRecord,
) -> Result<(NaiveDate, Susceptibility), InvalidRecord> {
    require_field(row, "bacteria", &record.bacteria)?;
    require_field(row, "antibiotic", &record.antibiotic)?;
    let date = parse_test_date(row, &record.date)?;
    let result = parse_result(row, &record.result)?;
    Ok((date, result))
}

fn parse_test_date(row: usize, value: &str) -> Result<NaiveDate, InvalidRecord> {
    let trimmed = require_field(row, "date", value)?;
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|_| InvalidRecord::BadDate {
        row,
        value: value.to_string(),
    })
}

fn parse_result(row: usize, value: &str) -> Result<Susceptibility, InvalidRecord> {
    let trimmed = require_field(row, "result", value)?;
    Susceptibility::parse(trimmed).ok_or_else(|| InvalidRecord::BadResult {
        row,
        value: value.to_string(),
    })
}

fn require_field<'a>(
    row: usize,
    field: &'static str,
    value: &'a str,
) -> Result<&'a str, InvalidRecord> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(InvalidRecord::MissingField { row, field })
    } else {
        Ok(trimmed)
    }
}
