use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Susceptibility {
    Susceptible,
    Intermediate,
    Resistant,
}

impl Susceptibility {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "S" => Some(Self::Susceptible),
            "I" => Some(Self::Intermediate),
            "R" => Some(Self::Resistant),
            _ => None,
        }
    }

    pub fn as_letter(self) -> &'static str {
        match self {
            Self::Susceptible => "S",
            Self::Intermediate => "I",
            Self::Resistant => "R",
        }
    }
}

/// One susceptibility test row as the tabular loader delivers it, before
/// any validation. `date` is ISO `YYYY-MM-DD`; `result` is `S`, `I` or `R`.
#[derive(Debug, Clone)]
pub struct TestRecord {
    pub bacteria: String,
    pub antibiotic: String,
    pub date: String,
    pub result: String,
}

/// A calendar month, the aggregation bucket for all rate computations.
/// Orders chronologically and prints as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthPeriod {
    pub year: i32,
    pub month: u32,
}

impl MonthPeriod {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for MonthPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for MonthPeriod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The unit over which time-series scoring runs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub bacteria: String,
    pub antibiotic: String,
}

#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    pub bacteria: String,
    pub antibiotic: String,
    pub month: MonthPeriod,
    pub result: Susceptibility,
}

impl NormalizedRecord {
    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            bacteria: self.bacteria.clone(),
            antibiotic: self.antibiotic.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupMonthRate {
    pub bacteria: String,
    pub antibiotic: String,
    pub month: MonthPeriod,
    pub test_count: usize,
    pub resistant_count: usize,
    pub resistance_rate: f64,
}

impl GroupMonthRate {
    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            bacteria: self.bacteria.clone(),
            antibiotic: self.antibiotic.clone(),
        }
    }
}

/// A group-month rate with its standard score inside the group's rate
/// history. `z_score` is `None` when the group has fewer than two months
/// or its rates show no spread; such points can never alert.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub rate: GroupMonthRate,
    pub z_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutbreakAlert {
    pub bacteria: String,
    pub antibiotic: String,
    pub month_year: MonthPeriod,
    pub resistance_rate: f64,
    pub z_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlySummaryRow {
    pub month: MonthPeriod,
    pub test_count: usize,
    pub positive_count: usize,
    pub positive_rate: f64,
}

#[derive(Debug, Clone)]
pub struct GroupActivity {
    pub bacteria: String,
    pub antibiotic: String,
    pub month_count: usize,
    pub test_count: usize,
    pub resistant_count: usize,
}

impl GroupActivity {
    pub fn resistance_share(&self) -> f64 {
        if self.test_count == 0 {
            0.0
        } else {
            self.resistant_count as f64 / self.test_count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_periods_order_chronologically() {
        let dec = MonthPeriod { year: 2025, month: 12 };
        let jan = MonthPeriod { year: 2026, month: 1 };
        assert!(dec < jan);
        assert_eq!(jan.to_string(), "2026-01");
    }

    #[test]
    fn alerts_serialize_to_flat_records() {
        let alert = OutbreakAlert {
            bacteria: "Escherichia coli".to_string(),
            antibiotic: "Ampicillin".to_string(),
            month_year: MonthPeriod { year: 2024, month: 3 },
            resistance_rate: 0.9,
            z_score: 2.48,
        };

        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["month_year"], "2024-03");
        assert_eq!(value["bacteria"], "Escherichia coli");
        assert_eq!(value["resistance_rate"], 0.9);
    }

    #[test]
    fn only_the_three_wire_letters_parse() {
        assert_eq!(Susceptibility::parse("R"), Some(Susceptibility::Resistant));
        assert_eq!(Susceptibility::parse("r"), None);
        assert_eq!(Susceptibility::parse("X"), None);
    }
}
