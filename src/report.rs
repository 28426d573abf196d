use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use crate::models::{
    GroupActivity, GroupKey, MonthPeriod, NormalizedRecord, OutbreakAlert, Susceptibility,
};

#[derive(Debug, Clone)]
pub struct AlertComment {
    pub alert: OutbreakAlert,
    pub comment: String,
}

pub fn summarize_groups(records: &[NormalizedRecord]) -> Vec<GroupActivity> {
    let mut map: BTreeMap<GroupKey, (BTreeSet<MonthPeriod>, usize, usize)> = BTreeMap::new();

    for record in records {
        let entry = map
            .entry(record.group_key())
            .or_insert_with(|| (BTreeSet::new(), 0, 0));
        entry.0.insert(record.month);
        entry.1 += 1;
        if record.result == Susceptibility::Resistant {
            entry.2 += 1;
        }
    }

    let mut summaries: Vec<GroupActivity> = map
        .into_iter()
        .map(|(key, (months, test_count, resistant_count))| GroupActivity {
            bacteria: key.bacteria,
            antibiotic: key.antibiotic,
            month_count: months.len(),
            test_count,
            resistant_count,
        })
        .collect();

    summaries.sort_by(|a, b| b.test_count.cmp(&a.test_count));
    summaries
}

/// Runs a fallible comment source over every alert. A failed comment gets
/// the fixed fallback line; one failure never blocks the rest of the batch.
pub fn attach_comments<F>(alerts: &[OutbreakAlert], mut generate: F) -> Vec<AlertComment>
where
    F: FnMut(&OutbreakAlert) -> anyhow::Result<String>,
{
    alerts
        .iter()
        .map(|alert| AlertComment {
            alert: alert.clone(),
            comment: generate(alert).unwrap_or_else(|_| fallback_comment(alert)),
        })
        .collect()
}

pub fn describe_alert(alert: &OutbreakAlert) -> String {
    format!(
        "Resistance of {} to {} reached {:.1}% in {}, {:.1} standard deviations \
         above the group's typical monthly rate. Review isolates from this \
         period for a possible outbreak.",
        alert.bacteria,
        alert.antibiotic,
        alert.resistance_rate * 100.0,
        alert.month_year,
        alert.z_score
    )
}

pub fn fallback_comment(alert: &OutbreakAlert) -> String {
    format!(
        "Commentary unavailable; {} / {} flagged in {} at {:.1}% resistance.",
        alert.bacteria,
        alert.antibiotic,
        alert.month_year,
        alert.resistance_rate * 100.0
    )
}

pub fn build_report(
    threshold: f64,
    records: &[NormalizedRecord],
    comments: &[AlertComment],
) -> String {
    let groups = summarize_groups(records);

    let mut output = String::new();
    let _ = writeln!(output, "# Resistance Outbreak Early Warning Report");
    let _ = writeln!(
        output,
        "Scanned {} susceptibility results across {} bacteria/antibiotic groups (alert threshold z > {:.1}).",
        records.len(),
        groups.len(),
        threshold
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Outbreak Alerts");

    if comments.is_empty() {
        let _ = writeln!(output, "No group-month exceeded the alert threshold.");
    } else {
        for entry in comments.iter() {
            let alert = &entry.alert;
            let _ = writeln!(
                output,
                "- {} / {} in {}: resistance {:.1}% (z {:.2})",
                alert.bacteria,
                alert.antibiotic,
                alert.month_year,
                alert.resistance_rate * 100.0,
                alert.z_score
            );
            let _ = writeln!(output, "  {}", entry.comment);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Group Activity");

    if groups.is_empty() {
        let _ = writeln!(output, "No test results recorded.");
    } else {
        for group in groups.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} / {}: {} tests over {} months, {:.1}% resistant overall",
                group.bacteria,
                group.antibiotic,
                group.test_count,
                group.month_count,
                group.resistance_share() * 100.0
            );
        }
    }

    output
}
