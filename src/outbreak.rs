use std::collections::BTreeMap;

use crate::models::{
    GroupKey, GroupMonthRate, MonthPeriod, MonthlySummaryRow, NormalizedRecord, OutbreakAlert,
    ScoredPoint, Susceptibility, TestRecord,
};
use crate::normalize::{self, InvalidRecord};

pub const DEFAULT_Z_THRESHOLD: f64 = 2.0;

/// Monthly resistance rate per (bacteria, antibiotic) group. Output carries
/// exactly one entry per distinct group-month, ordered by group and then
/// chronologically, independent of input order.
pub fn compute_rates(records: &[NormalizedRecord]) -> Vec<GroupMonthRate> {
    let mut buckets: BTreeMap<(GroupKey, MonthPeriod), (usize, usize)> = BTreeMap::new();

    for record in records {
        let entry = buckets.entry((record.group_key(), record.month)).or_insert((0, 0));
        entry.0 += 1;
        if record.result == Susceptibility::Resistant {
            entry.1 += 1;
        }
    }

    buckets
        .into_iter()
        .map(|((key, month), (test_count, resistant_count))| GroupMonthRate {
            bacteria: key.bacteria,
            antibiotic: key.antibiotic,
            month,
            test_count,
            resistant_count,
            resistance_rate: resistant_count as f64 / test_count as f64,
        })
        .collect()
}

/// Standard-scores every group-month against its own group's rate history,
/// using the sample standard deviation (n − 1 divisor; small groups are the
/// common case and the divisor materially changes scores). Groups with a
/// single month or no spread get `None` for every point.
pub fn score_groups(rates: &[GroupMonthRate]) -> Vec<ScoredPoint> {
    let mut partitions: BTreeMap<GroupKey, Vec<GroupMonthRate>> = BTreeMap::new();
    for rate in rates {
        partitions.entry(rate.group_key()).or_default().push(rate.clone());
    }

    let mut points = Vec::new();
    for (_, mut series) in partitions {
        series.sort_by_key(|rate| rate.month);
        let values: Vec<f64> = series.iter().map(|rate| rate.resistance_rate).collect();

        match sample_spread(&values) {
            Some((mean, std_dev)) => {
                for rate in series {
                    let z = (rate.resistance_rate - mean) / std_dev;
                    points.push(ScoredPoint { rate, z_score: Some(z) });
                }
            }
            None => {
                for rate in series {
                    points.push(ScoredPoint { rate, z_score: None });
                }
            }
        }
    }

    points
}

/// Points whose score strictly exceeds the threshold, in input order.
/// Undefined scores never alert.
pub fn detect_outbreaks(points: &[ScoredPoint], threshold: f64) -> Vec<OutbreakAlert> {
    points
        .iter()
        .filter_map(|point| match point.z_score {
            Some(z) if z > threshold => Some(OutbreakAlert {
                bacteria: point.rate.bacteria.clone(),
                antibiotic: point.rate.antibiotic.clone(),
                month_year: point.rate.month,
                resistance_rate: point.rate.resistance_rate,
                z_score: z,
            }),
            _ => None,
        })
        .collect()
}

/// End-to-end pass over raw test rows: normalize, rate, score, filter.
pub fn detect_outbreak_zscore(
    records: &[TestRecord],
    collapse_intermediate: bool,
    threshold: f64,
) -> Result<Vec<OutbreakAlert>, InvalidRecord> {
    let normalized = normalize::normalize(records, collapse_intermediate)?;
    Ok(detect_outbreaks(&score_groups(&compute_rates(&normalized)), threshold))
}

/// Month-by-month test and resistant counts for one bacteria/antibiotic
/// pair, chronological. An unmatched pair yields an empty vec.
pub fn monthly_summary(
    records: &[NormalizedRecord],
    bacteria: &str,
    antibiotic: &str,
) -> Vec<MonthlySummaryRow> {
    let mut months: BTreeMap<MonthPeriod, (usize, usize)> = BTreeMap::new();

    for record in records
        .iter()
        .filter(|record| record.bacteria == bacteria && record.antibiotic == antibiotic)
    {
        let entry = months.entry(record.month).or_insert((0, 0));
        entry.0 += 1;
        if record.result == Susceptibility::Resistant {
            entry.1 += 1;
        }
    }

    months
        .into_iter()
        .map(|(month, (test_count, positive_count))| MonthlySummaryRow {
            month,
            test_count,
            positive_count,
            positive_rate: positive_count as f64 / test_count as f64,
        })
        .collect()
}

fn sample_spread(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 {
        return None;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std_dev = variance.sqrt();

    (std_dev.is_finite() && std_dev > 0.0).then_some((mean, std_dev))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;

    fn observation(bacteria: &str, antibiotic: &str, month: u32, result: Susceptibility) -> NormalizedRecord {
        NormalizedRecord {
            bacteria: bacteria.to_string(),
            antibiotic: antibiotic.to_string(),
            month: MonthPeriod { year: 2026, month },
            result,
        }
    }

    // `resistant` out of `total` tests for one group-month.
    fn month_batch(month: u32, total: usize, resistant: usize) -> Vec<NormalizedRecord> {
        (0..total)
            .map(|i| {
                let result = if i < resistant {
                    Susceptibility::Resistant
                } else {
                    Susceptibility::Susceptible
                };
                observation("Escherichia coli", "Ampicillin", month, result)
            })
            .collect()
    }

    #[test]
    fn rates_stay_in_bounds_and_conserve_counts() {
        let mut records = month_batch(1, 10, 3);
        records.extend(month_batch(2, 7, 7));
        records.push(observation("Klebsiella pneumoniae", "Meropenem", 1, Susceptibility::Susceptible));

        let rates = compute_rates(&records);
        let total_tests: usize = rates.iter().map(|rate| rate.test_count).sum();
        assert_eq!(total_tests, records.len());
        for rate in &rates {
            assert!(rate.resistance_rate >= 0.0 && rate.resistance_rate <= 1.0);
            assert!(rate.resistant_count <= rate.test_count);
            assert!(rate.test_count >= 1);
        }
    }

    #[test]
    fn one_rate_per_group_month_in_chronological_order() {
        let mut records = month_batch(3, 4, 1);
        records.extend(month_batch(1, 4, 0));
        records.extend(month_batch(2, 4, 2));

        let rates = compute_rates(&records);
        assert_eq!(rates.len(), 3);
        let months: Vec<u32> = rates.iter().map(|rate| rate.month.month).collect();
        assert_eq!(months, vec![1, 2, 3]);
    }

    #[test]
    fn output_does_not_depend_on_input_order() {
        let mut records = month_batch(1, 6, 1);
        records.extend(month_batch(2, 6, 2));
        records.extend(month_batch(3, 6, 5));

        let mut reversed = records.clone();
        reversed.reverse();

        let forward = score_groups(&compute_rates(&records));
        let backward = score_groups(&compute_rates(&reversed));

        assert_eq!(forward.len(), backward.len());
        for (a, b) in forward.iter().zip(backward.iter()) {
            assert_eq!(a.rate.month, b.rate.month);
            assert_eq!(a.rate.test_count, b.rate.test_count);
            match (a.z_score, b.z_score) {
                (Some(x), Some(y)) => assert!((x - y).abs() < 1e-12),
                (None, None) => {}
                _ => panic!("score defined in one order only"),
            }
        }
    }

    #[test]
    fn spike_month_is_the_only_alert() {
        // Seven quiet months at 10% resistance, then a 90% month. With the
        // sample divisor a lone outlier is bounded at (n-1)/sqrt(n), so the
        // baseline has to be this long before a spike can clear z = 2.
        let mut records = Vec::new();
        for month in 1..=7 {
            records.extend(month_batch(month, 10, 1));
        }
        records.extend(month_batch(8, 10, 9));

        let points = score_groups(&compute_rates(&records));
        let alerts = detect_outbreaks(&points, DEFAULT_Z_THRESHOLD);

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].month_year, MonthPeriod { year: 2026, month: 8 });
        assert!((alerts[0].resistance_rate - 0.9).abs() < 1e-9);
        assert!(alerts[0].z_score > DEFAULT_Z_THRESHOLD);
    }

    #[test]
    fn raising_the_threshold_never_adds_alerts() {
        let mut records = Vec::new();
        for month in 1..=7 {
            records.extend(month_batch(month, 10, 1));
        }
        records.extend(month_batch(8, 10, 9));

        let points = score_groups(&compute_rates(&records));
        let loose = detect_outbreaks(&points, 2.0);
        let tight = detect_outbreaks(&points, 2.5);

        assert!(tight.len() <= loose.len());
        for alert in &tight {
            assert!(loose
                .iter()
                .any(|other| other.month_year == alert.month_year
                    && other.bacteria == alert.bacteria
                    && other.antibiotic == alert.antibiotic));
        }
    }

    #[test]
    fn constant_rates_never_alert() {
        let mut records = month_batch(1, 5, 1);
        records.extend(month_batch(2, 5, 1));
        records.extend(month_batch(3, 5, 1));

        let points = score_groups(&compute_rates(&records));
        assert!(points.iter().all(|point| point.z_score.is_none()));
        assert!(detect_outbreaks(&points, 0.0).is_empty());
    }

    #[test]
    fn single_month_group_scores_undefined_without_error() {
        let records = month_batch(4, 12, 6);
        let points = score_groups(&compute_rates(&records));

        assert_eq!(points.len(), 1);
        assert!(points[0].z_score.is_none());
        assert!(detect_outbreaks(&points, DEFAULT_Z_THRESHOLD).is_empty());
    }

    #[test]
    fn threshold_comparison_is_strict() {
        let rate = GroupMonthRate {
            bacteria: "Escherichia coli".to_string(),
            antibiotic: "Ampicillin".to_string(),
            month: MonthPeriod { year: 2026, month: 1 },
            test_count: 10,
            resistant_count: 9,
            resistance_rate: 0.9,
        };
        let point = ScoredPoint { rate, z_score: Some(2.0) };
        assert!(detect_outbreaks(&[point.clone()], 2.0).is_empty());
        assert_eq!(detect_outbreaks(&[point], 1.9).len(), 1);
    }

    #[test]
    fn intermediate_never_counts_as_positive_under_either_policy() {
        let rows = vec![
            TestRecord {
                bacteria: "Escherichia coli".to_string(),
                antibiotic: "Ampicillin".to_string(),
                date: "2026-01-10".to_string(),
                result: "I".to_string(),
            },
            TestRecord {
                bacteria: "Escherichia coli".to_string(),
                antibiotic: "Ampicillin".to_string(),
                date: "2026-01-11".to_string(),
                result: "R".to_string(),
            },
        ];

        for collapse in [true, false] {
            let normalized = normalize(&rows, collapse).expect("valid rows");
            let rates = compute_rates(&normalized);
            assert_eq!(rates.len(), 1);
            assert_eq!(rates[0].resistant_count, 1);
            assert_eq!(rates[0].test_count, 2);
        }
    }

    #[test]
    fn end_to_end_pass_reports_bad_rows() {
        let rows = vec![TestRecord {
            bacteria: "Escherichia coli".to_string(),
            antibiotic: "Ampicillin".to_string(),
            date: "2026-01-10".to_string(),
            result: "X".to_string(),
        }];

        let error = detect_outbreak_zscore(&rows, true, DEFAULT_Z_THRESHOLD)
            .expect_err("invalid result letter");
        assert!(error.to_string().contains("row 1"));
    }

    #[test]
    fn monthly_summary_is_chronological_and_scoped_to_the_pair() {
        let mut records = month_batch(2, 4, 1);
        records.extend(month_batch(1, 5, 0));
        records.push(observation("Klebsiella pneumoniae", "Meropenem", 1, Susceptibility::Resistant));

        let rows = monthly_summary(&records, "Escherichia coli", "Ampicillin");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].month.month, 1);
        assert_eq!(rows[0].test_count, 5);
        assert_eq!(rows[0].positive_count, 0);
        assert_eq!(rows[1].positive_count, 1);
        assert!((rows[1].positive_rate - 0.25).abs() < 1e-9);
    }

    #[test]
    fn monthly_summary_of_unknown_pair_is_empty() {
        let records = month_batch(1, 5, 2);
        let rows = monthly_summary(&records, "Salmonella enterica", "Ceftriaxone");
        assert!(rows.is_empty());
    }
}
