use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::TestRecord;
use crate::normalize::{self, InvalidRecord};

pub struct ImportOutcome {
    pub inserted: usize,
    pub skipped: Vec<InvalidRecord>,
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    // A stable E. coli / Ampicillin baseline with a spike in the last month,
    // plus a flat K. pneumoniae / Meropenem series for contrast.
    let mut rows: Vec<(String, &str, &str, NaiveDate, &str)> = Vec::new();

    for (index, month) in [9u32, 10, 11, 12].into_iter().enumerate() {
        for test in 0u32..10 {
            let result = if test < 1 { "R" } else { "S" };
            rows.push((
                format!("seed-ecoli-{index}-{test}"),
                "Escherichia coli",
                "Ampicillin",
                date(2025, month, 3 + test)?,
                result,
            ));
        }
    }
    for test in 0u32..10 {
        let result = if test < 8 { "R" } else { "S" };
        rows.push((
            format!("seed-ecoli-spike-{test}"),
            "Escherichia coli",
            "Ampicillin",
            date(2026, 1, 3 + test)?,
            result,
        ));
    }

    for month in [11u32, 12] {
        for test in 0u32..6 {
            let result = if test == 0 { "I" } else { "S" };
            rows.push((
                format!("seed-kpneu-{month}-{test}"),
                "Klebsiella pneumoniae",
                "Meropenem",
                date(2025, month, 5 + test)?,
                result,
            ));
        }
    }

    for (source_key, bacteria, antibiotic, tested_on, result) in rows {
        sqlx::query(
            r#"
            INSERT INTO amr_surveillance.test_results
            (id, bacteria, antibiotic, tested_on, result, source_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(bacteria)
        .bind(antibiotic)
        .bind(tested_on)
        .bind(result)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    Ok(())
}

fn date(year: i32, month: u32, day: u32) -> anyhow::Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).context("invalid date")
}

pub async fn fetch_tests(
    pool: &PgPool,
    bacteria: Option<&str>,
    antibiotic: Option<&str>,
) -> anyhow::Result<Vec<TestRecord>> {
    let mut query = String::from(
        "SELECT bacteria, antibiotic, tested_on, result \
         FROM amr_surveillance.test_results",
    );

    match (bacteria.is_some(), antibiotic.is_some()) {
        (true, true) => query.push_str(" WHERE bacteria = $1 AND antibiotic = $2"),
        (true, false) => query.push_str(" WHERE bacteria = $1"),
        (false, true) => query.push_str(" WHERE antibiotic = $1"),
        (false, false) => {}
    }
    query.push_str(" ORDER BY bacteria, antibiotic, tested_on");

    let mut rows = sqlx::query(&query);
    if let Some(value) = bacteria {
        rows = rows.bind(value);
    }
    if let Some(value) = antibiotic {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut tests = Vec::with_capacity(records.len());

    for row in records {
        let tested_on: NaiveDate = row.get("tested_on");
        tests.push(TestRecord {
            bacteria: row.get("bacteria"),
            antibiotic: row.get("antibiotic"),
            date: tested_on.to_string(),
            result: row.get("result"),
        });
    }

    Ok(tests)
}

pub async fn import_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
    skip_invalid: bool,
) -> anyhow::Result<ImportOutcome> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        bacteria: String,
        antibiotic: String,
        date: String,
        resistance: String,
        #[serde(default)]
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;
    let mut skipped = Vec::new();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        let data_row = index + 1;
        let record = TestRecord {
            bacteria: row.bacteria.clone(),
            antibiotic: row.antibiotic.clone(),
            date: row.date.clone(),
            result: row.resistance.clone(),
        };

        // Validate before touching the database; bad surveillance rows must
        // be reported, not silently dropped.
        let (tested_on, result) = match normalize::validate_record(data_row, &record) {
            Ok(values) => values,
            Err(problem) if skip_invalid => {
                skipped.push(problem);
                continue;
            }
            Err(problem) => return Err(problem.into()),
        };

        let source_key = row
            .source_key
            .filter(|key| !key.trim().is_empty())
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let outcome = sqlx::query(
            r#"
            INSERT INTO amr_surveillance.test_results
            (id, bacteria, antibiotic, tested_on, result, source_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(row.bacteria.trim())
        .bind(row.antibiotic.trim())
        .bind(tested_on)
        .bind(result.as_letter())
        .bind(source_key)
        .execute(pool)
        .await?;

        if outcome.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(ImportOutcome { inserted, skipped })
}
