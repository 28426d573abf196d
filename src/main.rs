use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

mod db;
mod models;
mod normalize;
mod outbreak;
mod report;

#[derive(Parser)]
#[command(name = "outbreak-early-warning")]
#[command(about = "Antimicrobial resistance outbreak early warning tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import susceptibility test results from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
        /// Skip rows that fail validation instead of aborting the import
        #[arg(long)]
        skip_invalid: bool,
    },
    /// Flag group-months whose resistance rate spikes above its history
    Detect {
        #[arg(long)]
        bacteria: Option<String>,
        #[arg(long)]
        antibiotic: Option<String>,
        #[arg(long, default_value_t = outbreak::DEFAULT_Z_THRESHOLD)]
        threshold: f64,
        /// Keep Intermediate results as-is instead of collapsing them to Susceptible
        #[arg(long)]
        keep_intermediate: bool,
        #[arg(long)]
        json: bool,
    },
    /// Monthly test and resistance counts for one bacteria/antibiotic pair
    Summary {
        #[arg(long)]
        bacteria: String,
        #[arg(long)]
        antibiotic: String,
        #[arg(long)]
        keep_intermediate: bool,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value_t = outbreak::DEFAULT_Z_THRESHOLD)]
        threshold: f64,
        #[arg(long)]
        keep_intermediate: bool,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv, skip_invalid } => {
            let outcome = db::import_csv(&pool, &csv, skip_invalid).await?;
            for problem in &outcome.skipped {
                eprintln!("skipped {problem}");
            }
            println!(
                "Inserted {} test results from {}.",
                outcome.inserted,
                csv.display()
            );
        }
        Commands::Detect {
            bacteria,
            antibiotic,
            threshold,
            keep_intermediate,
            json,
        } => {
            let records =
                db::fetch_tests(&pool, bacteria.as_deref(), antibiotic.as_deref()).await?;
            let alerts =
                outbreak::detect_outbreak_zscore(&records, !keep_intermediate, threshold)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&alerts)?);
            } else if alerts.is_empty() {
                println!("No outbreak alerts above z {threshold:.1}.");
            } else {
                println!("Outbreak alerts (z > {threshold:.1}):");
                for alert in &alerts {
                    println!(
                        "- {} vs {} in {}: resistance {:.1}% (z {:.2})",
                        alert.bacteria,
                        alert.antibiotic,
                        alert.month_year,
                        alert.resistance_rate * 100.0,
                        alert.z_score
                    );
                }
            }
        }
        Commands::Summary {
            bacteria,
            antibiotic,
            keep_intermediate,
            json,
        } => {
            let records =
                db::fetch_tests(&pool, Some(bacteria.as_str()), Some(antibiotic.as_str())).await?;
            let normalized = normalize::normalize(&records, !keep_intermediate)?;
            let rows = outbreak::monthly_summary(&normalized, &bacteria, &antibiotic);

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                println!("No test results found for {bacteria} / {antibiotic}.");
            } else {
                println!("Monthly summary for {bacteria} / {antibiotic}:");
                for row in &rows {
                    println!(
                        "- {}: {} tests, {} resistant ({:.1}%)",
                        row.month,
                        row.test_count,
                        row.positive_count,
                        row.positive_rate * 100.0
                    );
                }
            }
        }
        Commands::Report {
            threshold,
            keep_intermediate,
            out,
        } => {
            let records = db::fetch_tests(&pool, None, None).await?;
            let normalized = normalize::normalize(&records, !keep_intermediate)?;
            let points = outbreak::score_groups(&outbreak::compute_rates(&normalized));
            let alerts = outbreak::detect_outbreaks(&points, threshold);
            let comments =
                report::attach_comments(&alerts, |alert| Ok(report::describe_alert(alert)));
            let report = report::build_report(threshold, &normalized, &comments);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
