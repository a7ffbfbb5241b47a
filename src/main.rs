use chrono::{Datelike, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use miette::{miette, IntoDiagnostic, Result};
use std::fs::File;
use std::path::PathBuf;

use mtop_registry::domain::fees;
use mtop_registry::domain::renewal;
use mtop_registry::interfaces::csv::permit_reader::{duplicate_mtops, PermitCsvReader, PermitRow};

#[derive(Parser)]
#[command(author, version, about = "Franchise permit registry tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Derive the annual renewal due date from a vehicle plate number.
    DueDate {
        plate: String,
        /// Reference date; the due date lands in the following year.
        #[arg(long)]
        reference: Option<NaiveDate>,
    },
    /// Print the itemized renewal fee schedule for a franchise.
    Schedule {
        /// The plate-derived legal deadline for the last period.
        #[arg(long)]
        due: NaiveDate,
        /// The date the renewal is being paid.
        #[arg(long)]
        paid: NaiveDate,
        #[arg(long)]
        last_renewal_year: i32,
        /// Defaults to the payment date's year.
        #[arg(long)]
        current_year: Option<i32>,
        /// Emit the schedule as JSON instead of the text table.
        #[arg(long)]
        json: bool,
    },
    /// Load a legacy ledger CSV and report row count and duplicate MTOPs.
    Import { file: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    match Cli::parse().command {
        Command::DueDate { plate, reference } => {
            let reference = reference.unwrap_or_else(|| Utc::now().date_naive());
            let due = renewal::renewal_due_date(&plate, reference).into_diagnostic()?;
            println!("{due}");
        }
        Command::Schedule {
            due,
            paid,
            last_renewal_year,
            current_year,
            json,
        } => {
            let current_year = current_year.unwrap_or_else(|| paid.year());
            let schedule = fees::renewal_schedule(due, paid, last_renewal_year, current_year);
            if json {
                let items: Vec<serde_json::Value> = schedule
                    .items
                    .iter()
                    .map(|item| {
                        serde_json::json!({
                            "label": item.label,
                            "amount": item.display_amount(),
                        })
                    })
                    .collect();
                let rendered = serde_json::json!({
                    "items": items,
                    "total": schedule.total.round_dp(2),
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&rendered).into_diagnostic()?
                );
            } else {
                for item in &schedule.items {
                    println!("{:<24} {:>10}", item.label, item.display_amount());
                }
                println!("{:<24} {:>10}", "TOTAL", schedule.total.round_dp(2));
            }
        }
        Command::Import { file } => {
            let source = File::open(&file).into_diagnostic()?;
            let mut rows: Vec<PermitRow> = Vec::new();
            for row in PermitCsvReader::new(source).rows() {
                rows.push(row.into_diagnostic()?);
            }
            for row in &rows {
                row.mtop()
                    .map_err(|err| miette!("row MTOP {}: {err}", row.mtop))?;
            }
            let duplicates = duplicate_mtops(&rows);
            println!("rows: {}", rows.len());
            if duplicates.is_empty() {
                println!("duplicates: none");
            } else {
                println!("duplicates: {}", duplicates.join(", "));
            }
        }
    }

    Ok(())
}
