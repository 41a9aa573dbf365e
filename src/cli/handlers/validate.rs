//! Validate command handler.

use crate::cli::{OutputFormat, ValidateArgs};
use crate::ingest::START_FORMAT;
use crate::validate::validate;
use anyhow::{Context, Result};
use chrono::{Local, TimeZone};

pub fn handle_validate(args: &ValidateArgs) -> Result<()> {
    let quiet = matches!(args.format, OutputFormat::Json);
    let report = validate(&args.file, quiet)?;

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report)
                .context("failed to serialize validation report")?;
            println!("{json}");
        }
        OutputFormat::Human => {
            println!("\nFinished scanning EPGX file\n");
            println!("EPG contains {} channels", report.channels);
            println!("First entry at {}", format_local(report.first_start));
            println!("Last entry at {}", format_local(report.last_start));

            let average = report.average_span_seconds;
            if average > 3600.0 * 24.0 {
                println!(
                    "Average length is {} days",
                    (average / 3600.0 / 24.0).round() as i64
                );
            } else {
                println!("Average length is {} hours", (average / 3600.0) as i64);
            }
            println!("no errors found");
        }
    }

    Ok(())
}

fn format_local(epoch: i64) -> String {
    match Local.timestamp_opt(epoch, 0) {
        chrono::LocalResult::Single(dt) => dt.format(START_FORMAT).to_string(),
        _ => epoch.to_string(),
    }
}
