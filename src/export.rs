use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::listings::ListingEntry;
use crate::schedule::{AllDatesResult, FetchOutcome};

#[derive(Serialize)]
struct ScheduleExport<'a> {
    scraped_at: String,
    current_date: &'a str,
    total: usize,
    networks: &'a [String],
    dates: &'a [String],
    listings: &'a [ListingEntry],
}

#[derive(Serialize)]
struct DateExport<'a> {
    date: &'a str,
    resolved_date: &'a str,
    listings: &'a [ListingEntry],
}

#[derive(Serialize)]
struct AllDatesExport<'a> {
    scraped_at: String,
    total_listings: usize,
    dates_scraped: Vec<&'a str>,
    networks: &'a [String],
    data: Vec<DateExport<'a>>,
    all_listings: Vec<&'a ListingEntry>,
}

/// Writes one date's listings with its metadata.
pub fn export_schedule(outcome: &FetchOutcome, path: &Path) -> Result<()> {
    let export = ScheduleExport {
        scraped_at: Utc::now().to_rfc3339(),
        current_date: &outcome.metadata.current_date,
        total: outcome.listings.len(),
        networks: &outcome.metadata.networks,
        dates: &outcome.metadata.dates,
        listings: &outcome.listings,
    };
    write_json(&export, path)
}

/// Writes every scraped date, grouped and flattened.
pub fn export_all_dates(result: &AllDatesResult, networks: &[String], path: &Path) -> Result<()> {
    let all_listings = result.all_listings();

    let export = AllDatesExport {
        scraped_at: Utc::now().to_rfc3339(),
        total_listings: all_listings.len(),
        dates_scraped: result.dates_scraped(),
        networks,
        data: result
            .iter()
            .map(|(date, day)| DateExport {
                date,
                resolved_date: &day.resolved_date,
                listings: &day.listings,
            })
            .collect(),
        all_listings,
    };
    write_json(&export, path)
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;

    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())?;

    Ok(())
}
