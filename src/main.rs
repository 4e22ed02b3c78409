use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tv_listings::config::{self, Config};
use tv_listings::export;
use tv_listings::state::ScrapeState;
use tv_listings::{DateSelector, HttpFetcher, ListingEntry, Schedule};

#[derive(Parser)]
#[command(name = "tv_listings", about = "Scrape the Audio Description Project TV listings")]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write the result as JSON instead of printing it
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Today's schedule
    Today,
    /// Schedule for a date index (0 = today) or a date label
    Date { selector: String },
    /// Every date the site advertises
    All,
    /// List the advertised dates
    Dates,
    /// List the advertised networks
    Networks,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tv_listings=info".parse()?))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::load(path)?,
        None => Config::default(),
    };

    let schedule = Schedule::new(HttpFetcher::new(&config)?, config.concurrency);
    let state = ScrapeState::new();

    info!(base_url = config.base_url.as_str(), "Scraper started");

    let out = cli.out.as_deref();
    let found = match cli.command {
        Command::Today => scrape_date(&schedule, &state, &DateSelector::None, out).await?,
        Command::Date { selector } => {
            scrape_date(&schedule, &state, &DateSelector::parse(&selector), out).await?
        }
        Command::All => scrape_all(&schedule, &state, out).await?,
        Command::Dates => print_lines(schedule.available_dates().await),
        Command::Networks => print_lines(schedule.available_networks().await),
    };

    let status = state.status();
    info!(
        total_listings = status.total_listings,
        total_networks = status.total_networks,
        "Scraper finished"
    );

    if !found {
        std::process::exit(1);
    }

    Ok(())
}

async fn scrape_date(
    schedule: &Schedule<HttpFetcher>,
    state: &ScrapeState,
    selector: &DateSelector,
    out: Option<&Path>,
) -> Result<bool> {
    let ticket = state.try_begin()?;

    let outcome = schedule.fetch_for_date(selector).await;
    if outcome.is_empty() {
        match &outcome.failure {
            Some(e) => eprintln!("No listings found for the selected date: {e}"),
            None => eprintln!("No listings found for the selected date."),
        }
        return Ok(false);
    }

    ticket.record(
        outcome.listings.clone(),
        outcome.metadata.networks.clone(),
        outcome.metadata.dates.clone(),
    );

    match out {
        Some(path) => export::export_schedule(&outcome, path)?,
        None => {
            println!("{}", outcome.metadata.current_date);
            print_listings(outcome.listings.iter());
        }
    }

    Ok(true)
}

async fn scrape_all(
    schedule: &Schedule<HttpFetcher>,
    state: &ScrapeState,
    out: Option<&Path>,
) -> Result<bool> {
    let ticket = state.try_begin()?;

    let result = schedule.fetch_all_dates().await;
    if result.is_empty() {
        eprintln!("No data found for any dates.");
        return Ok(false);
    }

    let networks = schedule.available_networks().await;
    ticket.record(
        result.all_listings().into_iter().cloned().collect(),
        networks.clone(),
        result.dates_scraped().into_iter().map(str::to_owned).collect(),
    );

    match out {
        Some(path) => export::export_all_dates(&result, &networks, path)?,
        None => {
            for (_, day) in result.iter() {
                println!("{}", day.resolved_date);
                print_listings(day.listings.iter());
            }
        }
    }

    Ok(true)
}

fn print_listings<'a>(listings: impl Iterator<Item = &'a ListingEntry>) {
    for entry in listings {
        let movie = if entry.is_movie { " (movie)" } else { "" };
        println!("  {}\t{}\t{}{}", entry.time, entry.network, entry.program, movie);
    }
}

fn print_lines(lines: Vec<String>) -> bool {
    for line in &lines {
        println!("{line}");
    }
    !lines.is_empty()
}
