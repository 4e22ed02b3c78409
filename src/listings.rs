use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{debug, warn};

use crate::metadata::UNKNOWN_DATE;

/// Marker the site appends to program titles that are films.
pub const MOVIE_MARKER: &str = "[MOVIE]";

static TABLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table#daily-schedule").expect("table selector is valid"));
static DATE_HEADER_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h3.date-header").expect("date header selector is valid"));
static ROW_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tbody tr").expect("row selector is valid"));
static CELL_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("cell selector is valid"));

/// One row of the daily schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingEntry {
    pub time: String,
    pub network: String,
    pub program: String,
    pub date: String,
    pub is_movie: bool,
}

/// Extracts the schedule rows and the rendered date label from a listings page.
///
/// Rows keep document order. Rows with fewer than three cells are skipped.
/// Every entry is stamped with the page's date label.
pub fn extract_listings(page_body: &str) -> (Vec<ListingEntry>, String) {
    let document = Html::parse_document(page_body);

    let Some(table) = document.select(&TABLE_SELECTOR).next() else {
        warn!("Could not find daily-schedule table");
        return (Vec::new(), UNKNOWN_DATE.to_string());
    };

    let current_date = document
        .select(&DATE_HEADER_SELECTOR)
        .next()
        .map(|header| element_text(&header).trim().to_string())
        .unwrap_or_else(|| UNKNOWN_DATE.to_string());

    let rows: Vec<ElementRef> = table.select(&ROW_SELECTOR).collect();
    debug!(rows = rows.len(), "Found rows in the table");

    let listings = rows
        .iter()
        .filter_map(|row| parse_row(row, &current_date))
        .collect();

    (listings, current_date)
}

fn parse_row(row: &ElementRef, date: &str) -> Option<ListingEntry> {
    let cells: Vec<String> = row
        .select(&CELL_SELECTOR)
        .take(3)
        .map(|cell| element_text(&cell))
        .collect();

    let [time, network, program] = cells.as_slice() else {
        return None;
    };

    Some(ListingEntry {
        time: time.trim().to_string(),
        network: network.trim().to_string(),
        program: program.trim().to_string(),
        date: date.to_string(),
        is_movie: program.contains(MOVIE_MARKER),
    })
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect()
}
