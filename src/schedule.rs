use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};

use crate::fetcher::{FetchError, PageFetcher};
use crate::listings::{ListingEntry, extract_listings};
use crate::metadata::{ScheduleMetadata, UNKNOWN_DATE, extract_metadata};
use crate::resolver::{DateSelector, resolve};

/// Listings and metadata from one page.
///
/// A failed fetch yields no listings, empty metadata and the error in `failure`.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub listings: Vec<ListingEntry>,
    pub metadata: ScheduleMetadata,
    pub failure: Option<FetchError>,
}

impl FetchOutcome {
    fn from_body(body: &str) -> Self {
        let metadata = extract_metadata(body);
        let (listings, _) = extract_listings(body);
        info!(
            listings = listings.len(),
            current_date = metadata.current_date.as_str(),
            "Extracted TV listings"
        );
        Self {
            listings,
            metadata,
            failure: None,
        }
    }

    fn failed(failure: FetchError) -> Self {
        Self {
            failure: Some(failure),
            ..Self::default()
        }
    }

    /// True when there is nothing to show, whether or not the fetch failed.
    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }
}

/// Listings for one date of an all-dates scrape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateListings {
    pub listings: Vec<ListingEntry>,
    /// Date label the page reported for itself.
    pub resolved_date: String,
}

/// Per-date results keyed by the site's date labels, in site order.
/// Dates that failed or had no rows are absent.
#[derive(Debug, Clone, Default)]
pub struct AllDatesResult {
    entries: Vec<(String, DateListings)>,
}

impl AllDatesResult {
    pub fn get(&self, date: &str) -> Option<&DateListings> {
        self.entries
            .iter()
            .find(|(label, _)| label == date)
            .map(|(_, listings)| listings)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DateListings)> {
        self.entries
            .iter()
            .map(|(label, listings)| (label.as_str(), listings))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dates_scraped(&self) -> Vec<&str> {
        self.entries.iter().map(|(label, _)| label.as_str()).collect()
    }

    /// Every listing across dates, in date order.
    pub fn all_listings(&self) -> Vec<&ListingEntry> {
        self.entries
            .iter()
            .flat_map(|(_, day)| day.listings.iter())
            .collect()
    }

    fn push(&mut self, date: String, listings: DateListings) {
        self.entries.push((date, listings));
    }
}

impl FromIterator<(String, DateListings)> for AllDatesResult {
    fn from_iter<I: IntoIterator<Item = (String, DateListings)>>(iter: I) -> Self {
        let mut result = Self::default();
        for (date, listings) in iter {
            result.push(date, listings);
        }
        result
    }
}

/// Retrieves schedules through a [`PageFetcher`].
///
/// Holds no state between calls; concurrent use is safe.
pub struct Schedule<F> {
    fetcher: F,
    concurrency: usize,
}

impl<F: PageFetcher> Schedule<F> {
    pub fn new(fetcher: F, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    /// Today's listings and metadata.
    pub async fn fetch_schedule(&self) -> FetchOutcome {
        self.fetch_page(&DateSelector::None).await
    }

    /// Listings for `selector`. A positive index costs an extra fetch of today's
    /// page to learn the available dates.
    pub async fn fetch_for_date(&self, selector: &DateSelector) -> FetchOutcome {
        let known_dates = if selector.needs_known_dates() {
            let today = self.fetch_schedule().await;
            if let Some(failure) = today.failure {
                return FetchOutcome::failed(failure);
            }
            today.metadata.dates
        } else {
            Vec::new()
        };

        let target = DateSelector::from(resolve(selector, &known_dates));
        self.fetch_page(&target).await
    }

    /// Listings for every advertised date. Dates that fail or have no rows are
    /// left out; the rest keep the site's order.
    pub async fn fetch_all_dates(&self) -> AllDatesResult {
        let mut all = AllDatesResult::default();

        let today = self.fetch_schedule().await;
        let known_dates = today.metadata.dates;
        if known_dates.is_empty() {
            warn!("No dates found in metadata");
            return all;
        }

        info!(dates = known_dates.len(), "Scraping all dates");

        // `buffered` yields in input order regardless of completion order.
        let outcomes: Vec<(String, FetchOutcome)> = stream::iter(known_dates)
            .map(|label| async move {
                let outcome = self
                    .fetch_for_date(&DateSelector::Literal(label.clone()))
                    .await;
                (label, outcome)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        for (label, outcome) in outcomes {
            if outcome.listings.is_empty() {
                match &outcome.failure {
                    Some(e) => {
                        warn!(date = label.as_str(), error = %e, "Fetch failed, date skipped")
                    }
                    None => warn!(date = label.as_str(), "No listings found"),
                }
                continue;
            }

            let resolved_date = if outcome.metadata.current_date == UNKNOWN_DATE {
                label.clone()
            } else {
                outcome.metadata.current_date
            };

            let listings: Vec<ListingEntry> = outcome
                .listings
                .into_iter()
                .map(|mut entry| {
                    entry.date = resolved_date.clone();
                    entry
                })
                .collect();

            info!(date = label.as_str(), listings = listings.len(), "Scraped date");
            all.push(
                label,
                DateListings {
                    listings,
                    resolved_date,
                },
            );
        }

        all
    }

    /// Date labels advertised on today's page.
    pub async fn available_dates(&self) -> Vec<String> {
        self.fetch_schedule().await.metadata.dates
    }

    /// Network names advertised on today's page.
    pub async fn available_networks(&self) -> Vec<String> {
        self.fetch_schedule().await.metadata.networks
    }

    async fn fetch_page(&self, selector: &DateSelector) -> FetchOutcome {
        match self.fetcher.fetch(selector).await {
            Ok(body) => FetchOutcome::from_body(&body),
            Err(e) => {
                error!(error = %e, "Error fetching data");
                FetchOutcome::failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Serves canned pages per selector, optionally after a delay, and records
    /// every request and the order responses completed in.
    #[derive(Default)]
    struct FakeFetcher {
        pages: HashMap<DateSelector, Result<String, FetchError>>,
        delays: HashMap<DateSelector, Duration>,
        requests: Mutex<Vec<DateSelector>>,
        completed: Mutex<Vec<DateSelector>>,
    }

    impl FakeFetcher {
        fn page(mut self, selector: DateSelector, body: String) -> Self {
            self.pages.insert(selector, Ok(body));
            self
        }

        fn failing(mut self, selector: DateSelector) -> Self {
            let url = format!("https://adp.acb.org/tv-listings?{selector:?}");
            self.pages.insert(selector, Err(FetchError::Timeout { url }));
            self
        }

        fn delayed(mut self, selector: DateSelector, millis: u64) -> Self {
            self.delays.insert(selector, Duration::from_millis(millis));
            self
        }

        fn requests(&self) -> Vec<DateSelector> {
            self.requests.lock().unwrap().clone()
        }

        fn completed(&self) -> Vec<DateSelector> {
            self.completed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, selector: &DateSelector) -> Result<String, FetchError> {
            self.requests.lock().unwrap().push(selector.clone());
            if let Some(delay) = self.delays.get(selector) {
                tokio::time::sleep(*delay).await;
            }
            self.completed.lock().unwrap().push(selector.clone());
            self.pages
                .get(selector)
                .cloned()
                .unwrap_or_else(|| {
                    Err(FetchError::Connection {
                        url: format!("{selector:?}"),
                        message: "no such page".into(),
                    })
                })
        }
    }

    fn literal(date: &str) -> DateSelector {
        DateSelector::Literal(date.to_string())
    }

    fn page(current: &str, dates: &[&str], rows: &[(&str, &str, &str)]) -> String {
        let dates = serde_json::to_string(dates).unwrap();
        let rows: String = rows
            .iter()
            .map(|(t, n, p)| format!("<tr><td>{t}</td><td>{n}</td><td>{p}</td></tr>"))
            .collect();
        format!(
            r#"<html><head><script type="application/json" data-drupal-selector="drupal-settings-json">
            {{"tvListings":{{"networks":["ABC","NBC"],"dates":{dates},"currentDate":"{current}"}}}}
            </script></head><body>
            <h3 class="date-header">{current}</h3>
            <table id="daily-schedule"><tbody>{rows}</tbody></table>
            </body></html>"#
        )
    }

    const DATES: [&str; 2] = ["Sat, Jul 12", "Sun, Jul 13"];

    fn today_page() -> String {
        page(
            "Sat, Jul 12",
            &DATES,
            &[("8:00 PM", "ABC", "Show A"), ("9:00 PM", "NBC", "Show B [MOVIE]")],
        )
    }

    #[tokio::test]
    async fn fetch_schedule_reads_listings_and_metadata() {
        let schedule = Schedule::new(
            FakeFetcher::default().page(DateSelector::None, today_page()),
            1,
        );

        let outcome = schedule.fetch_schedule().await;

        assert!(outcome.failure.is_none());
        assert_eq!(outcome.listings.len(), 2);
        assert!(outcome.listings[1].is_movie);
        assert_eq!(outcome.metadata.dates, DATES);
        assert_eq!(outcome.metadata.networks, vec!["ABC", "NBC"]);
    }

    #[tokio::test]
    async fn fetch_failure_is_an_empty_outcome_with_reason() {
        let schedule = Schedule::new(FakeFetcher::default().failing(DateSelector::None), 1);

        let outcome = schedule.fetch_schedule().await;

        assert!(outcome.is_empty());
        assert_eq!(outcome.metadata, ScheduleMetadata::empty());
        assert!(matches!(outcome.failure, Some(FetchError::Timeout { .. })));
    }

    #[tokio::test]
    async fn positive_index_fetches_today_first_then_the_resolved_date() {
        let fetcher = FakeFetcher::default()
            .page(DateSelector::None, today_page())
            .page(
                literal("Sun, Jul 13"),
                page("Sun, Jul 13", &DATES, &[("7:00 AM", "PBS", "Morning")]),
            );
        let schedule = Schedule::new(fetcher, 1);

        let outcome = schedule.fetch_for_date(&DateSelector::Index(1)).await;

        assert_eq!(outcome.listings.len(), 1);
        assert_eq!(outcome.listings[0].program, "Morning");
        assert_eq!(outcome.metadata.current_date, "Sun, Jul 13");
        assert_eq!(
            schedule.fetcher.requests(),
            vec![DateSelector::None, literal("Sun, Jul 13")]
        );
    }

    #[tokio::test]
    async fn index_zero_and_literal_need_one_fetch() {
        let fetcher = FakeFetcher::default()
            .page(DateSelector::None, today_page())
            .page(literal("Whenever"), page("Whenever", &[], &[("1", "A", "P")]));
        let schedule = Schedule::new(fetcher, 1);

        schedule.fetch_for_date(&DateSelector::Index(0)).await;
        let outcome = schedule.fetch_for_date(&literal("Whenever")).await;

        assert_eq!(outcome.listings[0].date, "Whenever");
        assert_eq!(
            schedule.fetcher.requests(),
            vec![DateSelector::None, literal("Whenever")]
        );
    }

    #[tokio::test]
    async fn out_of_range_index_falls_back_to_today() {
        let schedule = Schedule::new(
            FakeFetcher::default().page(DateSelector::None, today_page()),
            1,
        );

        let outcome = schedule.fetch_for_date(&DateSelector::Index(5)).await;

        assert_eq!(outcome.metadata.current_date, "Sat, Jul 12");
        assert_eq!(
            schedule.fetcher.requests(),
            vec![DateSelector::None, DateSelector::None]
        );
    }

    #[tokio::test]
    async fn failed_preliminary_fetch_stops_index_lookup() {
        let schedule = Schedule::new(FakeFetcher::default().failing(DateSelector::None), 1);

        let outcome = schedule.fetch_for_date(&DateSelector::Index(1)).await;

        assert!(outcome.is_empty());
        assert!(outcome.failure.is_some());
        assert_eq!(schedule.fetcher.requests(), vec![DateSelector::None]);
    }

    #[tokio::test]
    async fn all_dates_omits_failed_dates() {
        let fetcher = FakeFetcher::default()
            .page(DateSelector::None, today_page())
            .page(literal("Sat, Jul 12"), today_page())
            .failing(literal("Sun, Jul 13"));
        let schedule = Schedule::new(fetcher, 2);

        let result = schedule.fetch_all_dates().await;

        assert_eq!(result.len(), 1);
        assert_eq!(result.dates_scraped(), vec!["Sat, Jul 12"]);
        let day = result.get("Sat, Jul 12").unwrap();
        assert_eq!(day.listings.len(), 2);
        assert_eq!(day.resolved_date, "Sat, Jul 12");
        assert!(result.get("Sun, Jul 13").is_none());
    }

    #[tokio::test]
    async fn all_dates_attempts_every_date_in_site_order() {
        let dates = ["Mon", "Tue", "Wed", "Thu"];
        let fetcher = FakeFetcher::default()
            .page(DateSelector::None, page("Mon", &dates, &[]))
            .failing(literal("Mon"))
            .page(
                literal("Tue"),
                page("Tuesday, July 15", &dates, &[("1", "A", "Tue show")]),
            )
            .page(literal("Wed"), page("Wed", &dates, &[]))
            .page(literal("Thu"), page("Thu", &dates, &[("2", "B", "Thu show")]));
        let schedule = Schedule::new(fetcher, 3);

        let result = schedule.fetch_all_dates().await;

        assert_eq!(result.dates_scraped(), vec!["Tue", "Thu"]);
        let all: Vec<(&str, &str)> = result
            .all_listings()
            .iter()
            .map(|l| (l.program.as_str(), l.date.as_str()))
            .collect();
        assert_eq!(all, vec![("Tue show", "Tuesday, July 15"), ("Thu show", "Thu")]);

        // today plus one request per date, failures included
        assert_eq!(schedule.fetcher.requests().len(), 5);
    }

    #[tokio::test]
    async fn all_dates_keeps_site_order_when_later_dates_finish_first() {
        let dates = ["Mon", "Tue", "Wed"];
        let fetcher = FakeFetcher::default()
            .page(DateSelector::None, page("Mon", &dates, &[]))
            .page(literal("Mon"), page("Mon", &dates, &[("1", "A", "Mon show")]))
            .page(literal("Tue"), page("Tue", &dates, &[("2", "B", "Tue show")]))
            .page(literal("Wed"), page("Wed", &dates, &[("3", "C", "Wed show")]))
            .delayed(literal("Mon"), 120)
            .delayed(literal("Tue"), 60);
        let schedule = Schedule::new(fetcher, 3);

        let result = schedule.fetch_all_dates().await;

        assert_eq!(
            schedule.fetcher.completed(),
            vec![DateSelector::None, literal("Wed"), literal("Tue"), literal("Mon")]
        );
        assert_eq!(result.dates_scraped(), vec!["Mon", "Tue", "Wed"]);
        let programs: Vec<&str> = result
            .all_listings()
            .iter()
            .map(|l| l.program.as_str())
            .collect();
        assert_eq!(programs, vec!["Mon show", "Tue show", "Wed show"]);
    }

    #[tokio::test]
    async fn all_dates_uses_requested_label_when_page_has_no_date() {
        let body = r#"<table id="daily-schedule"><tbody>
            <tr><td>1</td><td>A</td><td>P</td></tr></tbody></table>"#;
        let fetcher = FakeFetcher::default()
            .page(DateSelector::None, page("Mon", &["Mon"], &[]))
            .page(literal("Mon"), body.to_string());
        let schedule = Schedule::new(fetcher, 1);

        let result = schedule.fetch_all_dates().await;

        let day = result.get("Mon").unwrap();
        assert_eq!(day.resolved_date, "Mon");
        assert_eq!(day.listings[0].date, "Mon");
    }

    #[tokio::test]
    async fn all_dates_without_metadata_is_empty() {
        let schedule = Schedule::new(
            FakeFetcher::default().page(DateSelector::None, "<html></html>".into()),
            1,
        );

        let result = schedule.fetch_all_dates().await;

        assert!(result.is_empty());
        assert_eq!(schedule.fetcher.requests(), vec![DateSelector::None]);
    }

    #[tokio::test]
    async fn available_dates_and_networks_come_from_today() {
        let schedule = Schedule::new(
            FakeFetcher::default().page(DateSelector::None, today_page()),
            1,
        );

        assert_eq!(schedule.available_dates().await, DATES);
        assert_eq!(schedule.available_networks().await, vec!["ABC", "NBC"]);
    }
}
