pub mod config;
pub mod export;
pub mod fetcher;
pub mod listings;
pub mod metadata;
pub mod resolver;
pub mod schedule;
pub mod state;

pub use fetcher::{FetchError, HttpFetcher, PageFetcher};
pub use listings::ListingEntry;
pub use metadata::ScheduleMetadata;
pub use resolver::DateSelector;
pub use schedule::{AllDatesResult, DateListings, FetchOutcome, Schedule};
