//! Walks a storefront's newest-first listing until the recency window is left.
use chrono::{Duration, NaiveDateTime, Utc};
use tracing::{info, instrument, warn};

use crate::database_ops::storefront::{ExtractError, Storefront};
use crate::model::RawGame;
use crate::util::http::PageFetcher;

pub const DEFAULT_MAX_PAGES: u32 = 20;

/// How finely a storefront reports release dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePrecision {
    Timestamp,
    /// Calendar date only; compared against the calendar day the window starts on.
    Day,
}

/// `[start, end]` span of release timestamps considered new.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecencyWindow {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl RecencyWindow {
    pub fn ending_at(end: NaiveDateTime, span: Duration) -> Self {
        Self {
            start: end - span,
            end,
        }
    }

    /// The `hours` leading up to now (UTC).
    pub fn trailing_hours(hours: i64) -> Self {
        Self::ending_at(Utc::now().naive_utc(), Duration::hours(hours))
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// Whether `release` is recent enough. Releases dated after `end` are
    /// pre-announced titles at the top of the listing and count as recent.
    pub fn contains(&self, release: NaiveDateTime, precision: DatePrecision) -> bool {
        match precision {
            DatePrecision::Timestamp => release >= self.start,
            DatePrecision::Day => release.date() >= self.start.date(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// First record older than the window; nothing after it was fetched.
    OutsideWindow,
    /// A listing page came back empty.
    EndOfCatalogue,
    /// Hit the page cap while every record was still in the window.
    PageLimit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    pub page: u32,
    pub position: usize,
    pub reason: String,
}

#[derive(Debug)]
pub struct Harvest {
    pub records: Vec<RawGame>,
    pub skipped: Vec<SkippedRecord>,
    pub pages_fetched: u32,
    pub stop: StopReason,
}

pub struct WindowController<'a, S: Storefront> {
    storefront: &'a S,
    fetcher: &'a dyn PageFetcher,
    window: RecencyWindow,
    max_pages: u32,
}

impl<'a, S: Storefront> WindowController<'a, S> {
    pub fn new(storefront: &'a S, fetcher: &'a dyn PageFetcher, window: RecencyWindow) -> Self {
        Self {
            storefront,
            fetcher,
            window,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Collect every in-window record, newest first.
    ///
    /// Per-record extraction problems are skipped and reported; fetch failures
    /// and unreadable listing pages abort the harvest.
    #[instrument(skip(self), fields(source = %self.storefront.source(), max_pages = self.max_pages))]
    pub async fn collect(&self) -> Result<Harvest, ExtractError> {
        let precision = self.storefront.date_precision();
        let mut records = Vec::new();
        let mut skipped = Vec::new();
        let mut pages_fetched = 0;

        let stop = 'pages: {
            for page in 1..=self.max_pages {
                let entries = self
                    .storefront
                    .fetch_listing(self.fetcher, page, &self.window)
                    .await?;
                pages_fetched += 1;
                if entries.is_empty() {
                    break 'pages StopReason::EndOfCatalogue;
                }

                for (position, entry) in entries.into_iter().enumerate() {
                    let entry = match entry {
                        Ok(entry) => entry,
                        Err(err) if err.is_fatal() => return Err(err),
                        Err(err) => {
                            warn!(page, position, error = %err, "skipping listing entry");
                            skipped.push(SkippedRecord {
                                page,
                                position,
                                reason: err.to_string(),
                            });
                            continue;
                        }
                    };

                    if let Some(listed) = self.storefront.listed_release(&entry) {
                        if !self.window.contains(listed, precision) {
                            break 'pages StopReason::OutsideWindow;
                        }
                    }

                    match self.storefront.extract(self.fetcher, entry).await {
                        Ok(raw) if !self.window.contains(raw.release_date, precision) => {
                            break 'pages StopReason::OutsideWindow;
                        }
                        Ok(raw) => records.push(raw),
                        Err(err) if err.is_fatal() => return Err(err),
                        Err(err) => {
                            warn!(page, position, error = %err, "skipping record");
                            skipped.push(SkippedRecord {
                                page,
                                position,
                                reason: err.to_string(),
                            });
                        }
                    }
                }
            }
            StopReason::PageLimit
        };

        info!(
            records = records.len(),
            skipped = skipped.len(),
            pages_fetched,
            stop = ?stop,
            "harvest complete"
        );
        Ok(Harvest {
            records,
            skipped,
            pages_fetched,
            stop,
        })
    }
}
