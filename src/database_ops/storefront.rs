//! The seam between the pagination controller and a concrete storefront.
use async_trait::async_trait;
use chrono::NaiveDateTime;
use scraper::{ElementRef, Selector};
use serde_json::Value;
use thiserror::Error;

use crate::database_ops::pagination::{DatePrecision, RecencyWindow};
use crate::model::{RawGame, SourceId};
use crate::util::http::{FetchError, PageFetcher};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("malformed {field}: {value:?}")]
    Malformed { field: &'static str, value: String },
    #[error("invalid selector {0:?}")]
    Selector(String),
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExtractError {
    /// Fatal errors end the whole cycle; anything else only costs the record it came from.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExtractError::Fetch(_) | ExtractError::Selector(_) | ExtractError::Pattern(_)
        )
    }
}

/// A storefront: how to read its listing pages and turn one entry into a raw tuple.
///
/// Listings must be ordered newest release first; the controller relies on it
/// to stop at the first record outside the window.
#[async_trait]
pub trait Storefront: Send + Sync {
    /// One listing entry, carried from the listing page to `extract`.
    type Entry: Send;

    fn source(&self) -> SourceId;

    fn date_precision(&self) -> DatePrecision {
        DatePrecision::Timestamp
    }

    /// Fetch listing page `page` (1-based). An empty vec is the end of the
    /// catalogue; an `Err` entry is a malformed record that can be skipped,
    /// while an outer `Err` means the page itself could not be read.
    async fn fetch_listing(
        &self,
        fetcher: &dyn PageFetcher,
        page: u32,
        window: &RecencyWindow,
    ) -> Result<Vec<Result<Self::Entry, ExtractError>>, ExtractError>;

    /// Release date shown on the listing itself, so out-of-window entries can be
    /// rejected before any detail page is fetched.
    fn listed_release(&self, _entry: &Self::Entry) -> Option<NaiveDateTime> {
        None
    }

    async fn extract(
        &self,
        fetcher: &dyn PageFetcher,
        entry: Self::Entry,
    ) -> Result<RawGame, ExtractError>;
}

pub(crate) fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|_| ExtractError::Selector(css.to_string()))
}

/// Text content of an element with whitespace runs collapsed.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// `base` with `page=N` set, keeping every other query parameter.
pub(crate) fn listing_page_url(base: &str, page: u32) -> Result<String, FetchError> {
    let mut url = url::Url::parse(base).map_err(|e| FetchError::InvalidUrl {
        url: base.to_string(),
        reason: e.to_string(),
    })?;
    // Rebuilding the query re-encodes it, so only do so when a page is already set.
    if url.query_pairs().any(|(k, _)| k == "page") {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != "page")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url.query_pairs_mut().append_pair("page", &page.to_string());
    Ok(url.into())
}

/// Resolve a possibly relative link against the page it was found on.
pub(crate) fn resolve_link(base: &str, href: &str) -> Result<String, ExtractError> {
    let base = url::Url::parse(base).map_err(|_| ExtractError::Malformed {
        field: "base url",
        value: base.to_string(),
    })?;
    base.join(href.trim())
        .map(String::from)
        .map_err(|_| ExtractError::Malformed {
            field: "link",
            value: href.to_string(),
        })
}

/// Numbers and numeric strings as `f64`.
pub(crate) fn value_as_f64(v: &Value) -> Option<f64> {
    if let Some(n) = v.as_f64() {
        return Some(n);
    }
    if let Some(s) = v.as_str() {
        return s.trim().parse::<f64>().ok();
    }
    None
}
