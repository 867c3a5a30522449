use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::Value;
use tracing::debug;

use super::parse;
use crate::database_ops::pagination::RecencyWindow;
use crate::database_ops::storefront::{ExtractError, Storefront};
use crate::model::{RawGame, SourceId};
use crate::util::env::{env_opt, env_parse};
use crate::util::http::PageFetcher;

pub const DEFAULT_ENDPOINT: &str = "https://graphql.epicgames.com/graphql";
pub const DEFAULT_PAGE_SIZE: u32 = 40;

/// Epic store via its GraphQL search. Every field arrives with the listing, so
/// extraction needs no further requests.
/// Env: EPIC_BASE_URL (GraphQL endpoint), EPIC_PAGE_SIZE (elements per request)
#[derive(Debug, Clone)]
pub struct EpicProvider {
    endpoint: String,
    page_size: u32,
}

impl EpicProvider {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn from_env() -> Self {
        Self::new(env_opt("EPIC_BASE_URL").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()))
            .with_page_size(env_parse("EPIC_PAGE_SIZE", DEFAULT_PAGE_SIZE))
    }
}

#[async_trait]
impl Storefront for EpicProvider {
    type Entry = Value;

    fn source(&self) -> SourceId {
        SourceId::Epic
    }

    async fn fetch_listing(
        &self,
        fetcher: &dyn PageFetcher,
        page: u32,
        window: &RecencyWindow,
    ) -> Result<Vec<Result<Value, ExtractError>>, ExtractError> {
        let Some(start) = page.saturating_sub(1).checked_mul(self.page_size) else {
            // Past the largest offset the query can carry: nothing further to list.
            debug!(page, page_size = self.page_size, "epic: offset out of range");
            return Ok(Vec::new());
        };
        let body = parse::search_body(window, self.page_size, start);
        let response = fetcher.post_json(&self.endpoint, &body).await?;
        let elements = parse::parse_search_response(&response)?;
        debug!(page, start, elements = elements.len(), "epic: parsed search page");
        Ok(elements.into_iter().map(Ok).collect())
    }

    fn listed_release(&self, entry: &Value) -> Option<NaiveDateTime> {
        parse::release_date(entry).ok()
    }

    async fn extract(&self, _fetcher: &dyn PageFetcher, entry: Value) -> Result<RawGame, ExtractError> {
        Ok(RawGame {
            source: SourceId::Epic,
            title: parse::title(&entry)?,
            description: parse::description(&entry),
            price: parse::price(&entry),
            developer: parse::developer(&entry),
            publisher: parse::publisher(&entry),
            release_date: parse::release_date(&entry)?,
            rating: parse::rating(&entry),
            tags: parse::tags(&entry),
            platforms: parse::platform_indicator(&entry),
        })
    }
}
