use async_trait::async_trait;
use chrono::NaiveDateTime;
use tracing::debug;

use super::parse::{parse_detail_page, parse_search_page, SteamListing};
use crate::database_ops::pagination::{DatePrecision, RecencyWindow};
use crate::database_ops::storefront::{listing_page_url, ExtractError, Storefront};
use crate::model::{RawGame, SourceId};
use crate::util::env::env_opt;
use crate::util::http::PageFetcher;

/// Search results, newest release first.
pub const DEFAULT_SEARCH_URL: &str =
    "https://store.steampowered.com/search/?sort_by=Released_DESC&category1=998&ndl=1";

/// Steam store scraper: search tiles carry title, price and release day;
/// the app page supplies the rest.
/// Env: STEAM_BASE_URL (search URL; `page=N` is set per request)
#[derive(Debug, Clone)]
pub struct SteamProvider {
    search_url: String,
}

impl SteamProvider {
    pub fn new(search_url: impl Into<String>) -> Self {
        Self {
            search_url: search_url.into(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(env_opt("STEAM_BASE_URL").unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string()))
    }
}

#[async_trait]
impl Storefront for SteamProvider {
    type Entry = SteamListing;

    fn source(&self) -> SourceId {
        SourceId::Steam
    }

    fn date_precision(&self) -> DatePrecision {
        DatePrecision::Day
    }

    async fn fetch_listing(
        &self,
        fetcher: &dyn PageFetcher,
        page: u32,
        _window: &RecencyWindow,
    ) -> Result<Vec<Result<SteamListing, ExtractError>>, ExtractError> {
        let url = listing_page_url(&self.search_url, page)?;
        let body = fetcher.get(&url).await?;
        let tiles = parse_search_page(&body)?;
        debug!(page, tiles = tiles.len(), "steam: parsed search page");
        Ok(tiles)
    }

    fn listed_release(&self, entry: &SteamListing) -> Option<NaiveDateTime> {
        Some(entry.release_date)
    }

    async fn extract(
        &self,
        fetcher: &dyn PageFetcher,
        entry: SteamListing,
    ) -> Result<RawGame, ExtractError> {
        let body = fetcher.get(&entry.detail_url).await?;
        let detail = parse_detail_page(&body)?;
        Ok(RawGame {
            source: SourceId::Steam,
            title: entry.title,
            description: detail.description,
            price: entry.price,
            developer: detail.developer,
            publisher: detail.publisher,
            release_date: entry.release_date,
            rating: detail.rating,
            tags: detail.tags,
            platforms: detail.platforms,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};

    use super::*;
    use crate::database_ops::pagination::{StopReason, WindowController};
    use crate::database_ops::steam::parse::fixtures::{DETAIL_PAGE, SEARCH_PAGE};
    use crate::model::{RawPrice, RawRating};
    use crate::util::http::testing::StaticFetcher;

    const SEARCH: &str = "https://store.test/search/?sort_by=Released_DESC";

    #[tokio::test]
    async fn harvests_tiles_within_the_window() {
        let fetcher = StaticFetcher::new()
            .with_page(&format!("{SEARCH}&page=1"), SEARCH_PAGE)
            .with_page(
                "https://store.steampowered.com/app/100/Hollow_Depths/",
                DETAIL_PAGE,
            );
        // window starts on 24 Apr, so the 23 Apr tile ends the walk
        let window = RecencyWindow::ending_at(
            NaiveDate::from_ymd_opt(2024, 4, 25)
                .unwrap()
                .and_hms_opt(6, 0, 0)
                .unwrap(),
            Duration::hours(24),
        );
        let store = SteamProvider::new(SEARCH);
        let harvest = WindowController::new(&store, &fetcher, window)
            .collect()
            .await
            .unwrap();

        assert_eq!(harvest.stop, StopReason::OutsideWindow);
        assert_eq!(harvest.records.len(), 1);
        let game = &harvest.records[0];
        assert_eq!(game.source, SourceId::Steam);
        assert_eq!(game.title, "Hollow Depths");
        assert_eq!(game.price, RawPrice::Major(0.0));
        assert_eq!(game.developer.as_deref(), Some("Pit Studio"));
        assert!(matches!(game.rating, RawRating::Votes { .. }));
        // the out-of-window tile was never opened
        assert!(!fetcher
            .requested()
            .iter()
            .any(|url| url.contains("/app/101/")));
    }
}
