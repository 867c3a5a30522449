use async_trait::async_trait;
use tracing::debug;

use super::parse::{parse_catalogue_page, parse_product_page, GogTile};
use crate::database_ops::pagination::RecencyWindow;
use crate::database_ops::storefront::{listing_page_url, resolve_link, ExtractError, Storefront};
use crate::model::{RawGame, SourceId};
use crate::util::env::env_opt;
use crate::util::http::PageFetcher;

/// Catalogue ordered by release date, newest first.
pub const DEFAULT_CATALOGUE_URL: &str = "https://www.gog.com/en/games?order=desc:releaseDate";

/// GOG catalogue scraper. Tiles only carry the title and link, so the release
/// date is known after the product page has been read.
/// Env: GOG_BASE_URL (catalogue URL; `page=N` is set per request)
#[derive(Debug, Clone)]
pub struct GogProvider {
    catalogue_url: String,
}

impl GogProvider {
    pub fn new(catalogue_url: impl Into<String>) -> Self {
        Self {
            catalogue_url: catalogue_url.into(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(env_opt("GOG_BASE_URL").unwrap_or_else(|| DEFAULT_CATALOGUE_URL.to_string()))
    }
}

#[async_trait]
impl Storefront for GogProvider {
    type Entry = GogTile;

    fn source(&self) -> SourceId {
        SourceId::Gog
    }

    async fn fetch_listing(
        &self,
        fetcher: &dyn PageFetcher,
        page: u32,
        _window: &RecencyWindow,
    ) -> Result<Vec<Result<GogTile, ExtractError>>, ExtractError> {
        let url = listing_page_url(&self.catalogue_url, page)?;
        let body = fetcher.get(&url).await?;
        let tiles = parse_catalogue_page(&body)?
            .into_iter()
            .map(|tile| -> Result<GogTile, ExtractError> {
                let mut tile = tile?;
                tile.detail_url = resolve_link(&url, &tile.detail_url)?;
                Ok(tile)
            })
            .collect::<Vec<_>>();
        debug!(page, tiles = tiles.len(), "gog: parsed catalogue page");
        Ok(tiles)
    }

    async fn extract(&self, fetcher: &dyn PageFetcher, entry: GogTile) -> Result<RawGame, ExtractError> {
        let body = fetcher.get(&entry.detail_url).await?;
        let detail = parse_product_page(&body)?;
        Ok(RawGame {
            source: SourceId::Gog,
            title: entry.title,
            description: detail.description,
            price: detail.price,
            developer: detail.developer,
            publisher: detail.publisher,
            release_date: detail.release_date,
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
    use crate::database_ops::gog::parse::fixtures::{CATALOGUE_PAGE, OLD_PRODUCT_PAGE, PRODUCT_PAGE};
    use crate::database_ops::pagination::{StopReason, WindowController};
    use crate::model::{RawPrice, RawRating};
    use crate::util::http::testing::StaticFetcher;

    const CATALOGUE: &str = "https://www.gog.com/en/games?order=desc:releaseDate";

    #[tokio::test]
    async fn harvests_until_an_old_product_page() {
        let fetcher = StaticFetcher::new()
            .with_page(&format!("{CATALOGUE}&page=1"), CATALOGUE_PAGE)
            .with_page("https://www.gog.com/en/game/lantern_keeper", PRODUCT_PAGE)
            .with_page("https://www.gog.com/en/game/old_relic", OLD_PRODUCT_PAGE);
        let window = RecencyWindow::ending_at(
            NaiveDate::from_ymd_opt(2024, 4, 25)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            Duration::hours(24),
        );
        let store = GogProvider::new(CATALOGUE);
        let harvest = WindowController::new(&store, &fetcher, window)
            .collect()
            .await
            .unwrap();

        assert_eq!(harvest.stop, StopReason::OutsideWindow);
        assert_eq!(harvest.records.len(), 1);
        let game = &harvest.records[0];
        assert_eq!(game.source, SourceId::Gog);
        assert_eq!(game.title, "Lantern Keeper");
        assert_eq!(game.price, RawPrice::Major(9.99));
        assert_eq!(game.rating, RawRating::Stars(4.4));
        // the untitled third tile sits after the stop and is never reported
        assert!(harvest.skipped.is_empty());
        assert!(!fetcher
            .requested()
            .iter()
            .any(|url| url.ends_with("/nameless")));
    }
}
