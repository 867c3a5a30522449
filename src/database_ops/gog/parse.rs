//! Field extraction over GOG's catalogue tiles and product pages.
//!
//! Product pages carry a JSON-LD `Product` document with price, rating and
//! release date; the rest comes from the page markup and an inline script.
use chrono::{DateTime, NaiveDateTime};
use regex::Regex;
use scraper::{ElementRef, Html};
use serde_json::Value;

use crate::database_ops::storefront::{element_text, selector, value_as_f64, ExtractError};
use crate::model::{RawPrice, RawRating};
use crate::normalization::rating::parse_star_string;

/// Script variable holding the per-OS system requirements object.
pub const SYSTEM_REQUIREMENTS_VAR: &str = "window.productcardData.cardProductSystemRequirements";

/// One catalogue tile. GOG tiles show no release date.
#[derive(Debug, Clone, PartialEq)]
pub struct GogTile {
    pub title: String,
    pub detail_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GogDetail {
    pub description: String,
    pub price: RawPrice,
    pub developer: Option<String>,
    pub publisher: Option<String>,
    pub release_date: NaiveDateTime,
    pub rating: RawRating,
    pub tags: Vec<String>,
    pub platforms: Vec<String>,
}

pub fn parse_catalogue_page(body: &str) -> Result<Vec<Result<GogTile, ExtractError>>, ExtractError> {
    let document = Html::parse_document(body);
    let tiles = selector("product-tile")?;
    let mut out = Vec::new();
    for tile in document.select(&tiles) {
        out.push(tile_entry(tile));
    }
    Ok(out)
}

fn tile_entry(tile: ElementRef<'_>) -> Result<GogTile, ExtractError> {
    Ok(GogTile {
        title: title(tile)?,
        detail_url: detail_url(tile)?,
    })
}

/// Title lives in the `title` attribute; the element text is often truncated.
pub fn title(tile: ElementRef<'_>) -> Result<String, ExtractError> {
    tile.select(&selector("div.product-tile__title")?)
        .next()
        .and_then(|div| div.value().attr("title"))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or(ExtractError::Missing("title"))
}

fn detail_url(tile: ElementRef<'_>) -> Result<String, ExtractError> {
    tile.select(&selector("a.product-tile")?)
        .next()
        .and_then(|a| a.value().attr("href"))
        .or_else(|| tile.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(str::to_string)
        .ok_or(ExtractError::Missing("detail url"))
}

pub fn parse_product_page(body: &str) -> Result<GogDetail, ExtractError> {
    let document = Html::parse_document(body);
    let product = product_json(&document)?;
    Ok(GogDetail {
        description: description(&document)?,
        price: price(&product),
        developer: developer(&document)?,
        publisher: publisher(&document)?,
        release_date: release_date(&product)?,
        rating: rating(&product),
        tags: tags(&document)?,
        platforms: platform_indicator(&document)?,
    })
}

/// The page's JSON-LD `Product` document (or the first JSON-LD document when
/// none declares that type).
pub fn product_json(document: &Html) -> Result<Value, ExtractError> {
    let scripts = selector(r#"script[type="application/ld+json"]"#)?;
    let mut first = None;
    for script in document.select(&scripts) {
        let text: String = script.text().collect();
        let Ok(doc) = serde_json::from_str::<Value>(text.trim()) else {
            continue;
        };
        if doc.get("@type").and_then(Value::as_str) == Some("Product") {
            return Ok(doc);
        }
        first.get_or_insert(doc);
    }
    first.ok_or(ExtractError::Missing("product json-ld"))
}

/// `offers.price`; anything unreadable is free.
pub fn price(product: &Value) -> RawPrice {
    let offers = product.get("offers");
    let offer = match offers {
        Some(Value::Array(items)) => items.first(),
        other => other,
    };
    let major = offer
        .and_then(|o| o.get("price"))
        .and_then(value_as_f64)
        .filter(|p| p.is_finite() && *p >= 0.0)
        .unwrap_or(0.0);
    RawPrice::Major(major)
}

pub fn rating(product: &Value) -> RawRating {
    let value = product
        .get("aggregateRating")
        .and_then(|r| r.get("ratingValue"));
    let stars = match value {
        Some(Value::String(s)) => parse_star_string(s),
        Some(v) => value_as_f64(v),
        None => None,
    };
    stars.map_or(RawRating::Absent, RawRating::Stars)
}

/// RFC 3339 `releaseDate`; the local wall-clock time is kept and the offset dropped.
pub fn release_date(product: &Value) -> Result<NaiveDateTime, ExtractError> {
    let raw = product
        .get("releaseDate")
        .and_then(Value::as_str)
        .ok_or(ExtractError::Missing("release date"))?;
    parse_release_date(raw)
}

pub fn parse_release_date(raw: &str) -> Result<NaiveDateTime, ExtractError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_local());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").map_err(|_| {
        ExtractError::Malformed {
            field: "release date",
            value: raw.to_string(),
        }
    })
}

/// `(href, text)` of every `a.details__link`.
fn detail_links(document: &Html) -> Result<Vec<(String, String)>, ExtractError> {
    Ok(document
        .select(&selector("a.details__link")?)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            Some((href.to_string(), element_text(a)))
        })
        .collect())
}

fn linked_name(links: &[(String, String)], href_marker: &str) -> Option<String> {
    links
        .iter()
        .find(|(href, text)| href.contains(href_marker) && !text.is_empty())
        .map(|(_, text)| text.clone())
}

pub fn developer(document: &Html) -> Result<Option<String>, ExtractError> {
    Ok(linked_name(&detail_links(document)?, "games?developers="))
}

pub fn publisher(document: &Html) -> Result<Option<String>, ExtractError> {
    Ok(linked_name(&detail_links(document)?, "games?publishers="))
}

pub fn tags(document: &Html) -> Result<Vec<String>, ExtractError> {
    Ok(document
        .select(&selector("span.details__link-text")?)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect())
}

pub fn description(document: &Html) -> Result<String, ExtractError> {
    Ok(document
        .select(&selector("div.description")?)
        .next()
        .map(element_text)
        .unwrap_or_default())
}

/// Keys of the system requirements object ("windows", "osx", "linux").
/// Pages without the script list no platforms.
pub fn platform_indicator(document: &Html) -> Result<Vec<String>, ExtractError> {
    let assignment = Regex::new(&format!(r"{}\s*=\s*", regex::escape(SYSTEM_REQUIREMENTS_VAR)))?;
    let scripts = selector("script")?;
    for script in document.select(&scripts) {
        let text: String = script.text().collect();
        let Some(found) = assignment.find(&text) else {
            continue;
        };
        let mut values = serde_json::Deserializer::from_str(&text[found.end()..]).into_iter::<Value>();
        return Ok(match values.next() {
            Some(Ok(Value::Object(map))) => map.keys().cloned().collect(),
            _ => Vec::new(),
        });
    }
    Ok(Vec::new())
}

#[cfg(test)]
pub(crate) mod fixtures {
    pub const CATALOGUE_PAGE: &str = r#"
<html><body><div class="catalog__display-wrapper">
  <product-tile class="ng-star-inserted">
    <a class="product-tile product-tile--grid" href="https://www.gog.com/en/game/lantern_keeper">
      <div class="product-tile__title" title="Lantern Keeper">Lantern Kee…</div>
    </a>
  </product-tile>
  <product-tile class="ng-star-inserted">
    <a class="product-tile product-tile--grid" href="https://www.gog.com/en/game/old_relic">
      <div class="product-tile__title" title="Old Relic">Old Relic</div>
    </a>
  </product-tile>
  <product-tile class="ng-star-inserted">
    <a class="product-tile product-tile--grid" href="https://www.gog.com/en/game/nameless">
      <div class="product-tile__title">?</div>
    </a>
  </product-tile>
</div></body></html>"#;

    pub const PRODUCT_PAGE: &str = r#"
<html><head>
  <script type="application/ld+json">{"@type": "BreadcrumbList", "itemListElement": []}</script>
  <script type="application/ld+json">
    {"@context": "https://schema.org", "@type": "Product", "name": "Lantern Keeper",
     "releaseDate": "2024-04-24T09:55:00+03:00",
     "offers": {"@type": "Offer", "price": "9.99", "priceCurrency": "USD"},
     "aggregateRating": {"@type": "AggregateRating", "ratingValue": "4.4"}}
  </script>
</head><body>
  <div class="description">  Keep the light burning. </div>
  <div class="details">
    <a class="details__link" href="/en/games?genres=adventure"><span class="details__link-text">Adventure</span></a>
    <a class="details__link" href="/en/games?tags=puzzle"><span class="details__link-text">Puzzle</span></a>
    <a class="details__link" href="/en/games?developers=wick-works">Wick Works</a>
    <a class="details__link" href="/en/games?publishers=ember">Ember Publishing</a>
  </div>
  <script>
    window.productcardData = window.productcardData || {};
    window.productcardData.cardProductSystemRequirements = {"windows":{"title":"Windows"},"osx":{"title":"Mac OS X"}};
    window.productcardData.cardProductId = "1";
  </script>
</body></html>"#;

    pub const OLD_PRODUCT_PAGE: &str = r#"
<html><head>
  <script type="application/ld+json">
    {"@type": "Product", "name": "Old Relic", "releaseDate": "2020-01-10T00:00:00+00:00",
     "offers": {"price": 72}}
  </script>
</head><body></body></html>"#;
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::fixtures::*;
    use super::*;

    #[test]
    fn parses_catalogue_tiles() {
        let tiles = parse_catalogue_page(CATALOGUE_PAGE).unwrap();
        assert_eq!(tiles.len(), 3);
        let first = tiles[0].as_ref().unwrap();
        assert_eq!(first.title, "Lantern Keeper");
        assert_eq!(first.detail_url, "https://www.gog.com/en/game/lantern_keeper");
        assert!(matches!(tiles[2], Err(ExtractError::Missing("title"))));
    }

    #[test]
    fn parses_product_page() {
        let detail = parse_product_page(PRODUCT_PAGE).unwrap();
        assert_eq!(detail.description, "Keep the light burning.");
        assert_eq!(detail.price, RawPrice::Major(9.99));
        assert_eq!(detail.rating, RawRating::Stars(4.4));
        assert_eq!(detail.developer.as_deref(), Some("Wick Works"));
        assert_eq!(detail.publisher.as_deref(), Some("Ember Publishing"));
        assert_eq!(detail.tags, vec!["Adventure", "Puzzle"]);
        let mut platforms = detail.platforms.clone();
        platforms.sort();
        assert_eq!(platforms, vec!["osx", "windows"]);
    }

    #[test]
    fn release_date_keeps_wall_clock_time() {
        let parsed = parse_release_date("2024-04-24T09:55:00+03:00").unwrap();
        assert_eq!(
            parsed,
            NaiveDate::from_ymd_opt(2024, 4, 24)
                .unwrap()
                .and_hms_opt(9, 55, 0)
                .unwrap()
        );
        assert!(matches!(
            parse_release_date("202400"),
            Err(ExtractError::Malformed { .. })
        ));
    }

    #[test]
    fn odd_prices_and_missing_ratings() {
        let detail = parse_product_page(OLD_PRODUCT_PAGE).unwrap();
        assert_eq!(detail.price, RawPrice::Major(72.0));
        assert_eq!(detail.rating, RawRating::Absent);
        assert!(detail.platforms.is_empty());
        assert_eq!(detail.developer, None);

        let odd = serde_json::json!({"offers": {"price": {"amount": 1}}});
        assert_eq!(price(&odd), RawPrice::Major(0.0));
        assert_eq!(price(&serde_json::json!({})), RawPrice::Major(0.0));
    }

    #[test]
    fn pages_without_json_ld_are_record_errors() {
        let err = parse_product_page("<html><body></body></html>").unwrap_err();
        assert!(matches!(err, ExtractError::Missing("product json-ld")));
        assert!(!err.is_fatal());
    }
}
