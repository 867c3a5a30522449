//! Field extraction over Steam's search listing and app pages.
//!
//! `Html` is not `Send`, so every function here parses synchronously and hands
//! back owned data before the caller awaits again.
use chrono::{NaiveDate, NaiveDateTime};
use scraper::{ElementRef, Html};

use crate::database_ops::storefront::{element_text, selector, ExtractError};
use crate::model::{RawPrice, RawRating};
use crate::normalization::price::parse_price_text;

/// Release dates as the store renders them for a UK locale, then US.
const RELEASE_DATE_FORMATS: &[&str] = &["%d %b, %Y", "%b %d, %Y", "%d %B, %Y", "%B %d, %Y"];

/// One tile of the search listing.
#[derive(Debug, Clone, PartialEq)]
pub struct SteamListing {
    pub title: String,
    pub price: RawPrice,
    pub release_date: NaiveDateTime,
    pub detail_url: String,
}

/// Fields only the app page carries.
#[derive(Debug, Clone, PartialEq)]
pub struct SteamDetail {
    pub description: String,
    pub developer: Option<String>,
    pub publisher: Option<String>,
    pub rating: RawRating,
    pub tags: Vec<String>,
    pub platforms: Vec<String>,
}

pub fn parse_search_page(
    body: &str,
) -> Result<Vec<Result<SteamListing, ExtractError>>, ExtractError> {
    let document = Html::parse_document(body);
    let tiles = selector("a.search_result_row")?;
    let mut out = Vec::new();
    for tile in document.select(&tiles) {
        out.push(listing_from_tile(tile));
    }
    Ok(out)
}

fn listing_from_tile(tile: ElementRef<'_>) -> Result<SteamListing, ExtractError> {
    let detail_url = tile
        .value()
        .attr("href")
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .ok_or(ExtractError::Missing("detail url"))?
        .to_string();
    Ok(SteamListing {
        title: title(tile)?,
        price: price(tile)?,
        release_date: release_date(tile)?,
        detail_url,
    })
}

pub fn title(tile: ElementRef<'_>) -> Result<String, ExtractError> {
    tile.select(&selector("span.title")?)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .ok_or(ExtractError::Missing("title"))
}

/// The current price of a tile: the discount block when present, else the
/// last text of the older `search_price` block (a struck-out original comes
/// first there). Missing or unreadable prices are free rather than errors.
pub fn price(tile: ElementRef<'_>) -> Result<RawPrice, ExtractError> {
    let text = match tile.select(&selector("div.discount_final_price")?).next() {
        Some(current) => element_text(current),
        None => tile
            .select(&selector("div.search_price")?)
            .next()
            .and_then(|block| block.text().map(str::trim).filter(|t| !t.is_empty()).last())
            .unwrap_or_default()
            .to_string(),
    };
    Ok(RawPrice::Major(parse_price_text(&text)))
}

pub fn release_date(tile: ElementRef<'_>) -> Result<NaiveDateTime, ExtractError> {
    let text = tile
        .select(&selector("div.search_released")?)
        .next()
        .map(element_text)
        .ok_or(ExtractError::Missing("release date"))?;
    parse_release_date(&text)
}

pub fn parse_release_date(text: &str) -> Result<NaiveDateTime, ExtractError> {
    let text = text.trim();
    RELEASE_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ExtractError::Malformed {
            field: "release date",
            value: text.to_string(),
        })
}

pub fn parse_detail_page(body: &str) -> Result<SteamDetail, ExtractError> {
    let document = Html::parse_document(body);
    Ok(SteamDetail {
        description: description(&document)?,
        developer: developer(&document)?,
        publisher: publisher(&document)?,
        rating: rating(&document)?,
        tags: tags(&document)?,
        platforms: platform_indicator(&document)?,
    })
}

pub fn description(document: &Html) -> Result<String, ExtractError> {
    Ok(document
        .select(&selector("#game_area_description")?)
        .next()
        .map(element_text)
        .map(|text| {
            text.strip_prefix("About This Game")
                .map(str::trim_start)
                .unwrap_or(&text)
                .to_string()
        })
        .unwrap_or_default())
}

pub fn developer(document: &Html) -> Result<Option<String>, ExtractError> {
    dev_row_value(document, "Developer")
}

pub fn publisher(document: &Html) -> Result<Option<String>, ExtractError> {
    dev_row_value(document, "Publisher")
}

/// Value of the `div.dev_row` whose label starts with `label`: the first link's
/// text, or the row text after the label when the row has no link.
fn dev_row_value(document: &Html, label: &str) -> Result<Option<String>, ExtractError> {
    let rows = selector("div.dev_row")?;
    let label_sel = selector("div.subtitle, b")?;
    let link_sel = selector("a")?;
    for row in document.select(&rows) {
        let Some(row_label) = row.select(&label_sel).next().map(element_text) else {
            continue;
        };
        if !row_label.starts_with(label) {
            continue;
        }
        if let Some(link) = row.select(&link_sel).next() {
            let name = element_text(link);
            return Ok(Some(name).filter(|n| !n.is_empty()));
        }
        let text = element_text(row);
        let value = text.strip_prefix(&row_label).unwrap_or(&text).trim();
        return Ok(Some(value.to_string()).filter(|n| !n.is_empty()));
    }
    Ok(None)
}

/// Positive and negative review counts; a page without a review block has no rating.
pub fn rating(document: &Html) -> Result<RawRating, ExtractError> {
    let Some(block) = document.select(&selector("div.review_ctn")?).next() else {
        return Ok(RawRating::Absent);
    };
    let positive = block
        .select(&selector(r#"label[for="review_type_positive"] span.user_reviews_count"#)?)
        .next()
        .and_then(|span| parse_review_count(&element_text(span)));
    let negative = block
        .select(&selector(r#"label[for="review_type_negative"] span.user_reviews_count"#)?)
        .next()
        .and_then(|span| parse_review_count(&element_text(span)));
    Ok(RawRating::Votes { positive, negative })
}

/// "(1,234)" -> 1234
pub fn parse_review_count(text: &str) -> Option<u64> {
    let digits: String = text
        .trim()
        .trim_matches(|c| c == '(' || c == ')')
        .chars()
        .filter(|c| *c != ',' && *c != '.' && !c.is_whitespace())
        .collect();
    digits.parse().ok()
}

pub fn tags(document: &Html) -> Result<Vec<String>, ExtractError> {
    Ok(document
        .select(&selector("a.app_tag")?)
        .map(element_text)
        .filter(|t| !t.is_empty() && t != "+")
        .collect())
}

/// System-requirement tab labels, or the first requirements list when the page
/// only supports one platform and shows no tabs.
pub fn platform_indicator(document: &Html) -> Result<Vec<String>, ExtractError> {
    let tabs: Vec<String> = document
        .select(&selector("div.sysreq_tab")?)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect();
    if !tabs.is_empty() {
        return Ok(tabs);
    }
    Ok(document
        .select(&selector("div.sysreq_contents ul.bb_ul")?)
        .next()
        .map(element_text)
        .into_iter()
        .collect())
}

#[cfg(test)]
pub(crate) mod fixtures {
    pub const SEARCH_PAGE: &str = r#"
<html><body><div id="search_resultsRows">
  <a href="https://store.steampowered.com/app/100/Hollow_Depths/" class="search_result_row ds_collapse_flag">
    <div class="col search_name ellipsis"><span class="title">Hollow Depths</span></div>
    <div class="col search_released responsive_secondrow">24 Apr, 2024</div>
    <div class="search_price_discount_combined"><div class="discount_final_price">Free</div></div>
  </a>
  <a href="https://store.steampowered.com/app/101/Brass_Orbit/" class="search_result_row">
    <div class="col search_name ellipsis"><span class="title">Brass Orbit</span></div>
    <div class="col search_released responsive_secondrow">23 Apr, 2024</div>
    <div class="search_price_discount_combined"><div class="discount_final_price">£4.99</div></div>
  </a>
  <a href="https://store.steampowered.com/app/102/Untitled/" class="search_result_row">
    <div class="col search_released responsive_secondrow">23 Apr, 2024</div>
  </a>
  <a href="https://store.steampowered.com/app/103/Soon/" class="search_result_row">
    <div class="col search_name ellipsis"><span class="title">Soon</span></div>
    <div class="col search_released responsive_secondrow">Coming soon</div>
  </a>
</div></body></html>"#;

    pub const DETAIL_PAGE: &str = r##"
<html><body>
  <div id="game_area_description" class="game_area_description">
    <h2>About This Game</h2>
    Descend   into the pit.
  </div>
  <div class="dev_row">
    <div class="subtitle column">Developer:</div>
    <div class="summary column" id="developers_list"><a href="https://store.steampowered.com/developer/pit">Pit Studio</a></div>
  </div>
  <div class="dev_row">
    <div class="subtitle column">Publisher:</div>
    <div class="summary column"><a href="https://store.steampowered.com/publisher/deep">Deep Games</a></div>
  </div>
  <div class="review_ctn">
    <label for="review_type_positive">Positive <span class="user_reviews_count">(1,050)</span></label>
    <label for="review_type_negative">Negative <span class="user_reviews_count">(1,030)</span></label>
  </div>
  <div class="glance_tags popular_tags">
    <a class="app_tag" href="#"> Indie </a>
    <a class="app_tag" href="#">Windows</a>
    <a class="app_tag" href="#">Rogue-Lite</a>
    <a class="app_tag add_button" href="#">+</a>
  </div>
  <div class="sysreq_tabs">
    <div class="sysreq_tab active" data-os="win"> Windows </div>
    <div class="sysreq_tab" data-os="linux">SteamOS + Linux</div>
  </div>
</body></html>"##;

    pub const BARE_DETAIL_PAGE: &str = r#"
<html><body>
  <div id="game_area_description">A tiny game.</div>
  <div class="sysreq_contents"><div class="game_area_sys_req">
    <ul class="bb_ul"><li>OS: Windows 10</li></ul>
  </div></div>
</body></html>"#;
}
