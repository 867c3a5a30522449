//! The Epic store search query and field extraction over its JSON elements.
use chrono::{DateTime, NaiveDateTime};
use serde_json::{json, Value};

use crate::database_ops::pagination::RecencyWindow;
use crate::database_ops::storefront::{value_as_f64, ExtractError};
use crate::model::{RawPrice, RawRating};

/// Tag group Epic files operating systems under.
pub const PLATFORM_TAG_GROUP: &str = "platform";

/// GraphQL `searchStore` query for one page of releases inside `window`,
/// newest first.
pub fn search_query(window: &RecencyWindow, count: u32, start: u32) -> String {
    format!(
        r#"{{
  Catalog {{
    searchStore(count: {count}, start: {start}, sortBy: "releaseDate", sortDir: "DESC",
                releaseDate: "[{from},{to}]") {{
      elements {{
        title
        releaseDate
        description
        publisherDisplayName
        developerDisplayName
        currentPrice
        seller {{ name }}
        tags {{ name groupName }}
        categories {{ path }}
      }}
    }}
  }}
}}"#,
        from = window.start().format("%Y-%m-%d"),
        to = window.end().format("%Y-%m-%d"),
    )
}

pub fn search_body(window: &RecencyWindow, count: u32, start: u32) -> Value {
    json!({ "query": search_query(window, count, start) })
}

/// `data.Catalog.searchStore.elements` of a search response.
pub fn parse_search_response(body: &str) -> Result<Vec<Value>, ExtractError> {
    let response: Value = serde_json::from_str(body)?;
    match response
        .pointer("/data/Catalog/searchStore/elements")
        .and_then(Value::as_array)
    {
        Some(elements) => Ok(elements.clone()),
        None => match response.get("errors") {
            Some(errors) => Err(ExtractError::Malformed {
                field: "search response",
                value: errors.to_string(),
            }),
            None => Err(ExtractError::Missing("data.Catalog.searchStore.elements")),
        },
    }
}

fn text_field(element: &Value, key: &str) -> Option<String> {
    element
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn title(element: &Value) -> Result<String, ExtractError> {
    text_field(element, "title").ok_or(ExtractError::Missing("title"))
}

pub fn description(element: &Value) -> String {
    text_field(element, "description").unwrap_or_default()
}

pub fn developer(element: &Value) -> Option<String> {
    text_field(element, "developerDisplayName")
}

pub fn publisher(element: &Value) -> Option<String> {
    text_field(element, "publisherDisplayName")
}

/// `currentPrice` is already in minor units.
pub fn price(element: &Value) -> RawPrice {
    let minor = element
        .get("currentPrice")
        .and_then(|v| v.as_i64().or_else(|| value_as_f64(v).map(|f| f.round() as i64)))
        .unwrap_or(0);
    RawPrice::Minor(minor)
}

/// Epic publishes no user score.
pub fn rating(_element: &Value) -> RawRating {
    RawRating::Absent
}

/// `2024-04-24T16:00:00.000Z`, read as UTC.
pub fn release_date(element: &Value) -> Result<NaiveDateTime, ExtractError> {
    let raw = element
        .get("releaseDate")
        .and_then(Value::as_str)
        .ok_or(ExtractError::Missing("release date"))?;
    parse_release_date(raw)
}

pub fn parse_release_date(raw: &str) -> Result<NaiveDateTime, ExtractError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.fZ").map_err(|_| {
        ExtractError::Malformed {
            field: "release date",
            value: raw.to_string(),
        }
    })
}

fn tag_entries(element: &Value) -> impl Iterator<Item = &Value> {
    element
        .get("tags")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn in_platform_group(tag: &Value) -> bool {
    tag.get("groupName").and_then(Value::as_str) == Some(PLATFORM_TAG_GROUP)
}

/// Names of every tag outside the platform group.
pub fn tags(element: &Value) -> Vec<String> {
    tag_entries(element)
        .filter(|tag| !in_platform_group(tag))
        .filter_map(|tag| text_field(tag, "name"))
        .collect()
}

/// Names of the tags in the platform group.
pub fn platform_indicator(element: &Value) -> Vec<String> {
    tag_entries(element)
        .filter(|tag| in_platform_group(tag))
        .filter_map(|tag| text_field(tag, "name"))
        .collect()
}
