use itertools::Itertools;
use thiserror::Error;

use super::{platform, price, rating};
use crate::model::{GameRecord, RawGame};

/// Why a raw tuple could not become a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DropReason {
    #[error("title is empty")]
    EmptyTitle,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Turn one adapter tuple into a canonical record.
///
/// Pure: the same input always yields the same record. Tags are trimmed and
/// de-duplicated in first-seen order; tags that are platform names move into
/// `platform_ids` together with whatever the platform labels mention.
pub fn normalize(raw: &RawGame) -> Result<GameRecord, DropReason> {
    let title = raw.title.trim();
    if title.is_empty() {
        return Err(DropReason::EmptyTitle);
    }

    let tags: Vec<String> = raw
        .tags
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .unique()
        .map(str::to_string)
        .collect();
    let (tags, mut platform_ids) = platform::partition_tags(tags);
    for label in &raw.platforms {
        platform_ids.extend(platform::platforms_from_label(label));
    }

    Ok(GameRecord {
        title: title.to_string(),
        description: raw.description.trim().to_string(),
        price: price::to_price(raw.price),
        developer_name: non_empty(raw.developer.as_deref()),
        publisher_name: non_empty(raw.publisher.as_deref()),
        release_date: raw.release_date,
        rating: rating::to_percentage(&raw.rating),
        source_id: raw.source,
        tags,
        platform_ids,
    })
}
