//! Per-topic digests of newly loaded games, handed to a delivery backend.
use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, instrument};

use crate::model::{GameRecord, SourceId};
use crate::normalization::tag::canonical_tag_name;

pub const DEFAULT_TOPICS: &[&str] = &[
    "Action",
    "Adventure",
    "Indie",
    "Casual",
    "RPG",
    "Simulation",
    "Fantasy",
    "City Builder",
    "Puzzle",
    "Sports",
    "Singleplayer",
    "Multiplayer",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSummary {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

impl GameSummary {
    fn has_topic(&self, topic: &str) -> bool {
        self.tags.iter().any(|tag| canonical_tag_name(tag) == topic)
    }
}

impl From<&GameRecord> for GameSummary {
    fn from(record: &GameRecord) -> Self {
        Self {
            title: record.title.clone(),
            description: record.description.clone(),
            tags: record.tags.clone(),
        }
    }
}

/// Loaded games of one run, grouped by the storefront they came from.
#[derive(Debug, Default, Clone)]
pub struct NotificationBatch {
    by_source: BTreeMap<SourceId, Vec<GameSummary>>,
}

impl NotificationBatch {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a GameRecord>) -> Self {
        let mut batch = Self::default();
        for record in records {
            batch
                .by_source
                .entry(record.source_id)
                .or_default()
                .push(GameSummary::from(record));
        }
        batch
    }

    pub fn is_empty(&self) -> bool {
        self.by_source.values().all(Vec::is_empty)
    }

    pub fn len(&self) -> usize {
        self.by_source.values().map(Vec::len).sum()
    }

    pub fn source(&self, source: SourceId) -> &[GameSummary] {
        self.by_source.get(&source).map(Vec::as_slice).unwrap_or_default()
    }

    fn games(&self) -> impl Iterator<Item = &GameSummary> {
        self.by_source.values().flatten()
    }

    /// One digest per topic with at least one matching game, in topic order.
    /// Topics are matched on canonical tag spelling, so "single player"
    /// reaches "Singleplayer" subscribers.
    pub fn digests(&self, topics: &[String]) -> Vec<TopicDigest> {
        let mut seen = BTreeSet::new();
        topics
            .iter()
            .filter(|topic| seen.insert(canonical_tag_name(topic)))
            .filter_map(|topic| {
                let wanted = canonical_tag_name(topic);
                let games: Vec<GameSummary> = self
                    .games()
                    .filter(|game| game.has_topic(&wanted))
                    .cloned()
                    .collect();
                (!games.is_empty()).then(|| TopicDigest {
                    topic: topic.clone(),
                    games,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicDigest {
    pub topic: String,
    pub games: Vec<GameSummary>,
}

impl TopicDigest {
    pub fn subject(&self) -> String {
        format!("New games in {}!", self.topic)
    }

    pub fn body(&self) -> String {
        let mut body = format!(
            "Hey there!\n\nThere are new games to play in the {} tag.\n\nThe new games are:\n\n",
            self.topic
        );
        for game in &self.games {
            body.push_str("- ");
            body.push_str(&game.title);
            body.push('\n');
            if !game.description.is_empty() {
                body.push_str(&game.description);
                body.push('\n');
            }
            body.push('\n');
        }
        body
    }
}

/// Delivery backend for topic digests.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, digest: &TopicDigest) -> Result<()>;
}

/// Writes digests to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, digest: &TopicDigest) -> Result<()> {
        info!(
            topic = %digest.topic,
            games = digest.games.len(),
            subject = %digest.subject(),
            "digest:\n{}",
            digest.body()
        );
        Ok(())
    }
}

/// Publish every non-empty digest; returns how many went out.
#[instrument(skip_all, fields(games = batch.len(), topics = topics.len()))]
pub async fn dispatch(notifier: &dyn Notifier, batch: &NotificationBatch, topics: &[String]) -> Result<usize> {
    if batch.is_empty() {
        return Ok(0);
    }
    let digests = batch.digests(topics);
    for digest in &digests {
        notifier.publish(digest).await?;
    }
    Ok(digests.len())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::NaiveDate;

    use super::*;
    use crate::model::Price;

    fn game(source: SourceId, title: &str, tags: &[&str]) -> GameRecord {
        GameRecord {
            title: title.to_string(),
            description: format!("About {title}."),
            price: Price::ZERO,
            developer_name: None,
            publisher_name: None,
            release_date: NaiveDate::from_ymd_opt(2024, 4, 24)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            rating: None,
            source_id: source,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            platform_ids: Default::default(),
        }
    }

    fn topics() -> Vec<String> {
        DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect()
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl Notifier for Recorder {
        async fn publish(&self, digest: &TopicDigest) -> Result<()> {
            self.0.lock().unwrap().push(digest.subject());
            Ok(())
        }
    }

    #[test]
    fn groups_games_by_source() {
        let records = [
            game(SourceId::Steam, "A", &["Indie"]),
            game(SourceId::Epic, "B", &["Action"]),
            game(SourceId::Steam, "C", &["Puzzle"]),
        ];
        let batch = NotificationBatch::from_records(&records);
        assert_eq!(batch.len(), 3);
        let steam: Vec<_> = batch.source(SourceId::Steam).iter().map(|g| g.title.as_str()).collect();
        assert_eq!(steam, vec!["A", "C"]);
        assert!(batch.source(SourceId::Gog).is_empty());
    }

    #[test]
    fn digests_follow_topic_order_and_skip_empty_topics() {
        let records = [
            game(SourceId::Steam, "A", &["Indie", "single player"]),
            game(SourceId::Gog, "B", &["RPG", "Indie"]),
        ];
        let batch = NotificationBatch::from_records(&records);
        let digests = batch.digests(&topics());
        let subjects: Vec<_> = digests.iter().map(TopicDigest::subject).collect();
        assert_eq!(
            subjects,
            vec![
                "New games in Indie!",
                "New games in RPG!",
                "New games in Singleplayer!"
            ]
        );
        assert_eq!(digests[0].games.len(), 2);
    }

    #[test]
    fn body_lists_titles_and_descriptions() {
        let records = [game(SourceId::Steam, "Hollow Depths", &["Indie"])];
        let digest = &NotificationBatch::from_records(&records).digests(&topics())[0];
        let body = digest.body();
        assert!(body.contains("in the Indie tag"));
        assert!(body.contains("- Hollow Depths\nAbout Hollow Depths.\n"));
    }

    #[tokio::test]
    async fn dispatch_publishes_each_digest() {
        let records = [game(SourceId::Epic, "B", &["Action", "Adventure"])];
        let batch = NotificationBatch::from_records(&records);
        let recorder = Recorder::default();
        let sent = dispatch(&recorder, &batch, &topics()).await.unwrap();
        assert_eq!(sent, 2);
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["New games in Action!", "New games in Adventure!"]
        );

        let empty = NotificationBatch::default();
        assert_eq!(dispatch(&recorder, &empty, &topics()).await.unwrap(), 0);
    }
}
