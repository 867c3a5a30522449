//! Writes normalized records into the relational catalogue.
//!
//! Every record gets its own transaction: a failing record is rolled back and
//! reported while the rows of its neighbours stay committed.
use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::model::{GameRecord, PlatformId};
use crate::normalization::tag::{best_match, canonical_tag_name};
use crate::util::db::{Db, DbTx};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedGame {
    pub game_id: i64,
    /// Position of the record in the batch handed to [`load_batch`].
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub index: usize,
    pub title: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct LoadSummary {
    pub loaded: Vec<LoadedGame>,
    pub failed: Vec<LoadFailure>,
}

/// Developer and publisher rows share one shape: an id and a unique name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    Developer,
    Publisher,
}

impl Dimension {
    fn select_sql(self) -> &'static str {
        match self {
            Dimension::Developer => "SELECT developer_id FROM developer WHERE developer_name = $1",
            Dimension::Publisher => "SELECT publisher_id FROM publisher WHERE publisher_name = $1",
        }
    }

    fn insert_sql(self) -> &'static str {
        match self {
            Dimension::Developer => {
                "INSERT INTO developer (developer_name) VALUES ($1) \
                 ON CONFLICT DO NOTHING RETURNING developer_id"
            }
            Dimension::Publisher => {
                "INSERT INTO publisher (publisher_name) VALUES ($1) \
                 ON CONFLICT DO NOTHING RETURNING publisher_id"
            }
        }
    }
}

/// Load every record of one run. Only failing to open a transaction aborts
/// the batch; anything a single record trips over, its commit included, is
/// recorded in [`LoadSummary::failed`].
#[instrument(skip(db, records), fields(records = records.len()))]
pub async fn load_batch(db: &Db, records: &[GameRecord]) -> Result<LoadSummary> {
    let mut summary = LoadSummary::default();
    for (index, record) in records.iter().enumerate() {
        let mut tx = db.pool.begin().await.context("opening load transaction")?;
        let outcome = match load_record(&mut tx, record).await {
            // A commit that fails leaves the transaction open; dropping it rolls back.
            Ok(game_id) => tx
                .commit()
                .await
                .map(|()| game_id)
                .context("committing loaded game"),
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        };
        match outcome {
            Ok(game_id) => {
                debug!(game_id, title = %record.title, "loaded game");
                summary.loaded.push(LoadedGame { game_id, index });
            }
            Err(err) => {
                warn!(index, title = %record.title, error = %err, "failed to load game");
                summary.failed.push(LoadFailure {
                    index,
                    title: record.title.clone(),
                    error: format!("{err:#}"),
                });
            }
        }
    }
    info!(
        loaded = summary.loaded.len(),
        failed = summary.failed.len(),
        "load complete"
    );
    Ok(summary)
}

/// Write one record and its dimension and join rows; returns the game id.
pub async fn load_record(tx: &mut DbTx<'_>, record: &GameRecord) -> Result<i64> {
    let developer_id = match record.developer_name.as_deref() {
        Some(name) => Some(ensure_dimension(tx, Dimension::Developer, name).await?),
        None => None,
    };
    let publisher_id = match record.publisher_name.as_deref() {
        Some(name) => Some(ensure_dimension(tx, Dimension::Publisher, name).await?),
        None => None,
    };

    let game_id = upsert_game(tx, record, developer_id, publisher_id)
        .await
        .with_context(|| format!("writing game {:?}", record.title))?;

    for &platform in &record.platform_ids {
        assign_platform(tx, game_id, platform).await?;
    }
    for tag in &record.tags {
        let tag_id = resolve_tag(tx, tag)
            .await
            .with_context(|| format!("resolving tag {tag:?}"))?;
        link_tag(tx, game_id, tag_id).await?;
    }
    Ok(game_id)
}

/// Insert-or-fetch on the unique name column.
async fn ensure_dimension(tx: &mut DbTx<'_>, dimension: Dimension, name: &str) -> Result<i64> {
    if let Some(id) = sqlx::query_scalar::<_, i64>(dimension.select_sql())
        .bind(name)
        .fetch_optional(&mut **tx)
        .await?
    {
        return Ok(id);
    }
    if let Some(id) = sqlx::query_scalar::<_, i64>(dimension.insert_sql())
        .bind(name)
        .fetch_optional(&mut **tx)
        .await?
    {
        return Ok(id);
    }
    // Another writer inserted the same name between our select and insert.
    sqlx::query_scalar::<_, i64>(dimension.select_sql())
        .bind(name)
        .fetch_one(&mut **tx)
        .await
        .with_context(|| format!("{dimension:?} {name:?} vanished after insert"))
}

/// A rerun that meets the same (name, source, release date) refreshes the row
/// and keeps its id. Known developer/publisher links are not cleared by a
/// record that lacks them.
async fn upsert_game(
    tx: &mut DbTx<'_>,
    record: &GameRecord,
    developer_id: Option<i64>,
    publisher_id: Option<i64>,
) -> Result<i64> {
    let game_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO game (name, description, price, developer_id, publisher_id, release_date, rating, website_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (name, website_id, release_date) DO UPDATE SET \
             description = excluded.description, \
             price = excluded.price, \
             rating = excluded.rating, \
             developer_id = COALESCE(excluded.developer_id, game.developer_id), \
             publisher_id = COALESCE(excluded.publisher_id, game.publisher_id) \
         RETURNING game_id",
    )
    .bind(&record.title)
    .bind(&record.description)
    .bind(record.price.as_f64())
    .bind(developer_id)
    .bind(publisher_id)
    .bind(record.release_date)
    .bind(record.rating)
    .bind(record.source_id.id())
    .fetch_one(&mut **tx)
    .await?;
    Ok(game_id)
}

async fn assign_platform(tx: &mut DbTx<'_>, game_id: i64, platform: PlatformId) -> Result<()> {
    sqlx::query(
        "INSERT INTO platform_assignment (platform_id, game_id) VALUES ($1, $2) \
         ON CONFLICT DO NOTHING",
    )
    .bind(platform.id())
    .bind(game_id)
    .execute(&mut **tx)
    .await
    .with_context(|| format!("assigning {} to game {game_id}", platform.name()))?;
    Ok(())
}

async fn link_tag(tx: &mut DbTx<'_>, game_id: i64, tag_id: i64) -> Result<()> {
    sqlx::query(
        "INSERT INTO game_tag_matching (game_id, tag_id) VALUES ($1, $2) \
         ON CONFLICT DO NOTHING",
    )
    .bind(game_id)
    .bind(tag_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Id of the stored tag `raw` belongs to. The canonical spelling is compared
/// against every stored tag; a close enough one is reused, otherwise the
/// canonical spelling becomes a new row.
pub async fn resolve_tag(tx: &mut DbTx<'_>, raw: &str) -> Result<i64> {
    let name = canonical_tag_name(raw);

    let existing: Vec<(i64, String)> = sqlx::query_as("SELECT tag_id, tag_name FROM tag ORDER BY tag_id")
        .fetch_all(&mut **tx)
        .await?;
    if let Some((tag_id, score)) = best_match(
        &name,
        existing.iter().map(|(id, stored)| (*id, stored.as_str())),
    ) {
        debug!(tag = %name, tag_id, score, "reusing similar tag");
        return Ok(tag_id);
    }

    if let Some(tag_id) = sqlx::query_scalar::<_, i64>(
        "INSERT INTO tag (tag_name) VALUES ($1) ON CONFLICT DO NOTHING RETURNING tag_id",
    )
    .bind(&name)
    .fetch_optional(&mut **tx)
    .await?
    {
        return Ok(tag_id);
    }
    let tag_id = sqlx::query_scalar::<_, i64>("SELECT tag_id FROM tag WHERE tag_name = $1")
        .bind(&name)
        .fetch_one(&mut **tx)
        .await?;
    Ok(tag_id)
}
