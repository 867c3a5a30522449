//! Release statistics over a period of the stored catalogue: totals, daily
//! counts, averages and the leading tags, platform and studios.
use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use itertools::Itertools;
use serde::Serialize;
use tracing::{info, instrument};

use crate::database_ops::pagination::RecencyWindow;
use crate::model::SourceId;
use crate::normalization::rating::round2;
use crate::util::db::Db;

pub const TOP_TAGS: usize = 5;
pub const TOP_STUDIOS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedCount {
    pub name: String,
    pub games: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCount {
    pub day: NaiveDate,
    pub games: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceCount {
    pub source: SourceId,
    pub games: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagShare {
    pub name: String,
    pub games: i64,
    /// Percentage of the period's releases carrying the tag.
    pub share: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseReport {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub sources: Vec<SourceId>,
    /// Distinct titles; a game sold on two storefronts counts once.
    pub unique_titles: i64,
    pub total_releases: i64,
    /// Days without a release are left out.
    pub releases_per_day: Vec<DailyCount>,
    pub average_price: Option<f64>,
    pub per_source: Vec<SourceCount>,
    pub top_tags: Vec<TagShare>,
    pub top_platform: Option<NamedCount>,
    pub average_rating: Option<f64>,
    pub top_publishers: Vec<NamedCount>,
    pub top_developers: Vec<NamedCount>,
}

/// `WHERE` clause shared by every query. `$1`/`$2` bind the period bounds; the
/// storefront ids come from [`SourceId`] and are inlined.
fn scope(sources: &[SourceId]) -> String {
    format!(
        "g.release_date >= $1 AND g.release_date <= $2 AND g.website_id IN ({})",
        sources.iter().map(|s| s.id()).join(", ")
    )
}

struct Scoped<'a> {
    db: &'a Db,
    period: &'a RecencyWindow,
    filter: String,
}

impl Scoped<'_> {
    async fn count(&self, expr: &str) -> Result<i64> {
        let sql = format!("SELECT {expr} FROM game g WHERE {}", self.filter);
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(self.period.start())
            .bind(self.period.end())
            .fetch_one(&self.db.pool)
            .await
            .with_context(|| format!("counting {expr}"))?;
        Ok(count)
    }

    async fn average(&self, column: &str) -> Result<Option<f64>> {
        let sql = format!("SELECT AVG(g.{column}) FROM game g WHERE {}", self.filter);
        let average = sqlx::query_scalar::<_, Option<f64>>(&sql)
            .bind(self.period.start())
            .bind(self.period.end())
            .fetch_one(&self.db.pool)
            .await
            .with_context(|| format!("averaging {column}"))?;
        Ok(average.map(round2))
    }

    /// Rows grouped by `name_expr` over `joins`, most games first, ties by name.
    async fn ranked(&self, name_expr: &str, joins: &str, limit: usize) -> Result<Vec<NamedCount>> {
        let sql = format!(
            "SELECT {name_expr}, COUNT(*) FROM game g {joins} WHERE {} \
             GROUP BY {name_expr} ORDER BY COUNT(*) DESC, {name_expr} LIMIT {limit}",
            self.filter
        );
        let rows: Vec<(String, i64)> = sqlx::query_as(&sql)
            .bind(self.period.start())
            .bind(self.period.end())
            .fetch_all(&self.db.pool)
            .await
            .with_context(|| format!("ranking {name_expr}"))?;
        Ok(rows
            .into_iter()
            .map(|(name, games)| NamedCount { name, games })
            .collect())
    }

    async fn releases_per_day(&self) -> Result<Vec<DailyCount>> {
        let sql = format!("SELECT g.release_date FROM game g WHERE {}", self.filter);
        let dates: Vec<NaiveDateTime> = sqlx::query_scalar(&sql)
            .bind(self.period.start())
            .bind(self.period.end())
            .fetch_all(&self.db.pool)
            .await
            .context("reading release dates")?;
        let mut per_day: BTreeMap<NaiveDate, i64> = BTreeMap::new();
        for date in dates {
            *per_day.entry(date.date()).or_default() += 1;
        }
        Ok(per_day
            .into_iter()
            .map(|(day, games)| DailyCount { day, games })
            .collect())
    }

    async fn per_source(&self, sources: &[SourceId]) -> Result<Vec<SourceCount>> {
        let sql = format!(
            "SELECT CAST(g.website_id AS BIGINT), COUNT(*) FROM game g WHERE {} \
             GROUP BY g.website_id",
            self.filter
        );
        let rows: Vec<(i64, i64)> = sqlx::query_as(&sql)
            .bind(self.period.start())
            .bind(self.period.end())
            .fetch_all(&self.db.pool)
            .await
            .context("counting releases per storefront")?;
        let mut counts: BTreeMap<SourceId, i64> = BTreeMap::new();
        for (website_id, games) in rows {
            counts.insert(SourceId::try_from(website_id)?, games);
        }
        Ok(sources
            .iter()
            .map(|&source| SourceCount {
                source,
                games: counts.get(&source).copied().unwrap_or(0),
            })
            .collect())
    }
}

/// Statistics over the games released inside `period` on `sources`. An empty
/// source list means every storefront.
#[instrument(skip(db), fields(start = %period.start(), end = %period.end()))]
pub async fn release_report(
    db: &Db,
    period: &RecencyWindow,
    sources: &[SourceId],
) -> Result<ReleaseReport> {
    let sources: Vec<SourceId> = if sources.is_empty() {
        SourceId::ALL.to_vec()
    } else {
        sources.iter().copied().sorted().dedup().collect()
    };
    let scoped = Scoped {
        db,
        period,
        filter: scope(&sources),
    };

    let total_releases = scoped.count("COUNT(*)").await?;
    let top_tags = scoped
        .ranked(
            "t.tag_name",
            "JOIN game_tag_matching gt ON gt.game_id = g.game_id \
             JOIN tag t ON t.tag_id = gt.tag_id",
            TOP_TAGS,
        )
        .await?
        .into_iter()
        .map(|tag| TagShare {
            share: share_of(tag.games, total_releases),
            name: tag.name,
            games: tag.games,
        })
        .collect();

    let report = ReleaseReport {
        start: period.start(),
        end: period.end(),
        unique_titles: scoped.count("COUNT(DISTINCT g.name)").await?,
        total_releases,
        releases_per_day: scoped.releases_per_day().await?,
        average_price: scoped.average("price").await?,
        per_source: scoped.per_source(&sources).await?,
        top_tags,
        top_platform: scoped
            .ranked(
                "p.platform_name",
                "JOIN platform_assignment pa ON pa.game_id = g.game_id \
                 JOIN platform p ON p.platform_id = pa.platform_id",
                1,
            )
            .await?
            .into_iter()
            .next(),
        average_rating: scoped.average("rating").await?,
        top_publishers: scoped
            .ranked(
                "pb.publisher_name",
                "JOIN publisher pb ON pb.publisher_id = g.publisher_id",
                TOP_STUDIOS,
            )
            .await?,
        top_developers: scoped
            .ranked(
                "d.developer_name",
                "JOIN developer d ON d.developer_id = g.developer_id",
                TOP_STUDIOS,
            )
            .await?,
        sources,
    };
    info!(
        releases = report.total_releases,
        unique = report.unique_titles,
        "release report ready"
    );
    Ok(report)
}

fn share_of(games: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(games as f64 / total as f64 * 100.0)
}

fn names(counts: &[NamedCount]) -> String {
    counts.iter().map(|c| format!("{} ({})", c.name, c.games)).join(", ")
}

fn optional(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

impl fmt::Display for ReleaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "releases {} .. {} on {}",
            self.start,
            self.end,
            self.sources.iter().join(", ")
        )?;
        writeln!(
            f,
            "  total={} unique={} avg_price={} avg_rating={}",
            self.total_releases,
            self.unique_titles,
            optional(self.average_price),
            optional(self.average_rating),
        )?;
        for day in &self.releases_per_day {
            writeln!(f, "  {}: {}", day.day, day.games)?;
        }
        for source in &self.per_source {
            writeln!(f, "  {}: {}", source.source, source.games)?;
        }
        let tags = self
            .top_tags
            .iter()
            .map(|t| format!("{} ({}, {:.2}%)", t.name, t.games, t.share))
            .join(", ");
        writeln!(f, "  top tags: {tags}")?;
        match &self.top_platform {
            Some(platform) => writeln!(f, "  top platform: {} ({})", platform.name, platform.games)?,
            None => writeln!(f, "  top platform: n/a")?,
        }
        writeln!(f, "  top publishers: {}", names(&self.top_publishers))?;
        write!(f, "  top developers: {}", names(&self.top_developers))
    }
}
