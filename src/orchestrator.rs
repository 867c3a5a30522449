//! One scrape cycle per storefront: harvest the listing, normalize, load,
//! notify and summarize.
use std::fmt;

use anyhow::{bail, Context, Result};
use tracing::{info, instrument, warn};

use crate::database_ops::epic::EpicProvider;
use crate::database_ops::gog::GogProvider;
use crate::database_ops::loader::{load_batch, LoadFailure};
use crate::database_ops::notify::{dispatch, NotificationBatch, Notifier, DEFAULT_TOPICS};
use crate::database_ops::pagination::{
    RecencyWindow, SkippedRecord, StopReason, WindowController, DEFAULT_MAX_PAGES,
};
use crate::database_ops::steam::SteamProvider;
use crate::database_ops::storefront::Storefront;
use crate::model::{GameRecord, RawGame, SourceId};
use crate::normalization::{normalize, DropReason};
use crate::util::db::Db;
use crate::util::env::{env_list, env_parse};
use crate::util::http::PageFetcher;

pub const DEFAULT_WINDOW_HOURS: i64 = 24;

/// Knobs shared by every cycle of one invocation.
#[derive(Debug, Clone)]
pub struct CycleOptions {
    pub window: RecencyWindow,
    pub max_pages: u32,
    /// Stop after normalization; nothing is written or sent.
    pub dry_run: bool,
    pub notify: bool,
    pub topics: Vec<String>,
}

impl CycleOptions {
    /// Env: WINDOW_HOURS, MAX_PAGES, NOTIFY_TOPICS
    pub fn from_env() -> Self {
        Self {
            window: RecencyWindow::trailing_hours(env_parse("WINDOW_HOURS", DEFAULT_WINDOW_HOURS)),
            max_pages: env_parse("MAX_PAGES", DEFAULT_MAX_PAGES),
            dry_run: false,
            notify: true,
            topics: env_list("NOTIFY_TOPICS", DEFAULT_TOPICS),
        }
    }
}

/// A raw tuple the normalizer refused.
#[derive(Debug, Clone)]
pub struct DroppedRecord {
    pub position: usize,
    pub reason: DropReason,
}

#[derive(Debug)]
pub struct CycleReport {
    pub source: SourceId,
    pub pages_fetched: u32,
    pub stop: StopReason,
    pub harvested: usize,
    pub skipped: Vec<SkippedRecord>,
    pub dropped: Vec<DroppedRecord>,
    pub records: Vec<GameRecord>,
    pub loaded: usize,
    pub load_failures: Vec<LoadFailure>,
    pub digests_sent: usize,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: pages={} harvested={} skipped={} dropped={} loaded={} failed={} digests={} stop={:?}",
            self.source,
            self.pages_fetched,
            self.harvested,
            self.skipped.len(),
            self.dropped.len(),
            self.loaded,
            self.load_failures.len(),
            self.digests_sent,
            self.stop,
        )?;
        for skip in &self.skipped {
            write!(f, "\n  skipped page {} #{}: {}", skip.page, skip.position, skip.reason)?;
        }
        for drop in &self.dropped {
            write!(f, "\n  dropped #{}: {}", drop.position, drop.reason)?;
        }
        for failure in &self.load_failures {
            write!(f, "\n  failed {:?}: {}", failure.title, failure.error)?;
        }
        Ok(())
    }
}

/// Normalize a harvest, keeping its order. A tuple labelled with another
/// storefront means an adapter bug and fails the cycle.
pub fn normalize_harvest(
    source: SourceId,
    raw: &[RawGame],
) -> Result<(Vec<GameRecord>, Vec<DroppedRecord>)> {
    let mut records = Vec::with_capacity(raw.len());
    let mut dropped = Vec::new();
    for (position, game) in raw.iter().enumerate() {
        if game.source != source {
            bail!(
                "{source} adapter produced a record labelled {} ({:?})",
                game.source,
                game.title
            );
        }
        match normalize(game) {
            Ok(record) => records.push(record),
            Err(reason) => {
                warn!(%source, position, %reason, "dropping record");
                dropped.push(DroppedRecord { position, reason });
            }
        }
    }
    Ok((records, dropped))
}

/// Run one cycle for `store`. `db` may be absent only for dry runs.
#[instrument(skip_all, fields(source = %store.source()))]
pub async fn run_cycle<S: Storefront>(
    store: &S,
    fetcher: &dyn PageFetcher,
    db: Option<&Db>,
    notifier: &dyn Notifier,
    options: &CycleOptions,
) -> Result<CycleReport> {
    let source = store.source();
    let harvest = WindowController::new(store, fetcher, options.window)
        .with_max_pages(options.max_pages)
        .collect()
        .await
        .with_context(|| format!("{source} scrape failed"))?;

    if harvest.records.is_empty() && !harvest.skipped.is_empty() {
        warn!(
            skipped = harvest.skipped.len(),
            "listing was read but every record was skipped"
        );
    }

    let (records, dropped) = normalize_harvest(source, &harvest.records)?;
    let mut report = CycleReport {
        source,
        pages_fetched: harvest.pages_fetched,
        stop: harvest.stop,
        harvested: harvest.records.len(),
        skipped: harvest.skipped,
        dropped,
        records,
        loaded: 0,
        load_failures: Vec::new(),
        digests_sent: 0,
    };
    if options.dry_run {
        info!(records = report.records.len(), "dry run: skipping load");
        return Ok(report);
    }

    let Some(db) = db else {
        bail!("a database connection is required unless running dry");
    };
    let summary = load_batch(db, &report.records).await?;
    report.loaded = summary.loaded.len();
    report.load_failures = summary.failed;

    if options.notify {
        let batch = NotificationBatch::from_records(
            summary.loaded.iter().map(|game| &report.records[game.index]),
        );
        report.digests_sent = dispatch(notifier, &batch, &options.topics).await?;
    }

    info!(
        pages = report.pages_fetched,
        harvested = report.harvested,
        skipped = report.skipped.len(),
        dropped = report.dropped.len(),
        loaded = report.loaded,
        failed = report.load_failures.len(),
        "cycle complete"
    );
    Ok(report)
}

/// Run the cycle for one storefront with its env-configured adapter.
pub async fn run_source(
    source: SourceId,
    fetcher: &dyn PageFetcher,
    db: Option<&Db>,
    notifier: &dyn Notifier,
    options: &CycleOptions,
) -> Result<CycleReport> {
    match source {
        SourceId::Steam => run_cycle(&SteamProvider::from_env(), fetcher, db, notifier, options).await,
        SourceId::Gog => run_cycle(&GogProvider::from_env(), fetcher, db, notifier, options).await,
        SourceId::Epic => run_cycle(&EpicProvider::from_env(), fetcher, db, notifier, options).await,
    }
}
