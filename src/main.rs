use anyhow::{bail, Result};
use chrono::{Duration, NaiveTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use game_scraper::database_ops::notify::LogNotifier;
use game_scraper::database_ops::pagination::RecencyWindow;
use game_scraper::database_ops::report::release_report;
use game_scraper::logging::{init_tracing, DEFAULT_FILTER};
use game_scraper::model::SourceId;
use game_scraper::orchestrator::{run_source, CycleOptions};
use game_scraper::util::db::Db;
use game_scraper::util::env;
use game_scraper::util::http::{HttpFetcher, HttpSettings};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "game-scraper", version, about = "Storefront release scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Scrape recent releases, load them and send topic digests
    Scrape {
        #[arg(value_enum)]
        source: SourceArg,
        /// Recency window in hours (defaults to env WINDOW_HOURS/24)
        #[arg(long)]
        window_hours: Option<i64>,
        /// Listing page cap per source (defaults to env MAX_PAGES/20)
        #[arg(long)]
        max_pages: Option<u32>,
        /// Print normalized records as JSON lines instead of loading them
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        #[arg(long, default_value_t = false)]
        no_notify: bool,
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
    },
    /// Print release statistics for the days leading up to today
    Report {
        #[arg(value_enum, default_value = "all")]
        source: SourceArg,
        #[arg(long, default_value_t = 7)]
        days: i64,
        /// Print the report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
        #[arg(long)]
        db_url: Option<String>,
    },
    /// Apply the embedded schema migrations
    Migrate {
        #[arg(long)]
        db_url: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SourceArg {
    Steam,
    Gog,
    Epic,
    All,
}

impl SourceArg {
    fn sources(self) -> Vec<SourceId> {
        match self {
            SourceArg::Steam => vec![SourceId::Steam],
            SourceArg::Gog => vec![SourceId::Gog],
            SourceArg::Epic => vec![SourceId::Epic],
            SourceArg::All => SourceId::ALL.to_vec(),
        }
    }
}

const LOGGED_KEYS: &[&str] = &[
    "DATABASE_URL",
    "DB_HOST",
    "DB_PORT",
    "DB_NAME",
    "DB_USER",
    "DB_PASSWORD",
    "STEAM_BASE_URL",
    "GOG_BASE_URL",
    "EPIC_BASE_URL",
    "WINDOW_HOURS",
    "MAX_PAGES",
    "HTTP_TIMEOUT_SECS",
    "SCRAPE_DELAY_MS",
    "NOTIFY_TOPICS",
];

async fn connect(db_url: Option<String>) -> Result<Db> {
    let url = match db_url {
        Some(url) => url,
        None => env::db_url()?,
    };
    Db::connect(&url, env::env_parse("DB_MAX_CONNS", 5u32)).await
}

#[tokio::main]
async fn main() -> Result<()> {
    env::init_env();
    init_tracing(DEFAULT_FILTER)?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Scrape {
            source,
            window_hours,
            max_pages,
            dry_run,
            no_notify,
            db_url,
        } => {
            env::preflight_check("game-scraper scrape", &[], LOGGED_KEYS)?;

            let mut options = CycleOptions::from_env();
            if let Some(hours) = window_hours {
                options.window = RecencyWindow::trailing_hours(hours);
            }
            if let Some(pages) = max_pages {
                options.max_pages = pages;
            }
            options.dry_run = dry_run;
            options.notify = !no_notify;

            let db = if dry_run { None } else { Some(connect(db_url).await?) };
            let fetcher = HttpFetcher::new(&HttpSettings::from_env())?;
            let notifier = LogNotifier;

            let mut failed = Vec::new();
            for source in source.sources() {
                match run_source(source, &fetcher, db.as_ref(), &notifier, &options).await {
                    Ok(report) => {
                        if dry_run {
                            for record in &report.records {
                                println!("{}", serde_json::to_string(record)?);
                            }
                        }
                        println!("{report}");
                    }
                    Err(err) => {
                        error!(%source, error = ?err, "scrape cycle failed");
                        failed.push(source);
                    }
                }
            }
            if !failed.is_empty() {
                bail!("scrape failed for {:?}", failed);
            }
        }
        Commands::Report {
            source,
            days,
            json,
            db_url,
        } => {
            let db = connect(db_url).await?;
            let today = Utc::now().date_naive().and_time(NaiveTime::default());
            let period = RecencyWindow::ending_at(today, Duration::days(days));
            let report = release_report(&db, &period, &source.sources()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{report}");
            }
        }
        Commands::Migrate { db_url } => {
            let db = connect(db_url).await?;
            db.migrate().await?;
            info!("migrate: done");
        }
    }
    Ok(())
}
