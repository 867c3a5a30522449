//! Database handle with compile-time backend selection.
//!
//! The `sqlite` feature (default) drives `DbPool` to `SqlitePool`; building
//! with `--no-default-features --features postgres` drives it to `PgPool`.
//! Every query in the crate is written in the dialect both engines accept:
//! `$N` placeholders, `ON CONFLICT` and `RETURNING`.
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

#[cfg(not(any(feature = "sqlite", feature = "postgres")))]
compile_error!("enable the `sqlite` or `postgres` feature to pick a database backend");

#[cfg(feature = "sqlite")]
pub type DbKind = sqlx::Sqlite;

#[cfg(all(feature = "postgres", not(feature = "sqlite")))]
pub type DbKind = sqlx::Postgres;

pub type DbPool = sqlx::Pool<DbKind>;
pub type DbTx<'c> = sqlx::Transaction<'c, DbKind>;

/// Versioned schema steps for the compiled-in backend.
#[cfg(feature = "sqlite")]
const MIGRATIONS: &[(i64, &str, &str)] = &[(
    1,
    "init",
    include_str!("../../migrations/sqlite/0001_init.sql"),
)];

#[cfg(all(feature = "postgres", not(feature = "sqlite")))]
const MIGRATIONS: &[(i64, &str, &str)] = &[(
    1,
    "init",
    include_str!("../../migrations/postgres/0001_init.sql"),
)];

#[derive(Clone)]
pub struct Db {
    pub pool: DbPool,
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

#[cfg(feature = "sqlite")]
fn connect_options(database_url: &str) -> Result<sqlx::sqlite::SqliteConnectOptions> {
    Ok(sqlx::sqlite::SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true))
}

#[cfg(all(feature = "postgres", not(feature = "sqlite")))]
fn connect_options(database_url: &str) -> Result<sqlx::postgres::PgConnectOptions> {
    use sqlx::postgres::{PgConnectOptions, PgSslMode};

    let mut connect_options = PgConnectOptions::from_str(database_url)?;
    if database_url.contains("sslmode=require") {
        connect_options = connect_options.ssl_mode(PgSslMode::Require);
    }
    // PgBouncer txn mode safe
    if !crate::util::env::env_flag("USE_PREPARED", false) {
        connect_options = connect_options.statement_cache_capacity(0);
    }
    Ok(connect_options)
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = connect_options(database_url).context("parsing database url")?;

        // Every in-memory connection is its own database; keep exactly one alive.
        let pool_options = if is_memory_url(database_url) {
            sqlx::pool::PoolOptions::<DbKind>::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            sqlx::pool::PoolOptions::<DbKind>::new()
                .max_connections(max_connections.max(1))
                .idle_timeout(Duration::from_secs(600))
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .context("connecting to database")?;
        info!("connected to db");

        let db = Self { pool };
        if crate::util::env::env_flag("AUTO_MIGRATE", false) {
            info!("running migrations (AUTO_MIGRATE=on)");
            db.migrate().await?;
        }
        Ok(db)
    }

    /// Fresh, migrated in-memory database.
    #[cfg(feature = "sqlite")]
    pub async fn connect_in_memory() -> Result<Self> {
        let db = Self::connect("sqlite::memory:", 1).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Apply every embedded schema step not yet recorded in `_schema_migrations`.
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS _schema_migrations (
                version BIGINT PRIMARY KEY,
                description TEXT NOT NULL
             )",
        )
        .execute(&self.pool)
        .await?;

        let applied: HashSet<i64> =
            sqlx::query_scalar::<_, i64>("SELECT version FROM _schema_migrations")
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .collect();

        for &(version, description, sql) in MIGRATIONS {
            if applied.contains(&version) {
                continue;
            }
            info!(version, description, "applying migration");
            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(sql)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("migration {version} ({description})"))?;
            sqlx::query("INSERT INTO _schema_migrations (version, description) VALUES ($1, $2)")
                .bind(version)
                .bind(description)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }

        let latest = MIGRATIONS.last().map(|(v, _, _)| *v).unwrap_or_default();
        info!(version = latest, "schema up-to-date");
        Ok(())
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = Db::connect_in_memory().await.unwrap();
        db.migrate().await.unwrap();

        let versions: Vec<i64> = sqlx::query_scalar("SELECT version FROM _schema_migrations")
            .fetch_all(&db.pool)
            .await
            .unwrap();
        assert_eq!(versions, vec![1]);
    }

    #[tokio::test]
    async fn platforms_are_seeded() {
        let db = Db::connect_in_memory().await.unwrap();
        let names: Vec<(i64, String)> =
            sqlx::query_as("SELECT platform_id, platform_name FROM platform ORDER BY platform_id")
                .fetch_all(&db.pool)
                .await
                .unwrap();
        assert_eq!(
            names,
            vec![
                (1, "Windows".to_string()),
                (2, "macOS".to_string()),
                (3, "Linux".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn rejects_unknown_website_ids() {
        let db = Db::connect_in_memory().await.unwrap();
        let res = sqlx::query(
            "INSERT INTO game (name, description, price, release_date, website_id)
             VALUES ('Ghost', '', 0, '2024-04-24 00:00:00', 4)",
        )
        .execute(&db.pool)
        .await;
        assert!(res.is_err());
    }
}
