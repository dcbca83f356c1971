//! Schema migrations
//!
//! Scripts run in name order, each in its own transaction together with the
//! insert of its tracking row, so "applied" and "recorded" commit atomically.
//! The first failure rolls back its script and stops the run.
//!
//! Only one runner may execute against a store at a time. Deployments with
//! several instances must serialize `run()` themselves (leader election,
//! advisory lock in the deploy job, ...).

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::{Connection, FromRow, Postgres, Transaction};
use tracing::{debug, error, info, warn};

use crate::config::{is_identifier, MigrationsConfig};
use crate::db::Pool;
use crate::error::{Result, StoreError};

/// One schema change script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Unique, sortable name (e.g. `0001_create_content_items`)
    pub name: String,
    /// One or more SQL statements
    pub sql: String,
}

impl Migration {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
        }
    }
}

/// Scripts compiled into the binary
pub fn embedded() -> Vec<Migration> {
    vec![
        Migration::new(
            "0001_create_content_items",
            include_str!("../migrations/0001_create_content_items.sql"),
        ),
        Migration::new(
            "0002_content_items_created_at_index",
            include_str!("../migrations/0002_content_items_created_at_index.sql"),
        ),
    ]
}

/// Load every `*.sql` file in `dir`; the file stem is the migration name.
///
/// Anything without a `.sql` extension (source maps, READMEs) is ignored.
pub fn load_dir(dir: &Path) -> Result<Vec<Migration>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| StoreError::config(format!("cannot read {}: {}", dir.display(), e)))?;

    let mut migrations = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| StoreError::config(format!("cannot read {}: {}", dir.display(), e)))?
            .path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("sql") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            warn!("Skipping migration with non UTF-8 name: {}", path.display());
            continue;
        };
        let sql = std::fs::read_to_string(&path)
            .map_err(|e| StoreError::config(format!("cannot read {}: {}", path.display(), e)))?;
        migrations.push(Migration::new(name, sql));
    }

    debug!("Loaded {} migrations from {}", migrations.len(), dir.display());
    Ok(migrations)
}

/// Order scripts by name and check them against what is already applied.
///
/// Rejects duplicate names. With `check_order`, also rejects an applied name
/// that has no script, and a pending script that sorts before an applied one.
pub fn plan(
    mut migrations: Vec<Migration>,
    applied: &[String],
    check_order: bool,
) -> Result<Vec<Migration>> {
    migrations.sort_by(|a, b| a.name.cmp(&b.name));

    if let Some(pair) = migrations.windows(2).find(|w| w[0].name == w[1].name) {
        return Err(StoreError::migration(&pair[0].name, "duplicate migration name"));
    }

    if check_order {
        let applied: BTreeSet<&str> = applied.iter().map(String::as_str).collect();
        let known: BTreeSet<&str> = migrations.iter().map(|m| m.name.as_str()).collect();

        if let Some(orphan) = applied.iter().find(|name| !known.contains(*name)) {
            return Err(StoreError::migration(
                *orphan,
                "recorded as applied but no script with that name exists",
            ));
        }

        if let Some(last_applied) = applied.iter().next_back() {
            if let Some(pending) = migrations
                .iter()
                .find(|m| !applied.contains(m.name.as_str()) && m.name.as_str() < *last_applied)
            {
                return Err(StoreError::migration(
                    &pending.name,
                    format!("not yet applied but precedes applied migration '{last_applied}'"),
                ));
            }
        }
    }

    Ok(migrations)
}

/// Tracking row
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct AppliedMigration {
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// Outcome of a successful [`MigrationRunner::run`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Scripts executed by this run, in order
    pub applied: Vec<String>,
    /// Scripts already recorded and skipped
    pub skipped: Vec<String>,
}

/// Read-only view for `contentctl migrate --status`
#[derive(Debug, Clone, Default)]
pub struct MigrationStatus {
    pub applied: Vec<AppliedMigration>,
    pub pending: Vec<String>,
}

/// Applies migrations through the pool
pub struct MigrationRunner {
    pool: Pool,
    migrations: Vec<Migration>,
    table: String,
    check_order: bool,
}

impl MigrationRunner {
    /// Runner over the embedded scripts with the default tracking table.
    pub fn new(pool: Pool) -> Self {
        let defaults = MigrationsConfig::default();
        Self {
            pool,
            migrations: embedded(),
            table: defaults.table,
            check_order: defaults.check_order,
        }
    }

    /// Runner configured from `[migrations]`, loading `dir` if set.
    pub fn from_config(pool: Pool, config: &MigrationsConfig) -> Result<Self> {
        let migrations = match &config.dir {
            Some(dir) => load_dir(dir)?,
            None => embedded(),
        };
        Ok(Self {
            pool,
            migrations,
            table: config.table.clone(),
            check_order: config.check_order,
        })
    }

    pub fn with_migrations(mut self, migrations: Vec<Migration>) -> Self {
        self.migrations = migrations;
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_check_order(mut self, check_order: bool) -> Self {
        self.check_order = check_order;
        self
    }

    /// Apply every pending script.
    ///
    /// # Errors
    ///
    /// `StoreError::MigrationFailure` naming the script (or tracking table)
    /// that failed. Scripts after it are not attempted.
    pub async fn run(&self) -> Result<MigrationReport> {
        info!(
            table = %self.table,
            scripts = self.migrations.len(),
            "Running migrations..."
        );

        self.ensure_table().await?;
        let applied = self
            .applied()
            .await
            .map_err(|e| StoreError::migration(&self.table, e))?;
        let applied: Vec<String> = applied.into_iter().map(|a| a.name).collect();
        let ordered = plan(self.migrations.clone(), &applied, self.check_order)?;

        let mut report = MigrationReport::default();
        for migration in &ordered {
            if self.apply_one(migration).await? {
                report.applied.push(migration.name.clone());
            } else {
                report.skipped.push(migration.name.clone());
            }
        }

        info!(
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            "Migrations complete"
        );
        Ok(report)
    }

    /// Applied and pending scripts, without changing anything.
    pub async fn status(&self) -> Result<MigrationStatus> {
        self.check_table_name()?;
        let (exists,): (bool,) = sqlx::query_as("SELECT to_regclass($1) IS NOT NULL")
            .bind(&self.table)
            .fetch_one(self.pool.pg())
            .await?;

        let applied = if exists {
            self.applied().await?
        } else {
            Vec::new()
        };
        let applied_names: BTreeSet<&str> = applied.iter().map(|a| a.name.as_str()).collect();
        let mut pending: Vec<String> = self
            .migrations
            .iter()
            .filter(|m| !applied_names.contains(m.name.as_str()))
            .map(|m| m.name.clone())
            .collect();
        pending.sort();

        Ok(MigrationStatus { applied, pending })
    }

    fn check_table_name(&self) -> Result<()> {
        if is_identifier(&self.table) {
            Ok(())
        } else {
            Err(StoreError::migration(
                &self.table,
                "tracking table name is not a plain SQL identifier",
            ))
        }
    }

    async fn ensure_table(&self) -> Result<()> {
        self.check_table_name()?;
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id SERIAL PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            self.table
        ))
        .execute(self.pool.pg())
        .await
        .map_err(|e| StoreError::migration(&self.table, e))?;
        Ok(())
    }

    async fn applied(&self) -> std::result::Result<Vec<AppliedMigration>, sqlx::Error> {
        sqlx::query_as::<_, AppliedMigration>(&format!(
            "SELECT name, applied_at FROM {} ORDER BY id",
            self.table
        ))
        .fetch_all(self.pool.pg())
        .await
    }

    /// Returns true if the script ran, false if it was already recorded.
    async fn apply_one(&self, migration: &Migration) -> Result<bool> {
        let fail = |e: sqlx::Error| StoreError::migration(&migration.name, e);

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| StoreError::migration(&migration.name, e))?;
        let mut tx = conn.begin().await.map_err(fail)?;

        let outcome = match self.apply_in_tx(&mut tx, migration).await {
            Ok(applied) => tx.commit().await.map(|()| applied).map_err(fail),
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(migration = %migration.name, error = %rollback, "Rollback failed");
                }
                error!(migration = %migration.name, error = %err, "Migration failed, rolled back");
                Err(fail(err))
            }
        };

        self.pool.release(conn);
        outcome
    }

    async fn apply_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        migration: &Migration,
    ) -> std::result::Result<bool, sqlx::Error> {
        let (recorded,): (bool,) = sqlx::query_as(&format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE name = $1)",
            self.table
        ))
        .bind(&migration.name)
        .fetch_one(&mut **tx)
        .await?;

        if recorded {
            debug!(migration = %migration.name, "Already applied, skipping");
            return Ok(false);
        }

        sqlx::raw_sql(&migration.sql).execute(&mut **tx).await?;
        sqlx::query(&format!("INSERT INTO {} (name) VALUES ($1)", self.table))
            .bind(&migration.name)
            .execute(&mut **tx)
            .await?;

        info!(migration = %migration.name, "Applied migration");
        Ok(true)
    }
}
