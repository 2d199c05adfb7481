//! Relational database collaborator (PostgreSQL via sqlx)
//!
//! Table and column names come from config and are spliced into SQL after
//! `config::validation::is_safe_identifier` has accepted them; every value is
//! a bound parameter.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::DependencyError;
use crate::config::validation::is_safe_identifier;
use crate::config::{defaults, AnalysisTable, DatabaseSettings, JobTable, OrphanRule};

/// Index present in the inspected schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: String,
    /// `false` when a failed `CREATE INDEX CONCURRENTLY` left it unusable
    pub valid: bool,
}

/// Status breakdown of the analysis table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub total: i64,
    pub done: i64,
    pub failed: i64,
}

/// A transcription job stuck in the processing state.
#[derive(Debug, Clone, PartialEq)]
pub struct StaleJob {
    pub id: String,
    pub external_id: Option<String>,
    pub media_url: Option<String>,
    pub age: Duration,
}

#[async_trait]
pub trait Database: Send + Sync {
    /// Round-trip latency of `SELECT 1`.
    async fn ping(&self) -> Result<Duration, DependencyError>;

    async fn list_indexes(&self, schema: &str) -> Result<Vec<IndexInfo>, DependencyError>;

    async fn reindex(&self, schema: &str, index: &str) -> Result<(), DependencyError>;

    /// Child rows whose reference no longer resolves.
    async fn count_orphans(&self, rule: &OrphanRule) -> Result<i64, DependencyError>;

    async fn delete_orphans(&self, rule: &OrphanRule) -> Result<u64, DependencyError>;

    async fn status_counts(&self, table: &AnalysisTable) -> Result<StatusCounts, DependencyError>;

    /// Move every row from status `from` to status `to`; returns rows touched.
    async fn reset_status(
        &self,
        table: &AnalysisTable,
        from: &str,
        to: &str,
    ) -> Result<u64, DependencyError>;

    /// Jobs in the processing state not updated for at least `older_than`, oldest first.
    async fn stale_jobs(
        &self,
        jobs: &JobTable,
        older_than: Duration,
    ) -> Result<Vec<StaleJob>, DependencyError>;

    /// Record a resubmission: new provider id, fresh `updated_at`, still processing.
    async fn requeue_job(
        &self,
        jobs: &JobTable,
        id: &str,
        external_id: &str,
    ) -> Result<(), DependencyError>;

    async fn expire_jobs(&self, jobs: &JobTable, ids: &[String]) -> Result<u64, DependencyError>;
}

/// Quote a validated (optionally schema-qualified) identifier.
fn quote_ident(name: &str) -> Result<String, DependencyError> {
    if !is_safe_identifier(name) {
        return Err(DependencyError::InvalidResponse(format!(
            "refusing unsafe SQL identifier '{name}'"
        )));
    }
    Ok(name
        .split('.')
        .map(|part| format!("\"{part}\""))
        .collect::<Vec<_>>()
        .join("."))
}

fn orphan_predicate(rule: &OrphanRule) -> Result<(String, String), DependencyError> {
    let child = quote_ident(&rule.child_table)?;
    let predicate = format!(
        "c.{col} IS NOT NULL AND NOT EXISTS (SELECT 1 FROM {parent} p WHERE p.{pcol} = c.{col})",
        col = quote_ident(&rule.child_column)?,
        parent = quote_ident(&rule.parent_table)?,
        pcol = quote_ident(&rule.parent_column)?,
    );
    Ok((child, predicate))
}

pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Build a pool that connects on first use.
    pub fn connect_lazy(
        database_url: &str,
        settings: &DatabaseSettings,
    ) -> Result<Self, DependencyError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_millis(settings.probe_timeout_ms))
            .connect_lazy(database_url)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn ping(&self) -> Result<Duration, DependencyError> {
        let started = Instant::now();
        let _: i32 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        Ok(started.elapsed())
    }

    async fn list_indexes(&self, schema: &str) -> Result<Vec<IndexInfo>, DependencyError> {
        let rows: Vec<(String, bool)> = sqlx::query_as(
            r"SELECT c.relname::text, i.indisvalid
              FROM pg_index i
              JOIN pg_class c ON c.oid = i.indexrelid
              JOIN pg_namespace n ON n.oid = c.relnamespace
              WHERE n.nspname = $1
              ORDER BY c.relname",
        )
        .bind(schema)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(name, valid)| IndexInfo { name, valid })
            .collect())
    }

    async fn reindex(&self, schema: &str, index: &str) -> Result<(), DependencyError> {
        let sql = format!(
            "REINDEX INDEX {}.{}",
            quote_ident(schema)?,
            quote_ident(index)?
        );
        debug!(%sql, "Reindexing");
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn count_orphans(&self, rule: &OrphanRule) -> Result<i64, DependencyError> {
        let (child, predicate) = orphan_predicate(rule)?;
        let sql = format!("SELECT COUNT(*) FROM {child} c WHERE {predicate}");
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn delete_orphans(&self, rule: &OrphanRule) -> Result<u64, DependencyError> {
        let (child, predicate) = orphan_predicate(rule)?;
        let sql = format!("DELETE FROM {child} c WHERE {predicate}");
        let result = sqlx::query(&sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn status_counts(&self, table: &AnalysisTable) -> Result<StatusCounts, DependencyError> {
        let sql = format!(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE {status} = $1), COUNT(*) FILTER (WHERE {status} = $2) FROM {table}",
            status = quote_ident(&table.status_column)?,
            table = quote_ident(&table.table)?,
        );
        let (total, done, failed): (i64, i64, i64) = sqlx::query_as(&sql)
            .bind(&table.done_value)
            .bind(&table.failed_value)
            .fetch_one(&self.pool)
            .await?;
        Ok(StatusCounts {
            total,
            done,
            failed,
        })
    }

    async fn reset_status(
        &self,
        table: &AnalysisTable,
        from: &str,
        to: &str,
    ) -> Result<u64, DependencyError> {
        let sql = format!(
            "UPDATE {table} SET {status} = $1 WHERE {status} = $2",
            status = quote_ident(&table.status_column)?,
            table = quote_ident(&table.table)?,
        );
        let result = sqlx::query(&sql)
            .bind(to)
            .bind(from)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn stale_jobs(
        &self,
        jobs: &JobTable,
        older_than: Duration,
    ) -> Result<Vec<StaleJob>, DependencyError> {
        let updated = quote_ident(&jobs.updated_column)?;
        let sql = format!(
            "SELECT {id}::text, {ext}::text, {media}::text, EXTRACT(EPOCH FROM (now() - {updated}))::float8 \
             FROM {table} \
             WHERE {status} = $1 AND {updated} < now() - make_interval(secs => $2) \
             ORDER BY {updated} ASC LIMIT $3",
            id = quote_ident(&jobs.id_column)?,
            ext = quote_ident(&jobs.external_id_column)?,
            media = quote_ident(&jobs.media_url_column)?,
            table = quote_ident(&jobs.table)?,
            status = quote_ident(&jobs.status_column)?,
        );
        let rows: Vec<(String, Option<String>, Option<String>, f64)> = sqlx::query_as(&sql)
            .bind(&jobs.processing_value)
            .bind(older_than.as_secs_f64())
            .bind(defaults::STALE_JOB_LIMIT)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(id, external_id, media_url, age_secs)| StaleJob {
                id,
                external_id,
                media_url,
                age: Duration::from_secs_f64(age_secs.max(0.0)),
            })
            .collect())
    }

    async fn requeue_job(
        &self,
        jobs: &JobTable,
        id: &str,
        external_id: &str,
    ) -> Result<(), DependencyError> {
        let sql = format!(
            "UPDATE {table} SET {ext} = $1, {updated} = now() WHERE {id}::text = $2",
            table = quote_ident(&jobs.table)?,
            ext = quote_ident(&jobs.external_id_column)?,
            updated = quote_ident(&jobs.updated_column)?,
            id = quote_ident(&jobs.id_column)?,
        );
        let result = sqlx::query(&sql)
            .bind(external_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DependencyError::NotFound(format!("job {id}")));
        }
        Ok(())
    }

    async fn expire_jobs(&self, jobs: &JobTable, ids: &[String]) -> Result<u64, DependencyError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE {table} SET {status} = $1, {updated} = now() WHERE {id}::text = ANY($2)",
            table = quote_ident(&jobs.table)?,
            status = quote_ident(&jobs.status_column)?,
            updated = quote_ident(&jobs.updated_column)?,
            id = quote_ident(&jobs.id_column)?,
        );
        let result = sqlx::query(&sql)
            .bind(&jobs.expired_value)
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
