use sqlx::migrate::{MigrateError, Migrator};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::filter::FilterError;

/// Migrations under `migrations/`, embedded at build time. Applied versions
/// are recorded in `_sqlx_migrations`.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Errors from the record store
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("record not found")]
    NotFound,

    #[error("edit conflict")]
    EditConflict,

    #[error("duplicate email")]
    DuplicateEmail,

    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] MigrateError),
}

/// Opens and verifies the Postgres pool used by [`super::postgres::PgStore`].
pub struct DatabaseManager;

impl DatabaseManager {
    pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
        let url = config
            .url
            .as_deref()
            .ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .idle_timeout(Duration::from_secs(15 * 60))
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;

        Self::health_check(&pool, Duration::from_secs(5)).await?;
        info!(max_connections = config.max_connections, "database connection pool established");
        Ok(pool)
    }

    /// Applies any migration not yet recorded against this database.
    pub async fn migrate(pool: &PgPool) -> Result<(), DatabaseError> {
        MIGRATOR.run(pool).await?;
        info!(latest = MIGRATOR.iter().map(|m| m.version).max().unwrap_or(0), "database schema up to date");
        Ok(())
    }

    pub async fn health_check(pool: &PgPool, timeout: Duration) -> Result<(), DatabaseError> {
        with_timeout(timeout, sqlx::query("SELECT 1").execute(pool)).await?;
        Ok(())
    }
}

/// Bounds a storage call so a stalled database cannot pin a request forever.
pub async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, DatabaseError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(DatabaseError::from),
        Err(_) => Err(DatabaseError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_embedded_in_order() {
        let migrations: Vec<_> = MIGRATOR.iter().collect();
        assert!(!migrations.is_empty());
        assert_eq!(migrations[0].version, 1);
        assert_eq!(migrations[0].description, "create tables");
        assert!(migrations.windows(2).all(|w| w[0].version < w[1].version));

        let schema = &migrations[0].sql;
        for table in ["movies", "users", "tokens", "permissions", "users_permissions"] {
            assert!(schema.contains(&format!("CREATE TABLE IF NOT EXISTS {} ", table)), "missing {}", table);
        }
    }

    #[tokio::test]
    async fn with_timeout_reports_stalls() {
        let stalled = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, sqlx::Error>(())
        };
        let result = with_timeout(Duration::from_millis(10), stalled).await;
        assert!(matches!(result, Err(DatabaseError::Timeout(_))));
    }

    #[tokio::test]
    async fn connect_requires_url() {
        let config = DatabaseConfig { url: None, max_connections: 1, query_timeout_secs: 1 };
        assert!(matches!(
            DatabaseManager::connect(&config).await,
            Err(DatabaseError::ConfigMissing("DATABASE_URL"))
        ));
    }
}
