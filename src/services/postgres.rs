use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;
use thiserror::Error;

use crate::core::sources::{CatalogError, CatalogSource};
use crate::models::{Trial, TrialStatus};

/// Errors that can occur when interacting with PostgreSQL
#[derive(Debug, Error)]
pub enum PostgresError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

impl From<PostgresError> for CatalogError {
    fn from(err: PostgresError) -> Self {
        CatalogError::Unavailable(err.to_string())
    }
}

/// PostgreSQL-backed trial catalog
pub struct PostgresCatalog {
    pool: PgPool,
}

impl PostgresCatalog {
    /// Create a new catalog client from a connection string
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, PostgresError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(600))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new catalog client from settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self, PostgresError> {
        tracing::info!("Connecting to trial catalog database");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
        )
        .await
    }

    /// Trials whose condition contains, or is contained by, the given condition
    ///
    /// Status is not filtered here; discovery applies its own openness filter.
    pub async fn find_by_condition(&self, condition: &str) -> Result<Vec<Trial>, PostgresError> {
        let query = r#"
            SELECT id, title, condition, phase, status, min_age, max_age,
                   required_markers, inclusions, exclusions, eligibility_text, url
            FROM trials
            WHERE condition ILIKE '%' || $1 || '%'
               OR $1 ILIKE '%' || condition || '%'
            ORDER BY catalog_position, id
        "#;

        let rows = sqlx::query(query)
            .bind(condition)
            .fetch_all(&self.pool)
            .await?;

        let trials = rows.iter().map(trial_from_row).collect::<Result<Vec<_>, _>>()?;

        tracing::debug!("Catalog returned {} trials for '{}'", trials.len(), condition);

        Ok(trials)
    }
}

fn trial_from_row(row: &PgRow) -> Result<Trial, PostgresError> {
    let status: String = row.try_get("status")?;
    let min_age: Option<i32> = row.try_get("min_age")?;
    let max_age: Option<i32> = row.try_get("max_age")?;
    let required_markers: Vec<String> = row.try_get("required_markers")?;

    Ok(Trial {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        condition: row.try_get("condition")?,
        phase: row.try_get("phase")?,
        status: status.parse::<TrialStatus>().unwrap_or(TrialStatus::Unknown),
        min_age: min_age.map(age_from_column).transpose()?,
        max_age: max_age.map(age_from_column).transpose()?,
        required_markers: required_markers.into_iter().collect(),
        inclusions: row.try_get("inclusions")?,
        exclusions: row.try_get("exclusions")?,
        eligibility_text: row.try_get("eligibility_text")?,
        url: row.try_get("url")?,
    })
}

fn age_from_column(age: i32) -> Result<u32, PostgresError> {
    u32::try_from(age).map_err(|_| PostgresError::InvalidRow(format!("negative age bound {}", age)))
}

#[async_trait]
impl CatalogSource for PostgresCatalog {
    async fn query(&self, condition: &str) -> Result<Vec<Trial>, CatalogError> {
        Ok(self.find_by_condition(condition).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_age_rejected() {
        assert!(age_from_column(-1).is_err());
        assert_eq!(age_from_column(18).unwrap(), 18);
    }

    #[test]
    fn test_error_maps_to_unavailable() {
        let err: CatalogError = PostgresError::InvalidRow("bad".to_string()).into();
        assert!(matches!(err, CatalogError::Unavailable(_)));
    }
}
