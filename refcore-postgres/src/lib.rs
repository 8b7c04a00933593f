//! PostgreSQL adapter for the `Refcore` reference allocation library
//!
//! This crate implements the request and organization store ports on top of
//! PostgreSQL. The `requests.reference` column carries a `UNIQUE`
//! constraint, so the uniqueness check the allocator depends on is enforced
//! by the backing store at commit time, not just by the application-level
//! collision probe. A violated constraint surfaces as
//! [`StoreError::DuplicateReference`] and the allocator recomputes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::time::Duration;

use async_trait::async_trait;
use nutype::nutype;
use refcore::errors::{StoreError, StoreResult};
use refcore::organization::{Organization, OrganizationProfile};
use refcore::request::Request;
use refcore::store::{OrganizationStore, RequestStore};
use refcore::types::{
    OrganizationRef, Reference, ReferenceId, RequestId, Timestamp, Year,
};
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Pool, Postgres, Row};
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Errors raised while setting up the adapter itself.
#[derive(Debug, Error)]
pub enum PostgresStoreError {
    /// Creating the connection pool failed.
    #[error("failed to create postgres connection pool")]
    ConnectionFailed(#[source] sqlx::Error),

    /// Running the bundled migrations failed.
    #[error("failed to run database migrations")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),
}

/// Maximum number of database connections in the pool.
///
/// `MaxConnections` represents the connection pool size limit. It must be
/// at least 1, enforced by using `NonZeroU32` as the underlying type.
#[nutype(derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRef, Into))]
pub struct MaxConnections(std::num::NonZeroU32);

/// Configuration for the adapter's connection pool.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Maximum number of connections in the pool (default: 10)
    pub max_connections: MaxConnections,
    /// Timeout for acquiring a connection from the pool (default: 30 seconds)
    pub acquire_timeout: Duration,
    /// Idle timeout for connections in the pool (default: 10 minutes)
    pub idle_timeout: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        const DEFAULT_MAX_CONNECTIONS: std::num::NonZeroU32 = match std::num::NonZeroU32::new(10) {
            Some(v) => v,
            None => unreachable!(),
        };

        Self {
            max_connections: MaxConnections::new(DEFAULT_MAX_CONNECTIONS),
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

async fn connect(
    connection_string: String,
    config: PostgresConfig,
) -> Result<Pool<Postgres>, PostgresStoreError> {
    let max_connections: std::num::NonZeroU32 = config.max_connections.into();
    PgPoolOptions::new()
        .max_connections(max_connections.get())
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(&connection_string)
        .await
        .map_err(PostgresStoreError::ConnectionFailed)
}

/// PostgreSQL-backed request store.
#[derive(Debug, Clone)]
pub struct PostgresRequestStore {
    pool: Pool<Postgres>,
}

impl PostgresRequestStore {
    /// Create a store with default pool configuration.
    pub async fn new<S: Into<String>>(connection_string: S) -> Result<Self, PostgresStoreError> {
        Self::with_config(connection_string, PostgresConfig::default()).await
    }

    /// Create a store with custom pool configuration.
    pub async fn with_config<S: Into<String>>(
        connection_string: S,
        config: PostgresConfig,
    ) -> Result<Self, PostgresStoreError> {
        let pool = connect(connection_string.into(), config).await?;
        Ok(Self { pool })
    }

    /// Create a store from an existing connection pool.
    ///
    /// Use this when the request and organization stores should share one
    /// pool.
    pub const fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Runs the bundled schema migrations.
    pub async fn migrate(&self) -> Result<(), PostgresStoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(PostgresStoreError::MigrationFailed)
    }
}

#[async_trait]
impl RequestStore for PostgresRequestStore {
    #[instrument(skip(self), fields(organization = %organization, year = %year))]
    async fn max_reference_id(
        &self,
        organization: &OrganizationRef,
        year: Year,
    ) -> StoreResult<Option<ReferenceId>> {
        let (start, end) = year.window();
        let max: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(reference_id) FROM requests
             WHERE organization = $1 AND date_created >= $2 AND date_created < $3",
        )
        .bind(organization.to_string())
        .bind(start.into_datetime())
        .bind(end.into_datetime())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        max.map(reference_id_from_raw).transpose()
    }

    async fn find_by_reference(&self, reference: &Reference) -> StoreResult<Option<Request>> {
        let row = sqlx::query(
            "SELECT id, organization, reference, reference_id, status, confidential,
                    properties, date_created, date_submitted
             FROM requests WHERE reference = $1",
        )
        .bind(reference.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(request_from_row).transpose()
    }

    #[instrument(skip_all, fields(request_id = %request.id()))]
    async fn insert(&self, request: Request) -> StoreResult<Request> {
        let result = sqlx::query(
            "INSERT INTO requests
                 (id, organization, reference, reference_id, status, confidential,
                  properties, date_created, date_submitted)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(**request.id())
        .bind(request.organization().to_string())
        .bind(request.reference().map(ToString::to_string))
        .bind(request.reference_id().map(|id| i64::from(u32::from(id))))
        .bind(request.status().as_str())
        .bind(request.is_confidential())
        .bind(Value::Object(request.properties().clone()))
        .bind(request.date_created().into_datetime())
        .bind(request.date_submitted().map(Timestamp::into_datetime))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!("request persisted");
                Ok(request)
            }
            Err(error) => {
                let unique_violation = error
                    .as_database_error()
                    .is_some_and(|db| db.is_unique_violation());
                if unique_violation {
                    if let Some(reference) = request.reference() {
                        return Err(StoreError::DuplicateReference(reference.clone()));
                    }
                }
                Err(map_sqlx_error(error))
            }
        }
    }
}

/// PostgreSQL-backed organization store.
#[derive(Debug, Clone)]
pub struct PostgresOrganizationStore {
    pool: Pool<Postgres>,
}

impl PostgresOrganizationStore {
    /// Create a store with default pool configuration.
    pub async fn new<S: Into<String>>(connection_string: S) -> Result<Self, PostgresStoreError> {
        Self::with_config(connection_string, PostgresConfig::default()).await
    }

    /// Create a store with custom pool configuration.
    pub async fn with_config<S: Into<String>>(
        connection_string: S,
        config: PostgresConfig,
    ) -> Result<Self, PostgresStoreError> {
        let pool = connect(connection_string.into(), config).await?;
        Ok(Self { pool })
    }

    /// Create a store from an existing connection pool.
    pub const fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrganizationStore for PostgresOrganizationStore {
    async fn find(&self, id: &OrganizationRef) -> StoreResult<Option<Organization>> {
        let row = sqlx::query("SELECT id, shortcode, name FROM organizations WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.as_ref().map(organization_from_row).transpose()
    }

    async fn find_or_create(
        &self,
        id: &OrganizationRef,
        profile: OrganizationProfile,
    ) -> StoreResult<Organization> {
        // first write wins; a concurrent creator's profile stays in place
        sqlx::query(
            "INSERT INTO organizations (id, shortcode, name)
             VALUES ($1, $2, $3)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(id.to_string())
        .bind(profile.shortcode().map(ToString::to_string))
        .bind(profile.name().to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        self.find(id).await?.ok_or_else(|| {
            StoreError::Internal(format!("organization '{id}' vanished after upsert"))
        })
    }
}

fn reference_id_from_raw(raw: i64) -> StoreResult<ReferenceId> {
    let value = u32::try_from(raw).map_err(|_| {
        StoreError::Serialization(format!("reference_id {raw} is out of range"))
    })?;
    ReferenceId::try_new(value).map_err(|error| StoreError::Serialization(error.to_string()))
}

fn request_from_row(row: &PgRow) -> StoreResult<Request> {
    let id: Uuid = row.try_get("id").map_err(map_sqlx_error)?;
    let id = RequestId::try_new(id).map_err(|error| StoreError::Serialization(error.to_string()))?;

    let organization: String = row.try_get("organization").map_err(map_sqlx_error)?;
    let organization = OrganizationRef::try_new(organization)
        .map_err(|error| StoreError::Serialization(error.to_string()))?;

    let reference: Option<String> = row.try_get("reference").map_err(map_sqlx_error)?;
    let reference = reference
        .map(|raw| {
            Reference::try_new(raw).map_err(|error| StoreError::Serialization(error.to_string()))
        })
        .transpose()?;

    let reference_id: Option<i64> = row.try_get("reference_id").map_err(map_sqlx_error)?;
    let reference_id = reference_id.map(reference_id_from_raw).transpose()?;

    let status: String = row.try_get("status").map_err(map_sqlx_error)?;
    let status = status
        .parse()
        .map_err(|error: refcore::request::ParseStatusError| {
            StoreError::Serialization(error.to_string())
        })?;

    let confidential: bool = row.try_get("confidential").map_err(map_sqlx_error)?;

    let properties: Value = row.try_get("properties").map_err(map_sqlx_error)?;
    let properties = match properties {
        Value::Object(map) => map,
        other => {
            return Err(StoreError::Serialization(format!(
                "properties column holds non-object JSON: {other}"
            )));
        }
    };

    let date_created: chrono::DateTime<chrono::Utc> =
        row.try_get("date_created").map_err(map_sqlx_error)?;
    let date_submitted: Option<chrono::DateTime<chrono::Utc>> =
        row.try_get("date_submitted").map_err(map_sqlx_error)?;

    Ok(Request::restore(
        id,
        organization,
        reference,
        reference_id,
        status,
        confidential,
        properties,
        Timestamp::new(date_created),
        date_submitted.map(Timestamp::new),
    ))
}

fn organization_from_row(row: &PgRow) -> StoreResult<Organization> {
    let id: String = row.try_get("id").map_err(map_sqlx_error)?;
    let id = OrganizationRef::try_new(id)
        .map_err(|error| StoreError::Serialization(error.to_string()))?;

    let shortcode: Option<String> = row.try_get("shortcode").map_err(map_sqlx_error)?;
    let name: String = row.try_get("name").map_err(map_sqlx_error)?;
    let profile = OrganizationProfile::parse(shortcode.as_deref(), &name)
        .map_err(|error| StoreError::Serialization(error.to_string()))?;

    Ok(Organization::new(id, profile))
}

fn map_sqlx_error(error: sqlx::Error) -> StoreError {
    match error {
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable("connection pool timed out".to_string())
        }
        sqlx::Error::Io(io) => StoreError::Io(io),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Serialization(error.to_string())
        }
        sqlx::Error::Database(db) => StoreError::Internal(db.to_string()),
        other => StoreError::ConnectionFailed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_pool_settings() {
        let config = PostgresConfig::default();
        let max: std::num::NonZeroU32 = config.max_connections.into();
        assert_eq!(max.get(), 10);
        assert_eq!(config.acquire_timeout, Duration::from_secs(30));
        assert_eq!(config.idle_timeout, Duration::from_secs(600));
    }

    #[test]
    fn reference_id_decoding_rejects_out_of_range_values() {
        assert!(reference_id_from_raw(1).is_ok());
        assert!(matches!(
            reference_id_from_raw(0),
            Err(StoreError::Serialization(_))
        ));
        assert!(matches!(
            reference_id_from_raw(-5),
            Err(StoreError::Serialization(_))
        ));
        assert!(matches!(
            reference_id_from_raw(i64::from(u32::MAX) + 1),
            Err(StoreError::Serialization(_))
        ));
    }
}
