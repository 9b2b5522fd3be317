//! Persistent cache tier and version counter backed by Postgres.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sqlx::postgres::PgPool;
use time::OffsetDateTime;
use tracing::warn;

use crate::cache::{CacheError, CacheTier, VersionStore};

const TIER: &str = "persistent";
const VERSION_SOURCE: &str = "version";

/// Shared cache tier stored in `eligibility_cache`.
#[derive(Clone)]
pub struct PostgresCacheTier {
    pool: PgPool,
}

impl PostgresCacheTier {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheTier for PostgresCacheTier {
    fn name(&self) -> &'static str {
        TIER
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let payload = sqlx::query_scalar::<_, Vec<u8>>(
            r#"
            SELECT payload FROM eligibility_cache
            WHERE cache_key = $1 AND expires_at > $2
            "#,
        )
        .bind(key)
        .bind(OffsetDateTime::now_utc())
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| CacheError::unavailable(TIER, err))?;

        Ok(payload.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let stored_at = OffsetDateTime::now_utc();
        let Some(expires_at) = expiry(stored_at, ttl) else {
            warn!(tier = TIER, ttl_secs = ttl.as_secs(), "ttl out of range, write skipped");
            return Ok(());
        };

        sqlx::query(
            r#"
            INSERT INTO eligibility_cache (cache_key, payload, stored_at, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (cache_key) DO UPDATE
            SET payload = EXCLUDED.payload,
                stored_at = EXCLUDED.stored_at,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value.to_vec())
        .bind(stored_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|err| CacheError::unavailable(TIER, err))?;

        Ok(())
    }

    async fn sweep_expired(&self) -> Result<u64, CacheError> {
        let result = sqlx::query("DELETE FROM eligibility_cache WHERE expires_at <= $1")
            .bind(OffsetDateTime::now_utc())
            .execute(&self.pool)
            .await
            .map_err(|err| CacheError::unavailable(TIER, err))?;

        Ok(result.rows_affected())
    }
}

/// Single-row version counter in `eligibility_cache_version`.
///
/// Bumps use one `UPDATE ... RETURNING` statement, so concurrent bumps from separate processes
/// each observe a distinct version.
#[derive(Clone)]
pub struct PostgresVersionStore {
    pool: PgPool,
}

impl PostgresVersionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VersionStore for PostgresVersionStore {
    async fn current(&self) -> Result<u64, CacheError> {
        let version = sqlx::query_scalar::<_, i64>(
            "SELECT version FROM eligibility_cache_version WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| CacheError::unavailable(VERSION_SOURCE, err))?;

        to_version(version.unwrap_or(1))
    }

    async fn bump(&self) -> Result<u64, CacheError> {
        let version = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO eligibility_cache_version (id, version)
            VALUES (1, 2)
            ON CONFLICT (id) DO UPDATE
            SET version = eligibility_cache_version.version + 1
            RETURNING version
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|err| CacheError::unavailable(VERSION_SOURCE, err))?;

        to_version(version)
    }
}

/// Expiry timestamp for an entry written at `stored_at`, or `None` when it is not representable.
fn expiry(stored_at: OffsetDateTime, ttl: Duration) -> Option<OffsetDateTime> {
    time::Duration::try_from(ttl)
        .ok()
        .and_then(|ttl| stored_at.checked_add(ttl))
}

fn to_version(value: i64) -> Result<u64, CacheError> {
    u64::try_from(value)
        .map_err(|_| CacheError::unavailable(VERSION_SOURCE, format!("negative version {value}")))
}
