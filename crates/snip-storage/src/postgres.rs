use async_trait::async_trait;
use snip_core::storage::Result;
use snip_core::{
    OwnerId, ReadStorage, SaveOutcome, ShortId, Storage, StorageError, TombstonePolicy, UrlRecord,
};
use snip_telemetry::Logger;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Row};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info};

const PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Schema applied by [`PostgresStorage::ensure_schema`].
pub const SCHEMA: &str = include_str!("../ddl/postgres/urls.sql");

/// PostgreSQL implementation of the storage contract.
///
/// Uniqueness of both `short_id` and `original_url` is enforced by the
/// schema, so concurrent writers are serialized by the database. Deletion
/// sets `is_deleted`; rows are never removed.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
    policy: TombstonePolicy,
    logger: Logger,
}

impl PostgresStorage {
    /// Creates a storage from an existing connection pool.
    pub fn new(pool: PgPool, policy: TombstonePolicy, logger: Logger) -> Self {
        Self {
            pool,
            policy,
            logger,
        }
    }

    /// Opens a new connection pool and makes sure the schema exists.
    pub async fn connect(
        dsn: &str,
        max_connections: u32,
        policy: TombstonePolicy,
        logger: Logger,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(dsn)
            .await
            .map_err(map_sqlx_error)?;

        let storage = Self::new(pool, policy, logger);
        storage.ensure_schema().await?;
        info!(parent: storage.logger.span(), max_connections, "connected to postgres");

        Ok(storage)
    }

    /// Creates the `urls` table and its indexes if they are missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

/// Inserts one pair, classifying a conflict against the row that holds it.
async fn insert_pair(
    conn: &mut PgConnection,
    owner: &OwnerId,
    id: &ShortId,
    original_url: &str,
) -> Result<SaveOutcome> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO urls (short_id, original_url, owner_id)
        VALUES ($1, $2, $3)
        ON CONFLICT DO NOTHING
        RETURNING short_id
        "#,
    )
    .bind(id.as_str())
    .bind(original_url)
    .bind(owner.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(map_sqlx_error)?;

    if inserted.is_some() {
        return Ok(SaveOutcome::Created);
    }

    let rows = sqlx::query(
        r#"
        SELECT short_id, original_url
        FROM urls
        WHERE short_id = $1 OR original_url = $2
        "#,
    )
    .bind(id.as_str())
    .bind(original_url)
    .fetch_all(&mut *conn)
    .await
    .map_err(map_sqlx_error)?;

    let mut bound_url = None;
    let mut existing_id = None;
    for row in rows {
        let short_id: String = row.try_get("short_id").map_err(map_sqlx_error)?;
        let url: String = row.try_get("original_url").map_err(map_sqlx_error)?;
        if short_id == id.as_str() {
            bound_url = Some(url);
        } else {
            existing_id = Some(short_id);
        }
    }

    match (bound_url, existing_id) {
        (Some(url), _) if url == original_url => Ok(SaveOutcome::Unchanged),
        (Some(_), _) => Err(StorageError::AlreadyExists(id.to_string())),
        (None, Some(existing)) => Ok(SaveOutcome::UrlExists(ShortId::new_unchecked(existing))),
        (None, None) => Err(StorageError::Operation(format!(
            "insert of '{id}' was skipped but no conflicting row was found"
        ))),
    }
}

#[async_trait]
impl ReadStorage for PostgresStorage {
    async fn get(&self, id: &ShortId) -> Result<Option<UrlRecord>> {
        let row = sqlx::query(
            r#"
            SELECT original_url, owner_id, is_deleted
            FROM urls
            WHERE short_id = $1
            LIMIT 1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let deleted: bool = row.try_get("is_deleted").map_err(map_sqlx_error)?;
        if !self.policy.visible(deleted) {
            return Ok(None);
        }

        let original_url: String = row.try_get("original_url").map_err(map_sqlx_error)?;
        let owner_id: String = row.try_get("owner_id").map_err(map_sqlx_error)?;

        Ok(Some(UrlRecord {
            short_id: id.clone(),
            original_url,
            owner_id: OwnerId::new_unchecked(owner_id),
            deleted,
        }))
    }

    async fn get_id_by_url(&self, original_url: &str) -> Result<Option<ShortId>> {
        let row = sqlx::query(
            r#"
            SELECT short_id
            FROM urls
            WHERE original_url = $1
            LIMIT 1
            "#,
        )
        .bind(original_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(|row| {
            row.try_get::<String, _>("short_id")
                .map(ShortId::new_unchecked)
                .map_err(map_sqlx_error)
        })
        .transpose()
    }

    async fn get_user_urls(&self, owner: &OwnerId) -> Result<BTreeMap<ShortId, String>> {
        let rows = sqlx::query(
            r#"
            SELECT short_id, original_url
            FROM urls
            WHERE owner_id = $1
              AND NOT is_deleted
            "#,
        )
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                let short_id: String = row.try_get("short_id").map_err(map_sqlx_error)?;
                let original_url: String = row.try_get("original_url").map_err(map_sqlx_error)?;
                Ok((ShortId::new_unchecked(short_id), original_url))
            })
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        let probe = sqlx::query("SELECT 1").execute(&self.pool);

        match tokio::time::timeout(PING_TIMEOUT, probe).await {
            Ok(result) => result.map(|_| ()).map_err(map_sqlx_error),
            Err(_) => Err(StorageError::Timeout(format!(
                "ping did not answer within {}s",
                PING_TIMEOUT.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn save_id(
        &self,
        owner: &OwnerId,
        id: &ShortId,
        original_url: &str,
    ) -> Result<SaveOutcome> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        insert_pair(&mut conn, owner, id, original_url).await
    }

    /// All pairs are written in one transaction. A conflicting id rolls the
    /// whole batch back.
    async fn save_batch(&self, owner: &OwnerId, pairs: &BTreeMap<ShortId, String>) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let mut failure = None;
        for (id, original_url) in pairs {
            if let Err(err) = insert_pair(&mut tx, owner, id, original_url).await {
                failure = Some(err);
                break;
            }
        }

        if let Some(err) = failure {
            if let Err(rollback) = tx.rollback().await {
                error!(
                    parent: self.logger.span(),
                    error = %rollback,
                    "failed to roll back batch insert"
                );
            }
            return Err(err);
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(parent: self.logger.span(), owner = %owner, count = pairs.len(), "saved batch");
        Ok(())
    }

    async fn batch_delete(&self, owner: &OwnerId, ids: &[ShortId]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
        let result = sqlx::query(
            r#"
            UPDATE urls
            SET is_deleted = TRUE
            WHERE owner_id = $1
              AND short_id = ANY($2)
              AND NOT is_deleted
            "#,
        )
        .bind(owner.as_str())
        .bind(ids)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
