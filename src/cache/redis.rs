//! Redis-backed response store.
//!
//! Each entry is a flat hash (`etag`, `ttl`, `createdAt`, `html`) written
//! together with its expiry in one transaction. Remaining life is read back
//! with `PTTL`, so the server clock is the only clock that matters.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::keys::CacheKey;
use super::store::{CacheEntry, CacheStore, StoreError};

const FIELD_ETAG: &str = "etag";
const FIELD_TTL: &str = "ttl";
const FIELD_CREATED_AT: &str = "createdAt";
const FIELD_HTML: &str = "html";

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    namespace: String,
    op_timeout: Duration,
}

impl RedisStore {
    pub fn new(connection: ConnectionManager, op_timeout: Duration) -> Self {
        Self {
            connection,
            namespace: String::new(),
            op_timeout,
        }
    }

    /// Open a managed connection to `url`, failing if it cannot be
    /// established within `op_timeout`.
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let connection = tokio::time::timeout(op_timeout, client.get_connection_manager())
            .await
            .map_err(|_| StoreError::Timeout {
                op: "connect",
                timeout: op_timeout,
            })??;
        Ok(Self::new(connection, op_timeout))
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    fn make_key(&self, key: &CacheKey) -> String {
        if self.namespace.is_empty() {
            key.as_str().to_owned()
        } else {
            format!("{}:{}", self.namespace, key)
        }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, redis::RedisError>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout {
                op,
                timeout: self.op_timeout,
            }),
        }
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn exists(&self, key: &CacheKey) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        let redis_key = self.make_key(key);
        self.bounded("exists", async move { conn.exists(redis_key).await })
            .await
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
        let mut conn = self.connection.clone();
        let redis_key = self.make_key(key);
        let fields: HashMap<String, String> = self
            .bounded("get", async move { conn.hgetall(redis_key).await })
            .await?;
        decode_entry(key, fields)
    }

    async fn set(
        &self,
        key: &CacheKey,
        entry: &CacheEntry,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        if ttl_ms == 0 {
            return Ok(());
        }

        let mut conn = self.connection.clone();
        let redis_key = self.make_key(key);
        let fields = encode_entry(entry);

        self.bounded("set", async move {
            let mut pipe = redis::pipe();
            pipe.atomic()
                .hset_multiple(&redis_key, &fields)
                .ignore()
                .cmd("PEXPIRE")
                .arg(&redis_key)
                .arg(ttl_ms)
                .ignore();
            let written: Result<(), redis::RedisError> = pipe.query_async(&mut conn).await;
            written
        })
        .await
    }

    async fn ttl_remaining(&self, key: &CacheKey) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.connection.clone();
        let redis_key = self.make_key(key);
        let pttl: i64 = self
            .bounded("ttl_remaining", async move { conn.pttl(redis_key).await })
            .await?;
        Ok(decode_pttl(pttl))
    }
}

fn encode_entry(entry: &CacheEntry) -> [(&'static str, String); 4] {
    [
        (FIELD_ETAG, entry.etag.clone()),
        (FIELD_TTL, entry.ttl_ms.to_string()),
        (FIELD_CREATED_AT, entry.created_at_ms.to_string()),
        (FIELD_HTML, entry.html.clone()),
    ]
}

/// An empty hash means the key does not exist; a partial one is corrupt.
fn decode_entry(
    key: &CacheKey,
    mut fields: HashMap<String, String>,
) -> Result<Option<CacheEntry>, StoreError> {
    if fields.is_empty() {
        return Ok(None);
    }

    let mut take = |name: &'static str| {
        fields
            .remove(name)
            .ok_or_else(|| StoreError::corrupt(key, format!("missing field `{name}`")))
    };

    let etag = take(FIELD_ETAG)?;
    let html = take(FIELD_HTML)?;
    let ttl_ms = take(FIELD_TTL)?
        .parse::<u64>()
        .map_err(|err| StoreError::corrupt(key, format!("invalid `{FIELD_TTL}`: {err}")))?;
    let created_at_ms = take(FIELD_CREATED_AT)?
        .parse::<i64>()
        .map_err(|err| StoreError::corrupt(key, format!("invalid `{FIELD_CREATED_AT}`: {err}")))?;

    Ok(Some(CacheEntry {
        html,
        etag,
        created_at_ms,
        ttl_ms,
    }))
}

/// `PTTL` returns -2 for a missing key and -1 for a key without expiry.
fn decode_pttl(pttl: i64) -> Option<Duration> {
    u64::try_from(pttl)
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}
