use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use std::time::Duration;

use super::{ChangeHub, DuelStore, Subscription};
use crate::error::StoreError;
use crate::metrics::track_store_operation;
use crate::models::Duel;
use crate::utils::retry::{retry_async_when, RetryConfig};

const CHANGES_PATTERN: &str = "duel:changes:*";

/// Inserts the row only if absent, then announces it.
const CREATE_SCRIPT: &str = r#"
    if redis.call('EXISTS', KEYS[1]) == 1 then
        return 0
    end
    redis.call('SET', KEYS[1], ARGV[1], 'EX', tonumber(ARGV[2]))
    redis.call('PUBLISH', ARGV[3], ARGV[1])
    return 1
"#;

/// Version-checked replace. Returns -1 when missing, 0 on a stale version,
/// 1 when written. The publish happens in the same atomic step as the write.
const COMPARE_AND_SWAP_SCRIPT: &str = r#"
    local current = redis.call('GET', KEYS[1])
    if not current then
        return -1
    end
    local stored = cjson.decode(current)
    if tonumber(stored['version']) ~= tonumber(ARGV[1]) then
        return 0
    end
    redis.call('SET', KEYS[1], ARGV[2], 'EX', tonumber(ARGV[3]))
    redis.call('PUBLISH', ARGV[4], ARGV[2])
    return 1
"#;

fn duel_key(duel_id: &str) -> String {
    format!("duel:{}", duel_id)
}

fn changes_channel(duel_id: &str) -> String {
    format!("duel:changes:{}", duel_id)
}

/// Redis-backed store. Rows live at `duel:{id}`; committed states are
/// published on `duel:changes:{id}` and fanned out locally by a listener task.
pub struct RedisDuelStore {
    redis: ConnectionManager,
    hub: ChangeHub,
    ttl_seconds: u64,
    listener: tokio::task::JoinHandle<()>,
}

impl RedisDuelStore {
    pub async fn connect(client: redis::Client, ttl_seconds: u64) -> anyhow::Result<Self> {
        tracing::info!("Attempting to connect to Redis duel store...");

        let redis = tokio::time::timeout(
            Duration::from_secs(30),
            ConnectionManager::new(client.clone()),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        let mut pubsub = client
            .get_async_pubsub()
            .await
            .context("Failed to open Redis pub/sub connection")?;
        pubsub
            .psubscribe(CHANGES_PATTERN)
            .await
            .context("Failed to subscribe to duel change feed")?;

        let hub = ChangeHub::new();
        let listener_hub = hub.clone();
        let listener = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!("Dropping undecodable duel change payload: {}", e);
                        continue;
                    }
                };
                match serde_json::from_str::<Duel>(&payload) {
                    Ok(duel) => {
                        listener_hub.publish(&duel);
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Dropping malformed duel change on {}: {}",
                            msg.get_channel_name(),
                            e
                        );
                    }
                }
            }
            tracing::warn!("Redis duel change feed closed");
        });

        tracing::info!("Redis duel store connected, listening on {}", CHANGES_PATTERN);

        Ok(Self {
            redis,
            hub,
            ttl_seconds,
            listener,
        })
    }

    fn decode(duel_id: &str, json: &str) -> Result<Duel, StoreError> {
        serde_json::from_str(json).map_err(|e| StoreError::Corrupt {
            id: duel_id.to_string(),
            reason: e.to_string(),
        })
    }

    fn encode(duel: &Duel) -> Result<String, StoreError> {
        serde_json::to_string(duel)
            .context("Failed to serialize duel")
            .map_err(StoreError::Backend)
    }
}

impl Drop for RedisDuelStore {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Only backend I/O failures are worth another attempt.
fn is_transient(err: &StoreError) -> bool {
    matches!(err, StoreError::Backend(_))
}

#[async_trait]
impl DuelStore for RedisDuelStore {
    async fn create(&self, mut duel: Duel) -> Result<Duel, StoreError> {
        duel.version = 0;
        let payload = Self::encode(&duel)?;
        let key = duel_key(&duel.id);
        let channel = changes_channel(&duel.id);

        let created: i32 = track_store_operation("create", "redis", async {
            let mut conn = self.redis.clone();
            redis::Script::new(CREATE_SCRIPT)
                .key(&key)
                .arg(&payload)
                .arg(self.ttl_seconds)
                .arg(&channel)
                .invoke_async(&mut conn)
                .await
                .context("Failed to execute duel create script")
                .map_err(StoreError::Backend)
        })
        .await?;

        if created == 0 {
            return Err(StoreError::AlreadyExists(duel.id));
        }

        tracing::debug!("Duel {} stored in Redis", duel.id);
        Ok(duel)
    }

    async fn get_by_id(&self, duel_id: &str) -> Result<Duel, StoreError> {
        let key = duel_key(duel_id);

        let json: Option<String> = retry_async_when(RetryConfig::default(), is_transient, || {
            track_store_operation("get", "redis", async {
                let mut conn = self.redis.clone();
                redis::cmd("GET")
                    .arg(&key)
                    .query_async(&mut conn)
                    .await
                    .context("Failed to get duel from Redis")
                    .map_err(StoreError::Backend)
            })
        })
        .await?;

        let json = json.ok_or_else(|| StoreError::NotFound(duel_id.to_string()))?;
        Self::decode(duel_id, &json)
    }

    async fn compare_and_swap(
        &self,
        duel_id: &str,
        expected_version: u64,
        mut next: Duel,
    ) -> Result<Duel, StoreError> {
        next.version = expected_version + 1;
        next.updated_at = chrono::Utc::now();
        let payload = Self::encode(&next)?;
        let key = duel_key(duel_id);
        let channel = changes_channel(duel_id);

        let outcome: i32 = track_store_operation("compare_and_swap", "redis", async {
            let mut conn = self.redis.clone();
            redis::Script::new(COMPARE_AND_SWAP_SCRIPT)
                .key(&key)
                .arg(expected_version)
                .arg(&payload)
                .arg(self.ttl_seconds)
                .arg(&channel)
                .invoke_async(&mut conn)
                .await
                .context("Failed to execute duel compare-and-swap script")
                .map_err(StoreError::Backend)
        })
        .await?;

        match outcome {
            1 => Ok(next),
            0 => Err(StoreError::Conflict(duel_id.to_string())),
            _ => Err(StoreError::NotFound(duel_id.to_string())),
        }
    }

    fn subscribe(&self, duel_id: &str) -> Subscription {
        self.hub.subscribe(duel_id)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        tokio::time::timeout(
            Duration::from_millis(500),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| StoreError::Backend(anyhow::anyhow!("Redis timeout after 500ms")))?
        .context("Redis PING failed")?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
