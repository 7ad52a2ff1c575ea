//! Redis-backed challenge store for multi-instance deployments.
//!
//! Each challenge lives at `otp:{identity}` as JSON. Keys outlive the OTP
//! window by `EXPIRY_GRACE_SECS` so a late verification still reports
//! `Expired`; Redis reclaims them afterwards even if no sweep runs.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use quad_common::Challenge;
use quad_common::constants::redis_keys::OTP_PREFIX;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::store::ChallengeStore;

/// Extra key lifetime past `expires_at`
const EXPIRY_GRACE_SECS: i64 = 60;

/// Keys fetched per SCAN round
const SCAN_BATCH: usize = 200;

/// KEYS[1] = challenge key, ARGV[1] = expected JSON, ARGV[2] = next JSON or "",
/// ARGV[3] = TTL seconds for the next value
static COMPARE_AND_SWAP: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r"
        local current = redis.call('GET', KEYS[1])
        if current ~= ARGV[1] then
            return 0
        end
        if ARGV[2] == '' then
            redis.call('DEL', KEYS[1])
        else
            redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
        end
        return 1
        ",
    )
});

/// KEYS[1] = challenge key, ARGV[1] = now (Unix seconds)
static DELETE_IF_EXPIRED: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r"
        local current = redis.call('GET', KEYS[1])
        if not current then
            return 0
        end
        local challenge = cjson.decode(current)
        if tonumber(ARGV[1]) > tonumber(challenge.expires_at) then
            redis.call('DEL', KEYS[1])
            return 1
        end
        return 0
        ",
    )
});

/// Challenge store on a shared Redis
pub struct RedisChallengeStore {
    /// Redis connection manager (auto-reconnecting)
    redis: ConnectionManager,
}

impl RedisChallengeStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    /// Connect to Redis and build the store
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let redis = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self::new(redis))
    }

    /// Collect every challenge key with SCAN (never KEYS)
    async fn scan_keys(&self) -> Result<Vec<String>> {
        let mut conn = self.redis.clone();
        let pattern = format!("{OTP_PREFIX}*");
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .context("Failed to scan challenge keys")?;

            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(keys)
    }
}

/// Redis key for an identity
fn challenge_key(identity: &str) -> String {
    format!("{OTP_PREFIX}{identity}")
}

/// Key lifetime for a challenge written at `now`
fn key_ttl_secs(challenge: &Challenge, now: i64) -> u64 {
    (challenge.expires_at - now + EXPIRY_GRACE_SECS).max(1) as u64
}

#[async_trait]
impl ChallengeStore for RedisChallengeStore {
    async fn get(&self, identity: &str) -> Result<Option<Challenge>> {
        let mut conn = self.redis.clone();
        let stored: Option<String> = conn
            .get(challenge_key(identity))
            .await
            .context("Failed to read challenge")?;

        match stored {
            Some(data) => Ok(Some(
                serde_json::from_str(&data).context("Corrupt challenge record")?,
            )),
            None => Ok(None),
        }
    }

    async fn put(&self, challenge: Challenge) -> Result<()> {
        let mut conn = self.redis.clone();
        let ttl = key_ttl_secs(&challenge, chrono::Utc::now().timestamp());
        let value = serde_json::to_string(&challenge)?;

        conn.set_ex::<_, _, ()>(challenge_key(&challenge.identity), value, ttl)
            .await
            .context("Failed to store challenge")?;

        Ok(())
    }

    async fn compare_and_swap(
        &self,
        expected: &Challenge,
        next: Option<Challenge>,
    ) -> Result<bool> {
        let mut conn = self.redis.clone();
        let now = chrono::Utc::now().timestamp();

        // Records are written by serde_json from the same struct, so the
        // stored bytes equal the re-serialized expected value
        let expected_json = serde_json::to_string(expected)?;
        let (next_json, ttl) = match next {
            Some(ref challenge) => (serde_json::to_string(challenge)?, key_ttl_secs(challenge, now)),
            None => (String::new(), 0),
        };

        let swapped: i32 = COMPARE_AND_SWAP
            .key(challenge_key(&expected.identity))
            .arg(expected_json)
            .arg(next_json)
            .arg(ttl)
            .invoke_async(&mut conn)
            .await
            .context("Failed to update challenge")?;

        Ok(swapped == 1)
    }

    async fn purge_expired(&self, now: i64) -> Result<usize> {
        let mut conn = self.redis.clone();
        let mut removed = 0;

        for key in self.scan_keys().await? {
            let deleted: i32 = DELETE_IF_EXPIRED
                .key(&key)
                .arg(now)
                .invoke_async(&mut conn)
                .await
                .context("Failed to purge challenge")?;
            if deleted == 1 {
                removed += 1;
            }
        }

        Ok(removed)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.scan_keys().await?.len())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.redis.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis PING failed")?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
