use redis::RedisResult;
use tracing::info;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    /// Opening the client does not connect; the first command does.
    pub fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        info!("Redis client configured");
        Ok(Self { client })
    }

    /// Counts one hit against `key` and returns `true` while the count is
    /// within `limit`. Keys come from [`rate_limit_key`], one per window, so
    /// the expiry only garbage-collects finished windows.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(within_limit(count, limit))
    }
}

/// Start of the fixed window containing `now_secs`.
pub fn window_start(now_secs: i64, window_seconds: i64) -> i64 {
    now_secs - now_secs.rem_euclid(window_seconds.max(1))
}

/// Counter key for `client` in the window containing `now_secs`.
pub fn rate_limit_key(client: &str, now_secs: i64, window_seconds: i64) -> String {
    format!("ratelimit:{}:{}", client, window_start(now_secs, window_seconds))
}

pub fn within_limit(count: i64, limit: i64) -> bool {
    count <= limit
}
