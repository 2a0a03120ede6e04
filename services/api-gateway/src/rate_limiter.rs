use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use redis::aio::ConnectionManager;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error(
        "rate limit bucket needs a positive replenish rate and burst \
         (got {replenish}/s, burst {burst})"
    )]
    InvalidBucket { replenish: u32, burst: u32 },
    #[error("rate limit backend failure: {0}")]
    Backend(#[from] redis::RedisError),
}

/// Token bucket shape: `replenish_per_second` tokens flow back each second,
/// at most `burst` may be held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketConfig {
    pub replenish_per_second: NonZeroU32,
    pub burst: NonZeroU32,
}

impl BucketConfig {
    pub fn new(replenish: u32, burst: u32) -> Result<Self, RateLimitError> {
        match (NonZeroU32::new(replenish), NonZeroU32::new(burst)) {
            (Some(replenish_per_second), Some(burst)) => Ok(Self {
                replenish_per_second,
                burst,
            }),
            _ => Err(RateLimitError::InvalidBucket { replenish, burst }),
        }
    }

    fn quota(&self) -> Quota {
        Quota::per_second(self.replenish_per_second).allow_burst(self.burst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// How long until the next token is available when rejected.
    pub retry_after: Duration,
}

impl RateDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            retry_after: Duration::ZERO,
        }
    }

    fn reject(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            retry_after,
        }
    }

    /// Whole seconds for the `Retry-After` header, never zero.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        if self.retry_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs.max(1)
        }
    }
}

/// Atomic take-one-token check for a client key.
#[async_trait]
pub trait RateLimiterEngine: Send + Sync {
    async fn check(&self, key: &str) -> Result<RateDecision, RateLimitError>;

    /// Drops state for keys whose bucket has refilled. Backends that expire
    /// keys on their own keep the default.
    fn prune(&self) {}
}

// ---------------- In-process implementation ----------------

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Keyed GCRA bucket held in this process. Replicas do not share counts.
pub struct GovernorRateLimiter {
    limiter: KeyedLimiter,
    clock: DefaultClock,
}

impl GovernorRateLimiter {
    pub fn new(config: BucketConfig) -> Self {
        let clock = DefaultClock::default();
        Self {
            limiter: RateLimiter::dashmap_with_clock(config.quota(), &clock),
            clock,
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.limiter.len()
    }
}

#[async_trait]
impl RateLimiterEngine for GovernorRateLimiter {
    async fn check(&self, key: &str) -> Result<RateDecision, RateLimitError> {
        match self.limiter.check_key(&key.to_string()) {
            Ok(()) => Ok(RateDecision::allow()),
            Err(not_until) => Ok(RateDecision::reject(
                not_until.wait_time_from(self.clock.now()),
            )),
        }
    }

    fn prune(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }
}

// ---------------- Redis implementation ----------------

/// Refills the bucket from the elapsed time, then takes one token if present.
/// Runs atomically on the server so replicas share one budget.
const TOKEN_BUCKET_SCRIPT: &str = r#"
local tokens_key = KEYS[1]
local timestamp_key = KEYS[2]
local rate = tonumber(ARGV[1])
local capacity = tonumber(ARGV[2])
local now_ms = tonumber(ARGV[3])

local ttl = math.max(1, math.ceil(capacity / rate) * 2)

local tokens = tonumber(redis.call("get", tokens_key))
if tokens == nil then
  tokens = capacity
end
local refreshed = tonumber(redis.call("get", timestamp_key))
if refreshed == nil then
  refreshed = 0
end

local elapsed = math.max(0, now_ms - refreshed) / 1000
local filled = math.min(capacity, tokens + elapsed * rate)
local allowed = 0
if filled >= 1 then
  filled = filled - 1
  allowed = 1
end

redis.call("setex", tokens_key, ttl, filled)
redis.call("setex", timestamp_key, ttl, now_ms)

local wait_ms = 0
if allowed == 0 then
  wait_ms = math.ceil((1 - filled) / rate * 1000)
end
return { allowed, wait_ms }
"#;

#[derive(Clone)]
pub struct RedisRateLimiter {
    manager: ConnectionManager,
    script: Arc<redis::Script>,
    config: BucketConfig,
    prefix: String,
}

impl RedisRateLimiter {
    pub async fn new(
        redis_url: &str,
        config: BucketConfig,
        prefix: String,
    ) -> Result<Self, RateLimitError> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self {
            manager,
            script: Arc::new(redis::Script::new(TOKEN_BUCKET_SCRIPT)),
            config,
            prefix,
        })
    }
}

#[async_trait]
impl RateLimiterEngine for RedisRateLimiter {
    async fn check(&self, key: &str) -> Result<RateDecision, RateLimitError> {
        let base = format!("{}:{{{}}}", self.prefix, key);
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let mut conn = self.manager.clone();
        let (allowed, wait_ms) = self
            .script
            .key(format!("{base}.tokens"))
            .key(format!("{base}.timestamp"))
            .arg(self.config.replenish_per_second.get())
            .arg(self.config.burst.get())
            .arg(now_ms)
            .invoke_async::<_, (i64, i64)>(&mut conn)
            .await?;
        if allowed == 1 {
            Ok(RateDecision::allow())
        } else {
            Ok(RateDecision::reject(Duration::from_millis(
                u64::try_from(wait_ms).unwrap_or_default(),
            )))
        }
    }
}

// ---------------- Bucket selection ----------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Auth,
    Api,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Auth => "auth",
            Bucket::Api => "api",
        }
    }
}

/// Stricter bucket for authentication endpoints, looser one for the rest.
#[derive(Clone)]
pub struct RateLimiters {
    auth: Arc<dyn RateLimiterEngine>,
    api: Arc<dyn RateLimiterEngine>,
    auth_prefix: String,
}

impl RateLimiters {
    pub fn new(
        auth: Arc<dyn RateLimiterEngine>,
        api: Arc<dyn RateLimiterEngine>,
        auth_prefix: impl Into<String>,
    ) -> Self {
        Self {
            auth,
            api,
            auth_prefix: auth_prefix.into(),
        }
    }

    pub fn in_process(
        auth: BucketConfig,
        api: BucketConfig,
        auth_prefix: impl Into<String>,
    ) -> Self {
        Self::new(
            Arc::new(GovernorRateLimiter::new(auth)),
            Arc::new(GovernorRateLimiter::new(api)),
            auth_prefix,
        )
    }

    pub async fn redis(
        redis_url: &str,
        prefix: &str,
        auth: BucketConfig,
        api: BucketConfig,
        auth_prefix: impl Into<String>,
    ) -> Result<Self, RateLimitError> {
        let auth_engine = RedisRateLimiter::new(redis_url, auth, format!("{prefix}:auth")).await?;
        let api_engine = RedisRateLimiter::new(redis_url, api, format!("{prefix}:api")).await?;
        Ok(Self::new(Arc::new(auth_engine), Arc::new(api_engine), auth_prefix))
    }

    pub fn prune(&self) {
        self.auth.prune();
        self.api.prune();
    }

    /// Prunes both buckets every `period` until the handle is aborted.
    pub fn spawn_pruning(&self, period: Duration) -> JoinHandle<()> {
        let limiters = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                limiters.prune();
            }
        })
    }

    pub fn bucket_for(&self, path: &str) -> Bucket {
        let prefix = self.auth_prefix.trim_end_matches('/');
        match path.strip_prefix(prefix) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => Bucket::Auth,
            _ => Bucket::Api,
        }
    }

    /// A failing backend lets the request through.
    pub async fn check(&self, path: &str, key: &str) -> (Bucket, RateDecision) {
        let bucket = self.bucket_for(path);
        let engine = match bucket {
            Bucket::Auth => &self.auth,
            Bucket::Api => &self.api,
        };
        match engine.check(key).await {
            Ok(decision) => {
                debug!(
                    bucket = bucket.as_str(),
                    key,
                    allowed = decision.allowed,
                    "rate limit check"
                );
                (bucket, decision)
            }
            Err(err) => {
                warn!(
                    error = %err,
                    bucket = bucket.as_str(),
                    "rate limiter unavailable; allowing request"
                );
                (bucket, RateDecision::allow())
            }
        }
    }
}

/// `user:<name>` for authenticated callers, `ip:<peer addr>` otherwise.
pub fn rate_limit_key(username: Option<&str>, client_ip: &str) -> String {
    match username.filter(|u| !u.is_empty()) {
        Some(user) => format!("user:{user}"),
        None => format!("ip:{client_ip}"),
    }
}
