//! RPC endpoint pool
//!
//! Per-chain JSON-RPC over HTTP with a global token-bucket rate limit,
//! endpoint rotation on transient failures, and a cooldown ladder for
//! rate-limited providers: short for free tiers, long for metered ones,
//! a day for monthly-quota exhaustion.
//!
//! Author: AI-Generated
//! Created: 2026-02-05

use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("http status {0}")]
    Http(u16),
    #[error("rate limited")]
    RateLimited,
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("all endpoints cooling down")]
    NoEndpoints,
    #[error("malformed response: {0}")]
    Decode(String),
}

/// How long a 429 puts an endpoint on ice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownClass {
    /// Free public providers: brief breather.
    Free,
    /// Metered providers (Alchemy-class): back off hard.
    Premium,
    /// "Monthly quota exceeded": out for the day.
    MonthlyQuota,
}

impl CooldownClass {
    pub fn duration(&self) -> Duration {
        match self {
            CooldownClass::Free => Duration::from_secs(30),
            CooldownClass::Premium => Duration::from_secs(5 * 60),
            CooldownClass::MonthlyQuota => Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Classify a 429 by provider URL and response body.
    pub fn classify(url: &str, body: &str) -> Self {
        let body_lower = body.to_ascii_lowercase();
        if body_lower.contains("monthly") && body_lower.contains("quota") {
            CooldownClass::MonthlyQuota
        } else if url.contains("alchemy") || url.contains("infura") {
            CooldownClass::Premium
        } else {
            CooldownClass::Free
        }
    }
}

/// Token bucket, refilled continuously. Requests-per-minute granularity.
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate_per_minute: u32) -> Self {
        let capacity = (rate_per_minute as f64 / 6.0).max(1.0); // 10 s burst
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: rate_per_minute as f64 / 60.0,
            last_refill: Instant::now(),
        }
    }

    /// Take one token, or say how long until one exists.
    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(deficit / self.refill_per_sec))
        }
    }
}

struct Endpoint {
    url: String,
    cooldown_until: Option<Instant>,
    consecutive_failures: u32,
}

impl Endpoint {
    fn available(&self, now: Instant) -> bool {
        self.cooldown_until.map(|t| now >= t).unwrap_or(true)
    }
}

/// Rotating endpoint pool for one chain.
pub struct EndpointPool {
    client: reqwest::Client,
    endpoints: Mutex<Vec<Endpoint>>,
    bucket: Mutex<TokenBucket>,
    cursor: AtomicU64,
    request_id: AtomicU64,
}

impl EndpointPool {
    pub fn new(urls: &[String], rate_limit_rpm: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoints: Mutex::new(
                urls.iter()
                    .map(|u| Endpoint {
                        url: u.clone(),
                        cooldown_until: None,
                        consecutive_failures: 0,
                    })
                    .collect(),
            ),
            bucket: Mutex::new(TokenBucket::new(rate_limit_rpm)),
            cursor: AtomicU64::new(0),
            request_id: AtomicU64::new(1),
        }
    }

    /// True when every endpoint is cooling down: the worker degrades to
    /// event-only mode until something recovers.
    pub async fn all_cooling(&self) -> bool {
        let now = Instant::now();
        let endpoints = self.endpoints.lock().await;
        !endpoints.iter().any(|e| e.available(now))
    }

    async fn take_rate_token(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                match bucket.try_take(Instant::now()) {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Next available endpoint url, round-robin past cooling ones.
    async fn pick(&self) -> Result<String, RpcError> {
        let now = Instant::now();
        let endpoints = self.endpoints.lock().await;
        if endpoints.is_empty() {
            return Err(RpcError::NoEndpoints);
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) as usize;
        for offset in 0..endpoints.len() {
            let candidate = &endpoints[(start + offset) % endpoints.len()];
            if candidate.available(now) {
                return Ok(candidate.url.clone());
            }
        }
        Err(RpcError::NoEndpoints)
    }

    async fn mark_cooldown(&self, url: &str, class: CooldownClass) {
        let mut endpoints = self.endpoints.lock().await;
        if let Some(ep) = endpoints.iter_mut().find(|e| e.url == url) {
            ep.cooldown_until = Some(Instant::now() + class.duration());
            warn!("endpoint {} cooling down ({:?})", url, class);
        }
    }

    async fn mark_failure(&self, url: &str) {
        let mut endpoints = self.endpoints.lock().await;
        if let Some(ep) = endpoints.iter_mut().find(|e| e.url == url) {
            ep.consecutive_failures += 1;
            // Repeated transport failures earn a short breather too.
            if ep.consecutive_failures >= 3 {
                ep.cooldown_until = Some(Instant::now() + Duration::from_secs(10));
                ep.consecutive_failures = 0;
            }
        }
    }

    async fn mark_success(&self, url: &str) {
        let mut endpoints = self.endpoints.lock().await;
        if let Some(ep) = endpoints.iter_mut().find(|e| e.url == url) {
            ep.consecutive_failures = 0;
        }
    }

    /// One JSON-RPC call with rotation: each endpoint gets one attempt
    /// before the error surfaces.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let attempts = { self.endpoints.lock().await.len().max(1) };
        let mut last_err = RpcError::NoEndpoints;
        for attempt in 0..attempts {
            self.take_rate_token().await;
            let url = self.pick().await?;
            match self.send(&url, method, params.clone()).await {
                Ok(value) => {
                    self.mark_success(&url).await;
                    return Ok(value);
                }
                Err(RpcError::RateLimited) => {
                    // Classified inside send(); try the next endpoint.
                    last_err = RpcError::RateLimited;
                }
                Err(err) => {
                    debug!("rpc attempt {} on {} failed: {}", attempt, url, err);
                    self.mark_failure(&url).await;
                    last_err = err;
                    tokio::time::sleep(Duration::from_millis(100 * (attempt as u64 + 1))).await;
                }
            }
        }
        Err(last_err)
    }

    async fn send(&self, url: &str, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let text = response.text().await.unwrap_or_default();
            self.mark_cooldown(url, CooldownClass::classify(url, &text))
                .await;
            return Err(RpcError::RateLimited);
        }
        if !status.is_success() {
            return Err(RpcError::Http(status.as_u16()));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| RpcError::Decode(e.to_string()))?;
        if let Some(err) = payload.get("error") {
            return Err(RpcError::Rpc {
                code: err.get("code").and_then(|c| c.as_i64()).unwrap_or(0),
                message: err
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
            });
        }
        payload
            .get("result")
            .cloned()
            .ok_or_else(|| RpcError::Decode("missing result".into()))
    }

    /// eth_blockNumber convenience.
    pub async fn block_number(&self) -> Result<u64, RpcError> {
        let result = self.request("eth_blockNumber", json!([])).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| RpcError::Decode("block number not a string".into()))?;
        u64::from_str_radix(hex.trim_start_matches("0x"), 16)
            .map_err(|e| RpcError::Decode(e.to_string()))
    }

    /// eth_call convenience returning raw bytes.
    pub async fn eth_call(
        &self,
        to: alloy::primitives::Address,
        data: &[u8],
    ) -> Result<Vec<u8>, RpcError> {
        let params = json!([
            {"to": format!("{:?}", to), "data": format!("0x{}", hex_encode(data))},
            "latest"
        ]);
        let result = self.request("eth_call", params).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| RpcError::Decode("eth_call result not a string".into()))?;
        hex_decode(hex.trim_start_matches("0x"))
            .ok_or_else(|| RpcError::Decode("bad hex in eth_call result".into()))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_classification() {
        assert_eq!(
            CooldownClass::classify("https://polygon-rpc.com", "too many requests"),
            CooldownClass::Free
        );
        assert_eq!(
            CooldownClass::classify("https://polygon-mainnet.g.alchemy.com/v2/key", "slow down"),
            CooldownClass::Premium
        );
        assert_eq!(
            CooldownClass::classify("https://rpc.ankr.com", "Monthly quota exceeded"),
            CooldownClass::MonthlyQuota
        );
        assert!(CooldownClass::MonthlyQuota.duration() > CooldownClass::Premium.duration());
        assert!(CooldownClass::Premium.duration() > CooldownClass::Free.duration());
    }

    #[test]
    fn test_token_bucket_enforces_rate() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(60); // 1/s, burst 10
        let mut granted = 0;
        for _ in 0..30 {
            if bucket.try_take(start).is_ok() {
                granted += 1;
            }
        }
        // Only the burst capacity is available instantly.
        assert_eq!(granted, 10);

        // After 5 seconds, ~5 more tokens.
        let later = start + Duration::from_secs(5);
        let mut granted_later = 0;
        for _ in 0..30 {
            if bucket.try_take(later).is_ok() {
                granted_later += 1;
            }
        }
        assert_eq!(granted_later, 5);
    }

    #[test]
    fn test_token_bucket_reports_wait() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(60);
        for _ in 0..10 {
            assert!(bucket.try_take(start).is_ok());
        }
        let wait = bucket.try_take(start).unwrap_err();
        assert!(wait > Duration::from_millis(500));
        assert!(wait <= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_all_cooling_detection() {
        let pool = EndpointPool::new(&["http://one".into(), "http://two".into()], 300);
        assert!(!pool.all_cooling().await);
        pool.mark_cooldown("http://one", CooldownClass::Free).await;
        assert!(!pool.all_cooling().await);
        pool.mark_cooldown("http://two", CooldownClass::Premium).await;
        assert!(pool.all_cooling().await);
    }

    #[tokio::test]
    async fn test_pick_skips_cooling_endpoints() {
        let pool = EndpointPool::new(&["http://one".into(), "http://two".into()], 300);
        pool.mark_cooldown("http://one", CooldownClass::Premium).await;
        for _ in 0..5 {
            assert_eq!(pool.pick().await.unwrap(), "http://two");
        }
    }

    #[test]
    fn test_hex_roundtrip() {
        let bytes = vec![0x09, 0x02, 0xf1, 0xac];
        assert_eq!(hex_encode(&bytes), "0902f1ac");
        assert_eq!(hex_decode("0902f1ac"), Some(bytes));
        assert_eq!(hex_decode(""), Some(vec![]));
        assert_eq!(hex_decode("abc"), None);
        assert_eq!(hex_decode("zz"), None);
    }
}
