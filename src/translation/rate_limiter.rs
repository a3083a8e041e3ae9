/*!
 * Process-wide rate limiting.
 *
 * One `RateLimiter` exists per provider name and is shared by every
 * orchestrator in the process, so concurrent runs against the same provider
 * draw from the same request and token budgets. Each limiter holds two token
 * buckets (requests per minute, tokens per minute) sized to the provider's
 * grant multiplied by the safety margin.
 */

use log::debug;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::providers::RateLimits;

/// Default fraction of the provider grant actually used
pub const DEFAULT_SAFETY_MARGIN: f64 = 0.9;

static GLOBAL_REGISTRY: OnceCell<Arc<RateLimiterRegistry>> = OnceCell::new();

/// A refilling bucket of `capacity` units per minute
#[derive(Debug)]
struct Bucket {
    capacity: f64,
    available: f64,
}

impl Bucket {
    fn new(per_minute: u32, safety_margin: f64) -> Self {
        let capacity = (per_minute as f64 * safety_margin).floor().max(1.0);
        Self {
            capacity,
            available: capacity,
        }
    }

    fn refill(&mut self, elapsed: Duration) {
        let rate_per_sec = self.capacity / 60.0;
        self.available = (self.available + elapsed.as_secs_f64() * rate_per_sec).min(self.capacity);
    }

    /// Time until `amount` units are available
    fn wait_for(&self, amount: f64) -> Duration {
        if self.available >= amount {
            return Duration::ZERO;
        }
        let rate_per_sec = self.capacity / 60.0;
        Duration::from_secs_f64((amount - self.available) / rate_per_sec)
    }
}

#[derive(Debug)]
struct LimiterState {
    requests: Option<Bucket>,
    tokens: Option<Bucket>,
    last_refill: Instant,
}

/// Request and token budget of one provider
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(name: &str, limits: RateLimits, safety_margin: f64) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(LimiterState {
                requests: limits
                    .requests_per_minute
                    .filter(|rpm| *rpm > 0)
                    .map(|rpm| Bucket::new(rpm, safety_margin)),
                tokens: limits
                    .tokens_per_minute
                    .filter(|tpm| *tpm > 0)
                    .map(|tpm| Bucket::new(tpm, safety_margin)),
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Effective requests per minute after the safety margin
    pub fn effective_rpm(&self) -> Option<f64> {
        self.state.lock().requests.as_ref().map(|b| b.capacity)
    }

    /// Effective tokens per minute after the safety margin
    pub fn effective_tpm(&self) -> Option<f64> {
        self.state.lock().tokens.as_ref().map(|b| b.capacity)
    }

    /// Take one request and `tokens` tokens, or report how long to wait
    pub fn try_acquire(&self, tokens: usize) -> Result<(), Duration> {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill);
        state.last_refill = now;

        if let Some(bucket) = state.requests.as_mut() {
            bucket.refill(elapsed);
        }
        if let Some(bucket) = state.tokens.as_mut() {
            bucket.refill(elapsed);
        }

        // A batch larger than the whole budget waits for a full bucket
        let token_need = state
            .tokens
            .as_ref()
            .map(|b| (tokens as f64).min(b.capacity))
            .unwrap_or(0.0);

        let wait = state
            .requests
            .as_ref()
            .map(|b| b.wait_for(1.0))
            .unwrap_or(Duration::ZERO)
            .max(
                state
                    .tokens
                    .as_ref()
                    .map(|b| b.wait_for(token_need))
                    .unwrap_or(Duration::ZERO),
            );

        if !wait.is_zero() {
            return Err(wait);
        }

        if let Some(bucket) = state.requests.as_mut() {
            bucket.available -= 1.0;
        }
        if let Some(bucket) = state.tokens.as_mut() {
            bucket.available -= token_need;
        }
        Ok(())
    }

    /// Wait until one request carrying `tokens` tokens may be sent
    pub async fn acquire(&self, tokens: usize) {
        loop {
            match self.try_acquire(tokens) {
                Ok(()) => return,
                Err(wait) => {
                    debug!("Rate limiter {}: waiting {:?}", self.name, wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

/// One limiter per provider name
#[derive(Debug)]
pub struct RateLimiterRegistry {
    safety_margin: f64,
    limiters: Mutex<HashMap<String, Arc<RateLimiter>>>,
}

impl RateLimiterRegistry {
    pub fn new(safety_margin: f64) -> Self {
        Self {
            safety_margin,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide registry. The safety margin of the first call wins.
    pub fn global(safety_margin: f64) -> Arc<RateLimiterRegistry> {
        GLOBAL_REGISTRY
            .get_or_init(|| Arc::new(RateLimiterRegistry::new(safety_margin)))
            .clone()
    }

    pub fn safety_margin(&self) -> f64 {
        self.safety_margin
    }

    /// Limiter for a provider, created on first use
    pub fn limiter_for(&self, name: &str, limits: RateLimits) -> Arc<RateLimiter> {
        self.limiters
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::new(name, limits, self.safety_margin)))
            .clone()
    }
}

impl Default for RateLimiterRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SAFETY_MARGIN)
    }
}
