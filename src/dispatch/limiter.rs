//! Per-service token-bucket rate limiting
//!
//! The limiter never sleeps on its own. `acquire` returns how long the caller
//! must wait; `until_ready` is the async convenience that does the sleeping.

use crate::config::Config;
use crate::dispatch::clock::{Clock, SystemClock};
use crate::dispatch::DeadlineReached;
use crate::services::ServiceProfile;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Tokens within this distance of 1.0 count as a whole token
const TOKEN_EPSILON: f64 = 1e-9;

/// Refill rate and burst capacity of one bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketSpec {
    /// Tokens added per second
    pub rate: f64,

    /// Maximum tokens held
    pub burst: u32,
}

impl BucketSpec {
    pub fn new(rate: f64, burst: u32) -> Self {
        Self { rate, burst }
    }
}

/// Token bucket state for one service
///
/// Tokens are refilled lazily from the elapsed time on every acquisition and
/// always stay within `[0, capacity]`. A new bucket starts full.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    capacity: f64,
    rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a full bucket
    pub fn new(spec: BucketSpec, now: Instant) -> Self {
        let capacity = f64::from(spec.burst.max(1));
        Self {
            tokens: capacity,
            capacity,
            rate: spec.rate,
            last_refill: now,
        }
    }

    /// Adds `elapsed * rate` tokens, capped at capacity
    ///
    /// A `now` earlier than the last refill adds nothing.
    pub fn refill(&mut self, now: Instant) {
        if now <= self.last_refill {
            return;
        }
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Takes one token if available
    ///
    /// # Returns
    ///
    /// * `Duration::ZERO` - A token was consumed; the request may proceed
    /// * Otherwise - Time until the next token accrues; nothing was consumed
    pub fn try_acquire(&mut self, now: Instant) -> Duration {
        self.refill(now);

        if self.tokens >= 1.0 - TOKEN_EPSILON {
            self.tokens = (self.tokens - 1.0).max(0.0);
            return Duration::ZERO;
        }

        let missing = 1.0 - self.tokens;
        Duration::try_from_secs_f64(missing / self.rate).unwrap_or(Duration::MAX)
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}

/// One named bucket plus its counters
#[derive(Debug)]
struct BucketSlot {
    bucket: Mutex<TokenBucket>,
    calls: AtomicU64,
    grants: AtomicU64,
}

/// Rate limiter holding one token bucket per service name
///
/// Each bucket is guarded by its own mutex, so services never contend with
/// each other. Unknown service names get a bucket built from the default spec.
#[derive(Debug)]
pub struct RateLimiter {
    slots: RwLock<HashMap<String, Arc<BucketSlot>>>,
    specs: HashMap<String, BucketSpec>,
    default_spec: BucketSpec,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Creates a limiter on the system clock
    ///
    /// # Arguments
    ///
    /// * `default_spec` - Bucket used for service names without their own spec
    pub fn new(default_spec: BucketSpec) -> Self {
        Self::with_clock(default_spec, Arc::new(SystemClock))
    }

    /// Creates a limiter reading time from `clock`
    pub fn with_clock(default_spec: BucketSpec, clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            specs: HashMap::new(),
            default_spec,
            clock,
        }
    }

    /// Builds a limiter with a submission bucket and a check bucket per
    /// configured service, both at the service's rate
    pub fn from_config(config: &Config) -> Self {
        let default_spec = BucketSpec::new(
            config.dispatcher.default_rate,
            config.dispatcher.default_burst,
        );
        config
            .services
            .iter()
            .map(ServiceProfile::from_config)
            .fold(Self::new(default_spec), |limiter, profile| {
                limiter
                    .with_bucket(&profile.name, profile.bucket_spec())
                    .with_bucket(&profile.check_bucket(), profile.bucket_spec())
            })
    }

    /// Registers a service-specific bucket spec
    pub fn with_bucket(mut self, service: &str, spec: BucketSpec) -> Self {
        self.specs.insert(service.to_string(), spec);
        self
    }

    /// Returns the spec applied to `service`
    pub fn spec_for(&self, service: &str) -> BucketSpec {
        self.specs
            .get(service)
            .copied()
            .unwrap_or(self.default_spec)
    }

    fn slot(&self, service: &str) -> Arc<BucketSlot> {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service)
        {
            return Arc::clone(slot);
        }

        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let spec = self.spec_for(service);
        let now = self.clock.now();
        let slot = slots.entry(service.to_string()).or_insert_with(|| {
            tracing::trace!(
                "Creating bucket for {} (rate {}/s, burst {})",
                service,
                spec.rate,
                spec.burst
            );
            Arc::new(BucketSlot {
                bucket: Mutex::new(TokenBucket::new(spec, now)),
                calls: AtomicU64::new(0),
                grants: AtomicU64::new(0),
            })
        });
        Arc::clone(slot)
    }

    /// Asks for permission to send one request to `service`
    ///
    /// Never blocks on time. Refill, check and consume happen under the
    /// service's mutex, so concurrent callers can never spend the same token.
    ///
    /// # Returns
    ///
    /// * `Duration::ZERO` - Permission granted (one token consumed)
    /// * Otherwise - How long to wait before asking again
    pub fn acquire(&self, service: &str) -> Duration {
        let slot = self.slot(service);
        slot.calls.fetch_add(1, Ordering::SeqCst);

        let wait = {
            let mut bucket = slot.bucket.lock().unwrap_or_else(PoisonError::into_inner);
            let wait = bucket.try_acquire(self.clock.now());
            tracing::trace!(
                "Bucket {}: {:.3}/{} tokens, wait {:?}",
                service,
                bucket.tokens(),
                bucket.capacity(),
                wait
            );
            wait
        };

        if wait.is_zero() {
            slot.grants.fetch_add(1, Ordering::SeqCst);
        }
        wait
    }

    /// Waits until a token for `service` is granted
    ///
    /// Sleeps for whatever `acquire` asks. Gives up without sleeping when the
    /// required wait would end at or after `deadline`. Requires a clock that
    /// advances with tokio time (the default [`SystemClock`]).
    ///
    /// # Returns
    ///
    /// * `Ok(slept)` - A token was granted after sleeping `slept` in total
    /// * `Err(DeadlineReached)` - The next token would arrive too late
    pub async fn until_ready(
        &self,
        service: &str,
        deadline: Option<tokio::time::Instant>,
    ) -> Result<Duration, DeadlineReached> {
        let mut slept = Duration::ZERO;
        loop {
            let wait = self.acquire(service);
            if wait.is_zero() {
                return Ok(slept);
            }

            if let Some(deadline) = deadline {
                let now = tokio::time::Instant::now();
                if now.checked_add(wait).map_or(true, |wake| wake >= deadline) {
                    tracing::debug!(
                        "Rate limit wait of {:?} for {} would pass the deadline",
                        wait,
                        service
                    );
                    return Err(DeadlineReached);
                }
            }

            tracing::debug!("Rate limited: waiting {:?} before contacting {}", wait, service);
            tokio::time::sleep(wait).await;
            slept += wait;
        }
    }

    /// Number of `acquire` calls made for `service`
    pub fn acquisitions(&self, service: &str) -> u64 {
        self.read_counter(service, |slot| &slot.calls)
    }

    /// Number of tokens granted (slots consumed) for `service`
    pub fn grants(&self, service: &str) -> u64 {
        self.read_counter(service, |slot| &slot.grants)
    }

    /// Number of `acquire` calls across all services
    pub fn total_acquisitions(&self) -> u64 {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|slot| slot.calls.load(Ordering::SeqCst))
            .sum()
    }

    /// Current token count for `service`, if its bucket exists
    pub fn tokens(&self, service: &str) -> Option<f64> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.get(service).map(|slot| {
            slot.bucket
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .tokens()
        })
    }

    fn read_counter(&self, service: &str, counter: impl Fn(&BucketSlot) -> &AtomicU64) -> u64 {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service)
            .map_or(0, |slot| counter(slot.as_ref()).load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::clock::ManualClock;
    use proptest::prelude::*;

    fn manual_limiter(spec: BucketSpec) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(BucketSpec::new(0.33, 2), clock.clone())
            .with_bucket("svc", spec);
        (limiter, clock)
    }

    #[test]
    fn test_bucket_starts_full() {
        let (limiter, _clock) = manual_limiter(BucketSpec::new(1.0, 3));
        for _ in 0..3 {
            assert_eq!(limiter.acquire("svc"), Duration::ZERO);
        }
        assert!(limiter.acquire("svc") > Duration::ZERO);
    }

    #[test]
    fn test_wait_is_time_to_next_token() {
        let (limiter, clock) = manual_limiter(BucketSpec::new(0.5, 1));
        assert_eq!(limiter.acquire("svc"), Duration::ZERO);

        let wait = limiter.acquire("svc");
        assert!((wait.as_secs_f64() - 2.0).abs() < 1e-6, "{:?}", wait);

        clock.advance(Duration::from_millis(500));
        let wait = limiter.acquire("svc");
        assert!((wait.as_secs_f64() - 1.5).abs() < 1e-6, "{:?}", wait);

        clock.advance(wait);
        assert_eq!(limiter.acquire("svc"), Duration::ZERO);
    }

    #[test]
    fn test_single_burst_enforces_full_spacing() {
        let (limiter, clock) = manual_limiter(BucketSpec::new(0.1, 1));
        assert_eq!(limiter.acquire("svc"), Duration::ZERO);
        clock.advance(Duration::from_secs(9));
        assert!(limiter.acquire("svc") > Duration::ZERO);
        clock.advance(Duration::from_secs(1));
        assert_eq!(limiter.acquire("svc"), Duration::ZERO);
    }

    #[test]
    fn test_refill_caps_at_burst() {
        let (limiter, clock) = manual_limiter(BucketSpec::new(2.0, 2));
        clock.advance(Duration::from_secs(3600));
        assert_eq!(limiter.acquire("svc"), Duration::ZERO);
        assert_eq!(limiter.acquire("svc"), Duration::ZERO);
        assert!(limiter.acquire("svc") > Duration::ZERO);
    }

    #[test]
    fn test_unknown_service_uses_default_bucket() {
        let (limiter, _clock) = manual_limiter(BucketSpec::new(1.0, 5));
        assert_eq!(limiter.spec_for("other"), BucketSpec::new(0.33, 2));
        assert_eq!(limiter.acquire("other"), Duration::ZERO);
        assert_eq!(limiter.acquire("other"), Duration::ZERO);
        assert!(limiter.acquire("other") > Duration::ZERO);
    }

    #[test]
    fn test_services_do_not_share_tokens() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(BucketSpec::new(0.1, 1), clock);
        assert_eq!(limiter.acquire("a"), Duration::ZERO);
        assert_eq!(limiter.acquire("b"), Duration::ZERO);
        assert!(limiter.acquire("a") > Duration::ZERO);
    }

    #[test]
    fn test_counters() {
        let (limiter, _clock) = manual_limiter(BucketSpec::new(1.0, 1));
        assert_eq!(limiter.acquisitions("svc"), 0);
        limiter.acquire("svc");
        limiter.acquire("svc");
        assert_eq!(limiter.acquisitions("svc"), 2);
        assert_eq!(limiter.grants("svc"), 1);
        assert_eq!(limiter.total_acquisitions(), 2);
    }

    #[test]
    fn test_no_double_spend_under_concurrency() {
        // Frozen clock: exactly `burst` grants no matter how many threads race
        let (limiter, _clock) = manual_limiter(BucketSpec::new(1.0, 5));
        let limiter = Arc::new(limiter);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| limiter.acquire("svc").is_zero())
                        .count()
                })
            })
            .collect();

        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 5);
        assert_eq!(limiter.grants("svc"), 5);
        assert_eq!(limiter.acquisitions("svc"), 16 * 50);
        assert!(limiter.tokens("svc").unwrap() >= 0.0);
    }

    #[test]
    fn test_from_config_registers_check_buckets() {
        let config = Config::default();
        let limiter = RateLimiter::from_config(&config);
        let profile = ServiceProfile::from_config(&config.services[0]);

        assert_eq!(limiter.spec_for(&profile.name), profile.bucket_spec());
        assert_eq!(limiter.spec_for(&profile.check_bucket()), profile.bucket_spec());

        // Reads and submissions keep separate tokens
        for _ in 0..profile.burst {
            assert_eq!(limiter.acquire(&profile.check_bucket()), Duration::ZERO);
        }
        assert_eq!(limiter.acquire(&profile.name), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_until_ready_sleeps_for_token() {
        let limiter = RateLimiter::new(BucketSpec::new(0.5, 1));
        let start = tokio::time::Instant::now();

        assert_eq!(limiter.until_ready("svc", None).await, Ok(Duration::ZERO));
        let slept = limiter.until_ready("svc", None).await.unwrap();

        let elapsed = start.elapsed();
        assert!(slept >= Duration::from_secs(2), "{:?}", slept);
        assert!(slept <= elapsed);
        assert!(elapsed >= Duration::from_secs(2), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(2100), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_until_ready_gives_up_before_deadline() {
        let limiter = RateLimiter::new(BucketSpec::new(0.1, 1));
        limiter.until_ready("svc", None).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        let result = limiter.until_ready("svc", Some(deadline)).await;
        assert_eq!(result, Err(DeadlineReached));
        // Gave up immediately instead of sleeping into the deadline
        assert!(tokio::time::Instant::now() < deadline);
    }

    proptest! {
        #[test]
        fn test_bucket_tokens_stay_in_bounds(
            rate in 0.01f64..50.0,
            burst in 1u32..10,
            steps in prop::collection::vec((0u64..5_000, 1usize..4), 1..100)
        ) {
            let clock = ManualClock::new();
            let mut bucket = TokenBucket::new(BucketSpec::new(rate, burst), clock.now());

            for (advance_ms, requests) in steps {
                clock.advance(Duration::from_millis(advance_ms));
                for _ in 0..requests {
                    let wait = bucket.try_acquire(clock.now());
                    prop_assert!(bucket.tokens() >= 0.0, "negative tokens: {}", bucket.tokens());
                    prop_assert!(bucket.tokens() <= f64::from(burst), "overfull: {}", bucket.tokens());
                    if !wait.is_zero() {
                        prop_assert!(bucket.tokens() < 1.0);
                    }
                }
            }
        }
    }
}
