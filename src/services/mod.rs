//! Service adapters
//!
//! Each adapter turns the generic `submit`/`lookup` operations into one
//! service's protocol, composing its [`ServiceProfile`], the shared
//! [`RateLimiter`] and a retry controller:
//!
//! - [`WaybackAdapter`]: availability check, save endpoint, verification
//! - [`MirrorAdapter`]: mirror rotation with CAPTCHA detection
//! - [`AggregateAdapter`]: read-only lookup across snapshot sources
//!
//! Adapters never fail: every problem becomes an [`Outcome`](crate::outcome::Outcome)
//! inside the returned result.

mod aggregate;
mod context;
mod mirror;
mod profile;
mod wayback;

pub use aggregate::{memento_uris, AggregateAdapter};
pub use mirror::MirrorAdapter;
pub use profile::ServiceProfile;
pub use wayback::WaybackAdapter;

use crate::config::{Config, DispatchMode, ServiceKind};
use crate::dispatch::{Executor, HttpExecutor, RateLimiter};
use crate::outcome::{LookupResult, SubmissionResult};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Instant;
use url::Url;

/// A per-service submit/lookup implementation
#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    /// Service name, unique within a dispatcher
    fn name(&self) -> &str;

    fn profile(&self) -> &ServiceProfile;

    /// Submits `target` for archiving
    ///
    /// Waits, retries and requests all stop at `deadline`, after which the
    /// result is `Timeout`.
    async fn submit(&self, target: &Url, deadline: Option<Instant>) -> SubmissionResult;

    /// Looks up historical snapshots of `target`
    async fn lookup(&self, target: &Url, deadline: Option<Instant>) -> LookupResult;
}

/// Builds the adapter matching a profile's kind
///
/// # Arguments
///
/// * `profile` - The service profile
/// * `mode` - Enhanced (retries, verification) or Basic (single attempt)
/// * `limiter` - The shared rate limiter
/// * `executor` - This adapter's executor; it should not be shared across services
pub fn build_adapter(
    profile: ServiceProfile,
    mode: DispatchMode,
    limiter: Arc<RateLimiter>,
    executor: Arc<dyn Executor>,
) -> Arc<dyn ServiceAdapter> {
    match profile.kind {
        ServiceKind::Primary => Arc::new(WaybackAdapter::new(profile, mode, limiter, executor)),
        ServiceKind::Mirror => Arc::new(MirrorAdapter::new(profile, mode, limiter, executor)),
        ServiceKind::Aggregate => Arc::new(AggregateAdapter::new(profile, mode, limiter, executor)),
    }
}

/// Builds one adapter per configured service, each with its own HTTP session
///
/// # Returns
///
/// * `Ok(Vec<...>)` - Adapters in configuration order
/// * `Err(reqwest::Error)` - An HTTP client could not be built
pub fn build_adapters(
    config: &Config,
    limiter: Arc<RateLimiter>,
) -> Result<Vec<Arc<dyn ServiceAdapter>>, reqwest::Error> {
    config
        .services
        .iter()
        .map(|service| {
            let executor: Arc<dyn Executor> = Arc::new(HttpExecutor::new(&config.user_agent)?);
            Ok(build_adapter(
                ServiceProfile::from_config(service),
                config.dispatcher.mode,
                Arc::clone(&limiter),
                executor,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::BucketSpec;

    #[test]
    fn test_build_adapters_from_defaults() {
        let config = Config::default();
        let limiter = Arc::new(RateLimiter::new(BucketSpec::new(1.0, 1)));
        let adapters = build_adapters(&config, limiter).unwrap();

        let names: Vec<&str> = adapters.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["wayback_machine", "archive_today", "memento"]);
        assert_eq!(adapters[1].profile().kind, ServiceKind::Mirror);
    }
}
