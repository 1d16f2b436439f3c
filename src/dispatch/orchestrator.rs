//! Submission orchestrator - fan-out entry point
//!
//! This module validates the target, resolves the selected services, runs
//! each adapter on its own task and gathers every per-service result:
//! - Invalid URLs and selections are rejected before any network call
//! - One service's failure never stops the others
//! - An overall deadline turns unfinished adapters into `Timeout` results

use crate::config::Config;
use crate::dispatch::RateLimiter;
use crate::outcome::{
    LookupReport, LookupResult, Outcome, SourceLookup, SubmissionReport, SubmissionResult,
};
use crate::services::{build_adapters, ServiceAdapter};
use crate::url::validate_target_url;
use crate::DispatchError;
use chrono::Utc;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use url::Url;

/// Extra time an adapter gets past the deadline to report `Timeout` itself
const DEADLINE_GRACE: Duration = Duration::from_millis(250);

/// Main dispatcher structure
pub struct Orchestrator {
    adapters: BTreeMap<String, Arc<dyn ServiceAdapter>>,
    order: Vec<String>,
    limiter: Arc<RateLimiter>,
    deadline: Option<Duration>,
}

impl Orchestrator {
    /// Creates an orchestrator without adapters
    ///
    /// # Arguments
    ///
    /// * `limiter` - The rate limiter shared by all adapters
    /// * `deadline` - Default overall deadline for one fan-out
    pub fn new(limiter: Arc<RateLimiter>, deadline: Option<Duration>) -> Self {
        Self {
            adapters: BTreeMap::new(),
            order: Vec::new(),
            limiter,
            deadline,
        }
    }

    /// Builds an orchestrator with one HTTP-backed adapter per configured service
    pub fn from_config(config: &Config) -> Result<Self, DispatchError> {
        let limiter = Arc::new(RateLimiter::from_config(config));
        let adapters = build_adapters(config, Arc::clone(&limiter))?;

        let deadline = config.dispatcher.deadline_ms.map(Duration::from_millis);
        let orchestrator = adapters
            .into_iter()
            .fold(Self::new(limiter, deadline), |orchestrator, adapter| {
                orchestrator.with_adapter(adapter)
            });

        tracing::info!(
            "Dispatcher ready ({:?} mode): {}",
            config.dispatcher.mode,
            orchestrator.service_names().join(", ")
        );
        Ok(orchestrator)
    }

    /// Registers an adapter; a later adapter with the same name replaces the earlier one
    pub fn with_adapter(mut self, adapter: Arc<dyn ServiceAdapter>) -> Self {
        let name = adapter.name().to_string();
        if self.adapters.insert(name.clone(), adapter).is_none() {
            self.order.push(name);
        }
        self
    }

    /// Registered service names, in registration order
    pub fn service_names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn default_deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Resolves a selection to adapters, rejecting empty or unknown selections
    ///
    /// Duplicate names are submitted once.
    fn select<S: AsRef<str>>(
        &self,
        services: &[S],
    ) -> Result<Vec<Arc<dyn ServiceAdapter>>, DispatchError> {
        if services.is_empty() {
            return Err(DispatchError::InvalidInput("no services selected".to_string()));
        }

        let mut selected: Vec<Arc<dyn ServiceAdapter>> = Vec::new();
        for name in services {
            let name = name.as_ref().trim();
            let adapter = self.adapters.get(name).ok_or_else(|| {
                DispatchError::InvalidInput(format!(
                    "unknown service '{}' (available: {})",
                    name,
                    self.order.join(", ")
                ))
            })?;
            if !selected.iter().any(|known| known.name() == name) {
                selected.push(Arc::clone(adapter));
            }
        }
        Ok(selected)
    }

    fn validate(&self, target: &str) -> Result<Url, DispatchError> {
        validate_target_url(target).map_err(|e| {
            DispatchError::InvalidInput(format!("'{}' is not a valid target: {}", target, e))
        })
    }

    /// Submits `target` to every selected service, using the default deadline
    ///
    /// # Returns
    ///
    /// * `Ok(SubmissionReport)` - One result per selected service
    /// * `Err(DispatchError::InvalidInput)` - Bad URL or selection; nothing was sent
    pub async fn submit_all<S: AsRef<str>>(
        &self,
        target: &str,
        services: &[S],
    ) -> Result<SubmissionReport, DispatchError> {
        self.submit_all_with_deadline(target, services, self.deadline)
            .await
    }

    /// Submits `target` to every selected service
    ///
    /// Adapters run concurrently on their own tasks. When `deadline` passes,
    /// adapters still working report `Timeout`; finished results are kept.
    pub async fn submit_all_with_deadline<S: AsRef<str>>(
        &self,
        target: &str,
        services: &[S],
        deadline: Option<Duration>,
    ) -> Result<SubmissionReport, DispatchError> {
        let url = self.validate(target)?;
        let selected = self.select(services)?;
        let deadline = deadline.map(|d| Instant::now() + d);

        tracing::info!("Submitting {} to {} service(s)", url, selected.len());

        let results = fan_out(
            &selected,
            &url,
            deadline,
            |adapter, url, deadline| async move { adapter.submit(&url, deadline).await },
            |name, elapsed| SubmissionResult::timeout(name, 0, elapsed),
            |name| {
                SubmissionResult::new(
                    name,
                    Outcome::PermanentError,
                    0,
                    Duration::ZERO,
                    None,
                    "Adapter task failed unexpectedly",
                )
            },
        )
        .await;

        let report = SubmissionReport {
            target: url.to_string(),
            completed_at: Utc::now(),
            results,
        };
        tracing::info!(
            "Submission of {} finished: {}/{} succeeded",
            report.target,
            report.success_count(),
            report.results.len()
        );
        Ok(report)
    }

    /// Looks up snapshots of `target` on every selected service
    pub async fn lookup_all<S: AsRef<str>>(
        &self,
        target: &str,
        services: &[S],
    ) -> Result<LookupReport, DispatchError> {
        let url = self.validate(target)?;
        let selected = self.select(services)?;
        let deadline = self.deadline.map(|d| Instant::now() + d);

        tracing::info!("Looking up {} on {} service(s)", url, selected.len());

        let results = fan_out(
            &selected,
            &url,
            deadline,
            |adapter, url, deadline| async move { adapter.lookup(&url, deadline).await },
            |name, elapsed| {
                failed_lookup(
                    name,
                    Outcome::Timeout,
                    "Deadline reached before the lookup finished",
                    elapsed,
                )
            },
            |name| {
                failed_lookup(
                    name,
                    Outcome::PermanentError,
                    "Adapter task failed unexpectedly",
                    Duration::ZERO,
                )
            },
        )
        .await;

        Ok(LookupReport {
            target: url.to_string(),
            completed_at: Utc::now(),
            results,
        })
    }
}

fn failed_lookup(name: &str, outcome: Outcome, message: &str, elapsed: Duration) -> LookupResult {
    LookupResult {
        service: name.to_string(),
        sources: vec![SourceLookup {
            source: name.to_string(),
            outcome,
            snapshots: Vec::new(),
            message: message.to_string(),
        }],
        elapsed,
    }
}

/// Runs `operation` for every adapter on its own task and collects results by name
///
/// A task still running `DEADLINE_GRACE` after the deadline is replaced by
/// `on_timeout`; a task that panicked is replaced by `on_failure`.
async fn fan_out<T, Op, Fut, OnTimeout, OnFailure>(
    adapters: &[Arc<dyn ServiceAdapter>],
    url: &Url,
    deadline: Option<Instant>,
    operation: Op,
    on_timeout: OnTimeout,
    on_failure: OnFailure,
) -> BTreeMap<String, T>
where
    T: Send + 'static,
    Op: Fn(Arc<dyn ServiceAdapter>, Url, Option<Instant>) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    OnTimeout: Fn(&str, Duration) -> T + Clone + Send + 'static,
    OnFailure: Fn(&str) -> T,
{
    let mut tasks = JoinSet::new();

    for adapter in adapters {
        let name = adapter.name().to_string();
        let work = operation(Arc::clone(adapter), url.clone(), deadline);
        let on_timeout = on_timeout.clone();

        tasks.spawn(async move {
            let started = Instant::now();
            let result = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline + DEADLINE_GRACE, work).await {
                        Ok(result) => result,
                        Err(_) => {
                            tracing::warn!("{} did not stop at the deadline; reporting timeout", name);
                            on_timeout(&name, started.elapsed())
                        }
                    }
                }
                None => work.await,
            };
            (name, result)
        });
    }

    let mut results = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((name, result)) => {
                results.insert(name, result);
            }
            Err(e) => tracing::error!("Adapter task failed: {}", e),
        }
    }

    for adapter in adapters {
        if !results.contains_key(adapter.name()) {
            results.insert(adapter.name().to_string(), on_failure(adapter.name()));
        }
    }

    results
}
