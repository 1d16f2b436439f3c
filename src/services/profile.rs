use crate::config::{DispatchMode, ServiceConfig, ServiceKind, SourceConfig, SourceFormat};
use crate::dispatch::{BucketSpec, ClassificationRules, RetryPolicy};
use crate::url::{expand_template, origin_of};
use std::time::Duration;
use url::Url;

/// Immutable per-service settings, built once from configuration
#[derive(Debug, Clone)]
pub struct ServiceProfile {
    /// Service name, also the rate-limiter bucket name
    pub name: String,

    pub kind: ServiceKind,

    /// Requests per second
    pub rate: f64,

    pub burst: u32,

    /// Per-request timeout
    pub timeout: Duration,

    /// Submission endpoint templates, in rotation order
    pub endpoints: Vec<String>,

    pub check_endpoint: Option<String>,

    pub lookup_endpoint: Option<String>,

    pub retry_schedule: Vec<Duration>,

    pub max_total_wait: Duration,

    pub max_attempts: u32,

    pub shuffle_mirrors: bool,

    pub rules: ClassificationRules,

    pub sources: Vec<SourceConfig>,
}

impl ServiceProfile {
    /// Builds a profile from a validated service entry
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            name: config.name.clone(),
            kind: config.kind,
            rate: config.rate,
            burst: config.burst,
            timeout: Duration::from_millis(config.timeout_ms),
            endpoints: config.endpoints.clone(),
            check_endpoint: config.check_endpoint.clone(),
            lookup_endpoint: config.lookup_endpoint.clone(),
            retry_schedule: config
                .retry_schedule_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            max_total_wait: Duration::from_millis(config.max_total_wait_ms),
            max_attempts: config.max_attempts,
            shuffle_mirrors: config.shuffle_mirrors,
            rules: ClassificationRules::from_markers(&config.markers),
            sources: config.sources.clone(),
        }
    }

    pub fn bucket_spec(&self) -> BucketSpec {
        BucketSpec::new(self.rate, self.burst)
    }

    /// Limiter bucket for read-only requests (availability checks, confirmations)
    pub fn check_bucket(&self) -> String {
        format!("{}:check", self.name)
    }

    /// Retry policy for the given dispatch mode
    ///
    /// Basic mode makes exactly one attempt per operation.
    pub fn retry_policy(&self, mode: DispatchMode) -> RetryPolicy {
        match mode {
            DispatchMode::Enhanced => RetryPolicy::new(self.retry_schedule.clone())
                .with_max_attempts(self.max_attempts)
                .with_max_total_wait(self.max_total_wait),
            DispatchMode::Basic => RetryPolicy::single_attempt(),
        }
    }

    /// Origin of the first submission endpoint, used for `{origin}` in check
    /// and lookup templates
    pub fn primary_origin(&self) -> String {
        self.endpoints
            .first()
            .map(|endpoint| origin_of(endpoint))
            .unwrap_or_default()
    }

    /// Expands a template for `target` against `origin`
    pub fn expand(&self, template: &str, target: &Url, origin: &str) -> String {
        expand_template(template, target.as_str(), origin)
    }

    /// Describes the requests a submission would make, without sending any
    pub fn planned_requests(&self, target: &Url) -> Vec<String> {
        let origin = self.primary_origin();
        let mut plan = Vec::new();

        match self.kind {
            ServiceKind::Primary => {
                if let Some(check) = &self.check_endpoint {
                    plan.push(format!("GET  {}", self.expand(check, target, &origin)));
                }
                if let Some(endpoint) = self.endpoints.first() {
                    plan.push(format!(
                        "POST {} (url={})",
                        self.expand(endpoint, target, &origin_of(endpoint)),
                        target
                    ));
                }
            }
            ServiceKind::Mirror => {
                for endpoint in &self.endpoints {
                    plan.push(format!(
                        "POST {} (url={})",
                        self.expand(endpoint, target, &origin_of(endpoint)),
                        target
                    ));
                }
            }
            ServiceKind::Aggregate => {
                for source in &self.sources {
                    let url = self.expand(&source.template, target, "");
                    let verb = match source.format {
                        SourceFormat::Link => "LINK",
                        SourceFormat::Reachable | SourceFormat::MementoJson => "GET ",
                    };
                    plan.push(format!("{} {} ({})", verb, url, source.name));
                }
            }
        }

        plan
    }
}
