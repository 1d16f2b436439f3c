//! Read-only snapshot lookup across several sources
//!
//! Each source reports its own outcome, so a caller can show partial results
//! ("6 of 9 sources responded") instead of a single verdict.

use crate::config::{DispatchMode, SourceConfig, SourceFormat};
use crate::dispatch::{Executor, RateLimiter};
use crate::outcome::{LookupResult, Outcome, SourceLookup, SubmissionResult};
use crate::services::{ServiceAdapter, ServiceProfile};
use crate::services::context::AdapterContext;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Adapter for a lookup-only aggregation service
pub struct AggregateAdapter {
    ctx: AdapterContext,
}

impl AggregateAdapter {
    pub fn new(
        profile: ServiceProfile,
        mode: DispatchMode,
        limiter: Arc<RateLimiter>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            ctx: AdapterContext::new(profile, mode, limiter, executor),
        }
    }

    async fn query_source(
        &self,
        source: &SourceConfig,
        target: &Url,
        deadline: Option<Instant>,
    ) -> SourceLookup {
        let url = self.ctx.profile.expand(&source.template, target, "");

        if source.format == SourceFormat::Link {
            return self.ctx.listing_source(&source.name, vec![url]);
        }

        let run = self
            .ctx
            .send_with_retry(deadline, |_, _| self.ctx.get(url.clone()))
            .await;
        let last = run.last;

        let (outcome, snapshots, message) = match source.format {
            SourceFormat::Reachable if last.outcome.is_success() => {
                (Outcome::Success, vec![url], "Listing available".to_string())
            }
            SourceFormat::MementoJson if last.status_code() == Some(404) => {
                (Outcome::Success, Vec::new(), "No captures found".to_string())
            }
            SourceFormat::MementoJson if last.outcome.is_success() => {
                match serde_json::from_str::<Value>(&last.body) {
                    Ok(document) => {
                        let uris = memento_uris(&document);
                        let message = format!("{} capture(s) found", uris.len());
                        (Outcome::Success, uris, message)
                    }
                    Err(e) => (
                        Outcome::PermanentError,
                        Vec::new(),
                        format!("Unreadable response from {}: {}", last.url, e),
                    ),
                }
            }
            _ => (last.outcome, Vec::new(), last.describe()),
        };

        tracing::debug!("{} source {}: {} ({})", self.ctx.name(), source.name, outcome, message);
        SourceLookup {
            source: source.name.clone(),
            outcome,
            snapshots,
            message,
        }
    }
}

/// Collects memento URIs from a TimeTravel JSON document
///
/// Reads `mementos.list[*].uri` and the `first`, `last`, `closest`, `prev` and
/// `next` entries; each `uri` may be a string or an array of strings.
/// Duplicates are dropped, first occurrence wins.
pub fn memento_uris(document: &Value) -> Vec<String> {
    let mementos = &document["mementos"];
    let mut uris: Vec<String> = Vec::new();

    let mut push = |value: &Value| {
        let candidates: Vec<&str> = match value {
            Value::String(uri) => vec![uri.as_str()],
            Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        for uri in candidates {
            if !uri.is_empty() && !uris.iter().any(|known| known == uri) {
                uris.push(uri.to_string());
            }
        }
    };

    if let Some(list) = mementos["list"].as_array() {
        for entry in list {
            push(&entry["uri"]);
        }
    }
    for key in ["first", "last", "closest", "prev", "next"] {
        push(&mementos[key]["uri"]);
    }

    uris
}

#[async_trait]
impl ServiceAdapter for AggregateAdapter {
    fn name(&self) -> &str {
        self.ctx.name()
    }

    fn profile(&self) -> &ServiceProfile {
        &self.ctx.profile
    }

    async fn submit(&self, _target: &Url, _deadline: Option<Instant>) -> SubmissionResult {
        SubmissionResult::new(
            self.ctx.name(),
            Outcome::PermanentError,
            0,
            Duration::ZERO,
            None,
            "Read-only lookup service; submissions are not supported",
        )
    }

    async fn lookup(&self, target: &Url, deadline: Option<Instant>) -> LookupResult {
        let started = Instant::now();
        let mut sources = Vec::with_capacity(self.ctx.profile.sources.len());

        for source in &self.ctx.profile.sources {
            sources.push(self.query_source(source, target, deadline).await);
        }

        let result = LookupResult {
            service: self.ctx.name().to_string(),
            sources,
            elapsed: started.elapsed(),
        };
        tracing::info!("{}: {}", self.ctx.name(), result.summary());
        result
    }
}
