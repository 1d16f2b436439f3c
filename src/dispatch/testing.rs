//! Scripted executor used by unit tests

use crate::dispatch::{ClassificationRules, Executor, HttpRequest};
use crate::outcome::{AttemptStatus, SubmissionAttempt, TransportErrorKind};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// What the scripted executor answers for one request
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Http {
        status: u16,
        body: String,
        final_url: Option<String>,
    },
    Transport(TransportErrorKind),
}

impl Reply {
    pub(crate) fn status(status: u16) -> Self {
        Self::Http {
            status,
            body: String::new(),
            final_url: None,
        }
    }

    pub(crate) fn ok(body: &str) -> Self {
        Self::Http {
            status: 200,
            body: body.to_string(),
            final_url: None,
        }
    }

    pub(crate) fn with_final_url(self, url: &str) -> Self {
        match self {
            Self::Http { status, body, .. } => Self::Http {
                status,
                body,
                final_url: Some(url.to_string()),
            },
            other => other,
        }
    }
}

type Handler = Box<dyn Fn(&HttpRequest, usize) -> Reply + Send + Sync>;

/// Executor answering from a closure and recording every request
pub(crate) struct ScriptedExecutor {
    handler: Handler,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Duration,
}

impl ScriptedExecutor {
    /// `handler` receives the request and its zero-based call index
    pub(crate) fn new(handler: impl Fn(&HttpRequest, usize) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Every call sleeps this long before answering
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(&self, request: &HttpRequest, rules: &ClassificationRules) -> SubmissionAttempt {
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len() - 1
        };
        let reply = (self.handler)(request, index);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match reply {
            Reply::Http {
                status,
                body,
                final_url,
            } => {
                let final_url = final_url.unwrap_or_else(|| request.url.clone());
                let outcome = rules.classify_response(status, &body, Some(&final_url));
                SubmissionAttempt {
                    url: request.url.clone(),
                    status: AttemptStatus::Http(status),
                    final_url: Some(final_url),
                    body,
                    retry_after: None,
                    elapsed: self.delay,
                    throttled: Duration::ZERO,
                    outcome,
                }
            }
            Reply::Transport(kind) => SubmissionAttempt {
                url: request.url.clone(),
                status: AttemptStatus::Transport(kind),
                final_url: None,
                body: kind.as_str().to_string(),
                retry_after: None,
                elapsed: self.delay,
                throttled: Duration::ZERO,
                outcome: rules.classify_transport(kind),
            },
        }
    }
}
