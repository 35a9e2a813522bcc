// src/api/resilient.rs
//! Paced, classified, retried API calls.
//!
//! `ResilientClient::execute` is the only way the extractor talks to the
//! workspace. Each attempt takes a governor token, carries the request
//! timeout, and is classified: successes return parsed JSON, permanent
//! failures return at once, transient failures are retried with backoff
//! until the retry budget runs out.

use super::governor::RequestGovernor;
use super::retry::{RetryAttempt, RetryPolicy};
use super::types::NotionErrorBody;
use super::{ApiRequest, Authorizer, RawResponse, Transport};
use crate::config::ExtractionConfig;
use crate::constants::ERROR_BODY_PREVIEW_LENGTH;
use crate::error::{ApiFailure, AppError, FailureKind, NotionErrorCode};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Counters for calls made through one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientStats {
    /// Transport attempts, retries included
    pub calls: u64,
    pub successes: u64,
    pub retries: u64,
    /// Calls that ended in a permanent failure or an exhausted budget
    pub failures: u64,
}

#[derive(Default)]
struct ClientMetrics {
    calls: AtomicU64,
    successes: AtomicU64,
    retries: AtomicU64,
    failures: AtomicU64,
}

impl ClientMetrics {
    fn snapshot(&self) -> ClientStats {
        ClientStats {
            calls: self.calls.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// An attempt that did not succeed, with the server's pacing hint if any.
struct FailedAttempt {
    error: AppError,
    status: Option<u16>,
    retry_after: Option<Duration>,
}

pub struct ResilientClient {
    transport: Arc<dyn Transport>,
    governor: Arc<RequestGovernor>,
    authorizer: Arc<dyn Authorizer>,
    policy: RetryPolicy,
    request_timeout: Duration,
    metrics: ClientMetrics,
}

impl ResilientClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        governor: Arc<RequestGovernor>,
        authorizer: Arc<dyn Authorizer>,
        policy: RetryPolicy,
        request_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            governor,
            authorizer,
            policy,
            request_timeout,
            metrics: ClientMetrics::default(),
        }
    }

    /// Wires a client from configuration, authorizing with its credentials.
    pub fn from_config(
        config: &ExtractionConfig,
        transport: Arc<dyn Transport>,
        governor: Arc<RequestGovernor>,
    ) -> Self {
        Self::new(
            transport,
            governor,
            Arc::new(config.credentials.clone()),
            RetryPolicy::from_config(config),
            config.request_timeout_duration(),
        )
    }

    pub fn governor(&self) -> &Arc<RequestGovernor> {
        &self.governor
    }

    pub fn stats(&self) -> ClientStats {
        self.metrics.snapshot()
    }

    /// Performs the request, retrying transient failures.
    ///
    /// Returns the parsed JSON body of the first successful attempt. After
    /// `max_retries` retries the last failure is wrapped in
    /// `AppError::RetriesExhausted`.
    pub async fn execute(&self, request: &ApiRequest) -> Result<Value, AppError> {
        let endpoint = request.endpoint();
        let mut retries = 0u32;

        loop {
            self.governor.acquire().await;
            self.metrics.calls.fetch_add(1, Ordering::Relaxed);

            let failed = match self.attempt(request, &endpoint, retries + 1).await {
                Ok(value) => {
                    self.metrics.successes.fetch_add(1, Ordering::Relaxed);
                    return Ok(value);
                }
                Err(failed) => failed,
            };

            let trigger = match failed.error.kind() {
                Some(kind) if kind.is_recoverable() => kind,
                _ => {
                    self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                    log::debug!("{} failed permanently: {}", endpoint, failed.error);
                    return Err(failed.error);
                }
            };

            if retries >= self.policy.max_retries {
                self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "{} still failing after {} retries: {}",
                    endpoint,
                    retries,
                    failed.error
                );
                return Err(AppError::RetriesExhausted {
                    endpoint,
                    attempts: retries + 1,
                    last: Box::new(failed.error),
                });
            }

            let retry = RetryAttempt {
                attempt: retries + 1,
                delay: self.policy.delay_for(retries, failed.retry_after),
                trigger,
                status: failed.status,
            };
            log::warn!(
                "{} hit {} (status {:?}), retry {}/{} in {:?}",
                endpoint,
                retry.trigger,
                retry.status,
                retry.attempt,
                self.policy.max_retries,
                retry.delay
            );
            self.metrics.retries.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(retry.delay).await;
            retries += 1;
        }
    }

    async fn attempt(
        &self,
        request: &ApiRequest,
        endpoint: &str,
        attempt: u32,
    ) -> Result<Value, FailedAttempt> {
        let authorization = self.authorizer.authorization();
        let sent = tokio::time::timeout(
            self.request_timeout,
            self.transport.send(request, &authorization),
        )
        .await;

        let response = match sent {
            Ok(Ok(response)) => response,
            Ok(Err(transport_error)) => {
                return Err(FailedAttempt {
                    error: AppError::NetworkFailure {
                        endpoint: endpoint.to_string(),
                        message: transport_error.to_string(),
                    },
                    status: None,
                    retry_after: None,
                })
            }
            Err(_elapsed) => {
                return Err(FailedAttempt {
                    error: AppError::NetworkFailure {
                        endpoint: endpoint.to_string(),
                        message: format!("no response within {:?}", self.request_timeout),
                    },
                    status: None,
                    retry_after: None,
                })
            }
        };

        classify_response(response, endpoint, attempt)
    }
}

fn preview(body: &str) -> String {
    body.chars().take(ERROR_BODY_PREVIEW_LENGTH).collect()
}

/// Turns a raw response into parsed JSON or a classified failure.
///
/// `attempt` counts calls made for the request so far, this one included.
fn classify_response(
    response: RawResponse,
    endpoint: &str,
    attempt: u32,
) -> Result<Value, FailedAttempt> {
    if response.is_success() {
        return serde_json::from_str(&response.body).map_err(|e| FailedAttempt {
            error: AppError::MalformedResponse(format!(
                "{} returned non-JSON body ({}): {}",
                endpoint,
                e,
                preview(&response.body)
            )),
            status: Some(response.status),
            retry_after: None,
        });
    }

    let kind = FailureKind::from_status(response.status);
    let body = NotionErrorBody::parse(&response.body);
    let code = body
        .code
        .as_deref()
        .map(NotionErrorCode::from_api_response)
        .unwrap_or_else(|| NotionErrorCode::from_http_status(response.status));
    let failure = ApiFailure {
        endpoint: endpoint.to_string(),
        status: response.status,
        code,
        message: body.message.unwrap_or_else(|| preview(&response.body)),
        request_id: body.request_id.or(response.request_id),
        attempts: attempt,
    };

    Err(FailedAttempt {
        error: AppError::from_api_failure(kind, failure),
        status: Some(response.status),
        retry_after: if kind == FailureKind::RateLimited {
            response.retry_after
        } else {
            None
        },
    })
}
