use std::time::{Duration, Instant};

use thiserror::Error;

/// Exponential backoff bounded by the wall-clock time since the first
/// attempt, not by an attempt count. The wait before retry `n` is
/// `backoff_multiplier * 2^n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    pub(crate) max_total_delay: Duration,
    pub(crate) backoff_multiplier: Duration,
}

impl RetryPolicy {
    pub(crate) fn backoff_before_retry(&self, attempt: u32) -> Duration {
        let factor = 2_u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.backoff_multiplier.saturating_mul(factor)
    }
}

#[derive(Debug)]
pub(crate) enum Attempt<T> {
    Done(T),
    Retry(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("request failed after {attempts} attempt(s) in {elapsed_ms} ms: {last_error}")]
pub(crate) struct RetryExhausted {
    pub(crate) attempts: u32,
    pub(crate) elapsed_ms: u128,
    pub(crate) last_error: String,
}

/// Gives up once the time since the first attempt plus the next backoff
/// would pass `max_total_delay`. Time spent inside attempts counts too.
pub(crate) fn retry_with_backoff<T>(
    policy: &RetryPolicy,
    label: &str,
    now: &dyn Fn() -> Instant,
    sleep: &dyn Fn(Duration),
    mut attempt: impl FnMut(u32) -> Attempt<T>,
) -> Result<T, RetryExhausted> {
    let started = now();
    let mut current = 1_u32;

    loop {
        let reason = match attempt(current) {
            Attempt::Done(value) => return Ok(value),
            Attempt::Retry(reason) => reason,
        };

        let delay = policy.backoff_before_retry(current);
        let elapsed = now().saturating_duration_since(started);
        if elapsed.saturating_add(delay) > policy.max_total_delay {
            return Err(RetryExhausted {
                attempts: current,
                elapsed_ms: elapsed.as_millis(),
                last_error: reason,
            });
        }

        log::warn!(
            "{label}: attempt {current} failed ({reason}), retrying in {} ms",
            delay.as_millis()
        );
        sleep(delay);
        current += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HttpReply {
    pub(crate) status: u16,
    pub(crate) body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum TransportFailure {
    #[error("transport error: {0}")]
    Network(String),
    #[error("response decode failed: {0}")]
    Undecodable(String),
}

/// One HTTP round trip. Non-2xx statuses are replies, not failures.
pub(crate) trait HttpTransport {
    fn post(&self, url: &str) -> Result<HttpReply, TransportFailure>;
}

pub(crate) struct UreqTransport {
    agent: ureq::Agent,
    headers: Vec<(String, String)>,
}

impl UreqTransport {
    pub(crate) fn new(timeout: Duration, headers: Vec<(String, String)>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Self { agent, headers }
    }
}

impl HttpTransport for UreqTransport {
    fn post(&self, url: &str) -> Result<HttpReply, TransportFailure> {
        let mut request = self.agent.post(url);
        for (key, value) in &self.headers {
            request = request.set(key, value);
        }

        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(err)) => {
                return Err(TransportFailure::Network(err.to_string()));
            }
        };

        let status = response.status();
        match response.into_string() {
            Ok(body) => Ok(HttpReply { status, body }),
            Err(err) => Err(TransportFailure::Undecodable(err.to_string())),
        }
    }
}

pub(crate) fn describe_status(reply: &HttpReply) -> String {
    let body = reply.body.trim();
    if body.is_empty() {
        format!("HTTP status {}", reply.status)
    } else {
        let truncated = body.chars().take(240).collect::<String>();
        format!("HTTP status {} ({truncated})", reply.status)
    }
}
