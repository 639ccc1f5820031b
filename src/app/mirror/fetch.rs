use std::thread;
use std::time::{Duration, Instant};

use crate::http::{
    Attempt, HttpTransport, RetryExhausted, RetryPolicy, TransportFailure, describe_status,
    retry_with_backoff,
};

/// Shown by the mirror in place of content when the cookie carries no login.
pub(crate) const UNAUTHENTICATED_MARKER: &str = "未登录";
/// Shown on reader pages when the sharer's credential could not be fetched.
pub(crate) const CREDENTIAL_FETCH_FAILED_MARKER: &str = "获取凭证出错";
pub(crate) const IMAGE_SOURCE_MARKER: &str = "src=\"http";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FetchOutcome {
    Success(String),
    AuthInvalid,
    Empty,
    PermanentError(String),
}

/// How a response body takes part in deciding the outcome of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyCheck {
    /// Listing pages: login and emptiness markers are terminal before the status is looked at.
    Listing,
    /// Reader pages: only transport and status gate the retry, the body is inspected later.
    Reader,
}

pub(crate) fn has_image_source(body: &str) -> bool {
    body.contains(IMAGE_SOURCE_MARKER)
}

pub(crate) fn classify_listing_body(body: &str) -> Option<FetchOutcome> {
    if body.contains(UNAUTHENTICATED_MARKER) {
        return Some(FetchOutcome::AuthInvalid);
    }
    if !has_image_source(body) {
        return Some(FetchOutcome::Empty);
    }
    None
}

pub(crate) fn is_sharer_session_expired(body: &str) -> bool {
    body.contains(CREDENTIAL_FETCH_FAILED_MARKER) && !has_image_source(body)
}

pub(crate) struct RetryingFetcher<T> {
    transport: T,
    policy: RetryPolicy,
    now: Box<dyn Fn() -> Instant>,
    sleep: Box<dyn Fn(Duration)>,
}

impl<T: HttpTransport> RetryingFetcher<T> {
    pub(crate) fn new(transport: T, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            now: Box::new(Instant::now),
            sleep: Box::new(thread::sleep),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_sleeper(mut self, sleep: impl Fn(Duration) + 'static) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    #[cfg(test)]
    pub(crate) fn with_clock(mut self, now: impl Fn() -> Instant + 'static) -> Self {
        self.now = Box::new(now);
        self
    }

    pub(crate) fn fetch(
        &self,
        url: &str,
        check: BodyCheck,
        label: &str,
    ) -> Result<FetchOutcome, RetryExhausted> {
        retry_with_backoff(
            &self.policy,
            label,
            self.now.as_ref(),
            self.sleep.as_ref(),
            |_| {
                let reply = match self.transport.post(url) {
                    Ok(reply) => reply,
                    Err(TransportFailure::Undecodable(reason)) => {
                        return Attempt::Done(FetchOutcome::PermanentError(reason));
                    }
                    Err(err) => return Attempt::Retry(err.to_string()),
                };

                if check == BodyCheck::Listing
                    && let Some(outcome) = classify_listing_body(&reply.body)
                {
                    return Attempt::Done(outcome);
                }
                if reply.status != 200 {
                    return Attempt::Retry(describe_status(&reply));
                }
                Attempt::Done(FetchOutcome::Success(reply.body))
            },
        )
    }
}
