pub mod http;

use crate::model::{Message, Page};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use collector_core::retry::{retry_rate_limited, RetryPolicy};
use collector_core::Result;
use futures::Stream;
use std::collections::VecDeque;

pub use http::ApiClient;

/// The remote caps query ranges at two months; staying a month per window
/// keeps every request comfortably inside that limit no matter how stale
/// the checkpoint is.
const MAX_WINDOW_DAYS: i64 = 30;

/// Half-open time window `[start, end)` bounding one run's queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    /// Window end is "now minus the settle gap", capped to thirty days past
    /// the start. A stale checkpoint therefore advances a month per
    /// invocation instead of issuing a query the remote would reject.
    ///
    /// A checkpoint newer than "now minus the settle gap" would invert the
    /// window; the end is clamped to the start and the window comes back
    /// empty instead.
    pub fn compute(start: DateTime<Utc>, now: DateTime<Utc>, settle: Duration) -> Self {
        let end = std::cmp::min(now - settle, start + Duration::days(MAX_WINDOW_DAYS));
        Self {
            start,
            end: std::cmp::max(end, start),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// A paged supplier of message records. The HTTP client is the real
/// implementation; tests drive the pagination stream with scripted fakes.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch a single page. A rate-limited response surfaces as
    /// [`collector_core::Error::RateLimited`]; wrap the source in a
    /// [`RetryingSource`] to absorb those.
    async fn fetch_page(&self, window: &FetchWindow, offset: u32) -> Result<Page>;
}

#[async_trait]
impl PageSource for Box<dyn PageSource> {
    async fn fetch_page(&self, window: &FetchWindow, offset: u32) -> Result<Page> {
        self.as_ref().fetch_page(window, offset).await
    }
}

/// Builds the authenticated page source for one input run. The orchestrator
/// constructs sources through this seam, so runs can be driven end to end
/// without a live endpoint.
#[async_trait]
pub trait SourceFactory: Send + Sync {
    async fn connect(
        &self,
        input: &collector_core::config::InputConfig,
        secret: &str,
    ) -> Result<Box<dyn PageSource>>;
}

/// Production factory: a fresh [`ApiClient`], and therefore a fresh token,
/// per input per run.
pub struct HttpSourceFactory;

#[async_trait]
impl SourceFactory for HttpSourceFactory {
    async fn connect(
        &self,
        input: &collector_core::config::InputConfig,
        secret: &str,
    ) -> Result<Box<dyn PageSource>> {
        Ok(Box::new(ApiClient::connect(input, secret).await?))
    }
}

/// Decorates a [`PageSource`] with the rate-limit retry policy, so one 429
/// never aborts a run and never loses a page.
pub struct RetryingSource<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: PageSource> RetryingSource<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<S: PageSource> PageSource for RetryingSource<S> {
    async fn fetch_page(&self, window: &FetchWindow, offset: u32) -> Result<Page> {
        retry_rate_limited(&self.policy, "fetch_page", || {
            self.inner.fetch_page(window, offset)
        })
        .await
    }
}

struct PagerState {
    offset: u32,
    pending: VecDeque<Message>,
    exhausted: bool,
}

/// Lazy, pull-based sequence of messages across pages. Starts at offset 0
/// and keeps fetching while pages come back full (`count >= limit`); a short
/// or empty page ends the sequence. An empty window yields nothing without
/// touching the source, and nothing is fetched until the stream is polled.
pub fn message_stream(
    source: &dyn PageSource,
    window: FetchWindow,
    limit: u32,
) -> impl Stream<Item = Result<Message>> + '_ {
    let state = PagerState {
        offset: 0,
        pending: VecDeque::new(),
        exhausted: window.is_empty(),
    };

    futures::stream::try_unfold(state, move |mut state| async move {
        loop {
            if let Some(message) = state.pending.pop_front() {
                return Ok(Some((message, state)));
            }
            if state.exhausted {
                return Ok(None);
            }

            let page = source.fetch_page(&window, state.offset).await?;
            // An empty page ends pagination even if `count` claims a full
            // page; otherwise a lying remote would spin us forever.
            state.exhausted = page.count < limit || page.messages.is_empty();
            state.offset = page.offset + page.count;
            state.pending.extend(page.messages);
        }
    })
}
