use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tracing::{debug, trace, warn};

use crate::error::{CoreError, TransportError};

use super::super::{BackendRequest, BackendResponse, BackendTransport};
use super::connection::{join_path, parse_base_url};

/// Default number of extra attempts for repeatable requests.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Base delay between retries; attempt `n` waits `n` times this long.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Construction parameters for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub base_url: String,
    /// Outbound request rate cap; `None` disables limiting.
    pub requests_per_second: Option<u32>,
    /// Extra attempts for `send_and_retry` after the first one fails.
    pub max_retries: u32,
    /// Delay before the first retry; later retries wait proportionally longer.
    pub retry_backoff: Duration,
}

impl HttpTransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            requests_per_second: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// Backend transport over plain HTTP(S).
///
/// `send_and_retry` retries connection failures and 5xx responses up to
/// `max_retries` times with linear backoff. `send` never retries.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    limiter: Option<DirectRateLimiter>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, CoreError> {
        let base_url = parse_base_url(&config.base_url)?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(8)
            .tcp_nodelay(true)
            .build()
            .map_err(TransportError::Http)?;

        let limiter = match config.requests_per_second {
            None => None,
            Some(limit) => {
                let limit = NonZeroU32::new(limit).ok_or_else(|| {
                    CoreError::Config("requests_per_second must be at least 1".to_owned())
                })?;
                Some(RateLimiter::direct(Quota::per_second(limit)))
            }
        };

        Ok(Self {
            client,
            base_url,
            limiter,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn wait_for_rate_limit(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    async fn exchange(&self, request: &BackendRequest) -> Result<BackendResponse, CoreError> {
        self.wait_for_rate_limit().await;
        let url = join_path(&self.base_url, &request.path);
        debug!(http.method = %request.method, http.path = %request.path, "backend request");

        let mut builder = self.client.request(request.method.clone(), &url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(TransportError::from_reqwest)?;
        let status = response.status();
        let body = response.text().await.map_err(TransportError::Http)?;
        debug!(http.path = %request.path, %status, body_len = body.len(), "backend response");
        trace!(http.path = %request.path, body = %body, "backend response body");

        Ok(BackendResponse { status, body })
    }

    async fn exchange_cancellable(
        &self,
        request: &BackendRequest,
    ) -> Result<BackendResponse, CoreError> {
        match &request.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(CoreError::Cancelled),
                result = self.exchange(request) => result,
            },
            None => self.exchange(request).await,
        }
    }
}

#[async_trait]
impl BackendTransport for HttpTransport {
    async fn send(&self, request: BackendRequest) -> Result<BackendResponse, CoreError> {
        self.exchange_cancellable(&request).await
    }

    async fn send_and_retry(&self, request: BackendRequest) -> Result<BackendResponse, CoreError> {
        let mut attempt: u32 = 0;
        loop {
            let outcome = self.exchange_cancellable(&request).await;
            if attempt >= self.max_retries || !is_retryable(&outcome) {
                return outcome;
            }

            attempt += 1;
            match &outcome {
                Ok(resp) => warn!(
                    http.path = %request.path,
                    status = %resp.status,
                    attempt,
                    "backend returned server error; retrying"
                ),
                Err(err) => warn!(
                    http.path = %request.path,
                    error = %err,
                    attempt,
                    "backend request failed; retrying"
                ),
            }

            let delay = self.retry_backoff * attempt;
            match &request.cancel {
                Some(token) => tokio::select! {
                    _ = token.cancelled() => return Err(CoreError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                },
                None => tokio::time::sleep(delay).await,
            }
        }
    }
}

fn is_retryable(outcome: &Result<BackendResponse, CoreError>) -> bool {
    match outcome {
        Ok(resp) => resp.status.is_server_error(),
        Err(CoreError::Transport(_)) => true,
        Err(_) => false,
    }
}
