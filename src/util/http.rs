//! Outbound HTTP: the `PageFetcher` seam every storefront adapter goes through,
//! and the throttled `reqwest` implementation used in production.
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, instrument};

use crate::util::env::{env_opt, env_parse};

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Fetch a page body. Implementations must time out rather than hang.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn get(&self, url: &str) -> Result<String, FetchError>;

    async fn post_json(&self, url: &str, body: &Value) -> Result<String, FetchError>;
}

fn truncate_for_log(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut cut = max_len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}

#[derive(Clone, Debug)]
pub struct RateLimitSettings {
    interval: Duration,
}

impl RateLimitSettings {
    /// At most one request per `interval`; a zero interval disables throttling.
    pub fn one_per(interval: Duration) -> Self {
        Self { interval }
    }

    fn per_request_interval(&self) -> Option<Duration> {
        (!self.interval.is_zero()).then_some(self.interval)
    }
}

#[derive(Clone)]
pub struct RequestThrottle {
    settings: RateLimitSettings,
    state: Option<Arc<Mutex<Instant>>>,
}

impl RequestThrottle {
    pub fn new(settings: RateLimitSettings) -> Self {
        let state = settings
            .per_request_interval()
            .map(|_| Arc::new(Mutex::new(Instant::now())));
        Self { settings, state }
    }

    pub async fn wait(&self) {
        let Some(interval) = self.settings.per_request_interval() else {
            return;
        };

        let Some(state) = &self.state else {
            return;
        };

        let mut next_allowed = state.lock().await;
        let now = Instant::now();
        let wait_until = if now >= *next_allowed {
            now
        } else {
            *next_allowed
        };
        let sleep_duration = wait_until.saturating_duration_since(now);
        *next_allowed = wait_until + interval;
        drop(next_allowed);

        if !sleep_duration.is_zero() {
            sleep(sleep_duration).await;
        }
    }
}

#[derive(Clone, Debug)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub min_interval: Duration,
    pub user_agent: String,
}

impl HttpSettings {
    pub fn from_env() -> Self {
        Self {
            timeout: Duration::from_secs(env_parse("HTTP_TIMEOUT_SECS", 10u64)),
            min_interval: Duration::from_millis(env_parse("SCRAPE_DELAY_MS", 1000u64)),
            user_agent: env_opt("HTTP_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        }
    }
}

/// Production fetcher: one shared `reqwest` client, a request timeout and a
/// polite minimum interval between consecutive requests.
#[derive(Clone)]
pub struct HttpFetcher {
    http: Client,
    throttle: RequestThrottle,
}

impl HttpFetcher {
    pub fn new(settings: &HttpSettings) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.timeout)
            .build()?;
        Ok(Self {
            http,
            throttle: RequestThrottle::new(RateLimitSettings::one_per(settings.min_interval)),
        })
    }

    async fn read_body(url: &str, resp: reqwest::Response) -> Result<String, FetchError> {
        let status = resp.status();
        let body = resp.text().await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: truncate_for_log(body, 300),
            });
        }
        debug!(url, bytes = body.len(), "fetched page");
        Ok(body)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn get(&self, url: &str) -> Result<String, FetchError> {
        self.throttle.wait().await;
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;
        Self::read_body(url, resp).await
    }

    #[instrument(skip(self, body))]
    async fn post_json(&self, url: &str, body: &Value) -> Result<String, FetchError> {
        self.throttle.wait().await;
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;
        Self::read_body(url, resp).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use super::*;

    /// Canned responses keyed by URL. GETs always answer the same body; POSTs
    /// answer their queued bodies in order. Unknown URLs answer 404.
    #[derive(Default)]
    pub struct StaticFetcher {
        pages: HashMap<String, String>,
        posts: Mutex<HashMap<String, VecDeque<String>>>,
        requested: Mutex<Vec<String>>,
        posted: Mutex<Vec<Value>>,
    }

    impl StaticFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_page(mut self, url: &str, body: impl Into<String>) -> Self {
            self.pages.insert(url.to_string(), body.into());
            self
        }

        pub fn with_posts(self, url: &str, bodies: Vec<String>) -> Self {
            self.posts
                .lock()
                .unwrap()
                .insert(url.to_string(), bodies.into());
            self
        }

        pub fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }

        pub fn posted(&self) -> Vec<Value> {
            self.posted.lock().unwrap().clone()
        }

        fn not_found(url: &str) -> FetchError {
            FetchError::Status {
                url: url.to_string(),
                status: 404,
                body: String::new(),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for StaticFetcher {
        async fn get(&self, url: &str) -> Result<String, FetchError> {
            self.requested.lock().unwrap().push(url.to_string());
            self.pages.get(url).cloned().ok_or_else(|| Self::not_found(url))
        }

        async fn post_json(&self, url: &str, body: &Value) -> Result<String, FetchError> {
            self.requested.lock().unwrap().push(url.to_string());
            self.posted.lock().unwrap().push(body.clone());
            self.posts
                .lock()
                .unwrap()
                .get_mut(url)
                .and_then(VecDeque::pop_front)
                .ok_or_else(|| Self::not_found(url))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn throttle_sleeps_between_requests() {
        let settings = RateLimitSettings::one_per(Duration::from_millis(20));
        let delay = settings.per_request_interval().unwrap();
        let throttle = RequestThrottle::new(settings);

        // First call should be immediate.
        throttle.wait().await;

        let start = Instant::now();
        throttle.wait().await;
        let elapsed = start.elapsed();

        assert!(
            elapsed >= delay,
            "expected wait of at least {:?}, but got {:?}",
            delay,
            elapsed
        );
    }

    #[tokio::test]
    async fn zero_interval_disables_throttle() {
        let throttle = RequestThrottle::new(RateLimitSettings::one_per(Duration::ZERO));
        let start = Instant::now();
        for _ in 0..5 {
            throttle.wait().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn truncates_long_bodies_on_char_boundaries() {
        let body = "é".repeat(200);
        let cut = truncate_for_log(body, 301);
        assert!(cut.ends_with('…'));
        assert!(cut.len() <= 304);
    }

    #[tokio::test]
    async fn static_fetcher_answers_404_for_unknown_urls() {
        let fetcher = testing::StaticFetcher::new().with_page("https://a.test/1", "ok");
        assert_eq!(fetcher.get("https://a.test/1").await.unwrap(), "ok");
        let err = fetcher.get("https://a.test/2").await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        assert_eq!(fetcher.requested().len(), 2);
    }
}
