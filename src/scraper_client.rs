use crate::errors::ScraperError;
use async_trait::async_trait;
use log::{debug, info};
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;
use std::time::{Duration, Instant};

/// One isolated page-loading session. Opened per day and closed before the
/// next day starts; nothing is shared between sessions.
#[async_trait]
pub trait BrowserSession: Send {
    /// Load `url` in the session.
    async fn navigate(&mut self, url: &str) -> Result<(), ScraperError>;

    /// Markup of the currently loaded page.
    async fn page_source(&mut self) -> Result<String, ScraperError>;

    /// Release everything the session holds.
    async fn close(self: Box<Self>) -> Result<(), ScraperError>;
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, user_agent: &str) -> Result<Box<dyn BrowserSession>, ScraperError>;
}

/// Uniform pick from the user-agent pool.
pub fn random_user_agent(pool: &[String]) -> Result<&str, ScraperError> {
    pool.choose(&mut rand::thread_rng())
        .map(String::as_str)
        .ok_or_else(|| ScraperError::CustomError("user agent pool is empty".to_string()))
}

/// Plain HTTP sessions: a fresh client per session, so no connection pool
/// or cookies carry over between days.
pub struct HttpSessionFactory {
    timeout: Duration,
}

impl HttpSessionFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Browser-like headers for the session's client.
    fn default_headers(user_agent: &str) -> Result<HeaderMap, ScraperError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|err| ScraperError::CustomError(format!("Bad user agent: {err}")))?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        Ok(headers)
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    async fn open(&self, user_agent: &str) -> Result<Box<dyn BrowserSession>, ScraperError> {
        let client = Client::builder()
            .default_headers(Self::default_headers(user_agent)?)
            .timeout(self.timeout)
            .pool_max_idle_per_host(0)
            .build()?;

        Ok(Box::new(HttpSession {
            client,
            requests: 0,
            body: None,
        }))
    }
}

pub struct HttpSession {
    client: Client,
    requests: u64,
    body: Option<String>,
}

#[async_trait]
impl BrowserSession for HttpSession {
    async fn navigate(&mut self, url: &str) -> Result<(), ScraperError> {
        self.requests += 1;
        self.body = None;
        let start_time = Instant::now();

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScraperError::CustomError(format!(
                "Request to {} failed with status: {}",
                url, status
            )));
        }

        self.body = Some(response.text().await?);
        info!("Loaded URL: {} in {:?}", url, start_time.elapsed());
        Ok(())
    }

    async fn page_source(&mut self) -> Result<String, ScraperError> {
        self.body
            .clone()
            .ok_or_else(|| ScraperError::CustomError("No page loaded".to_string()))
    }

    async fn close(self: Box<Self>) -> Result<(), ScraperError> {
        debug!("Closing HTTP session after {} request(s)", self.requests);
        Ok(())
    }
}
