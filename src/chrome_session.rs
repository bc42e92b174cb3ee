//! Headless Chrome sessions for pages that only render their tables client-side.

use crate::errors::ScraperError;
use crate::scraper_client::{BrowserSession, SessionFactory};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use log::{debug, info};
use std::ffi::{OsStr, OsString};
use std::sync::Arc;

fn browser_error(err: impl std::fmt::Display) -> ScraperError {
    ScraperError::BrowserError(err.to_string())
}

/// Launches a separate browser process for every session.
pub struct ChromeSessionFactory {
    headless: bool,
}

impl ChromeSessionFactory {
    pub fn new(headless: bool) -> Self {
        Self { headless }
    }
}

#[async_trait]
impl SessionFactory for ChromeSessionFactory {
    async fn open(&self, user_agent: &str) -> Result<Box<dyn BrowserSession>, ScraperError> {
        info!("Initializing browser...");
        let agent_flag = OsString::from(format!("--user-agent={user_agent}"));
        let headless = self.headless;

        // Launching spawns and handshakes with a browser process; keep it off
        // the runtime threads.
        let (browser, tab) = tokio::task::spawn_blocking(move || {
            let args: Vec<&OsStr> = vec![
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
                agent_flag.as_os_str(),
            ];
            let options = LaunchOptions::default_builder()
                .headless(headless)
                .sandbox(false)
                .window_size(Some((1920, 1080)))
                .args(args)
                .build()
                .map_err(browser_error)?;
            let browser = Browser::new(options).map_err(browser_error)?;
            let tab = browser.new_tab().map_err(browser_error)?;
            Ok::<(Browser, Arc<Tab>), ScraperError>((browser, tab))
        })
        .await
        .map_err(browser_error)??;

        Ok(Box::new(ChromeSession { browser, tab }))
    }
}

pub struct ChromeSession {
    browser: Browser,
    tab: Arc<Tab>,
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), ScraperError> {
        let tab = Arc::clone(&self.tab);
        let url = url.to_string();

        tokio::task::spawn_blocking(move || {
            tab.navigate_to(&url).map_err(browser_error)?;
            tab.wait_until_navigated().map_err(browser_error)?;
            info!("Loaded URL: {}", url);
            Ok::<(), ScraperError>(())
        })
        .await
        .map_err(browser_error)?
    }

    async fn page_source(&mut self) -> Result<String, ScraperError> {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || tab.get_content().map_err(browser_error))
            .await
            .map_err(browser_error)?
    }

    async fn close(self: Box<Self>) -> Result<(), ScraperError> {
        let ChromeSession { browser, tab } = *self;
        // Best effort; dropping the browser kills the process either way.
        if let Err(err) = tab.close(false) {
            debug!("Tab close failed: {}", err);
        }
        drop(browser);
        info!("Browser closed");
        Ok(())
    }
}
