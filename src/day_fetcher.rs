use crate::config::ScrapeConfig;
use crate::delay::Delay;
use crate::errors::ScraperError;
use crate::observation::ObservationSink;
use crate::scraper_client::{random_user_agent, BrowserSession, SessionFactory};
use crate::table_extractor::TableExtractor;
use crate::table_locator::{default_locators, TableLocator};
use async_trait::async_trait;
use chrono::NaiveDate;
use log::{error, info, warn};
use scraper::Html;

/// Scrapes one day into a sink. `true` means at least one row was written.
///
/// Failures never escape: they are logged and reported as `false` so the
/// caller can move on to the next day.
#[async_trait]
pub trait DayFetch: Send {
    async fn fetch(&mut self, date: NaiveDate, sink: &mut dyn ObservationSink) -> bool;
}

pub struct DayFetcher<F, D> {
    config: ScrapeConfig,
    sessions: F,
    delay: D,
    extractor: TableExtractor,
    locators: Vec<Box<dyn TableLocator>>,
}

impl<F: SessionFactory, D: Delay> DayFetcher<F, D> {
    pub fn new(config: ScrapeConfig, sessions: F, delay: D) -> Result<Self, ScraperError> {
        Ok(Self {
            config,
            sessions,
            delay,
            extractor: TableExtractor::new()?,
            locators: default_locators(),
        })
    }

    async fn load_and_extract(
        &self,
        session: &mut dyn BrowserSession,
        date: NaiveDate,
        sink: &mut dyn ObservationSink,
    ) -> Result<bool, ScraperError> {
        let url = self.config.url_for(date);
        info!("Scraping data for {}", date);
        session.navigate(&url).await?;

        info!("Waiting for page to load...");
        self.delay.wait(self.config.settle_delay()).await;

        let markup = session.page_source().await?;
        self.save_snapshot(date, &markup).await?;

        Ok(self.extract_from_markup(&markup, date, sink))
    }

    async fn save_snapshot(&self, date: NaiveDate, markup: &str) -> Result<(), ScraperError> {
        let path = self.config.debug_path(date);
        tokio::fs::create_dir_all(&self.config.debug_dir).await?;
        tokio::fs::write(&path, markup).await?;
        info!("Saved page source to {}", path.display());
        Ok(())
    }

    /// Tries each locator in order and stops at the first table that yields rows.
    pub fn extract_from_markup(
        &self,
        markup: &str,
        date: NaiveDate,
        sink: &mut dyn ObservationSink,
    ) -> bool {
        let document = Html::parse_document(markup);

        for (index, locator) in self.locators.iter().enumerate() {
            info!("Method {}: looking for {}...", index + 1, locator.name());
            let tables = match locator.candidates(&document) {
                Ok(tables) => tables,
                Err(err) => {
                    warn!("Method {} failed: {}", index + 1, err);
                    continue;
                }
            };
            if tables.is_empty() {
                info!("Method {} found no table", index + 1);
                continue;
            }

            for table in tables {
                if self.extractor.extract(table, date, sink).found {
                    return true;
                }
            }
        }

        warn!("No data found for {}", date);
        false
    }
}

#[async_trait]
impl<F: SessionFactory, D: Delay> DayFetch for DayFetcher<F, D> {
    async fn fetch(&mut self, date: NaiveDate, sink: &mut dyn ObservationSink) -> bool {
        let user_agent = match random_user_agent(&self.config.user_agents) {
            Ok(user_agent) => user_agent.to_string(),
            Err(err) => {
                error!("Error initializing session: {}", err);
                return false;
            }
        };

        info!("Initializing session...");
        let mut session = match self.sessions.open(&user_agent).await {
            Ok(session) => session,
            Err(err) => {
                error!("Error initializing session: {}", err);
                return false;
            }
        };

        let result = self.load_and_extract(session.as_mut(), date, sink).await;

        if let Err(err) = session.close().await {
            warn!("Error closing session: {}", err);
        }

        match result {
            Ok(found) => found,
            Err(err) => {
                error!("Error accessing the page for {}: {}", date, err);
                false
            }
        }
    }
}
