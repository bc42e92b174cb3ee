use crate::errors::ScraperError;
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

const DEFAULT_URL_TEMPLATE: &str =
    "https://www.wunderground.com/history/daily/us/tx/grapevine/KDFW/date/{date}";

const DEFAULT_USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/92.0.4515.107 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:90.0) Gecko/20100101 Firefox/90.0",
];

/// Everything a scrape run needs to know up front: the date range, where the
/// pages live, and where output, progress and debug snapshots are written.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Page address with a `{date}` placeholder, filled with `YYYY-MM-DD`.
    pub url_template: String,
    pub output_prefix: String,
    pub output_dir: PathBuf,
    pub checkpoint_path: PathBuf,
    pub debug_dir: PathBuf,
    pub settle_delay_secs: u64,
    pub politeness_min_secs: f64,
    pub politeness_max_secs: f64,
    pub request_timeout_secs: u64,
    pub user_agents: Vec<String>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2025, 2, 16).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2025, 2, 22).unwrap_or_default(),
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            output_prefix: "dallas_temps".to_string(),
            output_dir: PathBuf::from("."),
            checkpoint_path: PathBuf::from("scraping_progress_new.txt"),
            debug_dir: PathBuf::from("debug"),
            settle_delay_secs: 15,
            politeness_min_secs: 10.0,
            politeness_max_secs: 30.0,
            request_timeout_secs: 60,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect(),
        }
    }
}

impl ScrapeConfig {
    /// Read a TOML config file. Missing keys fall back to the defaults.
    pub fn load(path: &Path) -> Result<Self, ScraperError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ScraperError> {
        let config: Self = toml::from_str(raw)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ScraperError> {
        if self.start_date > self.end_date {
            return Err(ScraperError::CustomError(format!(
                "start date {} is after end date {}",
                self.start_date, self.end_date
            )));
        }
        if self.user_agents.is_empty() {
            return Err(ScraperError::CustomError(
                "user agent pool must not be empty".to_string(),
            ));
        }
        // NaN compares false against everything, so check finiteness first.
        if !self.politeness_min_secs.is_finite()
            || !self.politeness_max_secs.is_finite()
            || self.politeness_min_secs < 0.0
            || self.politeness_min_secs > self.politeness_max_secs
        {
            return Err(ScraperError::CustomError(format!(
                "invalid politeness delay range {}..{}",
                self.politeness_min_secs, self.politeness_max_secs
            )));
        }
        if !self.url_template.contains("{date}") {
            return Err(ScraperError::CustomError(
                "url_template must contain a {date} placeholder".to_string(),
            ));
        }
        Ok(())
    }

    pub fn url_for(&self, date: NaiveDate) -> String {
        self.url_template
            .replace("{date}", &date.format(DATE_FORMAT).to_string())
    }

    /// `<prefix>_<YYYYMMDD>_to_<YYYYMMDD>_complete.csv` inside the output directory.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(format!(
            "{}_{}_to_{}_complete.csv",
            self.output_prefix,
            self.start_date.format("%Y%m%d"),
            self.end_date.format("%Y%m%d")
        ))
    }

    pub fn debug_path(&self, date: NaiveDate) -> PathBuf {
        self.debug_dir
            .join(format!("page_source_{}.html", date.format(DATE_FORMAT)))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn total_days(&self) -> u64 {
        ((self.end_date - self.start_date).num_days() + 1).max(0) as u64
    }
}

pub fn parse_date(text: &str) -> Result<NaiveDate, ScraperError> {
    Ok(NaiveDate::parse_from_str(text.trim(), DATE_FORMAT)?)
}
