pub mod checkpoint;
#[cfg(feature = "chrome")]
pub mod chrome_session;
pub mod config;
pub mod day_fetcher;
pub mod delay;
pub mod errors;
pub mod observation;
pub mod scheduler;
pub mod scraper_client;
pub mod table_extractor;
pub mod table_locator;
