use thiserror::Error as ThisError;
#[derive(ThisError, Debug)]
pub enum ScraperError {
    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),
    #[error("Selector error: {0}")]
    SelectorError(String),
    #[error("Fetch error: {0}")]
    FetchError(#[from] reqwest::Error),
    #[error("Browser error: {0}")]
    BrowserError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Config error: {0}")]
    ConfigError(#[from] toml::de::Error),
    #[error("Invalid date: {0}")]
    DateError(#[from] chrono::ParseError),
    #[error("Error: {0}")]
    CustomError(String),
}
