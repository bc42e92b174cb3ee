use chrono::{Local, NaiveDate};
use clap::Parser;
use dialoguer::Confirm;
use log::{error, info, warn};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use weather_scrape::config::{parse_date, ScrapeConfig};
use weather_scrape::day_fetcher::DayFetcher;
use weather_scrape::delay::TokioDelay;
use weather_scrape::errors::ScraperError;
use weather_scrape::scheduler::{RangeScheduler, RunOutcome};
use weather_scrape::scraper_client::{HttpSessionFactory, SessionFactory};

#[derive(Parser)]
#[command(
    name = "weather_scrape",
    about = "Scrape daily temperature history pages into a CSV"
)]
struct Cli {
    /// Resume from a specific date (YYYY-MM-DD)
    #[arg(long)]
    resume: Option<String>,
    /// Force re-scrape dates even if already scraped
    #[arg(long)]
    force: bool,
    /// TOML file overriding the built-in configuration
    #[arg(long)]
    config: Option<PathBuf>,
    /// First date of the range (YYYY-MM-DD)
    #[arg(long)]
    start: Option<String>,
    /// Last date of the range (YYYY-MM-DD)
    #[arg(long)]
    end: Option<String>,
    /// Don't ask before scraping dates in the future
    #[arg(long)]
    yes: bool,
    /// Fetch pages with plain HTTP requests instead of headless Chrome
    #[cfg(feature = "chrome")]
    #[arg(long)]
    http: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();

    let today = Local::now().date_naive();
    let confirm = || cli.yes || !std::io::stdin().is_terminal() || confirm_future_dates();
    let (config, resume_from) = match prepare(&cli, today, confirm) {
        Ok(Some(prepared)) => prepared,
        Ok(None) => {
            info!("Nothing to scrape.");
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            error!("{}", err);
            return ExitCode::from(1);
        }
    };

    if cli.force {
        info!("Force re-scrape flag set - will re-scrape dates even if already in progress file");
    }

    #[cfg(feature = "chrome")]
    if !cli.http {
        let sessions = weather_scrape::chrome_session::ChromeSessionFactory::new(true);
        return scrape(config, sessions, resume_from, cli.force).await;
    }

    let sessions = HttpSessionFactory::new(config.request_timeout());
    scrape(config, sessions, resume_from, cli.force).await
}

/// Builds the run configuration and validates everything the user typed.
///
/// `confirm` is only asked when the end date lies after `today`. `Ok(None)`
/// means declining left no dates to scrape.
fn prepare(
    cli: &Cli,
    today: NaiveDate,
    confirm: impl FnOnce() -> bool,
) -> Result<Option<(ScrapeConfig, Option<NaiveDate>)>, ScraperError> {
    let mut config = match &cli.config {
        Some(path) => ScrapeConfig::load(path)?,
        None => ScrapeConfig::default(),
    };

    if let Some(start) = &cli.start {
        config.start_date = parse_date(start).map_err(|err| invalid_date("--start", start, err))?;
    }
    if let Some(end) = &cli.end {
        config.end_date = parse_date(end).map_err(|err| invalid_date("--end", end, err))?;
    }
    let resume_from = match &cli.resume {
        Some(resume) => {
            let date = parse_date(resume).map_err(|err| invalid_date("--resume", resume, err))?;
            info!("Resuming from {}", date);
            Some(date)
        }
        None => None,
    };

    if config.end_date > today {
        warn!("End date ({}) is in the future.", config.end_date);
        if !clamp_end_date(&mut config, today, confirm()) {
            return Ok(None);
        }
    }

    config.validate()?;
    Ok(Some((config, resume_from)))
}

/// Pulls the end date back to `today` unless the user `confirmed` future
/// dates. Returns `false` when the range is empty afterwards.
fn clamp_end_date(config: &mut ScrapeConfig, today: NaiveDate, confirmed: bool) -> bool {
    if confirmed || config.end_date <= today {
        return true;
    }
    config.end_date = today;
    info!("Adjusted end date to today: {}", config.end_date);
    if config.start_date > config.end_date {
        warn!(
            "Start date ({}) is after today; nothing to scrape",
            config.start_date
        );
        return false;
    }
    true
}

fn invalid_date(flag: &str, value: &str, err: ScraperError) -> ScraperError {
    ScraperError::CustomError(format!(
        "Invalid date format for {flag}: {value}. Use YYYY-MM-DD format. ({err})"
    ))
}

fn confirm_future_dates() -> bool {
    Confirm::new()
        .with_prompt("Continue with future dates (data may be unavailable)?")
        .default(false)
        .interact()
        .unwrap_or(false)
}

async fn scrape<F: SessionFactory>(
    config: ScrapeConfig,
    sessions: F,
    resume_from: Option<NaiveDate>,
    force: bool,
) -> ExitCode {
    let fetcher = match DayFetcher::new(config.clone(), sessions, TokioDelay) {
        Ok(fetcher) => fetcher,
        Err(err) => {
            error!("{}", err);
            return ExitCode::from(1);
        }
    };
    let mut scheduler = RangeScheduler::new(config, fetcher, TokioDelay);

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    match scheduler.run_until(resume_from, force, shutdown).await {
        Ok(summary) => {
            println!("{}", summary);
            match summary.outcome {
                RunOutcome::Finished => ExitCode::SUCCESS,
                RunOutcome::Interrupted => ExitCode::from(130),
                RunOutcome::Failed(_) => ExitCode::from(1),
            }
        }
        Err(err) => {
            error!("{}", err);
            ExitCode::from(1)
        }
    }
}
