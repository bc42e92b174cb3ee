//! Walks a date range one day at a time, skipping days already recorded in
//! the checkpoint store and pausing politely between requests.

use crate::checkpoint::CheckpointStore;
use crate::config::{ScrapeConfig, DATE_FORMAT};
use crate::day_fetcher::DayFetch;
use crate::delay::Delay;
use crate::errors::ScraperError;
use crate::observation::{ObservationSink, OutputTable};
use chrono::{Days, Local, NaiveDate};
use log::{error, info, warn};
use rand::Rng;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Finished,
    Interrupted,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub completed: u64,
    pub total: u64,
    /// First day not yet processed when the run stopped.
    pub cursor: NaiveDate,
    /// Where a follow-up run should start, if anything is left to do.
    pub resume_from: Option<NaiveDate>,
    pub outcome: RunOutcome,
    pub output_path: PathBuf,
}

impl RunSummary {
    /// Command-line arguments that pick the run back up.
    pub fn resume_hint(&self) -> Option<String> {
        self.resume_from
            .map(|date| format!("--resume {}", date.format(DATE_FORMAT)))
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Completed scraping {}/{} days.", self.completed, self.total)?;
        write!(f, "All data saved to {}", self.output_path.display())?;
        if let Some(hint) = self.resume_hint() {
            write!(f, "\nTo resume, run with: {}", hint)?;
        }
        Ok(())
    }
}

pub struct RangeScheduler<F, D> {
    config: ScrapeConfig,
    fetcher: F,
    delay: D,
    checkpoints: CheckpointStore,
}

impl<F: DayFetch, D: Delay> RangeScheduler<F, D> {
    pub fn new(config: ScrapeConfig, fetcher: F, delay: D) -> Self {
        let checkpoints = CheckpointStore::new(config.checkpoint_path.clone());
        Self {
            config,
            fetcher,
            delay,
            checkpoints,
        }
    }

    pub async fn run(
        &mut self,
        resume_from: Option<NaiveDate>,
        force_rescrape: bool,
    ) -> Result<RunSummary, ScraperError> {
        self.run_until(resume_from, force_rescrape, std::future::pending())
            .await
    }

    /// Like [`run`](Self::run), but stops early once `shutdown` resolves.
    ///
    /// Errors are only returned for setup failures before the first day.
    /// Anything that goes wrong inside the loop ends the run with
    /// [`RunOutcome::Failed`] and still produces a summary.
    pub async fn run_until<S>(
        &mut self,
        resume_from: Option<NaiveDate>,
        force_rescrape: bool,
        shutdown: S,
    ) -> Result<RunSummary, ScraperError>
    where
        S: Future<Output = ()>,
    {
        let start_date = self.config.start_date;
        let end_date = self.config.end_date;

        if end_date > Local::now().date_naive() {
            warn!(
                "End date {} is in the future. Data for future dates may be forecasts or unavailable.",
                end_date
            );
        }

        if force_rescrape {
            self.checkpoints.clear()?;
        }
        let mut completed = self.checkpoints.load()?;

        let output_path = self.config.output_path();
        let resuming = resume_from.is_some() || (!force_rescrape && !completed.is_empty());
        let mut output = OutputTable::open(&output_path, resuming)?;

        let total = self.config.total_days();
        let mut completed_days = count_in_range(&completed, start_date, end_date);
        let mut current_date = resume_from.unwrap_or(start_date);

        tokio::pin!(shutdown);

        let outcome = loop {
            if current_date > end_date {
                break RunOutcome::Finished;
            }

            let key = current_date.format(DATE_FORMAT).to_string();
            if completed.contains(&key) && !force_rescrape {
                info!("Skipping {} - already scraped (use --force to override)", key);
                current_date = next_day(current_date);
                continue;
            }

            info!(
                "Processing date: {} ({}/{} completed)",
                key, completed_days, total
            );

            let success = tokio::select! {
                biased;
                _ = &mut shutdown => break RunOutcome::Interrupted,
                success = self.fetcher.fetch(current_date, &mut output) => success,
            };

            if success {
                if let Err(err) = self.record(current_date, &mut output) {
                    break RunOutcome::Failed(err.to_string());
                }
                if completed.insert(key) && (start_date..=end_date).contains(&current_date) {
                    completed_days += 1;
                }
            }

            current_date = next_day(current_date);

            if current_date <= end_date {
                let pause = self.politeness_delay();
                info!(
                    "Waiting {:.2} seconds before next date...",
                    pause.as_secs_f64()
                );
                tokio::select! {
                    biased;
                    _ = &mut shutdown => break RunOutcome::Interrupted,
                    _ = self.delay.wait(pause) => {}
                }
            }
        };

        if let Err(err) = output.flush() {
            warn!("Error flushing {}: {}", output_path.display(), err);
        }

        match &outcome {
            RunOutcome::Finished => {}
            RunOutcome::Interrupted => info!(
                "Interrupted by user. You can resume later from {}",
                current_date
            ),
            RunOutcome::Failed(message) => error!(
                "Unexpected error: {}. You can resume from {}",
                message, current_date
            ),
        }

        let resume_from = match outcome {
            RunOutcome::Interrupted | RunOutcome::Failed(_) => Some(current_date),
            RunOutcome::Finished => first_missing(&completed, start_date, end_date),
        };
        let summary = RunSummary {
            completed: completed_days,
            total,
            cursor: current_date,
            resume_from,
            outcome,
            output_path,
        };
        for line in summary.to_string().lines() {
            info!("{}", line);
        }
        Ok(summary)
    }

    /// Rows first, then the checkpoint, so a recorded day always has its data on disk.
    fn record(&self, date: NaiveDate, output: &mut OutputTable) -> Result<(), ScraperError> {
        output.flush()?;
        self.checkpoints.append(date)
    }

    fn politeness_delay(&self) -> Duration {
        let min = self.config.politeness_min_secs;
        let max = self.config.politeness_max_secs;
        let secs = if min < max {
            rand::thread_rng().gen_range(min..max)
        } else {
            min
        };
        Duration::from_secs_f64(secs)
    }
}

fn next_day(date: NaiveDate) -> NaiveDate {
    date.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX)
}

fn days_in_range(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |date| *date <= end)
}

fn first_missing(completed: &HashSet<String>, start: NaiveDate, end: NaiveDate) -> Option<NaiveDate> {
    days_in_range(start, end)
        .find(|date| !completed.contains(&date.format(DATE_FORMAT).to_string()))
}

fn count_in_range(completed: &HashSet<String>, start: NaiveDate, end: NaiveDate) -> u64 {
    days_in_range(start, end)
        .filter(|date| completed.contains(&date.format(DATE_FORMAT).to_string()))
        .count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::day_fetcher::DayFetcher;
    use crate::delay::RecordingDelay;
    use crate::observation::Observation;
    use crate::scraper_client::canned::CannedSessionFactory;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, day).unwrap()
    }

    fn config(dir: &Path, start: u32, end: u32) -> ScrapeConfig {
        ScrapeConfig {
            start_date: date(start),
            end_date: date(end),
            output_dir: dir.to_path_buf(),
            checkpoint_path: dir.join("progress.txt"),
            debug_dir: dir.join("debug"),
            ..ScrapeConfig::default()
        }
    }

    /// Writes one row per requested day; days listed in `failing` report no data.
    #[derive(Clone, Default)]
    struct ScriptedFetcher {
        failing: HashSet<NaiveDate>,
        calls: Arc<Mutex<Vec<NaiveDate>>>,
        interrupt_after_first: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    }

    impl ScriptedFetcher {
        fn calls(&self) -> Vec<NaiveDate> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DayFetch for ScriptedFetcher {
        async fn fetch(&mut self, date: NaiveDate, sink: &mut dyn ObservationSink) -> bool {
            self.calls.lock().unwrap().push(date);
            if let Some(interrupt) = self.interrupt_after_first.lock().unwrap().take() {
                let _ = interrupt.send(());
            }
            if self.failing.contains(&date) {
                return false;
            }
            sink.write(&Observation {
                date,
                time: "1:53 AM".to_string(),
                temperature: "40".to_string(),
            })
            .is_ok()
        }
    }

    fn checkpoint_lines(dir: &Path) -> Vec<String> {
        std::fs::read_to_string(dir.join("progress.txt"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_completed_days_are_skipped_without_delay() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("progress.txt"), "2025-02-16\n2025-02-17\n").unwrap();

        let fetcher = ScriptedFetcher::default();
        let delay = RecordingDelay::new();
        let mut scheduler =
            RangeScheduler::new(config(dir.path(), 16, 18), fetcher.clone(), delay.clone());

        let summary = scheduler.run(None, false).await.unwrap();

        assert_eq!(fetcher.calls(), vec![date(18)]);
        assert!(delay.waits().is_empty());
        assert_eq!(summary.completed, 3);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.resume_hint(), None);
    }

    #[tokio::test]
    async fn test_politeness_delay_between_days() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ScriptedFetcher::default();
        let delay = RecordingDelay::new();
        let mut scheduler =
            RangeScheduler::new(config(dir.path(), 16, 18), fetcher.clone(), delay.clone());

        scheduler.run(None, false).await.unwrap();

        let waits = delay.waits();
        assert_eq!(waits.len(), 2);
        for wait in waits {
            assert!(wait >= Duration::from_secs(10) && wait < Duration::from_secs(30));
        }
    }

    #[tokio::test]
    async fn test_end_to_end_three_days() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), 16, 18);
        let page = |temp: &str| {
            format!(
                r#"<div>Daily Observations</div>
                <table>
                    <tr><th>Time</th><th>Temperature</th></tr>
                    <tr><td>1:53 AM</td><td>{temp} °F</td></tr>
                    <tr><td>2:53 AM</td><td>{temp} °F</td></tr>
                </table>"#
            )
        };
        let pages: HashMap<String, String> = [(16, "41"), (17, "42"), (18, "43")]
            .into_iter()
            .map(|(day, temp)| (config.url_for(date(day)), page(temp)))
            .collect();
        let sessions = CannedSessionFactory::new(pages);
        let fetcher = DayFetcher::new(config.clone(), sessions.clone(), RecordingDelay::new())
            .unwrap();
        let mut scheduler = RangeScheduler::new(config.clone(), fetcher, RecordingDelay::new());

        let summary = scheduler.run(None, false).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::Finished);
        assert!(summary.to_string().contains("Completed scraping 3/3 days."));
        assert_eq!(checkpoint_lines(dir.path()).len(), 3);
        assert_eq!(sessions.closed(), 3);

        let mut reader = csv::Reader::from_path(config.output_path()).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec!["Date", "Time", "Temperature_F"]
        );
        let dates: HashSet<String> = reader
            .records()
            .map(|record| record.unwrap()[0].to_string())
            .collect();
        assert_eq!(dates.len(), 3);
        assert!(dates.contains("2025-02-18"));
        assert!(dir.path().join("debug/page_source_2025-02-17.html").is_file());
    }

    #[tokio::test]
    async fn test_interrupt_after_first_day() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = oneshot::channel();
        let fetcher = ScriptedFetcher {
            interrupt_after_first: Arc::new(Mutex::new(Some(tx))),
            ..ScriptedFetcher::default()
        };
        let delay = RecordingDelay::new();
        let mut scheduler =
            RangeScheduler::new(config(dir.path(), 16, 18), fetcher.clone(), delay.clone());

        let shutdown = async {
            let _ = rx.await;
        };
        let summary = scheduler.run_until(None, false, shutdown).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::Interrupted);
        assert_eq!(fetcher.calls(), vec![date(16)]);
        assert_eq!(checkpoint_lines(dir.path()), vec!["2025-02-16"]);
        assert_eq!(summary.cursor, date(17));
        assert_eq!(summary.resume_hint().as_deref(), Some("--resume 2025-02-17"));
        assert!(summary
            .to_string()
            .contains("To resume, run with: --resume 2025-02-17"));
        assert_eq!(summary.completed, 1);
    }

    #[tokio::test]
    async fn test_second_run_does_not_duplicate_checkpoint() {
        let dir = tempfile::tempdir().unwrap();

        for _ in 0..2 {
            let mut scheduler = RangeScheduler::new(
                config(dir.path(), 16, 16),
                ScriptedFetcher::default(),
                RecordingDelay::new(),
            );
            let summary = scheduler.run(None, false).await.unwrap();
            assert_eq!(summary.completed, 1);
        }

        assert_eq!(checkpoint_lines(dir.path()), vec!["2025-02-16"]);
    }

    #[tokio::test]
    async fn test_second_run_keeps_earlier_rows() {
        let dir = tempfile::tempdir().unwrap();
        let failing_first = ScriptedFetcher {
            failing: HashSet::from([date(17)]),
            ..ScriptedFetcher::default()
        };
        let mut scheduler = RangeScheduler::new(
            config(dir.path(), 16, 17),
            failing_first,
            RecordingDelay::new(),
        );
        let summary = scheduler.run(None, false).await.unwrap();
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.resume_hint().as_deref(), Some("--resume 2025-02-17"));

        let mut scheduler = RangeScheduler::new(
            config(dir.path(), 16, 17),
            ScriptedFetcher::default(),
            RecordingDelay::new(),
        );
        let summary = scheduler.run(None, false).await.unwrap();
        assert_eq!(summary.completed, 2);

        let output = std::fs::read_to_string(config(dir.path(), 16, 17).output_path()).unwrap();
        assert_eq!(output.lines().count(), 3);
        assert!(output.contains("2025-02-16"));
        assert!(output.contains("2025-02-17"));
    }

    #[tokio::test]
    async fn test_force_clears_checkpoint_and_refetches() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("progress.txt"), "2025-02-16\n2025-02-17\n").unwrap();

        let fetcher = ScriptedFetcher::default();
        let mut scheduler = RangeScheduler::new(
            config(dir.path(), 16, 17),
            fetcher.clone(),
            RecordingDelay::new(),
        );
        let summary = scheduler.run(None, true).await.unwrap();

        assert_eq!(fetcher.calls(), vec![date(16), date(17)]);
        assert_eq!(checkpoint_lines(dir.path()), vec!["2025-02-16", "2025-02-17"]);
        assert_eq!(summary.completed, 2);
    }

    #[tokio::test]
    async fn test_failed_day_is_not_retried_in_same_run() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ScriptedFetcher {
            failing: HashSet::from([date(17)]),
            ..ScriptedFetcher::default()
        };
        let mut scheduler = RangeScheduler::new(
            config(dir.path(), 16, 18),
            fetcher.clone(),
            RecordingDelay::new(),
        );

        let summary = scheduler.run(None, false).await.unwrap();

        assert_eq!(fetcher.calls(), vec![date(16), date(17), date(18)]);
        assert_eq!(checkpoint_lines(dir.path()), vec!["2025-02-16", "2025-02-18"]);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.outcome, RunOutcome::Finished);
        assert_eq!(summary.cursor, date(19));
        assert_eq!(summary.resume_from, Some(date(17)));
    }

    #[tokio::test]
    async fn test_resume_starts_at_given_date_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), 16, 18);
        std::fs::write(
            config.output_path(),
            "Date,Time,Temperature_F\n2025-02-16,1:53 AM,40\n",
        )
        .unwrap();

        let fetcher = ScriptedFetcher::default();
        let mut scheduler = RangeScheduler::new(config.clone(), fetcher.clone(), RecordingDelay::new());
        scheduler.run(Some(date(17)), false).await.unwrap();

        assert_eq!(fetcher.calls(), vec![date(17), date(18)]);
        let output = std::fs::read_to_string(config.output_path()).unwrap();
        assert_eq!(output.lines().count(), 4);
        assert_eq!(output.matches("Date,Time").count(), 1);
    }

    #[test]
    fn test_summary_display_without_resume() {
        let summary = RunSummary {
            completed: 3,
            total: 3,
            cursor: date(19),
            resume_from: None,
            outcome: RunOutcome::Finished,
            output_path: PathBuf::from("out.csv"),
        };
        assert_eq!(
            summary.to_string(),
            "Completed scraping 3/3 days.\nAll data saved to out.csv"
        );
    }
}
