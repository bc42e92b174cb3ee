use crate::errors::ScraperError;
use crate::observation::{Observation, ObservationSink};
use chrono::{Days, NaiveDate};
use log::{debug, info, warn};
use regex::Regex;
use scraper::{ElementRef, Selector};

/// Upstream tables list the first reading of the next day under the
/// fetched date.
pub const NEXT_DAY_TIME: &str = "12:53 AM";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOutcome {
    pub rows_written: usize,
    pub found: bool,
}

/// Turns an observation table into `(date, time, temperature)` rows.
pub struct TableExtractor {
    row_selector: Selector,
    cell_selector: Selector,
    unit_marker: Regex,
}

impl TableExtractor {
    pub fn new() -> Result<Self, ScraperError> {
        let row_selector =
            Selector::parse("tr").map_err(|err| ScraperError::SelectorError(err.to_string()))?;
        let cell_selector =
            Selector::parse("td").map_err(|err| ScraperError::SelectorError(err.to_string()))?;
        let unit_marker = Regex::new(r"\s*(?:°\s*[FfCc]?|[FfCc])$")?;

        Ok(Self {
            row_selector,
            cell_selector,
            unit_marker,
        })
    }

    /// Writes every time-stamped row of `table` to `sink`. The first row is
    /// treated as the header. A row the sink rejects is logged and skipped.
    pub fn extract(
        &self,
        table: ElementRef<'_>,
        target_date: NaiveDate,
        sink: &mut dyn ObservationSink,
    ) -> ExtractOutcome {
        let rows: Vec<ElementRef<'_>> = table.select(&self.row_selector).collect();
        debug!("Found {} rows in the table", rows.len());

        let mut outcome = ExtractOutcome::default();

        for (index, row) in rows.iter().enumerate().skip(1) {
            let mut cells = row.select(&self.cell_selector);
            let (Some(time_cell), Some(temp_cell)) = (cells.next(), cells.next()) else {
                continue;
            };

            let time = cell_text(time_cell);
            if !is_time_label(&time) {
                continue;
            }
            let temperature = self.strip_unit(&cell_text(temp_cell));

            let observation = Observation {
                date: row_date(target_date, &time),
                time,
                temperature,
            };
            if observation.date != target_date {
                info!(
                    "Assigning {} reading to next day ({})",
                    NEXT_DAY_TIME, observation.date
                );
            }

            match sink.write(&observation) {
                Ok(()) => {
                    debug!(
                        "Saved data: {} {}: {}°F",
                        observation.date, observation.time, observation.temperature
                    );
                    outcome.rows_written += 1;
                }
                Err(err) => warn!("Error processing row {}: {}", index, err),
            }
        }

        outcome.found = outcome.rows_written > 0;
        if outcome.found {
            info!(
                "Extracted {} temperature rows from the table",
                outcome.rows_written
            );
        } else {
            info!("No usable data found in this table");
        }
        outcome
    }

    fn strip_unit(&self, text: &str) -> String {
        self.unit_marker.replace(text, "").trim().to_string()
    }
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

fn is_time_label(text: &str) -> bool {
    text.contains(':') || text.contains("AM") || text.contains("PM")
}

/// Date a row belongs to. Only the exact [`NEXT_DAY_TIME`] label moves.
pub fn row_date(target_date: NaiveDate, time: &str) -> NaiveDate {
    if time == NEXT_DAY_TIME {
        target_date
            .checked_add_days(Days::new(1))
            .unwrap_or(target_date)
    } else {
        target_date
    }
}
