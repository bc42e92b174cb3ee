use crate::config::DATE_FORMAT;
use crate::errors::ScraperError;
use chrono::NaiveDate;
use log::{info, warn};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// Text file of completed days, one `YYYY-MM-DD` per line.
///
/// Only ever appended to. Duplicate lines are harmless since [`load`]
/// collapses them into a set.
///
/// [`load`]: CheckpointStore::load
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[cfg(test)]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Completed days recorded so far. A missing file is an empty set.
    pub fn load(&self) -> Result<HashSet<String>, ScraperError> {
        if !self.path.is_file() {
            return Ok(HashSet::new());
        }

        let raw = std::fs::read_to_string(&self.path)?;
        let entries = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Ok(entries)
    }

    /// Open, append one line, close.
    pub fn append(&self, date: NaiveDate) -> Result<(), ScraperError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", date.format(DATE_FORMAT))?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), ScraperError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Deleted existing progress file {}", self.path.display());
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                warn!("Could not delete {}: {}", self.path.display(), err);
                Err(err.into())
            }
        }
    }
}
