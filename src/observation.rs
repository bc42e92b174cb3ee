use crate::errors::ScraperError;
use chrono::NaiveDate;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// One temperature reading pulled from a history table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Observation {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "Temperature_F")]
    pub temperature: String,
}

/// Destination for extracted observations.
pub trait ObservationSink: Send {
    fn write(&mut self, observation: &Observation) -> Result<(), ScraperError>;

    /// Make everything written so far durable.
    fn flush(&mut self) -> Result<(), ScraperError> {
        Ok(())
    }
}

impl ObservationSink for Vec<Observation> {
    fn write(&mut self, observation: &Observation) -> Result<(), ScraperError> {
        self.push(observation.clone());
        Ok(())
    }
}

/// Append-only CSV file with the `Date,Time,Temperature_F` schema.
pub struct OutputTable {
    writer: csv::Writer<File>,
}

impl OutputTable {
    /// Opens `path` for appending when `append` is set and the file already
    /// exists; otherwise creates it fresh and writes the header.
    pub fn open(path: &Path, append: bool) -> Result<Self, ScraperError> {
        let appending = append && path.is_file();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = if appending {
            OpenOptions::new().append(true).open(path)?
        } else {
            File::create(path)?
        };

        // serde would emit the header on the first row; handle it here so
        // appends never repeat it.
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if !appending {
            writer.write_record(["Date", "Time", "Temperature_F"])?;
            writer.flush()?;
        }

        Ok(Self { writer })
    }
}

impl ObservationSink for OutputTable {
    fn write(&mut self, observation: &Observation) -> Result<(), ScraperError> {
        self.writer.serialize(observation)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ScraperError> {
        self.writer.flush()?;
        Ok(())
    }
}
