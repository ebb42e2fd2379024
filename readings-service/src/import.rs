use std::{fs::File, io::Read, path::PathBuf, pin::Pin};

use csv::StringRecord;
use futures::Stream;
use rental_meters::{domain::SeriesTarget, validation::parse_reading_value, NewReading};
use time::OffsetDateTime;

/// One parsed CSV row, ready to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRow {
    pub line: u64,
    pub target: SeriesTarget,
    pub reading: NewReading,
}

#[derive(thiserror::Error, Debug)]
pub enum ImportError {
    #[error("failed to open {path}: {message}")]
    Open { path: String, message: String },
    #[error("failed to read CSV headers: {0}")]
    Headers(String),
    #[error("line {line}: {message}")]
    Row { line: u64, message: String },
}

impl ImportError {
    /// Row errors only affect their own row; the rest of the file is usable.
    pub fn is_row_error(&self) -> bool {
        matches!(self, Self::Row { .. })
    }
}

/// CSV source of meter readings for bulk import.
///
/// Expected header columns (by name):
/// - space_id
/// - room_id (optional, empty for apartments)
/// - utility (`electricity` or `water`)
/// - value
/// - reading_date (RFC3339 timestamp, optional; empty means import time)
/// - notes (optional)
pub struct ReadingsCsvFileSource {
    path: PathBuf,
}

impl ReadingsCsvFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn stream(&self) -> Pin<Box<dyn Stream<Item = Result<ImportRow, ImportError>> + Send>> {
        let path = self.path.clone();
        match File::open(&path) {
            Ok(file) => rows_from_reader(file),
            Err(e) => {
                let err = ImportError::Open {
                    path: path.display().to_string(),
                    message: e.to_string(),
                };
                Box::pin(futures::stream::once(async move { Err::<ImportRow, ImportError>(err) }))
            }
        }
    }
}

/// Streams rows from any CSV reader. A bad row yields an error item and
/// parsing carries on with the next one.
pub fn rows_from_reader<R: Read + Send + 'static>(
    reader: R,
) -> Pin<Box<dyn Stream<Item = Result<ImportRow, ImportError>> + Send>> {
    let s = async_stream::stream! {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = match rdr.headers() {
            Ok(h) => h.clone(),
            Err(e) => {
                yield Err(ImportError::Headers(e.to_string()));
                return;
            }
        };

        for (idx, result) in rdr.records().enumerate() {
            // Header is line 1.
            let line = idx as u64 + 2;
            let row = result
                .map_err(|e| ImportError::Row { line, message: e.to_string() })
                .and_then(|record| record_to_row(&record, &headers, line));
            if row.is_err() {
                metrics::counter!("readings_csv_parse_errors_total").increment(1);
            }
            yield row;
        }
    };

    Box::pin(s)
}

fn optional(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn record_to_row(
    record: &StringRecord,
    headers: &StringRecord,
    line: u64,
) -> Result<ImportRow, ImportError> {
    let row_err = |message: String| ImportError::Row { line, message };
    let get = |name: &str| -> Option<&str> {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .and_then(|idx| record.get(idx))
    };
    let required = |name: &str| -> Result<&str, ImportError> {
        get(name)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| row_err(format!("missing column '{name}'")))
    };

    let space_id = required("space_id")?.trim().to_string();
    let room_id = get("room_id").and_then(optional);
    let utility = required("utility")?.parse().map_err(row_err)?;

    let value_str = required("value")?;
    let value = parse_reading_value(value_str)
        .map_err(|e| row_err(format!("invalid value '{value_str}': {e}")))?;

    let reading_date = match get("reading_date").and_then(optional) {
        Some(ts) => Some(
            OffsetDateTime::parse(&ts, &time::format_description::well_known::Rfc3339)
                .map_err(|e| row_err(format!("invalid reading_date '{ts}': {e}")))?,
        ),
        None => None,
    };

    Ok(ImportRow {
        line,
        target: SeriesTarget {
            space_id,
            room_id,
            utility,
        },
        reading: NewReading {
            value,
            notes: get("notes").and_then(optional),
            reading_date,
        },
    })
}
