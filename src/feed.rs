// src/feed.rs

use std::fmt;

use serde_json::Value;
use tracing::warn;

use crate::error::{FeedError, RowError};

/// Row-major table of cells as delivered by a feed.
pub type FeedTable = Vec<Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Ticks,
    Predictions,
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedKind::Ticks => write!(f, "ticks"),
            FeedKind::Predictions => write!(f, "predictions"),
        }
    }
}

/// Decodes a JSON body holding a 2-D array. Numeric cells are kept in their
/// textual form and `null` becomes an empty cell.
pub fn decode_table(body: &str) -> Result<FeedTable, FeedError> {
    let rows: Vec<Vec<Value>> = serde_json::from_str(body)?;
    Ok(rows
        .into_iter()
        .map(|row| row.into_iter().map(cell_text).collect())
        .collect())
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTick {
    pub timestamp: String,
    pub price: String,
}

impl RawTick {
    pub fn new(timestamp: impl Into<String>, price: impl Into<String>) -> Self {
        RawTick { timestamp: timestamp.into(), price: price.into() }
    }

    pub fn from_row(row: &[String]) -> Result<Self, RowError> {
        match row {
            [timestamp, price, ..] => Ok(RawTick::new(timestamp.as_str(), price.as_str())),
            _ => Err(RowError::MissingColumns { len: row.len(), expected: 2 }),
        }
    }

    /// Converts a tick table, optionally slicing off its header row.
    /// Short rows are reported and skipped.
    pub fn from_rows(rows: &[Vec<String>], skip_header: bool) -> Vec<Self> {
        let start = usize::from(skip_header);
        rows.iter()
            .enumerate()
            .skip(start)
            .filter_map(|(index, row)| match RawTick::from_row(row) {
                Ok(tick) => Some(tick),
                Err(error) => {
                    warn!(row = index, %error, "skipping tick row");
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPrediction {
    pub timestamp: String,
    pub predicted_high: String,
    pub predicted_low: String,
    pub predicted_close: Option<String>,
}

impl RawPrediction {
    pub fn new(timestamp: impl Into<String>, predicted_high: impl Into<String>, predicted_low: impl Into<String>) -> Self {
        RawPrediction {
            timestamp: timestamp.into(),
            predicted_high: predicted_high.into(),
            predicted_low: predicted_low.into(),
            predicted_close: None,
        }
    }

    pub fn with_close(mut self, predicted_close: impl Into<String>) -> Self {
        self.predicted_close = Some(predicted_close.into());
        self
    }

    fn header_row(row: &[String]) -> Self {
        let cell = |index: usize| row.get(index).cloned().unwrap_or_default();
        RawPrediction::new(cell(0), cell(1), cell(2))
    }

    pub fn from_row(row: &[String]) -> Result<Self, RowError> {
        match row {
            [timestamp, high, low, rest @ ..] => {
                let prediction = RawPrediction::new(timestamp.as_str(), high.as_str(), low.as_str());
                Ok(match rest.first().filter(|close| !close.trim().is_empty()) {
                    Some(close) => prediction.with_close(close.as_str()),
                    None => prediction,
                })
            }
            _ => Err(RowError::MissingColumns { len: row.len(), expected: 3 }),
        }
    }

    /// Converts a prediction table. With `has_header`, row 0 is carried
    /// through whatever its width so the aligner's header skip lands on it.
    /// Other short rows are reported and skipped.
    pub fn from_rows(rows: &[Vec<String>], has_header: bool) -> Vec<Self> {
        rows.iter()
            .enumerate()
            .filter_map(|(index, row)| match RawPrediction::from_row(row) {
                Ok(prediction) => Some(prediction),
                Err(_) if has_header && index == 0 => Some(RawPrediction::header_row(row)),
                Err(error) => {
                    warn!(row = index, %error, "skipping prediction row");
                    None
                }
            })
            .collect()
    }
}
