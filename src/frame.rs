// src/frame.rs

use polars::prelude::*;

use crate::aligner::{StitchedPoint, StitchedSeries};

/// Builds a DataFrame with one row per stitched point. Times are epoch
/// milliseconds; missing actual prices and closes are nulls.
pub fn to_data_frame(points: &[StitchedPoint]) -> Result<DataFrame, PolarsError> {
    let origin: Vec<i64> = points.iter().map(|p| p.origin.timestamp_millis()).collect();
    let time: Vec<i64> = points.iter().map(|p| p.timestamp.timestamp_millis()).collect();
    let price: Vec<f64> = points.iter().map(|p| p.current_price).collect();
    let actual: Vec<Option<f64>> = points.iter().map(|p| p.actual_price).collect();
    let high: Vec<f64> = points.iter().map(|p| p.predicted_high).collect();
    let low: Vec<f64> = points.iter().map(|p| p.predicted_low).collect();
    let close: Vec<Option<f64>> = points.iter().map(|p| p.predicted_close).collect();

    DataFrame::new(vec![
        Series::new("origin_time", origin),
        Series::new("time", time),
        Series::new("price", price),
        Series::new("actual", actual),
        Series::new("predicted_high", high),
        Series::new("predicted_low", low),
        Series::new("predicted_close", close),
    ])
}

/// Both buckets stacked, tagged by a `session` column (`current` / `previous`).
pub fn series_frame(series: &StitchedSeries) -> Result<DataFrame, PolarsError> {
    let mut combined = tagged(&series.previous, "previous")?;
    combined.vstack_mut(&tagged(&series.current, "current")?)?;
    combined.sort_in_place(&["time"], SortMultipleOptions::default())?;
    Ok(combined)
}

fn tagged(points: &[StitchedPoint], session: &str) -> Result<DataFrame, PolarsError> {
    let mut df = to_data_frame(points)?;
    let session_column = Series::new("session", vec![session.to_string(); df.height()]);
    df.with_column(session_column)?;
    Ok(df)
}
