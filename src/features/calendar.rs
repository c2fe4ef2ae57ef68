//! Calendar encodings of the week-of-year column

use std::f64::consts::PI;

use polars::prelude::*;

use super::merge::OrderedTable;
use crate::error::{PipelineError, Result};
use crate::table::{column, integers};

/// Period used for the sin/cos week encoding.
pub const WEEKS_PER_YEAR: f64 = 53.0;

/// Name of the season label column.
pub const SEASON_COLUMN: &str = "season";

/// Meteorological season of a week of the year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

impl Season {
    /// Season for weeks 1..=53; anything else is rejected.
    pub fn from_week(week: i64) -> Result<Self> {
        match week {
            1..=11 | 52..=53 => Ok(Season::Winter),
            12..=23 => Ok(Season::Spring),
            24..=39 => Ok(Season::Summer),
            40..=51 => Ok(Season::Autumn),
            _ => Err(PipelineError::InvalidWeek(week)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Winter => "Winter",
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Autumn => "Autumn",
        }
    }
}

/// Cyclical encoding for periodic features
/// Returns (sin, cos) encoding to preserve continuity
pub fn cyclical_encode(value: f64, period: f64) -> (f64, f64) {
    let angle = 2.0 * PI * value / period;
    (angle.sin(), angle.cos())
}

/// Single cosine bump peaking mid-year.
pub fn week_cosine(week: f64) -> f64 {
    ((week - 26.5) / 25.5).cos()
}

/// Which calendar columns to derive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalendarSpec {
    pub cyclical_week: bool,
    pub season_label: bool,
    pub week_cosine: bool,
}

/// Append the selected calendar columns derived from `week_column`.
pub fn add_calendar_features(
    table: &OrderedTable,
    week_column: &str,
    spec: CalendarSpec,
) -> Result<OrderedTable> {
    let mut out = table.frame().clone();
    if spec.cyclical_week {
        add_cyclical_week(&mut out, week_column)?;
    }
    if spec.season_label {
        add_season(&mut out, week_column)?;
    }
    if spec.week_cosine {
        add_week_cosine(&mut out, week_column)?;
    }
    Ok(table.derive(out))
}

fn weeks(frame: &DataFrame, week_column: &str) -> Result<Vec<i64>> {
    integers(column(frame, week_column)?)
}

/// `{week}_sin` and `{week}_cos` over a 53-week period.
pub fn add_cyclical_week(frame: &mut DataFrame, week_column: &str) -> Result<()> {
    let (sin, cos): (Vec<f64>, Vec<f64>) = weeks(frame, week_column)?
        .into_iter()
        .map(|w| cyclical_encode(w as f64, WEEKS_PER_YEAR))
        .unzip();
    frame.with_column(Series::new(format!("{}_sin", week_column).into(), sin))?;
    frame.with_column(Series::new(format!("{}_cos", week_column).into(), cos))?;
    Ok(())
}

/// Text `season` column, later one-hot encoded like any nominal column.
pub fn add_season(frame: &mut DataFrame, week_column: &str) -> Result<()> {
    let labels: Vec<&str> = weeks(frame, week_column)?
        .into_iter()
        .map(|w| Season::from_week(w).map(|s| s.as_str()))
        .collect::<Result<_>>()?;
    frame.with_column(Series::new(SEASON_COLUMN.into(), labels))?;
    Ok(())
}

pub fn add_week_cosine(frame: &mut DataFrame, week_column: &str) -> Result<()> {
    let values: Vec<f64> = weeks(frame, week_column)?
        .into_iter()
        .map(|w| week_cosine(w as f64))
        .collect();
    frame.with_column(Series::new(format!("{}_cyclic", week_column).into(), values))?;
    Ok(())
}
