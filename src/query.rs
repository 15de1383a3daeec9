//! Caller-facing query descriptions and their translation into request
//! domains. Validation happens here, before any network call.
//!
//! All bounds are inclusive. `1950..=1952` on the varied axis becomes the
//! boundary sequence `[1950, 1951, 1952, 1953]`; on a held axis it becomes
//! the single bin `[1950, 1953]`.

use ndarray::Array1;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::request::{DataSourceSelection, SpatialDomain, TimeAxes, Timestamp};

pub const DEFAULT_YEARS: (i32, i32) = (1961, 1990);
pub const DEFAULT_DAYS: (i32, i32) = (1, 365);
pub const DEFAULT_HOURS: (i32, i32) = (0, 23);

/// The temporal axis a time series varies along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeAxisKind {
    Year,
    Day,
    Hour,
}

impl TimeAxisKind {
    fn limits(self) -> (i32, i32) {
        match self {
            TimeAxisKind::Year => (1, 9999),
            TimeAxisKind::Day => (1, 366),
            TimeAxisKind::Hour => (0, 23),
        }
    }
}

/// Boundaries for one bin per value in `first..=last`.
pub fn varying_bins(first: i32, last: i32) -> Result<Vec<i32>> {
    Ok((first..=exclusive_end(last)?).collect())
}

/// Boundaries for a single bin covering `first..=last`.
pub fn single_bin(first: i32, last: i32) -> Result<Vec<i32>> {
    Ok(vec![first, exclusive_end(last)?])
}

fn exclusive_end(last: i32) -> Result<i32> {
    last.checked_add(1)
        .ok_or_else(|| Error::input(format!("bound {} has no exclusive end", last)))
}

fn check_range(axis: TimeAxisKind, (first, last): (i32, i32)) -> Result<()> {
    if first > last {
        return Err(Error::input(format!(
            "{:?} range is inverted: first {} > last {}",
            axis, first, last
        )));
    }
    let (lo, hi) = axis.limits();
    if first < lo || last > hi {
        return Err(Error::input(format!(
            "{:?} range {}..={} is outside {}..={}",
            axis, first, last, lo, hi
        )));
    }
    Ok(())
}

/// Time series at a set of points. The bounds of the two held axes come
/// from here; the varied axis is chosen per call.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesQuery {
    pub variable: String,
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
    pub years: (i32, i32),
    pub days: (i32, i32),
    pub hours: (i32, i32),
    pub source: DataSourceSelection,
    pub timestamp: Timestamp,
}

impl TimeSeriesQuery {
    pub fn new(variable: impl Into<String>, lats: Vec<f64>, lons: Vec<f64>) -> Self {
        Self {
            variable: variable.into(),
            lats,
            lons,
            years: DEFAULT_YEARS,
            days: DEFAULT_DAYS,
            hours: DEFAULT_HOURS,
            source: DataSourceSelection::Any,
            timestamp: Timestamp::Now,
        }
    }

    pub fn with_years(mut self, first: i32, last: i32) -> Self {
        self.years = (first, last);
        self
    }

    pub fn with_days(mut self, first: i32, last: i32) -> Self {
        self.days = (first, last);
        self
    }

    pub fn with_hours(mut self, start: i32, stop: i32) -> Self {
        self.hours = (start, stop);
        self
    }

    pub fn with_source(mut self, source: DataSourceSelection) -> Self {
        self.source = source;
        self
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Request domain for a series varying `axis` over `first..=last`.
    pub(crate) fn plan(&self, axis: TimeAxisKind, first: i32, last: i32) -> Result<SeriesPlan> {
        if self.lats.len() != self.lons.len() {
            return Err(Error::input(format!(
                "latitude and longitude vectors differ in length ({} vs {})",
                self.lats.len(),
                self.lons.len()
            )));
        }
        if self.lats.is_empty() {
            return Err(Error::input("at least one point is required"));
        }

        let years = if axis == TimeAxisKind::Year { (first, last) } else { self.years };
        let days = if axis == TimeAxisKind::Day { (first, last) } else { self.days };
        let hours = if axis == TimeAxisKind::Hour { (first, last) } else { self.hours };
        check_range(TimeAxisKind::Year, years)?;
        check_range(TimeAxisKind::Day, days)?;
        check_range(TimeAxisKind::Hour, hours)?;

        let bins = |kind: TimeAxisKind, (a, b): (i32, i32)| {
            if kind == axis { varying_bins(a, b) } else { single_bin(a, b) }
        };
        let time = TimeAxes {
            years: bins(TimeAxisKind::Year, years)?,
            days: bins(TimeAxisKind::Day, days)?,
            hours: bins(TimeAxisKind::Hour, hours)?,
        };

        Ok(SeriesPlan {
            axis,
            labels: (first..=last).collect(),
            domain: SpatialDomain::Points {
                lats: self.lats.clone(),
                lons: self.lons.clone(),
            },
            time,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SeriesPlan {
    pub(crate) axis: TimeAxisKind,
    pub(crate) labels: Vec<i32>,
    pub(crate) domain: SpatialDomain,
    pub(crate) time: TimeAxes,
}

/// Average over one time window on a rectilinear grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridQuery {
    pub variable: String,
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
    pub years: (i32, i32),
    pub days: (i32, i32),
    pub hours: (i32, i32),
    pub source: DataSourceSelection,
    pub timestamp: Timestamp,
}

impl GridQuery {
    pub fn new(variable: impl Into<String>, lats: Vec<f64>, lons: Vec<f64>) -> Self {
        Self {
            variable: variable.into(),
            lats,
            lons,
            years: DEFAULT_YEARS,
            days: DEFAULT_DAYS,
            hours: DEFAULT_HOURS,
            source: DataSourceSelection::Any,
            timestamp: Timestamp::Now,
        }
    }

    /// Evenly spaced axes including both ends.
    pub fn from_bounds(
        variable: impl Into<String>,
        (lat_min, lat_max, lat_count): (f64, f64, usize),
        (lon_min, lon_max, lon_count): (f64, f64, usize),
    ) -> Result<Self> {
        Ok(Self::new(
            variable,
            linspace(lat_min, lat_max, lat_count)?,
            linspace(lon_min, lon_max, lon_count)?,
        ))
    }

    pub fn with_years(mut self, first: i32, last: i32) -> Self {
        self.years = (first, last);
        self
    }

    pub fn with_days(mut self, first: i32, last: i32) -> Self {
        self.days = (first, last);
        self
    }

    pub fn with_hours(mut self, start: i32, stop: i32) -> Self {
        self.hours = (start, stop);
        self
    }

    pub fn with_source(mut self, source: DataSourceSelection) -> Self {
        self.source = source;
        self
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub(crate) fn plan(&self) -> Result<(SpatialDomain, TimeAxes)> {
        check_axis("latitude", &self.lats)?;
        check_axis("longitude", &self.lons)?;
        check_range(TimeAxisKind::Year, self.years)?;
        check_range(TimeAxisKind::Day, self.days)?;
        check_range(TimeAxisKind::Hour, self.hours)?;

        Ok((
            SpatialDomain::Grid {
                lats: self.lats.clone(),
                lons: self.lons.clone(),
            },
            TimeAxes {
                years: single_bin(self.years.0, self.years.1)?,
                days: single_bin(self.days.0, self.days.1)?,
                hours: single_bin(self.hours.0, self.hours.1)?,
            },
        ))
    }
}

fn linspace(min: f64, max: f64, count: usize) -> Result<Vec<f64>> {
    if count == 0 {
        return Err(Error::input("grid axis needs at least one node"));
    }
    Ok(Array1::linspace(min, max, count).to_vec())
}

fn check_axis(name: &str, axis: &[f64]) -> Result<()> {
    if axis.is_empty() {
        return Err(Error::input(format!("{} axis is empty", name)));
    }
    if axis.iter().any(|v| !v.is_finite()) {
        return Err(Error::input(format!("{} axis has non-finite values", name)));
    }
    let increasing = axis.windows(2).all(|w| w[0] < w[1]);
    let decreasing = axis.windows(2).all(|w| w[0] > w[1]);
    if !(increasing || decreasing) {
        return Err(Error::input(format!("{} axis is not strictly monotonic", name)));
    }
    Ok(())
}
