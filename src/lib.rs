//! A small Rust client for the FetchClimate climate-data service.
//!
//! A fetch builds a compute request, submits it, polls the asynchronous job
//! until it completes, then reshapes the returned arrays into point-by-time
//! matrices or a lon/lat raster. Every value comes with its standard
//! deviation and the data source it was derived from.
//!
//! ## Quick start
//! - The service URL is taken from `FETCHCLIMATE_URL`, a `.fetchclimaterc`
//!   file (current directory, then home directory), or defaults to the public
//!   instance.
//! - Describe the points with a [`TimeSeriesQuery`] and call one of the
//!   `time_series_*` methods, or describe a grid with a [`GridQuery`].
//!
//! ```no_run
//! use fetchclimate::{Client, TimeSeriesQuery};
//!
//! fn main() -> fetchclimate::Result<()> {
//!     let client = Client::from_env()?;
//!     let query = TimeSeriesQuery::new("airt", vec![55.75, 59.95], vec![37.62, 30.32]);
//!     let series = client.time_series_yearly(&query, 1950, 1952)?;
//!     for (i, year) in series.labels.iter().enumerate() {
//!         println!("{}: {:?} ± {:?}", year, series.values[[0, i]], series.sd[[0, i]]);
//!     }
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

mod catalog;
mod client;
mod config;
mod error;
mod job;
mod payload;
mod provenance;
mod query;
mod request;
mod reshape;
mod transport;
mod util;

pub use catalog::{Catalog, DataSourceInfo, VariableInfo, fetch_catalog};
pub use client::{Client, Grid, TimeSeries};
pub use config::{ClientConfig, DEFAULT_URL};
pub use error::{Error, Result};
pub use job::{CancelFlag, DEFAULT_POLL_INTERVAL, JobStatus, PollOptions, Sleeper, ThreadSleeper};
pub use payload::{Nested, RawPayload};
pub use provenance::{SourceLabel, resolve_id, resolve_matrix, resolve_raster};
pub use query::{
    DEFAULT_DAYS, DEFAULT_HOURS, DEFAULT_YEARS, GridQuery, TimeAxisKind, TimeSeriesQuery,
    single_bin, varying_bins,
};
pub use request::{
    ComputeRequest, DataSourceSelection, Domain, NOW_SENTINEL, SpatialDomain, SpatialRegionType,
    TimeAxes, TimeRegion, Timestamp,
};
pub use reshape::{GridCell, LONLAT_CRS, PointMatrices, Raster, reshape_grid, reshape_points};
pub use transport::{HttpRequest, HttpTransport, Method, Transport};
