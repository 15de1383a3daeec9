use ndarray::Array2;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::catalog::{Catalog, DataSourceInfo, VariableInfo, fetch_catalog};
use crate::config::{ClientConfig, load_config};
use crate::error::Result;
use crate::job::{CancelFlag, JobPoller, PollOptions, Sleeper, ThreadSleeper};
use crate::payload::RawPayload;
use crate::provenance::{SourceLabel, resolve_matrix, resolve_raster};
use crate::query::{GridQuery, TimeAxisKind, TimeSeriesQuery};
use crate::request::{ComputeRequest, DataSourceSelection, SpatialDomain, TimeAxes, Timestamp};
use crate::reshape::{Raster, reshape_grid, reshape_points};
use crate::transport::{HttpTransport, Transport};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A grid average with provenance resolved to data source names.
pub type Grid = Raster<SourceLabel>;

/// Point time series: rows are locations, columns are time bins labelled by
/// `labels` (year, day of year or hour of day, depending on `axis`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    pub variable: String,
    pub axis: TimeAxisKind,
    pub labels: Vec<i32>,
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
    pub values: Array2<Option<f64>>,
    pub sd: Array2<Option<f64>>,
    pub provenance: Array2<Option<SourceLabel>>,
}

#[derive(Debug, Clone)]
pub struct Client<T = HttpTransport> {
    url: String,
    transport: T,
    poll: PollOptions,
    progress: bool,
    sleeper: Arc<dyn Sleeper>,
}

/// What one compute round trip brings back, before reshaping.
struct Fetched {
    payload: RawPayload,
    catalog: Catalog,
    explicit_id: Option<i32>,
}

impl Client<HttpTransport> {
    /// Creates a client using environment variables and/or `.fetchclimaterc`.
    ///
    /// This is equivalent to `Client::new(None, None)`.
    pub fn from_env() -> Result<Self> {
        Self::new(None, None)
    }

    /// Creates a client using (in order of precedence):
    /// - explicit `url`/`verify` arguments
    /// - environment variables `FETCHCLIMATE_URL` / `FETCHCLIMATE_VERIFY`
    /// - config file from `FETCHCLIMATE_RC` or `.fetchclimaterc`
    /// - the public service at [`DEFAULT_URL`](crate::DEFAULT_URL)
    pub fn new(url: Option<String>, verify: Option<bool>) -> Result<Self> {
        Self::new_with_timeout(url, verify, DEFAULT_TIMEOUT)
    }

    /// Like [`Client::new`] with a per-request HTTP timeout.
    pub fn new_with_timeout(url: Option<String>, verify: Option<bool>, timeout: Duration) -> Result<Self> {
        Self::from_config(load_config(url, verify)?, timeout)
    }

    /// Uses `cfg` as is, without consulting the environment or rc files.
    pub fn from_config(cfg: ClientConfig, timeout: Duration) -> Result<Self> {
        let transport = HttpTransport::new(timeout, cfg.verify)?;
        Ok(Self::with_transport(cfg.url, transport))
    }
}

impl<T: Transport> Client<T> {
    pub fn with_transport(url: impl Into<String>, transport: T) -> Self {
        Self {
            url: url.into(),
            transport,
            poll: PollOptions::default(),
            progress: true,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll.interval = interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.poll.max_wait = max_wait;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.poll.cancel = Some(cancel);
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn catalog(&self, timestamp: Timestamp) -> Result<Catalog> {
        fetch_catalog(&self.transport, &self.url, timestamp)
    }

    pub fn list_sources(&self, timestamp: Timestamp) -> Result<Vec<DataSourceInfo>> {
        Ok(self.catalog(timestamp)?.data_sources)
    }

    pub fn list_variables(&self, timestamp: Timestamp) -> Result<Vec<VariableInfo>> {
        Ok(self.catalog(timestamp)?.variables)
    }

    /// One bin per year in `first_year..=last_year`.
    pub fn time_series_yearly(
        &self,
        query: &TimeSeriesQuery,
        first_year: i32,
        last_year: i32,
    ) -> Result<TimeSeries> {
        self.time_series(query, TimeAxisKind::Year, first_year, last_year)
    }

    /// One bin per day of year in `first_day..=last_day`.
    pub fn time_series_daily(
        &self,
        query: &TimeSeriesQuery,
        first_day: i32,
        last_day: i32,
    ) -> Result<TimeSeries> {
        self.time_series(query, TimeAxisKind::Day, first_day, last_day)
    }

    /// One bin per hour of day in `start_hour..=stop_hour`.
    pub fn time_series_hourly(
        &self,
        query: &TimeSeriesQuery,
        start_hour: i32,
        stop_hour: i32,
    ) -> Result<TimeSeries> {
        self.time_series(query, TimeAxisKind::Hour, start_hour, stop_hour)
    }

    fn time_series(
        &self,
        query: &TimeSeriesQuery,
        axis: TimeAxisKind,
        first: i32,
        last: i32,
    ) -> Result<TimeSeries> {
        let plan = query.plan(axis, first, last)?;
        let n_points = plan.domain.lats().len();
        let n_bins = plan.labels.len();

        let fetched = self.fetch(
            &query.variable,
            &plan.domain,
            &plan.time,
            &query.source,
            query.timestamp,
        )?;
        let matrices = reshape_points(&fetched.payload, n_points, n_bins, fetched.explicit_id)?;

        Ok(TimeSeries {
            variable: query.variable.clone(),
            axis: plan.axis,
            labels: plan.labels,
            lats: query.lats.clone(),
            lons: query.lons.clone(),
            provenance: resolve_matrix(&matrices.provenance, &fetched.catalog),
            values: matrices.values,
            sd: matrices.sd,
        })
    }

    /// Average over the query's time window at every node of its grid.
    pub fn grid(&self, query: &GridQuery) -> Result<Grid> {
        let (domain, time) = query.plan()?;
        let fetched = self.fetch(
            &query.variable,
            &domain,
            &time,
            &query.source,
            query.timestamp,
        )?;
        let raster = reshape_grid(
            &fetched.payload,
            domain.lats(),
            domain.lons(),
            fetched.explicit_id,
        )?;
        Ok(resolve_raster(raster, &fetched.catalog))
    }

    fn fetch(
        &self,
        variable: &str,
        domain: &SpatialDomain,
        time: &TimeAxes,
        source: &DataSourceSelection,
        timestamp: Timestamp,
    ) -> Result<Fetched> {
        let started = Instant::now();
        tracing::info!(
            variable,
            region = ?domain.region_type(),
            locations = domain.lats().len(),
            bins = time.bin_count(),
            source = source.wire_value(),
            %timestamp,
            "fetching"
        );

        let catalog = self.catalog(timestamp)?;
        let explicit_id = match source {
            DataSourceSelection::Any => None,
            DataSourceSelection::Single(name) => Some(catalog.require_source_id(name)?),
        };

        let request = ComputeRequest::new(variable, domain, time, source, timestamp);
        let poller = JobPoller {
            transport: &self.transport,
            base_url: &self.url,
            options: &self.poll,
            sleeper: self.sleeper.as_ref(),
            progress: self.progress,
        };
        let payload = poller.run(&request, source.data_fields())?;

        tracing::info!(
            variable,
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "fetch completed"
        );
        Ok(Fetched {
            payload,
            catalog,
            explicit_id,
        })
    }
}
