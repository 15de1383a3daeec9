use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::time::Duration;

use fetchclimate::{
    Client, DEFAULT_DAYS, DEFAULT_HOURS, DEFAULT_YEARS, DataSourceSelection, GridQuery,
    TimeSeriesQuery, Timestamp,
};

/// Query the FetchClimate service from the command line. Results are
/// printed as JSON on stdout.
#[derive(Parser, Debug)]
#[command(name = "fetchclimate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Service base URL
    #[arg(long, env = "FETCHCLIMATE_URL")]
    url: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long)]
    insecure: bool,

    /// Reproducibility timestamp: `now` or RFC 3339
    #[arg(long, default_value = "now")]
    timestamp: Timestamp,

    /// Hide the polling spinner
    #[arg(long)]
    no_progress: bool,

    /// Seconds between job status polls
    #[arg(long, default_value_t = 5)]
    poll_interval: u64,

    /// Give up after waiting this many seconds for the job
    #[arg(long)]
    max_wait: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "FETCHCLIMATE_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List data sources
    Sources {
        /// Only sources providing this variable
        #[arg(long)]
        variable: Option<String>,
    },
    /// List environmental variables
    Variables,
    /// Time series with one bin per year
    Yearly {
        #[command(flatten)]
        points: PointArgs,
        #[arg(long)]
        first_year: i32,
        #[arg(long)]
        last_year: i32,
    },
    /// Time series with one bin per day of year
    Daily {
        #[command(flatten)]
        points: PointArgs,
        #[arg(long)]
        first_day: i32,
        #[arg(long)]
        last_day: i32,
    },
    /// Time series with one bin per hour of day
    Hourly {
        #[command(flatten)]
        points: PointArgs,
        #[arg(long)]
        start_hour: i32,
        #[arg(long)]
        stop_hour: i32,
    },
    /// Average over one time window on a regular grid
    Grid(GridArgs),
}

#[derive(Args, Debug)]
struct Window {
    #[arg(long, default_value_t = DEFAULT_YEARS.0)]
    first_year: i32,
    #[arg(long, default_value_t = DEFAULT_YEARS.1)]
    last_year: i32,
    #[arg(long, default_value_t = DEFAULT_DAYS.0)]
    first_day: i32,
    #[arg(long, default_value_t = DEFAULT_DAYS.1)]
    last_day: i32,
    #[arg(long, default_value_t = DEFAULT_HOURS.0)]
    start_hour: i32,
    #[arg(long, default_value_t = DEFAULT_HOURS.1)]
    stop_hour: i32,
}

#[derive(Args, Debug)]
struct PointArgs {
    /// Variable name, e.g. `airt`
    #[arg(long)]
    variable: String,
    /// Latitudes, comma separated
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true, required = true)]
    lat: Vec<f64>,
    /// Longitudes, comma separated
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true, required = true)]
    lon: Vec<f64>,
    /// Single data source name (default: any, with provenance)
    #[arg(long)]
    source: Option<String>,
    /// Held-axis bounds: year range for daily and hourly series
    #[arg(long, num_args = 2, value_names = ["FIRST", "LAST"])]
    years: Option<Vec<i32>>,
    /// Held-axis bounds: day-of-year range for yearly and hourly series
    #[arg(long, num_args = 2, value_names = ["FIRST", "LAST"])]
    days: Option<Vec<i32>>,
    /// Held-axis bounds: hour range for yearly and daily series
    #[arg(long, num_args = 2, value_names = ["START", "STOP"])]
    hours: Option<Vec<i32>>,
}

#[derive(Args, Debug)]
struct GridArgs {
    #[arg(long)]
    variable: String,
    #[arg(long, allow_negative_numbers = true)]
    lat_min: f64,
    #[arg(long, allow_negative_numbers = true)]
    lat_max: f64,
    #[arg(long)]
    lat_count: usize,
    #[arg(long, allow_negative_numbers = true)]
    lon_min: f64,
    #[arg(long, allow_negative_numbers = true)]
    lon_max: f64,
    #[arg(long)]
    lon_count: usize,
    #[arg(long)]
    source: Option<String>,
    #[command(flatten)]
    window: Window,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let client = Client::new(cli.url.clone(), cli.insecure.then_some(false))
        .context("failed to configure client")?
        .with_progress(!cli.no_progress)
        .with_poll_interval(Duration::from_secs(cli.poll_interval))
        .with_max_wait(cli.max_wait.map(Duration::from_secs));
    tracing::debug!(url = client.url(), "client ready");

    match cli.command {
        Command::Sources { variable } => {
            let catalog = client.catalog(cli.timestamp)?;
            let sources: Vec<_> = match &variable {
                Some(v) => catalog.sources_providing(v).collect(),
                None => catalog.data_sources.iter().collect(),
            };
            print_json(&sources)
        }
        Command::Variables => print_json(&client.list_variables(cli.timestamp)?),
        Command::Yearly {
            points,
            first_year,
            last_year,
        } => {
            let query = points.query(cli.timestamp)?;
            print_json(&client.time_series_yearly(&query, first_year, last_year)?)
        }
        Command::Daily {
            points,
            first_day,
            last_day,
        } => {
            let query = points.query(cli.timestamp)?;
            print_json(&client.time_series_daily(&query, first_day, last_day)?)
        }
        Command::Hourly {
            points,
            start_hour,
            stop_hour,
        } => {
            let query = points.query(cli.timestamp)?;
            print_json(&client.time_series_hourly(&query, start_hour, stop_hour)?)
        }
        Command::Grid(args) => {
            let w = &args.window;
            let query = GridQuery::from_bounds(
                args.variable.as_str(),
                (args.lat_min, args.lat_max, args.lat_count),
                (args.lon_min, args.lon_max, args.lon_count),
            )?
            .with_years(w.first_year, w.last_year)
            .with_days(w.first_day, w.last_day)
            .with_hours(w.start_hour, w.stop_hour)
            .with_source(DataSourceSelection::from_name(args.source.as_deref()))
            .with_timestamp(cli.timestamp);
            print_json(&client.grid(&query)?)
        }
    }
}

impl PointArgs {
    fn query(&self, timestamp: Timestamp) -> Result<TimeSeriesQuery> {
        let mut query = TimeSeriesQuery::new(self.variable.as_str(), self.lat.clone(), self.lon.clone())
            .with_source(DataSourceSelection::from_name(self.source.as_deref()))
            .with_timestamp(timestamp);
        if let Some((a, b)) = pair(&self.years)? {
            query = query.with_years(a, b);
        }
        if let Some((a, b)) = pair(&self.days)? {
            query = query.with_days(a, b);
        }
        if let Some((a, b)) = pair(&self.hours)? {
            query = query.with_hours(a, b);
        }
        Ok(query)
    }
}

fn pair(v: &Option<Vec<i32>>) -> Result<Option<(i32, i32)>> {
    match v.as_deref() {
        None => Ok(None),
        Some([a, b]) => Ok(Some((*a, *b))),
        Some(other) => bail!("expected two bounds, got {}", other.len()),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to serialize result")?;
    println!("{}", text);
    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(val) => val,
        Err(_) => log_level.to_string(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
