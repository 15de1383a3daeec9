//! Builds the JSON body submitted to `POST /api/compute`.
//!
//! Nothing here validates input or touches the network; the query layer
//! checks shapes before a [`ComputeRequest`] is ever built.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Encoding of [`Timestamp::Now`]: the milliseconds of .NET's
/// `DateTime.MaxValue` (9999-12-31T23:59:59.999Z).
pub const NOW_SENTINEL: i64 = 253_402_300_799_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpatialRegionType {
    Points,
    PointGrid,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpatialDomain {
    /// N explicit (lat, lon) pairs; both vectors have length N.
    Points { lats: Vec<f64>, lons: Vec<f64> },
    /// Rectilinear grid spanned by two monotonic axes.
    Grid { lats: Vec<f64>, lons: Vec<f64> },
}

impl SpatialDomain {
    pub fn region_type(&self) -> SpatialRegionType {
        match self {
            SpatialDomain::Points { .. } => SpatialRegionType::Points,
            SpatialDomain::Grid { .. } => SpatialRegionType::PointGrid,
        }
    }

    pub fn lats(&self) -> &[f64] {
        match self {
            SpatialDomain::Points { lats, .. } | SpatialDomain::Grid { lats, .. } => lats,
        }
    }

    pub fn lons(&self) -> &[f64] {
        match self {
            SpatialDomain::Points { lons, .. } | SpatialDomain::Grid { lons, .. } => lons,
        }
    }
}

/// Bin boundaries for the three temporal axes. K+1 boundaries describe K
/// half-open bins.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TimeAxes {
    pub years: Vec<i32>,
    pub days: Vec<i32>,
    pub hours: Vec<i32>,
}

impl TimeAxes {
    /// Total number of time bins (product over the three axes).
    pub fn bin_count(&self) -> usize {
        [&self.years, &self.days, &self.hours]
            .iter()
            .map(|b| b.len().saturating_sub(1))
            .product()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DataSourceSelection {
    /// Let the service stitch all sources that provide the variable.
    #[default]
    Any,
    /// Restrict the computation to one named source.
    Single(String),
}

impl DataSourceSelection {
    pub fn from_name(name: Option<&str>) -> Self {
        match name.map(str::trim) {
            None | Some("") => DataSourceSelection::Any,
            Some(n) => DataSourceSelection::Single(n.to_string()),
        }
    }

    /// Value of the `ParticularDataSources` field.
    pub fn wire_value(&self) -> &str {
        match self {
            DataSourceSelection::Any => "",
            DataSourceSelection::Single(name) => name,
        }
    }

    /// Field list for `/jsproxy/data`. Provenance is only meaningful when several
    /// sources may have contributed.
    pub fn data_fields(&self) -> &'static str {
        match self {
            DataSourceSelection::Any => "values,provenance,sd",
            DataSourceSelection::Single(_) => "values,sd",
        }
    }
}

/// Pins the service configuration a query is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timestamp {
    #[default]
    Now,
    At(DateTime<Utc>),
}

impl Timestamp {
    /// `timestamp` query parameter for `/api/configuration`; `None` for "now".
    pub fn query_param(&self) -> Option<String> {
        match self {
            Timestamp::Now => None,
            Timestamp::At(t) => Some(t.format("%Y-%m-%dT%H:%M").to_string()),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Timestamp::Now => serializer.serialize_i64(NOW_SENTINEL),
            Timestamp::At(t) => {
                serializer.serialize_str(&format!("/Date({}+0000)/", t.timestamp_millis()))
            }
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Now => f.write_str("now"),
            Timestamp::At(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

impl FromStr for Timestamp {
    type Err = String;

    /// Accepts `now`, RFC 3339, or a naive UTC `YYYY-MM-DDTHH:MM[:SS]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("now") {
            return Ok(Timestamp::Now);
        }
        if let Ok(t) = DateTime::parse_from_rfc3339(s) {
            return Ok(Timestamp::At(t.with_timezone(&Utc)));
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
            if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
                return Ok(Timestamp::At(t.and_utc()));
            }
        }
        Err(format!("unrecognized timestamp {:?} (expected `now` or RFC 3339)", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TimeRegion {
    pub years: Vec<i32>,
    pub days: Vec<i32>,
    pub hours: Vec<i32>,
    pub is_intervals_grid_years: bool,
    pub is_intervals_grid_days: bool,
    pub is_intervals_grid_hours: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Domain {
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
    pub time_region: TimeRegion,
    pub spatial_region_type: SpatialRegionType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ComputeRequest {
    pub environment_variable_name: String,
    pub particular_data_sources: String,
    pub domain: Domain,
    pub reproducibility_timestamp: Timestamp,
}

impl ComputeRequest {
    pub fn new(
        variable: &str,
        domain: &SpatialDomain,
        time: &TimeAxes,
        selection: &DataSourceSelection,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            environment_variable_name: variable.to_string(),
            particular_data_sources: selection.wire_value().to_string(),
            domain: Domain {
                lats: domain.lats().to_vec(),
                lons: domain.lons().to_vec(),
                time_region: TimeRegion {
                    years: time.years.clone(),
                    days: time.days.clone(),
                    hours: time.hours.clone(),
                    is_intervals_grid_years: true,
                    is_intervals_grid_days: true,
                    is_intervals_grid_hours: true,
                },
                spatial_region_type: domain.region_type(),
            },
            reproducibility_timestamp: timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn axes() -> TimeAxes {
        TimeAxes {
            years: vec![1950, 1951, 1952, 1953],
            days: vec![1, 366],
            hours: vec![0, 24],
        }
    }

    #[test]
    fn request_serializes_to_service_shape() {
        let domain = SpatialDomain::Points {
            lats: vec![55.5],
            lons: vec![37.5],
        };
        let req = ComputeRequest::new(
            "airt",
            &domain,
            &axes(),
            &DataSourceSelection::Any,
            Timestamp::Now,
        );
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({
                "EnvironmentVariableName": "airt",
                "ParticularDataSources": "",
                "Domain": {
                    "Lats": [55.5],
                    "Lons": [37.5],
                    "TimeRegion": {
                        "Years": [1950, 1951, 1952, 1953],
                        "Days": [1, 366],
                        "Hours": [0, 24],
                        "IsIntervalsGridYears": true,
                        "IsIntervalsGridDays": true,
                        "IsIntervalsGridHours": true
                    },
                    "SpatialRegionType": "Points"
                },
                "ReproducibilityTimestamp": NOW_SENTINEL
            })
        );
    }

    #[test]
    fn single_source_and_grid_region() {
        let domain = SpatialDomain::Grid {
            lats: vec![0.0, 1.0],
            lons: vec![10.0, 11.0, 12.0],
        };
        let selection = DataSourceSelection::Single("CRU CL 2.0".to_string());
        let req = ComputeRequest::new("prate", &domain, &axes(), &selection, Timestamp::Now);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["ParticularDataSources"], "CRU CL 2.0");
        assert_eq!(value["Domain"]["SpatialRegionType"], "PointGrid");
        assert_eq!(selection.data_fields(), "values,sd");
        assert_eq!(DataSourceSelection::Any.data_fields(), "values,provenance,sd");
    }

    #[test]
    fn historical_timestamp_is_date_wrapped() {
        let t = Utc.with_ymd_and_hms(2015, 3, 1, 12, 30, 0).unwrap();
        let value = serde_json::to_value(Timestamp::At(t)).unwrap();
        assert_eq!(value, json!("/Date(1425213000000+0000)/"));
        assert_eq!(Timestamp::At(t).query_param().as_deref(), Some("2015-03-01T12:30"));
        assert_eq!(Timestamp::Now.query_param(), None);
    }

    #[test]
    fn now_is_independent_of_wall_clock() {
        let a = serde_json::to_string(&Timestamp::Now).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = serde_json::to_string(&Timestamp::Now).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "253402300799999");
    }

    #[test]
    fn timestamp_parsing() {
        assert_eq!("now".parse::<Timestamp>().unwrap(), Timestamp::Now);
        let t = Utc.with_ymd_and_hms(2015, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(
            "2015-03-01T12:30:00Z".parse::<Timestamp>().unwrap(),
            Timestamp::At(t)
        );
        assert_eq!("2015-03-01T12:30".parse::<Timestamp>().unwrap(), Timestamp::At(t));
        assert!("yesterday".parse::<Timestamp>().is_err());
    }

    #[test]
    fn bin_count_multiplies_axes() {
        assert_eq!(axes().bin_count(), 3);
        assert_eq!(TimeAxes::default().bin_count(), 0);
    }

    #[test]
    fn selection_from_name() {
        assert_eq!(DataSourceSelection::from_name(None), DataSourceSelection::Any);
        assert_eq!(DataSourceSelection::from_name(Some(" ")), DataSourceSelection::Any);
        assert_eq!(
            DataSourceSelection::from_name(Some("GHCNv2")),
            DataSourceSelection::Single("GHCNv2".to_string())
        );
    }
}
