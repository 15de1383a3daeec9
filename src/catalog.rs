//! Service configuration: which data sources exist and which variables they
//! provide, at a given reproducibility timestamp.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::request::Timestamp;
use crate::transport::{HttpRequest, Transport};
use crate::util::urljoin;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceInfo {
    #[serde(rename = "ID")]
    pub id: i32,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "Copyright", default)]
    pub copyright: String,
    #[serde(rename = "ProvidedVariables", default)]
    pub provided_variables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "Units", default)]
    pub units: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(rename = "DataSources", default)]
    pub data_sources: Vec<DataSourceInfo>,
    #[serde(rename = "EnvironmentalVariables", default)]
    pub variables: Vec<VariableInfo>,
}

impl Catalog {
    pub fn source_id(&self, name: &str) -> Option<i32> {
        self.data_sources
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.id)
    }

    pub fn source_name(&self, id: i32) -> Option<&str> {
        self.data_sources
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.name.as_str())
    }

    /// Sources whose provided variables include `variable`.
    pub fn sources_providing<'a>(
        &'a self,
        variable: &'a str,
    ) -> impl Iterator<Item = &'a DataSourceInfo> + 'a {
        self.data_sources
            .iter()
            .filter(move |s| s.provided_variables.iter().any(|v| v == variable))
    }

    pub fn variable(&self, name: &str) -> Option<&VariableInfo> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Id of a source named in a single-source request.
    pub(crate) fn require_source_id(&self, name: &str) -> Result<i32> {
        self.source_id(name).ok_or_else(|| Error::UnknownDataSource {
            name: name.to_string(),
        })
    }
}

/// `GET /api/configuration`, once, without retry.
pub fn fetch_catalog<T: Transport>(
    transport: &T,
    base_url: &str,
    timestamp: Timestamp,
) -> Result<Catalog> {
    let mut request = HttpRequest::get(urljoin(base_url, "/api/configuration"));
    if let Some(ts) = timestamp.query_param() {
        request = request.query("timestamp", ts);
    }

    let text = transport.send(&request)?;
    let catalog: Catalog = serde_json::from_str(&text)
        .map_err(|e| Error::decode("service configuration", e.to_string()))?;
    tracing::debug!(
        sources = catalog.data_sources.len(),
        variables = catalog.variables.len(),
        %timestamp,
        "fetched service configuration"
    );
    Ok(catalog)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::cell::RefCell;

    pub(crate) const CATALOG_JSON: &str = r#"{
        "DataSources": [
            {"ID": 1, "Name": "NCEP/NCAR Reanalysis 1", "Description": "Reanalysis", "Copyright": "NOAA", "ProvidedVariables": ["airt", "prate"]},
            {"ID": 2, "Name": "CRU CL 2.0", "Description": "Climatology", "Copyright": "CRU", "ProvidedVariables": ["airt"]},
            {"ID": 7, "Name": "WorldClim 1.4", "Description": "", "Copyright": "", "ProvidedVariables": ["prate"]}
        ],
        "EnvironmentalVariables": [
            {"Name": "airt", "Description": "Air temperature near surface", "Units": "Degrees C"},
            {"Name": "prate", "Description": "Precipitation rate", "Units": "mm/month"}
        ]
    }"#;

    pub(crate) fn sample() -> Catalog {
        serde_json::from_str(CATALOG_JSON).unwrap()
    }

    struct Recorder {
        seen: RefCell<Vec<HttpRequest>>,
        reply: &'static str,
    }

    impl Transport for Recorder {
        fn send(&self, request: &HttpRequest) -> Result<String> {
            self.seen.borrow_mut().push(request.clone());
            Ok(self.reply.to_string())
        }
    }

    #[test]
    fn decodes_catalog() {
        let c = sample();
        assert_eq!(c.data_sources.len(), 3);
        assert_eq!(c.source_id("CRU CL 2.0"), Some(2));
        assert_eq!(c.source_name(7), Some("WorldClim 1.4"));
        assert_eq!(c.source_name(99), None);
        assert_eq!(c.variable("airt").map(|v| v.units.as_str()), Some("Degrees C"));
    }

    #[test]
    fn filters_sources_by_variable() {
        let c = sample();
        let names: Vec<_> = c.sources_providing("prate").map(|s| s.id).collect();
        assert_eq!(names, vec![1, 7]);
    }

    #[test]
    fn unknown_source_is_an_error() {
        assert!(matches!(
            sample().require_source_id("nope"),
            Err(Error::UnknownDataSource { .. })
        ));
    }

    #[test]
    fn now_sends_no_timestamp() {
        let t = Recorder {
            seen: RefCell::new(Vec::new()),
            reply: CATALOG_JSON,
        };
        fetch_catalog(&t, "http://fc/", Timestamp::Now).unwrap();
        let seen = t.seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].url, "http://fc/api/configuration");
        assert!(seen[0].query.is_empty());
    }

    #[test]
    fn historical_timestamp_is_minute_resolution() {
        let t = Recorder {
            seen: RefCell::new(Vec::new()),
            reply: CATALOG_JSON,
        };
        let at = Utc.with_ymd_and_hms(2014, 6, 30, 8, 5, 59).unwrap();
        fetch_catalog(&t, "http://fc", Timestamp::At(at)).unwrap();
        assert_eq!(
            t.seen.borrow()[0].query_value("timestamp"),
            Some("2014-06-30T08:05")
        );
    }

    #[test]
    fn malformed_catalog_is_decode_error() {
        let t = Recorder {
            seen: RefCell::new(Vec::new()),
            reply: r#"{"DataSources": [{"Name": 3}]}"#,
        };
        assert!(matches!(
            fetch_catalog(&t, "http://fc", Timestamp::Now),
            Err(Error::Decode { .. })
        ));
    }
}
