//! Maps numeric data source ids to the names in the service catalog.

use ndarray::Array2;
use serde::Serialize;
use std::fmt;

use crate::catalog::Catalog;
use crate::reshape::Raster;

/// A data source as reported for one value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum SourceLabel {
    Named(String),
    /// Id the catalog does not list. Kept as the raw number.
    Unresolved(i32),
}

impl SourceLabel {
    pub fn name(&self) -> Option<&str> {
        match self {
            SourceLabel::Named(n) => Some(n),
            SourceLabel::Unresolved(_) => None,
        }
    }
}

impl fmt::Display for SourceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLabel::Named(n) => f.write_str(n),
            SourceLabel::Unresolved(id) => write!(f, "{}", id),
        }
    }
}

pub fn resolve_id(id: i32, catalog: &Catalog) -> SourceLabel {
    match catalog.source_name(id) {
        Some(name) => SourceLabel::Named(name.to_string()),
        None => SourceLabel::Unresolved(id),
    }
}

pub fn resolve_matrix(ids: &Array2<Option<i32>>, catalog: &Catalog) -> Array2<Option<SourceLabel>> {
    let resolved = ids.map(|&cell| cell.map(|id| resolve_id(id, catalog)));
    warn_unresolved(resolved.iter());
    resolved
}

pub fn resolve_raster(raster: Raster<i32>, catalog: &Catalog) -> Raster<SourceLabel> {
    let resolved = raster.map_provenance(|id| resolve_id(id, catalog));
    warn_unresolved(resolved.cells.iter().map(|c| &c.provenance));
    resolved
}

fn warn_unresolved<'a>(labels: impl Iterator<Item = &'a Option<SourceLabel>>) {
    let mut unresolved: Vec<i32> = labels
        .filter_map(|l| match l {
            Some(SourceLabel::Unresolved(id)) => Some(*id),
            _ => None,
        })
        .collect();
    if unresolved.is_empty() {
        return;
    }
    unresolved.sort_unstable();
    unresolved.dedup();
    tracing::warn!(ids = ?unresolved, "provenance ids missing from the service catalog");
}
