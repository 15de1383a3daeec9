//! Turns decoded payloads into point-by-time matrices or a grid raster.

use ndarray::Array2;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::payload::{Nested, RawPayload};

/// Matrices with one row per location and one column per time bin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointMatrices {
    pub values: Array2<Option<f64>>,
    pub sd: Array2<Option<f64>>,
    pub provenance: Array2<Option<i32>>,
}

/// Reshape a time-series payload of `n_points` rows by `n_bins` columns.
///
/// When `explicit_id` is given the payload carried no provenance and every
/// cell is attributed to that source.
pub fn reshape_points(
    payload: &RawPayload,
    n_points: usize,
    n_bins: usize,
    explicit_id: Option<i32>,
) -> Result<PointMatrices> {
    let values = matrix(&payload.values, n_points, n_bins, "values")?;
    let sd = matrix(&payload.sd, n_points, n_bins, "sd")?;
    let provenance = match (explicit_id, &payload.provenance) {
        (Some(id), _) => Array2::from_elem((n_points, n_bins), Some(id)),
        (None, Some(p)) => matrix(p, n_points, n_bins, "provenance")?,
        (None, None) => {
            return Err(Error::decode(
                "result payload",
                "provenance was requested but not returned",
            ));
        }
    };
    Ok(PointMatrices {
        values,
        sd,
        provenance,
    })
}

fn matrix<T: Copy>(
    nested: &Nested<T>,
    rows: usize,
    cols: usize,
    field: &str,
) -> Result<Array2<Option<T>>> {
    let row_items = nested.rows();
    if row_items.len() != rows {
        return Err(Error::decode(
            field,
            format!("expected {} locations, got {}", rows, row_items.len()),
        ));
    }

    let mut flat = Vec::with_capacity(rows * cols);
    for (i, row) in row_items.iter().enumerate() {
        let cells = row.flatten();
        if cells.len() != cols {
            return Err(Error::decode(
                field,
                format!(
                    "location {} has {} time bins, expected {}",
                    i,
                    cells.len(),
                    cols
                ),
            ));
        }
        flat.extend(cells);
    }

    Array2::from_shape_vec((rows, cols), flat).map_err(|e| Error::decode(field, e.to_string()))
}

/// Coordinate reference of every raster built here.
pub const LONLAT_CRS: &str = "+proj=longlat +datum=WGS84";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridCell<P> {
    pub lon: f64,
    pub lat: f64,
    pub value: Option<f64>,
    pub sd: Option<f64>,
    pub provenance: Option<P>,
}

/// Cells ordered longitude-major: `(lon0, lat0), (lon0, lat1), .., (lon1, lat0), ..`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Raster<P> {
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
    pub cells: Vec<GridCell<P>>,
    pub crs: &'static str,
    pub regular: bool,
}

impl<P> Raster<P> {
    pub fn cell(&self, lon_idx: usize, lat_idx: usize) -> Option<&GridCell<P>> {
        if lon_idx >= self.lons.len() || lat_idx >= self.lats.len() {
            return None;
        }
        self.cells.get(lon_idx * self.lats.len() + lat_idx)
    }

    /// Cell at the given axis coordinates.
    pub fn at(&self, lon: f64, lat: f64) -> Option<&GridCell<P>> {
        let i = position(&self.lons, lon)?;
        let j = position(&self.lats, lat)?;
        self.cell(i, j)
    }

    /// Values as a `[lon, lat]` array. Nodes without a cell are `None`.
    pub fn values(&self) -> Array2<Option<f64>> {
        Array2::from_shape_fn((self.lons.len(), self.lats.len()), |(i, j)| {
            self.cell(i, j).and_then(|c| c.value)
        })
    }

    pub fn sd(&self) -> Array2<Option<f64>> {
        Array2::from_shape_fn((self.lons.len(), self.lats.len()), |(i, j)| {
            self.cell(i, j).and_then(|c| c.sd)
        })
    }

    pub fn map_provenance<Q>(self, mut f: impl FnMut(P) -> Q) -> Raster<Q> {
        Raster {
            lats: self.lats,
            lons: self.lons,
            cells: self
                .cells
                .into_iter()
                .map(|c| GridCell {
                    lon: c.lon,
                    lat: c.lat,
                    value: c.value,
                    sd: c.sd,
                    provenance: c.provenance.map(&mut f),
                })
                .collect(),
            crs: self.crs,
            regular: self.regular,
        }
    }
}

fn position(axis: &[f64], v: f64) -> Option<usize> {
    axis.iter().position(|a| (a - v).abs() <= 1e-9)
}

/// Stretch a grid payload over `lats` (A) x `lons` (B) into A*B cells,
/// outer loop over longitude and inner over latitude.
pub fn reshape_grid(
    payload: &RawPayload,
    lats: &[f64],
    lons: &[f64],
    explicit_id: Option<i32>,
) -> Result<Raster<i32>> {
    let expected = lats.len() * lons.len();
    let values = grid_field(&payload.values, expected, "values")?;
    let sd = grid_field(&payload.sd, expected, "sd")?;
    let provenance = match (explicit_id, &payload.provenance) {
        (Some(id), _) => vec![Some(id); expected],
        (None, Some(p)) => grid_field(p, expected, "provenance")?,
        (None, None) => {
            return Err(Error::decode(
                "result payload",
                "provenance was requested but not returned",
            ));
        }
    };

    let mut cells = Vec::with_capacity(expected);
    for (i, &lon) in lons.iter().enumerate() {
        for (j, &lat) in lats.iter().enumerate() {
            let k = i * lats.len() + j;
            cells.push(GridCell {
                lon,
                lat,
                value: values[k],
                sd: sd[k],
                provenance: provenance[k],
            });
        }
    }

    Ok(Raster {
        lats: lats.to_vec(),
        lons: lons.to_vec(),
        cells,
        crs: LONLAT_CRS,
        regular: true,
    })
}

fn grid_field<T: Copy>(nested: &Nested<T>, expected: usize, field: &str) -> Result<Vec<Option<T>>> {
    let flat = nested.flatten();
    if flat.len() != expected {
        return Err(Error::decode(
            field,
            format!("expected {} grid cells, got {}", expected, flat.len()),
        ));
    }
    Ok(flat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn payload(json: &str) -> RawPayload {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn points_shape_is_locations_by_bins() {
        let p = payload(
            r#"{"values": [[1,2,3],[4,null,6]], "sd": [[0.1,0.2,0.3],[0.4,0.5,null]], "provenance": [[1,1,2],[2,null,2]]}"#,
        );
        let m = reshape_points(&p, 2, 3, None).unwrap();
        assert_eq!(m.values.dim(), (2, 3));
        assert_eq!(m.sd.dim(), (2, 3));
        assert_eq!(m.provenance.dim(), (2, 3));
        assert_eq!(m.values[[1, 1]], None);
        assert_eq!(m.values[[1, 2]], Some(6.0));
        assert_eq!(m.sd[[1, 2]], None);
        assert_eq!(m.provenance[[0, 2]], Some(2));
        assert_eq!(m.provenance[[1, 1]], None);
    }

    #[test]
    fn explicit_source_overrides_payload_provenance() {
        let p = payload(r#"{"values": [[1,2]], "sd": [[0,0]], "provenance": [[5,6]]}"#);
        let m = reshape_points(&p, 1, 2, Some(9)).unwrap();
        assert!(m.provenance.iter().all(|&id| id == Some(9)));
    }

    #[test]
    fn missing_value_never_becomes_zero() {
        let p = payload(r#"{"values": [[null]], "sd": [[null]]}"#);
        let m = reshape_points(&p, 1, 1, Some(1)).unwrap();
        let row: Vec<Option<f64>> = m.values.row(0).to_vec();
        assert_eq!(serde_json::to_string(&row).unwrap(), "[null]");
        assert_ne!(m.values[[0, 0]], Some(0.0));
    }

    #[test]
    fn wrong_shape_is_decode_error() {
        let p = payload(r#"{"values": [[1,2]], "sd": [[0,0]], "provenance": [[1,1]]}"#);
        assert!(matches!(
            reshape_points(&p, 2, 2, None),
            Err(Error::Decode { .. })
        ));
        assert!(matches!(
            reshape_points(&p, 1, 3, None),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn missing_provenance_for_any_source_is_decode_error() {
        let p = payload(r#"{"values": [[1]], "sd": [[0]]}"#);
        assert!(reshape_points(&p, 1, 1, None).is_err());
    }

    #[test]
    fn grid_is_stretched_lon_major() {
        let p = payload(
            r#"{"values": [[1,2],[3,null]], "sd": [[0.1,0.2],[0.3,0.4]], "provenance": [[1,1],[2,2]]}"#,
        );
        let r = reshape_grid(&p, &[0.0, 1.0], &[10.0, 11.0], None).unwrap();
        let order: Vec<(f64, f64)> = r.cells.iter().map(|c| (c.lon, c.lat)).collect();
        assert_eq!(
            order,
            vec![(10.0, 0.0), (10.0, 1.0), (11.0, 0.0), (11.0, 1.0)]
        );
        assert_eq!(r.at(11.0, 0.0).unwrap().value, Some(3.0));
        assert_eq!(r.at(11.0, 1.0).unwrap().value, None);
        assert_eq!(r.cell(0, 1).unwrap().provenance, Some(1));
        assert!(r.at(12.0, 0.0).is_none());
        assert!(r.regular);
        assert_eq!(r.crs, LONLAT_CRS);
        assert_eq!(r.values()[[1, 0]], Some(3.0));
        assert_eq!(r.sd()[[0, 1]], Some(0.2));
    }

    #[test]
    fn arrays_tolerate_axes_edited_past_the_cells() {
        let p = payload(r#"{"values": [[1,2],[3,4]], "sd": [[0,0],[0,0]]}"#);
        let mut r = reshape_grid(&p, &[0.0, 1.0], &[10.0, 11.0], Some(1)).unwrap();
        r.lons.push(12.0);
        let values = r.values();
        assert_eq!(values.dim(), (3, 2));
        assert_eq!(values[[1, 1]], Some(4.0));
        assert_eq!(values[[2, 0]], None);
        assert_eq!(r.sd()[[2, 1]], None);
    }

    #[test]
    fn grid_with_time_dimension_and_explicit_source() {
        let p = payload(r#"{"values": [[[1]],[[2]],[[3]]], "sd": [[[0]],[[0]],[[0]]]}"#);
        let r = reshape_grid(&p, &[5.0], &[1.0, 2.0, 3.0], Some(4)).unwrap();
        assert_eq!(r.cells.len(), 3);
        assert!(r.cells.iter().all(|c| c.provenance == Some(4)));
        assert_eq!(r.cell(2, 0).unwrap().value, Some(3.0));
    }

    #[test]
    fn grid_cell_count_mismatch() {
        let p = payload(r#"{"values": [[1,2]], "sd": [[0,0]]}"#);
        assert!(reshape_grid(&p, &[0.0, 1.0], &[10.0, 11.0], Some(1)).is_err());
    }
}
