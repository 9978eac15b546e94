//! `arborsync-geo` — batch coordinate reprojection.
//!
//! Pure crate: one configured (source, target) reference-system pair,
//! resolved once, applied to whole batches. No IO dependencies.

use proj4rs::proj::Proj;
use thiserror::Error;

/// EPSG code of WGS84 geographic coordinates, the default target.
pub const WGS84: u32 = 4326;

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("EPSG:{epsg} is not a usable reference system: {reason}")]
    UnknownCrs { epsg: u32, reason: String },

    #[error("point {index} cannot be projected: {reason}")]
    Transform { index: usize, reason: String },
}

/// A coordinate pair. `x` is easting (or longitude in degrees for a
/// geographic system), `y` is northing (or latitude in degrees).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub x: f64,
    pub y: f64,
}

impl GeoPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Stateless reprojection between a fixed pair of reference systems.
///
/// Resolving the EPSG definitions is the expensive part, so a transformer
/// is built once per run and [`transform_batch`](Self::transform_batch)
/// amortizes that cost across every row of the batch.
pub struct GeoTransformer {
    source: Proj,
    target: Proj,
    source_epsg: u32,
    target_epsg: u32,
}

impl std::fmt::Debug for GeoTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoTransformer")
            .field("source_epsg", &self.source_epsg)
            .field("target_epsg", &self.target_epsg)
            .finish()
    }
}

impl GeoTransformer {
    pub fn new(source_epsg: u32, target_epsg: u32) -> Result<Self, GeoError> {
        Ok(Self {
            source: resolve(source_epsg)?,
            target: resolve(target_epsg)?,
            source_epsg,
            target_epsg,
        })
    }

    /// Source→WGS84, the canonical configuration.
    pub fn to_wgs84(source_epsg: u32) -> Result<Self, GeoError> {
        Self::new(source_epsg, WGS84)
    }

    pub fn source_epsg(&self) -> u32 {
        self.source_epsg
    }

    pub fn target_epsg(&self) -> u32 {
        self.target_epsg
    }

    /// Reproject every point, or fail the whole batch.
    ///
    /// Atomic by construction: the output vector is returned only when
    /// every point projected to a finite pair, so callers never observe a
    /// partially transformed batch.
    pub fn transform_batch(&self, points: &[GeoPoint]) -> Result<Vec<GeoPoint>, GeoError> {
        let mut out = Vec::with_capacity(points.len());
        for (index, point) in points.iter().enumerate() {
            out.push(self.transform_one(index, *point)?);
        }
        Ok(out)
    }

    fn transform_one(&self, index: usize, point: GeoPoint) -> Result<GeoPoint, GeoError> {
        if !point.x.is_finite() || !point.y.is_finite() {
            return Err(GeoError::Transform { index, reason: "input is not finite".into() });
        }

        // proj4rs works in radians for geographic systems
        let mut pair = if self.source.is_latlong() {
            (point.x.to_radians(), point.y.to_radians(), 0.0)
        } else {
            (point.x, point.y, 0.0)
        };

        proj4rs::transform::transform(&self.source, &self.target, &mut pair)
            .map_err(|e| GeoError::Transform { index, reason: e.to_string() })?;

        let (x, y) = if self.target.is_latlong() {
            (pair.0.to_degrees(), pair.1.to_degrees())
        } else {
            (pair.0, pair.1)
        };

        if !x.is_finite() || !y.is_finite() {
            return Err(GeoError::Transform { index, reason: "result is not finite".into() });
        }

        Ok(GeoPoint::new(x, y))
    }
}

fn resolve(epsg: u32) -> Result<Proj, GeoError> {
    let code = u16::try_from(epsg)
        .map_err(|_| GeoError::UnknownCrs { epsg, reason: "code out of range".into() })?;
    Proj::from_epsg_code(code)
        .map_err(|e| GeoError::UnknownCrs { epsg, reason: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    // ETRS89 / UTM zone 32N, the planar system of the municipal exports.
    const UTM32N: u32 = 25832;

    // A point in the middle of Flensburg, as (easting, northing).
    const FLENSBURG_UTM: GeoPoint = GeoPoint { x: 512_000.0, y: 6_069_000.0 };

    #[test]
    fn utm32n_lands_in_the_expected_geographic_window() {
        let transformer = GeoTransformer::to_wgs84(UTM32N).unwrap();
        let out = transformer.transform_batch(&[FLENSBURG_UTM]).unwrap();
        let (lon, lat) = (out[0].x, out[0].y);
        assert!((8.5..10.0).contains(&lon), "lon {lon}");
        assert!((54.0..55.5).contains(&lat), "lat {lat}");
    }

    #[test]
    fn round_trip_reproduces_the_source_pair() {
        let forward = GeoTransformer::new(UTM32N, WGS84).unwrap();
        let back = GeoTransformer::new(WGS84, UTM32N).unwrap();

        let there = forward.transform_batch(&[FLENSBURG_UTM]).unwrap();
        let home = back.transform_batch(&there).unwrap();

        assert!((home[0].x - FLENSBURG_UTM.x).abs() < 1e-2, "easting {}", home[0].x);
        assert!((home[0].y - FLENSBURG_UTM.y).abs() < 1e-2, "northing {}", home[0].y);
    }

    #[test]
    fn batch_fails_atomically_on_a_bad_point() {
        let transformer = GeoTransformer::to_wgs84(UTM32N).unwrap();
        let points = [
            FLENSBURG_UTM,
            GeoPoint::new(f64::NAN, 6_069_000.0),
            GeoPoint::new(512_100.0, 6_069_100.0),
        ];
        let err = transformer.transform_batch(&points).unwrap_err();
        assert!(matches!(err, GeoError::Transform { index: 1, .. }));
    }

    #[test]
    fn unknown_epsg_is_rejected_up_front() {
        let err = GeoTransformer::to_wgs84(64999).unwrap_err();
        assert!(matches!(err, GeoError::UnknownCrs { epsg: 64999, .. }));
    }

    #[test]
    fn identity_pair_passes_degrees_through() {
        let transformer = GeoTransformer::new(WGS84, WGS84).unwrap();
        let out = transformer.transform_batch(&[GeoPoint::new(9.43, 54.78)]).unwrap();
        assert!((out[0].x - 9.43).abs() < 1e-9);
        assert!((out[0].y - 54.78).abs() < 1e-9);
    }
}
