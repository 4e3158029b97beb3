//! Geographic utilities: haversine lengths and a local planar projection.

use crate::{Bounds, GpsPoint};
use geo::Coord;
use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two latitude/longitude pairs, in meters.
pub fn haversine_lat_lng(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lng2 - lng1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Total length of a `[lng, lat]` polyline in meters.
pub fn polyline_length_m(coords: &[[f64; 2]]) -> f64 {
    coords
        .windows(2)
        .map(|w| haversine_lat_lng(w[0][1], w[0][0], w[1][1], w[1][0]))
        .sum()
}

/// Equirectangular projection around a fixed origin.
///
/// Maps WGS84 degrees to planar meters. Over the extent of a city
/// (tens of kilometres) distortion stays well under 1%, which is enough for
/// buffer radii of tens to hundreds of meters. The same projection must be
/// used for every geometry that is compared, so the catalog owns it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalProjection {
    pub origin_lat: f64,
    pub origin_lng: f64,
    cos_lat: f64,
}

impl LocalProjection {
    pub fn new(origin_lat: f64, origin_lng: f64) -> Self {
        Self {
            origin_lat,
            origin_lng,
            cos_lat: origin_lat.to_radians().cos(),
        }
    }

    /// Projection centred on the given bounds.
    pub fn centered_on(bounds: &Bounds) -> Self {
        let (lat, lng) = bounds.center();
        Self::new(lat, lng)
    }

    /// Project latitude/longitude to planar meters.
    pub fn project(&self, latitude: f64, longitude: f64) -> Coord<f64> {
        Coord {
            x: EARTH_RADIUS_M * (longitude - self.origin_lng).to_radians() * self.cos_lat,
            y: EARTH_RADIUS_M * (latitude - self.origin_lat).to_radians(),
        }
    }

    /// Project a GPS fix to planar meters.
    pub fn project_point(&self, point: &GpsPoint) -> Coord<f64> {
        self.project(point.latitude, point.longitude)
    }
}
