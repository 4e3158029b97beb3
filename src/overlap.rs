//! Buffering and corridor overlap scoring.
//!
//! All geometry here lives in the planar meter space of a
//! [`LocalProjection`]. Disks are regular polygons with
//! `circle_segments` vertices; polylines are buffered as the union of one
//! rectangle per segment and one disk per vertex (round caps and joins).
//!
//! Unions are cascaded pairwise, so buffering `n` disks costs
//! `O(log n)` rounds of boolean operations instead of `n` sequential ones.

use crate::error::GeometryError;
use crate::geo_utils::LocalProjection;
use crate::GpsPoint;
use geo::{Area, BooleanOps, Coord, LineString, MultiPolygon, Polygon};
use log::debug;
use std::f64::consts::PI;

/// Points closer than this (meters) are collapsed before buffering.
const DEDUP_DISTANCE_M: f64 = 0.5;

/// Buffering parameters shared by every geometry of a catalog.
#[derive(Debug, Clone, Copy)]
pub struct Buffering {
    pub projection: LocalProjection,
    /// Vertices used to approximate a circle
    pub circle_segments: usize,
}

impl Buffering {
    pub fn new(projection: LocalProjection, circle_segments: usize) -> Self {
        Self {
            projection,
            circle_segments: circle_segments.max(8),
        }
    }

    /// Disk of `radius` meters around a single GPS fix.
    pub fn point(&self, point: &GpsPoint, radius: f64) -> Result<Polygon<f64>, GeometryError> {
        check_radius(radius)?;
        let c = self.projection.project_point(point);
        check_coord(c)?;
        Ok(disk(c, radius, self.circle_segments))
    }

    /// Disk of `radius` meters around a `[lng, lat]` coordinate.
    pub fn lng_lat(&self, coord: [f64; 2], radius: f64) -> Result<Polygon<f64>, GeometryError> {
        check_radius(radius)?;
        let c = self.projection.project(coord[1], coord[0]);
        check_coord(c)?;
        Ok(disk(c, radius, self.circle_segments))
    }

    /// Union of per-point disks: the vehicle's approximate swept area.
    pub fn trajectory(
        &self,
        points: &[GpsPoint],
        radius: f64,
    ) -> Result<MultiPolygon<f64>, GeometryError> {
        check_radius(radius)?;
        if points.is_empty() {
            return Err(GeometryError::Empty);
        }

        let mut centers: Vec<Coord<f64>> = Vec::with_capacity(points.len());
        for p in points {
            let c = self.projection.project_point(p);
            check_coord(c)?;
            // Idle vehicles report the same fix many times
            if let Some(last) = centers.last() {
                if planar_distance(*last, c) < DEDUP_DISTANCE_M {
                    continue;
                }
            }
            centers.push(c);
        }

        let disks = centers
            .into_iter()
            .map(|c| MultiPolygon::new(vec![disk(c, radius, self.circle_segments)]))
            .collect();
        Ok(cascaded_union(disks))
    }

    /// Round-capped buffer of a `[lng, lat]` polyline: a line corridor.
    pub fn polyline(
        &self,
        coords: &[[f64; 2]],
        radius: f64,
    ) -> Result<MultiPolygon<f64>, GeometryError> {
        check_radius(radius)?;
        if coords.is_empty() {
            return Err(GeometryError::Empty);
        }

        let mut projected: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
        for c in coords {
            let p = self.projection.project(c[1], c[0]);
            check_coord(p)?;
            if let Some(last) = projected.last() {
                if planar_distance(*last, p) < DEDUP_DISTANCE_M {
                    continue;
                }
            }
            projected.push(p);
        }

        let mut parts: Vec<MultiPolygon<f64>> = Vec::with_capacity(projected.len() * 2);
        for c in &projected {
            parts.push(MultiPolygon::new(vec![disk(*c, radius, self.circle_segments)]));
        }
        for w in projected.windows(2) {
            if let Some(rect) = segment_rectangle(w[0], w[1], radius) {
                parts.push(MultiPolygon::new(vec![rect]));
            }
        }

        Ok(cascaded_union(parts))
    }
}

/// Buffer a trajectory with the given radius (meters).
///
/// Convenience wrapper over [`Buffering::trajectory`].
pub fn buffer_trajectory(
    points: &[GpsPoint],
    radius: f64,
    buffering: &Buffering,
) -> Result<MultiPolygon<f64>, GeometryError> {
    buffering.trajectory(points, radius)
}

/// Percentage (0-100) of `corridor` covered by `trajectory`.
///
/// Errors on degenerate input; an empty intersection is `Ok(0.0)`.
pub fn try_overlap_percentage(
    trajectory: &MultiPolygon<f64>,
    corridor: &MultiPolygon<f64>,
) -> Result<f64, GeometryError> {
    try_overlap_with_area(trajectory, corridor, corridor.unsigned_area())
}

/// Same as [`try_overlap_percentage`] with a precomputed corridor area.
pub(crate) fn try_overlap_with_area(
    trajectory: &MultiPolygon<f64>,
    corridor: &MultiPolygon<f64>,
    corridor_area: f64,
) -> Result<f64, GeometryError> {
    if !corridor_area.is_finite() || corridor_area <= 0.0 {
        return Err(GeometryError::DegenerateCorridor);
    }
    if trajectory.0.is_empty() {
        return Ok(0.0);
    }

    let intersection = corridor.intersection(trajectory);
    if intersection.0.is_empty() {
        return Ok(0.0);
    }

    let pct = 100.0 * intersection.unsigned_area() / corridor_area;
    if !pct.is_finite() {
        return Err(GeometryError::DegenerateCorridor);
    }
    Ok(pct.clamp(0.0, 100.0))
}

/// Overlap percentage with failures counted as zero overlap.
pub fn overlap_percentage(trajectory: &MultiPolygon<f64>, corridor: &MultiPolygon<f64>) -> f64 {
    try_overlap_percentage(trajectory, corridor).unwrap_or_else(|e| {
        debug!("[Overlap] Treating failed overlap as 0%: {}", e);
        0.0
    })
}

/// Union a set of polygons by pairwise reduction.
pub fn cascaded_union(mut parts: Vec<MultiPolygon<f64>>) -> MultiPolygon<f64> {
    while parts.len() > 1 {
        let mut next = Vec::with_capacity(parts.len().div_ceil(2));
        let mut iter = parts.into_iter();
        while let Some(a) = iter.next() {
            match iter.next() {
                Some(b) => next.push(a.union(&b)),
                None => next.push(a),
            }
        }
        parts = next;
    }
    parts.pop().unwrap_or_else(|| MultiPolygon::new(vec![]))
}

/// Regular polygon approximating a circle.
pub fn disk(center: Coord<f64>, radius: f64, segments: usize) -> Polygon<f64> {
    let n = segments.max(8);
    let ring: Vec<Coord<f64>> = (0..n)
        .map(|i| {
            let angle = 2.0 * PI * i as f64 / n as f64;
            Coord {
                x: center.x + radius * angle.cos(),
                y: center.y + radius * angle.sin(),
            }
        })
        .collect();
    Polygon::new(LineString::new(ring), vec![])
}

/// Rectangle of half-width `radius` around segment a-b, or `None` if a == b.
fn segment_rectangle(a: Coord<f64>, b: Coord<f64>, radius: f64) -> Option<Polygon<f64>> {
    let len = planar_distance(a, b);
    if len < f64::EPSILON {
        return None;
    }
    let nx = -(b.y - a.y) / len * radius;
    let ny = (b.x - a.x) / len * radius;

    let ring = vec![
        Coord { x: a.x + nx, y: a.y + ny },
        Coord { x: a.x - nx, y: a.y - ny },
        Coord { x: b.x - nx, y: b.y - ny },
        Coord { x: b.x + nx, y: b.y + ny },
    ];
    Some(Polygon::new(LineString::new(ring), vec![]))
}

fn planar_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

fn check_coord(c: Coord<f64>) -> Result<(), GeometryError> {
    if c.x.is_finite() && c.y.is_finite() {
        Ok(())
    } else {
        Err(GeometryError::NonFinite { x: c.x, y: c.y })
    }
}

fn check_radius(radius: f64) -> Result<(), GeometryError> {
    if radius.is_finite() && radius > 0.0 {
        Ok(())
    } else {
        Err(GeometryError::InvalidRadius(radius))
    }
}
