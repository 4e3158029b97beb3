//! Reference line geometries for one service day.
//!
//! Each catalog entry is one sub-line travelled in one direction. At build
//! time every entry gets:
//! - a buffered corridor polygon (used for area overlap)
//! - start and end terminus zones (disks around the first/last coordinate)
//!
//! Everything is prepared once and then shared read-only by every matcher
//! window of every trip of the day.

use crate::error::{LineMatchError, Result};
use crate::geo_utils::{polyline_length_m, LocalProjection};
use crate::overlap::Buffering;
use crate::{Bounds, Direction, GpsPoint, LineKey, PlanarBounds};
use geo::{Area, BoundingRect, MultiPolygon, Polygon};
use log::{info, warn};
use rstar::{RTree, AABB};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Raw line geometry as delivered by the line registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineShape {
    pub line_number: String,
    pub sub_line_id: String,
    pub direction: Direction,
    /// Length declared by the registry (drives terminus zone size)
    pub length_km: f64,
    /// Centerline as `[longitude, latitude]` pairs
    pub coordinates: Vec<[f64; 2]>,
}

impl LineShape {
    pub fn new(
        line_number: impl Into<String>,
        sub_line_id: impl Into<String>,
        direction: Direction,
        length_km: f64,
        coordinates: Vec<[f64; 2]>,
    ) -> Self {
        Self {
            line_number: line_number.into(),
            sub_line_id: sub_line_id.into(),
            direction,
            length_km,
            coordinates,
        }
    }

    fn valid_coordinates(&self) -> Vec<[f64; 2]> {
        self.coordinates
            .iter()
            .filter(|c| GpsPoint::new(0, c[1], c[0]).is_valid())
            .copied()
            .collect()
    }
}

/// Configuration for catalog preparation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Corridor half-width around the centerline, in meters.
    /// Default: 15.0
    pub corridor_buffer_m: f64,

    /// Terminus zone radius for lines shorter than `long_line_threshold_km`.
    /// Default: 150.0 meters
    pub short_line_zone_m: f64,

    /// Terminus zone radius for longer lines.
    /// Default: 300.0 meters
    pub long_line_zone_m: f64,

    /// Declared length at which a line counts as long.
    /// Default: 10.0 km
    pub long_line_threshold_km: f64,

    /// Vertices used to approximate circles. Default: 64
    pub circle_segments: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            corridor_buffer_m: 15.0,
            short_line_zone_m: 150.0,
            long_line_zone_m: 300.0,
            long_line_threshold_km: 10.0,
            circle_segments: 64,
        }
    }
}

impl CatalogConfig {
    /// Terminus zone radius for a line of the given declared length.
    pub fn zone_radius_for(&self, length_km: f64) -> f64 {
        if length_km < self.long_line_threshold_km {
            self.short_line_zone_m
        } else {
            self.long_line_zone_m
        }
    }
}

/// A catalog entry with its buffered geometries.
#[derive(Debug, Clone)]
pub struct PreparedLine {
    pub key: LineKey,
    pub declared_length_km: f64,
    /// Geodesic length of the centerline
    pub measured_length_km: f64,
    pub raw_shape: Vec<[f64; 2]>,
    pub corridor: MultiPolygon<f64>,
    pub corridor_area: f64,
    pub start_zone: Polygon<f64>,
    pub end_zone: Polygon<f64>,
    pub zone_radius_m: f64,
}

impl PreparedLine {
    pub fn line_number(&self) -> &str {
        &self.key.line_number
    }

    pub fn sub_line_id(&self) -> &str {
        &self.key.sub_line_id
    }

    pub fn direction(&self) -> Direction {
        self.key.direction
    }
}

/// All prepared line geometries for a day.
#[derive(Debug)]
pub struct GeometryCatalog {
    day: String,
    lines: Vec<PreparedLine>,
    buffering: Buffering,
    index: RTree<PlanarBounds>,
}

impl GeometryCatalog {
    /// Build a catalog with no day label.
    pub fn build(shapes: &[LineShape], config: &CatalogConfig) -> Result<Self> {
        Self::build_for_day("-", shapes, config)
    }

    /// Prepare every usable shape. Fails only if none is usable.
    ///
    /// Shapes with fewer than two valid coordinates, or whose buffers cannot
    /// be built, are skipped with a warning. Duplicate keys keep the first
    /// shape supplied.
    pub fn build_for_day(day: &str, shapes: &[LineShape], config: &CatalogConfig) -> Result<Self> {
        let usable: Vec<(&LineShape, Vec<[f64; 2]>)> = shapes
            .iter()
            .filter_map(|s| {
                let coords = s.valid_coordinates();
                if coords.len() < 2 {
                    warn!(
                        "[Catalog] Skipping {}/{} {}: {} valid coordinates",
                        s.line_number,
                        s.sub_line_id,
                        s.direction,
                        coords.len()
                    );
                    None
                } else {
                    Some((s, coords))
                }
            })
            .collect();

        let all_points: Vec<GpsPoint> = usable
            .iter()
            .flat_map(|(_, coords)| coords.iter().map(|c| GpsPoint::new(0, c[1], c[0])))
            .collect();
        let bounds = Bounds::from_points(&all_points).ok_or_else(|| LineMatchError::EmptyCatalog {
            day: day.to_string(),
        })?;

        let buffering = Buffering::new(LocalProjection::centered_on(&bounds), config.circle_segments);

        let mut seen: HashSet<LineKey> = HashSet::new();
        let mut lines = Vec::with_capacity(usable.len());
        for (shape, coords) in usable {
            let key = LineKey {
                line_number: shape.line_number.clone(),
                sub_line_id: shape.sub_line_id.clone(),
                direction: shape.direction,
            };
            if !seen.insert(key.clone()) {
                warn!(
                    "[Catalog] Duplicate shape for {}/{} {}, keeping the first",
                    key.line_number, key.sub_line_id, key.direction
                );
                continue;
            }

            match prepare_line(key, shape.length_km, coords, &buffering, config) {
                Ok(line) => lines.push(line),
                Err(e) => warn!("[Catalog] {}", e),
            }
        }

        if lines.is_empty() {
            return Err(LineMatchError::EmptyCatalog {
                day: day.to_string(),
            });
        }

        let index = RTree::bulk_load(
            lines
                .iter()
                .enumerate()
                .filter_map(|(idx, line)| planar_bounds(idx, &line.corridor))
                .collect(),
        );

        info!(
            "[Catalog] Prepared {} line geometries for {}",
            lines.len(),
            day
        );

        Ok(Self {
            day: day.to_string(),
            lines,
            buffering,
            index,
        })
    }

    pub fn day(&self) -> &str {
        &self.day
    }

    pub fn lines(&self) -> &[PreparedLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn buffering(&self) -> &Buffering {
        &self.buffering
    }

    /// Look up an entry by key.
    pub fn get(&self, key: &LineKey) -> Option<&PreparedLine> {
        self.lines.iter().find(|l| &l.key == key)
    }

    /// Indices of every direction of a sub-line, in supply order.
    pub fn sub_line_indices(&self, line_number: &str, sub_line_id: &str) -> Vec<usize> {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.line_number() == line_number && l.sub_line_id() == sub_line_id)
            .map(|(i, _)| i)
            .collect()
    }

    /// Indices of entries whose corridor bounding box touches `geometry`,
    /// in supply order. Entries not returned have zero overlap.
    pub fn candidates_near(&self, geometry: &MultiPolygon<f64>) -> Vec<usize> {
        let Some(rect) = geometry.bounding_rect() else {
            return Vec::new();
        };
        let envelope = AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);
        let mut found: Vec<usize> = self
            .index
            .locate_in_envelope_intersecting(&envelope)
            .map(|b| b.idx)
            .collect();
        found.sort_unstable();
        found
    }
}

fn prepare_line(
    key: LineKey,
    declared_length_km: f64,
    coords: Vec<[f64; 2]>,
    buffering: &Buffering,
    config: &CatalogConfig,
) -> Result<PreparedLine> {
    let invalid = |reason: String| LineMatchError::InvalidLineShape {
        line_number: key.line_number.clone(),
        sub_line_id: key.sub_line_id.clone(),
        reason,
    };

    let corridor = buffering
        .polyline(&coords, config.corridor_buffer_m)
        .map_err(|e| invalid(e.to_string()))?;
    let corridor_area = corridor.unsigned_area();
    if corridor_area <= 0.0 {
        return Err(invalid("corridor has zero area".to_string()));
    }

    let zone_radius_m = config.zone_radius_for(declared_length_km);
    let first = coords[0];
    let last = coords[coords.len() - 1];
    let start_zone = buffering
        .lng_lat(first, zone_radius_m)
        .map_err(|e| invalid(e.to_string()))?;
    let end_zone = buffering
        .lng_lat(last, zone_radius_m)
        .map_err(|e| invalid(e.to_string()))?;

    Ok(PreparedLine {
        measured_length_km: polyline_length_m(&coords) / 1000.0,
        key,
        declared_length_km,
        raw_shape: coords,
        corridor,
        corridor_area,
        start_zone,
        end_zone,
        zone_radius_m,
    })
}

fn planar_bounds(idx: usize, geometry: &MultiPolygon<f64>) -> Option<PlanarBounds> {
    geometry.bounding_rect().map(|r| PlanarBounds {
        idx,
        min_x: r.min().x,
        min_y: r.min().y,
        max_x: r.max().x,
        max_y: r.max().y,
    })
}
