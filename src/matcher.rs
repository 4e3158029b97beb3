//! Trajectory to line matching.
//!
//! The matcher walks a trip's GPS trace once, growing a window
//! `[search_start, cursor]` until its buffered shape covers enough of some
//! line corridor. Each match is then tightened:
//!
//! 1. **Backward refinement** - shrink the window from the left with the base
//!    (narrow) radius to drop idle time before departure
//! 2. **Direction resolution** - the first point inside a start zone of the
//!    winning sub-line picks the direction
//! 3. **End search** - scan forward to the first point inside a terminus zone
//! 4. **Final overlap** - score `[start, end]` against the resolved corridor
//!
//! Segments never overlap: the next search starts after the previous end.

use crate::catalog::GeometryCatalog;
use crate::overlap::{try_overlap_with_area, Buffering};
use crate::{Direction, GpsPoint, MatchedSegment};
use geo::{BooleanOps, Intersects, MultiPolygon, Polygon};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Configuration for line matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Buffer around each vehicle position, in meters.
    /// Doubled for the coarse window test. Default: 125.0
    pub vehicle_buffer_m: f64,

    /// Corridor coverage (0-100) required to declare a match.
    /// Default: 90.0
    pub overlap_threshold_pct: f64,

    /// Windows spanning this many seconds or fewer never match.
    /// Default: 600 (10 minutes)
    pub min_trip_duration_s: i64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            vehicle_buffer_m: 125.0,
            overlap_threshold_pct: 90.0,
            min_trip_duration_s: 600,
        }
    }
}

impl MatcherConfig {
    /// Radius used while scanning for a candidate line.
    pub fn wide_radius(&self) -> f64 {
        self.vehicle_buffer_m * 2.0
    }
}

/// Which catalog entries a matched segment is scored against.
struct Resolution {
    direction: Option<Direction>,
    lines: Vec<usize>,
}

/// Sliding-window matcher over one day's catalog.
pub struct LineMatcher<'a> {
    catalog: &'a GeometryCatalog,
    config: MatcherConfig,
}

impl<'a> LineMatcher<'a> {
    pub fn new(catalog: &'a GeometryCatalog, config: MatcherConfig) -> Self {
        Self { catalog, config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Split an ordered trace into matched line segments.
    ///
    /// Returns an empty vector when no window reaches the threshold.
    /// Segments come back in trace order with
    /// `segments[i].end_index < segments[i + 1].start_index`.
    pub fn find_segments(&self, points: &[GpsPoint]) -> Vec<MatchedSegment> {
        let total = points.len();
        let mut segments = Vec::new();
        let mut search_start = 0;
        let mut cursor = 0;
        let mut window = WindowBuffer::new(self.catalog.buffering(), self.config.wide_radius());

        while cursor < total {
            window.push(&points[cursor]);

            // Too short to be a trip whatever the overlap
            let elapsed = points[cursor].timestamp - points[search_start].timestamp;
            if elapsed <= self.config.min_trip_duration_s {
                cursor += 1;
                continue;
            }

            let best = window
                .geometry()
                .and_then(|g| self.best_overlap(g, &self.catalog.candidates_near(g)));

            let Some((line_idx, overlap)) = best else {
                cursor += 1;
                continue;
            };

            let line = &self.catalog.lines()[line_idx];
            debug!(
                "[Matcher] cursor {:>4}/{:>4} best {:6.2}% sub-line {:<8} elapsed {:6.1} min",
                cursor,
                total,
                overlap,
                line.sub_line_id(),
                elapsed as f64 / 60.0
            );

            if overlap < self.config.overlap_threshold_pct {
                cursor += 1;
                continue;
            }

            let segment = self.close_segment(points, search_start, cursor, line_idx, overlap);
            debug!(
                "[Matcher] Segment {}/{} {:?} [{}..={}] final {:.2}% end zone: {}",
                segment.line_number,
                segment.sub_line_id,
                segment.direction,
                segment.start_index,
                segment.end_index,
                segment.final_overlap_pct,
                segment.reached_end_zone
            );

            search_start = segment.end_index + 1;
            cursor = search_start;
            window = WindowBuffer::new(self.catalog.buffering(), self.config.wide_radius());
            segments.push(segment);
        }

        segments
    }

    /// Refine a declared match into a segment.
    fn close_segment(
        &self,
        points: &[GpsPoint],
        search_start: usize,
        cursor: usize,
        line_idx: usize,
        initial_overlap_pct: f64,
    ) -> MatchedSegment {
        let start_index = self.refine_start(points, search_start, cursor, line_idx);

        let winner = &self.catalog.lines()[line_idx];
        let resolution =
            self.resolve_direction(&points[start_index..=cursor], winner.line_number(), winner.sub_line_id());
        if resolution.direction.is_none() {
            warn!(
                "[Matcher] No start zone reached for {}/{}, direction unresolved",
                winner.line_number(),
                winner.sub_line_id()
            );
        }

        let (end_index, reached_end_zone) = self.find_end(points, cursor, &resolution.lines);

        let mut window = WindowBuffer::new(self.catalog.buffering(), self.config.wide_radius());
        for p in &points[start_index..=end_index] {
            window.push(p);
        }
        let final_overlap_pct = window
            .geometry()
            .and_then(|g| self.best_overlap(g, &resolution.lines))
            .map(|(_, pct)| pct)
            .unwrap_or(0.0);

        MatchedSegment {
            line_number: winner.line_number().to_string(),
            sub_line_id: winner.sub_line_id().to_string(),
            direction: resolution.direction,
            start_index,
            end_index,
            initial_overlap_pct,
            final_overlap_pct,
            reached_end_zone,
        }
    }

    /// Latest start index whose window `[j, cursor]` still meets the threshold
    /// with the base radius. Falls back to `search_start`.
    fn refine_start(
        &self,
        points: &[GpsPoint],
        search_start: usize,
        cursor: usize,
        line_idx: usize,
    ) -> usize {
        let mut window = WindowBuffer::new(self.catalog.buffering(), self.config.vehicle_buffer_m);
        for j in (search_start..=cursor).rev() {
            window.push(&points[j]);
            let Some(geometry) = window.geometry() else {
                continue;
            };
            if self.corridor_overlap(geometry, line_idx) >= self.config.overlap_threshold_pct {
                return j;
            }
        }
        search_start
    }

    /// Pick the direction whose start zone is reached first.
    fn resolve_direction(
        &self,
        points: &[GpsPoint],
        line_number: &str,
        sub_line_id: &str,
    ) -> Resolution {
        let candidates = self.catalog.sub_line_indices(line_number, sub_line_id);
        let lines = self.catalog.lines();

        for p in points {
            let Some(disk) = self.position_disk(p) else {
                continue;
            };
            if let Some(&idx) = candidates
                .iter()
                .find(|&&idx| disk.intersects(&lines[idx].start_zone))
            {
                return Resolution {
                    direction: Some(lines[idx].direction()),
                    lines: vec![idx],
                };
            }
        }

        Resolution {
            direction: None,
            lines: candidates,
        }
    }

    /// First index from `cursor` onward touching a terminus zone of `lines`.
    fn find_end(&self, points: &[GpsPoint], cursor: usize, lines: &[usize]) -> (usize, bool) {
        let catalog_lines = self.catalog.lines();
        for (k, p) in points.iter().enumerate().skip(cursor) {
            let Some(disk) = self.position_disk(p) else {
                continue;
            };
            let hit = lines.iter().any(|&idx| {
                let line = &catalog_lines[idx];
                disk.intersects(&line.start_zone) || disk.intersects(&line.end_zone)
            });
            if hit {
                return (k, true);
            }
        }
        (cursor, false)
    }

    /// Highest overlap among `candidates`; ties keep the earliest candidate.
    fn best_overlap(&self, trajectory: &MultiPolygon<f64>, candidates: &[usize]) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for &idx in candidates {
            let pct = self.corridor_overlap(trajectory, idx);
            match best {
                Some((_, best_pct)) if pct <= best_pct => {}
                _ => best = Some((idx, pct)),
            }
        }
        best
    }

    /// Overlap against one corridor; a failed computation counts as 0%.
    fn corridor_overlap(&self, trajectory: &MultiPolygon<f64>, line_idx: usize) -> f64 {
        let line = &self.catalog.lines()[line_idx];
        match try_overlap_with_area(trajectory, &line.corridor, line.corridor_area) {
            Ok(pct) => pct,
            Err(e) => {
                debug!(
                    "[Matcher] Overlap with {}/{} {} failed, using 0%: {}",
                    line.line_number(),
                    line.sub_line_id(),
                    line.direction(),
                    e
                );
                0.0
            }
        }
    }

    fn position_disk(&self, point: &GpsPoint) -> Option<Polygon<f64>> {
        self.catalog
            .buffering()
            .point(point, self.config.vehicle_buffer_m)
            .ok()
    }
}

/// Buffered union of a window of points, grown one point at a time.
struct WindowBuffer<'b> {
    buffering: &'b Buffering,
    radius: f64,
    geometry: Option<MultiPolygon<f64>>,
    last: Option<(f64, f64)>,
}

impl<'b> WindowBuffer<'b> {
    fn new(buffering: &'b Buffering, radius: f64) -> Self {
        Self {
            buffering,
            radius,
            geometry: None,
            last: None,
        }
    }

    fn push(&mut self, point: &GpsPoint) {
        let coords = (point.latitude, point.longitude);
        if self.last == Some(coords) {
            return;
        }
        let disk = match self.buffering.point(point, self.radius) {
            Ok(d) => MultiPolygon::new(vec![d]),
            Err(e) => {
                debug!("[Matcher] Skipping unusable fix at {}: {}", point.timestamp, e);
                return;
            }
        };
        self.last = Some(coords);
        self.geometry = Some(match self.geometry.take() {
            Some(acc) => acc.union(&disk),
            None => disk,
        });
    }

    fn geometry(&self) -> Option<&MultiPolygon<f64>> {
        self.geometry.as_ref()
    }
}
