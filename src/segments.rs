//! Track segmentation for rendering.
//!
//! A track is drawn as a sequence of polylines, one per maximal run of points that
//! share the same spreading flag and load source. Spreading runs take the color of
//! the storage they were loaded from, transit runs are gray.

use geo::{Coord, LineString, Simplify};
use serde::{Deserialize, Serialize};

use crate::farm::{ActivityType, FertilizerType, StorageLocation};
use crate::geo_utils::meters_to_degrees;
use crate::{GeoPoint, TrackPoint};

/// Color of non-spreading runs.
pub const TRANSIT_COLOR: &str = "#9E9E9E";
/// Color of working runs for activities that draw from no storage.
pub const WORKING_COLOR: &str = "#1976D2";

const SLURRY_PALETTE: [&str; 6] = ["#8D6E63", "#6D4C41", "#A1887F", "#4E342E", "#BCAAA4", "#795548"];
const MANURE_PALETTE: [&str; 6] = ["#F57C00", "#E65100", "#FFB74D", "#BF360C", "#FFA726", "#EF6C00"];

fn palette(fertilizer: FertilizerType) -> &'static [&'static str] {
    match fertilizer {
        FertilizerType::Slurry => &SLURRY_PALETTE,
        FertilizerType::Manure => &MANURE_PALETTE,
    }
}

/// A contiguous run of track points drawn in one color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TrackSegment {
    pub is_spreading: bool,
    pub storage_id: Option<String>,
    /// Hex color (#RRGGBB)
    pub color: String,
    pub points: Vec<GeoPoint>,
}

/// Deterministic color for a load source.
///
/// Storages of the activity's fertilizer type are sorted by id and indexed into that
/// type's palette, so the same storage keeps its color across reloads. Unknown or
/// missing sources fall back to the palette's base color.
pub fn source_color(storage_id: Option<&str>, storages: &[StorageLocation], activity: &ActivityType) -> String {
    let Some(fertilizer) = activity.fertilizer() else {
        return WORKING_COLOR.to_string();
    };
    let colors = palette(fertilizer);

    let mut ids: Vec<&str> = storages
        .iter()
        .filter(|s| s.storage_type == fertilizer)
        .map(|s| s.id.as_str())
        .collect();
    ids.sort_unstable();

    storage_id
        .and_then(|id| ids.iter().position(|candidate| *candidate == id))
        .map(|i| colors[i % colors.len()])
        .unwrap_or(colors[0])
        .to_string()
}

/// Group ordered track points into colored segments.
///
/// Each segment after the first starts with the last point of its predecessor, so
/// the drawn path has no gaps. Fewer than two points produce no segments; a run of a
/// single leading point is not emitted on its own but opens the following segment.
pub fn build_segments(points: &[TrackPoint], storages: &[StorageLocation], activity: &ActivityType) -> Vec<TrackSegment> {
    if points.len() < 2 {
        return Vec::new();
    }

    let color_for = |is_spreading: bool, storage_id: Option<&str>| -> String {
        if is_spreading {
            source_color(storage_id, storages, activity)
        } else {
            TRANSIT_COLOR.to_string()
        }
    };

    let mut segments: Vec<TrackSegment> = Vec::new();
    let mut current = TrackSegment {
        is_spreading: points[0].is_spreading,
        storage_id: points[0].storage_id.clone(),
        color: color_for(points[0].is_spreading, points[0].storage_id.as_deref()),
        points: vec![points[0].position()],
    };

    for point in &points[1..] {
        if point.is_spreading == current.is_spreading && point.storage_id == current.storage_id {
            current.points.push(point.position());
            continue;
        }

        let bridge = current.points.last().copied();
        let next = TrackSegment {
            is_spreading: point.is_spreading,
            storage_id: point.storage_id.clone(),
            color: color_for(point.is_spreading, point.storage_id.as_deref()),
            points: bridge.into_iter().chain(std::iter::once(point.position())).collect(),
        };
        let finished = std::mem::replace(&mut current, next);
        if finished.points.len() >= 2 {
            segments.push(finished);
        }
    }

    if current.points.len() >= 2 {
        segments.push(current);
    }

    segments
}

/// Douglas-Peucker reduction of a segment's geometry.
///
/// `tolerance_m` is in meters. Both end points are always kept.
pub fn simplify_segment(segment: &TrackSegment, tolerance_m: f64) -> Vec<GeoPoint> {
    if segment.points.len() < 3 || tolerance_m <= 0.0 {
        return segment.points.clone();
    }

    let (epsilon, _) = meters_to_degrees(tolerance_m, segment.points[0].lat);
    let line = LineString::new(
        segment
            .points
            .iter()
            .map(|p| Coord { x: p.lng, y: p.lat })
            .collect(),
    );

    line.simplify(&epsilon)
        .0
        .into_iter()
        .map(|c| GeoPoint::new(c.y, c.x))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, is_spreading: bool, storage_id: Option<&str>) -> TrackPoint {
        TrackPoint {
            lat,
            lng: 8.0,
            timestamp: 0,
            speed: 6.0,
            is_spreading,
            storage_id: storage_id.map(str::to_string),
            load_index: storage_id.map(|_| 1),
        }
    }

    fn storages() -> Vec<StorageLocation> {
        vec![
            StorageLocation::new("pit-b", "Grube B", FertilizerType::Slurry, GeoPoint::new(52.0, 8.0)),
            StorageLocation::new("pile", "Mist", FertilizerType::Manure, GeoPoint::new(52.0, 8.0)),
            StorageLocation::new("pit-a", "Grube A", FertilizerType::Slurry, GeoPoint::new(52.0, 8.0)),
        ]
    }

    fn slurry() -> ActivityType {
        ActivityType::Fertilization { fertilizer: FertilizerType::Slurry }
    }

    #[test]
    fn test_too_few_points() {
        assert!(build_segments(&[], &storages(), &slurry()).is_empty());
        assert!(build_segments(&[point(52.0, true, Some("pit-a"))], &storages(), &slurry()).is_empty());
    }

    #[test]
    fn test_single_run() {
        let points = vec![point(52.0, false, None), point(52.001, false, None), point(52.002, false, None)];
        let segments = build_segments(&points, &storages(), &slurry());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].points.len(), 3);
        assert_eq!(segments[0].color, TRANSIT_COLOR);
    }

    #[test]
    fn test_segments_split_on_state_and_source() {
        let points = vec![
            point(52.000, false, Some("pit-a")),
            point(52.001, true, Some("pit-a")),
            point(52.002, true, Some("pit-a")),
            point(52.003, false, Some("pit-a")),
            point(52.004, false, Some("pit-b")),
            point(52.005, true, Some("pit-b")),
            point(52.006, true, Some("pit-b")),
        ];
        let segments = build_segments(&points, &storages(), &slurry());

        let runs: Vec<(bool, Option<&str>)> = segments
            .iter()
            .map(|s| (s.is_spreading, s.storage_id.as_deref()))
            .collect();
        assert_eq!(
            runs,
            vec![
                (false, Some("pit-a")),
                (true, Some("pit-a")),
                (false, Some("pit-a")),
                (false, Some("pit-b")),
                (true, Some("pit-b")),
            ]
        );
        assert_ne!(segments[1].color, segments[4].color);
        assert_eq!(segments[2].color, TRANSIT_COLOR);
    }

    #[test]
    fn test_segment_continuity() {
        let points: Vec<TrackPoint> = (0..12)
            .map(|i| point(52.0 + i as f64 * 0.0001, i % 4 < 2, Some(if i < 6 { "pit-a" } else { "pit-b" })))
            .collect();
        let segments = build_segments(&points, &storages(), &slurry());

        // Each segment starts where the previous one ended
        for w in segments.windows(2) {
            assert_eq!(w[0].points.last(), w[1].points.first());
        }

        let mut path: Vec<GeoPoint> = segments[0].points.clone();
        for s in &segments[1..] {
            path.extend_from_slice(&s.points[1..]);
        }
        let expected: Vec<GeoPoint> = points.iter().map(|p| p.position()).collect();
        assert_eq!(path, expected);
    }

    #[test]
    fn test_source_color_deterministic() {
        let s = storages();
        // Sorted slurry ids: pit-a, pit-b
        assert_eq!(source_color(Some("pit-a"), &s, &slurry()), SLURRY_PALETTE[0]);
        assert_eq!(source_color(Some("pit-b"), &s, &slurry()), SLURRY_PALETTE[1]);

        let mut reversed = s.clone();
        reversed.reverse();
        assert_eq!(source_color(Some("pit-b"), &reversed, &slurry()), SLURRY_PALETTE[1]);
    }

    #[test]
    fn test_source_color_fallbacks() {
        let s = storages();
        assert_eq!(source_color(Some("unknown"), &s, &slurry()), SLURRY_PALETTE[0]);
        assert_eq!(source_color(None, &s, &slurry()), SLURRY_PALETTE[0]);

        let manure = ActivityType::Fertilization { fertilizer: FertilizerType::Manure };
        assert_eq!(source_color(Some("pile"), &s, &manure), MANURE_PALETTE[0]);

        let harvest = ActivityType::Harvest { crop: crate::farm::HarvestKind::Silage };
        assert_eq!(source_color(None, &s, &harvest), WORKING_COLOR);
    }

    #[test]
    fn test_simplify_keeps_endpoints() {
        // Nearly straight line with sub-meter wiggle
        let points: Vec<GeoPoint> = (0..20)
            .map(|i| GeoPoint::new(52.0 + i as f64 * 0.0001, 8.0 + if i % 2 == 0 { 0.0 } else { 0.000002 }))
            .collect();
        let segment = TrackSegment {
            is_spreading: true,
            storage_id: None,
            color: WORKING_COLOR.to_string(),
            points: points.clone(),
        };

        let simplified = simplify_segment(&segment, 2.0);
        assert_eq!(simplified.len(), 2);
        assert_eq!(simplified.first(), points.first());
        assert_eq!(simplified.last(), points.last());

        assert_eq!(simplify_segment(&segment, 0.0).len(), 20);
    }
}
