//! Synthetic fixes from map drags.
//!
//! In test mode the user drags the vehicle marker across the map. Each drag position
//! becomes a [`LocationFix`] tagged [`FixSource::Simulated`] with perfect accuracy, and
//! takes the same path through the tracker as a live fix.

use crate::geo_utils::distance_meters;
use crate::{FixSource, GeoPoint, LocationFix};

/// Turns a stream of drag positions into location fixes.
#[derive(Debug, Clone)]
pub struct Simulator {
    throttle_ms: u64,
    last: Option<(GeoPoint, u64)>,
}

impl Simulator {
    /// Create a simulator that ignores drags closer than `throttle_ms` to the previous one.
    pub fn new(throttle_ms: u64) -> Self {
        Self { throttle_ms, last: None }
    }

    /// Forget the previous drag position.
    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Synthesize a fix for a drag to (`lat`, `lng`) at `now_ms`.
    ///
    /// Returns `None` when the drag is throttled. Speed is derived from the distance to
    /// the previous drag over the elapsed time; the first drag reports standstill.
    pub fn drag_to(&mut self, lat: f64, lng: f64, now_ms: u64) -> Option<LocationFix> {
        let position = GeoPoint::new(lat, lng);

        let (speed_mps, heading) = match self.last {
            Some((_, last_ms)) if now_ms < last_ms.saturating_add(self.throttle_ms) => return None,
            Some((previous, last_ms)) => {
                let elapsed_s = (now_ms - last_ms) as f64 / 1000.0;
                let speed = if elapsed_s > 0.0 {
                    distance_meters(&previous, &position) / elapsed_s
                } else {
                    0.0
                };
                (speed, heading_degrees(&previous, &position))
            }
            None => (0.0, None),
        };

        self.last = Some((position, now_ms));

        Some(LocationFix {
            lat,
            lng,
            speed_mps: Some(speed_mps),
            accuracy_m: 0.0,
            timestamp_ms: now_ms,
            heading,
            source: FixSource::Simulated,
        })
    }
}

/// Course from `from` to `to` in degrees clockwise from north, `None` without movement.
fn heading_degrees(from: &GeoPoint, to: &GeoPoint) -> Option<f64> {
    let dy = to.lat - from.lat;
    let dx = (to.lng - from.lng) * from.lat.to_radians().cos();
    if dx == 0.0 && dy == 0.0 {
        return None;
    }
    Some(dx.atan2(dy).to_degrees().rem_euclid(360.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_drag_is_standstill() {
        let mut sim = Simulator::new(80);
        let fix = sim.drag_to(52.0, 8.0, 1_000).unwrap();
        assert_eq!(fix.speed_mps, Some(0.0));
        assert_eq!(fix.accuracy_m, 0.0);
        assert_eq!(fix.source, FixSource::Simulated);
        assert_eq!(fix.heading, None);
    }

    #[test]
    fn test_throttle() {
        let mut sim = Simulator::new(80);
        assert!(sim.drag_to(52.0, 8.0, 1_000).is_some());
        assert!(sim.drag_to(52.0001, 8.0, 1_050).is_none());
        assert!(sim.drag_to(52.0001, 8.0, 1_080).is_some());
    }

    #[test]
    fn test_speed_and_heading() {
        let mut sim = Simulator::new(80);
        sim.drag_to(52.0, 8.0, 0);
        // ~11.1m north in one second
        let fix = sim.drag_to(52.0001, 8.0, 1_000).unwrap();
        assert!((fix.speed_mps.unwrap() - 11.1).abs() < 0.1);
        assert!(fix.heading.unwrap().abs() < 1e-6);

        // East
        let fix = sim.drag_to(52.0001, 8.0002, 2_000).unwrap();
        assert!((fix.heading.unwrap() - 90.0).abs() < 1e-6);

        // South-west
        let fix = sim.drag_to(51.9999, 7.9990, 3_000).unwrap();
        let heading = fix.heading.unwrap();
        assert!(heading > 180.0 && heading < 270.0);
    }

    #[test]
    fn test_reset_forgets_previous() {
        let mut sim = Simulator::new(80);
        sim.drag_to(52.0, 8.0, 0);
        sim.reset();
        let fix = sim.drag_to(52.01, 8.0, 10).unwrap();
        assert_eq!(fix.speed_mps, Some(0.0));
    }
}
