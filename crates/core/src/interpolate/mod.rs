//! Reconstruction of a track's position at arbitrary query times.
//!
//! Positions are clamped to the first/last sample outside the recorded span
//! and linearly blended in between. Headings blend along the shortest arc so
//! that a turn through north does not swing through south.

use crate::track::{Millis, Sample, Track};

/// A visible track together with where it is at the query time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPosition<'a> {
    pub track: &'a Track,
    pub point: Sample,
}

/// Position of a sorted sample sequence at time `t`, `None` when empty.
///
/// Speed is a step function held from the earlier sample of the bracketing
/// pair.
pub fn interpolate(points: &[Sample], t: Millis) -> Option<Sample> {
    let first = points.first()?;
    let last = points.last()?;
    if t <= first.t {
        return Some(*first);
    }
    if t >= last.t {
        return Some(*last);
    }

    // First index whose sample is strictly after `t`; the clamps above keep
    // it within 1..len.
    let hi = points.partition_point(|p| p.t <= t);
    let p0 = &points[hi - 1];
    let p1 = &points[hi];

    let span = p1.t - p0.t;
    let ratio = if span == 0 {
        0.0
    } else {
        (t - p0.t) as f64 / span as f64
    };

    Some(Sample {
        t,
        lat: lerp(p0.lat, p1.lat, ratio),
        lon: lerp(p0.lon, p1.lon, ratio),
        altitude: lerp(p0.altitude, p1.altitude, ratio),
        speed: p0.speed,
        direction: interpolate_angle(p0.direction, p1.direction, ratio),
    })
}

/// Interpolated position of every visible track with at least one sample,
/// in track order.
pub fn interpolated_positions(tracks: &[Track], t: Millis) -> Vec<TrackPosition<'_>> {
    tracks
        .iter()
        .filter(|track| track.visible)
        .filter_map(|track| {
            interpolate(track.points(), t).map(|point| TrackPosition { track, point })
        })
        .collect()
}

/// Blends two headings by `ratio` along the shortest arc, result in `[0, 360)`.
pub fn interpolate_angle(from: f64, to: f64, ratio: f64) -> f64 {
    normalize_degrees(from + shortest_angle_delta(from, to) * ratio)
}

/// Signed difference `to - from` folded into `[-180, 180)`.
pub fn shortest_angle_delta(from: f64, to: f64) -> f64 {
    (to - from + 180.0).rem_euclid(360.0) - 180.0
}

/// Folds any angle into `[0, 360)`.
pub fn normalize_degrees(angle: f64) -> f64 {
    let folded = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs.
    if folded >= 360.0 {
        0.0
    } else {
        folded
    }
}

fn lerp(a: f64, b: f64, ratio: f64) -> f64 {
    a + (b - a) * ratio
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{NewTrack, TrackCategory};

    const EPS: f64 = 1e-9;

    fn samples() -> Vec<Sample> {
        vec![
            Sample::new(1_000, 10.0, 20.0)
                .with_altitude(100.0)
                .with_speed(5.0)
                .with_direction(90.0),
            Sample::new(2_000, 12.0, 24.0)
                .with_altitude(300.0)
                .with_speed(9.0)
                .with_direction(180.0),
            Sample::new(4_000, 16.0, 20.0)
                .with_altitude(300.0)
                .with_speed(1.0)
                .with_direction(180.0),
        ]
    }

    fn track(id: &str, points: Vec<Sample>) -> Track {
        Track::new(NewTrack::new(id, TrackCategory::Aircraft, points), "#ffffff")
    }

    #[test]
    fn empty_sequence_has_no_position() {
        assert_eq!(interpolate(&[], 0), None);
    }

    #[test]
    fn clamps_outside_recorded_span() {
        let points = samples();
        assert_eq!(interpolate(&points, 0), Some(points[0]));
        assert_eq!(interpolate(&points, 1_000), Some(points[0]));
        assert_eq!(interpolate(&points, 4_000), Some(points[2]));
        assert_eq!(interpolate(&points, 99_000), Some(points[2]));
    }

    #[test]
    fn blends_linearly_between_samples() {
        let points = samples();
        let mid = interpolate(&points, 1_250).unwrap();
        assert_eq!(mid.t, 1_250);
        assert!((mid.lat - 10.5).abs() < EPS);
        assert!((mid.lon - 21.0).abs() < EPS);
        assert!((mid.altitude - 150.0).abs() < EPS);
        assert!((mid.direction - 112.5).abs() < EPS);
        // Held from the earlier sample.
        assert_eq!(mid.speed, 5.0);

        let later = interpolate(&points, 3_000).unwrap();
        assert!((later.lat - 14.0).abs() < EPS);
        assert!((later.lon - 22.0).abs() < EPS);
        assert_eq!(later.speed, 9.0);
    }

    #[test]
    fn lands_exactly_on_interior_samples() {
        let points = samples();
        let at = interpolate(&points, 2_000).unwrap();
        assert!((at.lat - 12.0).abs() < EPS);
        assert!((at.lon - 24.0).abs() < EPS);
    }

    #[test]
    fn duplicate_timestamps_do_not_divide_by_zero() {
        let points = vec![
            Sample::new(0, 0.0, 0.0),
            Sample::new(1_000, 1.0, 1.0),
            Sample::new(1_000, 5.0, 5.0),
            Sample::new(2_000, 6.0, 6.0),
        ];
        for t in [500, 999, 1_000, 1_001, 1_500] {
            let p = interpolate(&points, t).unwrap();
            assert!(p.lat.is_finite() && p.lon.is_finite(), "t={t}");
        }
        let p = interpolate(&points, 1_500).unwrap();
        assert!((p.lat - 5.5).abs() < EPS);
    }

    #[test]
    fn heading_wraps_through_north() {
        assert!(interpolate_angle(350.0, 10.0, 0.5).abs() < EPS);
        assert!((interpolate_angle(10.0, 350.0, 0.5)).abs() < EPS);
        assert!((interpolate_angle(350.0, 10.0, 0.25) - 355.0).abs() < EPS);
        assert!((interpolate_angle(10.0, 350.0, 0.75) - 355.0).abs() < EPS);

        let points = vec![
            Sample::new(0, 0.0, 0.0).with_direction(350.0),
            Sample::new(10, 0.0, 0.0).with_direction(10.0),
        ];
        let p = interpolate(&points, 5).unwrap();
        assert!(p.direction.abs() < EPS);
    }

    #[test]
    fn angle_helpers_stay_in_range() {
        assert_eq!(shortest_angle_delta(0.0, 180.0), -180.0);
        assert_eq!(shortest_angle_delta(90.0, 100.0), 10.0);
        assert_eq!(shortest_angle_delta(100.0, 90.0), -10.0);
        assert_eq!(normalize_degrees(-90.0), 270.0);
        assert_eq!(normalize_degrees(720.0), 0.0);
        assert!(normalize_degrees(-1e-20) < 360.0);
    }

    #[test]
    fn batch_skips_hidden_and_empty_tracks() {
        let a = track("a", vec![Sample::new(0, 0.0, 0.0).with_direction(0.0)]);
        let b = track("b", Vec::new());
        let mut hidden = track("c", samples());
        hidden.visible = false;
        let d = track("d", samples());
        let tracks = vec![a, b, hidden, d];

        let positions = interpolated_positions(&tracks, 1_500);
        let ids: Vec<&str> = positions.iter().map(|p| p.track.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "d"]);
        assert_eq!(positions[0].point, tracks[0].points()[0]);
    }
}
