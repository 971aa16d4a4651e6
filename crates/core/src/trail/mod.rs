use serde::{Deserialize, Serialize};

use crate::track::{Millis, Sample};

const MS_PER_MINUTE: f64 = 60_000.0;

/// How much history is drawn behind each marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailMode {
    /// Everything up to the query time.
    #[default]
    Full,
    /// A sliding look-back window.
    Window,
    None,
}

/// Historical points of a track up to `t`, in their original order.
///
/// In window mode both window edges are inclusive. Callers skip trails with
/// fewer than two points since they cannot be drawn as a line.
pub fn select_trail(
    points: &[Sample],
    t: Millis,
    mode: TrailMode,
    window_minutes: f64,
) -> Vec<Sample> {
    match mode {
        TrailMode::None => Vec::new(),
        TrailMode::Full => {
            let end = points.partition_point(|p| p.t <= t);
            points[..end].to_vec()
        }
        TrailMode::Window => {
            let window_start = t as f64 - window_minutes * MS_PER_MINUTE;
            points
                .iter()
                .filter(|p| p.t <= t && p.t as f64 >= window_start)
                .copied()
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Millis = 60_000;

    fn minute_samples(count: i64) -> Vec<Sample> {
        (0..count)
            .map(|i| Sample::new(i * MINUTE, i as f64, 0.0))
            .collect()
    }

    fn times(points: &[Sample]) -> Vec<Millis> {
        points.iter().map(|p| p.t).collect()
    }

    #[test]
    fn none_mode_is_always_empty() {
        let points = minute_samples(10);
        assert!(select_trail(&points, 5 * MINUTE, TrailMode::None, 30.0).is_empty());
        assert!(select_trail(&points, i64::MAX, TrailMode::None, 30.0).is_empty());
    }

    #[test]
    fn full_mode_returns_prefix() {
        let points = minute_samples(10);
        let trail = select_trail(&points, 4 * MINUTE + 30_000, TrailMode::Full, 0.0);
        assert_eq!(trail, points[..5].to_vec());

        let exact = select_trail(&points, 4 * MINUTE, TrailMode::Full, 0.0);
        assert_eq!(exact.len(), 5);

        assert!(select_trail(&points, -1, TrailMode::Full, 0.0).is_empty());
        assert_eq!(select_trail(&points, 99 * MINUTE, TrailMode::Full, 0.0), points);
    }

    #[test]
    fn window_mode_is_inclusive_on_both_ends() {
        let points = minute_samples(60);
        let now = 45 * MINUTE;
        let trail = select_trail(&points, now, TrailMode::Window, 30.0);
        assert_eq!(times(&trail), (15..=45).map(|i| i * MINUTE).collect::<Vec<_>>());
    }

    #[test]
    fn window_mode_supports_fractional_minutes() {
        let points = minute_samples(10);
        let trail = select_trail(&points, 5 * MINUTE, TrailMode::Window, 1.5);
        assert_eq!(times(&trail), vec![4 * MINUTE, 5 * MINUTE]);
    }

    #[test]
    fn handles_empty_input() {
        for mode in [TrailMode::Full, TrailMode::Window, TrailMode::None] {
            assert!(select_trail(&[], 0, mode, 30.0).is_empty());
        }
    }

    #[test]
    fn mode_uses_lowercase_tags() {
        assert_eq!(serde_json::to_string(&TrailMode::Window).unwrap(), "\"window\"");
        let mode: TrailMode = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(mode, TrailMode::None);
    }

    #[test]
    fn single_sample_track_trails_itself_at_its_time() {
        use crate::track::{NewTrack, TrackCategory, TrackStore};

        let mut store = TrackStore::new();
        let track = store.add_track(NewTrack::new(
            "a",
            TrackCategory::Aircraft,
            vec![Sample::new(0, 35.0, 139.0)],
        ));
        let points = track.points();
        assert_eq!(
            select_trail(points, 0, TrailMode::Full, 30.0),
            vec![points[0]]
        );
    }
}
