use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{Result, TrackAnimatorError};

/// Milliseconds since the Unix epoch.
pub type Millis = i64;

/// Colours handed out to tracks in insertion order.
pub const TRACK_PALETTE: [&str; 8] = [
    "#ffffff", "#ef4444", "#3b82f6", "#22c55e", "#f59e0b", "#a855f7", "#ec4899", "#06b6d4",
];

const DEFAULT_MAP_CENTER: LatLon = LatLon {
    lat: 35.0,
    lon: 135.0,
};
const DEFAULT_MAP_ZOOM: u8 = 4;

/// One timestamped position/heading/speed observation.
///
/// Interpolated positions share this shape; their `t` is the query time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sample {
    pub t: Millis,
    pub lat: f64,
    pub lon: f64,
    pub altitude: f64,
    pub speed: f64,
    /// Degrees clockwise from north in `[0, 360)`.
    pub direction: f64,
}

impl Sample {
    pub fn new(t: Millis, lat: f64, lon: f64) -> Self {
        Self {
            t,
            lat,
            lon,
            ..Default::default()
        }
    }

    pub fn with_direction(mut self, direction: f64) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = altitude;
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackCategory {
    /// ADS-B sourced.
    Aircraft,
    /// AIS sourced.
    Vessel,
}

impl TrackCategory {
    pub fn default_icon(self) -> &'static str {
        match self {
            TrackCategory::Aircraft => "airplane",
            TrackCategory::Vessel => "ship",
        }
    }

    /// Icon types a track of this category may be switched to.
    pub fn icon_options(self) -> &'static [&'static str] {
        match self {
            TrackCategory::Aircraft => &["airplane", "small_plane", "helicopter", "triangle"],
            TrackCategory::Vessel => &["ship", "small_boat", "triangle"],
        }
    }
}

/// A track as produced by ingestion, before the store assigns presentation
/// state to it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrack {
    pub id: String,
    pub label: String,
    pub category: TrackCategory,
    pub icon_type: String,
    pub points: Vec<Sample>,
}

impl NewTrack {
    pub fn new(id: impl Into<String>, category: TrackCategory, points: Vec<Sample>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            category,
            icon_type: category.default_icon().to_string(),
            points,
        }
    }
}

/// One moving entity's full recorded history.
///
/// The point sequence is fixed once the track is built; presentation fields
/// are replaced wholesale through [`TrackStore::update_track`].
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: String,
    pub label: String,
    pub category: TrackCategory,
    pub icon_type: String,
    pub color: String,
    pub visible: bool,
    points: Arc<[Sample]>,
}

impl Track {
    /// Builds a visible, white track. Points are stably sorted by time if the
    /// caller handed them over out of order.
    pub fn new(new: NewTrack, color: impl Into<String>) -> Self {
        let mut points = new.points;
        if points.windows(2).any(|pair| pair[0].t > pair[1].t) {
            points.sort_by_key(|p| p.t);
        }
        Self {
            id: new.id,
            label: new.label,
            category: new.category,
            icon_type: new.icon_type,
            color: color.into(),
            visible: true,
            points: points.into(),
        }
    }

    pub fn points(&self) -> &[Sample] {
        &self.points
    }

    pub fn time_range(&self) -> Option<TimeRange> {
        let first = self.points.first()?;
        let last = self.points.last()?;
        Some(TimeRange::new(first.t, last.t))
    }
}

/// Whole-field replacements applied to an existing track.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackPatch {
    pub visible: Option<bool>,
    pub color: Option<String>,
    pub icon_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Millis,
    pub end: Millis,
}

impl TimeRange {
    pub fn new(start: Millis, end: Millis) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    pub fn duration(&self) -> Millis {
        self.end - self.start
    }

    /// True when there is nothing to play back or export.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn clamp(&self, t: Millis) -> Millis {
        t.clamp(self.start, self.end)
    }

    pub fn union(&self, other: &TimeRange) -> TimeRange {
        TimeRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Min/max over every sample of every track, `None` when there are none.
    pub fn spanning(tracks: &[Track]) -> Option<TimeRange> {
        tracks
            .iter()
            .filter_map(Track::time_range)
            .reduce(|acc, range| acc.union(&range))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapView {
    pub center: LatLon,
    pub zoom: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Bounds {
    /// Bounding box of all points across all tracks, visible or not.
    pub fn of_tracks(tracks: &[Track]) -> Option<Bounds> {
        let mut points = tracks.iter().flat_map(|track| track.points().iter());
        let first = points.next()?;
        let init = Bounds {
            min_lat: first.lat,
            max_lat: first.lat,
            min_lon: first.lon,
            max_lon: first.lon,
        };
        Some(points.fold(init, |b, p| Bounds {
            min_lat: b.min_lat.min(p.lat),
            max_lat: b.max_lat.max(p.lat),
            min_lon: b.min_lon.min(p.lon),
            max_lon: b.max_lon.max(p.lon),
        }))
    }

    pub fn center(&self) -> LatLon {
        LatLon {
            lat: (self.min_lat + self.max_lat) / 2.0,
            lon: (self.min_lon + self.max_lon) / 2.0,
        }
    }

    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn lon_span(&self) -> f64 {
        self.max_lon - self.min_lon
    }
}

/// Read-only view over loaded tracks, consumed by rendering and export.
pub trait TrackSource {
    fn tracks(&self) -> &[Track];

    fn time_range(&self) -> TimeRange {
        TimeRange::spanning(self.tracks()).unwrap_or_default()
    }
}

impl TrackSource for [Track] {
    fn tracks(&self) -> &[Track] {
        self
    }
}

impl TrackSource for Vec<Track> {
    fn tracks(&self) -> &[Track] {
        self
    }
}

/// Owner of every loaded track and the timeline range derived from them.
#[derive(Debug, Clone)]
pub struct TrackStore {
    tracks: Vec<Track>,
    time_range: Option<TimeRange>,
    map_center: LatLon,
    next_color: usize,
}

impl Default for TrackStore {
    fn default() -> Self {
        Self {
            tracks: Vec::new(),
            time_range: None,
            map_center: DEFAULT_MAP_CENTER,
            next_color: 0,
        }
    }
}

impl TrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a track, assigning it the next palette colour. The time range
    /// only ever widens here, and the map centre follows all loaded points.
    pub fn add_track(&mut self, mut new: NewTrack) -> &Track {
        if self.track(&new.id).is_some() {
            let mut n = 2;
            while self.track(&format!("{}-{n}", new.id)).is_some() {
                n += 1;
            }
            new.id = format!("{}-{n}", new.id);
        }
        let color = TRACK_PALETTE[self.next_color % TRACK_PALETTE.len()];
        self.next_color += 1;

        let track = Track::new(new, color);
        if let Some(range) = track.time_range() {
            self.time_range = Some(match self.time_range {
                Some(existing) => existing.union(&range),
                None => range,
            });
        }
        tracing::debug!(id = %track.id, points = track.points().len(), "track added");
        self.tracks.push(track);

        if let Some(bounds) = Bounds::of_tracks(&self.tracks) {
            self.map_center = bounds.center();
        }
        let last = self.tracks.len() - 1;
        &self.tracks[last]
    }

    /// Removes a track. The time range is left as it was.
    pub fn remove_track(&mut self, id: &str) -> Option<Track> {
        let index = self.tracks.iter().position(|track| track.id == id)?;
        Some(self.tracks.remove(index))
    }

    pub fn update_track(&mut self, id: &str, patch: TrackPatch) -> Result<&Track> {
        let track = self
            .tracks
            .iter_mut()
            .find(|track| track.id == id)
            .ok_or_else(|| TrackAnimatorError::UnknownTrack(id.to_string()))?;

        if let Some(visible) = patch.visible {
            track.visible = visible;
        }
        if let Some(color) = patch.color {
            track.color = color;
        }
        if let Some(icon_type) = patch.icon_type {
            track.icon_type = icon_type;
        }
        Ok(track)
    }

    pub fn track(&self, id: &str) -> Option<&Track> {
        self.tracks.iter().find(|track| track.id == id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn map_center(&self) -> LatLon {
        self.map_center
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::of_tracks(&self.tracks)
    }

    /// Map view framing every loaded point.
    pub fn fit_all(&self) -> Option<MapView> {
        let bounds = self.bounds()?;
        let diff = bounds.lat_span().max(bounds.lon_span());
        let zoom = if diff < 0.01 {
            14
        } else if diff < 0.1 {
            11
        } else if diff < 1.0 {
            8
        } else if diff < 5.0 {
            6
        } else if diff < 20.0 {
            DEFAULT_MAP_ZOOM
        } else {
            3
        };
        Some(MapView {
            center: bounds.center(),
            zoom,
        })
    }
}

impl TrackSource for TrackStore {
    fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    fn time_range(&self) -> TimeRange {
        self.time_range.unwrap_or_default()
    }
}
