//! CSV loading for ADS-B and AIS exports.
//!
//! One file may hold several vehicles; rows are grouped by callsign for
//! aircraft and by MMSI or vessel name for ships. Rows that cannot be read
//! are dropped rather than failing the whole file.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::interpolate::normalize_degrees;
use crate::track::{NewTrack, Sample, TrackCategory};
use crate::{Result, TrackAnimatorError};

const AIRCRAFT_KEYS: [&str; 2] = ["Callsign", "callsign"];
const VESSEL_KEYS: [&str; 4] = ["MMSI", "mmsi", "VesselName", "vessel_name"];
const UNKNOWN_LABEL: &str = "UNKNOWN";

/// Parses one CSV export into tracks, in the order their vehicles first
/// appear.
pub fn parse_csv<R: Read>(reader: R, source_name: &str) -> Result<Vec<NewTrack>> {
    let mut csv = ReaderBuilder::new()
        .trim(Trim::Headers)
        .flexible(true)
        .from_reader(reader);
    let headers = Headers::new(csv.headers()?.clone());

    let category = if headers.has_any(&AIRCRAFT_KEYS) {
        TrackCategory::Aircraft
    } else if headers.has_any(&VESSEL_KEYS) {
        TrackCategory::Vessel
    } else {
        TrackCategory::Aircraft
    };
    let group_keys: &[&str] = match category {
        TrackCategory::Aircraft => &AIRCRAFT_KEYS,
        TrackCategory::Vessel => &VESSEL_KEYS,
    };

    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<Sample>> = HashMap::new();
    let mut rows = 0usize;
    let mut dropped = 0usize;
    for record in csv.records() {
        let record = record?;
        rows += 1;
        let label = headers
            .first_non_empty(&record, group_keys)
            .unwrap_or(UNKNOWN_LABEL)
            .to_string();
        let points = groups.entry(label.clone()).or_insert_with(|| {
            order.push(label);
            Vec::new()
        });
        match parse_row(&headers, &record) {
            Some(sample) => points.push(sample),
            None => dropped += 1,
        }
    }

    if rows == 0 {
        return Err(TrackAnimatorError::InvalidInput("csv contains no rows"));
    }
    if dropped > 0 {
        tracing::debug!(source = source_name, dropped, "skipped unreadable rows");
    }

    Ok(order
        .into_iter()
        .map(|label| {
            let mut points = groups.remove(&label).unwrap_or_default();
            points.sort_by_key(|p| p.t);
            NewTrack {
                id: format!("{source_name}-{label}"),
                icon_type: category.default_icon().to_string(),
                label,
                category,
                points,
            }
        })
        .collect())
}

/// Reads a CSV file, naming its tracks after the file.
pub fn load_csv_file(path: impl AsRef<Path>) -> Result<Vec<NewTrack>> {
    let path = path.as_ref();
    let source_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tracks".to_string());
    let file = std::fs::File::open(path)?;
    parse_csv(file, &source_name)
}

struct Headers {
    index: HashMap<String, usize>,
}

impl Headers {
    fn new(record: StringRecord) -> Self {
        let mut index = HashMap::new();
        for (i, name) in record.iter().enumerate() {
            index.entry(name.to_string()).or_insert(i);
        }
        Self { index }
    }

    fn has_any(&self, names: &[&str]) -> bool {
        names.iter().any(|name| self.index.contains_key(*name))
    }

    fn first_non_empty<'r>(&self, record: &'r StringRecord, names: &[&str]) -> Option<&'r str> {
        names
            .iter()
            .filter_map(|name| self.field(record, name))
            .find(|value| !value.is_empty())
    }

    fn field<'r>(&self, record: &'r StringRecord, name: &str) -> Option<&'r str> {
        let index = *self.index.get(name)?;
        record.get(index).map(str::trim)
    }

    fn number(&self, record: &StringRecord, names: &[&str]) -> f64 {
        self.first_non_empty(record, names)
            .and_then(|value| value.parse::<f64>().ok())
            .filter(|value| value.is_finite())
            .unwrap_or(0.0)
    }
}

fn parse_row(headers: &Headers, record: &StringRecord) -> Option<Sample> {
    let seconds: f64 = headers
        .first_non_empty(record, &["Timestamp", "timestamp"])?
        .parse()
        .ok()?;
    if !seconds.is_finite() {
        return None;
    }

    let position = headers.first_non_empty(record, &["Position", "position"])?;
    let mut parts = position.trim_matches('"').split(',');
    let lat: f64 = parts.next()?.trim().parse().ok()?;
    let lon: f64 = parts.next()?.trim().parse().ok()?;
    if !lat.is_finite() || !lon.is_finite() {
        return None;
    }

    Some(Sample {
        t: (seconds * 1000.0).round() as i64,
        lat,
        lon,
        altitude: headers.number(record, &["Altitude", "altitude"]),
        speed: headers.number(record, &["Speed", "speed"]).max(0.0),
        direction: normalize_degrees(headers.number(
            record,
            &["Direction", "direction", "Course", "course"],
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADSB: &str = "\
Timestamp,UTC,Callsign,Position,Altitude,Speed,Direction
1700000060,2023-11-14T22:14:20Z,JAL123,\"35.5,139.8\",1000,250,90
1700000000,2023-11-14T22:13:20Z,JAL123,\"35.0,139.5\",0,200,45
1700000030,2023-11-14T22:13:50Z,ANA456,\"34.0,135.0\",500,180,370
bad,2023-11-14T22:13:50Z,ANA456,\"34.0,135.0\",500,180,0
1700000040,2023-11-14T22:14:00Z,ANA456,nowhere,500,180,0
";

    #[test]
    fn groups_aircraft_by_callsign() {
        let tracks = parse_csv(ADSB.as_bytes(), "flights.csv").unwrap();
        assert_eq!(tracks.len(), 2);

        let jal = &tracks[0];
        assert_eq!(jal.id, "flights.csv-JAL123");
        assert_eq!(jal.label, "JAL123");
        assert_eq!(jal.category, TrackCategory::Aircraft);
        assert_eq!(jal.icon_type, "airplane");
        let times: Vec<i64> = jal.points.iter().map(|p| p.t).collect();
        assert_eq!(times, vec![1_700_000_000_000, 1_700_000_060_000]);
        assert_eq!(jal.points[1].lat, 35.5);
        assert_eq!(jal.points[1].lon, 139.8);
        assert_eq!(jal.points[1].altitude, 1000.0);

        let ana = &tracks[1];
        assert_eq!(ana.points.len(), 1);
        assert_eq!(ana.points[0].direction, 10.0);
    }

    #[test]
    fn detects_vessels_and_defaults_missing_columns() {
        let csv = "MMSI,Timestamp,Position,Course\n\
                   431000001,1700000000,\"34.5,135.2\",\n\
                   ,1700000010,\"34.6,135.3\",180\n";
        let tracks = parse_csv(csv.as_bytes(), "ais").unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].category, TrackCategory::Vessel);
        assert_eq!(tracks[0].icon_type, "ship");
        assert_eq!(tracks[0].points[0].speed, 0.0);
        assert_eq!(tracks[0].points[0].direction, 0.0);
        assert_eq!(tracks[1].label, "UNKNOWN");
        assert_eq!(tracks[1].points[0].direction, 180.0);
    }

    #[test]
    fn trims_header_names() {
        let csv = " Timestamp , Callsign ,Position\n1,X,\"1,2\"\n";
        let tracks = parse_csv(csv.as_bytes(), "s").unwrap();
        assert_eq!(tracks[0].label, "X");
        assert_eq!(tracks[0].points[0].t, 1_000);
    }

    #[test]
    fn rejects_empty_file() {
        let err = parse_csv("Timestamp,Position\n".as_bytes(), "empty").unwrap_err();
        assert!(matches!(err, TrackAnimatorError::InvalidInput(_)));
    }
}
