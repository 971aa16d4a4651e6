//! Offline frame composition shared by live preview and every export path.

pub mod raster;

use std::io::Cursor;

use image::{imageops, ImageFormat, Rgba, RgbaImage};

use crate::config::DisplayConfig;
use crate::interpolate::interpolate;
use crate::track::{Bounds, Millis, Track};
use crate::trail::{select_trail, TrailMode};
use crate::Result;

/// Padding applied around the data bounding box by [`FallbackProjection`].
const FALLBACK_PADDING: f64 = 0.1;
const TRAIL_ALPHA: u8 = 0xAA;
const TRAIL_WIDTH: u32 = 2;
/// Marker outline in icon units, nose pointing north.
const MARKER_SHAPE: [(f64, f64); 4] = [(0.0, -8.0), (5.0, 8.0), (0.0, 4.0), (-5.0, 8.0)];
const MARKER_UNITS: f64 = 16.0;
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Maps geographic coordinates into output pixel space.
pub trait Projection {
    fn project(&self, lon: f64, lat: f64) -> (f64, f64);
}

impl<F> Projection for F
where
    F: Fn(f64, f64) -> (f64, f64),
{
    fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        self(lon, lat)
    }
}

/// Linear lon/lat mapping centred on the padded bounding box of the data,
/// used whenever no map widget supplies a projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackProjection {
    center_lon: f64,
    center_lat: f64,
    lon_range: f64,
    lat_range: f64,
    width: f64,
    height: f64,
}

impl FallbackProjection {
    pub fn from_tracks(tracks: &[Track], width: u32, height: u32) -> Self {
        let (center_lon, center_lat, lon_span, lat_span) = match Bounds::of_tracks(tracks) {
            Some(bounds) => {
                let center = bounds.center();
                (center.lon, center.lat, bounds.lon_span(), bounds.lat_span())
            }
            None => (0.0, 0.0, 0.0, 0.0),
        };
        Self {
            center_lon,
            center_lat,
            lon_range: padded_span(lon_span),
            lat_range: padded_span(lat_span),
            width: width as f64,
            height: height as f64,
        }
    }
}

fn padded_span(span: f64) -> f64 {
    let padded = span * (1.0 + FALLBACK_PADDING);
    if padded > 0.0 && padded.is_finite() {
        padded
    } else {
        1.0
    }
}

impl Projection for FallbackProjection {
    fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        let x = ((lon - self.center_lon) / self.lon_range + 0.5) * self.width;
        let y = (0.5 - (lat - self.center_lat) / self.lat_range) * self.height;
        (x, y)
    }
}

/// Presentation knobs for a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub trail_mode: TrailMode,
    pub trail_window_minutes: f64,
    /// Marker size in pixels.
    pub icon_size: u32,
    pub fallback_background: Rgba<u8>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::from(&DisplayConfig::default())
    }
}

impl From<&DisplayConfig> for RenderOptions {
    fn from(config: &DisplayConfig) -> Self {
        Self {
            trail_mode: config.trail_mode,
            trail_window_minutes: config.trail_window_minutes,
            icon_size: config.icon_size,
            fallback_background: color_or(&config.fallback_background, Rgba([15, 76, 117, 255])),
        }
    }
}

/// Frames are always 16:9.
pub fn output_height(width: u32) -> u32 {
    (width as f64 * 9.0 / 16.0).round() as u32
}

/// Composes trails and oriented markers into a raster.
///
/// Rendering is a pure function of its arguments, so any frame of an export
/// can be regenerated independently.
#[derive(Debug, Clone, Default)]
pub struct FrameRenderer {
    options: RenderOptions,
}

impl FrameRenderer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn render_frame(
        &self,
        tracks: &[Track],
        t: Millis,
        width: u32,
        projection: Option<&dyn Projection>,
        background: Option<&RgbaImage>,
    ) -> RgbaImage {
        let height = output_height(width);
        let mut frame = self.background(width, height, background);

        let fallback;
        let projection = match projection {
            Some(projection) => projection,
            None => {
                fallback = FallbackProjection::from_tracks(tracks, width, height);
                &fallback as &dyn Projection
            }
        };

        for track in tracks.iter().filter(|track| track.visible) {
            let points = track.points();
            if points.len() < 2 {
                continue;
            }
            let color = color_or(&track.color, WHITE);

            let trail = select_trail(
                points,
                t,
                self.options.trail_mode,
                self.options.trail_window_minutes,
            );
            if trail.len() >= 2 {
                let stroke = Rgba([color[0], color[1], color[2], TRAIL_ALPHA]);
                for pair in trail.windows(2) {
                    let from = projection.project(pair[0].lon, pair[0].lat);
                    let to = projection.project(pair[1].lon, pair[1].lat);
                    raster::draw_line(&mut frame, from, to, TRAIL_WIDTH, stroke);
                }
            }

            if let Some(position) = interpolate(points, t) {
                let center = projection.project(position.lon, position.lat);
                let marker = marker_polygon(center, position.direction, self.options.icon_size);
                raster::fill_polygon(&mut frame, &marker, color);
            }
        }

        frame
    }

    fn background(&self, width: u32, height: u32, captured: Option<&RgbaImage>) -> RgbaImage {
        match captured {
            Some(image) if image.width() > 0 && image.height() > 0 => {
                if image.dimensions() == (width, height) {
                    image.clone()
                } else {
                    imageops::resize(image, width, height, imageops::FilterType::Triangle)
                }
            }
            _ => RgbaImage::from_pixel(width, height, self.options.fallback_background),
        }
    }
}

/// Marker outline at `center`, rotated clockwise by `direction` degrees.
pub fn marker_polygon(center: (f64, f64), direction: f64, icon_size: u32) -> Vec<(f64, f64)> {
    let scale = icon_size as f64 / MARKER_UNITS;
    let (sin, cos) = direction.to_radians().sin_cos();
    MARKER_SHAPE
        .iter()
        .map(|&(x, y)| {
            let (x, y) = (x * scale, y * scale);
            (center.0 + x * cos - y * sin, center.1 + x * sin + y * cos)
        })
        .collect()
}

/// Parses `#rrggbb`, `#rrggbbaa` or `#rgb`.
pub fn parse_hex_color(value: &str) -> Option<Rgba<u8>> {
    let hex = value.trim().strip_prefix('#')?;
    if !hex.is_ascii() {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut out = [0u8; 4];
            for (i, c) in hex.chars().enumerate() {
                let v = c.to_digit(16)? as u8;
                out[i] = v * 17;
            }
            out[3] = 255;
            Some(Rgba(out))
        }
        6 | 8 => {
            let r = channel(&hex[0..2])?;
            let g = channel(&hex[2..4])?;
            let b = channel(&hex[4..6])?;
            let a = if hex.len() == 8 {
                channel(&hex[6..8])?
            } else {
                255
            };
            Some(Rgba([r, g, b, a]))
        }
        _ => None,
    }
}

fn color_or(value: &str, default: Rgba<u8>) -> Rgba<u8> {
    parse_hex_color(value).unwrap_or_else(|| {
        tracing::warn!(color = value, "unparseable colour, using default");
        default
    })
}

/// PNG bytes of a frame.
pub fn encode_png(frame: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    frame.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}
