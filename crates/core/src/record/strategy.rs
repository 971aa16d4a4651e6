//! Interchangeable export back-ends.
//!
//! Every strategy shares the orchestrator's state machine. They differ only
//! in how a rendered frame is packaged and where the frame sequence gets
//! encoded.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, RgbaImage};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::ExportConfig;
use crate::record::MAX_FRAMES;
use crate::render::encode_png;
use crate::{Result, TrackAnimatorError};

/// Largest request the remote GIF endpoint accepts.
pub const REMOTE_GIF_MAX_FRAMES: usize = 500;
/// Largest request the remote archive endpoint accepts.
pub const ZIP_MAX_FRAMES: usize = 1_000;

const GIF_PATH: &str = "/api/export/gif";
const ZIP_PATH: &str = "/api/export/zip";
/// Share of the encoding phase reported once a remote request is in flight.
const REMOTE_SENT_FRACTION: f64 = 1.0 / 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportMethod {
    /// GIF encoded in-process from raw frames.
    #[default]
    ClientGif,
    /// GIF encoded by the remote service from PNG frames.
    ServerGif,
    /// PNG sequence archived by the remote service.
    Zip,
}

impl ExportMethod {
    pub const ALL: [ExportMethod; 3] = [
        ExportMethod::ClientGif,
        ExportMethod::ServerGif,
        ExportMethod::Zip,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExportMethod::ClientGif => "client-gif",
            ExportMethod::ServerGif => "server-gif",
            ExportMethod::Zip => "zip",
        }
    }

    /// Builds the strategy for this method, talking HTTP to the configured
    /// backend where encoding is remote.
    pub fn strategy(self, config: &ExportConfig) -> Result<Box<dyn ExportStrategy>> {
        Ok(match self {
            ExportMethod::ClientGif => Box::new(LocalGifStrategy),
            ExportMethod::ServerGif => Box::new(RemoteGifStrategy::new(HttpTransport::new(
                config.backend_base_url(),
            )?)),
            ExportMethod::Zip => Box::new(ZipStrategy::new(HttpTransport::new(
                config.backend_base_url(),
            )?)),
        })
    }
}

impl fmt::Display for ExportMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportMethod {
    type Err = TrackAnimatorError;

    fn from_str(value: &str) -> Result<Self> {
        ExportMethod::ALL
            .into_iter()
            .find(|method| method.as_str() == value)
            .ok_or_else(|| TrackAnimatorError::msg(format!("unknown export method `{value}`")))
    }
}

/// One rendered frame packaged for an encoder.
#[derive(Debug, Clone, PartialEq)]
pub enum FramePayload {
    Raw(RgbaImage),
    Png(Vec<u8>),
}

/// Encoder parameters that do not depend on the frames themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSettings {
    pub fps: u32,
    pub loop_count: u16,
    pub filename_prefix: String,
}

impl EncodeSettings {
    /// Per-frame display time in milliseconds.
    pub fn frame_delay_ms(&self) -> u32 {
        (1000.0 / self.fps.max(1) as f64).round() as u32
    }
}

/// The single named blob a successful export delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub filename: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

/// Render-and-deliver contract shared by all export methods.
pub trait ExportStrategy {
    fn method(&self) -> ExportMethod;

    /// Upper bound on frames this strategy accepts in one job.
    fn max_frames(&self) -> usize {
        MAX_FRAMES
    }

    fn prepare_frame(&self, frame: RgbaImage) -> Result<FramePayload>;

    /// Encodes the ordered frame sequence. `progress` receives the encoder's
    /// own completion in `[0, 1]` when it can report one.
    fn encode(
        &self,
        frames: Vec<FramePayload>,
        settings: &EncodeSettings,
        progress: &mut dyn FnMut(f64),
    ) -> Result<ExportArtifact>;
}

/// Request/response exchange with the remote encoding service.
pub trait EncodeTransport {
    /// POSTs `body` as JSON to `path` and returns the response body. Any
    /// non-success status is an error.
    fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<Vec<u8>>;
}

/// Blocking HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(None::<Duration>)
            .build()?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl EncodeTransport for HttpTransport {
    fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<Vec<u8>> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, "sending frames to encoder service");
        let response = self.client.post(&url).json(body).send()?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(TrackAnimatorError::Transport {
                status: status.as_u16(),
                detail,
            });
        }
        Ok(response.bytes()?.to_vec())
    }
}

/// Encodes an animated GIF locally from raw frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalGifStrategy;

impl ExportStrategy for LocalGifStrategy {
    fn method(&self) -> ExportMethod {
        ExportMethod::ClientGif
    }

    fn prepare_frame(&self, frame: RgbaImage) -> Result<FramePayload> {
        Ok(FramePayload::Raw(frame))
    }

    fn encode(
        &self,
        frames: Vec<FramePayload>,
        settings: &EncodeSettings,
        progress: &mut dyn FnMut(f64),
    ) -> Result<ExportArtifact> {
        let total = frames.len().max(1);
        let delay = Delay::from_numer_denom_ms(settings.frame_delay_ms(), 1);
        let repeat = match settings.loop_count {
            0 => Repeat::Infinite,
            n => Repeat::Finite(n),
        };

        let mut bytes = Vec::new();
        {
            let mut encoder = GifEncoder::new_with_speed(&mut bytes, 10);
            encoder.set_repeat(repeat)?;
            for (index, payload) in frames.into_iter().enumerate() {
                let image = match payload {
                    FramePayload::Raw(image) => image,
                    FramePayload::Png(png) => {
                        image::load_from_memory_with_format(&png, image::ImageFormat::Png)?
                            .into_rgba8()
                    }
                };
                encoder.encode_frame(Frame::from_parts(image, 0, 0, delay))?;
                progress((index + 1) as f64 / total as f64);
            }
        }

        Ok(ExportArtifact {
            filename: "track_animation.gif".to_string(),
            mime: "image/gif",
            bytes,
        })
    }
}

/// Sends PNG frames to the remote service for GIF encoding.
pub struct RemoteGifStrategy<T> {
    transport: T,
}

impl<T: EncodeTransport> RemoteGifStrategy<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

impl<T: EncodeTransport> ExportStrategy for RemoteGifStrategy<T> {
    fn method(&self) -> ExportMethod {
        ExportMethod::ServerGif
    }

    fn max_frames(&self) -> usize {
        REMOTE_GIF_MAX_FRAMES.min(MAX_FRAMES)
    }

    fn prepare_frame(&self, frame: RgbaImage) -> Result<FramePayload> {
        Ok(FramePayload::Png(encode_png(&frame)?))
    }

    fn encode(
        &self,
        frames: Vec<FramePayload>,
        settings: &EncodeSettings,
        progress: &mut dyn FnMut(f64),
    ) -> Result<ExportArtifact> {
        let body = json!({
            "frames": base64_frames(frames)?,
            "fps": settings.fps,
            "loop": settings.loop_count,
        });
        progress(REMOTE_SENT_FRACTION);
        let bytes = self.transport.post_json(GIF_PATH, &body)?;
        progress(1.0);
        Ok(ExportArtifact {
            filename: "track_animation.gif".to_string(),
            mime: "image/gif",
            bytes,
        })
    }
}

/// Sends PNG frames to the remote service to be archived as a numbered
/// image sequence.
pub struct ZipStrategy<T> {
    transport: T,
}

impl<T: EncodeTransport> ZipStrategy<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

impl<T: EncodeTransport> ExportStrategy for ZipStrategy<T> {
    fn method(&self) -> ExportMethod {
        ExportMethod::Zip
    }

    fn max_frames(&self) -> usize {
        ZIP_MAX_FRAMES.min(MAX_FRAMES)
    }

    fn prepare_frame(&self, frame: RgbaImage) -> Result<FramePayload> {
        Ok(FramePayload::Png(encode_png(&frame)?))
    }

    fn encode(
        &self,
        frames: Vec<FramePayload>,
        settings: &EncodeSettings,
        progress: &mut dyn FnMut(f64),
    ) -> Result<ExportArtifact> {
        let body = json!({
            "frames": base64_frames(frames)?,
            "filename_prefix": settings.filename_prefix,
        });
        progress(REMOTE_SENT_FRACTION);
        let bytes = self.transport.post_json(ZIP_PATH, &body)?;
        progress(1.0);
        Ok(ExportArtifact {
            filename: "track_frames.zip".to_string(),
            mime: "application/zip",
            bytes,
        })
    }
}

fn base64_frames(frames: Vec<FramePayload>) -> Result<Vec<String>> {
    frames
        .into_iter()
        .map(|payload| -> Result<String> {
            let png = match payload {
                FramePayload::Png(png) => png,
                FramePayload::Raw(image) => encode_png(&image)?,
            };
            Ok(BASE64.encode(png))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use image::Rgba;

    use super::*;

    #[derive(Clone, Default)]
    struct FakeTransport {
        requests: Rc<RefCell<Vec<(String, serde_json::Value)>>>,
        status: Option<u16>,
    }

    impl EncodeTransport for FakeTransport {
        fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<Vec<u8>> {
            self.requests
                .borrow_mut()
                .push((path.to_string(), body.clone()));
            match self.status {
                Some(status) => Err(TrackAnimatorError::Transport {
                    status,
                    detail: "frames is empty".to_string(),
                }),
                None => Ok(b"blob".to_vec()),
            }
        }
    }

    fn settings() -> EncodeSettings {
        EncodeSettings {
            fps: 5,
            loop_count: 0,
            filename_prefix: "frame".to_string(),
        }
    }

    fn frame(shade: u8) -> RgbaImage {
        RgbaImage::from_pixel(8, 6, Rgba([shade, shade, shade, 255]))
    }

    #[test]
    fn parses_method_tags() {
        for method in ExportMethod::ALL {
            assert_eq!(method.as_str().parse::<ExportMethod>().unwrap(), method);
        }
        assert!("mp4".parse::<ExportMethod>().is_err());
        assert_eq!(
            serde_json::to_string(&ExportMethod::ServerGif).unwrap(),
            "\"server-gif\""
        );
    }

    #[test]
    fn frame_delay_follows_fps() {
        let mut s = settings();
        assert_eq!(s.frame_delay_ms(), 200);
        s.fps = 3;
        assert_eq!(s.frame_delay_ms(), 333);
    }

    #[test]
    fn local_gif_encodes_every_frame() {
        let strategy = LocalGifStrategy;
        let frames = (0..3)
            .map(|i| strategy.prepare_frame(frame(i * 80)).unwrap())
            .collect();
        let mut reported = Vec::new();
        let artifact = strategy
            .encode(frames, &settings(), &mut |p| reported.push(p))
            .unwrap();

        assert_eq!(artifact.filename, "track_animation.gif");
        assert_eq!(&artifact.bytes[..6], b"GIF89a");
        assert_eq!(reported.len(), 3);
        assert_eq!(reported.last().copied(), Some(1.0));
    }

    #[test]
    fn remote_gif_posts_png_frames() {
        let transport = FakeTransport::default();
        let strategy = RemoteGifStrategy::new(transport.clone());
        let payload = strategy.prepare_frame(frame(10)).unwrap();
        assert!(matches!(payload, FramePayload::Png(_)));

        let artifact = strategy
            .encode(vec![payload], &settings(), &mut |_| {})
            .unwrap();
        assert_eq!(artifact.bytes, b"blob");

        let requests = transport.requests.borrow();
        let (path, body) = &requests[0];
        assert_eq!(path, "/api/export/gif");
        assert_eq!(body["fps"], 5);
        assert_eq!(body["loop"], 0);
        let encoded = body["frames"][0].as_str().unwrap();
        let png = BASE64.decode(encoded).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test]
    fn zip_posts_prefix_and_names_archive() {
        let transport = FakeTransport::default();
        let strategy = ZipStrategy::new(transport.clone());
        let frames = vec![strategy.prepare_frame(frame(0)).unwrap()];
        let artifact = strategy.encode(frames, &settings(), &mut |_| {}).unwrap();

        assert_eq!(artifact.filename, "track_frames.zip");
        assert_eq!(artifact.mime, "application/zip");
        let requests = transport.requests.borrow();
        assert_eq!(requests[0].0, "/api/export/zip");
        assert_eq!(requests[0].1["filename_prefix"], "frame");
        assert_eq!(strategy.max_frames(), MAX_FRAMES);
    }

    #[test]
    fn remote_failure_surfaces_status() {
        let transport = FakeTransport {
            status: Some(400),
            ..Default::default()
        };
        let strategy = RemoteGifStrategy::new(transport);
        let err = strategy
            .encode(Vec::new(), &settings(), &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, TrackAnimatorError::Transport { status: 400, .. }));
        assert_eq!(strategy.max_frames(), REMOTE_GIF_MAX_FRAMES);
    }
}
