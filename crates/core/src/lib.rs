//! Core library for the Track Animator.
//!
//! Loads time-stamped position tracks for aircraft and vessels, replays them
//! on a simulated clock, and exports the replay as an animated GIF or a
//! ZIP of PNG frames. Rendering and export never touch the wall clock, so
//! every frame of an export is a pure function of its simulated instant.

pub mod config;
pub mod error;
pub mod ingest;
pub mod interpolate;
pub mod record;
pub mod render;
pub mod timeline;
pub mod track;
pub mod trail;

pub use config::{AppConfig, DisplayConfig, ExportConfig, PlaybackConfig};
pub use error::{Result, TrackAnimatorError};
pub use ingest::{load_csv_file, parse_csv};
pub use interpolate::{interpolate, interpolated_positions, TrackPosition};
pub use record::{
    BasemapSource, CancelToken, ExportArtifact, ExportMethod, ExportOrchestrator, ExportOutcome,
    ExportPhase, ExportProgress, ExportRequest, ExportRun, ExportScene, ExportStrategy, FramePlan,
    Step, MAX_FRAMES,
};
pub use render::{FallbackProjection, FrameRenderer, Projection, RenderOptions};
pub use timeline::{format_utc, PlaybackClock};
pub use track::{
    Bounds, LatLon, MapView, Millis, NewTrack, Sample, TimeRange, Track, TrackCategory, TrackPatch,
    TrackSource, TrackStore,
};
pub use trail::{select_trail, TrailMode};
