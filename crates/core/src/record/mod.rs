//! Offline export of the animation.
//!
//! An export walks a simulated time axis rather than the wall clock. The
//! work is split into discrete steps so the host can repaint progress and
//! observe cancellation between frames:
//!
//! `idle → preparing → generating_frames → encoding → done | cancelled | failed`
//!
//! The orchestrator returns to idle as soon as a run reaches a terminal
//! phase, or when the run is dropped part-way.

pub mod strategy;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::render::{FrameRenderer, Projection};
use crate::track::{Millis, TimeRange, Track, TrackSource};
use crate::{Result, TrackAnimatorError};

pub use strategy::{
    EncodeSettings, EncodeTransport, ExportArtifact, ExportMethod, ExportStrategy, FramePayload,
    HttpTransport, LocalGifStrategy, RemoteGifStrategy, ZipStrategy,
};

/// Hard ceiling on frames per export, bounding memory and total work.
pub const MAX_FRAMES: usize = 600;
/// Share of overall progress budgeted for frame generation.
const FRAME_PHASE_PERCENT: f64 = 70.0;
const ENCODE_PHASE_PERCENT: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportPhase {
    Idle,
    Preparing,
    GeneratingFrames,
    Encoding,
    Done,
    Cancelled,
    Failed,
}

impl ExportPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExportPhase::Done | ExportPhase::Cancelled | ExportPhase::Failed
        )
    }
}

/// Progress notification delivered to the observer after every step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportProgress {
    pub phase: ExportPhase,
    /// Overall completion in `[0, 100]`.
    pub percent: u8,
}

/// Cooperative cancellation flag. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// State of one export run.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub phase: ExportPhase,
    pub progress: u8,
    /// Frames rendered so far.
    pub frame_index: usize,
    /// Frames this job will render.
    pub frame_count: usize,
    cancel: CancelToken,
}

impl ExportJob {
    fn new(frame_count: usize) -> Self {
        Self {
            phase: ExportPhase::Preparing,
            progress: 0,
            frame_index: 0,
            frame_count,
            cancel: CancelToken::new(),
        }
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn snapshot(&self) -> ExportProgress {
        ExportProgress {
            phase: self.phase,
            percent: self.progress,
        }
    }
}

/// Evenly spaced sample times spanning a whole range.
///
/// `intervals` is the number of steps between frames; frames sit at both
/// range ends, so a plan renders `intervals + 1` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePlan {
    pub start: Millis,
    pub duration: Millis,
    pub intervals: usize,
    /// Intervals the playback speed and fps asked for before capping.
    pub ideal_intervals: usize,
}

impl FramePlan {
    /// One frame per `playback_speed * 1000 / fps` simulated milliseconds,
    /// capped so no more than `max_frames` frames are rendered. A capped plan
    /// still covers the whole range with coarser spacing.
    pub fn new(
        range: TimeRange,
        playback_speed: f64,
        fps: u32,
        max_frames: usize,
    ) -> Result<Self> {
        if fps == 0 {
            return Err(TrackAnimatorError::InvalidInput("fps must be at least 1"));
        }
        if !playback_speed.is_finite() || playback_speed <= 0.0 {
            return Err(TrackAnimatorError::InvalidInput(
                "playback speed must be a positive number",
            ));
        }

        let duration = range.duration().max(0);
        let sim_ms_per_frame = playback_speed * 1000.0 / fps as f64;
        let ideal = (duration as f64 / sim_ms_per_frame).ceil();
        let ideal_intervals = if ideal.is_finite() && ideal < usize::MAX as f64 {
            ideal as usize
        } else {
            usize::MAX
        };
        let max_intervals = max_frames.clamp(1, MAX_FRAMES) - 1;

        Ok(Self {
            start: range.start,
            duration,
            intervals: ideal_intervals.min(max_intervals),
            ideal_intervals,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.intervals + 1
    }

    pub fn is_decimated(&self) -> bool {
        self.ideal_intervals > self.intervals
    }

    /// `start + duration * i / intervals`.
    pub fn time_at(&self, index: usize) -> Millis {
        if self.intervals == 0 {
            return self.start;
        }
        let offset = self.duration as i128 * index as i128 / self.intervals as i128;
        self.start + offset as Millis
    }

    pub fn times(&self) -> impl Iterator<Item = Millis> + '_ {
        (0..self.frame_count()).map(|index| self.time_at(index))
    }
}

/// Parameters of one export request.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub fps: u32,
    pub width: u32,
    pub playback_speed: f64,
    pub loop_count: u16,
    pub filename_prefix: String,
}

impl ExportRequest {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            fps: config.export.fps,
            width: config.export.width,
            playback_speed: config.playback.speed,
            loop_count: config.export.loop_count,
            filename_prefix: config.export.filename_prefix.clone(),
        }
    }

    fn encode_settings(&self) -> EncodeSettings {
        EncodeSettings {
            fps: self.fps,
            loop_count: self.loop_count,
            filename_prefix: self.filename_prefix.clone(),
        }
    }
}

/// Supplies a raster of the currently displayed basemap.
pub trait BasemapSource {
    /// `Ok(None)` when nothing is displayed.
    fn snapshot(&self) -> Result<Option<RgbaImage>>;
}

/// Read-only inputs of an export, captured once when the job starts.
#[derive(Clone, Copy)]
pub struct ExportScene<'a> {
    pub tracks: &'a [Track],
    pub range: TimeRange,
    pub projection: Option<&'a dyn Projection>,
    pub basemap: Option<&'a dyn BasemapSource>,
}

impl<'a> ExportScene<'a> {
    pub fn new<S: TrackSource + ?Sized>(source: &'a S) -> Self {
        Self {
            tracks: source.tracks(),
            range: source.time_range(),
            projection: None,
            basemap: None,
        }
    }

    pub fn with_projection(mut self, projection: &'a dyn Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_basemap(mut self, basemap: &'a dyn BasemapSource) -> Self {
        self.basemap = Some(basemap);
        self
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Done(ExportArtifact),
    Cancelled,
    /// User-facing reason; the job is discarded.
    Failed(String),
}

/// Result of driving a run forward by one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Continue,
    Finished(ExportOutcome),
    /// The run already produced its outcome.
    Idle,
}

/// Serialises export jobs: at most one run exists at a time.
#[derive(Debug, Clone, Default)]
pub struct ExportOrchestrator {
    renderer: FrameRenderer,
    busy: Arc<AtomicBool>,
}

impl ExportOrchestrator {
    pub fn new(renderer: FrameRenderer) -> Self {
        Self {
            renderer,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_idle(&self) -> bool {
        !self.busy.load(Ordering::SeqCst)
    }

    /// Plans a job and snapshots the basemap. The run starts out
    /// `preparing`; frames are rendered by subsequent [`ExportRun::step`]
    /// calls.
    pub fn start<'a>(
        &self,
        scene: ExportScene<'a>,
        request: ExportRequest,
        strategy: Box<dyn ExportStrategy + 'a>,
    ) -> Result<ExportRun<'a>> {
        if scene.range.is_empty() {
            return Err(TrackAnimatorError::InvalidInput(
                "nothing to export: the time range is empty",
            ));
        }
        if request.width == 0 {
            return Err(TrackAnimatorError::InvalidInput("width must be at least 1"));
        }
        let plan = FramePlan::new(
            scene.range,
            request.playback_speed,
            request.fps,
            strategy.max_frames(),
        )?;
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(TrackAnimatorError::ExportInProgress);
        }
        let busy = BusyGuard(Some(self.busy.clone()));

        let job = ExportJob::new(plan.frame_count());
        let background = scene.basemap.and_then(|basemap| match basemap.snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(%err, "basemap capture failed, using flat background");
                None
            }
        });

        if plan.is_decimated() {
            tracing::info!(
                ideal = plan.ideal_intervals + 1,
                frames = plan.frame_count(),
                "frame budget exceeded, spreading frames over the full range"
            );
        }
        tracing::info!(
            method = %strategy.method(),
            frames = plan.frame_count(),
            start = plan.start,
            duration_ms = plan.duration,
            "export started"
        );

        Ok(ExportRun {
            renderer: self.renderer.clone(),
            scene,
            background,
            plan,
            settings: request.encode_settings(),
            width: request.width,
            strategy,
            frames: Vec::with_capacity(plan.frame_count()),
            job,
            busy,
        })
    }

    /// Starts a job and drives it to its outcome, forwarding every progress
    /// notification to `on_progress`.
    pub fn run_to_completion<'a>(
        &self,
        scene: ExportScene<'a>,
        request: ExportRequest,
        strategy: Box<dyn ExportStrategy + 'a>,
        on_progress: &mut dyn FnMut(ExportProgress),
    ) -> Result<ExportOutcome> {
        let mut run = self.start(scene, request, strategy)?;
        on_progress(run.job().snapshot());
        loop {
            match run.step(on_progress) {
                Step::Continue => {}
                Step::Finished(outcome) => return Ok(outcome),
                Step::Idle => return Err(TrackAnimatorError::msg("export run already finished")),
            }
        }
    }
}

struct BusyGuard(Option<Arc<AtomicBool>>);

impl BusyGuard {
    fn release(&mut self) {
        if let Some(flag) = self.0.take() {
            flag.store(false, Ordering::SeqCst);
        }
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// One in-flight export, advanced a step at a time.
pub struct ExportRun<'a> {
    renderer: FrameRenderer,
    scene: ExportScene<'a>,
    background: Option<RgbaImage>,
    plan: FramePlan,
    settings: EncodeSettings,
    width: u32,
    strategy: Box<dyn ExportStrategy + 'a>,
    frames: Vec<FramePayload>,
    job: ExportJob,
    busy: BusyGuard,
}

impl<'a> ExportRun<'a> {
    pub fn job(&self) -> &ExportJob {
        &self.job
    }

    pub fn plan(&self) -> &FramePlan {
        &self.plan
    }

    /// Handle the observer uses to request cancellation.
    pub fn cancel_token(&self) -> CancelToken {
        self.job.cancel.clone()
    }

    /// Renders the next frame, or encodes once every frame exists.
    ///
    /// Cancellation is observed before each frame and before encoding.
    pub fn step(&mut self, on_progress: &mut dyn FnMut(ExportProgress)) -> Step {
        match self.job.phase {
            ExportPhase::Preparing => {
                if self.job.cancel_requested() {
                    return self.finish(ExportOutcome::Cancelled, on_progress);
                }
                self.job.phase = ExportPhase::GeneratingFrames;
                on_progress(self.job.snapshot());
                Step::Continue
            }
            ExportPhase::GeneratingFrames => {
                if self.job.cancel_requested() {
                    return self.finish(ExportOutcome::Cancelled, on_progress);
                }
                if self.job.frame_index < self.job.frame_count {
                    if let Err(err) = self.render_next() {
                        tracing::warn!(%err, "export failed");
                        return self.finish(ExportOutcome::Failed(err.to_string()), on_progress);
                    }
                    on_progress(self.job.snapshot());
                    return Step::Continue;
                }
                self.job.phase = ExportPhase::Encoding;
                self.job.progress = FRAME_PHASE_PERCENT as u8;
                tracing::info!(frames = self.frames.len(), "encoding export");
                on_progress(self.job.snapshot());
                Step::Continue
            }
            ExportPhase::Encoding => {
                let frames = std::mem::take(&mut self.frames);
                let job = &mut self.job;
                let mut report = |fraction: f64| {
                    let fraction = fraction.clamp(0.0, 1.0);
                    let percent = FRAME_PHASE_PERCENT + (fraction * ENCODE_PHASE_PERCENT).round();
                    job.progress = job.progress.max(percent as u8);
                    on_progress(job.snapshot());
                };
                let result = self.strategy.encode(frames, &self.settings, &mut report);
                match result {
                    Ok(artifact) => self.finish(ExportOutcome::Done(artifact), on_progress),
                    Err(err) => {
                        tracing::warn!(%err, "export failed");
                        self.finish(ExportOutcome::Failed(err.to_string()), on_progress)
                    }
                }
            }
            phase if phase.is_terminal() => Step::Idle,
            _ => Step::Continue,
        }
    }

    fn render_next(&mut self) -> Result<()> {
        let index = self.job.frame_index;
        let t = self.plan.time_at(index);
        let frame = self.renderer.render_frame(
            self.scene.tracks,
            t,
            self.width,
            self.scene.projection,
            self.background.as_ref(),
        );
        match self.strategy.prepare_frame(frame) {
            Ok(payload) => self.frames.push(payload),
            Err(err) => {
                // Keep the sequence aligned with the plan using a flat frame.
                tracing::warn!(%err, index, "frame packaging failed, substituting blank frame");
                let blank = self.renderer.render_frame(&[], t, self.width, None, None);
                let payload = self.strategy.prepare_frame(blank)?;
                self.frames.push(payload);
            }
        }
        tracing::trace!(index, t, "frame rendered");

        self.job.frame_index += 1;
        let done = self.job.frame_index as f64 / self.job.frame_count as f64;
        self.job.progress = (done * FRAME_PHASE_PERCENT).round() as u8;
        Ok(())
    }

    fn finish(
        &mut self,
        outcome: ExportOutcome,
        on_progress: &mut dyn FnMut(ExportProgress),
    ) -> Step {
        self.job.phase = match &outcome {
            ExportOutcome::Done(_) => {
                self.job.progress = 100;
                ExportPhase::Done
            }
            ExportOutcome::Cancelled => ExportPhase::Cancelled,
            ExportOutcome::Failed(_) => ExportPhase::Failed,
        };
        self.frames = Vec::new();
        self.background = None;
        self.busy.release();
        tracing::info!(phase = ?self.job.phase, "export finished");
        on_progress(self.job.snapshot());
        Step::Finished(outcome)
    }
}

impl std::fmt::Debug for ExportRun<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportRun")
            .field("method", &self.strategy.method())
            .field("plan", &self.plan)
            .field("job", &self.job)
            .field("frames", &self.frames.len())
            .finish()
    }
}
