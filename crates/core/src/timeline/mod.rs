use std::time::Instant;

use chrono::DateTime;

use crate::track::{Millis, TimeRange};
use crate::{Result, TrackAnimatorError};

/// Playback multipliers offered to the user.
pub const SPEED_OPTIONS: [f64; 5] = [1.0, 5.0, 10.0, 30.0, 100.0];

/// Advances the shared "current time" at a multiple of real time.
///
/// The host calls [`PlaybackClock::tick`] from its frame callback with the
/// callback's timestamp. The first tick after starting only records a
/// reference instant, so time spent paused is never counted.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    range: TimeRange,
    current: f64,
    speed: f64,
    playing: bool,
    last_tick: Option<Instant>,
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new(TimeRange::default(), 10.0)
    }
}

impl PlaybackClock {
    pub fn new(range: TimeRange, speed: f64) -> Self {
        Self {
            range,
            current: range.start as f64,
            speed,
            playing: false,
            last_tick: None,
        }
    }

    pub fn range(&self) -> TimeRange {
        self.range
    }

    /// Replaces the range and rewinds to its start.
    pub fn set_range(&mut self, range: TimeRange) {
        self.range = range;
        self.current = range.start as f64;
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f64) -> Result<()> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(TrackAnimatorError::InvalidInput(
                "playback speed must be a positive number",
            ));
        }
        self.speed = speed;
        Ok(())
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Current time rounded to whole milliseconds.
    pub fn current_time(&self) -> Millis {
        self.current.round() as Millis
    }

    pub fn play(&mut self) {
        if self.range.is_empty() {
            return;
        }
        self.playing = true;
        self.last_tick = None;
    }

    pub fn pause(&mut self) {
        self.playing = false;
        self.last_tick = None;
    }

    pub fn toggle(&mut self) {
        if self.playing {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Pauses and rewinds to the start of the range.
    pub fn reset(&mut self) {
        self.pause();
        self.current = self.range.start as f64;
    }

    /// Jumps to `t`, clamped into the range. Play state is untouched.
    pub fn seek(&mut self, t: Millis) {
        self.current = self.range.clamp(t) as f64;
    }

    /// Jumps to a slider position in `[0, 1]`.
    pub fn seek_ratio(&mut self, ratio: f64) {
        let ratio = ratio.clamp(0.0, 1.0);
        self.current = self.range.start as f64 + self.range.duration() as f64 * ratio;
    }

    /// Position of the current time within the range, `0.0` when empty.
    pub fn progress(&self) -> f64 {
        if self.range.is_empty() {
            return 0.0;
        }
        (self.current - self.range.start as f64) / self.range.duration() as f64
    }

    /// Advances by the real time elapsed since the previous tick times the
    /// playback speed. Reaching the end of the range stops exactly on it and
    /// pauses.
    pub fn tick(&mut self, now: Instant) -> Millis {
        if !self.playing {
            return self.current_time();
        }

        if let Some(last) = self.last_tick {
            let elapsed_ms = now.saturating_duration_since(last).as_secs_f64() * 1_000.0;
            let next = self.current + elapsed_ms * self.speed;
            if next >= self.range.end as f64 {
                self.current = self.range.end as f64;
                self.pause();
                tracing::debug!(end = self.range.end, "playback reached end of range");
                return self.current_time();
            }
            self.current = next;
        }
        self.last_tick = Some(now);
        self.current_time()
    }
}

/// Formats epoch milliseconds as `YYYY-MM-DD HH:MM:SS UTC`, `--` for zero.
pub fn format_utc(ms: Millis) -> String {
    if ms == 0 {
        return "--".to_string();
    }
    match DateTime::from_timestamp_millis(ms) {
        Some(datetime) => datetime.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "--".to_string(),
    }
}
