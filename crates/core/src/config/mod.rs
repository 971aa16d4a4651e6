use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::record::ExportMethod;
use crate::trail::TrailMode;
use crate::Result;

/// Export frame rates offered to the user.
pub const FPS_OPTIONS: [u32; 4] = [1, 2, 5, 10];
/// Export widths offered to the user; heights follow at 16:9.
pub const WIDTH_OPTIONS: [u32; 3] = [480, 720, 1080];

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub playback: PlaybackConfig,
    pub display: DisplayConfig,
    pub export: ExportConfig,
}

impl AppConfig {
    /// Reads a JSON config file. Missing sections and fields keep defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&text)?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Simulated milliseconds per real millisecond.
    pub speed: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { speed: 10.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub trail_mode: TrailMode,
    pub trail_window_minutes: f64,
    pub icon_size: u32,
    /// Fill used when no basemap snapshot is available.
    pub fallback_background: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            trail_mode: TrailMode::Full,
            trail_window_minutes: 30.0,
            icon_size: 32,
            fallback_background: "#0f4c75".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub method: ExportMethod,
    pub fps: u32,
    pub width: u32,
    /// Base URL of the remote encoding service.
    pub backend_url: String,
    /// GIF loop count, 0 loops forever.
    pub loop_count: u16,
    pub filename_prefix: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            method: ExportMethod::ClientGif,
            fps: 5,
            width: 720,
            backend_url: "http://localhost:8000".to_string(),
            loop_count: 0,
            filename_prefix: "frame".to_string(),
        }
    }
}

impl ExportConfig {
    /// The backend URL with a scheme, defaulting to https, and no trailing
    /// slash.
    pub fn backend_base_url(&self) -> String {
        let url = self.backend_url.trim().trim_end_matches('/');
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("https://{url}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "export": { "method": "zip", "fps": 10 } }"#).unwrap();
        assert_eq!(config.export.method, ExportMethod::Zip);
        assert_eq!(config.export.fps, 10);
        assert_eq!(config.export.width, 720);
        assert_eq!(config.display, DisplayConfig::default());
        assert_eq!(config.playback.speed, 10.0);
    }

    #[test]
    fn normalises_backend_url() {
        let mut export = ExportConfig::default();
        assert_eq!(export.backend_base_url(), "http://localhost:8000");

        export.backend_url = "encoder.example.com/".to_string();
        assert_eq!(export.backend_base_url(), "https://encoder.example.com");
    }

    #[test]
    fn round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = AppConfig::default();
        config.display.trail_mode = TrailMode::Window;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
