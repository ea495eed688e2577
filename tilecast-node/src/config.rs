//! Configuration for the capture node.

use std::path::Path;

use serde::{Deserialize, Serialize};

use tilecast_core::{CaptureConfig, CodecConfig, DeltaConfig, Priority, SchedulerConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Frame source settings.
    pub camera: CameraConfig,
    /// Change-detection thresholds.
    pub delta: DeltaConfig,
    /// Region codec thresholds.
    pub codec: CodecConfig,
    /// Worker pool sizing.
    pub scheduler: SchedulerConfig,
    /// Priorities of the capture loop and its encode items.
    pub priorities: PriorityConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Frame source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    /// Target capture cycles per second.
    pub fps: u32,
    /// Pixels the synthetic test pattern moves per frame.
    pub pattern_step: u32,
}

/// Scheduling priorities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityConfig {
    pub capture: Priority,
    pub encode: Priority,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Seconds between throughput reports.
    pub report_interval_secs: u64,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 10,
            pattern_step: 4,
        }
    }
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            capture: 0,
            encode: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            report_interval_secs: 5,
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Convert into the core service's configuration.
    pub fn to_capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            fps: self.camera.fps.clamp(1, 120),
            delta: self.delta.clone(),
            codec: self.codec.clone(),
            encode_priority: self.priorities.encode,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&NodeConfig::default()).unwrap();
        assert!(text.contains("[camera]"));
        assert!(text.contains("per_pixel_threshold"));
        assert!(text.contains("block_threshold"));
    }

    #[test]
    fn roundtrip_config() {
        let text = toml::to_string_pretty(&NodeConfig::default()).unwrap();
        let parsed: NodeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.camera.width, 640);
        assert_eq!(parsed.delta.per_tile_threshold, 768);
        assert_eq!(parsed.codec.comparison_threshold, 8);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let parsed: NodeConfig = toml::from_str("[delta]\nper_pixel_threshold = 20\n").unwrap();
        assert_eq!(parsed.delta.per_pixel_threshold, 20);
        assert_eq!(parsed.delta.max_tile_age_ms, 10_000);
        assert_eq!(parsed.camera.fps, 10);
    }

    #[test]
    fn to_capture_config_clamps_fps() {
        let mut cfg = NodeConfig::default();
        cfg.camera.fps = 0;
        assert_eq!(cfg.to_capture_config().fps, 1);
        cfg.camera.fps = 1000;
        assert_eq!(cfg.to_capture_config().fps, 120);
    }

    #[test]
    fn write_default_then_load() {
        let path = std::env::temp_dir().join(format!("tilecast-node-{}.toml", std::process::id()));
        NodeConfig::write_default(&path).unwrap();
        let loaded = NodeConfig::load(&path);
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.priorities.encode, 10);
        assert_eq!(loaded.logging.level, "info");
    }
}
