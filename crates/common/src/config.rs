//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Global engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scratch root for intermediate segment files.
    /// When unset, scratch space is created next to the output file.
    pub work_dir: Option<PathBuf>,

    /// Default encoding settings.
    pub render: RenderDefaults,

    /// Segment worker pool settings.
    pub workers: WorkerConfig,

    /// Audio mixing defaults.
    pub audio: AudioDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default encoding parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderDefaults {
    /// Output frame rate when the job does not override it.
    pub fps: u32,

    /// Default video codec.
    pub video_codec: String,

    /// Video bitrate in kbps.
    pub video_bitrate_kbps: u32,

    /// Audio bitrate in kbps.
    pub audio_bitrate_kbps: u32,

    /// Encoder preset (ultrafast .. veryslow).
    pub preset: String,

    /// Constant rate factor for the final encode.
    pub crf: u32,
}

/// Worker pool sizing and retry policy for segment rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum segments rendered concurrently.
    pub max_workers: usize,

    /// Per-attempt timeout for a single segment render.
    pub segment_timeout_secs: u64,

    /// Retries after the first failed attempt.
    pub max_retries: u32,

    /// Delay between attempts.
    pub retry_delay_ms: u64,
}

/// Audio mixing defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioDefaults {
    /// Fixed attenuation applied to the background bed (linear gain).
    pub background_volume: f64,

    /// Sample rate for intermediate audio.
    pub sample_rate: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "reelcut=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            render: RenderDefaults::default(),
            workers: WorkerConfig::default(),
            audio: AudioDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            fps: 30,
            video_codec: "h264".to_string(),
            video_bitrate_kbps: 8000,
            audio_bitrate_kbps: 192,
            preset: "medium".to_string(),
            crf: 23,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
            segment_timeout_secs: 300,
            max_retries: 3,
            retry_delay_ms: 2000,
        }
    }
}

impl Default for AudioDefaults {
    fn default() -> Self {
        Self {
            background_volume: 0.15,
            sample_rate: 48000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl WorkerConfig {
    /// Worker count, never zero.
    pub fn effective_workers(&self) -> usize {
        self.max_workers.max(1)
    }

    /// Total attempts per segment (first try plus retries).
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn segment_timeout(&self) -> Duration {
        Duration::from_secs(self.segment_timeout_secs.max(1))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl EngineConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit path. Unlike [`EngineConfig::load`],
    /// a missing or malformed file is an error.
    pub fn load_from(path: &std::path::Path) -> crate::error::ReelcutResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::ReelcutError::config(format!("Failed to read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            crate::error::ReelcutError::config(format!("Failed to parse {}: {e}", path.display()))
        })
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("reelcut").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"workers": {"max_retries": 1}}"#).unwrap();
        assert_eq!(config.workers.max_retries, 1);
        assert_eq!(config.workers.max_attempts(), 2);
        assert_eq!(config.workers.segment_timeout_secs, 300);
        assert_eq!(config.render.fps, 30);
        assert!((config.audio.background_volume - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_zero_workers_is_clamped() {
        let workers = WorkerConfig {
            max_workers: 0,
            ..WorkerConfig::default()
        };
        assert_eq!(workers.effective_workers(), 1);
    }

    #[test]
    fn test_load_from_reports_parse_failure() {
        let dir = std::env::temp_dir().join("reelcut_test_config_parse");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = EngineConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
