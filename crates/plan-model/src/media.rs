//! Source media description and per-job render configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A decodable source recording with known properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMedia {
    pub path: PathBuf,
    pub duration_secs: f64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub has_audio: bool,
}

impl SourceMedia {
    pub fn aspect_ratio(&self) -> f64 {
        self.width.max(1) as f64 / self.height.max(1) as f64
    }
}

/// Output video codec. Selects the container as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    #[default]
    H264,
    H265,
    Vp9,
}

impl VideoCodec {
    /// ffmpeg encoder name.
    pub fn encoder(self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
            VideoCodec::H265 => "libx265",
            VideoCodec::Vp9 => "libvpx-vp9",
        }
    }

    pub fn audio_encoder(self) -> &'static str {
        match self {
            VideoCodec::H264 | VideoCodec::H265 => "aac",
            VideoCodec::Vp9 => "libopus",
        }
    }

    /// Container file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            VideoCodec::H264 | VideoCodec::H265 => "mp4",
            VideoCodec::Vp9 => "webm",
        }
    }
}

impl FromStr for VideoCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h264" | "avc" | "x264" => Ok(VideoCodec::H264),
            "h265" | "hevc" | "x265" => Ok(VideoCodec::H265),
            "vp9" => Ok(VideoCodec::Vp9),
            other => Err(format!("unsupported codec `{other}` (expected h264, h265 or vp9)")),
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VideoCodec::H264 => "h264",
            VideoCodec::H265 => "h265",
            VideoCodec::Vp9 => "vp9",
        };
        f.write_str(name)
    }
}

/// Output frame size, `WIDTHxHEIGHT` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const HD_1080: Resolution = Resolution {
        width: 1920,
        height: 1080,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::HD_1080
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("resolution must be WIDTHxHEIGHT, got `{s}`"))?;
        let width: u32 = w
            .trim()
            .parse()
            .map_err(|_| format!("invalid width in `{s}`"))?;
        let height: u32 = h
            .trim()
            .parse()
            .map_err(|_| format!("invalid height in `{s}`"))?;
        // Even dimensions keep yuv420p encoders happy.
        if width < 2 || height < 2 || width % 2 != 0 || height % 2 != 0 {
            return Err(format!("resolution must be even and at least 2x2, got `{s}`"));
        }
        Ok(Self { width, height })
    }
}

impl TryFrom<String> for Resolution {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Resolution> for String {
    fn from(r: Resolution) -> Self {
        r.to_string()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Per-job render options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Keep the recording's audio (time-stretched per segment) instead of narration.
    pub keep_original_audio: bool,
    /// Mix a background bed under the result.
    pub background_music: bool,
    /// Bed asset, required when `background_music` is set.
    #[serde(default)]
    pub background_music_path: Option<PathBuf>,
    #[serde(default)]
    pub codec: VideoCodec,
    /// Video bitrate; `None` uses the engine default.
    #[serde(default)]
    pub bitrate_kbps: Option<u32>,
    #[serde(default)]
    pub resolution: Resolution,
    /// Output frame rate; `None` uses the engine default.
    #[serde(default)]
    pub fps: Option<u32>,
    pub output_path: PathBuf,
}

impl RenderConfig {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            keep_original_audio: true,
            background_music: false,
            background_music_path: None,
            codec: VideoCodec::default(),
            bitrate_kbps: None,
            resolution: Resolution::default(),
            fps: None,
            output_path: output_path.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_parse() {
        let r: Resolution = "1280x720".parse().unwrap();
        assert_eq!(r, Resolution::new(1280, 720));
        assert_eq!(r.to_string(), "1280x720");
        assert!("1280".parse::<Resolution>().is_err());
        assert!("1281x720".parse::<Resolution>().is_err());
        assert!("0x0".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_codec_container_mapping() {
        assert_eq!("HEVC".parse::<VideoCodec>().unwrap(), VideoCodec::H265);
        assert_eq!(VideoCodec::Vp9.extension(), "webm");
        assert_eq!(VideoCodec::Vp9.audio_encoder(), "libopus");
        assert_eq!(VideoCodec::H264.encoder(), "libx264");
        assert!("prores".parse::<VideoCodec>().is_err());
    }

    #[test]
    fn test_render_config_wire_format() {
        let json = r#"{
            "keep_original_audio": false,
            "background_music": true,
            "codec": "vp9",
            "resolution": "1280x720",
            "output_path": "out.webm"
        }"#;
        let cfg: RenderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.codec, VideoCodec::Vp9);
        assert_eq!(cfg.resolution, Resolution::new(1280, 720));
        assert!(cfg.bitrate_kbps.is_none());

        let bad = r#"{"keep_original_audio": true, "background_music": false,
                      "resolution": "big", "output_path": "o.mp4"}"#;
        assert!(serde_json::from_str::<RenderConfig>(bad).is_err());
    }
}
