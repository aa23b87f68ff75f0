//! Service configuration
//!
//! Read from `karaoke.config.json`. Every field of the file is optional; anything left out
//! falls back to the defaults below.

use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::{CoreError, CoreResult};

pub const CONFIG_ENV: &str = "KARAOKE_CONFIG";
pub const CONFIG_FILE_NAME: &str = "karaoke.config.json";

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;
const DEFAULT_LOG_FILTER: &str = "info";

// ═══════════════════════════════════════════════════════════════
// FILE FORMAT
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JobsConfigFile {
    pub max_concurrent: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolsConfigFile {
    pub ffmpeg: Option<String>,
    pub downloader: Option<String>,
    pub separator: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeparationConfigFile {
    pub device: Option<String>,
    pub model: Option<String>,
    pub two_stems: Option<String>,
    pub mp3: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PitchConfigFile {
    pub sample_rate: Option<u32>,
    pub min_semitones: Option<i32>,
    pub max_semitones: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DownloadConfigFile {
    pub video_format: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KaraokeConfigFile {
    pub listen_addr: Option<String>,
    pub work_root: Option<String>,
    pub max_upload_bytes: Option<usize>,
    pub log_filter: Option<String>,
    pub jobs: JobsConfigFile,
    pub tools: ToolsConfigFile,
    pub separation: SeparationConfigFile,
    pub pitch: PitchConfigFile,
    pub download: DownloadConfigFile,
}

// ═══════════════════════════════════════════════════════════════
// RESOLVED CONFIG
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct ToolsConfig {
    pub ffmpeg: String,
    pub downloader: String,
    pub separator: String,
    /// Per-invocation limit; `None` lets a tool run as long as it needs
    pub timeout_secs: Option<u64>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".into(),
            downloader: "yt-dlp".into(),
            separator: "demucs".into(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SeparationConfig {
    pub device: String,
    pub model: String,
    /// Stem isolated against everything else (`--two-stems`)
    pub two_stems: String,
    pub mp3: bool,
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            device: "cpu".into(),
            model: "htdemucs_6s".into(),
            two_stems: "vocals".into(),
            mp3: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PitchConfig {
    pub sample_rate: u32,
    pub min_semitones: i32,
    pub max_semitones: i32,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            min_semitones: -6,
            max_semitones: 6,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub video_format: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            video_format: "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KaraokeConfig {
    pub listen_addr: String,
    /// Parent directory of every job workspace
    pub work_root: PathBuf,
    pub max_upload_bytes: usize,
    pub log_filter: String,
    pub max_concurrent_jobs: usize,
    pub tools: ToolsConfig,
    pub separation: SeparationConfig,
    pub pitch: PitchConfig,
    pub download: DownloadConfig,
}

impl Default for KaraokeConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.into(),
            work_root: std::env::temp_dir().join("karaoke"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            log_filter: DEFAULT_LOG_FILTER.into(),
            max_concurrent_jobs: 2,
            tools: ToolsConfig::default(),
            separation: SeparationConfig::default(),
            pitch: PitchConfig::default(),
            download: DownloadConfig::default(),
        }
    }
}

impl KaraokeConfig {
    /// Resolve the config: explicit path, then `KARAOKE_CONFIG`, then `./karaoke.config.json`,
    /// then built-in defaults.
    pub fn load(explicit: Option<&Path>) -> CoreResult<Self> {
        if let Some(p) = explicit {
            return Self::load_from_path(p);
        }

        if let Ok(p) = std::env::var(CONFIG_ENV) {
            return Self::load_from_path(Path::new(&p));
        }

        let cwd = std::env::current_dir()?;
        let p1 = cwd.join(CONFIG_FILE_NAME);
        if p1.exists() {
            return Self::load_from_path(&p1);
        }

        tracing::info!("{CONFIG_FILE_NAME} not found, using built-in defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(cfg_path: &Path) -> CoreResult<Self> {
        let raw = fs::read_to_string(cfg_path)
            .map_err(|e| CoreError::Config(format!("Failed to read {cfg_path:?}: {e}")))?;
        let file_cfg: KaraokeConfigFile = serde_json::from_str(&raw)
            .map_err(|e| CoreError::Config(format!("Invalid {CONFIG_FILE_NAME}: {e}")))?;

        let base_dir = cfg_path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_file(file_cfg, base_dir)
    }

    /// Merge a parsed file over the defaults. Relative `work_root` resolves against `base_dir`.
    pub fn from_file(file_cfg: KaraokeConfigFile, base_dir: &Path) -> CoreResult<Self> {
        let defaults = Self::default();

        let work_root = match file_cfg.work_root {
            Some(p) => base_dir.join(p),
            None => defaults.work_root,
        };

        let pitch = PitchConfig {
            sample_rate: file_cfg.pitch.sample_rate.unwrap_or(defaults.pitch.sample_rate),
            min_semitones: file_cfg.pitch.min_semitones.unwrap_or(defaults.pitch.min_semitones),
            max_semitones: file_cfg.pitch.max_semitones.unwrap_or(defaults.pitch.max_semitones),
        };

        let cfg = Self {
            listen_addr: file_cfg.listen_addr.unwrap_or(defaults.listen_addr),
            work_root,
            max_upload_bytes: file_cfg.max_upload_bytes.unwrap_or(defaults.max_upload_bytes),
            log_filter: file_cfg.log_filter.unwrap_or(defaults.log_filter),
            max_concurrent_jobs: file_cfg
                .jobs
                .max_concurrent
                .unwrap_or(defaults.max_concurrent_jobs),
            tools: ToolsConfig {
                ffmpeg: file_cfg.tools.ffmpeg.unwrap_or(defaults.tools.ffmpeg),
                downloader: file_cfg.tools.downloader.unwrap_or(defaults.tools.downloader),
                separator: file_cfg.tools.separator.unwrap_or(defaults.tools.separator),
                timeout_secs: file_cfg.tools.timeout_secs.or(defaults.tools.timeout_secs),
            },
            separation: SeparationConfig {
                device: file_cfg.separation.device.unwrap_or(defaults.separation.device),
                model: file_cfg.separation.model.unwrap_or(defaults.separation.model),
                two_stems: file_cfg.separation.two_stems.unwrap_or(defaults.separation.two_stems),
                mp3: file_cfg.separation.mp3.unwrap_or(defaults.separation.mp3),
            },
            pitch,
            download: DownloadConfig {
                video_format: file_cfg
                    .download
                    .video_format
                    .unwrap_or(defaults.download.video_format),
            },
        };

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(CoreError::Config("jobs.max_concurrent must be at least 1".into()));
        }
        if self.pitch.min_semitones > self.pitch.max_semitones {
            return Err(CoreError::Config(format!(
                "pitch.min_semitones ({}) exceeds pitch.max_semitones ({})",
                self.pitch.min_semitones, self.pitch.max_semitones
            )));
        }
        if self.pitch.sample_rate == 0 {
            return Err(CoreError::Config("pitch.sample_rate must be positive".into()));
        }
        if self.tools.timeout_secs == Some(0) {
            return Err(CoreError::Config("tools.timeout_secs must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_demucs_invocation() {
        let cfg = KaraokeConfig::default();
        assert_eq!(cfg.listen_addr, "127.0.0.1:3000");
        assert_eq!(cfg.separation.model, "htdemucs_6s");
        assert_eq!(cfg.separation.two_stems, "vocals");
        assert!(cfg.separation.mp3);
        assert_eq!(cfg.pitch.min_semitones, -6);
        assert_eq!(cfg.pitch.max_semitones, 6);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            r#"{ "work_root": "jobs", "jobs": { "max_concurrent": 4 }, "tools": { "ffmpeg": "/opt/ffmpeg" } }"#,
        )
        .unwrap();

        let cfg = KaraokeConfig::load_from_path(&path).unwrap();
        assert_eq!(cfg.work_root, dir.path().join("jobs"));
        assert_eq!(cfg.max_concurrent_jobs, 4);
        assert_eq!(cfg.tools.ffmpeg, "/opt/ffmpeg");
        assert_eq!(cfg.tools.downloader, "yt-dlp");
        assert_eq!(cfg.separation.device, "cpu");
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let file_cfg: KaraokeConfigFile =
            serde_json::from_str(r#"{ "jobs": { "max_concurrent": 0 } }"#).unwrap();
        let err = KaraokeConfig::from_file(file_cfg, Path::new(".")).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn test_rejects_inverted_semitone_range() {
        let file_cfg: KaraokeConfigFile =
            serde_json::from_str(r#"{ "pitch": { "min_semitones": 3, "max_semitones": -3 } }"#)
                .unwrap();
        assert!(KaraokeConfig::from_file(file_cfg, Path::new(".")).is_err());
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            KaraokeConfig::load_from_path(&path),
            Err(CoreError::Config(_))
        ));
    }
}
