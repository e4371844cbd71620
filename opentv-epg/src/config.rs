//! Configuration file format.
//!
//! Every field has a default, so an empty file is a valid configuration.
//!
//! ```toml
//! [acquisition]
//! wake_interval_ms = 1000
//! repeat_threshold = 5
//!
//! [channels]
//! bouquet_id = 4097
//! region = 50
//!
//! [epg]
//! country = "GBR"
//! window_days = 7
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, DurationRound, Utc};
use serde::Deserialize;

use crate::channel::ChannelFilter;
use crate::error::{EpgError, Result};
use crate::section::pid;

/// Root configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EpgConfig {
    pub acquisition: AcquisitionConfig,
    pub channels: ChannelsConfig,
    pub epg: GuideConfig,
    pub diagnostics: DiagnosticsConfig,
    pub reference: ReferenceConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Fixed wake interval of every acquisition loop.
    pub wake_interval_ms: u64,
    /// Consecutive wakes without new fragments before a group converges.
    pub repeat_threshold: u32,
    pub title_pids: Vec<u16>,
    pub summary_pids: Vec<u16>,
    pub bouquet_pid: u16,
    pub diagnostic_pids: Vec<u16>,
    pub enable_diagnostic_group: bool,
    /// Drop sections whose CRC does not match.
    pub verify_crc: bool,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            wake_interval_ms: 1000,
            repeat_threshold: 5,
            title_pids: (pid::TITLE_FIRST..=pid::TITLE_LAST).collect(),
            summary_pids: (pid::SUMMARY_FIRST..=pid::SUMMARY_LAST).collect(),
            bouquet_pid: pid::BAT,
            diagnostic_pids: Vec::new(),
            enable_diagnostic_group: false,
            verify_crc: false,
        }
    }
}

impl AcquisitionConfig {
    pub fn wake_interval(&self) -> Duration {
        Duration::from_millis(self.wake_interval_ms)
    }
}

/// Bouquet/region filter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub bouquet_id: Option<u16>,
    /// Absent means any region.
    pub region: Option<u16>,
}

impl ChannelsConfig {
    pub fn filter(&self) -> ChannelFilter {
        ChannelFilter {
            bouquet_id: self.bouquet_id,
            region: self.region,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuideConfig {
    /// ISO 3166 alpha-3 code selecting the dictionary and text heuristics.
    pub country: String,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    /// Window length when `window_end` is not set.
    pub window_days: u32,
    /// Keep descriptions as broadcast; extracted markers and fields are not
    /// cut out.
    pub preserve_original_text: bool,
    /// Prefer custom category phrases over the numeric category table.
    pub custom_category_override: bool,
    pub stitch_titles: bool,
    pub route_suspect_start_times: bool,
    /// Overrides the locale default.
    pub extract_episode_subtitle: Option<bool>,
}

impl Default for GuideConfig {
    fn default() -> Self {
        Self {
            country: "GBR".to_string(),
            window_start: None,
            window_end: None,
            window_days: 7,
            preserve_original_text: false,
            custom_category_override: false,
            stitch_titles: true,
            route_suspect_start_times: false,
            extract_episode_subtitle: None,
        }
    }
}

/// The collection window, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpgWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl EpgWindow {
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        time >= self.start && time < self.end
    }
}

impl GuideConfig {
    /// Resolve the window against the session start. A missing start is the
    /// first whole minute of `now`; a missing end is `window_days` later.
    pub fn window(&self, now: DateTime<Utc>) -> EpgWindow {
        let start = self.window_start.unwrap_or_else(|| {
            now.duration_trunc(chrono::Duration::minutes(1))
                .unwrap_or(now)
        });
        let end = self
            .window_end
            .unwrap_or_else(|| start + chrono::Duration::days(self.window_days as i64));
        EpgWindow { start, end }
    }
}

/// Per-record diagnostic logging switches.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub log_titles: bool,
    pub log_descriptions: bool,
    pub log_extended_descriptions: bool,
    pub log_undefined_records: bool,
    pub log_channel_data: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    pub dictionary_dir: PathBuf,
    /// Category/rating/custom-category tables.
    pub tables: Option<PathBuf>,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            dictionary_dir: PathBuf::from("dictionaries"),
            tables: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub retention_days: u64,
    pub level: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            retention_days: 7,
            level: None,
        }
    }
}

impl EpgConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| EpgError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: EpgConfig =
            toml::from_str(contents).map_err(|e| EpgError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.acquisition.repeat_threshold == 0 {
            return Err(EpgError::Config(
                "acquisition.repeat_threshold must be at least 1".to_string(),
            ));
        }
        if self.acquisition.wake_interval_ms == 0 {
            return Err(EpgError::Config(
                "acquisition.wake_interval_ms must be at least 1".to_string(),
            ));
        }
        if let (Some(start), Some(end)) = (self.epg.window_start, self.epg.window_end) {
            if end <= start {
                return Err(EpgError::Config(format!(
                    "epg.window_end {} is not after window_start {}",
                    end, start
                )));
            }
        }
        if self.epg.country.trim().is_empty() {
            return Err(EpgError::Config("epg.country is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = EpgConfig::from_toml("").unwrap();
        assert_eq!(config.acquisition.wake_interval(), Duration::from_secs(1));
        assert_eq!(config.acquisition.repeat_threshold, 5);
        assert_eq!(config.acquisition.title_pids.len(), 8);
        assert_eq!(config.acquisition.summary_pids[0], 0x40);
        assert_eq!(config.acquisition.bouquet_pid, 0x11);
        assert_eq!(config.epg.country, "GBR");
        assert!(config.epg.stitch_titles);
        assert!(!config.diagnostics.log_titles);
        assert_eq!(config.channels.filter(), ChannelFilter::default());
    }

    #[test]
    fn test_parse_sections() {
        let config = EpgConfig::from_toml(
            r#"
            [acquisition]
            repeat_threshold = 3
            diagnostic_pids = [0x50]
            enable_diagnostic_group = true

            [channels]
            bouquet_id = 4097
            region = 50

            [epg]
            country = "NZL"
            window_start = "2024-01-01T00:00:00Z"
            window_end = "2024-01-02T00:00:00Z"
            preserve_original_text = true

            [diagnostics]
            log_titles = true
            "#,
        )
        .unwrap();

        assert_eq!(config.acquisition.repeat_threshold, 3);
        assert_eq!(config.acquisition.wake_interval_ms, 1000);
        assert_eq!(config.acquisition.diagnostic_pids, vec![0x50]);
        assert_eq!(config.channels.filter().region, Some(50));
        assert_eq!(config.epg.country, "NZL");
        assert!(config.epg.preserve_original_text);
        assert!(config.diagnostics.log_titles);

        let window = config.epg.window(Utc::now());
        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert!(window.contains(Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 0).unwrap()));
        assert!(!window.contains(window.end));
    }

    #[test]
    fn test_validate() {
        assert!(EpgConfig::from_toml("[acquisition]\nrepeat_threshold = 0").is_err());
        assert!(EpgConfig::from_toml("[acquisition]\nwake_interval_ms = 0").is_err());
        assert!(EpgConfig::from_toml(
            "[epg]\nwindow_start = \"2024-01-02T00:00:00Z\"\nwindow_end = \"2024-01-01T00:00:00Z\""
        )
        .is_err());
        assert!(EpgConfig::from_toml("[acquisition]\nrepeat_threshold = \"x\"").is_err());
    }

    #[test]
    fn test_default_window() {
        let guide = GuideConfig::default();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 34, 56).unwrap();
        let window = guide.window(now);
        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 1, 1, 12, 34, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2024, 1, 8, 12, 34, 0).unwrap());
    }
}
