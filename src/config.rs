use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::angle::AzEl;
use crate::catalog::{split_manual_list, CONSTELLATIONS, MANUAL};
use crate::ephemeris::GroundStation;
use crate::observation::FrequencyPlan;
use crate::scheduler::{MeasurementSettings, ScheduleSettings};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mount: MountConfig,
    #[serde(default)]
    pub station: StationConfig,
    pub targets: TargetsConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    pub measurement: MeasurementConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MountConfig {
    /// `host:port` of the mount controller.
    pub address: String,
    /// Angles of cog 0 on each axis.
    pub min_azimuth: f64,
    pub min_elevation: f64,
    pub stow: AzEl,
    #[serde(default = "default_close_enough")]
    pub close_enough: f64,
    #[serde(default = "default_update_interval", deserialize_with = "duration")]
    pub update_interval: Duration,
}

fn default_close_enough() -> f64 {
    0.5
}

fn default_update_interval() -> Duration {
    Duration::from_millis(250)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StationConfig {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude_m: f64,
}

impl StationConfig {
    pub fn ground_station(&self) -> GroundStation {
        GroundStation {
            latitude_deg: self.latitude,
            longitude_deg: self.longitude,
            altitude_m: self.altitude_m,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetsConfig {
    #[serde(default)]
    pub categories: Vec<String>,
    /// Satellites, or `(az,el)` positions for the MANUAL category. When
    /// given, the categories only select the catalog.
    #[serde(default)]
    pub names: Vec<String>,
    pub tle_dir: Option<PathBuf>,
    /// Maps the beam around one target instead of visiting the others.
    pub grid: Option<GridConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GridConfig {
    /// Satellite name, or `(az,el)` for MANUAL.
    pub target: String,
    pub rows: usize,
    pub cols: usize,
    /// Degrees between rows and between columns.
    pub row_step: f64,
    pub col_step: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub elevation_cutoff: f64,
    pub max_batch_size: usize,
    pub exact_solver_limit: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            elevation_cutoff: 10.0,
            max_batch_size: 8,
            exact_solver_limit: 9,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeasurementConfig {
    /// MHz, observed for every target.
    pub frequencies: Option<Vec<f64>>,
    /// Band names per constellation.
    pub bands: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default = "default_sky_frequency")]
    pub sky_frequency: f64,
    /// MHz; 0 measures without a reference.
    #[serde(default)]
    pub frequency_offset: f64,
    #[serde(default)]
    pub offset: AzEl,
    #[serde(default = "one")]
    pub repeats_per_target: usize,
    #[serde(default = "one")]
    pub repeats_per_frequency: usize,
    #[serde(default)]
    pub lna: bool,
    #[serde(default)]
    pub diode_switching: bool,
    #[serde(default = "default_channels")]
    pub channels: usize,
    #[serde(default = "default_integration", deserialize_with = "duration")]
    pub integration: Duration,
    #[serde(default = "default_long_wait", deserialize_with = "optional_duration")]
    pub settle_timeout: Option<Duration>,
}

fn default_sky_frequency() -> f64 {
    1420.4
}

fn one() -> usize {
    1
}

fn default_channels() -> usize {
    256
}

fn default_integration() -> Duration {
    Duration::from_secs(1)
}

fn default_long_wait() -> Option<Duration> {
    Some(Duration::from_secs(600))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    #[serde(deserialize_with = "duration")]
    pub scan_time: Duration,
    #[serde(deserialize_with = "duration")]
    pub lap_interval: Duration,
    /// `never` waits forever.
    #[serde(deserialize_with = "optional_duration")]
    pub reach_timeout: Option<Duration>,
    #[serde(deserialize_with = "duration")]
    pub reset_timeout: Duration,
    #[serde(deserialize_with = "duration")]
    pub empty_retry: Duration,
    #[serde(deserialize_with = "duration")]
    pub poll_interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        let s = ScheduleSettings::default();
        Self {
            scan_time: s.scan_time,
            lap_interval: s.lap_interval,
            reach_timeout: s.reach_timeout,
            reset_timeout: s.reset_timeout,
            empty_retry: s.empty_retry,
            poll_interval: s.poll_interval,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub data_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

fn duration<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    let s = String::deserialize(d)?;
    humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom)
}

fn optional_duration<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
    let s = String::deserialize(d)?;
    if s.trim().eq_ignore_ascii_case("never") {
        return Ok(None);
    }
    humantime::parse_duration(s.trim())
        .map(Some)
        .map_err(serde::de::Error::custom)
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Targets are fixed `(az,el)` positions rather than satellites.
    pub fn is_manual(&self) -> bool {
        self.targets
            .categories
            .iter()
            .any(|c| c.eq_ignore_ascii_case(MANUAL))
    }

    /// Every configured `(az,el)` position; entries may hold several.
    pub fn manual_positions(&self) -> Result<Vec<String>, ConfigError> {
        let mut positions = Vec::new();
        for entry in &self.targets.names {
            let items =
                split_manual_list(entry).map_err(|e| ConfigError::Invalid(e.to_string()))?;
            positions.extend(items);
        }
        Ok(positions)
    }

    /// Reports problems serde cannot see.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        let targets = &self.targets;

        if targets.categories.is_empty() && targets.names.is_empty() {
            return invalid("no target categories or names configured".into());
        }
        if self.is_manual() {
            if targets.categories.len() > 1 {
                return invalid("MANUAL cannot be mixed with other categories".into());
            }
            if targets.names.is_empty() {
                return invalid("MANUAL needs (az,el) positions in targets.names".into());
            }
            self.manual_positions()?;
        } else {
            if targets.tle_dir.is_none() {
                return invalid("targets.tle_dir is required for satellite targets".into());
            }
            if let Some(unknown) = targets
                .categories
                .iter()
                .find(|c| !c.eq_ignore_ascii_case("all") && !CONSTELLATIONS.contains(&c.as_str()))
            {
                return invalid(format!("unknown category {}", unknown));
            }
        }

        if let Some(grid) = &targets.grid {
            if grid.rows == 0 || grid.cols == 0 {
                return invalid("targets.grid needs at least one row and column".into());
            }
            if grid.row_step <= 0.0 || grid.col_step <= 0.0 {
                return invalid("targets.grid steps must be positive".into());
            }
        }

        let m = &self.measurement;
        match (&m.frequencies, &m.bands) {
            (Some(_), Some(_)) => {
                return invalid("give either measurement.frequencies or measurement.bands".into())
            }
            (None, None) => {
                return invalid("measurement.frequencies or measurement.bands is required".into())
            }
            (Some(f), None) if f.is_empty() || f.iter().any(|&f| f <= 0.0) => {
                return invalid("measurement.frequencies must be positive".into())
            }
            (None, Some(_)) if self.is_manual() => {
                return invalid("MANUAL targets need measurement.frequencies".into())
            }
            _ => {}
        }
        if m.repeats_per_target == 0 || m.repeats_per_frequency == 0 {
            return invalid("repeat counts must be at least 1".into());
        }
        if m.channels == 0 {
            return invalid("measurement.channels must be at least 1".into());
        }
        if self.mount.close_enough <= 0.0 {
            return invalid("mount.close_enough must be positive".into());
        }
        Ok(())
    }

    pub fn frequency_plan(&self) -> FrequencyPlan {
        let m = &self.measurement;
        match (&m.frequencies, &m.bands) {
            (Some(mhz), _) => FrequencyPlan::fixed_mhz(mhz),
            (None, Some(bands)) => FrequencyPlan::bands(bands.clone(), m.sky_frequency * 1e6),
            (None, None) => FrequencyPlan::Fixed(Vec::new()),
        }
    }

    pub fn measurement_settings(&self) -> MeasurementSettings {
        let m = &self.measurement;
        MeasurementSettings {
            frequency_offset_hz: m.frequency_offset * 1e6,
            lna: m.lna,
            repeats_per_target: m.repeats_per_target,
            offset: m.offset,
            settle_timeout: m.settle_timeout,
            repeats_per_frequency: m.repeats_per_frequency,
            diode_switching: m.diode_switching,
        }
    }

    pub fn schedule_settings(&self) -> ScheduleSettings {
        let s = &self.schedule;
        ScheduleSettings {
            scan_time: s.scan_time,
            lap_interval: s.lap_interval,
            reach_timeout: s.reach_timeout,
            reset_timeout: s.reset_timeout,
            empty_retry: s.empty_retry,
            poll_interval: s.poll_interval,
        }
    }
}
