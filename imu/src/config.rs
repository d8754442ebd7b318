use imu_traits::{DeviceId, ImuError};
use log::info;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum_macros::{Display, EnumString};

/// Raw-to-physical scale factors of the Joy-Con IMU.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// g per raw accelerometer unit
    pub accel_sensitivity: f64,
    /// deg/s per raw gyroscope unit
    pub gyro_sensitivity: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Calibration {
            accel_sensitivity: 0.000244,
            gyro_sensitivity: 0.070,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FilterKind {
    #[default]
    Complementary,
    Kalman,
    Gravity,
}

/// How the complementary filter combines gyro and accelerometer tilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BlendMode {
    /// Both sides of the blend use the current accelerometer tilt; the gyro
    /// only contributes its per-step increment.
    #[default]
    Instantaneous,
    /// Gyro rates are integrated into a running estimate that is then pulled
    /// toward the accelerometer tilt.
    Integrated,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub kind: FilterKind,
    pub blend: BlendMode,
    /// Complementary filter weight on the gyro term, in (0, 1).
    pub alpha: f64,
    pub process_noise: f64,
    pub measurement_noise: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            kind: FilterKind::Complementary,
            blend: BlendMode::Instantaneous,
            alpha: 0.98,
            process_noise: 1e-5,
            measurement_noise: 1e-2,
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<(), ImuError> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(ImuError::ConfigurationError(format!(
                "alpha must be in (0, 1), got {}",
                self.alpha
            )));
        }
        if self.process_noise < 0.0 || self.measurement_noise <= 0.0 {
            return Err(ImuError::ConfigurationError(
                "noise variances must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DisplayMode {
    #[default]
    Orientation,
    Acceleration,
    Vector,
}

/// One device to monitor, backed by a recorded event stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceConfig {
    pub id: DeviceId,
    pub path: PathBuf,
    /// Replay at the recorded rate instead of as fast as possible.
    #[serde(default)]
    pub pace: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub devices: Vec<DeviceConfig>,
    pub display_interval_ms: u64,
    pub display: DisplayMode,
    pub calibration: Calibration,
    pub filter: FilterConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            devices: Vec::new(),
            display_interval_ms: 100,
            display: DisplayMode::Orientation,
            calibration: Calibration::default(),
            filter: FilterConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn load(path: &Path) -> Result<Self, ImuError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ImuError::ConfigurationError(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&contents)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ImuError> {
        let config: MonitorConfig =
            toml::from_str(contents).map_err(|e| ImuError::ConfigurationError(e.to_string()))?;
        config.filter.validate()?;
        if config.display_interval_ms == 0 {
            return Err(ImuError::ConfigurationError(
                "display_interval_ms must be non-zero".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn display_interval(&self) -> Duration {
        Duration::from_millis(self.display_interval_ms)
    }
}
