use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString};

// --- Basic Types ---
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Vector3 { x, y, z }
    }

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Returns the unit vector pointing the same way.
    ///
    /// A zero (or non-finite) vector has no direction and is rejected rather
    /// than divided.
    pub fn normalize(&self) -> Result<Vector3, ImuError> {
        let norm = self.norm();
        if norm == 0.0 || !norm.is_finite() {
            return Err(ImuError::DegenerateMeasurement(format!(
                "cannot normalize {}",
                self
            )));
        }
        Ok(Vector3::new(self.x / norm, self.y / norm, self.z / norm))
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vector3(x={}, y={}, z={})", self.x, self.y, self.z)
    }
}

/// Orientation in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EulerAngles {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl EulerAngles {
    pub const fn new(roll: f64, pitch: f64, yaw: f64) -> Self {
        EulerAngles { roll, pitch, yaw }
    }

    /// Direction of the device's forward (x) axis after applying yaw, pitch
    /// and roll, i.e. `Rz * Ry * Rx * [1, 0, 0]`.
    pub fn pointing_vector(&self) -> Vector3 {
        let rotation = nalgebra::Rotation3::from_euler_angles(
            self.roll.to_radians(),
            self.pitch.to_radians(),
            self.yaw.to_radians(),
        );
        let v = rotation * nalgebra::Vector3::x();
        Vector3::new(v.x, v.y, v.z)
    }
}

impl fmt::Display for EulerAngles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EulerAngles(roll={}, pitch={}, yaw={})",
            self.roll, self.pitch, self.yaw
        )
    }
}

// --- Raw Events ---

/// Measurement axes reported by a Joy-Con IMU stream.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    EnumString,
    StrumDisplay,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AxisCode {
    GyroX,
    GyroY,
    GyroZ,
    AccelX,
    AccelY,
    AccelZ,
}

impl AxisCode {
    /// Maps an absolute-axis code (Linux `ABS_*` numbering) to a measurement
    /// axis. Codes outside the measurement set return `None`.
    pub fn from_code(code: u16) -> Option<AxisCode> {
        match code {
            0x00 => Some(AxisCode::AccelX),
            0x01 => Some(AxisCode::AccelY),
            0x02 => Some(AxisCode::AccelZ),
            0x03 => Some(AxisCode::GyroX),
            0x04 => Some(AxisCode::GyroY),
            0x05 => Some(AxisCode::GyroZ),
            _ => None,
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            AxisCode::AccelX => 0x00,
            AxisCode::AccelY => 0x01,
            AxisCode::AccelZ => 0x02,
            AxisCode::GyroX => 0x03,
            AxisCode::GyroY => 0x04,
            AxisCode::GyroZ => 0x05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Absolute axis report; the only kind carrying IMU samples.
    Axis,
    Sync,
    Other(u16),
}

impl EventKind {
    pub fn from_type(event_type: u16) -> EventKind {
        match event_type {
            0x00 => EventKind::Sync,
            0x03 => EventKind::Axis,
            other => EventKind::Other(other),
        }
    }

    pub fn type_code(&self) -> u16 {
        match self {
            EventKind::Sync => 0x00,
            EventKind::Axis => 0x03,
            EventKind::Other(t) => *t,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: EventKind,
    pub code: u16,
    pub value: i32,
}

impl RawEvent {
    pub fn axis(axis: AxisCode, value: i32) -> Self {
        RawEvent {
            kind: EventKind::Axis,
            code: axis.code(),
            value,
        }
    }

    pub fn sync() -> Self {
        RawEvent {
            kind: EventKind::Sync,
            code: 0,
            value: 0,
        }
    }
}

// --- Device Identity ---

/// Tag assigned to a device when its session is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceId {
    Left,
    Right,
    Numbered(u32),
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceId::Left => write!(f, "Joy-Con (L)"),
            DeviceId::Right => write!(f, "Joy-Con (R)"),
            DeviceId::Numbered(n) => write!(f, "Device #{}", n),
        }
    }
}

// --- Standard Error Type ---
#[derive(Debug, Clone, PartialEq)]
pub enum ImuError {
    /// The event source could not open the requested device
    DeviceUnavailable(String),
    /// A measurement has no usable direction (e.g. a zero accelerometer vector)
    DegenerateMeasurement(String),
    /// Innovation covariance could not be inverted during a Kalman update
    SingularCovariance,
    /// Error reading events from the device or internal state
    ReadError(String),
    /// A recorded or configured value could not be parsed
    ParseError(String),
    /// Error during configuration or setup
    ConfigurationError(String),
    /// Error related to multithreading locks (e.g., poisoned)
    LockError(String),
    /// Catch-all for other errors
    Other(String),
}

impl fmt::Display for ImuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImuError::DeviceUnavailable(s) => write!(f, "Device unavailable: {}", s),
            ImuError::DegenerateMeasurement(s) => write!(f, "Degenerate measurement: {}", s),
            ImuError::SingularCovariance => write!(f, "Innovation covariance is singular"),
            ImuError::ReadError(s) => write!(f, "Read error: {}", s),
            ImuError::ParseError(s) => write!(f, "Parse error: {}", s),
            ImuError::ConfigurationError(s) => write!(f, "Configuration error: {}", s),
            ImuError::LockError(s) => write!(f, "Lock error: {}", s),
            ImuError::Other(s) => write!(f, "Other IMU error: {}", s),
        }
    }
}

impl StdError for ImuError {}

impl<T> From<std::sync::PoisonError<T>> for ImuError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        ImuError::LockError(format!("Lock poisoned: {}", err))
    }
}

impl From<std::io::Error> for ImuError {
    fn from(err: std::io::Error) -> Self {
        ImuError::ReadError(err.to_string())
    }
}

// --- Traits ---

/// Result of waiting on an event source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Next {
    /// A live event, timed by the receiver's clock.
    Event(RawEvent),
    /// An event carrying its own capture time in seconds since the stream
    /// started.
    Recorded { event: RawEvent, time: f64 },
    /// Nothing arrived within the timeout; the stream is still open.
    Timeout,
    /// The device disconnected or the recording ended.
    Closed,
}

/// A per-device stream of raw IMU events.
pub trait EventSource: Send {
    /// Waits up to `timeout` for the next event.
    fn next_event(&mut self, timeout: Duration) -> Result<Next, ImuError>;
}

pub trait OrientationReader {
    /// Retrieves the latest completed orientation estimate.
    fn get_orientation(&self) -> Result<EulerAngles, ImuError>;

    fn stop(&self) -> Result<(), ImuError>;
}
