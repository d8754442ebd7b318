//! Real-time orientation estimation for Joy-Con IMU event streams.
//!
//! Each device gets a [`DeviceSession`] that decodes raw axis events into a
//! calibrated frame and folds it into one of the orientation filters. A
//! [`Monitor`] runs any number of sessions side by side and periodically
//! hands a [`Snapshot`] of all of them to a consumer.

pub mod complementary;
pub mod config;
pub mod decoder;
pub mod display;
pub mod estimator;
pub mod gravity;
pub mod kalman;
pub mod monitor;
pub mod session;
pub mod source;

pub use imu_traits::{
    AxisCode, DeviceId, EulerAngles, EventKind, EventSource, ImuError, Next, OrientationReader,
    RawEvent, Vector3,
};

// --- Re-export the main entry points ---

pub use complementary::{ComplementaryFilter, YawIntegrator};
pub use config::{
    BlendMode, Calibration, DeviceConfig, DisplayMode, FilterConfig, FilterKind, MonitorConfig,
};
pub use decoder::{CalibratedFrame, SampleDecoder};
pub use display::{OrientationConsumer, TableDisplay};
pub use estimator::{build_estimator, OrientationEstimator};
pub use gravity::GravityFilter;
pub use kalman::KalmanFilter;
pub use monitor::{DeviceReading, Monitor, Snapshot};
pub use session::{DeviceSession, SessionHandle, SessionState, SessionStatus};
pub use source::{ChannelSource, EventSender, RecordedEvent, ReplaySource};
