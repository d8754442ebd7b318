use crate::complementary::{ComplementaryFilter, YawIntegrator};
use crate::config::{FilterConfig, FilterKind};
use crate::decoder::CalibratedFrame;
use crate::gravity::GravityFilter;
use crate::kalman::KalmanFilter;
use imu_traits::{EulerAngles, ImuError};
use log::debug;

/// A stateful orientation filter owned by one device session.
pub trait OrientationEstimator: Send {
    /// Folds the current frame in at time `t` (seconds since the session
    /// started) and returns the new estimate in degrees.
    fn update(&mut self, frame: &CalibratedFrame, t: f64) -> Result<EulerAngles, ImuError>;

    fn kind(&self) -> FilterKind;
}

/// Builds the estimator selected by `config`, timing its first step from
/// `start`.
pub fn build_estimator(config: &FilterConfig, start: f64) -> Box<dyn OrientationEstimator> {
    debug!("Building {} estimator", config.kind);
    match config.kind {
        FilterKind::Complementary => Box::new(ComplementaryEstimator(ComplementaryFilter::new(
            config.alpha,
            config.blend,
            start,
        ))),
        FilterKind::Kalman => Box::new(KalmanEstimator::new(
            KalmanFilter::new(config.process_noise, config.measurement_noise, start),
            start,
        )),
        FilterKind::Gravity => Box::new(GravityEstimator::new(
            GravityFilter::new(config.alpha, start),
            start,
        )),
    }
}

pub struct ComplementaryEstimator(pub ComplementaryFilter);

impl OrientationEstimator for ComplementaryEstimator {
    fn update(&mut self, frame: &CalibratedFrame, t: f64) -> Result<EulerAngles, ImuError> {
        Ok(self.0.update(frame, t))
    }

    fn kind(&self) -> FilterKind {
        FilterKind::Complementary
    }
}

/// Heading for filters that only estimate tilt, integrated the same way as on
/// the complementary path.
#[derive(Debug, Clone)]
struct HeadingTracker {
    yaw: YawIntegrator,
    previous_timestamp: f64,
}

impl HeadingTracker {
    fn new(start: f64) -> Self {
        HeadingTracker {
            yaw: YawIntegrator::new(),
            previous_timestamp: start,
        }
    }

    fn update(&mut self, gyro_z: f64, t: f64) -> f64 {
        let dt = t - self.previous_timestamp;
        self.previous_timestamp = t;
        self.yaw.update(gyro_z, dt)
    }
}

pub struct KalmanEstimator {
    filter: KalmanFilter,
    heading: HeadingTracker,
}

impl KalmanEstimator {
    pub fn new(filter: KalmanFilter, start: f64) -> Self {
        KalmanEstimator {
            filter,
            heading: HeadingTracker::new(start),
        }
    }
}

impl OrientationEstimator for KalmanEstimator {
    fn update(&mut self, frame: &CalibratedFrame, t: f64) -> Result<EulerAngles, ImuError> {
        let (roll, pitch) = self.filter.update(frame, t)?;
        let yaw = self.heading.update(frame.gyro.z, t);
        Ok(EulerAngles::new(roll.to_degrees(), pitch.to_degrees(), yaw))
    }

    fn kind(&self) -> FilterKind {
        FilterKind::Kalman
    }
}

pub struct GravityEstimator {
    filter: GravityFilter,
    heading: HeadingTracker,
}

impl GravityEstimator {
    pub fn new(filter: GravityFilter, start: f64) -> Self {
        GravityEstimator {
            filter,
            heading: HeadingTracker::new(start),
        }
    }
}

impl OrientationEstimator for GravityEstimator {
    fn update(&mut self, frame: &CalibratedFrame, t: f64) -> Result<EulerAngles, ImuError> {
        let yaw = self.heading.update(frame.gyro.z, t);
        self.filter.update(frame, t)?;
        let (roll, pitch) = self.filter.tilt();
        Ok(EulerAngles::new(roll.to_degrees(), pitch.to_degrees(), yaw))
    }

    fn kind(&self) -> FilterKind {
        FilterKind::Gravity
    }
}
