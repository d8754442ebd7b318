use crate::decoder::CalibratedFrame;
use imu_traits::{ImuError, Vector3};
use nalgebra::{Matrix3, Vector3 as NVector3};

/// Tracks the device's "up" direction as a unit vector.
///
/// Each step rotates the previous vector by the gyro's small-angle rotation
/// and pulls it toward the normalized accelerometer reading.
#[derive(Debug, Clone)]
pub struct GravityFilter {
    alpha: f64,
    up: NVector3<f64>,
    previous_timestamp: f64,
}

impl GravityFilter {
    pub fn new(alpha: f64, start: f64) -> Self {
        GravityFilter {
            alpha,
            up: NVector3::z(),
            previous_timestamp: start,
        }
    }

    pub fn up(&self) -> Vector3 {
        Vector3::new(self.up.x, self.up.y, self.up.z)
    }

    /// Advances to time `t` (seconds).
    ///
    /// A zero accelerometer reading gives no gravity direction; the update is
    /// rejected and the filter left unchanged, so the next accepted update
    /// integrates the gyro over the whole gap.
    pub fn update(&mut self, frame: &CalibratedFrame, t: f64) -> Result<Vector3, ImuError> {
        let dt = t - self.previous_timestamp;
        let gravity = frame.accel.normalize()?;
        let gravity = NVector3::new(gravity.x, gravity.y, gravity.z);

        let wx = (frame.gyro.x * dt).to_radians();
        let wy = (frame.gyro.y * dt).to_radians();
        let wz = (frame.gyro.z * dt).to_radians();
        #[rustfmt::skip]
        let rotation = Matrix3::new(
            1.0, -wz,  wy,
            wz,  1.0, -wx,
            -wy, wx,  1.0,
        );

        let blended = self.alpha * (rotation * self.up) + (1.0 - self.alpha) * gravity;
        let unit = Vector3::new(blended.x, blended.y, blended.z).normalize()?;
        self.up = NVector3::new(unit.x, unit.y, unit.z);
        self.previous_timestamp = t;
        Ok(unit)
    }

    /// Roll and pitch (radians) of the tracked vector, using the same
    /// conventions as the accelerometer tilt.
    pub fn tilt(&self) -> (f64, f64) {
        CalibratedFrame::new(Vector3::default(), self.up()).accel_tilt()
    }
}
