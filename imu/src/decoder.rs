use crate::config::Calibration;
use imu_traits::{AxisCode, EventKind, RawEvent, Vector3};

/// Latest calibrated reading of every measurement axis.
///
/// Axes are overwritten independently as events arrive, so a frame may mix
/// fresh and stale axes from different report cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CalibratedFrame {
    /// deg/s
    pub gyro: Vector3,
    /// g
    pub accel: Vector3,
}

impl CalibratedFrame {
    pub fn new(gyro: Vector3, accel: Vector3) -> Self {
        CalibratedFrame { gyro, accel }
    }

    /// Roll and pitch (radians) implied by the accelerometer alone.
    ///
    /// A zero gravity vector follows the `atan2(0, 0) == 0` convention and
    /// yields a level tilt.
    pub fn accel_tilt(&self) -> (f64, f64) {
        let a = &self.accel;
        let roll = a.y.atan2(a.z);
        let pitch = (-a.x).atan2((a.y * a.y + a.z * a.z).sqrt());
        (roll, pitch)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SampleDecoder {
    calibration: Calibration,
}

impl SampleDecoder {
    pub fn new(calibration: Calibration) -> Self {
        SampleDecoder { calibration }
    }

    /// Writes the calibrated value of `event` into `frame`.
    ///
    /// Returns the axis that was updated, or `None` when the event is not a
    /// measurement-axis report.
    pub fn decode(&self, frame: &mut CalibratedFrame, event: &RawEvent) -> Option<AxisCode> {
        if event.kind != EventKind::Axis {
            return None;
        }
        let axis = AxisCode::from_code(event.code)?;
        let raw = event.value as f64;
        let gyro = raw * self.calibration.gyro_sensitivity;
        let accel = raw * self.calibration.accel_sensitivity;
        match axis {
            AxisCode::GyroX => frame.gyro.x = gyro,
            AxisCode::GyroY => frame.gyro.y = gyro,
            AxisCode::GyroZ => frame.gyro.z = gyro,
            AxisCode::AccelX => frame.accel.x = accel,
            AxisCode::AccelY => frame.accel.y = accel,
            AxisCode::AccelZ => frame.accel.z = accel,
        }
        Some(axis)
    }
}
