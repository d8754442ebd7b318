use crate::config::BlendMode;
use crate::decoder::CalibratedFrame;
use imu_traits::EulerAngles;

/// Integrates the z gyro rate into a heading in [0, 360) degrees.
///
/// Nothing corrects this heading, so it drifts with any gyro bias.
#[derive(Debug, Clone, Copy, Default)]
pub struct YawIntegrator {
    angle: f64,
}

impl YawIntegrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, gyro_z: f64, dt: f64) -> f64 {
        let angle = (self.angle + gyro_z * dt).rem_euclid(360.0);
        // rem_euclid rounds tiny negative sums up to exactly 360.0
        self.angle = if angle >= 360.0 { 0.0 } else { angle };
        self.angle
    }
}

/// Fixed-weight blend of accelerometer tilt and gyro rates.
#[derive(Debug, Clone)]
pub struct ComplementaryFilter {
    alpha: f64,
    mode: BlendMode,
    previous_timestamp: f64,
    yaw: YawIntegrator,
    /// Running roll/pitch in radians, only advanced in `BlendMode::Integrated`.
    roll: f64,
    pitch: f64,
}

impl ComplementaryFilter {
    /// `start` is the timestamp (seconds) the first `dt` is measured from.
    pub fn new(alpha: f64, mode: BlendMode, start: f64) -> Self {
        ComplementaryFilter {
            alpha,
            mode,
            previous_timestamp: start,
            yaw: YawIntegrator::new(),
            roll: 0.0,
            pitch: 0.0,
        }
    }

    pub fn mode(&self) -> BlendMode {
        self.mode
    }

    /// Advances the filter to time `t` (seconds) and returns the estimate in
    /// degrees. Out-of-order timestamps give a negative `dt` that is used
    /// as-is.
    pub fn update(&mut self, frame: &CalibratedFrame, t: f64) -> EulerAngles {
        let dt = t - self.previous_timestamp;
        self.previous_timestamp = t;

        let (roll_acc, pitch_acc) = frame.accel_tilt();
        let yaw = self.yaw.update(frame.gyro.z, dt);

        let gyro_roll = (frame.gyro.x * dt).to_radians();
        let gyro_pitch = (frame.gyro.y * dt).to_radians();
        let a = self.alpha;

        let (roll, pitch) = match self.mode {
            BlendMode::Instantaneous => (
                a * (roll_acc + gyro_roll) + (1.0 - a) * roll_acc,
                a * (pitch_acc + gyro_pitch) + (1.0 - a) * pitch_acc,
            ),
            BlendMode::Integrated => (
                a * (self.roll + gyro_roll) + (1.0 - a) * roll_acc,
                a * (self.pitch + gyro_pitch) + (1.0 - a) * pitch_acc,
            ),
        };
        self.roll = roll;
        self.pitch = pitch;

        EulerAngles::new(roll.to_degrees(), pitch.to_degrees(), yaw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use imu_traits::Vector3;

    fn frame(gyro: (f64, f64, f64), accel: (f64, f64, f64)) -> CalibratedFrame {
        CalibratedFrame::new(
            Vector3::new(gyro.0, gyro.1, gyro.2),
            Vector3::new(accel.0, accel.1, accel.2),
        )
    }

    #[test]
    fn stationary_device_is_level() {
        let mut filter = ComplementaryFilter::new(0.98, BlendMode::Instantaneous, 0.0);
        let out = filter.update(&frame((0.0, 0.0, 0.0), (0.0, 0.0, 1.0)), 0.01);
        assert_abs_diff_eq!(out.roll, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.pitch, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.yaw, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn yaw_wraps_after_a_full_turn() {
        let mut filter = ComplementaryFilter::new(0.98, BlendMode::Instantaneous, 0.0);
        let f = frame((0.0, 0.0, 37.0), (0.0, 0.0, 1.0));
        let mut previous = 0.0;
        for step in 1..=9 {
            let yaw = filter.update(&f, step as f64).yaw;
            assert!(yaw > previous);
            previous = yaw;
        }
        // 370 degrees of accumulated rotation.
        let yaw = filter.update(&f, 10.0).yaw;
        assert_abs_diff_eq!(yaw, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn negative_rate_stays_in_range() {
        let mut yaw = YawIntegrator::new();
        let angle = yaw.update(-30.0, 1.0);
        assert_abs_diff_eq!(angle, 330.0, epsilon = 1e-12);
        assert!((0.0..360.0).contains(&angle));
    }

    #[test]
    fn tiny_negative_heading_wraps_to_zero() {
        let mut yaw = YawIntegrator::new();
        assert_eq!(yaw.update(-1e-15, 1.0), 0.0);
    }

    #[test]
    fn without_gyro_the_blend_is_the_accelerometer_tilt() {
        for (accel, dt) in [
            ((0.0, 0.5, 0.866), 0.01),
            ((0.3, -0.2, 0.9), 0.25),
            ((-0.7, 0.1, -0.6), 3.0),
        ] {
            let mut filter = ComplementaryFilter::new(0.98, BlendMode::Instantaneous, 0.0);
            let f = frame((0.0, 0.0, 5.0), accel);
            let out = filter.update(&f, dt);
            let (roll_acc, pitch_acc) = f.accel_tilt();
            assert_relative_eq!(out.roll, roll_acc.to_degrees(), max_relative = 1e-12);
            assert_relative_eq!(out.pitch, pitch_acc.to_degrees(), max_relative = 1e-12);
        }
    }

    #[test]
    fn instantaneous_blend_adds_only_the_weighted_gyro_step() {
        let mut filter = ComplementaryFilter::new(0.98, BlendMode::Instantaneous, 0.0);
        // 100 deg/s over 0.1 s is a 10 degree step; 98% of it is kept.
        let out = filter.update(&frame((100.0, 0.0, 0.0), (0.0, 0.0, 1.0)), 0.1);
        assert_abs_diff_eq!(out.roll, 9.8, epsilon = 1e-9);

        // The next update starts again from the accelerometer tilt.
        let out = filter.update(&frame((0.0, 0.0, 0.0), (0.0, 0.0, 1.0)), 0.2);
        assert_abs_diff_eq!(out.roll, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn integrated_blend_carries_the_gyro_estimate() {
        let mut filter = ComplementaryFilter::new(0.98, BlendMode::Integrated, 0.0);
        let spin = frame((100.0, 0.0, 0.0), (0.0, 0.0, 1.0));
        filter.update(&spin, 0.1);
        let out = filter.update(&spin, 0.2);
        // 0.98 * (0.98 * 10 + 10) degrees.
        assert_abs_diff_eq!(out.roll, 0.98 * (9.8 + 10.0), epsilon = 1e-9);
        assert_eq!(filter.mode(), BlendMode::Integrated);
    }

    #[test]
    fn negative_dt_is_not_clamped() {
        let mut filter = ComplementaryFilter::new(0.98, BlendMode::Instantaneous, 1.0);
        let out = filter.update(&frame((0.0, 0.0, 10.0), (0.0, 0.0, 1.0)), 0.5);
        assert_abs_diff_eq!(out.yaw, 355.0, epsilon = 1e-9);
    }
}
