use crate::decoder::CalibratedFrame;
use imu_traits::ImuError;
use log::error;
use nalgebra::{Matrix2, Matrix2x4, Matrix4, Vector2, Vector4};

/// Roll/pitch Kalman filter with per-axis gyro bias states.
///
/// State is `[roll, pitch, roll_bias, pitch_bias]`. The measurement is the
/// accelerometer tilt in radians; gyro rates enter as control input.
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    state: Vector4<f64>,
    p: Matrix4<f64>,
    q: Matrix4<f64>,
    r: Matrix2<f64>,
    h: Matrix2x4<f64>,
    previous_timestamp: f64,
    failed: bool,
}

impl KalmanFilter {
    pub fn new(process_noise: f64, measurement_noise: f64, start: f64) -> Self {
        Self::with_covariances(
            Matrix4::identity(),
            Matrix4::identity() * process_noise,
            Matrix2::identity() * measurement_noise,
            start,
        )
    }

    pub fn with_covariances(
        p: Matrix4<f64>,
        q: Matrix4<f64>,
        r: Matrix2<f64>,
        start: f64,
    ) -> Self {
        KalmanFilter {
            state: Vector4::zeros(),
            p,
            q,
            r,
            h: Matrix2x4::new(
                1.0, 0.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, 0.0,
            ),
            previous_timestamp: start,
            failed: false,
        }
    }

    pub fn state(&self) -> &Vector4<f64> {
        &self.state
    }

    pub fn covariance(&self) -> &Matrix4<f64> {
        &self.p
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Runs one predict/update cycle at time `t` (seconds) and returns
    /// `(roll, pitch)` in radians.
    ///
    /// Once the innovation covariance has failed to invert, the filter is
    /// unusable and every later call returns `SingularCovariance`.
    pub fn update(&mut self, frame: &CalibratedFrame, t: f64) -> Result<(f64, f64), ImuError> {
        if self.failed {
            return Err(ImuError::SingularCovariance);
        }

        let dt = t - self.previous_timestamp;
        self.previous_timestamp = t;

        // Predict
        let mut f = Matrix4::identity();
        f[(0, 2)] = -dt;
        f[(1, 3)] = -dt;

        let u = Vector4::new(
            frame.gyro.x - self.state[2],
            frame.gyro.y - self.state[3],
            0.0,
            0.0,
        );

        self.state = f * self.state + u * dt;
        self.p = f * self.p * f.transpose() + self.q;

        // Update
        let (roll_acc, pitch_acc) = frame.accel_tilt();
        let z = Vector2::new(roll_acc, pitch_acc);

        let y = z - self.h * self.state;
        let s = self.h * self.p * self.h.transpose() + self.r;
        let s_inv = match s.try_inverse() {
            Some(inv) => inv,
            None => {
                error!("Kalman innovation covariance is singular: {}", s);
                self.failed = true;
                return Err(ImuError::SingularCovariance);
            }
        };
        let k = self.p * self.h.transpose() * s_inv;

        self.state += k * y;
        self.p = (Matrix4::identity() - k * self.h) * self.p;

        Ok((self.state[0], self.state[1]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use imu_traits::Vector3;

    fn still(accel: Vector3) -> CalibratedFrame {
        CalibratedFrame::new(Vector3::default(), accel)
    }

    #[test]
    fn level_device_stays_level() {
        let mut kf = KalmanFilter::new(1e-5, 1e-2, 0.0);
        let (roll, pitch) = kf.update(&still(Vector3::new(0.0, 0.0, 1.0)), 0.01).unwrap();
        assert_abs_diff_eq!(roll, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(pitch, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn converges_to_accelerometer_tilt() {
        for accel in [
            Vector3::new(0.0, 0.5, 0.866),
            Vector3::new(0.3, -0.2, 0.9),
            Vector3::new(-0.5, 0.5, 0.7),
        ] {
            let frame = still(accel);
            let (target_roll, target_pitch) = frame.accel_tilt();
            let mut kf = KalmanFilter::new(1e-5, 1e-2, 0.0);

            let mut worst = (target_roll.abs(), target_pitch.abs());
            for step in 1..=60 {
                let (roll, pitch) = kf.update(&frame, step as f64 * 0.01).unwrap();
                let err = ((roll - target_roll).abs(), (pitch - target_pitch).abs());
                // Bias coupling makes the estimate ring slightly around the
                // target, but never further than it already was.
                assert!(err.0 <= worst.0 + 5e-4, "roll diverged at step {}", step);
                assert!(err.1 <= worst.1 + 5e-4, "pitch diverged at step {}", step);
                worst = (worst.0.min(err.0.max(1e-3)), worst.1.min(err.1.max(1e-3)));
            }

            assert_abs_diff_eq!(kf.state()[0], target_roll, epsilon = 1e-4);
            assert_abs_diff_eq!(kf.state()[1], target_pitch, epsilon = 1e-4);
        }
    }

    #[test]
    fn first_update_moves_most_of_the_way() {
        let frame = still(Vector3::new(0.0, 0.5, 0.866));
        let (target, _) = frame.accel_tilt();
        let mut kf = KalmanFilter::new(1e-5, 1e-2, 0.0);
        let (roll, _) = kf.update(&frame, 0.01).unwrap();
        assert!((roll - target).abs() < 0.02 * target.abs());
    }

    #[test]
    fn covariance_stays_symmetric() {
        let mut kf = KalmanFilter::new(1e-5, 1e-2, 0.0);
        let frame = CalibratedFrame::new(
            Vector3::new(3.0, -2.0, 0.0),
            Vector3::new(0.1, 0.2, 0.95),
        );
        for step in 1..=100 {
            kf.update(&frame, step as f64 * 0.005).unwrap();
        }
        let p = kf.covariance();
        assert_abs_diff_eq!((p - p.transpose()).amax(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn singular_innovation_is_fatal() {
        let mut kf = KalmanFilter::with_covariances(
            Matrix4::zeros(),
            Matrix4::zeros(),
            Matrix2::zeros(),
            0.0,
        );
        let frame = still(Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(kf.update(&frame, 0.01), Err(ImuError::SingularCovariance));
        assert!(kf.is_failed());

        // No recovery.
        assert_eq!(kf.update(&frame, 0.02), Err(ImuError::SingularCovariance));
    }
}
