use crate::config::{Calibration, DeviceConfig, FilterConfig};
use crate::decoder::{CalibratedFrame, SampleDecoder};
use crate::estimator::{build_estimator, OrientationEstimator};
use crate::source::ReplaySource;
use imu_traits::{DeviceId, EulerAngles, EventSource, ImuError, Next, OrientationReader, RawEvent};
use log::{debug, error, info, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// How long a session waits on its source before re-checking the running flag.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    Running,
    /// The device disconnected or its recording ended.
    Closed,
    Stopped,
    Failed(ImuError),
}

impl SessionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Running)
    }
}

/// Everything a consumer may read about a session, published as one value.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub orientation: EulerAngles,
    pub frame: CalibratedFrame,
    pub status: SessionStatus,
    pub updates: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState {
            orientation: EulerAngles::default(),
            frame: CalibratedFrame::default(),
            status: SessionStatus::Running,
            updates: 0,
        }
    }
}

/// Read side of a device session, cheap to clone and safe to share.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: DeviceId,
    state: Arc<RwLock<SessionState>>,
    running: Arc<RwLock<bool>>,
}

impl SessionHandle {
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Copy of the latest published state; never a half-written update.
    pub fn state(&self) -> Result<SessionState, ImuError> {
        Ok(self.state.read()?.clone())
    }

    pub fn status(&self) -> Result<SessionStatus, ImuError> {
        Ok(self.state.read()?.status.clone())
    }
}

impl OrientationReader for SessionHandle {
    fn get_orientation(&self) -> Result<EulerAngles, ImuError> {
        Ok(self.state.read()?.orientation)
    }

    fn stop(&self) -> Result<(), ImuError> {
        *self.running.write()? = false;
        Ok(())
    }
}

/// One device's decoder, estimator and measurement frame, bound to its
/// event stream.
pub struct DeviceSession {
    id: DeviceId,
    source: Box<dyn EventSource>,
    decoder: SampleDecoder,
    frame: CalibratedFrame,
    estimator: Box<dyn OrientationEstimator>,
    epoch: Instant,
    state: Arc<RwLock<SessionState>>,
    running: Arc<RwLock<bool>>,
}

impl DeviceSession {
    pub fn new(
        id: DeviceId,
        source: Box<dyn EventSource>,
        calibration: Calibration,
        filter: &FilterConfig,
    ) -> Self {
        DeviceSession {
            id,
            source,
            decoder: SampleDecoder::new(calibration),
            frame: CalibratedFrame::default(),
            estimator: build_estimator(filter, 0.0),
            epoch: Instant::now(),
            state: Arc::new(RwLock::new(SessionState::default())),
            running: Arc::new(RwLock::new(true)),
        }
    }

    /// Opens the recording named by `device`. Fails with `DeviceUnavailable`
    /// if it cannot be opened; no retry is attempted.
    pub fn open(
        device: &DeviceConfig,
        calibration: Calibration,
        filter: &FilterConfig,
    ) -> Result<Self, ImuError> {
        let source = ReplaySource::open(&device.path, device.pace)?;
        info!("Opened {} from {}", device.id, device.path.display());
        Ok(Self::new(device.id, Box::new(source), calibration, filter))
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            id: self.id,
            state: Arc::clone(&self.state),
            running: Arc::clone(&self.running),
        }
    }

    pub fn frame(&self) -> &CalibratedFrame {
        &self.frame
    }

    pub fn get_orientation(&self) -> Result<EulerAngles, ImuError> {
        Ok(self.state.read()?.orientation)
    }

    /// Decodes `event` and, if it carried a measurement axis, runs one
    /// estimator update at the current wall-clock time.
    pub fn process_event(&mut self, event: &RawEvent) -> Result<Option<EulerAngles>, ImuError> {
        let t = self.epoch.elapsed().as_secs_f64();
        self.process_event_at(event, t)
    }

    /// Same as [`process_event`](Self::process_event) with an explicit
    /// timestamp in seconds since the session was created.
    pub fn process_event_at(
        &mut self,
        event: &RawEvent,
        t: f64,
    ) -> Result<Option<EulerAngles>, ImuError> {
        if self.decoder.decode(&mut self.frame, event).is_none() {
            return Ok(None);
        }

        let orientation = match self.estimator.update(&self.frame, t) {
            Ok(orientation) => orientation,
            Err(ImuError::DegenerateMeasurement(msg)) => {
                debug!("{}: skipping update, {}", self.id, msg);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let mut state = self.state.write()?;
        state.orientation = orientation;
        state.frame = self.frame;
        state.updates += 1;
        Ok(Some(orientation))
    }

    /// Consumes the event stream until it closes, the session is stopped, or
    /// a fatal error occurs. The final status is published before returning,
    /// including when the source or estimator panics.
    pub fn run(mut self) -> Result<(), ImuError> {
        info!("{}: session started ({} filter)", self.id, self.estimator.kind());
        let result = match panic::catch_unwind(AssertUnwindSafe(|| self.consume())) {
            Ok(result) => result,
            Err(_) => Err(ImuError::Other("session worker panicked".to_string())),
        };

        let status = match &result {
            Ok(status) => status.clone(),
            Err(e) => {
                error!("{}: session failed: {}", self.id, e);
                SessionStatus::Failed(e.clone())
            }
        };
        info!("{}: session ended with {:?}", self.id, status);
        let mut state = self.state.write().unwrap_or_else(|poisoned| {
            warn!("{}: state lock poisoned, publishing final status anyway", self.id);
            PoisonError::into_inner(poisoned)
        });
        state.status = status;
        result.map(|_| ())
    }

    fn consume(&mut self) -> Result<SessionStatus, ImuError> {
        loop {
            if !*self.running.read()? {
                return Ok(SessionStatus::Stopped);
            }
            match self.source.next_event(POLL_INTERVAL)? {
                Next::Event(event) => {
                    self.process_event(&event)?;
                }
                Next::Recorded { event, time } => {
                    self.process_event_at(&event, time)?;
                }
                Next::Timeout => continue,
                Next::Closed => return Ok(SessionStatus::Closed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterKind;
    use crate::source::{ChannelSource, ReplaySource};
    use approx::assert_abs_diff_eq;
    use imu_traits::{AxisCode, EventKind};
    use std::io::Write;
    use std::thread;

    fn session(filter: FilterConfig) -> (crate::source::EventSender, DeviceSession) {
        let (tx, source) = ChannelSource::channel();
        let session = DeviceSession::new(
            DeviceId::Left,
            Box::new(source),
            Calibration::default(),
            &filter,
        );
        (tx, session)
    }

    #[test]
    fn resting_device_reads_level() {
        let (_tx, mut session) = session(FilterConfig::default());
        session
            .process_event_at(&RawEvent::axis(AxisCode::AccelZ, 4096), 0.01)
            .unwrap();
        let out = session.get_orientation().unwrap();
        assert_abs_diff_eq!(out.roll, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.pitch, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn only_measurement_events_trigger_updates() {
        let (_tx, mut session) = session(FilterConfig::default());
        let handle = session.handle();

        assert!(session.process_event_at(&RawEvent::sync(), 0.1).unwrap().is_none());
        let unknown = RawEvent {
            kind: EventKind::Axis,
            code: 0x3f,
            value: 9,
        };
        assert!(session.process_event_at(&unknown, 0.2).unwrap().is_none());
        assert_eq!(handle.state().unwrap().updates, 0);

        assert!(session
            .process_event_at(&RawEvent::axis(AxisCode::GyroZ, 100), 0.3)
            .unwrap()
            .is_some());
        assert_eq!(handle.state().unwrap().updates, 1);
    }

    #[test]
    fn dt_comes_from_this_sessions_previous_update() {
        let (_tx, mut session) = session(FilterConfig::default());
        // 1000 raw units = 70 deg/s.
        session
            .process_event_at(&RawEvent::axis(AxisCode::GyroZ, 1000), 1.0)
            .unwrap();
        let out = session
            .process_event_at(&RawEvent::axis(AxisCode::AccelZ, 4096), 1.5)
            .unwrap()
            .unwrap();
        // 70 deg/s over the first second since creation, then over 0.5 s.
        assert_abs_diff_eq!(out.yaw, 70.0 + 35.0, epsilon = 1e-9);
    }

    #[test]
    fn kalman_session_reports_heading() {
        let filter = FilterConfig {
            kind: FilterKind::Kalman,
            ..FilterConfig::default()
        };
        let (_tx, mut session) = session(filter);
        session
            .process_event_at(&RawEvent::axis(AxisCode::GyroZ, 1000), 2.0)
            .unwrap();
        assert_abs_diff_eq!(session.get_orientation().unwrap().yaw, 140.0, epsilon = 1e-9);
    }

    #[test]
    fn run_publishes_closed_status() {
        let (tx, session) = session(FilterConfig::default());
        let handle = session.handle();
        let worker = thread::spawn(move || session.run());

        tx.send(RawEvent::axis(AxisCode::AccelY, 4096)).unwrap();
        tx.send(RawEvent::axis(AxisCode::AccelZ, 4096)).unwrap();
        drop(tx);
        worker.join().unwrap().unwrap();

        let state = handle.state().unwrap();
        assert_eq!(state.status, SessionStatus::Closed);
        assert_eq!(state.updates, 2);
        assert_abs_diff_eq!(state.orientation.roll, 45.0, epsilon = 1e-6);
    }

    #[test]
    fn stop_ends_an_idle_session() {
        let (_tx, session) = session(FilterConfig::default());
        let handle = session.handle();
        let worker = thread::spawn(move || session.run());

        handle.stop().unwrap();
        worker.join().unwrap().unwrap();
        assert_eq!(handle.status().unwrap(), SessionStatus::Stopped);
    }

    #[test]
    fn recorded_events_use_their_own_timestamps() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        // 1000 raw units = 70 deg/s, held for 0.5 s of recording.
        writeln!(file, "0.0,3,5,1000").unwrap();
        writeln!(file, "0.5,3,2,4096").unwrap();
        file.flush().unwrap();

        let source = ReplaySource::open(file.path(), false).unwrap();
        let session = DeviceSession::new(
            DeviceId::Left,
            Box::new(source),
            Calibration::default(),
            &FilterConfig::default(),
        );
        let handle = session.handle();
        session.run().unwrap();

        assert_abs_diff_eq!(handle.get_orientation().unwrap().yaw, 35.0, epsilon = 1e-9);
    }

    #[test]
    fn singular_kalman_update_fails_the_session() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0.0,3,2,4096").unwrap();
        writeln!(file, "0.1,3,2,4096").unwrap();
        file.flush().unwrap();

        // Zero process noise and R = -I cancel P = I exactly at dt = 0.
        let filter = FilterConfig {
            kind: FilterKind::Kalman,
            process_noise: 0.0,
            measurement_noise: -1.0,
            ..FilterConfig::default()
        };
        let source = ReplaySource::open(file.path(), false).unwrap();
        let session = DeviceSession::new(
            DeviceId::Right,
            Box::new(source),
            Calibration::default(),
            &filter,
        );
        let handle = session.handle();

        assert_eq!(session.run(), Err(ImuError::SingularCovariance));
        let state = handle.state().unwrap();
        assert_eq!(
            state.status,
            SessionStatus::Failed(ImuError::SingularCovariance)
        );
        assert_eq!(state.updates, 0);
    }

    #[test]
    fn panicking_source_is_reported_as_failed() {
        struct Faulty;
        impl EventSource for Faulty {
            fn next_event(&mut self, _: Duration) -> Result<Next, ImuError> {
                panic!("driver bug");
            }
        }

        let session = DeviceSession::new(
            DeviceId::Left,
            Box::new(Faulty),
            Calibration::default(),
            &FilterConfig::default(),
        );
        let handle = session.handle();

        assert!(matches!(session.run(), Err(ImuError::Other(_))));
        assert!(matches!(
            handle.status().unwrap(),
            SessionStatus::Failed(ImuError::Other(_))
        ));
    }

    #[test]
    fn missing_device_is_unavailable() {
        let device = DeviceConfig {
            id: DeviceId::Right,
            path: "/nonexistent/right.csv".into(),
            pace: false,
        };
        let err = DeviceSession::open(&device, Calibration::default(), &FilterConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, ImuError::DeviceUnavailable(_)));
    }
}
