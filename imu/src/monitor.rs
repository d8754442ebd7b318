use crate::config::MonitorConfig;
use crate::display::OrientationConsumer;
use crate::session::{DeviceSession, SessionHandle, SessionStatus};
use imu_traits::{DeviceId, EulerAngles, ImuError, OrientationReader, Vector3};
use log::{debug, error, info, warn};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// One device's values at the moment its slot was read.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceReading {
    pub id: DeviceId,
    pub orientation: EulerAngles,
    /// g
    pub accel: Vector3,
    pub status: SessionStatus,
    pub updates: u64,
}

/// Point-in-time read across all sessions.
///
/// Each device is read independently, so two readings may come from slightly
/// different moments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub readings: Vec<DeviceReading>,
}

impl Snapshot {
    pub fn capture(handles: &[SessionHandle]) -> Result<Snapshot, ImuError> {
        let mut readings = Vec::with_capacity(handles.len());
        for handle in handles {
            let state = handle.state()?;
            readings.push(DeviceReading {
                id: handle.id(),
                orientation: state.orientation,
                accel: state.frame.accel,
                status: state.status,
                updates: state.updates,
            });
        }
        Ok(Snapshot { readings })
    }

    pub fn get(&self, id: DeviceId) -> Option<&DeviceReading> {
        self.readings.iter().find(|r| r.id == id)
    }
}

/// Runs every device session on its own thread plus a display thread that
/// hands a [`Snapshot`] to the consumer at a fixed interval.
pub struct Monitor {
    handles: Vec<SessionHandle>,
    workers: Vec<(DeviceId, JoinHandle<Result<(), ImuError>>)>,
    display: Option<JoinHandle<()>>,
    running: Arc<RwLock<bool>>,
}

impl Monitor {
    pub fn start<C>(
        sessions: Vec<DeviceSession>,
        interval: Duration,
        consumer: C,
    ) -> Result<Self, ImuError>
    where
        C: OrientationConsumer + 'static,
    {
        let running = Arc::new(RwLock::new(true));
        let handles: Vec<SessionHandle> = sessions.iter().map(DeviceSession::handle).collect();

        let mut monitor = Monitor {
            handles,
            workers: Vec::new(),
            display: None,
            running,
        };

        for session in sessions {
            let id = session.id();
            let worker = thread::Builder::new()
                .name(format!("session-{}", id))
                .spawn(move || session.run())
                .map_err(|e| ImuError::Other(format!("Failed to spawn {} session: {}", id, e)))?;
            monitor.workers.push((id, worker));
        }

        monitor.start_display_thread(interval, consumer)?;
        info!("Monitoring {} device(s)", monitor.handles.len());
        Ok(monitor)
    }

    /// Opens every configured device and starts monitoring those that opened.
    ///
    /// A device that cannot be opened is logged and left out; it is an error
    /// only if no device could be opened at all.
    pub fn from_config<C>(config: &MonitorConfig, consumer: C) -> Result<Self, ImuError>
    where
        C: OrientationConsumer + 'static,
    {
        config.filter.validate()?;
        let mut sessions = Vec::new();
        for device in &config.devices {
            match DeviceSession::open(device, config.calibration, &config.filter) {
                Ok(session) => sessions.push(session),
                Err(e) => error!("Skipping {}: {}", device.id, e),
            }
        }
        if sessions.is_empty() {
            return Err(ImuError::DeviceUnavailable(
                "no configured device could be opened".to_string(),
            ));
        }
        Self::start(sessions, config.display_interval(), consumer)
    }

    fn start_display_thread<C>(
        &mut self,
        interval: Duration,
        mut consumer: C,
    ) -> Result<(), ImuError>
    where
        C: OrientationConsumer + 'static,
    {
        let handles = self.handles.clone();
        let running = Arc::clone(&self.running);

        let display = thread::Builder::new()
            .name("display".to_string())
            .spawn(move || {
                debug!("Display thread started");
                loop {
                    match running.read() {
                        Ok(guard) if *guard => {}
                        Ok(_) => break,
                        Err(_) => {
                            error!("Display thread: failed to read running flag");
                            break;
                        }
                    }

                    match Snapshot::capture(&handles) {
                        Ok(snapshot) => consumer.consume(&snapshot),
                        Err(e) => warn!("Failed to capture snapshot: {}", e),
                    }

                    thread::sleep(interval);
                }
                debug!("Display thread exiting");
            })
            .map_err(|e| ImuError::Other(format!("Failed to spawn display thread: {}", e)))?;

        self.display = Some(display);
        Ok(())
    }

    pub fn handles(&self) -> &[SessionHandle] {
        &self.handles
    }

    pub fn handle(&self, id: DeviceId) -> Option<&SessionHandle> {
        self.handles.iter().find(|h| h.id() == id)
    }

    pub fn snapshot(&self) -> Result<Snapshot, ImuError> {
        Snapshot::capture(&self.handles)
    }

    /// True once no session is still consuming its stream, or its worker
    /// thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handles.iter().all(|h| {
            let exited = self
                .workers
                .iter()
                .any(|(id, worker)| *id == h.id() && worker.is_finished());
            exited || h.status().map(|s| !s.is_active()).unwrap_or(true)
        })
    }

    /// Blocks until every device stream has ended, then stops the display.
    pub fn wait(&mut self) -> Result<(), ImuError> {
        self.join_workers();
        self.stop()
    }

    /// Stops every session and the display thread and waits for them.
    pub fn stop(&mut self) -> Result<(), ImuError> {
        if let Ok(mut running) = self.running.write() {
            *running = false;
        }
        for handle in &self.handles {
            handle.stop()?;
        }
        self.join_workers();
        if let Some(display) = self.display.take() {
            if display.join().is_err() {
                error!("Display thread panicked");
            }
        }
        Ok(())
    }

    fn join_workers(&mut self) {
        for (id, worker) in self.workers.drain(..) {
            match worker.join() {
                Ok(Ok(())) => debug!("{}: worker joined", id),
                Ok(Err(e)) => warn!("{}: worker ended with error: {}", id, e),
                Err(_) => error!("{}: worker panicked", id),
            }
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
