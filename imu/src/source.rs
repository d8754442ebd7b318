use imu_traits::{EventKind, EventSource, ImuError, Next, RawEvent};
use log::{debug, warn};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// Producer side of a [`ChannelSource`]. Dropping every sender closes the
/// stream.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<RawEvent>,
}

impl EventSender {
    pub fn send(&self, event: RawEvent) -> Result<(), ImuError> {
        self.tx
            .send(event)
            .map_err(|e| ImuError::Other(format!("Event stream closed: {}", e)))
    }
}

/// Live event source fed from another thread.
pub struct ChannelSource {
    rx: mpsc::Receiver<RawEvent>,
}

impl ChannelSource {
    pub fn channel() -> (EventSender, ChannelSource) {
        let (tx, rx) = mpsc::channel();
        (EventSender { tx }, ChannelSource { rx })
    }
}

impl EventSource for ChannelSource {
    fn next_event(&mut self, timeout: Duration) -> Result<Next, ImuError> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Ok(Next::Event(event)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(Next::Timeout),
            Err(mpsc::RecvTimeoutError::Disconnected) => Ok(Next::Closed),
        }
    }
}

/// One line of a recorded stream: `time_s,type,code,value`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordedEvent {
    pub time: f64,
    pub event: RawEvent,
}

impl RecordedEvent {
    pub fn parse(line: &str) -> Result<RecordedEvent, ImuError> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 4 {
            return Err(ImuError::ParseError(format!(
                "expected 4 fields, got {}: {:?}",
                fields.len(),
                line
            )));
        }
        let time = fields[0]
            .parse::<f64>()
            .map_err(|e| ImuError::ParseError(format!("bad time {:?}: {}", fields[0], e)))?;
        // Must be usable as an offset from the start of the replay.
        if let Err(e) = Duration::try_from_secs_f64(time) {
            return Err(ImuError::ParseError(format!("bad time {:?}: {}", fields[0], e)));
        }
        let event_type = parse_int::<u16>(fields[1])?;
        let code = parse_int::<u16>(fields[2])?;
        let value = parse_int::<i32>(fields[3])?;
        Ok(RecordedEvent {
            time,
            event: RawEvent {
                kind: EventKind::from_type(event_type),
                code,
                value,
            },
        })
    }

    pub fn to_line(&self) -> String {
        format!(
            "{:.6},{},{},{}",
            self.time,
            self.event.kind.type_code(),
            self.event.code,
            self.event.value
        )
    }
}

fn parse_int<T: std::str::FromStr>(field: &str) -> Result<T, ImuError>
where
    T::Err: std::fmt::Display,
{
    field
        .parse::<T>()
        .map_err(|e| ImuError::ParseError(format!("bad integer {:?}: {}", field, e)))
}

/// Replays a recorded event stream from a file.
///
/// Blank lines and lines starting with `#` are skipped. Events come out as
/// [`Next::Recorded`] so filters integrate over the recorded timeline. With
/// pacing enabled each event is also held back until its recorded time has
/// elapsed since the replay started.
pub struct ReplaySource {
    lines: Lines<BufReader<File>>,
    pace: bool,
    started: Instant,
    line_number: usize,
    pending: Option<RecordedEvent>,
}

impl ReplaySource {
    pub fn open(path: &Path, pace: bool) -> Result<Self, ImuError> {
        let file = File::open(path).map_err(|e| {
            ImuError::DeviceUnavailable(format!("{}: {}", path.display(), e))
        })?;
        debug!("Opened recording {}", path.display());
        Ok(ReplaySource {
            lines: BufReader::new(file).lines(),
            pace,
            started: Instant::now(),
            line_number: 0,
            pending: None,
        })
    }

    fn read_record(&mut self) -> Result<Option<RecordedEvent>, ImuError> {
        for line in self.lines.by_ref() {
            self.line_number += 1;
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            return RecordedEvent::parse(trimmed)
                .map(Some)
                .map_err(|e| ImuError::ParseError(format!("line {}: {}", self.line_number, e)));
        }
        Ok(None)
    }
}

impl EventSource for ReplaySource {
    fn next_event(&mut self, timeout: Duration) -> Result<Next, ImuError> {
        let record = match self.pending.take() {
            Some(record) => record,
            None => match self.read_record()? {
                Some(record) => record,
                None => return Ok(Next::Closed),
            },
        };

        if self.pace {
            let due = Duration::try_from_secs_f64(record.time)
                .ok()
                .and_then(|offset| self.started.checked_add(offset))
                .ok_or_else(|| {
                    ImuError::ParseError(format!(
                        "line {}: time {} is out of range",
                        self.line_number, record.time
                    ))
                })?;
            let now = Instant::now();
            if due > now {
                let wait = due - now;
                if wait > timeout {
                    thread::sleep(timeout);
                    self.pending = Some(record);
                    return Ok(Next::Timeout);
                }
                thread::sleep(wait);
            } else if now - due > Duration::from_millis(100) {
                warn!("Replay running {:?} behind recording", now - due);
            }
        }

        Ok(Next::Recorded {
            event: record.event,
            time: record.time,
        })
    }
}
