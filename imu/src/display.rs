use crate::config::DisplayMode;
use crate::monitor::Snapshot;
use crate::session::SessionStatus;
use std::io::{self, Write};

/// Receives an aggregate snapshot on every display tick.
pub trait OrientationConsumer: Send {
    fn consume(&mut self, snapshot: &Snapshot);
}

impl<F> OrientationConsumer for F
where
    F: FnMut(&Snapshot) + Send,
{
    fn consume(&mut self, snapshot: &Snapshot) {
        self(snapshot)
    }
}

/// Single-line terminal table, one column group per device, redrawn in
/// place with a carriage return.
pub struct TableDisplay<W: Write + Send> {
    mode: DisplayMode,
    out: W,
    header_written: bool,
}

impl TableDisplay<io::Stdout> {
    pub fn stdout(mode: DisplayMode) -> Self {
        TableDisplay::new(mode, io::stdout())
    }
}

impl<W: Write + Send> TableDisplay<W> {
    pub fn new(mode: DisplayMode, out: W) -> Self {
        TableDisplay {
            mode,
            out,
            header_written: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn header(&self, snapshot: &Snapshot) -> String {
        let (labels, units) = match self.mode {
            DisplayMode::Orientation => ("  Roll   Pitch  Yaw   ", "deg"),
            DisplayMode::Acceleration => (" accelX accelY accelZ ", "g"),
            DisplayMode::Vector => ("  dirX   dirY   dirZ  ", "unit"),
        };
        let names: Vec<String> = snapshot
            .readings
            .iter()
            .map(|r| format!(" {:<21}", r.id.to_string()))
            .collect();
        let columns = vec![labels; snapshot.readings.len()];
        format!("{}Units: {}\n{}", names.join("|"), units, columns.join("|"))
    }

    fn row(&self, snapshot: &Snapshot) -> String {
        let cells: Vec<String> = snapshot
            .readings
            .iter()
            .map(|r| {
                if let SessionStatus::Failed(_) = r.status {
                    return format!(" {:<20}", "failed");
                }
                let (a, b, c) = match self.mode {
                    DisplayMode::Orientation => {
                        (r.orientation.roll, r.orientation.pitch, r.orientation.yaw)
                    }
                    DisplayMode::Acceleration => (r.accel.x, r.accel.y, r.accel.z),
                    DisplayMode::Vector => {
                        let v = r.orientation.pointing_vector();
                        (v.x, v.y, v.z)
                    }
                };
                format!(" {: >+6.1} {: >+6.1} {: >+6.1}", a, b, c)
            })
            .collect();
        format!("\r{}", cells.join(" |"))
    }
}

impl<W: Write + Send> OrientationConsumer for TableDisplay<W> {
    fn consume(&mut self, snapshot: &Snapshot) {
        if !self.header_written {
            let header = self.header(snapshot);
            let _ = writeln!(self.out, "{}", header);
            self.header_written = true;
        }
        let row = self.row(snapshot);
        let _ = write!(self.out, "{}", row);
        let _ = self.out.flush();
    }
}
