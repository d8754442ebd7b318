use clap::Parser;
use joycon_imu::{
    BlendMode, DeviceConfig, DeviceId, DisplayMode, FilterKind, Monitor, MonitorConfig,
    SessionStatus, TableDisplay,
};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

//* run by `cargo run --bin read_joycons -- --left left.csv --right right.csv` */

#[derive(Debug, Parser)]
#[command(about = "Estimate Joy-Con orientation from recorded IMU event streams")]
struct Args {
    /// TOML file listing devices and filter settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Recording for the left Joy-Con
    #[arg(long)]
    left: Option<PathBuf>,

    /// Recording for the right Joy-Con
    #[arg(long)]
    right: Option<PathBuf>,

    /// complementary, kalman or gravity
    #[arg(long)]
    filter: Option<FilterKind>,

    /// instantaneous or integrated (complementary filter only)
    #[arg(long)]
    blend: Option<BlendMode>,

    /// orientation, acceleration or vector
    #[arg(long)]
    display: Option<DisplayMode>,

    #[arg(long)]
    interval_ms: Option<u64>,

    /// Replay recordings at their recorded rate
    #[arg(long)]
    pace: bool,

    /// Stop after this many seconds even if streams are still open
    #[arg(long)]
    duration_s: Option<f64>,
}

fn build_config(args: &Args) -> Result<MonitorConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::load(path)?,
        None => MonitorConfig::default(),
    };

    for (id, path) in [(DeviceId::Left, &args.left), (DeviceId::Right, &args.right)] {
        if let Some(path) = path {
            config.devices.retain(|d| d.id != id);
            config.devices.push(DeviceConfig {
                id,
                path: path.clone(),
                pace: args.pace,
            });
        }
    }
    if args.pace {
        for device in &mut config.devices {
            device.pace = true;
        }
    }
    if let Some(kind) = args.filter {
        config.filter.kind = kind;
    }
    if let Some(blend) = args.blend {
        config.filter.blend = blend;
    }
    if let Some(display) = args.display {
        config.display = display;
    }
    if let Some(interval) = args.interval_ms {
        config.display_interval_ms = interval.max(1);
    }
    config.devices.sort_by_key(|d| d.id);
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;
    if config.devices.is_empty() {
        return Err("no devices given; pass --config, --left or --right".into());
    }

    info!(
        devices = config.devices.len(),
        filter = %config.filter.kind,
        "Starting orientation monitor"
    );

    let display = TableDisplay::stdout(config.display);
    let mut monitor = Monitor::from_config(&config, display)?;

    let started = Instant::now();
    let deadline = args
        .duration_s
        .map(Duration::try_from_secs_f64)
        .transpose()
        .map_err(|e| format!("invalid --duration-s: {}", e))?;
    while !monitor.is_finished() {
        if deadline.is_some_and(|d| started.elapsed() >= d) {
            info!("Duration elapsed, stopping");
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }

    let snapshot = monitor.snapshot()?;
    monitor.stop()?;
    println!();

    for reading in &snapshot.readings {
        match &reading.status {
            SessionStatus::Failed(e) => error!(device = %reading.id, "session failed: {}", e),
            status => info!(
                device = %reading.id,
                updates = reading.updates,
                roll = reading.orientation.roll,
                pitch = reading.orientation.pitch,
                yaw = reading.orientation.yaw,
                "{:?}",
                status
            ),
        }
    }

    Ok(())
}
