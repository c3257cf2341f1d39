use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Args, Subcommand};
use telelink_frame::{FrameConfig, ReducerConfig, StreamReducer};
use telelink_link::{Link, LinkConfig, LinkEvent, LinkState, StreamChannel};
use telelink_transport::Endpoint;

use crate::exit::{
    event_error, frame_error, link_error, transport_error, CliError, CliResult, TIMEOUT,
    TRANSPORT_ERROR, USAGE,
};
use crate::output::OutputFormat;

pub mod monitor;
pub mod send;
#[cfg(unix)]
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to a board and print telemetry events.
    Monitor(MonitorArgs),
    /// Send a single command.
    Send(SendArgs),
    /// Emulate a board on a Unix socket.
    #[cfg(unix)]
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Monitor(args) => monitor::run(args, format),
        Command::Send(args) => send::run(args, format),
        #[cfg(unix)]
        Command::Simulate(args) => simulate::run(args),
        Command::Version(args) => version::run(args),
    }
}

/// Link tuning shared by commands that open a board link.
#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Bound on opening the link (e.g. 500ms, 2s).
    #[arg(long, default_value = "500ms")]
    pub open_timeout: String,
    /// Bound on a single write; expiry closes the link.
    #[arg(long, default_value = "20ms")]
    pub write_timeout: String,
    /// Bound on waiting for inbound data per loop iteration.
    #[arg(long, default_value = "20ms")]
    pub read_timeout: String,
    /// Decode attempts a frame may wait for its payload.
    #[arg(long, default_value_t = telelink_frame::DEFAULT_STALL_RETRIES)]
    pub stall_retries: u8,
    /// Raw samples averaged into one output value.
    #[arg(long, default_value_t = ReducerConfig::default().ratio)]
    pub ratio: usize,
    /// Output values per sample buffer.
    #[arg(long, default_value_t = ReducerConfig::default().depth)]
    pub depth: usize,
}

impl LinkArgs {
    pub fn to_config(&self) -> CliResult<LinkConfig> {
        let reducer = ReducerConfig {
            ratio: self.ratio,
            depth: self.depth,
        };
        StreamReducer::new(reducer).map_err(|err| frame_error("invalid reducer settings", err))?;

        let config = LinkConfig {
            open_timeout: parse_duration(&self.open_timeout)?,
            write_timeout: parse_duration(&self.write_timeout)?,
            read_timeout: parse_duration(&self.read_timeout)?,
            frame: FrameConfig {
                stall_retries: self.stall_retries,
                ..FrameConfig::default()
            },
            reducer,
            ..LinkConfig::default()
        };
        config
            .validate()
            .map_err(|err| link_error("invalid link settings", err))?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Board target: unix:<path>, tcp:<host:port>, or a socket path.
    pub target: String,
    /// Start streaming acquisition.
    #[arg(long, conflicts_with = "scan")]
    pub stream: bool,
    /// Start scanning acquisition.
    #[arg(long, conflicts_with = "stream")]
    pub scan: bool,
    /// Streamed channel (fe, ce, sum, a, b, c, d).
    #[arg(long)]
    pub channel: Option<StreamChannel>,
    /// Sample poll interval (e.g. 20ms). Defaults to 20ms while acquiring.
    #[arg(long)]
    pub poll: Option<String>,
    /// Exit after printing N events.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Board target: unix:<path>, tcp:<host:port>, or a socket path.
    pub target: String,
    /// Message id as a single ASCII character (e.g. A, P, X).
    #[arg(long)]
    pub id: String,
    /// Raw payload as hex bytes (e.g. "0102" or "01 02").
    #[arg(long, conflicts_with_all = ["u16", "i32"])]
    pub hex: Option<String>,
    /// Payload as a little-endian u16.
    #[arg(long, conflicts_with_all = ["hex", "i32"])]
    pub u16: Option<u16>,
    /// Payload as a little-endian i32.
    #[arg(long, conflicts_with_all = ["hex", "u16"], allow_negative_numbers = true)]
    pub i32: Option<i32>,
    /// Wait this long for one reply and print it (e.g. 1s, 500ms).
    #[arg(long)]
    pub wait: Option<String>,
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Exit after the first client disconnects.
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

const STATE_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Connect and wait until the worker is ready or reports why it is not.
pub fn open_link(target: &str, config: LinkConfig) -> CliResult<Link> {
    Endpoint::parse(target).map_err(|err| transport_error("invalid target", err))?;

    let deadline = Instant::now() + config.open_timeout + config.read_grace + Duration::from_secs(1);
    let mut link = Link::new(config);
    link.connect(target)
        .map_err(|err| link_error("connect failed", err))?;

    loop {
        match link.state() {
            LinkState::Ready => return Ok(link),
            LinkState::Disconnected | LinkState::Draining => {
                return Err(closed_link_error(&link, "connect failed"));
            }
            LinkState::Connecting => {}
        }
        if Instant::now() >= deadline {
            return Err(CliError::new(
                TIMEOUT,
                format!("connect failed: {target} not ready in time"),
            ));
        }
        thread::sleep(STATE_POLL_INTERVAL);
    }
}

/// Error for a link whose worker already stopped, taken from its fatal event.
pub fn closed_link_error(link: &Link, context: &str) -> CliError {
    let fatal = link.events().try_iter().find(LinkEvent::is_fatal).or_else(|| {
        link.events()
            .recv_timeout(Duration::from_millis(100))
            .ok()
            .filter(LinkEvent::is_fatal)
    });
    match fatal {
        Some(event) => event_error(context, &event),
        None => CliError::new(TRANSPORT_ERROR, format!("{context}: link closed")),
    }
}

pub fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
