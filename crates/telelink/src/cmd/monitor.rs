use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};

use telelink_link::{command, AcquisitionMode, ControlState, LinkEvent, Telemetry};
use tracing::{debug, info};

use crate::cmd::{closed_link_error, install_ctrlc_handler, open_link, parse_duration, MonitorArgs};
use crate::exit::{event_error, link_error, CliResult, SUCCESS};
use crate::output::{print_event, OutputFormat};

/// Board sample poll period while acquiring.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);
const EVENT_TICK: Duration = Duration::from_millis(20);

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link.to_config()?;
    let mode = acquisition_mode(&args);
    let poll = match (&args.poll, mode) {
        (Some(interval), _) => Some(parse_duration(interval)?),
        (None, Some(_)) => Some(DEFAULT_POLL_INTERVAL),
        (None, None) => None,
    };

    let mut link = open_link(&args.target, config)?;
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let send_failed = |err| link_error("send failed", err);
    for request in command::read_settings() {
        link.send(&request).map_err(send_failed)?;
    }
    if let Some(channel) = args.channel {
        link.send(&command::select_channel(channel))
            .map_err(send_failed)?;
    }
    if let Some(mode) = mode {
        info!(?mode, "starting acquisition");
        link.send(&command::start_acquisition(mode))
            .map_err(send_failed)?;
    }

    let mut state = ControlState::new();
    let mut printed = 0usize;
    let mut next_poll = Instant::now();

    while running.load(Ordering::SeqCst) {
        if let Some(interval) = poll {
            if Instant::now() >= next_poll {
                if link.send(&command::poll_samples()).is_err() {
                    return Err(closed_link_error(&link, "link failed"));
                }
                next_poll += interval;
            }
        }

        let event = match link.events().recv_timeout(EVENT_TICK) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if let LinkEvent::DecodedMessage(message) = &event {
            if let Some(telemetry) = Telemetry::decode(message) {
                state.apply(&telemetry);
            }
        }

        print_event(printed, &event, format);
        printed = printed.saturating_add(1);

        if event.is_fatal() {
            return Err(event_error("link failed", &event));
        }
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    debug!(periods = state.periods(), printed, "monitor finished");
    link.disconnect()
        .map_err(|err| link_error("disconnect failed", err))?;
    Ok(SUCCESS)
}

fn acquisition_mode(args: &MonitorArgs) -> Option<AcquisitionMode> {
    if args.stream {
        Some(AcquisitionMode::Stream)
    } else if args.scan {
        Some(AcquisitionMode::Scan)
    } else {
        None
    }
}
