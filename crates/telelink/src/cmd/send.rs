use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::time::{Duration, Instant};

use telelink_frame::Message;
use telelink_link::{Link, LinkEvent, LinkState};
use tracing::debug;

use crate::cmd::{closed_link_error, open_link, parse_duration, SendArgs};
use crate::exit::{
    event_error, link_error, CliError, CliResult, INTERNAL, SUCCESS, TIMEOUT, USAGE,
};
use crate::output::{print_event, OutputFormat};

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(2);

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link.to_config()?;
    let wait = args.wait.as_deref().map(parse_duration).transpose()?;
    let message = Message::new(parse_id(&args.id)?, resolve_payload(&args)?);

    let drain_timeout = config.shutdown_timeout;
    let mut link = open_link(&args.target, config)?;
    link.send(&message)
        .map_err(|err| link_error("send failed", err))?;
    wait_until_drained(&link, drain_timeout)?;
    debug!(id = message.id, size = message.payload.len(), "command written");

    if let Some(wait) = wait {
        let reply = wait_for_reply(&link, wait)?;
        print_event(0, &reply, format);
    }

    link.disconnect()
        .map_err(|err| link_error("disconnect failed", err))?;
    Ok(SUCCESS)
}

fn parse_id(input: &str) -> CliResult<u8> {
    match input.as_bytes() {
        &[id] if id.is_ascii_graphic() => Ok(id),
        _ => Err(CliError::new(
            USAGE,
            format!("--id must be a single printable ASCII character, got {input:?}"),
        )),
    }
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(hex) = &args.hex {
        return parse_hex(hex);
    }
    if let Some(value) = args.u16 {
        return Ok(value.to_le_bytes().to_vec());
    }
    if let Some(value) = args.i32 {
        return Ok(value.to_le_bytes().to_vec());
    }
    Ok(Vec::new())
}

fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if !digits.is_ascii() || digits.len() % 2 != 0 {
        return Err(CliError::new(USAGE, "--hex needs an even number of hex digits"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| CliError::new(USAGE, format!("--hex is not valid hex: {input}")))
        })
        .collect()
}

fn wait_until_drained(link: &Link, timeout: Duration) -> CliResult<()> {
    let deadline = Instant::now() + timeout;
    while link.pending_bytes() > 0 {
        if link.state() == LinkState::Disconnected {
            return Err(closed_link_error(link, "send failed"));
        }
        if Instant::now() >= deadline {
            return Err(CliError::new(TIMEOUT, "send failed: command not written in time"));
        }
        thread::sleep(DRAIN_POLL_INTERVAL);
    }
    Ok(())
}

/// First decoded reply or sample buffer within `wait`.
fn wait_for_reply(link: &Link, wait: Duration) -> CliResult<LinkEvent> {
    match link.events().recv_timeout(wait) {
        Ok(event) if event.is_fatal() => Err(event_error("receive failed", &event)),
        Ok(event) => Ok(event),
        Err(RecvTimeoutError::Timeout) => Err(CliError::new(
            TIMEOUT,
            format!("receive failed: no reply within {wait:?}"),
        )),
        Err(RecvTimeoutError::Disconnected) => Err(CliError::new(
            INTERNAL,
            "receive failed: event channel closed",
        )),
    }
}
