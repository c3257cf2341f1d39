use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::BytesMut;
use telelink_frame::{ids, Extract, FrameDecoder, Message};
use telelink_link::command::{Actuator, SPEED_SCALE};
use telelink_link::{AcquisitionMode, MotorFlags, StreamChannel, Telemetry};
use telelink_transport::{TransportError, UnixDomainSocket};
use tracing::{debug, info, warn};

use crate::cmd::{install_ctrlc_handler, SimulateArgs};
use crate::exit::{io_error, transport_error, CliResult, SUCCESS};

/// Samples in one polled bulk message.
pub const SAMPLES_PER_POLL: usize = 64;
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);
const READ_TIMEOUT: Duration = Duration::from_millis(50);

pub fn run(args: SimulateArgs) -> CliResult<i32> {
    let socket =
        UnixDomainSocket::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;
    socket
        .set_nonblocking(true)
        .map_err(|err| transport_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut board = SimulatedBoard::default();
    while running.load(Ordering::SeqCst) {
        let stream = match socket.accept() {
            Ok(stream) => stream,
            Err(TransportError::Accept(err)) if err.kind() == ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
                continue;
            }
            Err(err) => return Err(transport_error("accept failed", err)),
        };

        info!("host connected");
        serve(stream, &mut board, &running).map_err(|err| io_error("connection failed", err))?;
        info!("host disconnected");

        if args.once {
            break;
        }
    }

    Ok(SUCCESS)
}

fn serve(
    mut stream: UnixStream,
    board: &mut SimulatedBoard,
    running: &AtomicBool,
) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;

    let mut decoder = FrameDecoder::new();
    let mut rx_buf = BytesMut::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    while running.load(Ordering::SeqCst) {
        match stream.read(&mut chunk) {
            Ok(0) => return Ok(()),
            Ok(n) => rx_buf.extend_from_slice(&chunk[..n]),
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::ConnectionReset => return Ok(()),
            Err(err) => return Err(err),
        }

        let mut out = BytesMut::new();
        loop {
            match decoder.try_extract(&mut rx_buf) {
                Extract::Complete(message) => {
                    for reply in board.handle(&message) {
                        // Replies never exceed the frame limit.
                        if let Ok(frame) = reply.encode() {
                            out.extend_from_slice(&frame);
                        }
                    }
                }
                Extract::Incomplete | Extract::Corrupt(_) => break,
            }
        }
        if !out.is_empty() {
            match stream.write_all(&out) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::BrokenPipe => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }
    Ok(())
}

/// Board state as seen through the command protocol.
#[derive(Debug, Clone)]
pub struct SimulatedBoard {
    positions: [u16; 3],
    speed_raw: u32,
    power: u8,
    flags: MotorFlags,
    channel: StreamChannel,
    mode: Option<AcquisitionMode>,
    phase: u32,
}

impl Default for SimulatedBoard {
    fn default() -> Self {
        Self {
            positions: [512; 3],
            speed_raw: 0,
            power: 0,
            flags: MotorFlags::DISABLED,
            channel: StreamChannel::Fe,
            mode: None,
            phase: 0,
        }
    }
}

impl SimulatedBoard {
    /// Apply one host message and return the board's replies.
    pub fn handle(&mut self, message: &Message) -> Vec<Message> {
        let payload = &message.payload[..];
        match (message.id, payload.len()) {
            (ids::FOC_POSITION | ids::RAD_POSITION | ids::FBK_POSITION, 0) => {
                Actuator::from_read_id(message.id)
                    .map(|axis| vec![self.position_reply(axis)])
                    .unwrap_or_default()
            }
            (ids::MOTOR_SETTINGS, 0) => vec![Message::new(
                ids::MOTOR_SETTINGS,
                vec![self.power, self.flags.bits()],
            )],
            (ids::MOTOR_SPEED, 0) => vec![Message::new(
                ids::MOTOR_SPEED,
                self.speed_raw.to_le_bytes().to_vec(),
            )],
            (ids::SET_FOC_POSITION | ids::SET_RAD_POSITION | ids::SET_FBK_POSITION, 2) => {
                let axis = match message.id {
                    ids::SET_FOC_POSITION => Actuator::Foc,
                    ids::SET_RAD_POSITION => Actuator::Rad,
                    _ => Actuator::Fbk,
                };
                self.positions[axis_index(axis)] = u16::from_le_bytes([payload[0], payload[1]]);
                debug!(%axis, position = self.positions[axis_index(axis)], "position set");
                Vec::new()
            }
            (ids::SET_MOTOR_SPEED, 4) => {
                let raw = i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
                self.speed_raw = u32::try_from(raw).unwrap_or(0);
                debug!(speed = raw / SPEED_SCALE, "motor speed set");
                Vec::new()
            }
            (ids::SET_MOTOR_SETTINGS, 2) => {
                self.power = payload[0];
                self.flags = MotorFlags::from_bits(payload[1]);
                debug!(power = self.power, flags = payload[1], "motor settings written");
                Vec::new()
            }
            (ids::SELECT_CHANNEL, 1) => {
                match StreamChannel::from_code(payload[0]) {
                    Some(channel) => self.channel = channel,
                    None => warn!(code = payload[0], "unknown stream channel ignored"),
                }
                Vec::new()
            }
            (ids::START_ACQUISITION, 1) => {
                self.mode = Some(if payload[0] == 0 {
                    AcquisitionMode::Stream
                } else {
                    AcquisitionMode::Scan
                });
                self.phase = 0;
                vec![Message::empty(ids::PERIOD_MARKER)]
            }
            (ids::SAMPLE_POLL, 0) => vec![self.sample_block()],
            (ids::REBOOT, 0) => {
                info!("simulated reboot");
                *self = Self::default();
                Vec::new()
            }
            (id, size) => {
                warn!(id, size, "unsupported command ignored");
                Vec::new()
            }
        }
    }

    fn position_reply(&self, axis: Actuator) -> Message {
        let position = self.positions[axis_index(axis)];
        Message::new(axis.read_id(), position.to_le_bytes().to_vec())
    }

    /// Triangle wave whose offset follows the selected channel.
    fn sample_block(&mut self) -> Message {
        let offset = i32::from(self.channel as u8) * 100;
        let mut payload = Vec::with_capacity(SAMPLES_PER_POLL * 2);
        for _ in 0..SAMPLES_PER_POLL {
            let step = (self.phase % 64) as i32;
            let level = if step < 32 { step } else { 64 - step };
            let value = offset + level * 32;
            payload.extend_from_slice(&(value as i16).to_le_bytes());
            self.phase = self.phase.wrapping_add(1);
        }
        Message::new(ids::SAMPLES_POLLED, payload)
    }

    /// Current state in telemetry form, for logs and tests.
    pub fn snapshot(&self) -> Vec<Telemetry> {
        let mut out: Vec<Telemetry> = Actuator::ALL
            .into_iter()
            .map(|axis| Telemetry::ActuatorPosition {
                axis,
                position: self.positions[axis_index(axis)],
            })
            .collect();
        out.push(Telemetry::MotorSettings {
            power: self.power,
            flags: self.flags,
        });
        out.push(Telemetry::MotorSpeed {
            speed: self.speed_raw / SPEED_SCALE as u32,
        });
        out
    }
}

fn axis_index(axis: Actuator) -> usize {
    match axis {
        Actuator::Foc => 0,
        Actuator::Rad => 1,
        Actuator::Fbk => 2,
    }
}
