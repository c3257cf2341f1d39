//! Builders for host-to-board commands.
//!
//! Every builder returns a [`Message`] ready for [`crate::Link::send`].

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use telelink_frame::{ids, Message};

use crate::telemetry::MotorFlags;

/// Board output scaling applied to motor speed on the wire.
pub const SPEED_SCALE: i32 = 64;

/// Positioned actuators on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Actuator {
    Foc,
    Rad,
    Fbk,
}

impl Actuator {
    pub const ALL: [Actuator; 3] = [Actuator::Foc, Actuator::Rad, Actuator::Fbk];

    /// Id of the position reply and of its read request.
    pub fn read_id(self) -> u8 {
        match self {
            Self::Foc => ids::FOC_POSITION,
            Self::Rad => ids::RAD_POSITION,
            Self::Fbk => ids::FBK_POSITION,
        }
    }

    /// Id of the set-position command.
    pub fn set_id(self) -> u8 {
        match self {
            Self::Foc => ids::SET_FOC_POSITION,
            Self::Rad => ids::SET_RAD_POSITION,
            Self::Fbk => ids::SET_FBK_POSITION,
        }
    }

    /// Actuator whose position reply uses `id`.
    pub fn from_read_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.read_id() == id)
    }
}

impl fmt::Display for Actuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Foc => "foc",
            Self::Rad => "rad",
            Self::Fbk => "fbk",
        })
    }
}

/// Acquisition started by `'T'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum AcquisitionMode {
    Stream = 0,
    Scan = 1,
}

/// Signal streamed by the board, selected with `'S'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum StreamChannel {
    Fe = 0,
    Ce = 1,
    Sum = 2,
    A = 3,
    B = 4,
    C = 5,
    D = 6,
}

impl StreamChannel {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Fe,
            1 => Self::Ce,
            2 => Self::Sum,
            3 => Self::A,
            4 => Self::B,
            5 => Self::C,
            6 => Self::D,
            _ => return None,
        })
    }
}

impl FromStr for StreamChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fe" => Ok(Self::Fe),
            "ce" => Ok(Self::Ce),
            "sum" => Ok(Self::Sum),
            "a" => Ok(Self::A),
            "b" => Ok(Self::B),
            "c" => Ok(Self::C),
            "d" => Ok(Self::D),
            other => Err(format!("unknown channel '{other}' (expected fe|ce|sum|a|b|c|d)")),
        }
    }
}

pub fn set_position(actuator: Actuator, position: u16) -> Message {
    Message::new(actuator.set_id(), position.to_le_bytes().to_vec())
}

/// Set motor speed; the board expects `speed * 64`, saturated to `i32`.
pub fn set_motor_speed(speed: i32) -> Message {
    let raw = speed.saturating_mul(SPEED_SCALE);
    Message::new(ids::SET_MOTOR_SPEED, raw.to_le_bytes().to_vec())
}

pub fn write_motor_settings(power: u8, flags: MotorFlags) -> Message {
    Message::new(ids::SET_MOTOR_SETTINGS, vec![power, flags.bits()])
}

pub fn start_acquisition(mode: AcquisitionMode) -> Message {
    Message::new(ids::START_ACQUISITION, vec![mode as u8])
}

pub fn select_channel(channel: StreamChannel) -> Message {
    Message::new(ids::SELECT_CHANNEL, vec![channel as u8])
}

pub fn reboot() -> Message {
    Message::empty(ids::REBOOT)
}

/// Ask for the next bulk sample block.
pub fn poll_samples() -> Message {
    Message::empty(ids::SAMPLE_POLL)
}

pub fn read_position(actuator: Actuator) -> Message {
    Message::empty(actuator.read_id())
}

pub fn read_motor_settings() -> Message {
    Message::empty(ids::MOTOR_SETTINGS)
}

pub fn read_motor_speed() -> Message {
    Message::empty(ids::MOTOR_SPEED)
}

/// Read requests for the full board state, in the order the board expects
/// them after connecting.
pub fn read_settings() -> [Message; 5] {
    [
        read_position(Actuator::Foc),
        read_position(Actuator::Rad),
        read_position(Actuator::Fbk),
        read_motor_settings(),
        read_motor_speed(),
    ]
}
