//! Typed view of board replies.

use std::ops::BitOr;

use serde::Serialize;
use telelink_frame::{ids, Message};

use crate::command::{Actuator, SPEED_SCALE};

/// Motor PWM flag bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MotorFlags(u8);

impl MotorFlags {
    pub const REVERSE: Self = Self(0x01);
    pub const USE_THI: Self = Self(0x02);
    pub const DISABLED: Self = Self(0x04);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Copy with `flag` set or cleared.
    pub const fn with(self, flag: Self, on: bool) -> Self {
        if on {
            Self(self.0 | flag.0)
        } else {
            Self(self.0 & !flag.0)
        }
    }
}

impl BitOr for MotorFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A decoded data message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Telemetry {
    /// Start of a board period.
    PeriodMarker,
    ActuatorPosition { axis: Actuator, position: u16 },
    MotorSettings { power: u8, flags: MotorFlags },
    /// Motor speed in user units (raw / 64).
    MotorSpeed { speed: u32 },
}

impl Telemetry {
    /// Decode a data message. Unknown ids and unexpected payload sizes yield `None`.
    pub fn decode(message: &Message) -> Option<Self> {
        let payload = &message.payload[..];
        match message.id {
            ids::PERIOD_MARKER => payload.is_empty().then_some(Self::PeriodMarker),
            ids::MOTOR_SETTINGS => match payload {
                &[power, flags] => Some(Self::MotorSettings {
                    power,
                    flags: MotorFlags::from_bits(flags),
                }),
                _ => None,
            },
            ids::MOTOR_SPEED => {
                let raw = u32::from_le_bytes(payload.try_into().ok()?);
                Some(Self::MotorSpeed {
                    speed: raw / SPEED_SCALE as u32,
                })
            }
            id => {
                let axis = Actuator::from_read_id(id)?;
                let position = u16::from_le_bytes(payload.try_into().ok()?);
                Some(Self::ActuatorPosition { axis, position })
            }
        }
    }
}
