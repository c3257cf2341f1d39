//! Consumer-side control state with echo suppression.
//!
//! When the board reports a value, a front end typically moves its own control
//! to match, and that control change would normally send the same value back.
//! [`ControlState`] arms an [`EchoGuard`] flag for each device-driven change so
//! the next matching local update is swallowed instead of echoed.

use serde::Serialize;
use telelink_frame::Message;
use tracing::trace;

use crate::command::{self, Actuator};
use crate::telemetry::{MotorFlags, Telemetry};

/// A board value a front end can both display and set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Position(Actuator),
    MotorSpeed,
}

impl Field {
    fn index(self) -> usize {
        match self {
            Self::Position(Actuator::Foc) => 0,
            Self::Position(Actuator::Rad) => 1,
            Self::Position(Actuator::Fbk) => 2,
            Self::MotorSpeed => 3,
        }
    }
}

/// One "ignore next echo" flag per [`Field`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EchoGuard {
    armed: [bool; 4],
}

impl EchoGuard {
    pub fn arm(&mut self, field: Field) {
        self.armed[field.index()] = true;
    }

    pub fn is_armed(&self, field: Field) -> bool {
        self.armed[field.index()]
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&mut self, field: Field) -> bool {
        std::mem::replace(&mut self.armed[field.index()], false)
    }
}

/// Last known board values.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ControlState {
    positions: [Option<u16>; 3],
    motor_speed: Option<i32>,
    motor_power: Option<u8>,
    motor_flags: Option<MotorFlags>,
    periods: u64,
    #[serde(skip)]
    guard: EchoGuard,
}

impl ControlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a device-reported value, arming the echo guard when it changed.
    pub fn apply(&mut self, telemetry: &Telemetry) {
        match *telemetry {
            Telemetry::PeriodMarker => self.periods += 1,
            Telemetry::ActuatorPosition { axis, position } => {
                let slot = &mut self.positions[Field::Position(axis).index()];
                if *slot != Some(position) {
                    *slot = Some(position);
                    self.guard.arm(Field::Position(axis));
                }
            }
            Telemetry::MotorSpeed { speed } => {
                let speed = i32::try_from(speed).unwrap_or(i32::MAX);
                if self.motor_speed != Some(speed) {
                    self.motor_speed = Some(speed);
                    self.guard.arm(Field::MotorSpeed);
                }
            }
            Telemetry::MotorSettings { power, flags } => {
                self.motor_power = Some(power);
                self.motor_flags = Some(flags);
            }
        }
    }

    /// Local position change; `None` when it only echoes the board's value.
    pub fn set_position(&mut self, axis: Actuator, position: u16) -> Option<Message> {
        let field = Field::Position(axis);
        let previous = self.positions[field.index()].replace(position);
        if self.guard.take(field) && previous == Some(position) {
            trace!(%axis, position, "position echo suppressed");
            return None;
        }
        Some(command::set_position(axis, position))
    }

    /// Local speed change; `None` when it only echoes the board's value.
    pub fn set_motor_speed(&mut self, speed: i32) -> Option<Message> {
        let previous = self.motor_speed.replace(speed);
        if self.guard.take(Field::MotorSpeed) && previous == Some(speed) {
            trace!(speed, "motor speed echo suppressed");
            return None;
        }
        Some(command::set_motor_speed(speed))
    }

    /// Settings are never echoed by the board, so this always yields a command.
    pub fn set_motor_settings(&mut self, power: u8, flags: MotorFlags) -> Message {
        self.motor_power = Some(power);
        self.motor_flags = Some(flags);
        command::write_motor_settings(power, flags)
    }

    pub fn position(&self, axis: Actuator) -> Option<u16> {
        self.positions[Field::Position(axis).index()]
    }

    pub fn motor_speed(&self) -> Option<i32> {
        self.motor_speed
    }

    pub fn motor_settings(&self) -> Option<(u8, MotorFlags)> {
        Some((self.motor_power?, self.motor_flags?))
    }

    /// Period markers seen so far.
    pub fn periods(&self) -> u64 {
        self.periods
    }

    pub fn guard(&self) -> &EchoGuard {
        &self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(axis: Actuator, position: u16) -> Telemetry {
        Telemetry::ActuatorPosition { axis, position }
    }

    #[test]
    fn device_update_suppresses_one_echo() {
        let mut state = ControlState::new();
        state.apply(&position(Actuator::Foc, 300));
        assert!(state.guard().is_armed(Field::Position(Actuator::Foc)));

        assert_eq!(state.set_position(Actuator::Foc, 300), None);
        assert!(!state.guard().is_armed(Field::Position(Actuator::Foc)));

        let msg = state.set_position(Actuator::Foc, 300).expect("second update is sent");
        assert_eq!(msg.id, b'A');
    }

    #[test]
    fn different_local_value_is_sent_and_clears_guard() {
        let mut state = ControlState::new();
        state.apply(&position(Actuator::Rad, 10));
        let msg = state.set_position(Actuator::Rad, 11).expect("user change is sent");
        assert_eq!(&msg.payload[..], &11u16.to_le_bytes());
        assert!(!state.guard().is_armed(Field::Position(Actuator::Rad)));
    }

    #[test]
    fn unchanged_report_does_not_arm() {
        let mut state = ControlState::new();
        state.apply(&position(Actuator::Fbk, 5));
        assert!(state.set_position(Actuator::Fbk, 5).is_none());

        state.apply(&position(Actuator::Fbk, 5));
        assert!(!state.guard().is_armed(Field::Position(Actuator::Fbk)));
        assert!(state.set_position(Actuator::Fbk, 5).is_some());
    }

    #[test]
    fn guards_are_per_field() {
        let mut state = ControlState::new();
        state.apply(&Telemetry::MotorSpeed { speed: 12 });
        assert!(state.set_position(Actuator::Foc, 12).is_some());
        assert!(state.set_motor_speed(12).is_none());
        assert_eq!(state.motor_speed(), Some(12));
    }

    #[test]
    fn settings_and_periods_tracked() {
        let mut state = ControlState::new();
        state.apply(&Telemetry::PeriodMarker);
        state.apply(&Telemetry::PeriodMarker);
        state.apply(&Telemetry::MotorSettings {
            power: 9,
            flags: MotorFlags::USE_THI,
        });
        assert_eq!(state.periods(), 2);
        assert_eq!(state.motor_settings(), Some((9, MotorFlags::USE_THI)));

        let msg = state.set_motor_settings(20, MotorFlags::REVERSE);
        assert_eq!(&msg.payload[..], &[20, 0x01]);
        assert_eq!(state.motor_settings(), Some((20, MotorFlags::REVERSE)));
    }
}
