//! Message ids used by the controller board.
//!
//! Lower-case ids flow from the board (replies and telemetry), upper-case ids
//! are host commands. The same lower-case ids with an empty payload are read
//! requests.

/// Periodic marker emitted by the board at the start of each period.
pub const PERIOD_MARKER: u8 = b'.';
/// FOC actuator position (u16 LE).
pub const FOC_POSITION: u8 = b'a';
/// RAD actuator position (u16 LE).
pub const RAD_POSITION: u8 = b'b';
/// FBK actuator position (u16 LE).
pub const FBK_POSITION: u8 = b'c';
/// Motor PWM settings (power u8, flags u8).
pub const MOTOR_SETTINGS: u8 = b'o';
/// Motor speed (u32 LE, raw units).
pub const MOTOR_SPEED: u8 = b'p';
/// Bulk sample block (i16 LE samples).
pub const SAMPLES_RAW: u8 = b'r';
/// Bulk sample block answering a sample poll (i16 LE samples).
pub const SAMPLES_POLLED: u8 = b's';

/// Set FOC actuator position.
pub const SET_FOC_POSITION: u8 = b'A';
/// Set RAD actuator position.
pub const SET_RAD_POSITION: u8 = b'B';
/// Set FBK actuator position.
pub const SET_FBK_POSITION: u8 = b'C';
/// Write motor PWM settings.
pub const SET_MOTOR_SETTINGS: u8 = b'O';
/// Set motor speed.
pub const SET_MOTOR_SPEED: u8 = b'P';
/// Select the streamed signal channel.
pub const SELECT_CHANNEL: u8 = b'S';
/// Start acquisition (stream or scan).
pub const START_ACQUISITION: u8 = b'T';
/// Reboot the board.
pub const REBOOT: u8 = b'X';
/// Ask the board for the next sample block.
pub const SAMPLE_POLL: u8 = SAMPLES_POLLED;

/// How an inbound message is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Control or telemetry reply, forwarded verbatim.
    Data,
    /// Raw samples for the stream reducer.
    BulkSample,
    /// Not part of the inbound protocol.
    Unknown,
}

/// Classify an inbound message id.
pub fn classify(id: u8) -> MessageKind {
    match id {
        PERIOD_MARKER | FOC_POSITION | RAD_POSITION | FBK_POSITION | MOTOR_SETTINGS
        | MOTOR_SPEED => MessageKind::Data,
        SAMPLES_RAW | SAMPLES_POLLED => MessageKind::BulkSample,
        _ => MessageKind::Unknown,
    }
}

/// Returns a human-readable name for a message id.
pub fn id_name(id: u8) -> &'static str {
    match id {
        PERIOD_MARKER => "PERIOD_MARKER",
        FOC_POSITION => "FOC_POSITION",
        RAD_POSITION => "RAD_POSITION",
        FBK_POSITION => "FBK_POSITION",
        MOTOR_SETTINGS => "MOTOR_SETTINGS",
        MOTOR_SPEED => "MOTOR_SPEED",
        SAMPLES_RAW => "SAMPLES_RAW",
        SAMPLES_POLLED => "SAMPLES_POLLED",
        SET_FOC_POSITION => "SET_FOC_POSITION",
        SET_RAD_POSITION => "SET_RAD_POSITION",
        SET_FBK_POSITION => "SET_FBK_POSITION",
        SET_MOTOR_SETTINGS => "SET_MOTOR_SETTINGS",
        SET_MOTOR_SPEED => "SET_MOTOR_SPEED",
        SELECT_CHANNEL => "SELECT_CHANNEL",
        START_ACQUISITION => "START_ACQUISITION",
        REBOOT => "REBOOT",
        _ => "UNKNOWN",
    }
}
