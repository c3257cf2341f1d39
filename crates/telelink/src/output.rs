use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use telelink_frame::{id_name, Message};
use telelink_link::{LinkEvent, Telemetry};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum EventBody<'a> {
    Message {
        id: String,
        name: &'static str,
        payload: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        telemetry: Option<Telemetry>,
    },
    Samples {
        count: usize,
        values: &'a [i16],
    },
    ConnectionError {
        reason: &'a str,
    },
    WriteTimeout {
        reason: &'a str,
    },
}

#[derive(Serialize)]
struct EventOutput<'a> {
    seq: usize,
    timestamp: String,
    #[serde(flatten)]
    body: EventBody<'a>,
}

impl<'a> EventBody<'a> {
    fn from_event(event: &'a LinkEvent) -> Self {
        match event {
            LinkEvent::DecodedMessage(message) => Self::from_message(message),
            LinkEvent::SampleBufferReady(values) => Self::Samples {
                count: values.len(),
                values,
            },
            LinkEvent::ConnectionError(reason) => Self::ConnectionError { reason },
            LinkEvent::WriteTimeout(reason) => Self::WriteTimeout { reason },
        }
    }

    fn from_message(message: &Message) -> Self {
        Self::Message {
            id: id_char(message.id),
            name: id_name(message.id),
            payload: hex_string(&message.payload),
            telemetry: Telemetry::decode(message),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::Samples { .. } => "samples",
            Self::ConnectionError { .. } => "connection_error",
            Self::WriteTimeout { .. } => "write_timeout",
        }
    }

    fn detail(&self) -> String {
        match self {
            Self::Message {
                payload, telemetry, ..
            } => match telemetry {
                Some(telemetry) => describe(telemetry),
                None if payload.is_empty() => "-".to_string(),
                None => payload.clone(),
            },
            Self::Samples { values, .. } => format!("{values:?}"),
            Self::ConnectionError { reason } | Self::WriteTimeout { reason } => reason.to_string(),
        }
    }

    fn id(&self) -> &str {
        match self {
            Self::Message { id, .. } => id,
            _ => "-",
        }
    }
}

pub fn print_event(seq: usize, event: &LinkEvent, format: OutputFormat) {
    let body = EventBody::from_event(event);
    match format {
        OutputFormat::Json => {
            let out = EventOutput {
                seq,
                timestamp: now_unix_millis(),
                body,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "EVENT", "ID", "DETAIL"])
                .add_row(vec![
                    seq.to_string(),
                    body.kind().to_string(),
                    body.id().to_string(),
                    body.detail(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "#{seq} {} id={} {}",
                body.kind(),
                body.id(),
                body.detail()
            );
        }
    }
}

fn describe(telemetry: &Telemetry) -> String {
    match telemetry {
        Telemetry::PeriodMarker => "period marker".to_string(),
        Telemetry::ActuatorPosition { axis, position } => format!("{axis} position={position}"),
        Telemetry::MotorSettings { power, flags } => {
            format!("motor power={power} flags=0x{:02X}", flags.bits())
        }
        Telemetry::MotorSpeed { speed } => format!("motor speed={speed}"),
    }
}

/// Printable id, falling back to hex for non-graphic bytes.
pub fn id_char(id: u8) -> String {
    if id.is_ascii_graphic() {
        char::from(id).to_string()
    } else {
        format!("0x{id:02X}")
    }
}

pub fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn now_unix_millis() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_event_serializes_with_telemetry() {
        let event = LinkEvent::DecodedMessage(Message::new(b'a', vec![0x00, 0x02]));
        let out = EventOutput {
            seq: 3,
            timestamp: "0".into(),
            body: EventBody::from_event(&event),
        };
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["event"], "message");
        assert_eq!(json["id"], "a");
        assert_eq!(json["name"], "FOC_POSITION");
        assert_eq!(json["payload"], "00 02");
        assert_eq!(json["telemetry"]["kind"], "actuator_position");
        assert_eq!(json["telemetry"]["position"], 512);
    }

    #[test]
    fn sample_event_detail() {
        let event = LinkEvent::SampleBufferReady(vec![1, -2]);
        let body = EventBody::from_event(&event);
        assert_eq!(body.kind(), "samples");
        assert_eq!(body.detail(), "[1, -2]");
    }

    #[test]
    fn id_rendering() {
        assert_eq!(id_char(b'.'), ".");
        assert_eq!(id_char(0x07), "0x07");
        assert_eq!(hex_string(&[0xAB, 0x01]), "ab 01");
    }
}
