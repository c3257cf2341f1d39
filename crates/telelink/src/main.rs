mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "telelink", version, about = "Motor-controller telemetry link CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "telelink",
            "send",
            "unix:/tmp/board.sock",
            "--id",
            "A",
            "--u16",
            "512",
        ])
        .expect("send args should parse");

        assert!(matches!(cli.command, Command::Send(_)));
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "telelink",
            "send",
            "/tmp/board.sock",
            "--id",
            "P",
            "--i32",
            "100",
            "--hex",
            "0102",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn rejects_stream_with_scan() {
        let err = Cli::try_parse_from(["telelink", "monitor", "/tmp/b.sock", "--stream", "--scan"])
            .expect_err("stream and scan are exclusive");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_monitor_with_link_overrides() {
        let cli = Cli::try_parse_from([
            "telelink",
            "--format",
            "json",
            "monitor",
            "tcp:127.0.0.1:4000",
            "--stream",
            "--ratio",
            "8",
            "--depth",
            "8",
            "--stall-retries",
            "5",
            "--count",
            "10",
        ])
        .expect("monitor args should parse");

        let Command::Monitor(args) = cli.command else {
            panic!("expected monitor");
        };
        let config = args.link.to_config().expect("overrides should be valid");
        assert_eq!(config.reducer.ratio, 8);
        assert_eq!(config.frame.stall_retries, 5);
        assert_eq!(args.count, Some(10));
    }
}
