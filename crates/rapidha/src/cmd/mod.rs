use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use rapidha_device::{Device, DeviceConfig};
use rapidha_transport::{SerialConfig, SerialStream, DEFAULT_BAUD_RATE};

use crate::exit::{device_error, transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod info;
pub mod monitor;
pub mod send;
pub mod startup;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print every frame the module sends.
    Monitor(MonitorArgs),
    /// Send a single command.
    Send(SendArgs),
    /// Query module identification and network state.
    Info(InfoArgs),
    /// Run the startup handshake until the network is up.
    Startup(StartupArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Monitor(args) => monitor::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Info(args) => info::run(args, format),
        Command::Startup(args) => startup::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where the module is attached.
#[derive(Args, Debug)]
pub struct DeviceArgs {
    /// Serial device path, or socket path with --socket.
    #[arg(env = "RAPIDHA_DEVICE")]
    pub path: PathBuf,
    /// Line speed in bits per second.
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE, env = "RAPIDHA_BAUD")]
    pub baud: u32,
    /// Treat PATH as a Unix socket relaying the serial line.
    #[arg(long)]
    pub socket: bool,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Exit after printing N frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Command id in hex (e.g. 0x0108).
    #[arg(long, short = 'c')]
    pub command: String,
    /// Payload bytes in hex (e.g. "01ff" or "01 ff").
    #[arg(long, short = 'p', default_value = "")]
    pub payload: String,
    /// Wait for a reply with this command id and print it.
    #[arg(long, value_name = "COMMAND")]
    pub wait: Option<String>,
    /// Maximum time to wait for the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Per-request response timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct StartupArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Maximum time for the whole handshake (e.g. 60s).
    #[arg(long, default_value = "60s")]
    pub timeout: String,
    /// ZigBee channel mask for network formation, in hex.
    #[arg(long, value_name = "MASK")]
    pub channel_mask: Option<String>,
    /// Reset the module first so it announces itself again.
    #[arg(long)]
    pub reset: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Open the module described by `args` and start its reader.
pub fn open_device(args: &DeviceArgs, response_timeout: Duration) -> CliResult<Device> {
    let config = DeviceConfig {
        serial: SerialConfig {
            baud_rate: args.baud,
            ..SerialConfig::default()
        },
        response_timeout,
        ..DeviceConfig::default()
    };

    let device = if args.socket {
        let stream = SerialStream::connect_unix(&args.path)
            .map_err(|err| transport_error("connect failed", err))?;
        Device::from_serial(stream, config)
    } else {
        Device::open(&args.path, config)
    };
    let mut device = device.map_err(|err| device_error("open failed", err))?;
    device
        .start()
        .map_err(|err| device_error("reader start failed", err))?;
    Ok(device)
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "timeout must not be empty"));
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
        .map_err(|_| CliError::new(USAGE, format!("invalid timeout value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Parse a hex number with an optional `0x` prefix.
pub fn parse_hex_u32(input: &str, what: &str) -> CliResult<u32> {
    let input = input.trim();
    let digits = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);
    u32::from_str_radix(digits, 16)
        .map_err(|_| CliError::new(USAGE, format!("invalid {what}: {input}")))
}

pub fn parse_command_id(input: &str) -> CliResult<u16> {
    let value = parse_hex_u32(input, "command id")?;
    u16::try_from(value)
        .map_err(|_| CliError::new(USAGE, format!("command id out of range: {input}")))
}

/// Parse payload bytes written as hex, ignoring whitespace and `:`.
pub fn parse_hex_bytes(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && *c != ':')
        .collect();
    hex::decode(&digits)
        .map_err(|err| CliError::new(USAGE, format!("invalid payload {input:?}: {err}")))
}
