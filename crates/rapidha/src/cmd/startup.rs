use rapidha_device::commands::{self, NetworkParams};
use rapidha_device::{StartupConfig, StartupSequence, StartupState, DEFAULT_RESPONSE_TIMEOUT};
use serde::Serialize;
use tracing::info;

use crate::cmd::info::{network_output, print_network, NetworkOutput};
use crate::cmd::{open_device, parse_duration, parse_hex_u32, StartupArgs};
use crate::exit::{device_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct StartupOutput {
    state: String,
    network: Option<NetworkOutput>,
}

pub fn run(args: StartupArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let mut config = StartupConfig::default();
    if let Some(mask) = &args.channel_mask {
        config.network = NetworkParams {
            channel_mask: parse_hex_u32(mask, "channel mask")?,
            ..NetworkParams::default()
        };
    }

    let device = open_device(&args.device, DEFAULT_RESPONSE_TIMEOUT)?;
    let startup = StartupSequence::install(&device, config);
    if args.reset {
        commands::reset(&device).map_err(|err| device_error("reset failed", err))?;
    }
    info!(path = ?args.device.path, "waiting for module startup");

    let up = startup.wait_for(StartupState::NetworkUp, timeout);
    let out = StartupOutput {
        state: format!("{:?}", startup.state()),
        network: startup.network().as_ref().map(network_output),
    };
    print_startup(&out, format);

    if !up {
        return Err(CliError::new(
            TIMEOUT,
            format!("startup timed out after {timeout:?} in state {}", out.state),
        ));
    }
    Ok(SUCCESS)
}

fn print_startup(out: &StartupOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("Startup:");
            println!("  State:            {}", out.state);
            if let Some(network) = &out.network {
                print_network(network);
            }
        }
        OutputFormat::Raw => {
            println!("{}", out.state);
        }
    }
}
