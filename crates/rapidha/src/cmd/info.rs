use std::time::Duration;

use rapidha_device::commands::{self, ModuleInfo, NetworkStatus};
use serde::Serialize;

use crate::cmd::{open_device, parse_duration, InfoArgs};
use crate::exit::{device_error, CliResult, SUCCESS};
use crate::output::{hex, OutputFormat};

#[derive(Serialize)]
struct ModuleOutput {
    firmware: String,
    application_info: u16,
    eui64: String,
    hardware_type: u8,
    bootloader_type: u8,
}

#[derive(Serialize)]
pub(crate) struct NetworkOutput {
    up: bool,
    device_type: u8,
    channel: u8,
    node_id: String,
    pan_id: String,
    extended_pan_id: String,
    permit_join_seconds: u8,
}

#[derive(Serialize)]
struct InfoOutput {
    path: String,
    module: ModuleOutput,
    network: NetworkOutput,
    latency_ms: f64,
}

pub fn run(args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let device = open_device(&args.device, timeout)?;

    let started = std::time::Instant::now();
    let module = commands::module_info(&device)
        .map_err(|err| device_error("module info request failed", err))?;
    let latency = started.elapsed();
    let network = commands::network_status(&device)
        .map_err(|err| device_error("network status request failed", err))?;

    let out = InfoOutput {
        path: args.device.path.display().to_string(),
        module: module_output(&module),
        network: network_output(&network),
        latency_ms: round_ms(latency),
    };
    print_info(&out, format);
    Ok(SUCCESS)
}

fn module_output(info: &ModuleInfo) -> ModuleOutput {
    ModuleOutput {
        firmware: info.firmware(),
        application_info: info.application_info,
        eui64: hex(&info.eui64),
        hardware_type: info.hardware_type,
        bootloader_type: info.bootloader_type,
    }
}

pub(crate) fn network_output(status: &NetworkStatus) -> NetworkOutput {
    NetworkOutput {
        up: status.is_up(),
        device_type: status.device_type,
        channel: status.channel,
        node_id: format!("{:#06x}", status.node_id),
        pan_id: format!("{:#06x}", status.pan_id),
        extended_pan_id: hex(&status.extended_pan_id),
        permit_join_seconds: status.permit_join_time,
    }
}

fn round_ms(d: Duration) -> f64 {
    (d.as_secs_f64() * 1000.0 * 100.0).round() / 100.0
}

fn print_info(out: &InfoOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("Module Info:");
            println!("  Device:           {}", out.path);
            println!("  Firmware:         {}", out.module.firmware);
            println!("  EUI64:            {}", out.module.eui64);
            println!(
                "  Hardware:         type={} bootloader={}",
                out.module.hardware_type, out.module.bootloader_type
            );
            println!("  Latency:          {:.2}ms", out.latency_ms);
            print_network(&out.network);
        }
        OutputFormat::Raw => {
            println!("{}", out.module.eui64);
        }
    }
}

pub(crate) fn print_network(network: &NetworkOutput) {
    println!("Network:");
    println!(
        "  State:            {}",
        if network.up { "up" } else { "down" }
    );
    println!("  Channel:          {}", network.channel);
    println!("  PAN ID:           {}", network.pan_id);
    println!("  Extended PAN ID:  {}", network.extended_pan_id);
    println!("  Node ID:          {}", network.node_id);
}
