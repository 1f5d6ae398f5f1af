use rapidha_device::predicate;
use rapidha_frame::command_name;
use tracing::info;

use crate::cmd::{open_device, parse_command_id, parse_duration, parse_hex_bytes, SendArgs};
use crate::exit::{device_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let command_id = parse_command_id(&args.command)?;
    let payload = parse_hex_bytes(&args.payload)?;
    let timeout = parse_duration(&args.timeout)?;
    let reply_id = args.wait.as_deref().map(parse_command_id).transpose()?;

    let device = open_device(&args.device, timeout)?;

    match reply_id {
        Some(reply_id) => {
            let frame = device
                .send_and_wait(command_id, &payload, predicate::command(reply_id), timeout)
                .map_err(|err| device_error("send failed", err))?;
            print_frame(&frame, format);
        }
        None => {
            let sequence = device
                .send(command_id, &payload)
                .map_err(|err| device_error("send failed", err))?;
            info!(
                command = command_name(command_id),
                sequence,
                len = payload.len(),
                "command sent"
            );
        }
    }

    Ok(SUCCESS)
}
