use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use rapidha_device::{predicate, DEFAULT_RESPONSE_TIMEOUT};
use rapidha_frame::Frame;
use tracing::info;

use crate::cmd::{open_device, MonitorArgs};
use crate::exit::{CliError, CliResult, FAILURE, INTERNAL, SUCCESS};
use crate::output::{print_frame, OutputFormat};

/// Handler name used for the catch-all printer.
const PRINT_HANDLER_NAME: &str = "printall";

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let device = open_device(&args.device, DEFAULT_RESPONSE_TIMEOUT)?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    // Printing happens here rather than on the reader thread.
    let (tx, rx) = crossbeam_channel::unbounded::<Frame>();
    device.register(PRINT_HANDLER_NAME, predicate::any(), move |_: &str, frame: &Frame| {
        let _ = tx.send(frame.clone());
    });
    info!(path = ?args.device.path, "monitoring");

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(frame) => {
                print_frame(&frame, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    return Ok(SUCCESS);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if !device.is_running() {
                    return Err(CliError::new(FAILURE, "transport closed"));
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
