#![allow(dead_code)]

use std::os::unix::net::UnixStream;
use std::time::Duration;

use rapidha_device::{Device, DeviceConfig};
use rapidha_frame::{Frame, FrameReader, FrameWriter};
use rapidha_transport::SerialStream;

/// The module end of a simulated serial line.
pub struct Module {
    reader: FrameReader<UnixStream>,
    writer: FrameWriter<UnixStream>,
}

impl Module {
    /// Next frame the host transmitted. Panics if none arrives in 2s.
    pub fn expect_command(&mut self) -> Frame {
        self.reader
            .read_frame()
            .expect("host should transmit a command")
    }

    /// Assert the next command's id and return it.
    pub fn expect(&mut self, command_id: u16) -> Frame {
        let frame = self.expect_command();
        assert_eq!(
            frame.command_id, command_id,
            "expected {command_id:#06x}, got {:#06x}",
            frame.command_id
        );
        frame
    }

    pub fn reply(&mut self, command_id: u16, sequence: u8, payload: &[u8]) {
        self.writer
            .send(command_id, sequence, payload)
            .expect("module write should succeed");
    }

    pub fn write_raw(&mut self, bytes: &[u8]) {
        use std::io::Write;
        let stream = self.writer.get_mut();
        stream.write_all(bytes).expect("raw write should succeed");
        stream.flush().expect("flush should succeed");
    }
}

pub fn test_config() -> DeviceConfig {
    DeviceConfig {
        poll_interval: Duration::from_millis(20),
        ..DeviceConfig::default()
    }
}

/// A started device wired to a simulated module.
pub fn connected_device() -> (Device, Module) {
    let (mut device, module) = idle_device();
    device.start().expect("reader should start");
    (device, module)
}

/// A device wired to a simulated module, reader not started.
pub fn idle_device() -> (Device, Module) {
    let (host, module) = UnixStream::pair().expect("socket pair");
    module
        .set_read_timeout(Some(Duration::from_secs(2)))
        .expect("module timeout");

    let device = Device::from_serial(SerialStream::from_unix(host), test_config())
        .expect("device should build");
    let module_reader = module.try_clone().expect("clone module stream");
    (
        device,
        Module {
            reader: FrameReader::new(module_reader),
            writer: FrameWriter::new(module),
        },
    )
}
