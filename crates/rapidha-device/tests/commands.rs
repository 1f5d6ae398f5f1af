#![cfg(unix)]

mod common;

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rapidha_device::commands::{self, TrustCenterUpdate, JOIN_HANDLER_NAME};
use rapidha_frame::command::{PERMIT_JOIN, TRUST_CENTER_DEVICE_UPDATE};

use common::connected_device;

fn trust_center_update(node_id: u16, event: u8) -> Vec<u8> {
    let mut payload = node_id.to_le_bytes().to_vec();
    payload.extend_from_slice(&[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]);
    payload.push(event);
    payload.extend_from_slice(&[0x00, 0x00]);
    payload
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn join_inside_permit_window_is_reported_once() {
    let (device, mut module) = connected_device();
    let joined: Arc<Mutex<Vec<TrustCenterUpdate>>> = Arc::default();
    let log = Arc::clone(&joined);

    commands::add_device(&device, 30, move |update| log.lock().unwrap().push(update)).unwrap();
    assert_eq!(module.expect(PERMIT_JOIN).payload.as_ref(), &[30]);

    module.reply(TRUST_CENTER_DEVICE_UPDATE, 0, &trust_center_update(0x1A2B, 0x01));
    module.reply(TRUST_CENTER_DEVICE_UPDATE, 0, &trust_center_update(0x3C4D, 0x01));

    assert!(wait_until(Duration::from_secs(1), || {
        !device.registry().contains(JOIN_HANDLER_NAME)
    }));
    thread::sleep(Duration::from_millis(50));
    let joined = joined.lock().unwrap();
    assert_eq!(joined.len(), 1);
    assert_eq!(joined[0].node_id, 0x1A2B);
}

#[test]
fn join_after_permit_window_is_ignored() {
    let (device, mut module) = connected_device();
    let fired = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&fired);

    commands::add_device(&device, 1, move |_| *counter.lock().unwrap() += 1).unwrap();
    module.expect(PERMIT_JOIN);
    assert!(device.registry().contains(JOIN_HANDLER_NAME));

    thread::sleep(Duration::from_millis(1_100));
    assert!(!device.registry().contains(JOIN_HANDLER_NAME));
    assert!(device.registry().is_empty());

    module.reply(TRUST_CENTER_DEVICE_UPDATE, 0, &trust_center_update(0x1A2B, 0x01));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(*fired.lock().unwrap(), 0);
}

#[test]
fn leave_handler_ignores_joins() {
    let (device, mut module) = connected_device();
    let left = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&left);
    commands::on_device_leave(&device, move |update| log.lock().unwrap().push(update.node_id));

    module.reply(TRUST_CENTER_DEVICE_UPDATE, 0, &trust_center_update(0x0001, 0x01));
    module.reply(TRUST_CENTER_DEVICE_UPDATE, 0, &trust_center_update(0x0002, 0x03));

    assert!(wait_until(Duration::from_secs(1), || !left.lock().unwrap().is_empty()));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(*left.lock().unwrap(), vec![0x0002]);
}
