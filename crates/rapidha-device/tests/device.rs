#![cfg(unix)]

mod common;

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use rapidha_device::{predicate, DeviceError, ErrorKind};
use rapidha_frame::{encode, Frame, FrameFormat};

use common::{connected_device, idle_device};

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
fn send_and_wait_skips_unrelated_frames() {
    let (device, mut module) = connected_device();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    device.register("printall", predicate::any(), move |_: &str, f: &Frame| {
        log.lock().unwrap().push(f.command_id)
    });

    let sim = thread::spawn(move || {
        let cmd = module.expect(0x0042);
        module.reply(0x0001, cmd.sequence, &[]);
        module.reply(0x0080, cmd.sequence, &[0xAB]);
        module
    });

    let reply = device
        .send_and_wait(
            0x0042,
            &[],
            predicate::command(0x0080),
            Duration::from_millis(500),
        )
        .expect("matching reply should resolve the wait");
    assert_eq!(reply.command_id, 0x0080);
    assert_eq!(reply.payload.as_ref(), &[0xAB]);

    let _module = sim.join().unwrap();
    assert!(wait_until(Duration::from_secs(1), || seen.lock().unwrap().len() == 2));
    assert_eq!(*seen.lock().unwrap(), vec![0x0001, 0x0080]);
}

#[test]
fn timeout_is_final_and_late_reply_is_only_dispatched() {
    let (device, mut module) = connected_device();
    let late = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&late);
    device.register("late", predicate::command(0x0080), move |_: &str, _: &Frame| {
        *counter.lock().unwrap() += 1
    });

    let started = Instant::now();
    let err = device
        .send_and_wait(0x0042, &[], predicate::command(0x0080), Duration::from_millis(200))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(device.correlator().pending(), 0);

    let cmd = module.expect(0x0042);
    module.reply(0x0080, cmd.sequence, &[]);
    assert!(wait_until(Duration::from_secs(1), || *late.lock().unwrap() == 1));
    assert_eq!(device.correlator().pending(), 0);
}

#[test]
fn concurrent_waiters_resolve_in_either_order() {
    let (device, mut module) = connected_device();
    let device = Arc::new(device);

    let d1 = Arc::clone(&device);
    let a = thread::spawn(move || {
        d1.send_and_wait(0x0A00, &[], predicate::command(0x0A01), Duration::from_secs(2))
    });
    let d2 = Arc::clone(&device);
    let b = thread::spawn(move || {
        d2.send_and_wait(0x0B00, &[], predicate::command(0x0B01), Duration::from_secs(2))
    });

    let first = module.expect_command();
    let second = module.expect_command();
    let mut commands = vec![first.command_id, second.command_id];
    commands.sort_unstable();
    assert_eq!(commands, vec![0x0A00, 0x0B00]);

    // Reply in the reverse order of arrival.
    for cmd in [&second, &first] {
        module.reply(cmd.command_id + 1, cmd.sequence, &[]);
    }

    assert_eq!(a.join().unwrap().unwrap().command_id, 0x0A01);
    assert_eq!(b.join().unwrap().unwrap().command_id, 0x0B01);
}

#[test]
fn handlers_run_in_registration_order_and_unregister_applies() {
    let (device, mut module) = connected_device();
    let order = Arc::new(Mutex::new(Vec::new()));
    for name in ["A", "B", "C"] {
        let order = Arc::clone(&order);
        device.register(name, predicate::any(), move |n: &str, _: &Frame| {
            order.lock().unwrap().push(n.to_string())
        });
    }

    module.reply(0x0109, 1, &[]);
    assert!(wait_until(Duration::from_secs(1), || order.lock().unwrap().len() == 3));

    assert!(device.unregister("B"));
    module.reply(0x0109, 2, &[]);
    assert!(wait_until(Duration::from_secs(1), || order.lock().unwrap().len() == 5));

    assert_eq!(*order.lock().unwrap(), vec!["A", "B", "C", "A", "C"]);
}

#[test]
fn transport_close_fails_pending_and_future_waits() {
    let (device, mut module) = connected_device();

    let sim = thread::spawn(move || {
        module.expect(0x0108);
        drop(module);
    });

    let err = device
        .send_and_wait(0x0108, &[], predicate::command(0x0109), Duration::from_secs(5))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportClosed);
    sim.join().unwrap();

    assert!(wait_until(Duration::from_secs(1), || !device.is_running()));
    let err = device
        .send_and_wait(0x0108, &[], predicate::command(0x0109), Duration::from_secs(5))
        .unwrap_err();
    assert!(matches!(err, DeviceError::TransportClosed));
}

#[test]
fn panicking_handler_does_not_stop_reader() {
    let (device, mut module) = connected_device();
    device.register("boom", predicate::any(), |_: &str, _: &Frame| panic!("handler bug"));
    let hits = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&hits);
    device.register("after", predicate::any(), move |_: &str, _: &Frame| {
        *counter.lock().unwrap() += 1
    });

    module.reply(0x0109, 1, &[]);
    module.reply(0x0109, 2, &[]);
    assert!(wait_until(Duration::from_secs(1), || *hits.lock().unwrap() == 2));
    assert!(device.is_running());
}

#[test]
fn corrupt_bytes_on_the_line_are_skipped() {
    let (device, mut module) = connected_device();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    device.register("seq", predicate::any(), move |_: &str, f: &Frame| {
        log.lock().unwrap().push(f.sequence)
    });

    let mut corrupt = BytesMut::new();
    encode(&FrameFormat::rapidha(), 0x0109, 1, &[0x01, 0x02], &mut corrupt).unwrap();
    corrupt[5] ^= 0x10;
    module.write_raw(&[0x00, 0x13, 0x37]);
    module.write_raw(&corrupt);
    module.reply(0x0109, 2, &[0x01]);

    assert!(wait_until(Duration::from_secs(1), || !seen.lock().unwrap().is_empty()));
    assert_eq!(*seen.lock().unwrap(), vec![2]);
}

#[test]
fn send_increments_sequence_numbers() {
    let (device, mut module) = connected_device();

    let first = device.send(0x0108, &[]).unwrap();
    let second = device.send(0x0108, &[]).unwrap();
    assert_eq!(second, first.wrapping_add(1));

    assert_eq!(module.expect(0x0108).sequence, first);
    assert_eq!(module.expect(0x0108).sequence, second);

    let frame = Frame::new(0x0103, 0x77, vec![0x3C]);
    device.send_frame(&frame).unwrap();
    assert_eq!(module.expect_command(), frame);
}

#[test]
fn oversized_payload_is_rejected_before_writing() {
    let (device, _module) = connected_device();
    let err = device.send(0x0500, &[0u8; 300]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Encode);
}

#[test]
fn stop_and_restart_keeps_the_stream() {
    let (mut device, mut module) = idle_device();
    assert!(!device.is_running());
    assert!(matches!(device.stop(), Err(DeviceError::NotStarted)));

    device.start().unwrap();
    assert!(matches!(device.start(), Err(DeviceError::AlreadyStarted)));
    assert!(device.is_running());
    device.stop().unwrap();
    assert!(!device.is_running());

    device.start().unwrap();
    let sim = thread::spawn(move || {
        let cmd = module.expect(0x5502);
        module.reply(0x5503, cmd.sequence, &[0u8; 15]);
        module
    });
    let reply = device
        .send_and_wait(
            0x5502,
            &[],
            predicate::command(0x5503),
            Duration::from_secs(2),
        )
        .unwrap();
    assert_eq!(reply.payload.len(), 15);
    let _module = sim.join().unwrap();
}

#[test]
fn register_once_fires_for_first_match_only() {
    let (device, mut module) = connected_device();
    let hits = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&hits);
    device.register_once("join", predicate::command(0x0110), move |_: &str, f: &Frame| {
        log.lock().unwrap().push(f.sequence)
    });

    module.reply(0x0110, 1, &[]);
    module.reply(0x0110, 2, &[]);
    module.reply(0x0109, 3, &[]);
    assert!(wait_until(Duration::from_secs(1), || {
        !device.registry().contains("join")
    }));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(*hits.lock().unwrap(), vec![1]);
}
