#![cfg(unix)]

mod common;

use std::time::Duration;

use rapidha_device::commands::{self, ClusterAttributes, Endpoint, NetworkParams};
use rapidha_device::startup::STARTUP_HANDLER_NAME;
use rapidha_device::{predicate, StartupConfig, StartupSequence, StartupState};
use rapidha_frame::Frame;
use rapidha_frame::command::*;

use common::{connected_device, Module};

fn network_status(up: bool) -> Vec<u8> {
    let mut payload = vec![u8::from(up), 0x00, 0x0F, 0x00, 0x00, 0x34, 0x12];
    payload.extend_from_slice(&[0u8; 8]);
    payload.push(0x00);
    payload
}

/// Acknowledge the next command with a status response echoing its sequence.
fn ack(module: &mut Module, command_id: u16) -> Vec<u8> {
    let cmd = module.expect(command_id);
    module.reply(STATUS_RESPONSE, cmd.sequence, &[0x00]);
    cmd.payload.to_vec()
}

#[test]
fn factory_default_module_is_configured_and_forms_a_network() {
    let (device, mut module) = connected_device();
    let startup = StartupSequence::install(&device, StartupConfig::default());
    assert_eq!(startup.state(), StartupState::WaitingStartupSync);

    module.reply(STARTUP_SYNC, 0, &[0x00, 0x00]);
    module.expect(RESET);
    module.reply(STARTUP_SYNC, 0, &[0x00, 0x00]);

    assert_eq!(ack(&mut module, SERIAL_ACK_CONFIG_WRITE), vec![0x01]);
    module.expect(HOST_STARTUP_READY);
    module.reply(STARTUP_SYNC, 0, &[0x00, 0x00]);

    assert_eq!(ack(&mut module, DEVICE_TYPE_WRITE), vec![0x00, 0x00]);
    ack(&mut module, CLEAR_ENDPOINT_CONFIG);
    assert_eq!(
        ack(&mut module, ADD_ENDPOINT),
        Endpoint::default().payload().to_vec()
    );
    assert_eq!(
        ack(&mut module, ADD_ATTRIBUTES_TO_CLUSTER),
        ClusterAttributes::default().payload().to_vec()
    );

    module.expect(STARTUP_SYNC_COMPLETE);
    module.reply(NETWORK_STATUS_RESPONSE, 0, &network_status(false));

    let form = module.expect(FORM_NETWORK);
    assert_eq!(form.payload.as_ref(), &NetworkParams::default().payload());
    assert_eq!(startup.state(), StartupState::FormingNetwork);
    module.reply(NETWORK_STATUS_RESPONSE, 0, &network_status(true));

    assert!(startup.wait_for(StartupState::NetworkUp, Duration::from_secs(2)));
    assert!(startup.is_network_up());
    assert_eq!(startup.network().map(|n| n.pan_id), Some(0x1234));
    assert!(!device.registry().contains(STARTUP_HANDLER_NAME));
}

#[test]
fn configured_module_skips_endpoint_setup() {
    let (device, mut module) = connected_device();
    let startup = StartupSequence::install(&device, StartupConfig::default());

    module.reply(STARTUP_SYNC, 0, &[0x00, 0x02]);
    module.expect(RESET);
    module.reply(STARTUP_SYNC, 0, &[0x00, 0x02]);
    ack(&mut module, SERIAL_ACK_CONFIG_WRITE);
    module.expect(HOST_STARTUP_READY);
    module.reply(STARTUP_SYNC, 0, &[0x00, 0x02]);

    module.expect(STARTUP_SYNC_COMPLETE);
    module.reply(NETWORK_STATUS_RESPONSE, 0, &network_status(true));

    assert!(startup.wait_for(StartupState::NetworkUp, Duration::from_secs(2)));
}

#[test]
fn module_needing_endpoints_starts_with_clear() {
    let (device, mut module) = connected_device();
    let startup = StartupSequence::install(&device, StartupConfig::default());

    module.reply(STARTUP_SYNC, 0, &[0x00, 0x01]);
    module.expect(RESET);
    module.reply(STARTUP_SYNC, 0, &[0x00, 0x01]);
    ack(&mut module, SERIAL_ACK_CONFIG_WRITE);
    module.expect(HOST_STARTUP_READY);
    module.reply(STARTUP_SYNC, 0, &[0x00, 0x01]);

    ack(&mut module, CLEAR_ENDPOINT_CONFIG);
    module.expect(ADD_ENDPOINT);
    assert!(startup.wait_for(StartupState::AwaitingEndpointAdded, Duration::from_secs(1)));
}

#[test]
fn unrelated_frames_do_not_advance_the_handshake() {
    let (device, mut module) = connected_device();
    let startup = StartupSequence::install(&device, StartupConfig::default());

    module.reply(NETWORK_STATUS_RESPONSE, 0, &network_status(true));
    module.reply(STATUS_RESPONSE, 0, &[0x00]);
    assert!(!startup.wait_for(StartupState::AwaitingResetSync, Duration::from_millis(100)));
    assert_eq!(startup.state(), StartupState::WaitingStartupSync);
}

#[test]
fn reconfigure_clears_handlers_and_restarts_the_handshake() {
    let (device, mut module) = connected_device();
    device.register("printall", predicate::any(), |_: &str, _: &Frame| {});
    device.register("status", predicate::command(STATUS_RESPONSE), |_: &str, _: &Frame| {});

    let startup = commands::reconfigure(&device, StartupConfig::default()).unwrap();
    assert_eq!(device.registry().names(), vec![STARTUP_HANDLER_NAME]);
    assert_eq!(startup.state(), StartupState::WaitingStartupSync);
    module.expect(RESTORE_DEFAULTS);

    module.reply(STARTUP_SYNC, 0, &[0x00, 0x00]);
    module.expect(RESET);
    module.reply(STARTUP_SYNC, 0, &[0x00, 0x00]);
    ack(&mut module, SERIAL_ACK_CONFIG_WRITE);
    module.expect(HOST_STARTUP_READY);
    module.reply(STARTUP_SYNC, 0, &[0x00, 0x00]);

    assert_eq!(ack(&mut module, DEVICE_TYPE_WRITE), vec![0x00, 0x00]);
    assert!(startup.wait_for(StartupState::AwaitingEndpointsCleared, Duration::from_secs(1)));
}
