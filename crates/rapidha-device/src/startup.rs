//! Startup handshake bringing a module from power-on to a formed network.
//!
//! The module announces itself with startup sync frames. The host resets
//! it, enables serial acknowledgements, reports ready, configures the
//! device type, endpoint and attributes when the module asks for it, then
//! completes the sync and forms a network if none is up.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rapidha_frame::command::{
    ADD_ATTRIBUTES_TO_CLUSTER, ADD_ENDPOINT, CLEAR_ENDPOINT_CONFIG, DEVICE_TYPE_WRITE,
    FORM_NETWORK, HOST_STARTUP_READY, NETWORK_STATUS_RESPONSE, RESET, SERIAL_ACK_CONFIG_WRITE,
    STARTUP_SYNC, STARTUP_SYNC_COMPLETE, STATUS_RESPONSE,
};
use rapidha_frame::{command_name, Frame};
use tracing::{error, info, warn};

use crate::commands::{
    device_type_payload, ClusterAttributes, ConfigState, DeviceType, Endpoint, NetworkParams,
    NetworkStatus, RunningState, StartupSync,
};
use crate::device::{Device, FrameSender};
use crate::dispatch::DispatchRegistry;
use crate::predicate;

/// Handler name used for the startup sequence.
pub const STARTUP_HANDLER_NAME: &str = "startup";

/// Where the handshake currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupState {
    /// Waiting for the first startup sync.
    WaitingStartupSync,
    /// Reset sent; waiting for the module to sync again.
    AwaitingResetSync,
    /// Serial acknowledgements requested.
    AwaitingSerialAck,
    /// Host ready sent; waiting for the sync carrying the module state.
    AwaitingReadySync,
    AwaitingDeviceType,
    AwaitingEndpointsCleared,
    AwaitingEndpointAdded,
    AwaitingAttributesAdded,
    /// Sync complete sent; waiting for the network status.
    AwaitingNetworkStatus,
    /// Network formation requested.
    FormingNetwork,
    NetworkUp,
}

/// Parameters for the startup handshake.
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub device_type: DeviceType,
    pub sleepy: bool,
    pub endpoint: Endpoint,
    pub attributes: ClusterAttributes,
    pub network: NetworkParams,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            device_type: DeviceType::Ffd,
            sleepy: false,
            endpoint: Endpoint::default(),
            attributes: ClusterAttributes::default(),
            network: NetworkParams::default(),
        }
    }
}

struct Progress {
    state: StartupState,
    awaiting_sequence: Option<u8>,
    network: Option<NetworkStatus>,
}

/// Drives the handshake from frames delivered by the dispatch registry.
pub struct StartupSequence {
    config: StartupConfig,
    sender: FrameSender,
    registry: Weak<DispatchRegistry>,
    progress: Mutex<Progress>,
    changed: Condvar,
}

impl StartupSequence {
    /// Register the handshake on `device` and return a handle to observe it.
    ///
    /// Replaces a previously installed sequence. The handler unregisters
    /// itself once the network is up.
    pub fn install(device: &Device, config: StartupConfig) -> Arc<Self> {
        let sequence = Arc::new(Self {
            config,
            sender: device.sender(),
            registry: Arc::downgrade(device.registry()),
            progress: Mutex::new(Progress {
                state: StartupState::WaitingStartupSync,
                awaiting_sequence: None,
                network: None,
            }),
            changed: Condvar::new(),
        });

        let handler = Arc::clone(&sequence);
        device.register(
            STARTUP_HANDLER_NAME,
            predicate::any(),
            move |_: &str, frame: &Frame| handler.on_frame(frame),
        );
        sequence
    }

    pub fn state(&self) -> StartupState {
        self.progress.lock().state
    }

    /// Last network status seen during the handshake.
    pub fn network(&self) -> Option<NetworkStatus> {
        self.progress.lock().network.clone()
    }

    /// True once the module reports the network up.
    pub fn is_network_up(&self) -> bool {
        self.state() == StartupState::NetworkUp
    }

    /// Block until `state` is reached. Returns false on timeout.
    pub fn wait_for(&self, state: StartupState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut progress = self.progress.lock();
        while progress.state != state {
            if self.changed.wait_until(&mut progress, deadline).timed_out() {
                return progress.state == state;
            }
        }
        true
    }

    /// Advance the state machine with one received frame.
    pub fn on_frame(&self, frame: &Frame) {
        let mut progress = self.progress.lock();
        let before = progress.state;
        let acked = progress.awaiting_sequence == Some(frame.sequence);

        let next = match (before, frame.command_id) {
            (StartupState::WaitingStartupSync, STARTUP_SYNC) => {
                self.transmit(&mut progress, RESET, &[], StartupState::AwaitingResetSync)
            }
            (StartupState::AwaitingResetSync, STARTUP_SYNC) => self.transmit(
                &mut progress,
                SERIAL_ACK_CONFIG_WRITE,
                &[0x01],
                StartupState::AwaitingSerialAck,
            ),
            (StartupState::AwaitingSerialAck, _) if acked => self.transmit(
                &mut progress,
                HOST_STARTUP_READY,
                &[],
                StartupState::AwaitingReadySync,
            ),
            (StartupState::AwaitingReadySync, STARTUP_SYNC) => {
                self.after_ready_sync(&mut progress, frame)
            }
            (StartupState::AwaitingDeviceType, _) if acked => self.transmit(
                &mut progress,
                CLEAR_ENDPOINT_CONFIG,
                &[],
                StartupState::AwaitingEndpointsCleared,
            ),
            (StartupState::AwaitingEndpointsCleared, _) if acked => self.transmit(
                &mut progress,
                ADD_ENDPOINT,
                &self.config.endpoint.payload(),
                StartupState::AwaitingEndpointAdded,
            ),
            (StartupState::AwaitingEndpointAdded, _) if acked => self.transmit(
                &mut progress,
                ADD_ATTRIBUTES_TO_CLUSTER,
                &self.config.attributes.payload(),
                StartupState::AwaitingAttributesAdded,
            ),
            (StartupState::AwaitingAttributesAdded, STATUS_RESPONSE) => self.transmit(
                &mut progress,
                STARTUP_SYNC_COMPLETE,
                &[],
                StartupState::AwaitingNetworkStatus,
            ),
            (StartupState::AwaitingNetworkStatus, NETWORK_STATUS_RESPONSE) => {
                match self.record_network(&mut progress, frame) {
                    Some(true) => StartupState::NetworkUp,
                    Some(false) => self.transmit(
                        &mut progress,
                        FORM_NETWORK,
                        &self.config.network.payload(),
                        StartupState::FormingNetwork,
                    ),
                    None => before,
                }
            }
            (StartupState::FormingNetwork, NETWORK_STATUS_RESPONSE) => {
                match self.record_network(&mut progress, frame) {
                    Some(true) => StartupState::NetworkUp,
                    _ => before,
                }
            }
            _ => before,
        };

        if next == before {
            return;
        }
        progress.state = next;
        info!(from = ?before, to = ?next, "startup state changed");
        drop(progress);
        self.changed.notify_all();

        if next == StartupState::NetworkUp {
            if let Some(registry) = self.registry.upgrade() {
                registry.unregister(STARTUP_HANDLER_NAME);
            }
        }
    }

    fn after_ready_sync(&self, progress: &mut Progress, frame: &Frame) -> StartupState {
        let Some(sync) = StartupSync::parse(&frame.payload) else {
            warn!("startup sync without module state, ignoring");
            return progress.state;
        };

        if sync.running_state != RunningState::Starting {
            return self.transmit(
                progress,
                STARTUP_SYNC_COMPLETE,
                &[],
                StartupState::AwaitingNetworkStatus,
            );
        }

        match sync.config_state {
            ConfigState::Configured => self.transmit(
                progress,
                STARTUP_SYNC_COMPLETE,
                &[],
                StartupState::AwaitingNetworkStatus,
            ),
            ConfigState::NeedsEndpointConfig => self.transmit(
                progress,
                CLEAR_ENDPOINT_CONFIG,
                &[],
                StartupState::AwaitingEndpointsCleared,
            ),
            ConfigState::FactoryDefault | ConfigState::Other(_) => self.transmit(
                progress,
                DEVICE_TYPE_WRITE,
                &device_type_payload(self.config.device_type, self.config.sleepy),
                StartupState::AwaitingDeviceType,
            ),
        }
    }

    /// Returns whether the network is up, or None for a malformed status.
    fn record_network(&self, progress: &mut Progress, frame: &Frame) -> Option<bool> {
        let Some(status) = NetworkStatus::parse(&frame.payload) else {
            warn!(len = frame.payload.len(), "malformed network status, ignoring");
            return None;
        };
        let up = status.is_up();
        progress.network = Some(status);
        Some(up)
    }

    /// Send a command and move to `next`, or stay put if sending fails.
    fn transmit(
        &self,
        progress: &mut Progress,
        command_id: u16,
        payload: &[u8],
        next: StartupState,
    ) -> StartupState {
        match self.sender.send(command_id, payload) {
            Ok(sequence) => {
                progress.awaiting_sequence = Some(sequence);
                next
            }
            Err(err) => {
                error!(
                    command = command_name(command_id),
                    error = %err,
                    "startup command failed"
                );
                progress.state
            }
        }
    }
}

impl std::fmt::Debug for StartupSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartupSequence")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
