//! Convenience wrappers for common RapidHA commands.
//!
//! Payload builders are plain functions so handlers holding only a
//! [`FrameSender`](crate::FrameSender) can use them too. Multi-byte fields
//! are little-endian, as ZigBee transmits them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{BufMut, BytesMut};
use rapidha_frame::command::{
    ADD_ATTRIBUTES_TO_CLUSTER, ADD_ENDPOINT, DEVICE_TYPE_WRITE, FORM_NETWORK, LEAVE_NETWORK,
    MODULE_INFO_REQUEST, MODULE_INFO_RESPONSE, NETWORK_STATUS_REQUEST, NETWORK_STATUS_RESPONSE,
    PERMIT_JOIN, RESET, RESTORE_DEFAULTS, TRUST_CENTER_DEVICE_UPDATE,
};
use rapidha_frame::Frame;

use crate::device::Device;
use crate::error::{DeviceError, Result};
use crate::predicate::{self, FrameHandler};
use crate::startup::{StartupConfig, StartupSequence, STARTUP_HANDLER_NAME};

/// ZigBee Home Automation profile id.
pub const PROFILE_HOME_AUTOMATION: u16 = 0x0104;
/// HA "combined interface" device id.
pub const DEVICE_ID_COMBINED_INTERFACE: u16 = 0x0007;

pub const CLUSTER_BASIC: u16 = 0x0000;
pub const CLUSTER_IDENTIFY: u16 = 0x0003;
pub const CLUSTER_OTA_UPGRADE: u16 = 0x0019;
pub const CLUSTER_THERMOSTAT: u16 = 0x0201;

/// ZCL signed 16-bit attribute type.
pub const ATTRIBUTE_TYPE_INT16: u8 = 0x29;

/// Channels 11 through 25.
pub const DEFAULT_CHANNEL_MASK: u32 = 0x03FF_F800;

/// Trust center event reported when a device leaves.
pub const TRUST_CENTER_EVENT_LEFT: u8 = 0x03;

/// Name under which [`add_device`] registers its one-shot handler.
pub const JOIN_HANDLER_NAME: &str = "network_device_join";
/// Name under which [`on_device_leave`] registers its handler.
pub const LEAVE_HANDLER_NAME: &str = "network_device_leave";

/// Module firmware and hardware identification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub firmware_version: (u8, u8, u8),
    pub application_info: u16,
    pub eui64: [u8; 8],
    pub hardware_type: u8,
    pub bootloader_type: u8,
}

impl ModuleInfo {
    pub const PAYLOAD_LEN: usize = 15;

    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < Self::PAYLOAD_LEN {
            return None;
        }
        Some(Self {
            firmware_version: (payload[0], payload[1], payload[2]),
            application_info: u16::from_le_bytes([payload[3], payload[4]]),
            eui64: eui64(&payload[5..13]),
            hardware_type: payload[13],
            bootloader_type: payload[14],
        })
    }

    pub fn firmware(&self) -> String {
        let (major, minor, build) = self.firmware_version;
        format!("{major}.{minor}.{build}")
    }
}

/// Network state reported by the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkStatus {
    /// 0 = down, 1 = up.
    pub state: u8,
    pub device_type: u8,
    pub channel: u8,
    pub node_id: u16,
    pub pan_id: u16,
    pub extended_pan_id: [u8; 8],
    pub permit_join_time: u8,
}

impl NetworkStatus {
    pub const PAYLOAD_LEN: usize = 16;

    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < Self::PAYLOAD_LEN {
            return None;
        }
        Some(Self {
            state: payload[0],
            device_type: payload[1],
            channel: payload[2],
            node_id: u16::from_le_bytes([payload[3], payload[4]]),
            pan_id: u16::from_le_bytes([payload[5], payload[6]]),
            extended_pan_id: eui64(&payload[7..15]),
            permit_join_time: payload[15],
        })
    }

    pub fn is_up(&self) -> bool {
        self.state == 0x01
    }
}

/// Running state reported in a startup sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningState {
    Starting,
    Running,
    Other(u8),
}

/// Configuration state reported in a startup sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigState {
    FactoryDefault,
    NeedsEndpointConfig,
    Configured,
    Other(u8),
}

/// Payload of a startup sync frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupSync {
    pub running_state: RunningState,
    pub config_state: ConfigState,
}

impl StartupSync {
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let [running, config, ..] = payload else {
            return None;
        };
        Some(Self {
            running_state: match running {
                0x00 => RunningState::Starting,
                0x01 => RunningState::Running,
                other => RunningState::Other(*other),
            },
            config_state: match config {
                0x00 => ConfigState::FactoryDefault,
                0x01 => ConfigState::NeedsEndpointConfig,
                0x02 => ConfigState::Configured,
                other => ConfigState::Other(*other),
            },
        })
    }
}

/// A device joining, rejoining or leaving, as seen by the trust center.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustCenterUpdate {
    pub node_id: u16,
    pub eui64: [u8; 8],
    pub event: u8,
    pub parent_id: u16,
}

impl TrustCenterUpdate {
    pub const PAYLOAD_LEN: usize = 13;

    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < Self::PAYLOAD_LEN {
            return None;
        }
        Some(Self {
            node_id: u16::from_le_bytes([payload[0], payload[1]]),
            eui64: eui64(&payload[2..10]),
            event: payload[10],
            parent_id: u16::from_le_bytes([payload[11], payload[12]]),
        })
    }

    pub fn is_leave(&self) -> bool {
        self.event == TRUST_CENTER_EVENT_LEFT
    }
}

fn eui64(bytes: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&bytes[..8]);
    out
}

/// ZigBee logical device type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceType {
    /// Full function device (router capable).
    #[default]
    Ffd,
    /// Reduced function device (end device).
    Rfd,
}

/// Payload for `DEVICE_TYPE_WRITE`.
pub fn device_type_payload(device_type: DeviceType, sleepy: bool) -> [u8; 2] {
    let kind = match device_type {
        DeviceType::Ffd => 0x00,
        DeviceType::Rfd => 0x01,
    };
    [kind, u8::from(sleepy)]
}

/// An application endpoint and its cluster lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub endpoint: u8,
    pub profile_id: u16,
    pub device_id: u16,
    pub device_version: u8,
    pub server_clusters: Vec<u16>,
    pub client_clusters: Vec<u16>,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            endpoint: 1,
            profile_id: PROFILE_HOME_AUTOMATION,
            device_id: DEVICE_ID_COMBINED_INTERFACE,
            device_version: 1,
            server_clusters: vec![CLUSTER_BASIC, CLUSTER_IDENTIFY, CLUSTER_OTA_UPGRADE],
            client_clusters: vec![CLUSTER_BASIC, CLUSTER_IDENTIFY, CLUSTER_THERMOSTAT],
        }
    }
}

impl Endpoint {
    /// Payload for `ADD_ENDPOINT`.
    pub fn payload(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(8 + 2 * self.cluster_count());
        buf.put_u8(self.endpoint);
        buf.put_u16_le(self.profile_id);
        buf.put_u16_le(self.device_id);
        buf.put_u8(self.device_version);
        buf.put_u8(self.server_clusters.len() as u8);
        for cluster in &self.server_clusters {
            buf.put_u16_le(*cluster);
        }
        buf.put_u8(self.client_clusters.len() as u8);
        for cluster in &self.client_clusters {
            buf.put_u16_le(*cluster);
        }
        buf
    }

    fn cluster_count(&self) -> usize {
        self.server_clusters.len() + self.client_clusters.len()
    }
}

/// One attribute record: id, ZCL type and property flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeRecord {
    pub attribute_id: u16,
    pub attribute_type: u8,
    pub flags: u8,
}

/// Attributes to add to one cluster of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterAttributes {
    pub endpoint: u8,
    pub cluster_id: u16,
    pub is_server: bool,
    pub attributes: Vec<AttributeRecord>,
}

impl Default for ClusterAttributes {
    fn default() -> Self {
        Self {
            endpoint: 1,
            cluster_id: CLUSTER_THERMOSTAT,
            is_server: false,
            attributes: vec![AttributeRecord {
                attribute_id: 0x0011,
                attribute_type: ATTRIBUTE_TYPE_INT16,
                flags: 0x03,
            }],
        }
    }
}

impl ClusterAttributes {
    /// Payload for `ADD_ATTRIBUTES_TO_CLUSTER`.
    pub fn payload(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(5 + 4 * self.attributes.len());
        buf.put_u8(self.endpoint);
        buf.put_u16_le(self.cluster_id);
        buf.put_u8(u8::from(self.is_server));
        buf.put_u8(self.attributes.len() as u8);
        for record in &self.attributes {
            buf.put_u16_le(record.attribute_id);
            buf.put_u8(record.attribute_type);
            buf.put_u8(record.flags);
        }
        buf
    }
}

/// Parameters for forming (or joining) a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkParams {
    pub channel_mask: u32,
    pub auto_options: u8,
    pub pan_id: u16,
    pub extended_pan_id: [u8; 8],
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self {
            channel_mask: DEFAULT_CHANNEL_MASK,
            auto_options: 0x03,
            pan_id: 0x0000,
            extended_pan_id: [0; 8],
        }
    }
}

impl NetworkParams {
    /// Payload for `FORM_NETWORK` and `JOIN_NETWORK`.
    pub fn payload(&self) -> [u8; 15] {
        let mut out = [0u8; 15];
        out[..4].copy_from_slice(&self.channel_mask.to_le_bytes());
        out[4] = self.auto_options;
        out[5..7].copy_from_slice(&self.pan_id.to_le_bytes());
        out[7..].copy_from_slice(&self.extended_pan_id);
        out
    }
}

/// Ask the module to reset.
pub fn reset(device: &Device) -> Result<u8> {
    device.send(RESET, &[])
}

/// Erase the module configuration.
pub fn restore_defaults(device: &Device) -> Result<u8> {
    device.send(RESTORE_DEFAULTS, &[])
}

/// Query firmware and hardware identification.
pub fn module_info(device: &Device) -> Result<ModuleInfo> {
    let frame = device.send_and_wait(
        MODULE_INFO_REQUEST,
        &[],
        predicate::command(MODULE_INFO_RESPONSE),
        device.config().response_timeout,
    )?;
    ModuleInfo::parse(&frame.payload).ok_or(DeviceError::UnexpectedResponse {
        command: "module_info_response",
        reason: "payload too short",
    })
}

/// Query the current network state.
pub fn network_status(device: &Device) -> Result<NetworkStatus> {
    let frame = device.send_and_wait(
        NETWORK_STATUS_REQUEST,
        &[],
        predicate::command(NETWORK_STATUS_RESPONSE),
        device.config().response_timeout,
    )?;
    NetworkStatus::parse(&frame.payload).ok_or(DeviceError::UnexpectedResponse {
        command: "network_status_response",
        reason: "payload too short",
    })
}

/// Allow devices to join for `seconds` (0 closes the network).
pub fn permit_join(device: &Device, seconds: u8) -> Result<u8> {
    device.send(PERMIT_JOIN, &[seconds])
}

pub fn leave_network(device: &Device) -> Result<u8> {
    device.send(LEAVE_NETWORK, &[])
}

pub fn form_network(device: &Device, params: &NetworkParams) -> Result<u8> {
    device.send(FORM_NETWORK, &params.payload())
}

pub fn write_device_type(device: &Device, device_type: DeviceType, sleepy: bool) -> Result<u8> {
    device.send(DEVICE_TYPE_WRITE, &device_type_payload(device_type, sleepy))
}

pub fn add_endpoint(device: &Device, endpoint: &Endpoint) -> Result<u8> {
    device.send(ADD_ENDPOINT, &endpoint.payload())
}

pub fn add_attributes(device: &Device, attributes: &ClusterAttributes) -> Result<u8> {
    device.send(ADD_ATTRIBUTES_TO_CLUSTER, &attributes.payload())
}

/// Open the network for `permit_seconds` and report the next device that
/// joins within that window.
///
/// `on_join` runs at most once, on the reader thread. A join reported after
/// the window closes is ignored and the handler is dropped. A previous
/// pending join handler is replaced.
pub fn add_device<F>(device: &Device, permit_seconds: u8, on_join: F) -> Result<u8>
where
    F: Fn(TrustCenterUpdate) + Send + Sync + 'static,
{
    let deadline = Instant::now() + Duration::from_secs(u64::from(permit_seconds));
    device.register_once_until(
        JOIN_HANDLER_NAME,
        |frame: &Frame| {
            frame.command_id == TRUST_CENTER_DEVICE_UPDATE
                && TrustCenterUpdate::parse(&frame.payload).is_some_and(|u| !u.is_leave())
        },
        trust_center_handler(on_join),
        deadline,
    );
    permit_join(device, permit_seconds)
}

/// Restore factory defaults and run the startup handshake again.
///
/// Every registered handler is removed first. The new handshake is
/// installed before the command is sent so the module's first startup sync
/// is not missed.
pub fn reconfigure(device: &Device, config: StartupConfig) -> Result<Arc<StartupSequence>> {
    device.registry().clear();
    let startup = StartupSequence::install(device, config);
    if let Err(err) = restore_defaults(device) {
        device.unregister(STARTUP_HANDLER_NAME);
        return Err(err);
    }
    Ok(startup)
}

/// Report every device that leaves the network.
pub fn on_device_leave<F>(device: &Device, on_leave: F)
where
    F: Fn(TrustCenterUpdate) + Send + Sync + 'static,
{
    device.register(
        LEAVE_HANDLER_NAME,
        |frame: &Frame| {
            frame.command_id == TRUST_CENTER_DEVICE_UPDATE
                && TrustCenterUpdate::parse(&frame.payload).is_some_and(|u| u.is_leave())
        },
        trust_center_handler(on_leave),
    );
}

fn trust_center_handler<F>(callback: F) -> impl FrameHandler + 'static
where
    F: Fn(TrustCenterUpdate) + Send + Sync + 'static,
{
    move |_: &str, frame: &Frame| {
        if let Some(update) = TrustCenterUpdate::parse(&frame.payload) {
            callback(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoint_layout() {
        let payload = Endpoint::default().payload();
        assert_eq!(
            payload.as_ref(),
            &[
                0x01, // endpoint
                0x04, 0x01, // profile 0x0104
                0x07, 0x00, // combined interface
                0x01, // version
                0x03, 0x00, 0x00, 0x03, 0x00, 0x19, 0x00, // server clusters
                0x03, 0x00, 0x00, 0x03, 0x00, 0x01, 0x02, // client clusters
            ]
        );
    }

    #[test]
    fn default_attribute_layout() {
        let payload = ClusterAttributes::default().payload();
        assert_eq!(
            payload.as_ref(),
            &[0x01, 0x01, 0x02, 0x00, 0x01, 0x11, 0x00, 0x29, 0x03]
        );
    }

    #[test]
    fn default_network_params_cover_channels_11_to_25() {
        let payload = NetworkParams::default().payload();
        assert_eq!(&payload[..5], &[0x00, 0xF8, 0xFF, 0x03, 0x03]);
        assert!(payload[5..].iter().all(|b| *b == 0));
    }

    #[test]
    fn device_type_bytes() {
        assert_eq!(device_type_payload(DeviceType::Ffd, false), [0x00, 0x00]);
        assert_eq!(device_type_payload(DeviceType::Rfd, true), [0x01, 0x01]);
    }

    #[test]
    fn parses_module_info() {
        let payload = [
            1, 2, 3, 0x34, 0x12, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x09, 0x0A,
        ];
        let info = ModuleInfo::parse(&payload).unwrap();
        assert_eq!(info.firmware(), "1.2.3");
        assert_eq!(info.application_info, 0x1234);
        assert_eq!(info.eui64[7], 0x88);
        assert_eq!((info.hardware_type, info.bootloader_type), (0x09, 0x0A));
        assert!(ModuleInfo::parse(&payload[..14]).is_none());
    }

    #[test]
    fn parses_network_status() {
        let mut payload = vec![0x01, 0x00, 0x0F, 0x00, 0x00, 0xCD, 0xAB];
        payload.extend_from_slice(&[0u8; 8]);
        payload.push(0x3C);
        let status = NetworkStatus::parse(&payload).unwrap();
        assert!(status.is_up());
        assert_eq!(status.channel, 15);
        assert_eq!(status.pan_id, 0xABCD);
        assert_eq!(status.permit_join_time, 60);
        assert!(NetworkStatus::parse(&payload[..15]).is_none());
    }

    #[test]
    fn parses_startup_sync() {
        let sync = StartupSync::parse(&[0x00, 0x01]).unwrap();
        assert_eq!(sync.running_state, RunningState::Starting);
        assert_eq!(sync.config_state, ConfigState::NeedsEndpointConfig);
        assert_eq!(
            StartupSync::parse(&[0x01, 0x07]).unwrap().config_state,
            ConfigState::Other(7)
        );
        assert!(StartupSync::parse(&[0x00]).is_none());
    }

    #[test]
    fn parses_trust_center_update() {
        let mut payload = vec![0x34, 0x12];
        payload.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        payload.extend_from_slice(&[TRUST_CENTER_EVENT_LEFT, 0x00, 0x00]);
        let update = TrustCenterUpdate::parse(&payload).unwrap();
        assert_eq!(update.node_id, 0x1234);
        assert!(update.is_leave());
    }
}
