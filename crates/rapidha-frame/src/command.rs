//! Known RapidHA command identifiers.
//!
//! The primary byte selects the command group, the secondary byte the
//! command within it. This table names the opcodes the driver itself uses
//! and the ones worth labelling in diagnostics; it is not a payload
//! catalogue, and unknown ids pass through the driver untouched.

/// Utility group (module info, reset, startup handshake).
pub const GROUP_UTILITY: u8 = 0x55;
/// Network commissioning group.
pub const GROUP_NETWORK: u8 = 0x01;
/// Device and endpoint configuration group.
pub const GROUP_CONFIGURATION: u8 = 0x03;
/// ZCL messaging group.
pub const GROUP_ZCL: u8 = 0x05;
/// OTA upgrade group.
pub const GROUP_OTA: u8 = 0xB0;

// Host to module.
pub const RESET: u16 = 0x5500;
pub const MODULE_INFO_REQUEST: u16 = 0x5502;
pub const BOOTLOADER_VERSION_REQUEST: u16 = 0x5504;
pub const APPLICATION_VERSION_COUNT_REQUEST: u16 = 0x5506;
pub const APPLICATION_VERSION_REQUEST: u16 = 0x5508;
pub const RESTORE_DEFAULTS: u16 = 0x5510;
pub const HOST_STARTUP_READY: u16 = 0x5520;
pub const STARTUP_SYNC_COMPLETE: u16 = 0x5522;
pub const SERIAL_ACK_CONFIG_WRITE: u16 = 0x5530;
pub const SERIAL_ACK_CONFIG_READ: u16 = 0x5531;
pub const JOIN_NETWORK: u16 = 0x0100;
pub const FORM_NETWORK: u16 = 0x0101;
pub const PERMIT_JOIN: u16 = 0x0103;
pub const LEAVE_NETWORK: u16 = 0x0104;
pub const REJOIN_NETWORK: u16 = 0x0105;
pub const NETWORK_STATUS_REQUEST: u16 = 0x0108;
pub const NETWORK_AUTO_JOIN: u16 = 0x0111;
pub const NETWORK_RESET_AUTO_JOIN: u16 = 0x0112;
pub const DEVICE_TYPE_WRITE: u16 = 0x0300;
pub const ADD_ENDPOINT: u16 = 0x0310;
pub const ENDPOINT_LIST_REQUEST: u16 = 0x0311;
pub const ADD_ATTRIBUTES_TO_CLUSTER: u16 = 0x0320;
pub const CLEAR_ENDPOINT_CONFIG: u16 = 0x0330;
pub const SEND_ZCL_UNICAST: u16 = 0x0500;
pub const SEND_ZCL_MULTICAST: u16 = 0x0501;
pub const SEND_ZCL_BROADCAST: u16 = 0x0502;
pub const APS_ZCL_ACK: u16 = 0x0510;
pub const READ_ATTRIBUTE_REQUEST: u16 = 0x0530;
pub const WRITE_ATTRIBUTE_REQUEST: u16 = 0x0532;
pub const OTA_IMAGE_NOTIFY: u16 = 0xB000;
pub const OTA_IMAGE_BLOCK_RESPONSE: u16 = 0xB005;
pub const OTA_UPGRADE_END_RESPONSE: u16 = 0xB007;

// Module to host.
pub const MODULE_INFO_RESPONSE: u16 = 0x5503;
pub const BOOTLOADER_VERSION_RESPONSE: u16 = 0x5505;
pub const APPLICATION_VERSION_COUNT_RESPONSE: u16 = 0x5507;
pub const APPLICATION_VERSION_RESPONSE: u16 = 0x5509;
pub const STARTUP_SYNC: u16 = 0x5521;
pub const SERIAL_ACK_CONFIG_RESPONSE: u16 = 0x5532;
pub const STATUS_RESPONSE: u16 = 0x5580;
pub const ERROR: u16 = 0x55E0;
pub const NETWORK_STATUS_RESPONSE: u16 = 0x0109;
pub const TRUST_CENTER_DEVICE_UPDATE: u16 = 0x0110;
pub const ENDPOINT_LIST_RESPONSE: u16 = 0x0312;
pub const SEND_ZCL_RESPONSE: u16 = 0x0503;
pub const READ_ATTRIBUTE_RESPONSE: u16 = 0x0531;
pub const WRITE_ATTRIBUTE_RESPONSE: u16 = 0x0533;
pub const OTA_QUERY_NEXT_IMAGE_REQUEST: u16 = 0xB001;
pub const OTA_IMAGE_BLOCK_REQUEST: u16 = 0xB003;
pub const OTA_UPGRADE_END_REQUEST: u16 = 0xB006;

/// Which side of the link originates a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HostToModule,
    ModuleToHost,
}

/// Returns a human-readable name for a command id.
pub fn command_name(id: u16) -> &'static str {
    match id {
        RESET => "reset",
        MODULE_INFO_REQUEST => "module_info_request",
        BOOTLOADER_VERSION_REQUEST => "bootloader_version_request",
        APPLICATION_VERSION_COUNT_REQUEST => "application_version_count_request",
        APPLICATION_VERSION_REQUEST => "application_version_request",
        RESTORE_DEFAULTS => "restore_defaults",
        HOST_STARTUP_READY => "host_startup_ready",
        STARTUP_SYNC_COMPLETE => "startup_sync_complete",
        SERIAL_ACK_CONFIG_WRITE => "serial_ack_config_write",
        SERIAL_ACK_CONFIG_READ => "serial_ack_config_read",
        JOIN_NETWORK => "join_network",
        FORM_NETWORK => "form_network",
        PERMIT_JOIN => "permit_join",
        LEAVE_NETWORK => "leave_network",
        REJOIN_NETWORK => "rejoin_network",
        NETWORK_STATUS_REQUEST => "network_status_request",
        NETWORK_AUTO_JOIN => "network_auto_join",
        NETWORK_RESET_AUTO_JOIN => "network_reset_auto_join",
        DEVICE_TYPE_WRITE => "device_type_write",
        ADD_ENDPOINT => "add_endpoint",
        ENDPOINT_LIST_REQUEST => "endpoint_list_request",
        ADD_ATTRIBUTES_TO_CLUSTER => "add_attributes_to_cluster",
        CLEAR_ENDPOINT_CONFIG => "clear_endpoint_config",
        SEND_ZCL_UNICAST => "send_zcl_unicast",
        SEND_ZCL_MULTICAST => "send_zcl_multicast",
        SEND_ZCL_BROADCAST => "send_zcl_broadcast",
        APS_ZCL_ACK => "aps_zcl_ack",
        READ_ATTRIBUTE_REQUEST => "read_attribute_request",
        WRITE_ATTRIBUTE_REQUEST => "write_attribute_request",
        OTA_IMAGE_NOTIFY => "ota_image_notify",
        OTA_IMAGE_BLOCK_RESPONSE => "ota_image_block_response",
        OTA_UPGRADE_END_RESPONSE => "ota_upgrade_end_response",
        MODULE_INFO_RESPONSE => "module_info_response",
        BOOTLOADER_VERSION_RESPONSE => "bootloader_version_response",
        APPLICATION_VERSION_COUNT_RESPONSE => "application_version_count_response",
        APPLICATION_VERSION_RESPONSE => "application_version_response",
        STARTUP_SYNC => "startup_sync",
        SERIAL_ACK_CONFIG_RESPONSE => "serial_ack_config_response",
        STATUS_RESPONSE => "status_response",
        ERROR => "error",
        NETWORK_STATUS_RESPONSE => "network_status_response",
        TRUST_CENTER_DEVICE_UPDATE => "trust_center_device_update",
        ENDPOINT_LIST_RESPONSE => "endpoint_list_response",
        SEND_ZCL_RESPONSE => "send_zcl_response",
        READ_ATTRIBUTE_RESPONSE => "read_attribute_response",
        WRITE_ATTRIBUTE_RESPONSE => "write_attribute_response",
        OTA_QUERY_NEXT_IMAGE_REQUEST => "ota_query_next_image_request",
        OTA_IMAGE_BLOCK_REQUEST => "ota_image_block_request",
        OTA_UPGRADE_END_REQUEST => "ota_upgrade_end_request",
        _ => "unknown",
    }
}

/// Which side sends `id`, if it is a known command.
pub fn direction(id: u16) -> Option<Direction> {
    match id {
        MODULE_INFO_RESPONSE
        | BOOTLOADER_VERSION_RESPONSE
        | APPLICATION_VERSION_COUNT_RESPONSE
        | APPLICATION_VERSION_RESPONSE
        | STARTUP_SYNC
        | SERIAL_ACK_CONFIG_RESPONSE
        | STATUS_RESPONSE
        | ERROR
        | NETWORK_STATUS_RESPONSE
        | TRUST_CENTER_DEVICE_UPDATE
        | ENDPOINT_LIST_RESPONSE
        | SEND_ZCL_RESPONSE
        | READ_ATTRIBUTE_RESPONSE
        | WRITE_ATTRIBUTE_RESPONSE
        | OTA_QUERY_NEXT_IMAGE_REQUEST
        | OTA_IMAGE_BLOCK_REQUEST
        | OTA_UPGRADE_END_REQUEST => Some(Direction::ModuleToHost),
        _ if command_name(id) != "unknown" => Some(Direction::HostToModule),
        _ => None,
    }
}

/// Returns true if `id` is a known module-to-host command.
pub fn is_response(id: u16) -> bool {
    direction(id) == Some(Direction::ModuleToHost)
}

/// Build a command id from its primary and secondary bytes.
pub const fn command_id(primary: u8, secondary: u8) -> u16 {
    ((primary as u16) << 8) | secondary as u16
}
