//! FMS protocol constants for the Unity 20 BLE family.

// Command codes
pub const CMD_GET_VERSION: u8 = 0x05;
pub const CMD_SET_SYSTEM_INFO: u8 = 0x20;
pub const CMD_GET_SYSTEM_INFO: u8 = 0x30;
pub const CMD_GET_TEMPLATE: u8 = 0x40;
pub const CMD_GET_IMAGE: u8 = 0x43;
pub const CMD_FP_REGISTER_START: u8 = 0x50;
pub const CMD_FP_REGISTER_END: u8 = 0x51;
pub const CMD_FP_DELETE: u8 = 0x54;
pub const CMD_FP_VERIFY: u8 = 0x55;
pub const CMD_FP_IDENTIFY: u8 = 0x56;
pub const CMD_DB_DELETE_ALL: u8 = 0x76;
pub const CMD_FP_AUTO_IDENTIFY_START: u8 = 0xA1;
pub const CMD_FP_AUTO_IDENTIFY_STOP: u8 = 0xA2;
pub const CMD_INSTANT_VERIFY: u8 = 0xD0;
pub const CMD_REQUEST_CONNECT: u8 = 0xF0;
pub const CMD_SET_POWER_OFF_TIME: u8 = 0xF7;
pub const CMD_GET_MATCH_SCORE: u8 = 0xF9;

// Protocol constants
pub const HEADER_SIZE: usize = 12;
pub const PACKET_CLASS: u8 = 0x00;
/// First byte of a 12-byte "pull the next chunk" notification (`'N'`).
pub const NOTIFY_SENTINEL: u8 = 0x4E;

/// Largest image payload accepted by default (full-size raw 300x400).
pub const DEFAULT_MAX_IMAGE_SIZE: u32 = 300 * 400;
/// Largest template payload accepted by default.
pub const DEFAULT_MAX_TEMPLATE_SIZE: u32 = 4096;

/// Marker stored in the high byte of param1 when a WSQ image is requested.
pub const WSQ_REQUEST_FLAG: u8 = 0x01;
pub const WSQ_BITRATE_5_TO_1: u8 = 0x01;
pub const WSQ_BITRATE_15_TO_1: u8 = 0x02;

/// Valid user id range on the device database.
pub const USER_ID_MIN: u16 = 1;
pub const USER_ID_MAX: u16 = 999;

/// Byte offset of the four-byte template size inside a GET_TEMPLATE response header.
pub const TEMPLATE_SIZE_OFFSET: usize = 6;

/// Name of a command code, for logs and header dumps.
pub fn command_name(code: u8) -> Option<&'static str> {
    let name = match code {
        CMD_GET_VERSION => "GET_VERSION",
        CMD_SET_SYSTEM_INFO => "SET_SYSTEM_INFO",
        CMD_GET_SYSTEM_INFO => "GET_SYSTEM_INFO",
        CMD_GET_TEMPLATE => "GET_TEMPLATE",
        CMD_GET_IMAGE => "GET_IMAGE",
        CMD_FP_REGISTER_START => "FP_REGISTER_START",
        CMD_FP_REGISTER_END => "FP_REGISTER_END",
        CMD_FP_DELETE => "FP_DELETE",
        CMD_FP_VERIFY => "FP_VERIFY",
        CMD_FP_IDENTIFY => "FP_IDENTIFY",
        CMD_DB_DELETE_ALL => "DB_DELETE_ALL",
        CMD_FP_AUTO_IDENTIFY_START => "FP_AUTO_IDENTIFY_START",
        CMD_FP_AUTO_IDENTIFY_STOP => "FP_AUTO_IDENTIFY_STOP",
        CMD_INSTANT_VERIFY => "INSTANT_VERIFY",
        CMD_REQUEST_CONNECT => "REQUEST_CONNECT",
        CMD_SET_POWER_OFF_TIME => "SET_POWER_OFF_TIME",
        CMD_GET_MATCH_SCORE => "GET_MATCH_SCORE",
        _ => return None,
    };
    Some(name)
}
