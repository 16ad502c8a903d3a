//! Host-issued commands and the per-command result field table.

use serde::{Deserialize, Serialize};

use super::error::{FmsError, Result};
use super::header::Header;
use super::transfer::TransferKind;
use super::types::{
    CMD_DB_DELETE_ALL, CMD_FP_DELETE, CMD_FP_IDENTIFY, CMD_FP_REGISTER_END, CMD_FP_REGISTER_START, CMD_FP_VERIFY,
    CMD_GET_IMAGE, CMD_GET_MATCH_SCORE, CMD_GET_TEMPLATE, CMD_GET_VERSION, CMD_SET_POWER_OFF_TIME, USER_ID_MAX,
    USER_ID_MIN, WSQ_BITRATE_5_TO_1, WSQ_BITRATE_15_TO_1, WSQ_REQUEST_FLAG,
};
use crate::image::ImageSize;

/// WSQ compression ratio requested from the reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WsqBitrate {
    /// 2.25 bpp
    #[default]
    FiveToOne,
    /// 0.75 bpp
    FifteenToOne,
}

impl WsqBitrate {
    pub fn code(self) -> u8 {
        match self {
            Self::FiveToOne => WSQ_BITRATE_5_TO_1,
            Self::FifteenToOne => WSQ_BITRATE_15_TO_1,
        }
    }
}

/// Options for an image capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureOptions {
    pub size: ImageSize,
    /// `None` requests a raw image.
    pub wsq: Option<WsqBitrate>,
}

/// A command the session can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    GetVersion,
    Capture(CaptureOptions),
    RegisterStart { user_id: u16, is_admin: bool },
    RegisterEnd,
    Verify { user_id: u16 },
    /// Score the finger on the sensor against a stored user.
    Match { user_id: u16 },
    Identify,
    Delete { user_id: u16 },
    DeleteAll,
    GetTemplate { user_id: u16 },
    SetPowerOffTime { minutes: u16 },
}

impl Command {
    pub fn code(&self) -> u8 {
        match self {
            Self::GetVersion => CMD_GET_VERSION,
            Self::Capture(_) => CMD_GET_IMAGE,
            Self::RegisterStart { .. } => CMD_FP_REGISTER_START,
            Self::RegisterEnd => CMD_FP_REGISTER_END,
            Self::Verify { .. } => CMD_FP_VERIFY,
            Self::Match { .. } => CMD_GET_MATCH_SCORE,
            Self::Identify => CMD_FP_IDENTIFY,
            Self::Delete { .. } => CMD_FP_DELETE,
            Self::DeleteAll => CMD_DB_DELETE_ALL,
            Self::GetTemplate { .. } => CMD_GET_TEMPLATE,
            Self::SetPowerOffTime { .. } => CMD_SET_POWER_OFF_TIME,
        }
    }

    /// Pipeline that receives the response payload, if the command streams one.
    pub fn transfer_kind(&self) -> Option<TransferKind> {
        match self {
            Self::Capture(_) => Some(TransferKind::Image),
            Self::GetTemplate { .. } => Some(TransferKind::Template),
            _ => None,
        }
    }

    /// User id the command targets.
    pub fn user_id(&self) -> Option<u16> {
        match self {
            Self::RegisterStart { user_id, .. }
            | Self::Verify { user_id }
            | Self::Match { user_id }
            | Self::Delete { user_id }
            | Self::GetTemplate { user_id } => Some(*user_id),
            _ => None,
        }
    }

    /// Reject arguments the device would refuse.
    pub fn validate(&self) -> Result<()> {
        if let Some(user_id) = self.user_id() {
            if !(USER_ID_MIN..=USER_ID_MAX).contains(&user_id) {
                return Err(FmsError::InvalidUserId(user_id));
            }
        }
        Ok(())
    }

    /// Build the request header.
    pub fn to_header(&self) -> Header {
        match *self {
            Self::Capture(CaptureOptions { size, wsq }) => {
                let size_code: u16 = match size.device_size() {
                    ImageSize::Full => 0x00,
                    _ => 0x01,
                };
                let (param1, param2) = match wsq {
                    Some(bitrate) => (
                        (u16::from(WSQ_REQUEST_FLAG) << 8) | size_code,
                        u16::from(bitrate.code()) << 8,
                    ),
                    None => (size_code, 0),
                };
                Header::request(self.code(), param1 as i16, param2 as i16)
            }
            Self::RegisterStart { user_id, is_admin } => {
                Header::request(self.code(), user_id as i16, i16::from(is_admin))
            }
            Self::Verify { user_id }
            | Self::Match { user_id }
            | Self::Delete { user_id }
            | Self::GetTemplate { user_id } => {
                Header::request(self.code(), user_id as i16, 0)
            }
            Self::SetPowerOffTime { minutes } => Header::request(self.code(), minutes as i16, 0),
            Self::GetVersion | Self::RegisterEnd | Self::Identify | Self::DeleteAll => {
                Header::request(self.code(), 0, 0)
            }
        }
    }

    /// Short human-readable name used in messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetVersion => "Get version",
            Self::Capture(_) => "Capture",
            Self::RegisterStart { .. } => "Register",
            Self::RegisterEnd => "Complete registration",
            Self::Verify { .. } => "Verify",
            Self::Match { .. } => "Match",
            Self::Identify => "Identify",
            Self::Delete { .. } => "Delete",
            Self::DeleteAll => "Delete all",
            Self::GetTemplate { .. } => "Get template",
            Self::SetPowerOffTime { .. } => "Set power off time",
        }
    }
}

/// Meaning of param1/param2 in a response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultFields {
    /// param1 = matched user id, param2 = match score.
    UserAndScore,
    /// param1 = affected user id.
    User,
    /// param1 = version (major.minor bytes), param2 = firmware build.
    Version,
    None,
}

impl ResultFields {
    pub fn for_command(code: u8) -> Self {
        match code {
            CMD_FP_VERIFY | CMD_FP_IDENTIFY | CMD_GET_MATCH_SCORE => Self::UserAndScore,
            CMD_FP_DELETE | CMD_FP_REGISTER_START | CMD_FP_REGISTER_END => Self::User,
            CMD_GET_VERSION => Self::Version,
            _ => Self::None,
        }
    }
}
