//! Events and result payloads emitted to the host application.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize, Serializer};

use super::error::Failure;
use super::transfer::TransferKind;

fn as_base64<T: AsRef<[u8]>, S: Serializer>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes.as_ref()))
}

/// Connected peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Downloading,
    Error,
    Complete,
}

/// Download progress of a streaming transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub status: ProgressStatus,
    pub message: String,
    pub progress: u8,
}

impl Progress {
    pub fn downloading(progress: u8, message: impl Into<String>) -> Self {
        Self {
            status: ProgressStatus::Downloading,
            message: message.into(),
            progress,
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self {
            status: ProgressStatus::Complete,
            message: message.into(),
            progress: 100,
        }
    }

    pub fn error(progress: u8, message: impl Into<String>) -> Self {
        Self {
            status: ProgressStatus::Error,
            message: message.into(),
            progress,
        }
    }
}

/// Finished image capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureComplete {
    pub success: bool,
    #[serde(serialize_with = "as_base64")]
    pub image_data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "isWSQ")]
    pub is_wsq: bool,
    /// Bytes received from the device.
    pub size: u32,
    pub message: String,
    pub elapsed_ms: u64,
}

/// Result of a single-shot command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandReply {
    #[serde(skip)]
    pub command: u8,
    pub message: String,
    #[serde(rename = "userID", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware: Option<String>,
}

/// Retrieved enrollment template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateReply {
    #[serde(rename = "userID")]
    pub user_id: u16,
    #[serde(serialize_with = "as_base64")]
    pub template: Vec<u8>,
    pub size: u32,
    pub message: String,
}

pub type CommandResult = std::result::Result<CommandReply, Failure>;
pub type CaptureResult = std::result::Result<CaptureComplete, Failure>;
pub type TemplateResult = std::result::Result<TemplateReply, Failure>;

impl Serialize for Failure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("success", &false)?;
        map.serialize_entry("message", &self.message)?;
        if let Some(user_id) = self.user_id {
            map.serialize_entry("userID", &user_id)?;
        }
        if let Some(code) = self.error.device_code() {
            map.serialize_entry("errorCode", &code)?;
        }
        map.end()
    }
}

/// Events pushed to the host, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum DeviceEvent {
    ConnectionStateChange {
        connected: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        device: Option<DeviceInfo>,
    },
    CaptureProgress(Progress),
    CaptureComplete(CaptureComplete),
    TemplateProgress(Progress),
    TemplateReceived(TemplateReply),
    /// Header nobody was waiting for.
    DataReceived {
        command: u8,
        #[serde(serialize_with = "as_base64")]
        data: Vec<u8>,
    },
}

impl DeviceEvent {
    pub fn progress(kind: TransferKind, progress: Progress) -> Self {
        match kind {
            TransferKind::Image => Self::CaptureProgress(progress),
            TransferKind::Template => Self::TemplateProgress(progress),
        }
    }
}

/// Host payload for a resolved operation, with the `success` flag.
pub fn report<T: Serialize>(result: &std::result::Result<T, Failure>) -> serde_json::Value {
    match result {
        Ok(value) => {
            let mut json = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
            if let Some(map) = json.as_object_mut() {
                map.insert("success".to_string(), serde_json::Value::Bool(true));
            }
            json
        }
        Err(failure) => serde_json::to_value(failure).unwrap_or(serde_json::Value::Null),
    }
}
