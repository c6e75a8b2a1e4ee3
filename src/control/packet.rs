// src/control/packet.rs

use serde::{Deserialize, Serialize};

use crate::control::frame::Frame;
use crate::errors::{HotswapError, Result};

pub const HEARTBEAT_REQUEST: u8 = 1;
pub const HEARTBEAT_RESPONSE: u8 = 2;
pub const CHANGE_TRACE_METHOD: u8 = 3;
pub const CLEAR_RUN_RESULT: u8 = 4;
pub const RELOAD_CLASS: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeTraceMethod {
    pub trace: bool,
    pub class_name: String,
    pub method_name: String,
    #[serde(default)]
    pub method_description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadClass {
    pub class_name: String,
    /// Loader scope; absent for the global scope.
    #[serde(default)]
    pub loader: Option<String>,
    /// File holding the new bytes.
    pub path: String,
}

/// Decoded control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    HeartbeatRequest,
    HeartbeatResponse,
    ChangeTraceMethod(ChangeTraceMethod),
    /// Clear a cached run result; an empty field clears every result.
    ClearRunResult { field: String },
    ReloadClass(ReloadClass),
}

impl Packet {
    pub fn code(&self) -> u8 {
        match self {
            Packet::HeartbeatRequest => HEARTBEAT_REQUEST,
            Packet::HeartbeatResponse => HEARTBEAT_RESPONSE,
            Packet::ChangeTraceMethod(_) => CHANGE_TRACE_METHOD,
            Packet::ClearRunResult { .. } => CLEAR_RUN_RESULT,
            Packet::ReloadClass(_) => RELOAD_CLASS,
        }
    }

    pub fn to_frame(&self) -> Result<Frame> {
        let payload = match self {
            Packet::HeartbeatRequest | Packet::HeartbeatResponse => Vec::new(),
            Packet::ChangeTraceMethod(body) => serde_json::to_vec(body)?,
            Packet::ClearRunResult { field } => field.as_bytes().to_vec(),
            Packet::ReloadClass(body) => serde_json::to_vec(body)?,
        };
        Ok(Frame::new(self.code(), payload))
    }

    pub fn from_frame(frame: &Frame) -> Result<Packet> {
        let packet = match frame.code {
            HEARTBEAT_REQUEST => Packet::HeartbeatRequest,
            HEARTBEAT_RESPONSE => Packet::HeartbeatResponse,
            CHANGE_TRACE_METHOD => Packet::ChangeTraceMethod(serde_json::from_slice(&frame.payload)?),
            CLEAR_RUN_RESULT => {
                let field = std::str::from_utf8(&frame.payload)
                    .map_err(|e| HotswapError::Protocol(format!("clear-run-result payload: {e}")))?;
                Packet::ClearRunResult {
                    field: field.to_string(),
                }
            }
            RELOAD_CLASS => Packet::ReloadClass(serde_json::from_slice(&frame.payload)?),
            other => {
                return Err(HotswapError::Protocol(format!(
                    "unknown command code {other}"
                )));
            }
        };
        Ok(packet)
    }
}
