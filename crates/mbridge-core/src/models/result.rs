//! Result items delivered by the device stack

use serde::{Deserialize, Serialize};

use super::{ItemPath, Value};

/// Interaction status codes used by result items
pub mod status {
    pub const SUCCESS: u8 = 0x00;
    pub const FAILURE: u8 = 0x01;
    pub const UNSUPPORTED_COMMAND: u8 = 0x81;
    pub const UNSUPPORTED_ATTRIBUTE: u8 = 0x86;
    pub const UNSUPPORTED_WRITE: u8 = 0x88;
    pub const UNSUPPORTED_EVENT: u8 = 0xC7;
}

/// One result delivered for one path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    pub path: ItemPath,
    pub payload: Value,
    pub status: u8,
}

impl ResultItem {
    pub fn new(path: ItemPath, payload: Value, status: u8) -> Self {
        Self {
            path,
            payload,
            status,
        }
    }

    /// Successful item carrying a payload
    pub fn ok(path: ItemPath, payload: Value) -> Self {
        Self::new(path, payload, status::SUCCESS)
    }

    /// Failed item with a null payload
    pub fn failed(path: ItemPath, status: u8) -> Self {
        Self::new(path, Value::Null, status)
    }

    pub fn is_success(&self) -> bool {
        self.status == status::SUCCESS
    }
}
