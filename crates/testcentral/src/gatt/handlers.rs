//! Characteristic request handlers
//!
//! Every handler answers with success. Offsets are ignored and payload
//! contents are never validated; the transport segments long values itself.

use super::types::{GattStatus, ReadRequest, ReadResult, WriteRequest};
use crate::clock::TickClock;
use crate::error::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeviceInfo<'a> {
    device_name: &'a str,
    device_id: &'a str,
}

/// Read and write callbacks for the four TestCentral characteristics
#[derive(Debug)]
pub struct CharacteristicHandlers {
    clock: Arc<TickClock>,
    device_info: Vec<u8>,
}

impl CharacteristicHandlers {
    /// Creates the handler set, encoding the device information once
    pub fn new(clock: Arc<TickClock>, device_name: &str, device_id: &str) -> Result<Self> {
        let device_info = serde_json::to_vec(&DeviceInfo {
            device_name,
            device_id,
        })?;
        Ok(Self { clock, device_info })
    }

    /// Read/write characteristic: the current timestamp
    pub fn read_write_read(&self, request: &ReadRequest) -> ReadResult {
        debug!(offset = request.offset, "read/write characteristic read");
        ReadResult::success(self.clock.now_bytes().to_vec())
    }

    /// Read/write characteristic: accepts anything
    pub fn read_write_write(&self, request: &WriteRequest) -> GattStatus {
        info!(len = request.data.len(), "read/write characteristic write acknowledged");
        GattStatus::Success
    }

    /// Read-only characteristic: the device information JSON document
    pub fn read_only_read(&self, request: &ReadRequest) -> ReadResult {
        debug!(offset = request.offset, "device info read");
        ReadResult::success(self.device_info.clone())
    }

    /// Write-only characteristic: accepts anything
    pub fn write_only_write(&self, request: &WriteRequest) -> GattStatus {
        info!(len = request.data.len(), "write-only characteristic write acknowledged");
        GattStatus::Success
    }

    pub fn device_info(&self) -> &[u8] {
        &self.device_info
    }
}
