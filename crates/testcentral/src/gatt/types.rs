//! Common types for GATT server operations
//!
//! This module defines the request/response types exchanged with
//! characteristic handlers and the handles a transport hands back after
//! registering a service.

use crate::uuid::Uuid;
use bitflags::bitflags;
use std::sync::Arc;

bitflags! {
    /// Characteristic properties as defined in the Bluetooth specification
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CharacteristicProperties: u8 {
        const READ = 0x02;
        const WRITE_WITHOUT_RESPONSE = 0x04;
        const WRITE = 0x08;
        const NOTIFY = 0x10;
    }
}

impl CharacteristicProperties {
    pub fn can_read(&self) -> bool {
        self.contains(Self::READ)
    }

    pub fn can_notify(&self) -> bool {
        self.contains(Self::NOTIFY)
    }
}

/// How a central writes to a characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// Write request, acknowledged with a write response
    WithResponse,
    /// Write command, no acknowledgement on the air
    WithoutResponse,
}

impl WriteKind {
    pub fn property(self) -> CharacteristicProperties {
        match self {
            WriteKind::WithResponse => CharacteristicProperties::WRITE,
            WriteKind::WithoutResponse => CharacteristicProperties::WRITE_WITHOUT_RESPONSE,
        }
    }
}

/// ATT outcome of a read or write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GattStatus {
    Success,
    ReadNotPermitted,
    WriteNotPermitted,
}

/// An inbound read from a central
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    /// Characteristic being read
    pub uuid: Uuid,
    /// Offset requested by a long read
    pub offset: u16,
}

/// An inbound write from a central
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    /// Characteristic being written
    pub uuid: Uuid,
    pub offset: u16,
    pub kind: WriteKind,
    pub data: Vec<u8>,
}

/// Result of a read handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResult {
    pub status: GattStatus,
    pub data: Vec<u8>,
}

impl ReadResult {
    pub fn success(data: Vec<u8>) -> Self {
        Self {
            status: GattStatus::Success,
            data,
        }
    }

    pub fn error(status: GattStatus) -> Self {
        Self {
            status,
            data: Vec::new(),
        }
    }
}

/// Callback answering reads on a characteristic
pub type ReadHandler = Arc<dyn Fn(&ReadRequest) -> ReadResult + Send + Sync>;

/// Callback accepting writes on a characteristic
pub type WriteHandler = Arc<dyn Fn(&WriteRequest) -> GattStatus + Send + Sync>;

/// Callback receiving the current subscriber count of a notifiable characteristic
pub type SubscriptionHandler = Arc<dyn Fn(usize) + Send + Sync>;

/// A characteristic as registered by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicHandle {
    /// Characteristic UUID
    pub uuid: Uuid,
    /// Declaration handle
    pub declaration_handle: u16,
    /// Value handle, the target of reads, writes and notifications
    pub value_handle: u16,
    /// Characteristic properties
    pub properties: CharacteristicProperties,
}

/// A service as registered by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredService {
    /// Service UUID
    pub uuid: Uuid,
    /// Whether this is a primary or secondary service
    pub is_primary: bool,
    /// Start handle for this service
    pub start_handle: u16,
    /// End handle for this service
    pub end_handle: u16,
    /// Characteristics in registration order
    pub characteristics: Vec<CharacteristicHandle>,
}

impl RegisteredService {
    /// Finds a characteristic of this service by UUID
    pub fn characteristic(&self, uuid: &Uuid) -> Option<&CharacteristicHandle> {
        self.characteristics.iter().find(|c| c.uuid == *uuid)
    }
}
