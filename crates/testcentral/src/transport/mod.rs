//! Transport capability consumed by the GATT server
//!
//! A transport is whatever owns the radio: it registers services, routes
//! inbound reads and writes to the bound handlers, reports subscriber counts
//! and delivers notifications. The server never talks to the radio directly.

pub mod loopback;

use crate::gatt::{CharacteristicHandle, RegisteredService, ServiceDefinition};
use crate::uuid::Uuid;
use async_trait::async_trait;
use thiserror::Error;

pub use loopback::{LoopbackTransport, Notification};

/// Errors reported by a transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Service registration rejected: {0}")]
    Registration(String),

    #[error("Advertising failed: {0}")]
    Advertising(String),

    #[error("Notification failed: {0}")]
    Notify(String),

    #[error("Unknown characteristic handle 0x{0:04x}")]
    UnknownHandle(u16),

    #[error("Unknown characteristic {0}")]
    UnknownCharacteristic(Uuid),

    #[error("Attribute handles exhausted")]
    HandlesExhausted,
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Advertising parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementOptions {
    pub local_name: String,
    /// Service UUIDs included in the advertising data
    pub service_uuids: Vec<Uuid>,
}

/// Peripheral-role primitives provided by the BLE stack
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Removes every registered service. Idempotent.
    async fn clear_services(&self) -> TransportResult<()>;

    /// Registers a service and its characteristics, binding their handlers
    async fn add_service(&self, service: ServiceDefinition) -> TransportResult<RegisteredService>;

    async fn start_advertising(&self, options: &AdvertisementOptions) -> TransportResult<()>;

    async fn stop_advertising(&self) -> TransportResult<()>;

    /// Pushes `value` to every central subscribed to `characteristic`
    async fn notify(
        &self,
        characteristic: &CharacteristicHandle,
        value: &[u8],
    ) -> TransportResult<()>;
}
