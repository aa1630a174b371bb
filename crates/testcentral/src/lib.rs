//! TestCentral - a BLE peripheral / GATT server engine
//!
//! This library advertises a peripheral that exposes one fixed vendor service
//! with four characteristics (read/write, read-only, notify and write-only),
//! and pushes a heartbeat notification to subscribed centrals while anyone is
//! listening. The radio stack itself sits behind the [`Transport`] trait; an
//! in-memory [`LoopbackTransport`] is provided for simulation and tests.

pub mod clock;
pub mod config;
pub mod error;
pub mod gatt;
pub mod server;
pub mod transport;
pub mod uuid;

// Re-export common types for convenience
pub use clock::TickClock;
pub use config::{ConfigError, PeripheralConfig};
pub use error::{Error, Result};
pub use gatt::{
    CharacteristicHandle, CharacteristicHandlers, CharacteristicProperties, GattStatus,
    ReadRequest, ReadResult, RegisteredService, ServiceBuilder, WriteKind, WriteRequest,
};
pub use server::{GattServer, ServerEvent, ServerState, ServerStatus, SubscriptionTracker};
pub use transport::{
    AdvertisementOptions, LoopbackTransport, Notification, Transport, TransportError,
    TransportResult,
};
pub use uuid::Uuid;
