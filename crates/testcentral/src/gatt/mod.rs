//! GATT (Generic Attribute Profile) server side
//!
//! This module provides the characteristic model, the builder used to
//! describe services to a transport, the request handlers and the fixed
//! TestCentral profile.

pub mod builder;
pub mod handlers;
pub mod profile;
pub mod types;


pub use builder::{
    CharacteristicBuilder, CharacteristicDefinition, ServiceBuilder, ServiceDefinition,
};
pub use handlers::CharacteristicHandlers;
pub use types::{
    CharacteristicHandle, CharacteristicProperties, GattStatus, ReadHandler, ReadRequest,
    ReadResult, RegisteredService, SubscriptionHandler, WriteHandler, WriteKind, WriteRequest,
};
