//! Service and characteristic builders
//!
//! A [`ServiceBuilder`] collects characteristics together with the handlers
//! bound to them. The resulting [`ServiceDefinition`] is handed to a
//! transport, which allocates attribute handles and routes requests back to
//! the handlers.

use super::types::{
    CharacteristicProperties, ReadHandler, SubscriptionHandler, WriteHandler, WriteKind,
};
use crate::uuid::Uuid;
use std::fmt;

/// A characteristic and the callbacks bound to it
#[derive(Clone)]
pub struct CharacteristicDefinition {
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
    pub on_read: Option<ReadHandler>,
    pub on_write: Option<WriteHandler>,
    pub on_subscribe: Option<SubscriptionHandler>,
}

impl fmt::Debug for CharacteristicDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CharacteristicDefinition")
            .field("uuid", &self.uuid)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// A service ready to be registered with a transport
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    pub uuid: Uuid,
    pub is_primary: bool,
    pub characteristics: Vec<CharacteristicDefinition>,
}

/// Configures a single characteristic; each binding enables the matching
/// property.
pub struct CharacteristicBuilder {
    definition: CharacteristicDefinition,
}

impl CharacteristicBuilder {
    fn new(uuid: Uuid) -> Self {
        Self {
            definition: CharacteristicDefinition {
                uuid,
                properties: CharacteristicProperties::empty(),
                on_read: None,
                on_write: None,
                on_subscribe: None,
            },
        }
    }

    pub fn on_read(mut self, handler: ReadHandler) -> Self {
        self.definition.properties |= CharacteristicProperties::READ;
        self.definition.on_read = Some(handler);
        self
    }

    pub fn on_write(mut self, handler: WriteHandler, kind: WriteKind) -> Self {
        self.definition.properties |= kind.property();
        self.definition.on_write = Some(handler);
        self
    }

    pub fn on_subscribe(mut self, handler: SubscriptionHandler) -> Self {
        self.definition.properties |= CharacteristicProperties::NOTIFY;
        self.definition.on_subscribe = Some(handler);
        self
    }
}

/// Builds a [`ServiceDefinition`]
pub struct ServiceBuilder {
    definition: ServiceDefinition,
}

impl ServiceBuilder {
    pub fn new(uuid: Uuid, is_primary: bool) -> Self {
        Self {
            definition: ServiceDefinition {
                uuid,
                is_primary,
                characteristics: Vec::new(),
            },
        }
    }

    /// Adds a characteristic configured by `configure`
    pub fn characteristic<F>(mut self, uuid: Uuid, configure: F) -> Self
    where
        F: FnOnce(CharacteristicBuilder) -> CharacteristicBuilder,
    {
        let builder = configure(CharacteristicBuilder::new(uuid));
        self.definition.characteristics.push(builder.definition);
        self
    }

    pub fn build(self) -> ServiceDefinition {
        self.definition
    }
}
