//! In-memory transport
//!
//! `LoopbackTransport` plays both sides of the link: it implements
//! [`Transport`] for the server and exposes the actions a central would take
//! (reads, writes, subscribing) so the engine can be driven without a radio.
//! Every notification is recorded, and failures can be injected.

use super::{AdvertisementOptions, Transport, TransportError, TransportResult};
use crate::gatt::{
    CharacteristicDefinition, CharacteristicHandle, GattStatus, ReadRequest, ReadResult,
    RegisteredService, ServiceDefinition, WriteKind, WriteRequest,
};
use crate::uuid::Uuid;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, trace};

/// A notification as seen by subscribed centrals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub uuid: Uuid,
    pub value_handle: u16,
    pub value: Vec<u8>,
}

struct LoopbackCharacteristic {
    handle: CharacteristicHandle,
    definition: CharacteristicDefinition,
    subscribers: usize,
}

struct LoopbackService {
    registered: RegisteredService,
    characteristics: Vec<LoopbackCharacteristic>,
}

struct LoopbackState {
    /// Next attribute handle; never rewinds, so handles are not reused.
    /// `None` once every handle has been handed out.
    next_handle: Option<u16>,
    services: Vec<LoopbackService>,
    advertisement: Option<AdvertisementOptions>,
    registrations: usize,
    notifications: Vec<Notification>,
    fail_add_service: Option<String>,
    fail_advertising: Option<String>,
    notify_failures: usize,
}

impl LoopbackState {
    fn allocate_handle(&mut self) -> TransportResult<u16> {
        let handle = self.next_handle.ok_or(TransportError::HandlesExhausted)?;
        self.next_handle = handle.checked_add(1);
        Ok(handle)
    }

    fn find(&self, uuid: &Uuid) -> Option<&LoopbackCharacteristic> {
        self.services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.handle.uuid == *uuid)
    }

    fn find_mut(&mut self, uuid: &Uuid) -> Option<&mut LoopbackCharacteristic> {
        self.services
            .iter_mut()
            .flat_map(|s| s.characteristics.iter_mut())
            .find(|c| c.handle.uuid == *uuid)
    }

    fn is_registered(&self, handle: &CharacteristicHandle) -> bool {
        self.services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .any(|c| c.handle == *handle)
    }
}

/// In-memory [`Transport`] with a simulated central
pub struct LoopbackTransport {
    state: Mutex<LoopbackState>,
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LoopbackState {
                next_handle: Some(1),
                services: Vec::new(),
                advertisement: None,
                registrations: 0,
                notifications: Vec::new(),
                fail_add_service: None,
                fail_advertising: None,
                notify_failures: 0,
            }),
        }
    }

    pub fn is_advertising(&self) -> bool {
        self.state.lock().advertisement.is_some()
    }

    /// Options of the running advertisement, if any
    pub fn advertisement(&self) -> Option<AdvertisementOptions> {
        self.state.lock().advertisement.clone()
    }

    /// Currently registered services
    pub fn services(&self) -> Vec<RegisteredService> {
        self.state
            .lock()
            .services
            .iter()
            .map(|s| s.registered.clone())
            .collect()
    }

    /// Number of successful `add_service` calls so far
    pub fn registrations(&self) -> usize {
        self.state.lock().registrations
    }

    /// Every notification delivered so far
    pub fn notifications(&self) -> Vec<Notification> {
        self.state.lock().notifications.clone()
    }

    /// Drains the recorded notifications
    pub fn take_notifications(&self) -> Vec<Notification> {
        std::mem::take(&mut self.state.lock().notifications)
    }

    /// Makes the next `add_service` fail
    pub fn fail_next_add_service(&self, reason: impl Into<String>) {
        self.state.lock().fail_add_service = Some(reason.into());
    }

    /// Makes the next `start_advertising` fail
    pub fn fail_next_advertising(&self, reason: impl Into<String>) {
        self.state.lock().fail_advertising = Some(reason.into());
    }

    /// Makes the next `count` notifications fail
    pub fn fail_notifications(&self, count: usize) {
        self.state.lock().notify_failures = count;
    }

    /// Simulates a central reading a characteristic
    pub fn read(&self, uuid: &Uuid, offset: u16) -> TransportResult<ReadResult> {
        let handler = {
            let state = self.state.lock();
            let characteristic = state
                .find(uuid)
                .ok_or(TransportError::UnknownCharacteristic(*uuid))?;
            if !characteristic.handle.properties.can_read() {
                return Ok(ReadResult::error(GattStatus::ReadNotPermitted));
            }
            characteristic.definition.on_read.clone()
        };

        // Handlers run outside the lock, as they would on a stack's callback thread
        Ok(match handler {
            Some(handler) => handler(&ReadRequest {
                uuid: *uuid,
                offset,
            }),
            None => ReadResult::error(GattStatus::ReadNotPermitted),
        })
    }

    /// Simulates a central writing a characteristic
    pub fn write(&self, uuid: &Uuid, data: &[u8], kind: WriteKind) -> TransportResult<GattStatus> {
        let handler = {
            let state = self.state.lock();
            let characteristic = state
                .find(uuid)
                .ok_or(TransportError::UnknownCharacteristic(*uuid))?;
            if !characteristic.handle.properties.contains(kind.property()) {
                return Ok(GattStatus::WriteNotPermitted);
            }
            characteristic.definition.on_write.clone()
        };

        Ok(match handler {
            Some(handler) => handler(&WriteRequest {
                uuid: *uuid,
                offset: 0,
                kind,
                data: data.to_vec(),
            }),
            None => GattStatus::WriteNotPermitted,
        })
    }

    /// Simulates centrals enabling or disabling notifications until
    /// `count` are subscribed, then reports the count to the bound callback.
    pub fn set_subscribers(&self, uuid: &Uuid, count: usize) -> TransportResult<()> {
        let handler = {
            let mut state = self.state.lock();
            let characteristic = state
                .find_mut(uuid)
                .ok_or(TransportError::UnknownCharacteristic(*uuid))?;
            if !characteristic.handle.properties.can_notify() {
                return Err(TransportError::Registration(format!(
                    "{uuid} does not support notifications"
                )));
            }
            characteristic.subscribers = count;
            characteristic.definition.on_subscribe.clone()
        };

        debug!(%uuid, count, "subscriber count changed");
        if let Some(handler) = handler {
            handler(count);
        }
        Ok(())
    }

    /// Current subscriber count of a characteristic
    pub fn subscribers(&self, uuid: &Uuid) -> usize {
        self.state.lock().find(uuid).map_or(0, |c| c.subscribers)
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn clear_services(&self) -> TransportResult<()> {
        let mut state = self.state.lock();
        if !state.services.is_empty() {
            debug!(count = state.services.len(), "clearing services");
        }
        state.services.clear();
        Ok(())
    }

    async fn add_service(&self, service: ServiceDefinition) -> TransportResult<RegisteredService> {
        let mut state = self.state.lock();
        if let Some(reason) = state.fail_add_service.take() {
            return Err(TransportError::Registration(reason));
        }

        let start_handle = state.allocate_handle()?;
        let mut end_handle = start_handle;
        let mut characteristics = Vec::with_capacity(service.characteristics.len());

        for definition in service.characteristics {
            let declaration_handle = state.allocate_handle()?;
            let value_handle = state.allocate_handle()?;
            end_handle = value_handle;
            if definition.properties.can_notify() {
                // Client Characteristic Configuration descriptor
                end_handle = state.allocate_handle()?;
            }
            let handle = CharacteristicHandle {
                uuid: definition.uuid,
                declaration_handle,
                value_handle,
                properties: definition.properties,
            };
            characteristics.push(LoopbackCharacteristic {
                handle,
                definition,
                subscribers: 0,
            });
        }

        let registered = RegisteredService {
            uuid: service.uuid,
            is_primary: service.is_primary,
            start_handle,
            end_handle,
            characteristics: characteristics.iter().map(|c| c.handle).collect(),
        };
        debug!(
            uuid = %registered.uuid,
            start = start_handle,
            end = end_handle,
            "service registered"
        );

        state.services.push(LoopbackService {
            registered: registered.clone(),
            characteristics,
        });
        state.registrations += 1;
        Ok(registered)
    }

    async fn start_advertising(&self, options: &AdvertisementOptions) -> TransportResult<()> {
        let mut state = self.state.lock();
        if let Some(reason) = state.fail_advertising.take() {
            return Err(TransportError::Advertising(reason));
        }
        debug!(name = %options.local_name, "advertising");
        state.advertisement = Some(options.clone());
        Ok(())
    }

    async fn stop_advertising(&self) -> TransportResult<()> {
        self.state.lock().advertisement = None;
        Ok(())
    }

    async fn notify(
        &self,
        characteristic: &CharacteristicHandle,
        value: &[u8],
    ) -> TransportResult<()> {
        let mut state = self.state.lock();
        if !state.is_registered(characteristic) {
            return Err(TransportError::UnknownHandle(characteristic.value_handle));
        }
        if state.notify_failures > 0 {
            state.notify_failures -= 1;
            return Err(TransportError::Notify("injected failure".into()));
        }
        trace!(uuid = %characteristic.uuid, value = %hex::encode(value), "notify");
        state.notifications.push(Notification {
            uuid: characteristic.uuid,
            value_handle: characteristic.value_handle,
            value: value.to_vec(),
        });
        Ok(())
    }
}
