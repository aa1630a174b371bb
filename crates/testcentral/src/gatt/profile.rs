//! The fixed TestCentral GATT profile
//!
//! Identifiers here must match what existing centrals and test tools expect.

use super::builder::{ServiceBuilder, ServiceDefinition};
use super::handlers::CharacteristicHandlers;
use super::types::{ReadRequest, SubscriptionHandler, WriteKind, WriteRequest};
use crate::uuid::Uuid;
use std::sync::Arc;
use std::time::Duration;

/// Local name put in the advertisement
pub const LOCAL_NAME: &str = "TestCentral";

/// Vendor service
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x00010000_F0F0_5555_AAAA_ADECAFC0FFEE);
/// Readable (timestamp) and writable without response
pub const READ_WRITE_UUID: Uuid = Uuid::from_u128(0x00010001_F0F0_5555_AAAA_ADECAFC0FFEE);
/// Readable device information
pub const READ_ONLY_UUID: Uuid = Uuid::from_u128(0x00010002_F0F0_5555_AAAA_ADECAFC0FFEE);
/// Heartbeat notifications
pub const NOTIFY_UUID: Uuid = Uuid::from_u128(0x00010003_F0F0_5555_AAAA_ADECAFC0FFEE);
/// Writable without response
pub const WRITE_ONLY_UUID: Uuid = Uuid::from_u128(0x00010004_F0F0_5555_AAAA_ADECAFC0FFEE);

pub const DEVICE_NAME: &str = "TestDevice";
pub const DEVICE_ID: &str = "00000001-0001-0001-0001-000000000001";

/// Heartbeat period while a central is subscribed
pub const NOTIFY_PERIOD: Duration = Duration::from_secs(2);

/// Payload of the manually triggered notification
pub const MANUAL_NOTIFY_PAYLOAD: &[u8] = b"1234";

/// Builds the TestCentral service, binding `handlers` to the four
/// characteristics and `on_subscribe` to the notify characteristic.
pub fn service_definition(
    handlers: &Arc<CharacteristicHandlers>,
    on_subscribe: SubscriptionHandler,
) -> ServiceDefinition {
    let rw_read = handlers.clone();
    let rw_write = handlers.clone();
    let ro_read = handlers.clone();
    let wo_write = handlers.clone();

    ServiceBuilder::new(SERVICE_UUID, true)
        .characteristic(READ_WRITE_UUID, |c| {
            c.on_write(
                Arc::new(move |req: &WriteRequest| rw_write.read_write_write(req)),
                WriteKind::WithoutResponse,
            )
            .on_read(Arc::new(move |req: &ReadRequest| rw_read.read_write_read(req)))
        })
        .characteristic(READ_ONLY_UUID, |c| {
            c.on_read(Arc::new(move |req: &ReadRequest| ro_read.read_only_read(req)))
        })
        .characteristic(NOTIFY_UUID, |c| c.on_subscribe(on_subscribe))
        .characteristic(WRITE_ONLY_UUID, |c| {
            c.on_write(
                Arc::new(move |req: &WriteRequest| wo_write.write_only_write(req)),
                WriteKind::WithoutResponse,
            )
        })
        .build()
}
