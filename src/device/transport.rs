use std::future::Future;
use std::pin::Pin;
use futures::Stream;
use uuid::Uuid;

use crate::device::types::{DeviceFilter, DeviceIdentity};
use crate::error::TransportError;

/// Raw (still encrypted) values emitted by a subscribed characteristic.
/// The stream ends when the link goes away.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredService {
    pub uuid: Uuid,
    pub characteristics: Vec<Uuid>,
}

/// The radio stack a session talks through. Timeouts, if any, are the transport's business.
pub trait Transport {
    type Link: Clone + Send + Sync + 'static;
    type Characteristic: Clone + Send + Sync + 'static;

    fn request_device(&self, filter: &DeviceFilter)
        -> impl Future<Output = Result<DeviceIdentity, TransportError>>;

    fn connect(&self, identity: &DeviceIdentity)
        -> impl Future<Output = Result<Self::Link, TransportError>>;

    fn discover_services(&self, link: &Self::Link)
        -> impl Future<Output = Result<Vec<DiscoveredService>, TransportError>>;

    fn get_writable_characteristic(&self, link: &Self::Link, service: Uuid, characteristic: Uuid)
        -> impl Future<Output = Result<Self::Characteristic, TransportError>>;

    fn subscribe(&self, link: &Self::Link, characteristic: &Self::Characteristic)
        -> impl Future<Output = Result<NotificationStream, TransportError>>;

    fn write(&self, link: &Self::Link, characteristic: &Self::Characteristic, bytes: &[u8])
        -> impl Future<Output = Result<(), TransportError>>;

    fn is_linked(&self, link: &Self::Link) -> impl Future<Output = bool>;

    fn close(&self, link: &Self::Link) -> impl Future<Output = ()>;
}
