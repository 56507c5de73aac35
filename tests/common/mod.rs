#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;
use futures::StreamExt;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use powerview_remote::device::cipher::CipherLayer;
use powerview_remote::device::codec::CommandCodec;
use powerview_remote::device::constants::{make_powerview_command_uuid, make_powerview_service_uuid};
use powerview_remote::device::session::ConnectionSession;
use powerview_remote::device::transport::{DiscoveredService, NotificationStream, Transport};
use powerview_remote::device::types::{DeviceFilter, DeviceIdentity, SessionEvent};
use powerview_remote::error::TransportError;

pub const KEY: &str = "0123456789abcdef0123456789abcdef";

#[derive(Default)]
pub struct MockState {
    pub devices: Vec<DeviceIdentity>,
    pub services: Vec<DiscoveredService>,
    pub linked: bool,
    pub fail_connect: bool,
    pub fail_write: bool,
    pub connect_calls: usize,
    pub close_calls: usize,
    pub writes: Vec<Vec<u8>>,
    pub notify: Option<UnboundedSender<Vec<u8>>>,
}

/// In-memory radio: one link at a time, writes are recorded.
#[derive(Default)]
pub struct MockTransport {
    pub state: Mutex<MockState>,
}

impl MockTransport {
    pub fn with_shade(identity: DeviceIdentity) -> Arc<Self> {
        let transport = MockTransport::default();
        {
            let mut state = transport.state.lock().unwrap();
            state.devices.push(identity);
            state.services = vec![
                DiscoveredService {
                    uuid: Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb),
                    characteristics: vec![Uuid::from_u128(0x00002a29_0000_1000_8000_00805f9b34fb)],
                },
                DiscoveredService {
                    uuid: make_powerview_service_uuid(),
                    characteristics: vec![make_powerview_command_uuid()],
                },
            ];
        }
        Arc::new(transport)
    }

    pub fn without_shades() -> Arc<Self> {
        Arc::new(MockTransport::default())
    }

    pub fn set_services(&self, services: Vec<DiscoveredService>) {
        self.state.lock().unwrap().services = services;
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.lock().unwrap().fail_connect = fail;
    }

    pub fn set_fail_write(&self, fail: bool) {
        self.state.lock().unwrap().fail_write = fail;
    }

    /// The shade walks away: the link drops and the notification stream ends.
    pub fn drop_link(&self) {
        let mut state = self.state.lock().unwrap();
        state.linked = false;
        state.notify = None;
    }

    /// The link drops but nobody is told.
    pub fn drop_link_silently(&self) {
        self.state.lock().unwrap().linked = false;
    }

    pub fn notify(&self, frame: Vec<u8>) {
        let state = self.state.lock().unwrap();
        state.notify.as_ref().expect("not subscribed").unbounded_send(frame).unwrap();
    }

    pub fn connect_calls(&self) -> usize {
        self.state.lock().unwrap().connect_calls
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().unwrap().close_calls
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().writes.clone()
    }
}

impl Transport for MockTransport {
    type Link = usize;
    type Characteristic = Uuid;

    async fn request_device(&self, filter: &DeviceFilter) -> Result<DeviceIdentity, TransportError> {
        let state = self.state.lock().unwrap();
        state.devices
            .iter()
            .find(|device| filter.matches(&device.id, &device.name))
            .cloned()
            .ok_or(TransportError::NoDeviceSelected)
    }

    async fn connect(&self, _identity: &DeviceIdentity) -> Result<usize, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.connect_calls += 1;
        if state.fail_connect {
            return Err(TransportError::Link("refused".to_string()));
        }
        state.linked = true;
        Ok(state.connect_calls)
    }

    async fn discover_services(&self, _link: &usize) -> Result<Vec<DiscoveredService>, TransportError> {
        Ok(self.state.lock().unwrap().services.clone())
    }

    async fn get_writable_characteristic(
        &self,
        _link: &usize,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Uuid, TransportError> {
        let state = self.state.lock().unwrap();
        state.services
            .iter()
            .filter(|s| s.uuid == service)
            .flat_map(|s| s.characteristics.iter())
            .find(|c| **c == characteristic)
            .copied()
            .ok_or(TransportError::ServiceNotFound { service, characteristic })
    }

    async fn subscribe(&self, _link: &usize, _characteristic: &Uuid) -> Result<NotificationStream, TransportError> {
        let (sender, receiver) = unbounded();
        self.state.lock().unwrap().notify = Some(sender);
        Ok(Box::pin(receiver))
    }

    async fn write(&self, _link: &usize, _characteristic: &Uuid, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if !state.linked || state.fail_write {
            return Err(TransportError::Write("write rejected".to_string()));
        }
        state.writes.push(bytes.to_vec());
        Ok(())
    }

    async fn is_linked(&self, _link: &usize) -> bool {
        self.state.lock().unwrap().linked
    }

    async fn close(&self, _link: &usize) {
        let mut state = self.state.lock().unwrap();
        state.close_calls += 1;
        state.linked = false;
        state.notify = None;
    }
}

pub fn cipher() -> CipherLayer {
    CipherLayer::from_hex(Some(KEY)).unwrap()
}

pub fn kitchen() -> DeviceIdentity {
    DeviceIdentity::new("AA:BB:CC:DD:EE:01", "DUE:Kitchen")
}

pub fn bedroom() -> DeviceIdentity {
    DeviceIdentity::new("AA:BB:CC:DD:EE:02", "DUE:Bedroom")
}

pub fn filter() -> DeviceFilter {
    DeviceFilter { name_prefix: "DUE".to_string(), service_hints: vec![], address: None }
}

pub fn new_session(transport: &Arc<MockTransport>) -> (ConnectionSession<MockTransport>, UnboundedReceiver<SessionEvent>) {
    let mut session = ConnectionSession::new(transport.clone(), cipher(), CommandCodec::new(), filter());
    let (sender, receiver) = unbounded();
    session.add_event_sender(sender);
    (session, receiver)
}

pub async fn ready_session(transport: &Arc<MockTransport>) -> (ConnectionSession<MockTransport>, UnboundedReceiver<SessionEvent>) {
    let (mut session, receiver) = new_session(transport);
    session.scan().await.unwrap();
    session.connect().await.unwrap();
    (session, receiver)
}

pub fn drain(receiver: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = receiver.try_next() {
        events.push(event);
    }
    events
}

/// Wait for the first event the reader task emits that `predicate` accepts.
pub async fn next_matching(
    receiver: &mut UnboundedReceiver<SessionEvent>,
    predicate: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = receiver.next().await.expect("event channel closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
