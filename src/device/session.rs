use std::sync::Arc;
use futures::StreamExt;
use futures::channel::mpsc::UnboundedSender;
use log::{debug, error, info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::device::cipher::{bytes_to_hex, CipherLayer};
use crate::device::codec::{Command, CommandCodec, CommandPacket};
use crate::device::constants::{make_powerview_command_uuid, make_powerview_service_uuid};
use crate::device::status::decode_notification;
use crate::device::transport::{NotificationStream, Transport};
use crate::device::types::{ConnectionState, DeviceFilter, DeviceIdentity, FailureReason, SessionEvent, ShadeStatusSample};
use crate::error::SessionError;

fn emit(senders: &[UnboundedSender<SessionEvent>], event: SessionEvent) {
    for sender in senders {
        if let Err(err) = sender.unbounded_send(event.clone()) {
            debug!("Dropping session event, receiver is gone: {:?}", err.into_inner());
        }
    }
}

// Shared by `ConnectionSession::on_notification` and the background reader task.
// Decode failures are reported and swallowed; they never end the subscription.
fn handle_notification(
    cipher: &CipherLayer,
    identity: &DeviceIdentity,
    senders: &[UnboundedSender<SessionEvent>],
    frame: &[u8],
) -> Option<ShadeStatusSample> {
    debug!("{}: received status {}", identity.name, bytes_to_hex(frame));

    match decode_notification(cipher, frame) {
        Ok(sample) => {
            info!("{}: position {:.0}% (status 0x{:02x})", identity.name, sample.position_percent, sample.status_code);
            emit(senders, SessionEvent::Status(identity.clone(), sample));
            Some(sample)
        },
        Err(err) => {
            warn!("{}: discarding status notification: {}", identity.name, err);
            emit(senders, SessionEvent::Diagnostic(identity.clone(), format!("Error decoding status: {}", err)));
            None
        },
    }
}

fn read_notifications_task(
    cancel: CancellationToken,
    mut notification_stream: NotificationStream,
    cipher: CipherLayer,
    identity: DeviceIdentity,
    generation: u64,
    senders: Vec<UnboundedSender<SessionEvent>>,
) -> JoinHandle<()> {
    spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break;
                },
                frame = notification_stream.next() => match frame {
                    Some(frame) => {
                        handle_notification(&cipher, &identity, &senders, &frame);
                    },
                    None => {
                        warn!("{}: notification stream ended, link lost", identity.name);
                        emit(&senders, SessionEvent::LinkLost(identity.clone(), generation));
                        break;
                    },
                },
            }
        }
    })
}

/// One shade's connection: owns the link, the command characteristic and the reader task.
pub struct ConnectionSession<T: Transport> {
    transport: Arc<T>,
    cipher: CipherLayer,
    codec: CommandCodec,
    filter: DeviceFilter,
    identity: Option<DeviceIdentity>,
    state: ConnectionState,
    link: Option<T::Link>,
    characteristic: Option<T::Characteristic>,
    // set when the link went away without being asked to; allows the implicit reconnect
    link_lost: bool,
    // bumped for every established link so late events about an older one can be told apart
    link_generation: u64,
    senders: Vec<UnboundedSender<SessionEvent>>,
    notification_cancel: CancellationToken,
    notification_task: Option<JoinHandle<()>>,
}

impl<T: Transport> ConnectionSession<T> {
    pub fn new(transport: Arc<T>, cipher: CipherLayer, codec: CommandCodec, filter: DeviceFilter) -> Self {
        ConnectionSession {
            transport,
            cipher,
            codec,
            filter,
            identity: None,
            state: ConnectionState::Idle,
            link: None,
            characteristic: None,
            link_lost: false,
            link_generation: 0,
            senders: Vec::new(),
            notification_cancel: CancellationToken::new(),
            notification_task: None,
        }
    }

    /// A session for a shade that has been selected before. It starts out disconnected.
    pub fn with_identity(
        transport: Arc<T>,
        cipher: CipherLayer,
        codec: CommandCodec,
        filter: DeviceFilter,
        identity: DeviceIdentity,
    ) -> Self {
        let mut session = ConnectionSession::new(transport, cipher, codec, filter);
        session.identity = Some(identity);
        session.state = ConnectionState::Disconnected;
        session
    }

    pub fn add_event_sender(&mut self, sender: UnboundedSender<SessionEvent>) {
        self.senders.push(sender);
    }

    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn codec(&self) -> &CommandCodec {
        &self.codec
    }

    pub fn link_generation(&self) -> u64 {
        self.link_generation
    }

    fn label(&self) -> &str {
        self.identity.as_ref().map(|identity| identity.name.as_str()).unwrap_or("shade")
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }

        info!("{}: {} -> {}", self.label(), self.state, next);
        self.state = next;
        emit(&self.senders, SessionEvent::StateChanged(self.identity.clone(), next));
    }

    fn require_transition(&self, next: ConnectionState) -> Result<(), SessionError> {
        if self.state.can_transition_to(&next) {
            Ok(())
        } else {
            Err(SessionError::InvalidState { state: self.state.to_string() })
        }
    }

    fn diagnostic(&self, message: String) {
        info!("{}: {}", self.label(), message);
        if let Some(identity) = &self.identity {
            emit(&self.senders, SessionEvent::Diagnostic(identity.clone(), message));
        }
    }

    /// Ask the transport for a shade matching the filter. Cancelling the chooser is benign and
    /// puts the session back to idle.
    pub async fn scan(&mut self) -> Result<DeviceIdentity, SessionError> {
        self.require_transition(ConnectionState::Scanning)?;
        self.release().await;
        self.identity = None;
        self.set_state(ConnectionState::Scanning);

        match self.transport.request_device(&self.filter).await {
            Ok(identity) => {
                info!("Found device: {}", identity);
                self.identity = Some(identity.clone());
                Ok(identity)
            },
            Err(err) => {
                let err = SessionError::from(err);
                if err.is_benign() {
                    info!("No shades found or selection cancelled");
                    self.set_state(ConnectionState::Idle);
                } else {
                    warn!("Scan error: {}", err);
                    self.set_state(ConnectionState::Failed(err.failure_reason()));
                }
                Err(err)
            },
        }
    }

    /// Connect to the selected shade. From `Failed`/`Disconnected` this re-uses the identity
    /// found by an earlier scan.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        if self.identity.is_none() {
            return Err(SessionError::NoDeviceSelected);
        }
        self.require_transition(ConnectionState::Connecting)?;

        self.establish().await
    }

    async fn establish(&mut self) -> Result<(), SessionError> {
        self.set_state(ConnectionState::Connecting);

        match self.try_establish().await {
            Ok(()) => {
                self.link_lost = false;
                self.set_state(ConnectionState::Ready);
                info!("{}: ready to send commands", self.label());
                Ok(())
            },
            Err(err) => {
                error!("{}: connection error: {}", self.label(), err);
                self.release().await;
                self.set_state(ConnectionState::Failed(err.failure_reason()));
                Err(err)
            },
        }
    }

    async fn try_establish(&mut self) -> Result<(), SessionError> {
        let identity = self.identity.clone().ok_or(SessionError::NoDeviceSelected)?;

        info!("Connecting to {}...", identity);
        let link = self.transport.connect(&identity).await?;
        self.link = Some(link.clone());
        self.set_state(ConnectionState::DiscoveringServices);

        let services = self.transport.discover_services(&link).await?;
        self.diagnostic(format!("Found {} service(s):", services.len()));
        for service in &services {
            self.diagnostic(format!("  Service: {}", service.uuid));
            for characteristic in &service.characteristics {
                self.diagnostic(format!("    Characteristic: {}", characteristic));
            }
        }

        let service_uuid = make_powerview_service_uuid();
        let characteristic_uuid = make_powerview_command_uuid();
        let characteristic = match self.transport
            .get_writable_characteristic(&link, service_uuid, characteristic_uuid).await
        {
            Ok(characteristic) => characteristic,
            Err(err) => {
                // no fallback; the operator compares the dump above with the expected UUIDs
                self.diagnostic(format!(
                    "PowerView service {} / characteristic {} not found, see the discovered UUIDs above",
                    service_uuid, characteristic_uuid,
                ));
                return Err(err.into());
            },
        };

        let stream = self.transport.subscribe(&link, &characteristic).await?;
        self.link_generation += 1;
        self.notification_cancel = CancellationToken::new();
        self.notification_task = Some(read_notifications_task(
            self.notification_cancel.clone(),
            stream,
            self.cipher.clone(),
            identity,
            self.link_generation,
            self.senders.clone(),
        ));
        self.characteristic = Some(characteristic);

        Ok(())
    }

    fn may_reconnect(&self) -> bool {
        if self.identity.is_none() {
            return false;
        }

        match self.state {
            ConnectionState::Disconnected => self.link_lost,
            ConnectionState::Failed(FailureReason::LinkError) => true,
            _ => false,
        }
    }

    /// Make sure the link is usable, reconnecting at most once.
    async fn ensure_ready(&mut self) -> Result<(), SessionError> {
        if self.state.is_ready() {
            let linked = match &self.link {
                Some(link) => self.transport.is_linked(link).await,
                None => false,
            };
            if linked {
                return Ok(());
            }

            warn!("{}: link is gone", self.label());
            self.on_link_lost().await;
        }

        if !self.may_reconnect() {
            return Err(SessionError::NotConnected);
        }

        info!("{}: reconnecting to shade...", self.label());
        if let Err(err) = self.establish().await {
            warn!("{}: reconnect failed: {}", self.label(), err);
            return Err(SessionError::NotConnected);
        }

        Ok(())
    }

    /// Encrypt and write an already built packet. The packet's sequence number has been
    /// consumed whether or not the write goes through.
    pub async fn send_command(&mut self, packet: &CommandPacket) -> Result<(), SessionError> {
        self.ensure_ready().await?;

        let (link, characteristic) = match (&self.link, &self.characteristic) {
            (Some(link), Some(characteristic)) => (link.clone(), characteristic.clone()),
            _ => return Err(SessionError::NotConnected),
        };

        let plaintext = packet.to_bytes();
        debug!("{}: sending command {}", self.label(), bytes_to_hex(&plaintext));
        let frame = self.cipher.encrypt(&plaintext);
        debug!("{}: encrypted {}", self.label(), bytes_to_hex(&frame));

        if let Err(err) = self.transport.write(&link, &characteristic, &frame).await {
            let err = SessionError::from(err);
            warn!("{}: send error: {}", self.label(), err);

            // keep the displayed state honest
            if !self.transport.is_linked(&link).await {
                self.on_link_lost().await;
            }
            return Err(err);
        }

        debug!("{}: command sent", self.label());
        Ok(())
    }

    /// Build `command` with this session's codec and send it.
    pub async fn send(&mut self, command: &Command) -> Result<(), SessionError> {
        let packet = self.codec.build(command);
        info!("{}: {}", self.label(), command);
        self.send_command(&packet).await
    }

    /// Decode one raw notification. Malformed frames are reported and dropped; the state is
    /// never touched.
    pub fn on_notification(&self, frame: &[u8]) -> Option<ShadeStatusSample> {
        let identity = self.identity.as_ref()?;
        handle_notification(&self.cipher, identity, &self.senders, frame)
    }

    /// The transport reported that the link dropped on its own.
    pub async fn on_link_lost(&mut self) {
        if !self.state.is_ready() {
            return;
        }

        self.release().await;
        self.link_lost = true;
        self.set_state(ConnectionState::Disconnected);
    }

    /// A `LinkLost` event arrived from the reader task of link `generation`. Events about a link
    /// that has since been replaced by a reconnect are ignored.
    pub async fn on_link_lost_event(&mut self, generation: u64) {
        if generation != self.link_generation {
            debug!(
                "{}: ignoring link loss of link {}, current link is {}",
                self.label(), generation, self.link_generation,
            );
            return;
        }

        self.on_link_lost().await;
    }

    /// Safe from any state and safe to repeat.
    pub async fn disconnect(&mut self) {
        let had_link = self.link.is_some();
        self.release().await;
        self.link_lost = false;

        if had_link {
            info!("{}: disconnected", self.label());
        }
        self.set_state(ConnectionState::Disconnected);
    }

    // Stop the reader task and give the link back to the transport.
    async fn release(&mut self) {
        self.notification_cancel.cancel();
        if let Some(handle) = self.notification_task.take() {
            if let Err(err) = handle.await {
                warn!("{}: read notifications task failed: {:?}", self.label(), err);
            }
        }

        self.characteristic = None;
        if let Some(link) = self.link.take() {
            self.transport.close(&link).await;
        }
    }
}
