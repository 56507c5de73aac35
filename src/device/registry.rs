use indexmap::IndexMap;
use log::{info, warn};

use crate::device::codec::Command;
use crate::device::session::ConnectionSession;
use crate::device::transport::Transport;
use crate::device::types::{DeviceIdentity, SessionEvent};
use crate::error::{RegistryError, SessionError};

#[derive(Debug)]
pub struct BroadcastOutcome {
    pub identity: DeviceIdentity,
    pub result: Result<(), SessionError>,
}

/// The connected shades, at most one session per device, in the order they were added.
pub struct ShadeRegistry<T: Transport> {
    sessions: IndexMap<String, (DeviceIdentity, ConnectionSession<T>)>,
}

impl<T: Transport> Default for ShadeRegistry<T> {
    fn default() -> Self {
        ShadeRegistry { sessions: IndexMap::new() }
    }
}

impl<T: Transport> ShadeRegistry<T> {
    pub fn new() -> Self {
        ShadeRegistry::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, identity: &DeviceIdentity) -> bool {
        self.sessions.contains_key(&identity.id)
    }

    pub fn get_mut(&mut self, identity: &DeviceIdentity) -> Option<&mut ConnectionSession<T>> {
        self.sessions.get_mut(&identity.id).map(|(_, session)| session)
    }

    pub fn identities(&self) -> impl Iterator<Item = &DeviceIdentity> {
        self.sessions.values().map(|(identity, _)| identity)
    }

    /// Fails with `AlreadyRegistered` (handing the rejected session back) when the shade is
    /// already present. Callers should treat that as information, not an error.
    pub fn add(
        &mut self,
        identity: DeviceIdentity,
        session: ConnectionSession<T>,
    ) -> Result<(), (RegistryError, ConnectionSession<T>)> {
        if self.contains(&identity) {
            info!("Shade {} already in list", identity.name);
            return Err((RegistryError::AlreadyRegistered(identity), session));
        }

        info!("Added shade {}", identity);
        self.sessions.insert(identity.id.clone(), (identity, session));
        Ok(())
    }

    /// Disconnects and forgets a shade. Unknown shades are ignored.
    pub async fn remove(&mut self, identity: &DeviceIdentity) {
        if let Some((identity, mut session)) = self.sessions.shift_remove(&identity.id) {
            session.disconnect().await;
            info!("Removed shade {}", identity);
        }
    }

    /// Send `command` to every ready shade one after the other. A failing shade does not stop
    /// the others.
    pub async fn broadcast(&mut self, command: &Command) -> Vec<BroadcastOutcome> {
        let mut outcomes = Vec::new();

        for (identity, session) in self.sessions.values_mut() {
            if !session.state().is_ready() {
                info!("Skipping {} ({})", identity.name, session.state());
                continue;
            }

            let result = session.send(command).await;
            if let Err(err) = &result {
                warn!("Error controlling shade {}: {}", identity.name, err);
            }
            outcomes.push(BroadcastOutcome { identity: identity.clone(), result });
        }

        outcomes
    }

    /// Route transport-level events that need a state change to the owning session.
    pub async fn handle_event(&mut self, event: &SessionEvent) {
        if let SessionEvent::LinkLost(identity, generation) = event {
            if let Some(session) = self.get_mut(identity) {
                session.on_link_lost_event(*generation).await;
            }
        }
    }

    /// Disconnect everything at shutdown. Never fails.
    pub async fn teardown_all(&mut self) {
        for (_, (identity, mut session)) in self.sessions.drain(..) {
            session.disconnect().await;
            info!("Closed {}", identity.name);
        }
    }
}
