use std::fmt;
use uuid::Uuid;

/// A shade as identified by the transport. Stable for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub id: String,
    pub name: String,
}

impl DeviceIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        DeviceIdentity { id: id.into(), name: name.into() }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// What to look for when requesting a device from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFilter {
    pub name_prefix: String,
    pub service_hints: Vec<Uuid>,
    // restrict the match to a known peripheral id/address
    pub address: Option<String>,
}

impl DeviceFilter {
    pub fn matches(&self, id: &str, name: &str) -> bool {
        if let Some(address) = &self.address {
            return id.eq_ignore_ascii_case(address);
        }

        name.starts_with(&self.name_prefix)
    }

    /// Like [`DeviceFilter::matches`], but a shade advertising one of the hinted services also
    /// matches when its name does not carry the prefix.
    pub fn matches_advertisement(&self, id: &str, name: &str, services: &[Uuid]) -> bool {
        if self.matches(id, name) {
            return true;
        }

        self.address.is_none() && services.iter().any(|service| self.service_hints.contains(service))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    LinkError,
    ServiceNotFound,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            FailureReason::LinkError => "link error",
            FailureReason::ServiceNotFound => "service not found",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Scanning,
    AwaitingPairing,
    Connecting,
    DiscoveringServices,
    Ready,
    Disconnected,
    Failed(FailureReason),
}

impl ConnectionState {
    /// Whether the state machine permits moving from `self` to `next`.
    /// Every state may move to `Failed` and to `Disconnected` (disconnect is allowed from anywhere).
    pub fn can_transition_to(&self, next: &ConnectionState) -> bool {
        use ConnectionState::*;

        match (self, next) {
            (_, Failed(_)) | (_, Disconnected) => true,
            (Idle, Scanning) | (Disconnected, Scanning) | (Failed(_), Scanning) => true,
            // a cancelled chooser is benign and returns to idle
            (Scanning, Idle) => true,
            (Scanning, AwaitingPairing) | (AwaitingPairing, Connecting) => true,
            (Scanning, Connecting) | (Disconnected, Connecting) | (Failed(_), Connecting) => true,
            (Connecting, DiscoveringServices) => true,
            (DiscoveringServices, Ready) => true,
            _ => false,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectionState::Ready)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Scanning => write!(f, "scanning"),
            ConnectionState::AwaitingPairing => write!(f, "awaiting pairing"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::DiscoveringServices => write!(f, "discovering services"),
            ConnectionState::Ready => write!(f, "ready"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// Decoded from a single status notification, never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadeStatusSample {
    pub status_code: u8,
    pub position_percent: f32, // [0, 100]
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    // the identity is unknown until a shade has been selected
    StateChanged(Option<DeviceIdentity>, ConnectionState),
    Status(DeviceIdentity, ShadeStatusSample),
    Diagnostic(DeviceIdentity, String),
    // carries the generation of the link that went away, see `ConnectionSession::link_generation`
    LinkLost(DeviceIdentity, u64),
}
