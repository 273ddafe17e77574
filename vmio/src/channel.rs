//! Logical connection to a dispatcher or VM process.
//!
//! A [`Channel`] wraps a [`Transport`] with a small state machine and a
//! validity flag. Both live behind one reader/writer lock so observers always
//! see a consistent pair. Sends on an invalid channel never reach the
//! transport; they return [`SendHandle::INVALID`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, warn};
use vmio_proto::{CommandId, Package};

use crate::routing::{Route, RoutingTable, SecurityLevel};
use crate::transport::{SendHandle, SendOutcome, Transport};

/// Lifecycle state of a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ChannelState {
    /// Not connected yet.
    #[default]
    Disabled,
    /// Connected and usable.
    Started,
    /// Disconnected; may be restarted.
    Stopped,
    /// The peer does not know the requested VM.
    UnknownPeer,
    /// The transport gave up connecting.
    ConnectionTimeout,
    /// The peer rejected the session.
    AuthenticationFailed,
}

impl ChannelState {
    /// Returns `true` for states no further transition leaves.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::UnknownPeer | Self::ConnectionTimeout | Self::AuthenticationFailed
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// `Disabled` is never re-entered. `Started` and `Stopped` move freely
    /// between each other and into any failure. Failures are final.
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (_, Self::Disabled) => false,
            (Self::Disabled | Self::Started | Self::Stopped, _) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disabled => "disabled",
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::UnknownPeer => "unknown-peer",
            Self::ConnectionTimeout => "connection-timeout",
            Self::AuthenticationFailed => "authentication-failed",
        })
    }
}

/// Transport held by a channel, either exclusively or shared.
#[non_exhaustive]
pub enum ChannelTransport {
    /// Owned by the channel and disconnected when it drops.
    Owned(Box<dyn Transport>),
    /// Shared with other owners and left running on drop.
    Shared(Arc<dyn Transport>),
}

impl ChannelTransport {
    /// Borrows the transport.
    fn get(&self) -> &dyn Transport {
        match self {
            Self::Owned(t) => t.as_ref(),
            Self::Shared(t) => t.as_ref(),
        }
    }
}

impl fmt::Debug for ChannelTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Owned(_) => "Owned(..)",
            Self::Shared(_) => "Shared(..)",
        })
    }
}

impl From<Box<dyn Transport>> for ChannelTransport {
    fn from(t: Box<dyn Transport>) -> Self {
        Self::Owned(t)
    }
}

impl From<Arc<dyn Transport>> for ChannelTransport {
    fn from(t: Arc<dyn Transport>) -> Self {
        Self::Shared(t)
    }
}

/// Validity flag and state, always read and written together.
#[derive(Debug, Clone, Copy, Default)]
struct Status {
    /// Whether sends may reach the transport.
    valid: bool,
    /// Current lifecycle state.
    state: ChannelState,
}

/// A connection to one peer.
#[derive(Debug)]
pub struct Channel {
    /// Underlying transport.
    transport: ChannelTransport,
    /// Routing policy for this channel's security level.
    routes: &'static RoutingTable,
    /// Security level the channel was built with.
    security: SecurityLevel,
    /// Validity and state.
    status: RwLock<Status>,
}

impl Channel {
    /// Creates a disabled, invalid channel over `transport`.
    pub fn new(transport: impl Into<ChannelTransport>, security: SecurityLevel) -> Self {
        Self {
            transport: transport.into(),
            routes: RoutingTable::client(security),
            security,
            status: RwLock::new(Status::default()),
        }
    }

    /// Starts connecting. The state stays `Disabled` until the transport
    /// reports back.
    pub fn enable(&self) {
        debug!(security = %self.security, "channel: connecting");
        self.transport.get().connect();
    }

    /// Starts disconnecting. Idempotent.
    pub fn disable(&self) {
        debug!("channel: disconnecting");
        self.transport.get().disconnect();
    }

    /// Whether sends currently reach the transport.
    pub fn is_valid(&self) -> bool {
        self.status.read().valid
    }

    /// Sets the validity flag.
    pub(crate) fn set_valid(&self, valid: bool) {
        self.status.write().valid = valid;
    }

    /// Current state.
    pub fn state(&self) -> ChannelState {
        self.status.read().state
    }

    /// Moves to `next` if the state machine allows it.
    ///
    /// Returns `true` if the state changed.
    pub(crate) fn set_state(&self, next: ChannelState) -> bool {
        let mut status = self.status.write();
        Self::apply(&mut status, next)
    }

    /// Sets validity and moves to `next` under a single write lock.
    ///
    /// Validity is always applied; the state only if the transition is
    /// allowed. Returns `true` if the state changed.
    pub(crate) fn set_status(&self, valid: bool, next: ChannelState) -> bool {
        let mut status = self.status.write();
        status.valid = valid;
        Self::apply(&mut status, next)
    }

    /// Transition check shared by the setters.
    fn apply(status: &mut Status, next: ChannelState) -> bool {
        let current = status.state;
        if current == next {
            return false;
        }
        if !current.can_transition_to(next) {
            warn!(from = %current, to = %next, "channel: rejected state transition");
            return false;
        }
        status.state = next;
        debug!(from = %current, to = %next, "channel: state changed");
        true
    }

    /// Sends raw bytes as a package of type `kind`.
    pub fn send(&self, kind: CommandId, payload: impl Into<Arc<[u8]>>) -> SendHandle {
        self.send_package(Arc::new(Package::raw(kind, payload)))
    }

    /// Sends a prebuilt package on the route its type resolves to.
    ///
    /// Returns [`SendHandle::INVALID`] without touching the transport when
    /// the channel is invalid or the package is malformed.
    pub fn send_package(&self, package: Arc<Package>) -> SendHandle {
        if !self.is_valid() {
            warn!(kind = %package.kind(), "channel: send on invalid channel");
            return SendHandle::INVALID;
        }
        if !package.is_valid() {
            warn!(id = package.numeric_id(), "channel: refusing malformed package");
            return SendHandle::INVALID;
        }
        let route = self.route_for(package.kind());
        debug!(
            kind = %package.kind(),
            id = package.numeric_id(),
            size = package.payload().len(),
            %route,
            "channel: send"
        );
        self.transport.get().send(package, route)
    }

    /// Blocks up to `timeout` for the outcome of `handle`.
    pub fn wait_for_send(&self, handle: SendHandle, timeout: Duration) -> SendOutcome {
        self.transport.get().wait_for_send(handle, timeout)
    }

    /// Current outcome of `handle`.
    pub fn send_result(&self, handle: SendHandle) -> SendOutcome {
        self.transport.get().send_result(handle)
    }

    /// Route packages of type `kind` travel on.
    pub fn route_for(&self, kind: CommandId) -> Route {
        self.routes.resolve(kind)
    }

    /// Security level chosen at construction.
    pub const fn security_level(&self) -> SecurityLevel {
        self.security
    }

    /// Underlying transport.
    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.get()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if let ChannelTransport::Owned(t) = &self.transport {
            t.disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::MockTransport;

    #[test]
    fn state_machine_transitions() {
        use ChannelState::{
            AuthenticationFailed, ConnectionTimeout, Disabled, Started, Stopped, UnknownPeer,
        };
        assert!(Disabled.can_transition_to(Started));
        assert!(Disabled.can_transition_to(ConnectionTimeout));
        assert!(Started.can_transition_to(Stopped));
        assert!(Stopped.can_transition_to(Started));
        assert!(Started.can_transition_to(AuthenticationFailed));
        assert!(!Started.can_transition_to(Disabled));
        for terminal in [UnknownPeer, ConnectionTimeout, AuthenticationFailed] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(Stopped));
            assert!(!terminal.can_transition_to(Started));
        }
    }

    #[test]
    fn invalid_channel_never_touches_transport() {
        let mock = MockTransport::new();
        let channel = Channel::new(mock.shared(), SecurityLevel::Normal);

        assert_eq!(channel.send(CommandId::VM_START, vec![1]), SendHandle::INVALID);
        assert!(mock.sent().is_empty());
    }

    #[test]
    fn malformed_package_is_rejected() {
        let mock = MockTransport::new();
        let channel = Channel::new(mock.shared(), SecurityLevel::Normal);
        channel.set_valid(true);

        let handle = channel.send_package(Arc::new(Package::raw(CommandId::ILLEGAL, vec![1])));
        assert!(!handle.is_valid());
        assert!(mock.sent().is_empty());
    }

    #[test]
    fn send_carries_resolved_route() {
        let mock = MockTransport::new();
        let channel = Channel::new(mock.shared(), SecurityLevel::Normal);
        channel.set_valid(true);

        let secure = channel.send(CommandId::IO_CLI_KEYBOARD_SCANCODE, vec![0x1c]);
        let plain = channel.send(CommandId::IO_STDIN_PORTION, &b"ls\n"[..]);
        assert!(secure.is_valid() && plain.is_valid());
        assert_ne!(secure, plain);

        let sent = mock.sent();
        assert_eq!(sent[0].1, Route::ENCRYPTED_REQUIRED);
        assert_eq!(sent[1].1, Route::PLAIN_REQUIRED);
        assert_eq!(sent[1].0.payload(), b"ls\n");
    }

    #[test]
    fn set_state_reports_changes_only() {
        let channel = Channel::new(MockTransport::new().shared(), SecurityLevel::Low);
        assert_eq!(channel.state(), ChannelState::Disabled);
        assert!(channel.set_state(ChannelState::Started));
        assert!(!channel.set_state(ChannelState::Started));
        assert!(channel.set_status(false, ChannelState::AuthenticationFailed));
        assert!(!channel.is_valid());
        assert!(!channel.set_status(false, ChannelState::Stopped));
        assert_eq!(channel.state(), ChannelState::AuthenticationFailed);
    }

    #[test]
    fn owned_transport_disconnects_on_drop() {
        let mock = MockTransport::new();
        let boxed: Box<dyn Transport> = Box::new(mock.clone());
        let channel = Channel::new(boxed, SecurityLevel::High);
        channel.enable();
        assert_eq!(mock.connects(), 1);
        drop(channel);
        assert_eq!(mock.disconnects(), 1);

        let shared = Channel::new(mock.shared(), SecurityLevel::High);
        drop(shared);
        assert_eq!(mock.disconnects(), 1);
    }
}
