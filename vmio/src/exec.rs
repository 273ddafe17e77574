//! Channel gated by an exec-session authentication handshake.
//!
//! On connect the channel sends an [`AuthRequest`] carrying its session UUID.
//! Until the peer answers with an accepting [`AuthResponse`], every other
//! received package is dropped. A short or rejecting response fails the
//! channel for good and disconnects the transport.
//!
//! The gate only withholds delivery; it never reorders packages. Sends are
//! not gated, so the request itself goes out while unauthenticated.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;
use vmio_proto::{AuthRequest, AuthResponse, CommandId, Package};

use crate::channel::{Channel, ChannelState, ChannelTransport};
use crate::config::ChannelConfig;
use crate::error::Result;
use crate::routing::{Route, SecurityLevel};
use crate::transport::{PeerState, SendHandle, SendOutcome, TransportHandler};

/// Event delivered to outer listeners, in transport order.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ChannelEvent {
    /// The channel state changed.
    StateChanged(ChannelState),
    /// A package passed the authentication gate.
    Package(Arc<Package>),
    /// A correlated response passed the authentication gate.
    Response(SendHandle, Arc<Package>),
}

/// In-process observer, typically a pending job.
pub trait ChannelObserver: Send + Sync {
    /// The channel state changed.
    fn state_changed(&self, state: ChannelState);

    /// A correlated response passed the authentication gate.
    fn response_received(&self, handle: SendHandle, package: &Arc<Package>) {
        let _ = (handle, package);
    }
}

/// Registered listener.
#[derive(Debug, Clone)]
enum Listener {
    /// Weakly held observer, pruned once dropped.
    Observer(Weak<dyn ChannelObserver>),
    /// Event queue, pruned once its receiver is dropped.
    Queue(Sender<ChannelEvent>),
}

/// Forwards transport notifications to the channel without keeping it alive.
struct Relay(Weak<ExecChannel>);

impl TransportHandler for Relay {
    fn state_changed(&self, state: PeerState) {
        if let Some(exec) = self.0.upgrade() {
            exec.on_state(state);
        }
    }

    fn package_received(&self, package: Arc<Package>) {
        if let Some(exec) = self.0.upgrade() {
            exec.on_package(package);
        }
    }

    fn response_received(&self, handle: SendHandle, package: Arc<Package>) {
        if let Some(exec) = self.0.upgrade() {
            exec.on_response(handle, package);
        }
    }
}

/// A [`Channel`] that authenticates its session before exposing traffic.
#[derive(Debug)]
pub struct ExecChannel {
    /// Underlying channel.
    channel: Channel,
    /// Session authenticated on connect.
    session_id: Uuid,
    /// VM the session belongs to.
    vm_id: String,
    /// Set once the peer accepted the session.
    authenticated: AtomicBool,
    /// Registered listeners keyed by registration id.
    listeners: Mutex<Vec<(u64, Listener)>>,
    /// Next registration id.
    next_listener: AtomicU64,
}

impl ExecChannel {
    /// Creates the channel and installs itself as the transport's handler.
    pub fn new(
        transport: impl Into<ChannelTransport>,
        security: SecurityLevel,
        session_id: Uuid,
        vm_id: impl Into<String>,
    ) -> Arc<Self> {
        let exec = Arc::new(Self {
            channel: Channel::new(transport, security),
            session_id,
            vm_id: vm_id.into(),
            authenticated: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
        });
        let relay: Arc<dyn TransportHandler> = Arc::new(Relay(Arc::downgrade(&exec)));
        exec.channel.transport().set_handler(relay);
        exec
    }

    /// Creates the channel from a validated configuration.
    pub fn from_config(
        config: &ChannelConfig,
        transport: impl Into<ChannelTransport>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Self::new(
            transport,
            config.security_level,
            config.session_id,
            config.vm_id.clone(),
        ))
    }

    /// Underlying channel.
    pub const fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Session UUID sent in the handshake.
    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// VM the session belongs to.
    pub fn vm_id(&self) -> &str {
        &self.vm_id
    }

    /// Whether the peer accepted the session.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    /// Starts connecting.
    pub fn enable(&self) {
        self.channel.enable();
    }

    /// Disconnects and forces `Stopped`. Idempotent.
    pub fn disable(&self) {
        self.channel.disable();
        self.authenticated.store(false, Ordering::Release);
        if self.channel.set_status(false, ChannelState::Stopped) {
            self.emit(&ChannelEvent::StateChanged(ChannelState::Stopped));
        }
    }

    /// Fails the channel with a terminal `state` reported from outside the
    /// transport, such as a dispatcher that does not know the peer.
    ///
    /// The channel becomes invalid and unauthenticated, and listeners see the
    /// change. Returns `false` if `state` is not terminal or the state
    /// machine refuses the move.
    pub fn fail(&self, state: ChannelState) -> bool {
        if !state.is_terminal() {
            warn!(%state, "exec channel: fail with a non-terminal state");
            return false;
        }
        self.authenticated.store(false, Ordering::Release);
        let changed = self.channel.set_status(false, state);
        if changed {
            self.emit(&ChannelEvent::StateChanged(state));
        }
        changed
    }

    /// Whether sends currently reach the transport.
    pub fn is_valid(&self) -> bool {
        self.channel.is_valid()
    }

    /// Current state.
    pub fn state(&self) -> ChannelState {
        self.channel.state()
    }

    /// See [`Channel::send`].
    pub fn send(&self, kind: CommandId, payload: impl Into<Arc<[u8]>>) -> SendHandle {
        self.channel.send(kind, payload)
    }

    /// See [`Channel::send_package`].
    pub fn send_package(&self, package: Arc<Package>) -> SendHandle {
        self.channel.send_package(package)
    }

    /// See [`Channel::wait_for_send`].
    pub fn wait_for_send(&self, handle: SendHandle, timeout: Duration) -> SendOutcome {
        self.channel.wait_for_send(handle, timeout)
    }

    /// See [`Channel::send_result`].
    pub fn send_result(&self, handle: SendHandle) -> SendOutcome {
        self.channel.send_result(handle)
    }

    /// See [`Channel::route_for`].
    pub fn route_for(&self, kind: CommandId) -> Route {
        self.channel.route_for(kind)
    }

    /// Returns a queue receiving every [`ChannelEvent`] from now on.
    pub fn subscribe(&self) -> Receiver<ChannelEvent> {
        let (tx, rx) = channel::unbounded();
        self.register(Listener::Queue(tx));
        rx
    }

    /// Registers an in-process observer, held weakly.
    pub fn observe(&self, observer: Weak<dyn ChannelObserver>) {
        self.register(Listener::Observer(observer));
    }

    /// Adds a listener under a fresh id.
    fn register(&self, listener: Listener) {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, listener));
    }

    /// Delivers `event` to a snapshot of the listeners, outside the lock.
    fn emit(&self, event: &ChannelEvent) {
        let snapshot = self.listeners.lock().clone();
        let mut dead = Vec::new();
        for (id, listener) in snapshot {
            match listener {
                Listener::Observer(weak) => match weak.upgrade() {
                    Some(observer) => match event {
                        ChannelEvent::StateChanged(state) => observer.state_changed(*state),
                        ChannelEvent::Response(handle, package) => {
                            observer.response_received(*handle, package);
                        }
                        ChannelEvent::Package(_) => {}
                    },
                    None => dead.push(id),
                },
                Listener::Queue(tx) => {
                    if tx.send(event.clone()).is_err() {
                        dead.push(id);
                    }
                }
            }
        }
        if !dead.is_empty() {
            self.listeners.lock().retain(|(id, _)| !dead.contains(id));
        }
    }

    /// Sends the handshake request. Returns `true` if the transport took it.
    fn send_auth_request(&self) -> bool {
        let request = AuthRequest {
            session: *self.session_id.as_bytes(),
        };
        let handle = self.channel.send(
            CommandId::IO_CLI_AUTHENTICATE_EXEC_SESSION,
            &request.to_bytes()[..],
        );
        let outcome = self.channel.send_result(handle);
        let queued = matches!(outcome, SendOutcome::Pending | SendOutcome::Success);
        if !queued {
            warn!(session = %self.session_id, ?outcome, "exec channel: auth request not sent");
        }
        queued
    }

    /// Transport state notification.
    fn on_state(&self, state: PeerState) {
        match state {
            PeerState::Connected => {
                let current = self.channel.state();
                if current.is_terminal() {
                    warn!(session = %self.session_id, state = %current, "exec channel: connected after failure, staying invalid");
                    return;
                }
                debug!(session = %self.session_id, vm = %self.vm_id, "exec channel: connected, authenticating");
                self.channel.set_valid(true);
                self.send_auth_request();
            }
            PeerState::Disconnected => {
                self.authenticated.store(false, Ordering::Release);
                if self.channel.state().is_terminal() {
                    self.channel.set_valid(false);
                } else if self.channel.set_status(false, ChannelState::Stopped) {
                    self.emit(&ChannelEvent::StateChanged(ChannelState::Stopped));
                }
            }
        }
    }

    /// Received package notification.
    fn on_package(&self, package: Arc<Package>) {
        if !self.channel.is_valid() {
            warn!(kind = %package.kind(), "exec channel: package on invalid channel");
            return;
        }
        if !self.is_authenticated() {
            if package.kind() != CommandId::IO_AUTH_RESPONSE {
                debug!(kind = %package.kind(), "exec channel: not authenticated yet, dropping package");
                return;
            }
            if !self.complete_handshake(&package) {
                return;
            }
        }
        self.emit(&ChannelEvent::Package(package));
    }

    /// Applies the peer's verdict. Returns `true` if the session was accepted.
    fn complete_handshake(&self, response: &Package) -> bool {
        match AuthResponse::parse(response.payload()) {
            Ok(AuthResponse { accepted: true }) => {
                let changed = self.channel.set_state(ChannelState::Started);
                if !changed && self.channel.state() != ChannelState::Started {
                    warn!(session = %self.session_id, state = %self.channel.state(), "exec channel: accepted session cannot start");
                    self.channel.set_valid(false);
                    return false;
                }
                self.authenticated.store(true, Ordering::Release);
                debug!(session = %self.session_id, "exec channel: authenticated");
                if changed {
                    self.emit(&ChannelEvent::StateChanged(ChannelState::Started));
                }
                true
            }
            verdict => {
                match verdict {
                    Err(e) => warn!(session = %self.session_id, error = %e, "exec channel: malformed auth response"),
                    Ok(_) => warn!(session = %self.session_id, "exec channel: session rejected"),
                }
                self.authenticated.store(false, Ordering::Release);
                if self
                    .channel
                    .set_status(false, ChannelState::AuthenticationFailed)
                {
                    self.emit(&ChannelEvent::StateChanged(
                        ChannelState::AuthenticationFailed,
                    ));
                }
                self.channel.transport().disconnect();
                false
            }
        }
    }

    /// Correlated response notification.
    fn on_response(&self, handle: SendHandle, package: Arc<Package>) {
        if !self.channel.is_valid() || !self.is_authenticated() {
            debug!(kind = %package.kind(), "exec channel: response before authentication, dropping");
            return;
        }
        self.emit(&ChannelEvent::Response(handle, package));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::MockTransport;

    fn exec(security: SecurityLevel) -> (MockTransport, Arc<ExecChannel>) {
        let mock = MockTransport::new();
        let exec = ExecChannel::new(mock.shared(), security, Uuid::new_v4(), "vm-1");
        (mock, exec)
    }

    fn accept() -> Package {
        Package::raw(
            CommandId::IO_AUTH_RESPONSE,
            &AuthResponse { accepted: true }.to_bytes()[..],
        )
    }

    fn drain(rx: &Receiver<ChannelEvent>) -> Vec<ChannelEvent> {
        rx.try_iter().collect()
    }

    #[test]
    fn connect_sends_session_auth_request() {
        let (mock, exec) = exec(SecurityLevel::Normal);
        mock.emit_state(PeerState::Connected);

        assert!(exec.is_valid());
        assert!(!exec.is_authenticated());
        assert_eq!(exec.state(), ChannelState::Disabled);

        let sent = mock.sent();
        assert_eq!(sent.len(), 1);
        let (request, route) = &sent[0];
        assert_eq!(request.kind(), CommandId::IO_CLI_AUTHENTICATE_EXEC_SESSION);
        assert_eq!(request.payload(), exec.session_id().as_bytes());
        assert_eq!(*route, Route::PLAIN_REQUIRED);
    }

    #[test]
    fn accepted_session_starts_and_forwards_in_order() {
        let (mock, exec) = exec(SecurityLevel::Low);
        let rx = exec.subscribe();
        mock.emit_state(PeerState::Connected);
        mock.emit_package(accept());
        mock.emit_package(Package::raw(CommandId::IO_STDOUT_PORTION, vec![1]));
        mock.emit_package(Package::raw(CommandId::IO_STDOUT_PORTION, vec![2]));

        assert!(exec.is_authenticated());
        assert_eq!(exec.state(), ChannelState::Started);

        let events = drain(&rx);
        assert!(matches!(
            events[0],
            ChannelEvent::StateChanged(ChannelState::Started)
        ));
        let payloads: Vec<_> = events[1..]
            .iter()
            .map(|e| match e {
                ChannelEvent::Package(p) => (p.kind(), p.payload().to_vec()),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            payloads,
            [
                (CommandId::IO_AUTH_RESPONSE, vec![1u8, 0, 0, 0]),
                (CommandId::IO_STDOUT_PORTION, vec![1]),
                (CommandId::IO_STDOUT_PORTION, vec![2]),
            ]
        );
    }

    #[test]
    fn packages_before_auth_are_withheld() {
        let (mock, exec) = exec(SecurityLevel::Low);
        let rx = exec.subscribe();
        mock.emit_state(PeerState::Connected);
        mock.emit_package(Package::raw(CommandId::IO_STDOUT_PORTION, vec![9]));

        assert!(drain(&rx).is_empty());
        assert_eq!(exec.state(), ChannelState::Disabled);
        assert!(exec.is_valid());
        assert!(!exec.is_authenticated());
    }

    #[test]
    fn short_auth_response_fails_and_disconnects() {
        let (mock, exec) = exec(SecurityLevel::Low);
        mock.echo_disconnect();
        let rx = exec.subscribe();
        mock.emit_state(PeerState::Connected);
        mock.emit_package(Package::raw(CommandId::IO_AUTH_RESPONSE, vec![1, 0]));

        assert_eq!(exec.state(), ChannelState::AuthenticationFailed);
        assert!(!exec.is_authenticated());
        assert!(!exec.is_valid());
        assert_eq!(mock.disconnects(), 1);

        let events = drain(&rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            ChannelEvent::StateChanged(ChannelState::AuthenticationFailed)
        ));
    }

    #[test]
    fn rejected_session_fails() {
        let (mock, exec) = exec(SecurityLevel::Low);
        mock.emit_state(PeerState::Connected);
        mock.emit_package(Package::raw(
            CommandId::IO_AUTH_RESPONSE,
            &AuthResponse { accepted: false }.to_bytes()[..],
        ));
        assert_eq!(exec.state(), ChannelState::AuthenticationFailed);
        assert_eq!(mock.disconnects(), 1);
    }

    #[test]
    fn disconnect_stops_and_clears_auth() {
        let (mock, exec) = exec(SecurityLevel::Low);
        mock.emit_state(PeerState::Connected);
        mock.emit_package(accept());
        mock.emit_state(PeerState::Disconnected);

        assert_eq!(exec.state(), ChannelState::Stopped);
        assert!(!exec.is_authenticated());
        assert!(!exec.is_valid());

        // Reconnect and authenticate again.
        mock.emit_state(PeerState::Connected);
        assert_eq!(mock.sent().len(), 2);
        mock.emit_package(accept());
        assert_eq!(exec.state(), ChannelState::Started);
    }

    #[test]
    fn reconnect_after_auth_failure_stays_failed() {
        let (mock, exec) = exec(SecurityLevel::Low);
        let rx = exec.subscribe();
        mock.emit_state(PeerState::Connected);
        mock.emit_package(Package::raw(CommandId::IO_AUTH_RESPONSE, vec![1, 0]));
        mock.emit_state(PeerState::Disconnected);

        mock.emit_state(PeerState::Connected);
        mock.emit_package(accept());
        mock.emit_package(Package::raw(CommandId::IO_STDOUT_PORTION, vec![7]));

        assert_eq!(exec.state(), ChannelState::AuthenticationFailed);
        assert!(!exec.is_valid());
        assert!(!exec.is_authenticated());
        // No second auth request goes out.
        assert_eq!(mock.sent().len(), 1);

        let events = drain(&rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            ChannelEvent::StateChanged(ChannelState::AuthenticationFailed)
        ));
    }

    #[test]
    fn accept_after_failure_is_refused() {
        let (mock, exec) = exec(SecurityLevel::Low);
        mock.emit_state(PeerState::Connected);
        assert!(exec.fail(ChannelState::UnknownPeer));

        assert!(!exec.complete_handshake(&accept()));
        assert_eq!(exec.state(), ChannelState::UnknownPeer);
        assert!(!exec.is_valid());
        assert!(!exec.is_authenticated());
    }

    #[test]
    fn fail_emits_terminal_state_once() {
        let (mock, exec) = exec(SecurityLevel::Low);
        let rx = exec.subscribe();
        mock.emit_state(PeerState::Connected);
        mock.emit_package(accept());
        drain(&rx);

        assert!(!exec.fail(ChannelState::Stopped));
        assert!(exec.fail(ChannelState::ConnectionTimeout));
        assert!(!exec.fail(ChannelState::UnknownPeer));

        assert_eq!(exec.state(), ChannelState::ConnectionTimeout);
        assert!(!exec.is_valid());
        assert!(!exec.is_authenticated());
        assert!(matches!(
            drain(&rx).as_slice(),
            [ChannelEvent::StateChanged(ChannelState::ConnectionTimeout)]
        ));
    }

    #[test]
    fn responses_are_gated() {
        let (mock, exec) = exec(SecurityLevel::Low);
        let rx = exec.subscribe();
        mock.emit_state(PeerState::Connected);
        mock.emit_response(
            SendHandle(7),
            Package::raw(CommandId::IO_SCREEN_CAPTURED_BUFFER, vec![0]),
        );
        assert!(drain(&rx).is_empty());

        mock.emit_package(accept());
        drain(&rx);
        mock.emit_response(
            SendHandle(7),
            Package::raw(CommandId::IO_SCREEN_CAPTURED_BUFFER, vec![0]),
        );
        assert!(matches!(
            drain(&rx).as_slice(),
            [ChannelEvent::Response(SendHandle(7), _)]
        ));
    }

    #[test]
    fn disable_forces_stopped_once() {
        let (mock, exec) = exec(SecurityLevel::Low);
        let rx = exec.subscribe();
        exec.enable();
        exec.disable();
        exec.disable();

        assert_eq!(mock.connects(), 1);
        assert_eq!(mock.disconnects(), 2);
        assert_eq!(exec.state(), ChannelState::Stopped);
        assert_eq!(drain(&rx).len(), 1);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let (mock, exec) = exec(SecurityLevel::Low);
        drop(exec.subscribe());
        mock.emit_state(PeerState::Connected);
        mock.emit_package(accept());
        assert!(exec.listeners.lock().is_empty());
    }

    #[test]
    fn sends_are_not_gated_by_auth() {
        let (mock, exec) = exec(SecurityLevel::High);
        mock.emit_state(PeerState::Connected);
        let handle = exec.send(CommandId::VM_GET_STATE, vec![]);
        assert!(handle.is_valid());
        assert_eq!(mock.sent()[1].1, Route::ENCRYPTED_REQUIRED);
    }
}
