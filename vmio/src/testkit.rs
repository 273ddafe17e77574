//! Scripted in-memory transport for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use vmio_proto::Package;

use crate::routing::Route;
use crate::transport::{PeerState, SendHandle, SendOutcome, Transport, TransportHandler};

/// Shared state behind every clone of a [`MockTransport`].
#[derive(Default)]
struct Inner {
    /// Installed notification handler.
    handler: Mutex<Option<Arc<dyn TransportHandler>>>,
    /// Every accepted send, in order.
    sent: Mutex<Vec<(Arc<Package>, Route)>>,
    /// Outcome reported for every handle.
    outcome: Mutex<Option<SendOutcome>>,
    /// Last handle issued.
    next_handle: AtomicU64,
    /// `connect` calls.
    connects: AtomicUsize,
    /// `disconnect` calls.
    disconnects: AtomicUsize,
    /// Report `Disconnected` from inside `disconnect`.
    echo_disconnect: AtomicBool,
}

/// Transport double. Clones share state.
#[derive(Clone, Default)]
pub(crate) struct MockTransport {
    /// Shared state.
    inner: Arc<Inner>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Clone as a shared trait object.
    pub(crate) fn shared(&self) -> Arc<dyn Transport> {
        Arc::new(self.clone())
    }

    pub(crate) fn set_outcome(&self, outcome: SendOutcome) {
        *self.inner.outcome.lock() = Some(outcome);
    }

    pub(crate) fn echo_disconnect(&self) {
        self.inner.echo_disconnect.store(true, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<(Arc<Package>, Route)> {
        self.inner.sent.lock().clone()
    }

    pub(crate) fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn disconnects(&self) -> usize {
        self.inner.disconnects.load(Ordering::SeqCst)
    }

    /// Handler snapshot, taken so callbacks run without the lock held.
    fn handler(&self) -> Option<Arc<dyn TransportHandler>> {
        self.inner.handler.lock().clone()
    }

    pub(crate) fn emit_state(&self, state: PeerState) {
        if let Some(h) = self.handler() {
            h.state_changed(state);
        }
    }

    pub(crate) fn emit_package(&self, package: Package) {
        if let Some(h) = self.handler() {
            h.package_received(Arc::new(package));
        }
    }

    pub(crate) fn emit_response(&self, handle: SendHandle, package: Package) {
        if let Some(h) = self.handler() {
            h.response_received(handle, Arc::new(package));
        }
    }
}

impl Transport for MockTransport {
    fn connect(&self) {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
    }

    fn disconnect(&self) {
        self.inner.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.inner.echo_disconnect.load(Ordering::SeqCst) {
            self.emit_state(PeerState::Disconnected);
        }
    }

    fn send(&self, package: Arc<Package>, route: Route) -> SendHandle {
        self.inner.sent.lock().push((package, route));
        SendHandle(self.inner.next_handle.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn wait_for_send(&self, handle: SendHandle, _timeout: Duration) -> SendOutcome {
        self.send_result(handle)
    }

    fn send_result(&self, handle: SendHandle) -> SendOutcome {
        if !handle.is_valid() {
            return SendOutcome::InvalidJob;
        }
        self.inner.outcome.lock().unwrap_or(SendOutcome::Success)
    }

    fn set_handler(&self, handler: Arc<dyn TransportHandler>) {
        *self.inner.handler.lock() = Some(handler);
    }
}
