//! Surface consumed from the underlying transport.
//!
//! A transport owns the sockets and its own I/O thread. It pushes state
//! changes and received packages to a single [`TransportHandler`], and hands
//! back a [`SendHandle`] for each package it accepts so the caller can wait
//! for or poll the send outcome later.

use std::sync::Arc;
use std::time::Duration;

use vmio_proto::Package;

use crate::routing::Route;

/// Correlation handle for one send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SendHandle(pub u64);

impl SendHandle {
    /// Returned when a send was rejected before reaching the transport.
    pub const INVALID: Self = Self(0);

    /// Returns `false` for [`SendHandle::INVALID`].
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// Outcome of a send, as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SendOutcome {
    /// Delivered.
    Success,
    /// The transport failed to deliver.
    Failure,
    /// The handle is unknown to the transport.
    InvalidJob,
    /// The package was rejected.
    InvalidPackage,
    /// The wait elapsed before an outcome was known.
    Timeout,
    /// Still in flight.
    Pending,
    /// The send queue is full.
    QueueFull,
}

impl SendOutcome {
    /// Returns `true` once the outcome can no longer change.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Timeout)
    }
}

/// Connection state reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PeerState {
    /// The peer connection is up.
    Connected,
    /// The peer connection is down.
    Disconnected,
}

/// Receives transport notifications on the transport's own thread.
pub trait TransportHandler: Send + Sync {
    /// The connection state changed.
    fn state_changed(&self, state: PeerState);

    /// An unsolicited package arrived.
    fn package_received(&self, package: Arc<Package>);

    /// A response correlated with an earlier send arrived.
    fn response_received(&self, handle: SendHandle, package: Arc<Package>);
}

/// Asynchronous connection to one peer.
pub trait Transport: Send + Sync {
    /// Starts connecting. Completion is reported through the handler.
    fn connect(&self);

    /// Starts disconnecting. Idempotent.
    fn disconnect(&self);

    /// Queues `package` on `route` and returns its correlation handle, or
    /// [`SendHandle::INVALID`] if the transport refuses it outright.
    fn send(&self, package: Arc<Package>, route: Route) -> SendHandle;

    /// Blocks up to `timeout` for the outcome of `handle`.
    fn wait_for_send(&self, handle: SendHandle, timeout: Duration) -> SendOutcome;

    /// Current outcome of `handle` without blocking.
    fn send_result(&self, handle: SendHandle) -> SendOutcome;

    /// Installs the handler receiving notifications, replacing any previous one.
    fn set_handler(&self, handler: Arc<dyn TransportHandler>);
}
