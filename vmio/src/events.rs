//! Listener registries notified when jobs finish or receive responses.

use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use uuid::Uuid;
use vmio_proto::Package;

use crate::job::{JobId, JobKind};
use crate::result::ResultCode;

/// Notification raised by a job.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum JobEvent {
    /// The job reached its terminal status.
    Finished {
        /// Originating job.
        job: JobId,
        /// Connect or send.
        kind: JobKind,
        /// Final result.
        result: ResultCode,
    },
    /// A response package was correlated with the job.
    Response {
        /// Originating job.
        job: JobId,
        /// The response.
        package: Arc<Package>,
    },
}

/// Set of subscribers receiving [`JobEvent`]s.
///
/// Subscribers whose receiver has been dropped are pruned on the next
/// notification.
#[derive(Debug, Default)]
pub struct EventSource {
    /// Live subscriber queues.
    subscribers: Mutex<Vec<Sender<JobEvent>>>,
}

impl EventSource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber.
    pub fn subscribe(&self) -> Receiver<JobEvent> {
        let (tx, rx) = channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Delivers `event` to every live subscriber.
    pub fn notify(&self, event: &JobEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// Rich error payload attached to a failed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    /// Result the payload describes.
    pub code: ResultCode,
    /// Object that raised the error, typically the VM UUID.
    pub issuer: Uuid,
    /// Positional message parameters.
    pub params: Vec<String>,
}

/// Builds rich error payloads for specific failures.
pub trait ErrorFactory: Send + Sync {
    /// Payload for `code`, if this factory describes it.
    fn error_for(&self, code: ResultCode) -> Option<ErrorEvent>;
}

/// VM identity used to describe unknown-peer failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmIdentity {
    /// VM UUID.
    pub uuid: Uuid,
    /// Display name.
    pub name: String,
}

impl ErrorFactory for VmIdentity {
    fn error_for(&self, code: ResultCode) -> Option<ErrorEvent> {
        (code == ResultCode::UnknownVmId).then(|| ErrorEvent {
            code,
            issuer: self.uuid,
            params: vec![self.name.clone()],
        })
    }
}

/// Listener sets a job reports to.
#[derive(Clone, Default)]
pub struct JobTarget {
    /// VM-level listeners.
    pub vm_events: Option<Arc<EventSource>>,
    /// Server-level listeners.
    pub server_events: Option<Arc<EventSource>>,
    /// Source of rich error payloads.
    pub errors: Option<Arc<dyn ErrorFactory>>,
}

impl JobTarget {
    /// Target with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the VM-level listeners.
    #[must_use]
    pub fn vm_events(mut self, source: Arc<EventSource>) -> Self {
        self.vm_events = Some(source);
        self
    }

    /// Sets the server-level listeners.
    #[must_use]
    pub fn server_events(mut self, source: Arc<EventSource>) -> Self {
        self.server_events = Some(source);
        self
    }

    /// Sets the error factory.
    #[must_use]
    pub fn errors(mut self, factory: Arc<dyn ErrorFactory>) -> Self {
        self.errors = Some(factory);
        self
    }

    /// Notifies the VM-level listeners only.
    pub(crate) fn notify_vm(&self, event: &JobEvent) {
        if let Some(source) = &self.vm_events {
            source.notify(event);
        }
    }

    /// Notifies both listener sets.
    pub(crate) fn notify_all(&self, event: &JobEvent) {
        self.notify_vm(event);
        if let Some(source) = &self.server_events {
            source.notify(event);
        }
    }
}

impl std::fmt::Debug for JobTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobTarget")
            .field("vm_events", &self.vm_events.is_some())
            .field("server_events", &self.server_events.is_some())
            .field("errors", &self.errors.is_some())
            .finish()
    }
}
