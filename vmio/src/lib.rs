//! Client-side channels, routing and job tracking for VM management.
//!
//! A [`Channel`] sends [`Package`]s over a pluggable [`Transport`], picking a
//! [`Route`] for each package from a [`RoutingTable`] keyed by the channel's
//! [`SecurityLevel`]. An [`ExecChannel`] adds the exec-session handshake and
//! withholds traffic until the peer accepts the session. Every connect or
//! send can be tracked by an [`AsyncJob`], which resolves transport outcomes
//! into a stable [`ResultCode`].
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use vmio::{AsyncJob, CommandId, ExecChannel, JobTarget, Package, ResultCode, SecurityLevel, Transport};
//!
//! fn run(transport: Arc<dyn Transport>) {
//!     let exec = ExecChannel::new(transport, SecurityLevel::Normal, uuid::Uuid::new_v4(), "vm-1");
//!
//!     let connect = AsyncJob::connect(&exec, JobTarget::new());
//!     if connect.wait(Duration::from_secs(5)) != ResultCode::Success {
//!         return;
//!     }
//!
//!     let stdin = Package::raw(CommandId::IO_STDIN_PORTION, &b"uname -a\n"[..]);
//!     let job = AsyncJob::send(&exec, Arc::new(stdin), JobTarget::new());
//!     println!("{}", job.wait(Duration::from_secs(1)));
//! }
//! ```

mod channel;
mod config;
mod error;
mod events;
mod exec;
mod job;
mod job_code;
mod result;
mod routing;
#[cfg(test)]
mod testkit;
mod timer;
mod transport;

pub use channel::{Channel, ChannelState, ChannelTransport};
pub use config::{ChannelConfig, DEFAULT_PORT};
pub use error::{Error, Result};
pub use events::{ErrorEvent, ErrorFactory, EventSource, JobEvent, JobTarget, VmIdentity};
pub use exec::{ChannelEvent, ChannelObserver, ExecChannel};
pub use job::{
    AsyncJob, DEFAULT_CONNECT_TIMEOUT, JobId, JobKind, JobStatus, RESPONSE_TYPES, connect_result,
    send_result,
};
pub use job_code::{CommandJobMap, JobCode, to_command, to_job_code};
pub use result::{ErrorClass, ResultCode};
pub use routing::{
    MAX_ROUTES, Requirement, Route, RoutingTable, SENSITIVE_COMMANDS, SecurityLevel, TransportKind,
};
pub use transport::{PeerState, SendHandle, SendOutcome, Transport, TransportHandler};
pub use vmio_proto::{CommandId, CommandRange, Package};
