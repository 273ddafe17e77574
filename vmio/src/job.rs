//! Pending channel operations with blocking and polling completion.
//!
//! An [`AsyncJob`] tracks either one connect attempt or one send. It starts
//! `Running` and moves to `Finished` exactly once, at which point its
//! [`ResultCode`] is fixed and a [`JobEvent::Finished`] goes out to the
//! job's [`JobTarget`].
//!
//! Connect jobs carry a deadline enforced by one timer thread shared by
//! all jobs. Send jobs also
//! correlate a response package with their send handle. A response may
//! arrive before the handle is known; the most recent such response is
//! buffered and delivered once [`AsyncJob::register_request`] names it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};
use vmio_proto::{CommandId, Package};

use crate::channel::ChannelState;
use crate::events::{ErrorEvent, JobEvent, JobTarget};
use crate::exec::{ChannelObserver, ExecChannel};
use crate::job_code::JobCode;
use crate::result::ResultCode;
use crate::timer::Timer;
use crate::transport::{SendHandle, SendOutcome};

/// Deadline of a connect job when none is given.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Package types a send job accepts as its response.
pub const RESPONSE_TYPES: [CommandId; 3] = [
    CommandId::IO_SCREEN_CAPTURED_BUFFER,
    CommandId::IO_TOOLS_CLIPBOARD_DATA,
    CommandId::IO_TOOLS_VM_SHUTDOWN,
];

static NEXT_JOB: AtomicU64 = AtomicU64::new(1);

/// Process-unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    /// Allocates a fresh id.
    pub(crate) fn next() -> Self {
        Self(NEXT_JOB.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Operation a job tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum JobKind {
    /// Bringing a channel up.
    Connect,
    /// One package send.
    Send,
}

impl JobKind {
    /// Job operation code reported for this kind.
    pub const fn job_code(self) -> JobCode {
        match self {
            Self::Connect => JobCode::VmConnectToVm,
            Self::Send => JobCode::Unknown,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Send => "send",
        })
    }
}

/// Coarse job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum JobStatus {
    /// Not finished.
    Running,
    /// Result fixed.
    Finished,
}

/// Result of a connect job whose channel ended in `state`.
pub const fn connect_result(state: ChannelState) -> ResultCode {
    match state {
        ChannelState::Started => ResultCode::Success,
        ChannelState::Disabled => ResultCode::Timeout,
        ChannelState::Stopped => ResultCode::Stopped,
        ChannelState::ConnectionTimeout => ResultCode::ConnectionTimeout,
        ChannelState::AuthenticationFailed => ResultCode::AuthenticationFailed,
        ChannelState::UnknownPeer => ResultCode::UnknownVmId,
    }
}

/// Result of a send job whose transport reported `outcome`.
pub const fn send_result(outcome: SendOutcome) -> ResultCode {
    match outcome {
        SendOutcome::Success => ResultCode::Success,
        SendOutcome::Failure => ResultCode::Failure,
        SendOutcome::InvalidJob | SendOutcome::InvalidPackage => ResultCode::InvalidArgument,
        SendOutcome::Timeout => ResultCode::Timeout,
        SendOutcome::Pending => ResultCode::OperationPending,
        SendOutcome::QueueFull => ResultCode::SendQueueFull,
    }
}

/// Mutable job state, guarded by one mutex.
#[derive(Debug)]
struct JobState {
    /// Running or finished.
    status: JobStatus,
    /// Final result once finished, `OperationPending` before.
    result: ResultCode,
    /// Rich error payload, if any.
    error: Option<ErrorEvent>,
    /// Send correlation handle, set once.
    handle: Option<SendHandle>,
    /// Response that arrived before the handle was known.
    buffered: Option<(SendHandle, Arc<Package>)>,
    /// Delivered response.
    response: Option<Arc<Package>>,
    /// Numeric id of the delivered response.
    package_id: Option<u64>,
    /// Whether the connect timer may still fire.
    timer_armed: bool,
}

impl Default for JobState {
    fn default() -> Self {
        Self {
            status: JobStatus::Running,
            result: ResultCode::OperationPending,
            error: None,
            handle: None,
            buffered: None,
            response: None,
            package_id: None,
            timer_armed: false,
        }
    }
}

/// Shared job core, observed by the channel and reached weakly from the
/// timer thread.
#[derive(Debug)]
struct JobInner {
    /// Identifier.
    id: JobId,
    /// Connect or send.
    kind: JobKind,
    /// Channel the operation runs on.
    channel: Weak<ExecChannel>,
    /// Listener sets notified on completion.
    target: JobTarget,
    /// Status, result and correlation.
    state: Mutex<JobState>,
    /// Signalled whenever `state` changes.
    changed: Condvar,
}

impl JobInner {
    /// Moves to `Finished` with `result`. Returns the event to announce, or
    /// `None` if the job was already finished.
    fn finish(&self, st: &mut JobState, result: ResultCode) -> Option<JobEvent> {
        if st.status == JobStatus::Finished {
            return None;
        }
        st.status = JobStatus::Finished;
        st.result = result;
        st.timer_armed = false;
        if result == ResultCode::UnknownVmId && st.error.is_none() {
            st.error = self
                .target
                .errors
                .as_ref()
                .and_then(|factory| factory.error_for(result));
        }
        debug!(job = %self.id, kind = %self.kind, %result, "job: finished");
        self.changed.notify_all();
        Some(JobEvent::Finished {
            job: self.id,
            kind: self.kind,
            result,
        })
    }

    /// Marks `package` as the delivered response.
    fn deliver(&self, st: &mut JobState, package: Arc<Package>) -> JobEvent {
        debug!(job = %self.id, kind = %package.kind(), "job: response delivered");
        st.package_id = Some(package.numeric_id());
        st.response = Some(Arc::clone(&package));
        self.changed.notify_all();
        JobEvent::Response {
            job: self.id,
            package,
        }
    }

    /// Sends a finished event to every listener set.
    fn announce(&self, event: Option<JobEvent>) {
        if let Some(event) = event {
            self.target.notify_all(&event);
        }
    }

    /// Finishes a connect job from the channel's current state, unless it is
    /// still `Disabled`. Yields whether the job is finished afterwards and
    /// the event to announce.
    fn settle_connect(&self, st: &mut JobState) -> (bool, Option<JobEvent>) {
        if st.status == JobStatus::Finished {
            return (true, None);
        }
        match self.channel.upgrade().map(|exec| exec.state()) {
            None => (true, self.finish(st, ResultCode::InvalidArgument)),
            Some(ChannelState::Disabled) => (false, None),
            Some(state) => (true, self.finish(st, connect_result(state))),
        }
    }

    /// Deadline callback: finishes the job unless the timer was disarmed or
    /// the job already finished.
    fn expire(&self) {
        let mut st = self.state.lock();
        if !st.timer_armed || st.status == JobStatus::Finished {
            return;
        }
        let state = self
            .channel
            .upgrade()
            .map_or(ChannelState::Disabled, |exec| exec.state());
        debug!(job = %self.id, %state, "job: connect deadline passed");
        let event = self.finish(&mut st, connect_result(state));
        drop(st);
        self.announce(event);
    }

    /// Correlates a response with this job.
    fn on_response_received(&self, handle: SendHandle, package: Arc<Package>) {
        if !RESPONSE_TYPES.contains(&package.kind()) {
            debug!(job = %self.id, kind = %package.kind(), "job: not a response type, ignoring");
            return;
        }
        let mut st = self.state.lock();
        if st.response.is_some() {
            return;
        }
        let event = match st.handle {
            None => {
                st.buffered = Some((handle, package));
                None
            }
            Some(known) if known == handle => Some(self.deliver(&mut st, package)),
            Some(_) => None,
        };
        drop(st);
        if let Some(event) = event {
            self.target.notify_vm(&event);
        }
    }
}

impl ChannelObserver for JobInner {
    fn state_changed(&self, state: ChannelState) {
        if self.kind != JobKind::Connect || state == ChannelState::Disabled {
            return;
        }
        let mut st = self.state.lock();
        st.timer_armed = false;
        let event = self.finish(&mut st, connect_result(state));
        drop(st);
        self.announce(event);
    }

    fn response_received(&self, handle: SendHandle, package: &Arc<Package>) {
        if self.kind == JobKind::Send {
            self.on_response_received(handle, Arc::clone(package));
        }
    }
}

/// One outstanding connect or send.
#[derive(Debug)]
pub struct AsyncJob {
    /// Shared core.
    inner: Arc<JobInner>,
}

impl AsyncJob {
    /// Wraps a fresh running job.
    fn new(kind: JobKind, channel: &Arc<ExecChannel>, target: JobTarget) -> Self {
        let inner = Arc::new(JobInner {
            id: JobId::next(),
            kind,
            channel: Arc::downgrade(channel),
            target,
            state: Mutex::new(JobState::default()),
            changed: Condvar::new(),
        });
        let observer: Arc<dyn ChannelObserver> = Arc::<JobInner>::clone(&inner);
        channel.observe(Arc::downgrade(&observer));
        Self { inner }
    }

    /// Enables `channel` and tracks it with the default deadline.
    pub fn connect(channel: &Arc<ExecChannel>, target: JobTarget) -> Self {
        Self::connect_with_timeout(channel, target, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Enables `channel` and tracks it until it leaves `Disabled` or
    /// `timeout` passes.
    pub fn connect_with_timeout(
        channel: &Arc<ExecChannel>,
        target: JobTarget,
        timeout: Duration,
    ) -> Self {
        let job = Self::new(JobKind::Connect, channel, target);
        job.arm_timer(timeout);
        channel.enable();
        job
    }

    /// Sends `package` on `channel` and tracks the send.
    ///
    /// A send the channel refuses outright finishes immediately with
    /// [`ResultCode::InvalidArgument`].
    pub fn send(channel: &Arc<ExecChannel>, package: Arc<Package>, target: JobTarget) -> Self {
        let job = Self::new(JobKind::Send, channel, target);
        let handle = channel.send_package(package);
        if handle.is_valid() {
            job.register_request(handle);
        } else {
            let mut st = job.inner.state.lock();
            let event = job.inner.finish(&mut st, ResultCode::InvalidArgument);
            drop(st);
            job.inner.announce(event);
        }
        job
    }

    /// Schedules the connect deadline on the shared timer thread.
    fn arm_timer(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        self.inner.state.lock().timer_armed = true;
        let weak = Arc::downgrade(&self.inner);
        let scheduled = Timer::global().schedule(deadline, move || {
            if let Some(inner) = weak.upgrade() {
                inner.expire();
            }
        });
        if let Err(e) = scheduled {
            warn!(job = %self.inner.id, error = %e, "job: failed to start connect timer");
            self.inner.state.lock().timer_armed = false;
        }
    }

    /// Stops the connect timer without finishing the job.
    fn disarm_timer(&self) {
        let mut st = self.inner.state.lock();
        if st.timer_armed {
            st.timer_armed = false;
            self.inner.changed.notify_all();
        }
    }

    /// Blocks up to `timeout` for the job to finish and returns its result.
    ///
    /// For a connect job an explicit wait replaces the implicit deadline; a
    /// zero `timeout` only polls and leaves the job running while the
    /// channel is still `Disabled`. A send job returns
    /// [`ResultCode::OperationPending`] or [`ResultCode::Timeout`] without
    /// finishing when the outcome is not yet final.
    pub fn wait(&self, timeout: Duration) -> ResultCode {
        match self.inner.kind {
            JobKind::Connect => self.wait_connect(timeout),
            JobKind::Send => self.wait_send(timeout),
        }
    }

    /// Connect half of [`AsyncJob::wait`].
    fn wait_connect(&self, timeout: Duration) -> ResultCode {
        let inner = &self.inner;
        let mut st = inner.state.lock();
        if timeout.is_zero() {
            let (_, event) = inner.settle_connect(&mut st);
            let result = st.result;
            drop(st);
            inner.announce(event);
            return result;
        }

        st.timer_armed = false;
        inner.changed.notify_all();
        let deadline = Instant::now() + timeout;
        let event = loop {
            let (done, event) = inner.settle_connect(&mut st);
            if done {
                break event;
            }
            if inner.changed.wait_until(&mut st, deadline).timed_out() {
                let state = inner
                    .channel
                    .upgrade()
                    .map_or(ChannelState::Disabled, |exec| exec.state());
                break inner.finish(&mut st, connect_result(state));
            }
        };
        let result = st.result;
        drop(st);
        inner.announce(event);
        result
    }

    /// Send half of [`AsyncJob::wait`].
    fn wait_send(&self, timeout: Duration) -> ResultCode {
        let inner = &self.inner;
        let registered = {
            let st = inner.state.lock();
            if st.status == JobStatus::Finished {
                return st.result;
            }
            st.handle
        };
        let Some(handle) = registered else {
            return ResultCode::OperationPending;
        };
        let outcome = match inner.channel.upgrade() {
            Some(exec) => exec.wait_for_send(handle, timeout),
            None => SendOutcome::InvalidJob,
        };
        self.settle_send(outcome)
    }

    /// Finishes a send job on a terminal `outcome`.
    fn settle_send(&self, outcome: SendOutcome) -> ResultCode {
        let code = send_result(outcome);
        if !outcome.is_terminal() {
            return code;
        }
        let mut st = self.inner.state.lock();
        let event = self.inner.finish(&mut st, code);
        let result = st.result;
        drop(st);
        self.inner.announce(event);
        result
    }

    /// Current status. Polls the channel so completions are observed
    /// without calling [`AsyncJob::wait`].
    pub fn status(&self) -> JobStatus {
        let inner = &self.inner;
        let registered = {
            let mut st = inner.state.lock();
            if st.status == JobStatus::Finished {
                return JobStatus::Finished;
            }
            if inner.kind == JobKind::Connect {
                let (_, event) = inner.settle_connect(&mut st);
                let status = st.status;
                drop(st);
                inner.announce(event);
                return status;
            }
            st.handle
        };
        if let Some(handle) = registered {
            let outcome = inner
                .channel
                .upgrade()
                .map_or(SendOutcome::InvalidJob, |exec| exec.send_result(handle));
            self.settle_send(outcome);
        }
        inner.state.lock().status
    }

    /// 0 while running, 100 once finished.
    pub fn progress(&self) -> u8 {
        match self.status() {
            JobStatus::Running => 0,
            JobStatus::Finished => 100,
        }
    }

    /// Final result, or [`ResultCode::OperationPending`] while running.
    pub fn result(&self) -> ResultCode {
        self.status();
        self.inner.state.lock().result
    }

    /// Rich error payload attached on failure.
    pub fn error(&self) -> Option<ErrorEvent> {
        self.inner.state.lock().error.clone()
    }

    /// Delivered response package.
    pub fn response(&self) -> Option<Arc<Package>> {
        self.inner.state.lock().response.clone()
    }

    /// Numeric id of the delivered response package.
    pub fn package_id(&self) -> Option<u64> {
        self.inner.state.lock().package_id
    }

    /// Correlation handle of a send job.
    pub fn send_handle(&self) -> Option<SendHandle> {
        self.inner.state.lock().handle
    }

    /// Identifier.
    pub fn id(&self) -> JobId {
        self.inner.id
    }

    /// Connect or send.
    pub fn kind(&self) -> JobKind {
        self.inner.kind
    }

    /// Job operation code.
    pub fn job_code(&self) -> JobCode {
        self.inner.kind.job_code()
    }

    /// Records the send's correlation handle.
    ///
    /// A buffered response for `handle` is delivered right away; a buffered
    /// response for any other handle is discarded. Only the first call has
    /// an effect.
    pub fn register_request(&self, handle: SendHandle) {
        let inner = &self.inner;
        let mut st = inner.state.lock();
        if st.handle.is_some() {
            warn!(job = %inner.id, handle = handle.0, "job: correlation handle already set");
            return;
        }
        st.handle = Some(handle);
        let event = match st.buffered.take() {
            Some((buffered, package)) if buffered == handle && st.response.is_none() => {
                Some(inner.deliver(&mut st, package))
            }
            Some(_) => {
                debug!(job = %inner.id, "job: discarding response for another handle");
                None
            }
            None => None,
        };
        drop(st);
        if let Some(event) = event {
            inner.target.notify_vm(&event);
        }
    }

    /// Offers a response package to this job.
    ///
    /// Ignored unless its type is in [`RESPONSE_TYPES`] and no response
    /// was delivered yet. Buffered while the handle is unknown.
    pub fn on_response_received(&self, handle: SendHandle, package: Arc<Package>) {
        self.inner.on_response_received(handle, package);
    }
}

impl Drop for AsyncJob {
    fn drop(&mut self) {
        self.disarm_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventSource, VmIdentity};
    use crate::routing::SecurityLevel;
    use crate::testkit::MockTransport;
    use crate::transport::PeerState;
    use crossbeam::channel::Receiver;
    use std::thread;
    use uuid::Uuid;
    use vmio_proto::AuthResponse;

    fn exec() -> (MockTransport, Arc<ExecChannel>) {
        let mock = MockTransport::new();
        let exec = ExecChannel::new(mock.shared(), SecurityLevel::Low, Uuid::new_v4(), "vm-1");
        (mock, exec)
    }

    fn authenticate(mock: &MockTransport) {
        mock.emit_state(PeerState::Connected);
        mock.emit_package(Package::raw(
            CommandId::IO_AUTH_RESPONSE,
            &AuthResponse { accepted: true }.to_bytes()[..],
        ));
    }

    fn target() -> (JobTarget, Receiver<JobEvent>, Receiver<JobEvent>) {
        let vm = Arc::new(EventSource::new());
        let server = Arc::new(EventSource::new());
        let (vm_rx, server_rx) = (vm.subscribe(), server.subscribe());
        let target = JobTarget::new().vm_events(vm).server_events(server);
        (target, vm_rx, server_rx)
    }

    fn finished(rx: &Receiver<JobEvent>) -> Vec<ResultCode> {
        rx.try_iter()
            .filter_map(|e| match e {
                JobEvent::Finished { result, .. } => Some(result),
                JobEvent::Response { .. } => None,
            })
            .collect()
    }

    fn screen(bytes: &[u8]) -> Arc<Package> {
        Arc::new(Package::raw(CommandId::IO_SCREEN_CAPTURED_BUFFER, bytes))
    }

    #[test]
    fn connect_deadline_finishes_once() {
        let (mock, exec) = exec();
        let (target, vm_rx, server_rx) = target();
        let job = AsyncJob::connect_with_timeout(&exec, target, Duration::from_millis(30));
        assert_eq!(mock.connects(), 1);

        let first = vm_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(
            first,
            JobEvent::Finished {
                result: ResultCode::Timeout,
                kind: JobKind::Connect,
                ..
            }
        ));
        assert_eq!(job.status(), JobStatus::Finished);
        assert_eq!(job.result(), ResultCode::Timeout);

        authenticate(&mock);
        assert_eq!(exec.state(), ChannelState::Started);
        assert_eq!(job.result(), ResultCode::Timeout);
        assert!(finished(&vm_rx).is_empty());
        assert_eq!(finished(&server_rx), [ResultCode::Timeout]);
    }

    #[test]
    fn connect_succeeds_once_started() {
        let (mock, exec) = exec();
        let (target, vm_rx, _) = target();
        let job = AsyncJob::connect(&exec, target);
        assert_eq!(job.status(), JobStatus::Running);
        assert_eq!(job.progress(), 0);
        assert_eq!(job.job_code(), JobCode::VmConnectToVm);

        authenticate(&mock);
        assert_eq!(job.wait(Duration::from_secs(5)), ResultCode::Success);
        assert_eq!(job.progress(), 100);
        assert_eq!(finished(&vm_rx), [ResultCode::Success]);
    }

    #[test]
    fn zero_wait_polls_without_finishing() {
        let (_mock, exec) = exec();
        let job = AsyncJob::connect(&exec, JobTarget::new());
        assert_eq!(job.wait(Duration::ZERO), ResultCode::OperationPending);
        assert_eq!(job.status(), JobStatus::Running);
    }

    #[test]
    fn explicit_wait_replaces_deadline() {
        let (_mock, exec) = exec();
        let (target, vm_rx, _) = target();
        let job = AsyncJob::connect(&exec, target);
        assert_eq!(job.wait(Duration::from_millis(20)), ResultCode::Timeout);
        assert_eq!(job.status(), JobStatus::Finished);
        assert_eq!(finished(&vm_rx), [ResultCode::Timeout]);
    }

    #[test]
    fn disable_finishes_connect_as_stopped() {
        let (_mock, exec) = exec();
        let job = AsyncJob::connect(&exec, JobTarget::new());
        exec.disable();
        assert_eq!(job.result(), ResultCode::Stopped);
        assert_eq!(job.wait(Duration::from_secs(1)), ResultCode::Stopped);
    }

    #[test]
    fn unknown_peer_attaches_vm_error() {
        let (_mock, exec) = exec();
        let vm = VmIdentity {
            uuid: Uuid::new_v4(),
            name: "ci-runner".into(),
        };
        let (target, vm_rx, _) = target();
        let job = AsyncJob::connect(&exec, target.errors(Arc::new(vm.clone())));
        assert!(exec.fail(ChannelState::UnknownPeer));

        // The observer finishes the job without any poll.
        assert_eq!(finished(&vm_rx), [ResultCode::UnknownVmId]);
        assert_eq!(job.result(), ResultCode::UnknownVmId);
        let err = job.error().unwrap();
        assert_eq!(err.issuer, vm.uuid);
        assert_eq!(err.params, ["ci-runner"]);
    }

    #[test]
    fn deadline_racing_start_finishes_once() {
        for delay_us in (0..20).map(|i| i * 150) {
            let (mock, exec) = exec();
            let (target, vm_rx, server_rx) = target();
            let job = AsyncJob::connect_with_timeout(&exec, target, Duration::from_millis(2));

            let peer = mock.clone();
            let racer = thread::spawn(move || {
                thread::sleep(Duration::from_micros(delay_us));
                authenticate(&peer);
            });
            racer.join().unwrap();

            let result = job.wait(Duration::from_secs(1));
            assert!(
                matches!(result, ResultCode::Timeout | ResultCode::Success),
                "unexpected {result}"
            );
            // Let a late deadline callback run before counting.
            thread::sleep(Duration::from_millis(5));
            assert_eq!(finished(&vm_rx), [result]);
            assert_eq!(finished(&server_rx), [result]);
        }
    }

    #[test]
    fn wait_wakes_when_channel_starts() {
        let (mock, exec) = exec();
        let job = AsyncJob::connect(&exec, JobTarget::new());

        let peer = mock.clone();
        let racer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            authenticate(&peer);
        });
        let started = Instant::now();
        assert_eq!(job.wait(Duration::from_secs(10)), ResultCode::Success);
        assert!(started.elapsed() < Duration::from_secs(5));
        racer.join().unwrap();
    }

    #[test]
    fn dropped_job_is_not_finished_by_deadline() {
        let (_mock, exec) = exec();
        let (target, vm_rx, _) = target();
        drop(AsyncJob::connect_with_timeout(&exec, target, Duration::from_millis(5)));
        thread::sleep(Duration::from_millis(50));
        assert!(finished(&vm_rx).is_empty());
    }

    #[test]
    fn result_mapping_tables() {
        assert_eq!(connect_result(ChannelState::Disabled), ResultCode::Timeout);
        assert_eq!(
            connect_result(ChannelState::AuthenticationFailed),
            ResultCode::AuthenticationFailed
        );
        assert_eq!(send_result(SendOutcome::InvalidPackage), ResultCode::InvalidArgument);
        assert_eq!(send_result(SendOutcome::QueueFull), ResultCode::SendQueueFull);
        assert_eq!(send_result(SendOutcome::Pending), ResultCode::OperationPending);
    }

    #[test]
    fn full_queue_finishes_busy() {
        let (mock, exec) = exec();
        authenticate(&mock);
        mock.set_outcome(SendOutcome::QueueFull);
        let (target, vm_rx, server_rx) = target();

        let job = AsyncJob::send(&exec, Arc::new(Package::raw(CommandId::VM_START, vec![])), target);
        assert_eq!(job.wait(Duration::from_millis(10)), ResultCode::SendQueueFull);
        assert_eq!(job.status(), JobStatus::Finished);
        assert_eq!(job.job_code(), JobCode::Unknown);
        assert_eq!(finished(&vm_rx), [ResultCode::SendQueueFull]);
        assert_eq!(finished(&server_rx), [ResultCode::SendQueueFull]);
    }

    #[test]
    fn pending_send_stays_running() {
        let (mock, exec) = exec();
        authenticate(&mock);
        mock.set_outcome(SendOutcome::Pending);

        let job = AsyncJob::send(&exec, screen(b"x"), JobTarget::new());
        assert_eq!(job.wait(Duration::from_millis(10)), ResultCode::OperationPending);
        assert_eq!(job.status(), JobStatus::Running);

        mock.set_outcome(SendOutcome::Success);
        assert_eq!(job.status(), JobStatus::Finished);
        assert_eq!(job.result(), ResultCode::Success);
    }

    #[test]
    fn refused_send_is_invalid_argument() {
        let (mock, exec) = exec();
        let job = AsyncJob::send(
            &exec,
            Arc::new(Package::raw(CommandId::VM_STOP, vec![])),
            JobTarget::new(),
        );
        assert_eq!(job.status(), JobStatus::Finished);
        assert_eq!(job.result(), ResultCode::InvalidArgument);
        assert!(job.send_handle().is_none());
        assert!(mock.sent().is_empty());
    }

    #[test]
    fn buffered_response_delivered_on_register() {
        let (_mock, exec) = exec();
        let (target, vm_rx, server_rx) = target();
        let job = AsyncJob::new(JobKind::Send, &exec, target);

        let pkg = screen(b"frame");
        job.on_response_received(SendHandle(5), Arc::clone(&pkg));
        assert!(job.response().is_none());

        job.register_request(SendHandle(5));
        assert_eq!(job.response().unwrap().payload(), b"frame");
        assert_eq!(job.package_id(), Some(pkg.numeric_id()));
        assert!(matches!(
            vm_rx.try_recv(),
            Ok(JobEvent::Response { .. })
        ));
        assert!(server_rx.try_recv().is_err());
    }

    #[test]
    fn register_with_other_handle_discards_buffer() {
        let (_mock, exec) = exec();
        let job = AsyncJob::new(JobKind::Send, &exec, JobTarget::new());

        job.on_response_received(SendHandle(5), screen(b"stale"));
        job.register_request(SendHandle(6));
        assert!(job.response().is_none());

        job.on_response_received(SendHandle(5), screen(b"other"));
        assert!(job.response().is_none());
        job.on_response_received(SendHandle(6), screen(b"mine"));
        assert_eq!(job.response().unwrap().payload(), b"mine");
    }

    #[test]
    fn later_buffered_response_replaces_earlier() {
        let (_mock, exec) = exec();
        let job = AsyncJob::new(JobKind::Send, &exec, JobTarget::new());
        job.on_response_received(SendHandle(3), screen(b"old"));
        job.on_response_received(SendHandle(3), screen(b"new"));
        job.register_request(SendHandle(3));
        assert_eq!(job.response().unwrap().payload(), b"new");
    }

    #[test]
    fn only_allowed_types_and_first_response_count() {
        let (_mock, exec) = exec();
        let job = AsyncJob::new(JobKind::Send, &exec, JobTarget::new());
        job.register_request(SendHandle(9));

        job.on_response_received(
            SendHandle(9),
            Arc::new(Package::raw(CommandId::IO_STDOUT_PORTION, vec![1])),
        );
        assert!(job.response().is_none());

        job.on_response_received(SendHandle(9), screen(b"first"));
        job.on_response_received(SendHandle(9), screen(b"second"));
        assert_eq!(job.response().unwrap().payload(), b"first");
    }

    #[test]
    fn channel_response_reaches_send_job() {
        let (mock, exec) = exec();
        authenticate(&mock);
        mock.set_outcome(SendOutcome::Pending);
        let job = AsyncJob::send(&exec, screen(b"req"), JobTarget::new());
        let handle = job.send_handle().unwrap();

        mock.emit_response(handle, Package::raw(CommandId::IO_TOOLS_CLIPBOARD_DATA, vec![7]));
        assert_eq!(job.response().unwrap().payload(), [7]);
    }

    #[test]
    fn job_ids_are_unique() {
        assert_ne!(JobId::next(), JobId::next());
    }
}
