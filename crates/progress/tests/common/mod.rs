#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use schedgen_core::generation::JobStatus;
use schedgen_core::progress::ProgressState;
use schedgen_core::stage::Stage;
use schedgen_core::types::JobId;
use schedgen_progress::cache::{MemoryCache, ProgressCache};
use schedgen_progress::cancel::ConfirmationGate;
use schedgen_progress::poller::{PollListener, PollerConfig, Termination};
use schedgen_progress::tracker::TrackerListener;
use schedgen_progress::transport::{ProgressPayload, ProgressTransport, TransportError};

// ---------------------------------------------------------------------------
// Scripted transport
// ---------------------------------------------------------------------------

/// One scripted reply to a status request.
pub enum Reply {
    Payload(ProgressPayload),
    NotFound,
    Timeout,
    Unavailable,
    Unauthorized,
    SessionExpired,
    /// Never resolves.
    Hang,
    /// Resolves with the payload after the delay.
    Delayed(Duration, ProgressPayload),
}

pub fn running(percent: f64) -> Reply {
    Reply::Payload(ProgressPayload::new(percent, "running"))
}

/// Scripted reply to a cancel request.
pub enum CancelReply {
    Accept,
    /// Accepts once `Duration` has passed.
    AcceptAfter(Duration),
    Reject(String),
    Unavailable,
}

/// Transport that replays a fixed script and counts every call.
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    cancel_reply: Mutex<CancelReply>,
    fetch_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Self::with_cancel(replies, CancelReply::Accept)
    }

    pub fn with_cancel(replies: Vec<Reply>, cancel_reply: CancelReply) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            cancel_reply: Mutex::new(cancel_reply),
            fetch_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
        })
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProgressTransport for ScriptedTransport {
    async fn fetch_progress(&self, job_id: &JobId) -> Result<ProgressPayload, TransportError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Payload(payload)) => Ok(payload),
            Some(Reply::NotFound) => Err(TransportError::NotFound(job_id.clone())),
            Some(Reply::Timeout) => Err(TransportError::Timeout),
            Some(Reply::Unavailable) | None => {
                Err(TransportError::Unavailable("connection refused".into()))
            }
            Some(Reply::Unauthorized) => Err(TransportError::Unauthorized),
            Some(Reply::SessionExpired) => Err(TransportError::SessionExpired),
            Some(Reply::Hang) => std::future::pending().await,
            Some(Reply::Delayed(delay, payload)) => {
                tokio::time::sleep(delay).await;
                Ok(payload)
            }
        }
    }

    async fn cancel_job(&self, _job_id: &JobId) -> Result<(), TransportError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        let delay = match &*self.cancel_reply.lock().unwrap() {
            CancelReply::AcceptAfter(delay) => Some(*delay),
            _ => None,
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
            return Ok(());
        }
        match &*self.cancel_reply.lock().unwrap() {
            CancelReply::Accept | CancelReply::AcceptAfter(_) => Ok(()),
            CancelReply::Reject(message) => Err(TransportError::Rejected(message.clone())),
            CancelReply::Unavailable => Err(TransportError::Unavailable("connection reset".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// Recording listener
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Update(ProgressState),
    Finished(Termination),
    Complete(JobId),
    Cancel,
    Error(String),
}

/// Records every callback, for both poller and tracker listeners.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
    stages: Mutex<Vec<&'static str>>,
    cache: Option<(Arc<MemoryCache>, JobId)>,
    cache_present_at_finish: Mutex<Option<bool>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Also record whether `job_id` was still cached when tracking ended.
    pub fn watching_cache(cache: Arc<MemoryCache>, job_id: JobId) -> Arc<Self> {
        Arc::new(Self {
            cache: Some((cache, job_id)),
            ..Default::default()
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<ProgressState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Update(state) => Some(state),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<JobStatus> {
        self.updates().into_iter().map(|s| s.status).collect()
    }

    pub fn stages(&self) -> Vec<&'static str> {
        self.stages.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<Termination> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Finished(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Error(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &Event) -> usize {
        self.events().iter().filter(|e| *e == wanted).count()
    }

    pub fn cache_present_at_finish(&self) -> Option<bool> {
        *self.cache_present_at_finish.lock().unwrap()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    fn probe_cache(&self) {
        if let Some((cache, job_id)) = &self.cache {
            *self.cache_present_at_finish.lock().unwrap() = Some(cache.get(job_id).is_some());
        }
    }
}

impl PollListener for Recorder {
    fn on_update(&self, state: &ProgressState) {
        self.push(Event::Update(state.clone()));
    }

    fn on_finished(&self, termination: &Termination) {
        self.probe_cache();
        self.push(Event::Finished(termination.clone()));
    }
}

impl TrackerListener for Recorder {
    fn on_update(&self, state: &ProgressState, stage: &Stage) {
        self.stages.lock().unwrap().push(stage.name);
        self.push(Event::Update(state.clone()));
    }

    fn on_complete(&self, job_id: &JobId) {
        self.probe_cache();
        self.push(Event::Complete(job_id.clone()));
    }

    fn on_cancel(&self) {
        self.probe_cache();
        self.push(Event::Cancel);
    }

    fn on_error(&self, message: &str) {
        self.probe_cache();
        self.push(Event::Error(message.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Confirmation gates
// ---------------------------------------------------------------------------

/// Gate with a fixed answer that counts how often it was asked.
pub struct CountingGate {
    answer: bool,
    asked: AtomicUsize,
}

impl CountingGate {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: AtomicUsize::new(0),
        }
    }

    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfirmationGate for CountingGate {
    async fn confirm(&self, _job_id: &JobId) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

/// Gate that confirms only after `delay`, like a user slow to answer.
pub struct SlowGate {
    pub delay: Duration,
}

#[async_trait]
impl ConfirmationGate for SlowGate {
    async fn confirm(&self, _job_id: &JobId) -> bool {
        tokio::time::sleep(self.delay).await;
        true
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// One-second interval, as in the reference scenario.
pub fn fast_config() -> PollerConfig {
    PollerConfig {
        interval: Duration::from_secs(1),
        request_timeout: Duration::from_secs(3),
        max_not_found: 5,
    }
}

pub fn job() -> JobId {
    JobId::from("job-123")
}

/// Let virtual time run forward by `secs` seconds.
pub async fn advance_secs(secs: f64) {
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
}
