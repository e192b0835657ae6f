//! Job progress tracking for stream creation.
//!
//! [`JobTracker`] submits a creation request and then follows the resulting
//! job over the live channel, falling back to polling the status endpoint when
//! the channel is slow to open or drops. Whatever path delivers it, the caller
//! sees exactly one terminal outcome through [`UiHooks`] and the shared
//! [`StreamCreationState`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use streamwatch::api::{CreateStreamRequest, HttpStreamApi, Platform};
//! use streamwatch::tracker::{JobTracker, LogHooks, TrackingConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let api = Arc::new(HttpStreamApi::new("http://localhost:5000", Duration::from_secs(30))?);
//! let tracker = JobTracker::new(api, Arc::new(LogHooks), TrackingConfig::default(), Platform::default());
//!
//! tracker.submit(CreateStreamRequest::new("https://stripchat.com/someone")).await?;
//! let outcome = tracker.wait_for_outcome().await;
//! println!("success: {}", outcome.submit_success);
//!
//! tracker.dispose().await;
//! # Ok(())
//! # }
//! ```

mod driver;
pub mod hooks;
pub mod state;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::{CreateJobResponse, CreateStreamRequest, Platform, StreamApi};
use crate::errors::TrackerError;
use driver::Driver;

pub use hooks::{LogHooks, UiHooks};
pub use state::{Effect, Phase, StreamCreationState};

/// Default time allowed for the live channel to show signs of life.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default interval between status requests while polling.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
/// Default ceiling on the whole job, measured from submission.
pub const DEFAULT_OVERALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Timing knobs for the delivery protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingConfig {
    pub connect_timeout: Duration,
    pub poll_interval: Duration,
    pub overall_timeout: Duration,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            overall_timeout: DEFAULT_OVERALL_TIMEOUT,
        }
    }
}

impl TrackingConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = timeout;
        self
    }
}

/// What `submit` achieved before returning.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// A job was queued and is now being tracked.
    Tracking { job_id: String },
    /// The backend created the stream synchronously.
    Completed,
    /// The modal was closed while the request was in flight; the response was dropped.
    Discarded,
}

struct ActiveJob {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Tracks one stream creation job at a time.
pub struct JobTracker {
    api: Arc<dyn StreamApi>,
    hooks: Arc<dyn UiHooks>,
    config: TrackingConfig,
    default_platform: Platform,
    state: Arc<watch::Sender<StreamCreationState>>,
    active: Mutex<Option<ActiveJob>>,
    /// Bumped on every cleanup, so responses that arrive for an abandoned
    /// submission are recognised.
    generation: AtomicU64,
}

impl JobTracker {
    pub fn new(
        api: Arc<dyn StreamApi>,
        hooks: Arc<dyn UiHooks>,
        config: TrackingConfig,
        default_platform: Platform,
    ) -> Self {
        let (state, _) = watch::channel(StreamCreationState::default());
        Self {
            api,
            hooks,
            config,
            default_platform,
            state: Arc::new(state),
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Receive every change to the state record.
    pub fn subscribe(&self) -> watch::Receiver<StreamCreationState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> StreamCreationState {
        self.state.borrow().clone()
    }

    /// Validate and submit a creation request, then start tracking the job.
    ///
    /// Returns once the job is queued (tracking continues in the background) or
    /// the outcome is already known. Failures are reported through the hooks
    /// and the state record as well as the returned error.
    pub async fn submit(
        &self,
        request: CreateStreamRequest,
    ) -> Result<SubmitOutcome, TrackerError> {
        self.cleanup();
        let generation = self.generation.load(Ordering::SeqCst);
        self.state.send_modify(|s| s.begin(Instant::now()));

        let request = match request.normalize(self.default_platform) {
            Ok(request) => request,
            Err(e) => return Err(self.fail_submission(e)),
        };

        info!(
            room_url = request.room_url.as_deref().unwrap_or_default(),
            platform = %request.platform.unwrap_or_default(),
            "Creating stream"
        );
        let response = self.api.create_job(&request).await;

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Submission abandoned before the backend answered");
            return Ok(SubmitOutcome::Discarded);
        }

        match response {
            Ok(CreateJobResponse::Queued { job_id, .. }) => {
                info!(job_id = %job_id, "Stream creation queued");
                self.state
                    .send_modify(|s| s.start_tracking(job_id.clone()));
                self.spawn_driver(job_id.clone());
                Ok(SubmitOutcome::Tracking { job_id })
            }
            Ok(CreateJobResponse::Completed { stream }) => {
                info!("Stream created synchronously");
                let mut effects = Vec::new();
                self.state
                    .send_modify(|s| effects = s.complete_synchronously(stream));
                hooks::dispatch(self.hooks.as_ref(), &effects);
                Ok(SubmitOutcome::Completed)
            }
            Err(e) => Err(self.fail_submission(e)),
        }
    }

    /// Follow an already-queued job, e.g. one submitted from another session.
    pub fn track(&self, job_id: impl Into<String>) {
        let job_id = job_id.into();
        self.cleanup();
        self.state
            .send_modify(|s| s.attach_job(job_id.clone(), Instant::now()));
        self.spawn_driver(job_id);
    }

    /// Stop listening and polling. Idempotent; safe with no job active.
    ///
    /// A creation request still in flight is abandoned: its response will not
    /// start tracking.
    pub fn cleanup(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(job) = self.lock_active().take() {
            debug!("Releasing live channel and poll timer");
            job.cancel.cancel();
            job.task.abort();
        }
        self.state.send_if_modified(|s| {
            let before = s.phase;
            s.detach();
            before != s.phase
        });
    }

    /// Closing the creation modal releases everything and forgets the job.
    pub fn close_modal(&self) {
        self.cleanup();
        self.state.send_modify(|s| s.reset());
    }

    /// Wait until the current job reaches a terminal state.
    pub async fn wait_for_outcome(&self) -> StreamCreationState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|s| s.is_terminal()).await {
            Ok(state) => state.clone(),
            // The sender lives as long as `self`.
            Err(_) => self.snapshot(),
        }
    }

    /// End the tracker's lifecycle, waiting for the background task to stop.
    pub async fn dispose(self) {
        let job = self.lock_active().take();
        if let Some(job) = job {
            job.cancel.cancel();
            let _ = job.task.await;
        }
        self.state.send_if_modified(|s| {
            let before = s.phase;
            s.detach();
            before != s.phase
        });
    }

    fn spawn_driver(&self, job_id: String) {
        let cancel = CancellationToken::new();
        let driver = Driver {
            api: self.api.clone(),
            hooks: self.hooks.clone(),
            state: self.state.clone(),
            config: self.config,
            job_id,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(driver.run());
        *self.lock_active() = Some(ActiveJob { cancel, task });
    }

    fn fail_submission(&self, err: TrackerError) -> TrackerError {
        tracing::error!(error = %err, "Stream creation failed");
        let mut effects = Vec::new();
        self.state
            .send_modify(|s| effects = s.fail_submission(&err));
        hooks::dispatch(self.hooks.as_ref(), &effects);
        err
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveJob>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for JobTracker {
    fn drop(&mut self) {
        if let Some(job) = self.lock_active().take() {
            job.cancel.cancel();
            job.task.abort();
        }
    }
}
