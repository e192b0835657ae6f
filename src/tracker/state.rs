//! The stream creation record and its state machine.
//!
//! Every transition is a method on [`StreamCreationState`] that checks the
//! current [`Phase`] first and returns the [`Effect`]s the driver must carry
//! out. Events that arrive in the wrong phase (a late poll tick, a second
//! completion message, an error from a channel that is already gone) return no
//! effects, which is what makes the terminal outcome idempotent.

use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::api::JobProgress;
use crate::errors::{ErrorKind, TrackerError};

pub const SUCCESS_MESSAGE: &str = "Stream created successfully";
pub const SUBMIT_FAILED_NOTICE: &str = "Failed to create stream";
const INITIAL_MESSAGE: &str = "Initializing...";
const POLL_DEFAULT_MESSAGE: &str = "Processing...";

/// Where the job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// Creation request in flight.
    Submitting,
    /// Live channel opened, nothing heard from it yet.
    AwaitingChannelOpen,
    /// Live channel confirmed alive.
    ChannelActive,
    /// Polling the status endpoint.
    Polling,
    Succeeded,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed)
    }

    /// A live channel is held only in these phases.
    pub fn holds_channel(self) -> bool {
        matches!(self, Phase::AwaitingChannelOpen | Phase::ChannelActive)
    }

    /// A poll timer is held only in this phase.
    pub fn holds_poll_timer(self) -> bool {
        self == Phase::Polling
    }

    pub fn is_tracking(self) -> bool {
        self.holds_channel() || self.holds_poll_timer()
    }
}

/// Work the driver performs after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    CloseChannel,
    StartPolling,
    StopPolling,
    NotifySuccess(String),
    NotifyError(String),
    RefreshDashboard,
    CloseModal,
}

/// Everything the UI knows about the current creation job.
#[derive(Debug, Clone, Default)]
pub struct StreamCreationState {
    pub phase: Phase,
    pub is_submitting: bool,
    /// Last known completion percentage, 0..=100.
    pub progress: u8,
    pub progress_message: String,
    pub job_id: Option<String>,
    /// Server estimate in seconds, 0 when unknown.
    pub estimated_time: f64,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub submit_success: bool,
    pub submit_error: bool,
    pub start_time: Option<Instant>,
    /// Stream resource returned by the backend, when it sends one.
    pub stream: Option<Value>,
}

impl StreamCreationState {
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn has_live_channel(&self) -> bool {
        self.phase.holds_channel()
    }

    pub fn has_poll_timer(&self) -> bool {
        self.phase.holds_poll_timer()
    }

    /// Time since submission began.
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.start_time
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default()
    }

    /// Start a fresh submission.
    pub fn begin(&mut self, now: Instant) {
        *self = StreamCreationState {
            phase: Phase::Submitting,
            is_submitting: true,
            progress_message: INITIAL_MESSAGE.to_string(),
            start_time: Some(now),
            ..StreamCreationState::default()
        };
    }

    /// Drop back to a blank record.
    pub fn reset(&mut self) {
        *self = StreamCreationState::default();
    }

    /// The delivery handles were released from outside the state machine.
    /// An in-flight submission is abandoned the same way.
    pub fn detach(&mut self) {
        if self.phase.is_tracking() || self.phase == Phase::Submitting {
            debug!(phase = ?self.phase, "Tracking detached");
            self.phase = Phase::Idle;
            self.is_submitting = false;
        }
    }

    /// The backend accepted the job; the live channel is being opened.
    pub fn start_tracking(&mut self, job_id: String) {
        if self.phase != Phase::Submitting {
            return;
        }
        self.job_id = Some(job_id);
        self.phase = Phase::AwaitingChannelOpen;
    }

    /// Tracking an existing job without a submission of our own.
    pub fn attach_job(&mut self, job_id: String, now: Instant) {
        self.begin(now);
        self.start_tracking(job_id);
    }

    /// The creation request returned the finished stream.
    pub fn complete_synchronously(&mut self, stream: Option<Value>) -> Vec<Effect> {
        if self.phase != Phase::Submitting {
            return Vec::new();
        }
        self.stream = stream;
        self.progress = 100;
        self.resolve_success()
    }

    /// The creation request failed, or never left the client.
    pub fn fail_submission(&mut self, err: &TrackerError) -> Vec<Effect> {
        if self.phase != Phase::Submitting {
            return Vec::new();
        }
        self.set_failed(err.submission_message(), err.kind());
        vec![Effect::NotifyError(SUBMIT_FAILED_NOTICE.to_string())]
    }

    pub fn on_channel_open(&mut self) {
        if self.phase == Phase::AwaitingChannelOpen {
            debug!("Live channel established");
            self.phase = Phase::ChannelActive;
        }
    }

    /// A raw payload arrived on the live channel.
    pub fn on_channel_message(&mut self, data: &str) -> Vec<Effect> {
        if !self.phase.holds_channel() {
            return Vec::new();
        }
        // Any traffic proves the connection, even if the payload is garbage.
        self.on_channel_open();

        let update: JobProgress = match serde_json::from_str(data) {
            Ok(update) => update,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed progress message");
                return Vec::new();
            }
        };

        self.progress = clamp_progress(update.progress);
        self.progress_message = update.message.clone().unwrap_or_default();
        self.estimated_time = update.estimated_time.unwrap_or(0.0);

        if !update.is_complete() {
            return Vec::new();
        }

        let mut effects = vec![Effect::CloseChannel];
        effects.extend(self.resolve_update(&update));
        effects
    }

    /// The connection-establishment window elapsed.
    pub fn on_connect_timeout(&mut self) -> Vec<Effect> {
        if self.phase != Phase::AwaitingChannelOpen {
            return Vec::new();
        }
        warn!("Live channel did not open in time, falling back to polling");
        let notice = TrackerError::ChannelTimeout;
        self.error = Some(notice.to_string());
        self.error_kind = Some(notice.kind());
        self.phase = Phase::Polling;
        vec![Effect::CloseChannel, Effect::StartPolling]
    }

    /// The live channel signalled an error. `closed` is its ready state at
    /// that moment.
    pub fn on_channel_error(&mut self, closed: bool) -> Vec<Effect> {
        // Before establishment the connect timer owns the fallback.
        if self.phase != Phase::ChannelActive || !closed {
            return Vec::new();
        }
        warn!("Live channel lost, falling back to polling");
        self.phase = Phase::Polling;
        vec![Effect::CloseChannel, Effect::StartPolling]
    }

    /// A status request answered.
    pub fn on_poll_response(&mut self, update: &JobProgress) -> Vec<Effect> {
        if self.phase != Phase::Polling {
            return Vec::new();
        }
        self.progress = clamp_progress(update.progress);
        self.progress_message = update
            .message
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| POLL_DEFAULT_MESSAGE.to_string());
        if let Some(eta) = update.estimated_time {
            self.estimated_time = eta;
        }
        if update.stream_data.is_some() {
            self.stream = update.stream_data.clone();
        }

        if !update.is_complete() && update.job_error().is_none() {
            return Vec::new();
        }

        let mut effects = vec![Effect::StopPolling];
        effects.extend(self.resolve_update(update));
        effects
    }

    /// A status request failed. Tolerated until the ceiling has passed.
    pub fn on_poll_failure(&mut self, now: Instant, ceiling: Duration) -> Vec<Effect> {
        if self.phase != Phase::Polling || self.elapsed(now) <= ceiling {
            return Vec::new();
        }
        let mut effects = vec![Effect::StopPolling];
        effects.extend(self.resolve_error(&TrackerError::OverallTimeout));
        effects
    }

    /// The absolute deadline measured from submission passed.
    pub fn on_deadline(&mut self) -> Vec<Effect> {
        let release = match self.phase {
            Phase::AwaitingChannelOpen | Phase::ChannelActive => Effect::CloseChannel,
            Phase::Polling => Effect::StopPolling,
            _ => return Vec::new(),
        };
        let mut effects = vec![release];
        effects.extend(self.resolve_error(&TrackerError::OverallTimeout));
        effects
    }

    fn resolve_update(&mut self, update: &JobProgress) -> Vec<Effect> {
        match update.job_error() {
            Some(message) => self.resolve_error(&TrackerError::Job(message.to_string())),
            None => self.resolve_success(),
        }
    }

    fn resolve_success(&mut self) -> Vec<Effect> {
        if self.is_terminal() {
            return Vec::new();
        }
        self.phase = Phase::Succeeded;
        self.is_submitting = false;
        self.submit_success = true;
        self.error = None;
        self.error_kind = None;
        vec![
            Effect::RefreshDashboard,
            Effect::NotifySuccess(SUCCESS_MESSAGE.to_string()),
            Effect::CloseModal,
        ]
    }

    fn resolve_error(&mut self, err: &TrackerError) -> Vec<Effect> {
        if self.is_terminal() {
            return Vec::new();
        }
        let message = err.to_string();
        self.set_failed(message.clone(), err.kind());
        vec![Effect::NotifyError(message)]
    }

    fn set_failed(&mut self, message: String, kind: ErrorKind) {
        self.phase = Phase::Failed;
        self.is_submitting = false;
        self.submit_error = true;
        self.error = Some(message);
        self.error_kind = Some(kind);
    }
}

fn clamp_progress(progress: u32) -> u8 {
    progress.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{CONNECT_TIMEOUT_MESSAGE, INVALID_REQUEST_MESSAGE, OVERALL_TIMEOUT_MESSAGE};

    fn tracking(now: Instant) -> StreamCreationState {
        let mut state = StreamCreationState::default();
        state.begin(now);
        state.start_tracking("job-1".to_string());
        state
    }

    fn polling(now: Instant) -> StreamCreationState {
        let mut state = tracking(now);
        state.on_connect_timeout();
        state
    }

    fn progress(value: u32) -> JobProgress {
        JobProgress {
            progress: value,
            ..JobProgress::default()
        }
    }

    #[test]
    fn begin_marks_submission() {
        let now = Instant::now();
        let mut state = StreamCreationState::default();
        state.begin(now);
        assert_eq!(state.phase, Phase::Submitting);
        assert!(state.is_submitting);
        assert_eq!(state.progress_message, "Initializing...");
        assert_eq!(state.start_time, Some(now));
    }

    #[test]
    fn channel_message_updates_progress() {
        let mut state = tracking(Instant::now());
        let effects =
            state.on_channel_message(r#"{"progress": 40, "message": "Scraping", "estimated_time": 12}"#);
        assert!(effects.is_empty());
        assert_eq!(state.phase, Phase::ChannelActive);
        assert_eq!(state.progress, 40);
        assert_eq!(state.progress_message, "Scraping");
        assert_eq!(state.estimated_time, 12.0);
    }

    #[test]
    fn malformed_message_still_establishes_channel() {
        let mut state = tracking(Instant::now());
        assert!(state.on_channel_message("{not json").is_empty());
        assert_eq!(state.phase, Phase::ChannelActive);
        assert!(!state.is_terminal());
        assert!(state.on_connect_timeout().is_empty());
    }

    #[test]
    fn completion_on_channel_succeeds_once() {
        let mut state = tracking(Instant::now());
        let effects = state.on_channel_message(r#"{"progress": 100, "message": "Done"}"#);
        assert_eq!(
            effects,
            vec![
                Effect::CloseChannel,
                Effect::RefreshDashboard,
                Effect::NotifySuccess(SUCCESS_MESSAGE.to_string()),
                Effect::CloseModal,
            ]
        );
        assert!(state.submit_success);
        assert!(!state.submit_error);
        assert!(!state.is_submitting);

        assert!(state.on_channel_message(r#"{"progress": 100}"#).is_empty());
        assert!(state.on_poll_response(&progress(100)).is_empty());
        assert!(state.on_deadline().is_empty());
    }

    #[test]
    fn completion_with_error_fails_on_channel() {
        let mut state = tracking(Instant::now());
        let effects = state.on_channel_message(r#"{"progress": 100, "error": "boom"}"#);
        assert_eq!(
            effects,
            vec![Effect::CloseChannel, Effect::NotifyError("boom".to_string())]
        );
        assert!(state.submit_error);
        assert!(!state.submit_success);
        assert_eq!(state.error.as_deref(), Some("boom"));
        assert_eq!(state.error_kind, Some(ErrorKind::Job));
    }

    #[test]
    fn error_below_completion_is_ignored_on_channel() {
        let mut state = tracking(Instant::now());
        let effects = state.on_channel_message(r#"{"progress": 50, "error": "transient"}"#);
        assert!(effects.is_empty());
        assert!(!state.is_terminal());
    }

    #[test]
    fn connect_timeout_switches_to_polling_without_outcome() {
        let mut state = tracking(Instant::now());
        let effects = state.on_connect_timeout();
        assert_eq!(effects, vec![Effect::CloseChannel, Effect::StartPolling]);
        assert_eq!(state.phase, Phase::Polling);
        assert!(state.has_poll_timer());
        assert!(!state.has_live_channel());
        assert!(!state.submit_error);
        assert!(state.is_submitting);
        assert_eq!(state.error.as_deref(), Some(CONNECT_TIMEOUT_MESSAGE));
        assert_eq!(state.error_kind, Some(ErrorKind::ChannelTimeout));
    }

    #[test]
    fn connect_timeout_after_open_is_ignored() {
        let mut state = tracking(Instant::now());
        state.on_channel_open();
        assert!(state.on_connect_timeout().is_empty());
        assert_eq!(state.phase, Phase::ChannelActive);
    }

    #[test]
    fn channel_error_requires_establishment_and_closed_state() {
        let mut state = tracking(Instant::now());
        assert!(state.on_channel_error(true).is_empty());
        assert_eq!(state.phase, Phase::AwaitingChannelOpen);

        state.on_channel_open();
        assert!(state.on_channel_error(false).is_empty());
        assert_eq!(state.phase, Phase::ChannelActive);

        let effects = state.on_channel_error(true);
        assert_eq!(effects, vec![Effect::CloseChannel, Effect::StartPolling]);
        assert_eq!(state.phase, Phase::Polling);

        // A second error from the same, now released, channel does nothing.
        assert!(state.on_channel_error(true).is_empty());
    }

    #[test]
    fn poll_response_uses_default_message() {
        let mut state = polling(Instant::now());
        assert!(state.on_poll_response(&progress(30)).is_empty());
        assert_eq!(state.progress, 30);
        assert_eq!(state.progress_message, "Processing...");
    }

    #[test]
    fn poll_error_below_completion_is_terminal() {
        let mut state = polling(Instant::now());
        let update = JobProgress {
            progress: 20,
            error: Some("Scrape failed".to_string()),
            ..JobProgress::default()
        };
        let effects = state.on_poll_response(&update);
        assert_eq!(
            effects,
            vec![
                Effect::StopPolling,
                Effect::NotifyError("Scrape failed".to_string())
            ]
        );
        assert_eq!(state.phase, Phase::Failed);
    }

    #[test]
    fn poll_completion_with_error_yields_error() {
        let mut state = polling(Instant::now());
        let update = JobProgress {
            progress: 100,
            error: Some("boom".to_string()),
            ..JobProgress::default()
        };
        state.on_poll_response(&update);
        assert!(state.submit_error);
        assert!(!state.submit_success);
        assert_eq!(state.error.as_deref(), Some("boom"));
    }

    #[test]
    fn poll_success_clears_connect_timeout_notice_and_keeps_stream() {
        let mut state = polling(Instant::now());
        let update = JobProgress {
            progress: 100,
            stream_data: Some(serde_json::json!({"id": 9})),
            ..JobProgress::default()
        };
        let effects = state.on_poll_response(&update);
        assert_eq!(effects[0], Effect::StopPolling);
        assert!(effects.contains(&Effect::RefreshDashboard));
        assert!(state.submit_success);
        assert!(state.error.is_none());
        assert_eq!(state.stream, Some(serde_json::json!({"id": 9})));
    }

    #[test]
    fn poll_failure_tolerated_until_ceiling() {
        let start = Instant::now();
        let ceiling = Duration::from_secs(300);
        let mut state = polling(start);

        assert!(state.on_poll_failure(start + Duration::from_secs(10), ceiling).is_empty());
        assert!(state.on_poll_failure(start + ceiling, ceiling).is_empty());
        assert_eq!(state.phase, Phase::Polling);

        let effects = state.on_poll_failure(start + Duration::from_secs(301), ceiling);
        assert_eq!(
            effects,
            vec![
                Effect::StopPolling,
                Effect::NotifyError(OVERALL_TIMEOUT_MESSAGE.to_string())
            ]
        );
        assert_eq!(state.error_kind, Some(ErrorKind::OverallTimeout));
    }

    #[test]
    fn deadline_releases_whichever_handle_is_held() {
        let mut live = tracking(Instant::now());
        assert_eq!(live.on_deadline()[0], Effect::CloseChannel);
        assert!(live.submit_error);

        let mut polled = polling(Instant::now());
        assert_eq!(polled.on_deadline()[0], Effect::StopPolling);

        let mut idle = StreamCreationState::default();
        assert!(idle.on_deadline().is_empty());
    }

    #[test]
    fn terminal_flags_are_exclusive() {
        let mut state = tracking(Instant::now());
        state.on_channel_message(r#"{"progress": 100, "error": "boom"}"#);
        state.on_channel_message(r#"{"progress": 100}"#);
        state.on_deadline();
        assert!(state.submit_error);
        assert!(!state.submit_success);
        assert_eq!(state.error.as_deref(), Some("boom"));
    }

    #[test]
    fn no_progress_mutation_after_terminal() {
        let mut state = polling(Instant::now());
        state.on_poll_response(&progress(100));
        state.on_poll_response(&JobProgress {
            progress: 10,
            message: Some("stale".to_string()),
            ..JobProgress::default()
        });
        assert_eq!(state.progress, 100);
        assert_ne!(state.progress_message, "stale");
    }

    #[test]
    fn submission_failures_notify_generic_text() {
        let mut state = StreamCreationState::default();
        state.begin(Instant::now());
        let err = TrackerError::Validation(INVALID_REQUEST_MESSAGE.to_string());
        let effects = state.fail_submission(&err);
        assert_eq!(
            effects,
            vec![Effect::NotifyError(SUBMIT_FAILED_NOTICE.to_string())]
        );
        assert_eq!(state.error.as_deref(), Some(INVALID_REQUEST_MESSAGE));
        assert_eq!(state.error_kind, Some(ErrorKind::Validation));
        assert!(!state.is_submitting);
    }

    #[test]
    fn synchronous_completion_succeeds() {
        let mut state = StreamCreationState::default();
        state.begin(Instant::now());
        let effects = state.complete_synchronously(None);
        assert!(effects.contains(&Effect::CloseModal));
        assert_eq!(state.progress, 100);
        assert!(state.submit_success);
    }

    #[test]
    fn progress_is_clamped() {
        let mut state = polling(Instant::now());
        state.on_poll_response(&progress(250));
        assert_eq!(state.progress, 100);
    }

    #[test]
    fn detach_releases_tracking_but_keeps_outcome() {
        let mut state = polling(Instant::now());
        state.detach();
        assert_eq!(state.phase, Phase::Idle);
        assert!(!state.has_poll_timer());

        let mut done = tracking(Instant::now());
        done.on_channel_message(r#"{"progress": 100}"#);
        done.detach();
        assert_eq!(done.phase, Phase::Succeeded);

        let mut submitting = StreamCreationState::default();
        submitting.begin(Instant::now());
        submitting.detach();
        assert_eq!(submitting.phase, Phase::Idle);
        assert!(!submitting.is_submitting);
    }
}
