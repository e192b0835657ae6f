//! The task that drives one tracked job.
//!
//! All inputs for the job (channel events, the connect timer, poll ticks, the
//! absolute deadline and cancellation) are multiplexed in a single
//! `tokio::select!` loop, so transitions for a job never run concurrently.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::TrackingConfig;
use super::hooks::{self, UiHooks};
use super::state::{Effect, Phase, StreamCreationState};
use crate::api::{ChannelEvent, LiveChannel, ReadyState, StreamApi};

/// Horizon used in place of durations too large to add to an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

pub(crate) struct Driver {
    pub(crate) api: Arc<dyn StreamApi>,
    pub(crate) hooks: Arc<dyn UiHooks>,
    pub(crate) state: Arc<watch::Sender<StreamCreationState>>,
    pub(crate) config: TrackingConfig,
    pub(crate) job_id: String,
    pub(crate) cancel: CancellationToken,
}

impl Driver {
    pub(crate) async fn run(self) {
        let start = self
            .state
            .borrow()
            .start_time
            .unwrap_or_else(Instant::now);
        let connect_deadline =
            sleep_until(deadline_after(Instant::now(), self.config.connect_timeout));
        let overall_deadline = sleep_until(deadline_after(start, self.config.overall_timeout));
        tokio::pin!(connect_deadline);
        tokio::pin!(overall_deadline);

        debug!(job_id = %self.job_id, "Opening live channel");
        let mut channel = Some(self.api.open_channel(&self.job_id));
        let mut poll: Option<Interval> = None;

        loop {
            // Terminal transitions release their handle in the same step, so
            // nothing is left open once the phase stops tracking.
            let phase = self.phase();
            if !phase.is_tracking() {
                break;
            }

            let effects = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(job_id = %self.job_id, "Tracking cancelled");
                    break;
                }
                event = next_channel_event(&mut channel) => {
                    self.handle_channel_event(event, channel.as_ref())
                }
                _ = &mut connect_deadline, if phase == Phase::AwaitingChannelOpen => {
                    self.transition(|s| s.on_connect_timeout())
                }
                _ = next_tick(&mut poll) => {
                    self.poll_once().await
                }
                _ = &mut overall_deadline, if phase.is_tracking() => {
                    warn!(job_id = %self.job_id, "Overall tracking deadline reached");
                    self.transition(|s| s.on_deadline())
                }
            };

            self.apply(&effects, &mut channel, &mut poll);
        }

        if let Some(mut channel) = channel.take() {
            channel.close();
        }
    }

    fn phase(&self) -> Phase {
        self.state.borrow().phase
    }

    fn transition(
        &self,
        f: impl FnOnce(&mut StreamCreationState) -> Vec<Effect>,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.state.send_modify(|s| effects = f(s));
        effects
    }

    fn handle_channel_event(
        &self,
        event: ChannelEvent,
        channel: Option<&LiveChannel>,
    ) -> Vec<Effect> {
        match event {
            ChannelEvent::Open => {
                self.state.send_modify(|s| s.on_channel_open());
                Vec::new()
            }
            ChannelEvent::Message(data) => self.transition(|s| s.on_channel_message(&data)),
            ChannelEvent::Error => {
                let closed = channel
                    .map(|c| c.ready_state() == ReadyState::Closed)
                    .unwrap_or(true);
                debug!(job_id = %self.job_id, closed, "Live channel error");
                self.transition(|s| s.on_channel_error(closed))
            }
        }
    }

    async fn poll_once(&self) -> Vec<Effect> {
        match self.api.job_status(&self.job_id).await {
            Ok(update) => self.transition(|s| s.on_poll_response(&update)),
            Err(e) => {
                warn!(job_id = %self.job_id, error = %e, "Status poll failed");
                let ceiling = self.config.overall_timeout;
                self.transition(|s| s.on_poll_failure(Instant::now(), ceiling))
            }
        }
    }

    fn apply(
        &self,
        effects: &[Effect],
        channel: &mut Option<LiveChannel>,
        poll: &mut Option<Interval>,
    ) {
        for effect in effects {
            match effect {
                Effect::CloseChannel => {
                    if let Some(mut live) = channel.take() {
                        live.close();
                    }
                }
                Effect::StartPolling => {
                    info!(job_id = %self.job_id, "Polling for job status");
                    let period = self.config.poll_interval.min(FAR_FUTURE);
                    let mut ticker = interval_at(deadline_after(Instant::now(), period), period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    *poll = Some(ticker);
                }
                Effect::StopPolling => *poll = None,
                _ => {}
            }
        }
        hooks::dispatch(self.hooks.as_ref(), effects);
    }
}

/// `base + after`, saturating at [`FAR_FUTURE`] instead of overflowing.
fn deadline_after(base: Instant, after: Duration) -> Instant {
    base.checked_add(after.min(FAR_FUTURE))
        .unwrap_or_else(|| base + Duration::from_secs(86_400))
}

async fn next_channel_event(channel: &mut Option<LiveChannel>) -> ChannelEvent {
    match channel {
        Some(channel) => channel.next_event().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(poll: &mut Option<Interval>) {
    match poll {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
