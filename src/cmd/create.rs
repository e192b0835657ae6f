//! Stream creation and job following: `streamwatch create`, `streamwatch watch`.

use anyhow::Result;
use std::sync::Arc;

use streamwatch::api::{CreateStreamRequest, Platform};
use streamwatch::config::Config;
use streamwatch::tracker::{JobTracker, StreamCreationState, SubmitOutcome};
use streamwatch::ui::{CreationUI, TerminalHooks};

use super::build_api;

pub async fn cmd_create(
    config: &Config,
    room_url: &str,
    platform: Option<Platform>,
    agent_id: Option<i64>,
    verbose: bool,
) -> Result<()> {
    let ui = Arc::new(new_ui(verbose));
    let tracker = new_tracker(config, ui.clone())?;

    let mut request = CreateStreamRequest::new(room_url);
    if let Some(platform) = platform {
        request = request.with_platform(platform);
    }
    if let Some(agent_id) = agent_id {
        request = request.with_agent(agent_id);
    }

    ui.start(room_url.trim());
    match tracker.submit(request).await? {
        SubmitOutcome::Tracking { job_id } => {
            tracing::debug!(job_id = %job_id, "Following creation job");
        }
        SubmitOutcome::Completed | SubmitOutcome::Discarded => {}
    }

    let outcome = follow(&tracker, &ui).await;
    tracker.dispose().await;
    report(&outcome)
}

pub async fn cmd_watch(config: &Config, job_id: &str, verbose: bool) -> Result<()> {
    let ui = Arc::new(new_ui(verbose));
    let tracker = new_tracker(config, ui.clone())?;

    tracker.track(job_id);
    let outcome = follow(&tracker, &ui).await;
    tracker.dispose().await;
    report(&outcome)
}

fn new_ui(verbose: bool) -> CreationUI {
    if console::Term::stderr().is_term() {
        CreationUI::new(verbose)
    } else {
        CreationUI::hidden()
    }
}

fn new_tracker(config: &Config, ui: Arc<CreationUI>) -> Result<JobTracker> {
    let api = build_api(config)?;
    Ok(JobTracker::new(
        api,
        Arc::new(TerminalHooks::new(ui)),
        config.tracking_config(),
        config.defaults.platform,
    ))
}

/// Render every state change until the job settles.
async fn follow(tracker: &JobTracker, ui: &CreationUI) -> StreamCreationState {
    let mut rx = tracker.subscribe();
    loop {
        let state = rx.borrow_and_update().clone();
        ui.render(&state);
        if state.is_terminal() || !state.phase.is_tracking() {
            return state;
        }
        if rx.changed().await.is_err() {
            return tracker.snapshot();
        }
    }
}

fn report(outcome: &StreamCreationState) -> Result<()> {
    if outcome.submit_success {
        if let Some(stream) = &outcome.stream {
            println!("{}", serde_json::to_string_pretty(stream)?);
        }
        return Ok(());
    }
    match &outcome.error {
        Some(message) => anyhow::bail!("{}", message),
        None => anyhow::bail!("Stream creation ended without a result"),
    }
}
