use crate::tracker::{Phase, StreamCreationState, UiHooks};
use crate::ui::icons::{CHECK, CLOCK, CROSS, LIVE, PIVOT, SPARKLE};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

/// Terminal rendering of a stream creation job.
///
/// A single bar tracks the job's completion percentage; its message shows the
/// backend's status line and the ETA when one is known. Delivery switches
/// (live channel to polling) are printed above the bar.
pub struct CreationUI {
    bar: ProgressBar,
    verbose: bool,
    last_phase: Mutex<Phase>,
}

impl CreationUI {
    pub fn new(verbose: bool) -> Self {
        let style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} {spinner} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let bar = ProgressBar::new(100);
        bar.set_style(style);
        bar.set_prefix("Stream");
        bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            bar,
            verbose,
            last_phase: Mutex::new(Phase::Idle),
        }
    }

    /// A bar that draws nothing, for non-interactive runs.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            verbose: false,
            last_phase: Mutex::new(Phase::Idle),
        }
    }

    /// Print a line above the bar.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.bar.is_hidden() {
            return;
        }
        self.bar.println(msg.as_ref());
    }

    pub fn start(&self, room_url: &str) {
        self.print_line(format!(
            "{}Creating stream for {}",
            SPARKLE,
            style(room_url).cyan()
        ));
    }

    /// Redraw from the latest state snapshot.
    pub fn render(&self, state: &StreamCreationState) {
        self.bar.set_position(u64::from(state.progress));

        let mut message = state.progress_message.clone();
        if state.estimated_time > 0.0 && !state.is_terminal() {
            message = format!(
                "{} {}",
                message,
                style(format!("{}~{:.0}s", CLOCK, state.estimated_time)).dim()
            );
        }
        self.bar.set_message(message);

        let mut last = self
            .last_phase
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if *last == state.phase {
            return;
        }
        match state.phase {
            Phase::ChannelActive if self.verbose => {
                self.print_line(format!("  {}{}", LIVE, style("live updates connected").dim()));
            }
            Phase::Polling => {
                let reason = state.error.as_deref().unwrap_or("live updates lost");
                self.print_line(format!(
                    "  {}{} {}",
                    PIVOT,
                    style("polling for status").yellow(),
                    style(format!("({})", reason)).dim()
                ));
            }
            _ => {}
        }
        *last = state.phase;
    }

    pub fn finish_success(&self, message: &str) {
        self.bar.finish_with_message(format!("{}{}", CHECK, style(message).green()));
    }

    pub fn finish_error(&self, message: &str) {
        self.bar.abandon_with_message(format!("{}{}", CROSS, style(message).red()));
    }
}

/// [`UiHooks`] for the command line: notifications go to the progress bar,
/// dashboard refresh and modal close have nothing to act on beyond a note.
pub struct TerminalHooks {
    ui: std::sync::Arc<CreationUI>,
}

impl TerminalHooks {
    pub fn new(ui: std::sync::Arc<CreationUI>) -> Self {
        Self { ui }
    }
}

impl UiHooks for TerminalHooks {
    fn notify_success(&self, message: &str) {
        self.ui.finish_success(message);
    }

    fn notify_error(&self, message: &str) {
        self.ui.finish_error(message);
    }

    fn refresh_dashboard(&self) {
        tracing::debug!("Dashboard refresh requested");
    }

    fn close_creation_modal(&self) {
        tracing::debug!("Creation modal close requested");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_ui_tracks_progress_without_a_terminal() {
        let ui = CreationUI::hidden();
        let state = StreamCreationState {
            phase: Phase::Polling,
            progress: 60,
            progress_message: "Processing...".to_string(),
            estimated_time: 12.0,
            ..StreamCreationState::default()
        };
        ui.render(&state);
        assert_eq!(ui.bar.position(), 60);
        assert!(ui.bar.message().contains("Processing..."));
        assert_eq!(*ui.last_phase.lock().unwrap(), Phase::Polling);
    }

    #[test]
    fn finish_error_keeps_message() {
        let ui = CreationUI::hidden();
        ui.finish_error("boom");
        assert!(ui.bar.message().contains("boom"));
        assert!(ui.bar.is_finished());
    }
}
