use tracing::{error, info};

use super::state::Effect;

/// Callbacks into the surrounding UI.
///
/// Each job triggers at most one notification, and on success one refresh and
/// one modal close.
pub trait UiHooks: Send + Sync {
    fn notify_success(&self, message: &str);
    fn notify_error(&self, message: &str);
    fn refresh_dashboard(&self);
    fn close_creation_modal(&self);
}

/// Hooks that only write to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHooks;

impl UiHooks for LogHooks {
    fn notify_success(&self, message: &str) {
        info!("{}", message);
    }

    fn notify_error(&self, message: &str) {
        error!("{}", message);
    }

    fn refresh_dashboard(&self) {
        info!("Dashboard refresh requested");
    }

    fn close_creation_modal(&self) {
        info!("Creation modal close requested");
    }
}

/// Forward the UI-facing effects; delivery effects are left to the driver.
pub(crate) fn dispatch(hooks: &dyn UiHooks, effects: &[Effect]) {
    for effect in effects {
        match effect {
            Effect::NotifySuccess(message) => hooks.notify_success(message),
            Effect::NotifyError(message) => hooks.notify_error(message),
            Effect::RefreshDashboard => hooks.refresh_dashboard(),
            Effect::CloseModal => hooks.close_creation_modal(),
            Effect::CloseChannel | Effect::StartPolling | Effect::StopPolling => {}
        }
    }
}
