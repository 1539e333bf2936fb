use crate::domain::ports::user_notifier::UserNotifier;
use tracing::{error, info};

/// Notifier for headless clients: toasts become log lines under the `toast` target
#[derive(Clone, Default)]
pub struct TracingNotifier;

impl TracingNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl UserNotifier for TracingNotifier {
    fn error(&self, message: &str) {
        error!(target: "toast", "{}", message);
    }

    fn info(&self, message: &str) {
        info!(target: "toast", "{}", message);
    }
}
