use crate::ports::{Notifier, TradeEvent};

/// Writes every event to the log. Critical events go out at warn.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: TradeEvent) {
        if event.is_critical() {
            tracing::warn!(target: "tradewind::events", "{}", event);
        } else {
            tracing::info!(target: "tradewind::events", "{}", event);
        }
    }
}
