//! Notifier Adapters
//!
//! - `LogNotifier`: events as tracing records
//! - `WebhookNotifier`: Discord, Slack or Telegram delivery from a background task
//! - `FanoutNotifier`: forwards to several notifiers

mod log;
mod webhook;

use std::sync::Arc;

use crate::ports::{Notifier, TradeEvent};

pub use self::log::LogNotifier;
pub use webhook::{WebhookNotifier, WebhookTarget};

pub struct FanoutNotifier {
    sinks: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(sinks: Vec<Arc<dyn Notifier>>) -> Self {
        Self { sinks }
    }
}

impl Notifier for FanoutNotifier {
    fn notify(&self, event: TradeEvent) {
        for sink in &self.sinks {
            sink.notify(event.clone());
        }
    }
}
