//! Webhook notifier
//!
//! `notify` only formats the event and pushes it onto an unbounded channel.
//! A background task owns the HTTP client and posts each message to every
//! target; delivery failures are logged and dropped.

use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tokio::sync::mpsc;

use crate::ports::{Notifier, TradeEvent};

const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookTarget {
    Discord { url: String },
    /// Any endpoint accepting `{"text": ...}`
    Slack { url: String },
    Telegram { bot_token: String, chat_id: String },
}

impl WebhookTarget {
    /// Discord URLs are recognised by host, everything else is posted
    /// Slack-style
    pub fn from_url(url: &str) -> Self {
        if url.contains("discord.com/api/webhooks") || url.contains("discordapp.com/api/webhooks") {
            WebhookTarget::Discord { url: url.to_string() }
        } else {
            WebhookTarget::Slack { url: url.to_string() }
        }
    }

    fn endpoint(&self) -> String {
        match self {
            WebhookTarget::Discord { url } | WebhookTarget::Slack { url } => url.clone(),
            WebhookTarget::Telegram { bot_token, .. } => {
                format!("{}/bot{}/sendMessage", TELEGRAM_API, bot_token)
            }
        }
    }

    fn payload(&self, text: &str) -> serde_json::Value {
        match self {
            WebhookTarget::Discord { .. } => json!({ "content": text }),
            WebhookTarget::Slack { .. } => json!({ "text": text }),
            WebhookTarget::Telegram { chat_id, .. } => json!({
                "chat_id": chat_id,
                "text": text,
                "disable_web_page_preview": true,
            }),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            WebhookTarget::Discord { .. } => "discord",
            WebhookTarget::Slack { .. } => "slack",
            WebhookTarget::Telegram { .. } => "telegram",
        }
    }
}

pub struct WebhookNotifier {
    tx: mpsc::UnboundedSender<String>,
    /// Only critical events are forwarded
    quiet: bool,
}

impl WebhookNotifier {
    /// Start the delivery task. Must be called inside a tokio runtime.
    pub fn spawn(targets: Vec<WebhookTarget>, quiet: bool, timeout: Duration) -> Self {
        let (notifier, mut rx) = Self::channel(quiet);
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Webhook client build failed ({}), using defaults", e);
                Client::new()
            });

        tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                for target in &targets {
                    deliver(&http, target, &text).await;
                }
            }
            tracing::debug!("Webhook delivery task finished");
        });
        notifier
    }

    fn channel(quiet: bool) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, quiet }, rx)
    }
}

async fn deliver(http: &Client, target: &WebhookTarget, text: &str) {
    let result = http
        .post(target.endpoint())
        .json(&target.payload(text))
        .send()
        .await;
    match result {
        Ok(resp) if resp.status().is_success() => {}
        Ok(resp) => tracing::warn!("{} webhook returned {}", target.kind(), resp.status()),
        Err(e) => tracing::warn!("{} webhook failed: {}", target.kind(), e),
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, event: TradeEvent) {
        if self.quiet && !event.is_critical() {
            return;
        }
        if self.tx.send(event.to_string()).is_err() {
            tracing::debug!("Webhook task gone, dropping event");
        }
    }
}
