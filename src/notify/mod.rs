use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::config::Contact;
use crate::telemetry::ctx::{LogCtx, OpMarker};
use channel::MessageChannel;

pub mod channel;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    Sent,
    Failed,
}

impl DispatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStatus::Sent => "sent",
            DispatchStatus::Failed => "failed",
        }
    }
}

/// Outcome of one (message, recipient) delivery attempt. Never mutated after creation.
#[derive(Clone, Debug, Serialize)]
pub struct DispatchResult {
    pub recipient: Contact,
    pub status: DispatchStatus,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl DispatchResult {
    pub fn new(recipient: Contact, status: DispatchStatus, message: impl Into<String>) -> Self {
        Self { recipient, status, message: message.into(), at: Utc::now() }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct OutgoingMessage {
    pub text: String,
    pub recipients: Vec<Contact>,
}

#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub sent: usize,
    pub failed: usize,
    pub results: Vec<DispatchResult>,
}

impl RunSummary {
    pub fn from_results(results: Vec<DispatchResult>) -> Self {
        let sent = results.iter().filter(|r| r.status == DispatchStatus::Sent).count();
        Self { sent, failed: results.len() - sent, results }
    }
}

pub fn info_notice_text(today: NaiveDate) -> String {
    format!("ℹ️ No survey reminders to send for {}.", today.format("%Y-%m-%d"))
}

pub const DOWNLOAD_FAILED: &str = "failed to download survey data";
pub const LOAD_FAILED: &str = "failed to load stored survey data";

pub fn error_notice_text(context: &str, reason: &str) -> String {
    format!("❌ Error: {}.\n\nError: {}", context, reason)
}

/// Sends messages one recipient at a time, pausing between sends.
/// Delivery outcomes are logged under the caller's operation.
pub struct Dispatcher<'a, O: OpMarker> {
    channel: &'a dyn MessageChannel,
    pause: Duration,
    log: &'a LogCtx<O>,
}

impl<'a, O: OpMarker> Dispatcher<'a, O> {
    pub fn new(channel: &'a dyn MessageChannel, pause: Duration, log: &'a LogCtx<O>) -> Self {
        Self { channel, pause, log }
    }

    /// One attempt per (message, recipient), in order. Failures are recorded, not retried.
    pub async fn dispatch_all(&self, messages: &[OutgoingMessage]) -> Vec<DispatchResult> {
        let log = self.log;
        let mut results = Vec::new();
        for msg in messages {
            for contact in &msg.recipients {
                if !results.is_empty() && !self.pause.is_zero() {
                    tokio::time::sleep(self.pause).await;
                }
                let status = if self.channel.send(&contact.phone, &msg.text).await {
                    log.info_kv("✓ sent", [("name", contact.name.clone()), ("phone", contact.phone.clone())]);
                    DispatchStatus::Sent
                } else {
                    log.warn_kv("✗ failed", [("name", contact.name.clone()), ("phone", contact.phone.clone())]);
                    DispatchStatus::Failed
                };
                results.push(DispatchResult::new(contact.clone(), status, msg.text.clone()));
            }
        }
        results
    }

    /// Like `dispatch_all`, but when nothing at all was dispatched the
    /// administrators get `notice` instead, folded into the same result list.
    pub async fn dispatch_or_notify(&self, messages: &[OutgoingMessage], admins: &[Contact], notice: &str) -> Vec<DispatchResult> {
        let results = self.dispatch_all(messages).await;
        if !results.is_empty() {
            return results;
        }
        self.log.info_kv("nothing dispatched; notifying admins", [("admins", admins.len().to_string())]);
        self.dispatch_all(&[OutgoingMessage { text: notice.to_string(), recipients: admins.to_vec() }]).await
    }
}

/// Best-effort alert to administrators after a fatal workflow error.
/// Delivery problems are logged and swallowed.
pub async fn send_error_notice<O: OpMarker>(log: &LogCtx<O>, channel: &dyn MessageChannel, admins: &[Contact], pause: Duration, context: &str, reason: &str) -> Vec<DispatchResult> {
    if admins.is_empty() {
        log.warn("No admin contacts to notify");
        return Vec::new();
    }
    log.info_kv("sending error notice", [("admins", admins.len().to_string())]);
    let msg = OutgoingMessage { text: error_notice_text(context, reason), recipients: admins.to_vec() };
    let results = Dispatcher::new(channel, pause, log).dispatch_all(&[msg]).await;
    let failed = results.iter().filter(|r| r.status == DispatchStatus::Failed).count();
    if failed > 0 {
        log.warn_kv("error notice not fully delivered", [("failed", failed.to_string())]);
    }
    results
}
