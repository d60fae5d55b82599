use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::telemetry;
use super::decode;

/// One intercepted request/response pair, as observed by the session.
#[derive(Clone, Debug)]
pub struct CapturedExchange {
    pub url: String,
    pub method: String,
    pub raw_body: Option<Bytes>,
    pub http_status: u16,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct DecodedPayload {
    pub url: String,
    pub method: String,
    /// `None` when the body could not be decoded; the reason is logged at decode time.
    pub document: Option<Value>,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("session is not instrumented for traffic interception")]
    CaptureUnavailable,
}

/// Selects exchanges whose URL contains `target` and decodes each one, in
/// traffic order. `None` means the session cannot observe traffic at all,
/// which is different from observing no matching traffic.
pub fn capture(traffic: Option<&[CapturedExchange]>, target: &str) -> Result<Vec<DecodedPayload>, CaptureError> {
    let log = telemetry::capture();
    let traffic = traffic.ok_or(CaptureError::CaptureUnavailable)?;

    let mut out = Vec::new();
    for ex in traffic.iter().filter(|ex| ex.url.contains(target)) {
        log.info_kv("🔎 matched", [("url", ex.url.clone()), ("method", ex.method.clone()), ("status", ex.http_status.to_string())]);
        let document = match decode::decode(ex.raw_body.as_deref()) {
            Ok(doc) => Some(doc),
            Err(e) => {
                log.warn_kv("⚠️ decode failed", [("url", ex.url.clone()), ("error", e.to_string())]);
                None
            }
        };
        out.push(DecodedPayload { url: ex.url.clone(), method: ex.method.clone(), document });
    }
    if out.is_empty() {
        log.warn_kv("no requests matched", [("target", target.to_string()), ("observed", traffic.len().to_string())]);
    }
    Ok(out)
}
