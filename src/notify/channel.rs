use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::Serialize;
use tracing::warn;

const DEFAULT_ENDPOINT: &str = "http://localhost:21465/api/sendMessage";
const DEFAULT_TIMEOUT_SECS: u64 = 5;

#[derive(Clone, Debug)]
pub struct ChannelConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ChannelConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(endpoint) = env::var("SURVEI_CHANNEL_URL") {
            cfg.endpoint = endpoint;
        }
        if let Ok(timeout) = env::var("SURVEI_CHANNEL_TIMEOUT_SECS") {
            if let Ok(parsed) = timeout.parse::<u64>() {
                cfg.timeout = Duration::from_secs(parsed);
            }
        }
        cfg
    }
}

/// Delivery capability: `true` only when the gateway confirms the send.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn send(&self, phone: &str, text: &str) -> bool;
}

#[derive(Serialize)]
struct SendMessageBody<'a> {
    phone: &'a str,
    message: &'a str,
}

/// Posts `{phone, message}` to a local WhatsApp gateway. Transport detail is
/// logged without an op tag; the dispatcher reports the outcome under its caller's op.
#[derive(Clone)]
pub struct HttpChannel {
    http: HttpClient,
    cfg: ChannelConfig,
}

impl HttpChannel {
    pub fn new(cfg: ChannelConfig) -> Result<Self, reqwest::Error> {
        let http = HttpClient::builder().timeout(cfg.timeout).build()?;
        Ok(Self { http, cfg })
    }
}

#[async_trait]
impl MessageChannel for HttpChannel {
    async fn send(&self, phone: &str, text: &str) -> bool {
        let body = SendMessageBody { phone, message: text };
        match self.http.post(&self.cfg.endpoint).json(&body).send().await {
            Ok(resp) if resp.status() == StatusCode::OK => true,
            Ok(resp) => {
                warn!(phone, status = resp.status().as_u16(), "gateway rejected message");
                false
            }
            Err(e) => {
                warn!(phone, error = %e, "gateway unreachable");
                false
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;

    fn channel_at(endpoint: String) -> HttpChannel {
        HttpChannel::new(ChannelConfig { endpoint, timeout: Duration::from_secs(5) }).unwrap()
    }

    #[tokio::test]
    async fn posts_phone_and_message_as_json() {
        let (base, seen) = serve(vec![(200, br#"{"success":true}"#.to_vec(), vec![])]).await;
        let ch = channel_at(format!("{base}/api/sendMessage"));
        assert!(ch.send("6281234567890", "halo").await);
        let seen = seen.lock().unwrap();
        assert!(seen[0].request_line.starts_with("POST /api/sendMessage"));
        let body: serde_json::Value = serde_json::from_str(&seen[0].body).unwrap();
        assert_eq!(body, serde_json::json!({"phone": "6281234567890", "message": "halo"}));
    }

    #[tokio::test]
    async fn only_200_counts_as_delivered() {
        let (base, _) = serve(vec![(503, br#"{"success":false}"#.to_vec(), vec![]), (201, Vec::new(), vec![])]).await;
        let ch = channel_at(base);
        assert!(!ch.send("1", "x").await);
        assert!(!ch.send("1", "x").await);
    }

    #[tokio::test]
    async fn transport_error_is_a_failed_send() {
        // bind then drop to get a port nobody listens on
        let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let ch = channel_at(format!("http://127.0.0.1:{port}/api/sendMessage"));
        assert!(!ch.send("1", "x").await);
    }

    #[tokio::test]
    async fn rejection_detail_carries_no_op_tag() {
        let (_guard, logs) = crate::test_support::capture_json_logs();
        let (base, _) = serve(vec![(500, Vec::new(), vec![])]).await;
        assert!(!channel_at(base).send("628333", "x").await);
        let out = logs.text();
        assert!(out.contains("gateway rejected message"));
        assert!(out.contains(r#""status":500"#));
        assert!(!out.contains(r#""op":"#));
    }
}
