use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT_ENCODING;
use reqwest::{Client, Method};
use thiserror::Error;
use url::Url;

use crate::config::Credentials;
use crate::telemetry;
use super::traffic::CapturedExchange;

const DEFAULT_LAUNCHER_URL: &str = "https://manajemen-mitra.bps.go.id/launcher";
const DEFAULT_LOGIN_URL: &str = "https://manajemen-mitra.bps.go.id/login";
const DEFAULT_DASHBOARD_URL: &str = "https://manajemen-mitra.bps.go.id/dashboard";
pub const DEFAULT_API_URL: &str = "https://mitra-api.bps.go.id/api/dashboard/kegiatan-aktif";
const DEFAULT_POLL_MS: u64 = 500;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("portal request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("login was rejected with status {0}")]
    Login(u16),
    #[error("portal was not ready within {0:?}")]
    Timeout(Duration),
    #[error("invalid portal URL {0:?}")]
    InvalidUrl(String),
}

/// An authenticated portal session that produces network traffic.
#[async_trait]
pub trait Session: Send {
    async fn open(&mut self, creds: &Credentials) -> Result<(), SessionError>;
    /// Bounded wait for the post-login page (and the calls it makes) to finish.
    async fn wait_until_ready(&mut self, timeout: Duration) -> Result<(), SessionError>;
    /// `None` if this session cannot observe its own traffic.
    fn traffic(&self) -> Option<&[CapturedExchange]>;
    async fn close(&mut self);
}

#[derive(Clone, Debug)]
pub struct PortalConfig {
    pub launcher_url: String,
    pub login_url: String,
    pub dashboard_url: String,
    /// Calls the dashboard issues once it is loaded.
    pub api_urls: Vec<String>,
    pub logout_url: Option<String>,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            launcher_url: DEFAULT_LAUNCHER_URL.to_string(),
            login_url: DEFAULT_LOGIN_URL.to_string(),
            dashboard_url: DEFAULT_DASHBOARD_URL.to_string(),
            api_urls: vec![DEFAULT_API_URL.to_string()],
            logout_url: None,
            poll_interval: Duration::from_millis(DEFAULT_POLL_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl PortalConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = env::var("SURVEI_PORTAL_LAUNCHER_URL") { cfg.launcher_url = v; }
        if let Ok(v) = env::var("SURVEI_PORTAL_LOGIN_URL") { cfg.login_url = v; }
        if let Ok(v) = env::var("SURVEI_PORTAL_DASHBOARD_URL") { cfg.dashboard_url = v; }
        if let Ok(v) = env::var("SURVEI_PORTAL_API_URL") {
            cfg.api_urls = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        cfg.logout_url = env::var("SURVEI_PORTAL_LOGOUT_URL").ok();
        cfg
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        let fixed = [&self.launcher_url, &self.login_url, &self.dashboard_url];
        for url in fixed.into_iter().chain(&self.api_urls).chain(self.logout_url.as_ref()) {
            if Url::parse(url).is_err() { return Err(SessionError::InvalidUrl(url.clone())); }
        }
        Ok(())
    }
}

/// Cookie-carrying HTTP session that records every exchange it makes.
///
/// Transparent decompression is off, so bodies are recorded exactly as
/// they came off the wire (gzip included).
pub struct HttpSession {
    http: Client,
    cfg: PortalConfig,
    traffic: Vec<CapturedExchange>,
}

impl HttpSession {
    pub fn new(cfg: PortalConfig) -> Result<Self, SessionError> {
        cfg.validate()?;
        let http = Client::builder()
            .cookie_store(true)
            .timeout(cfg.request_timeout)
            .build()?;
        Ok(Self { http, cfg, traffic: Vec::new() })
    }

    async fn exchange(&mut self, method: Method, url: &str, form: Option<&[(&str, &str)]>) -> Result<u16, SessionError> {
        let mut req = self.http.request(method.clone(), url).header(ACCEPT_ENCODING, "gzip");
        if let Some(form) = form { req = req.form(form); }
        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.ok();
        self.traffic.push(CapturedExchange { url: url.to_string(), method: method.to_string(), raw_body: body, http_status: status });
        Ok(status)
    }
}

fn is_success(status: u16) -> bool { (200..300).contains(&status) }

#[async_trait]
impl Session for HttpSession {
    async fn open(&mut self, creds: &Credentials) -> Result<(), SessionError> {
        let log = telemetry::capture();
        let launcher = self.cfg.launcher_url.clone();
        let login = self.cfg.login_url.clone();
        self.exchange(Method::GET, &launcher, None).await?;
        let fields = [("username", creds.username.as_str()), ("password", creds.password.as_str())];
        let status = self.exchange(Method::POST, &login, Some(&fields[..])).await?;
        if !is_success(status) { return Err(SessionError::Login(status)); }
        log.info_kv("🔐 login submitted", [("user", creds.username.clone())]);
        Ok(())
    }

    async fn wait_until_ready(&mut self, timeout: Duration) -> Result<(), SessionError> {
        let dashboard = self.cfg.dashboard_url.clone();
        let api_urls = self.cfg.api_urls.clone();
        let poll = self.cfg.poll_interval;
        let ready = async {
            while !is_success(self.exchange(Method::GET, &dashboard, None).await?) {
                tokio::time::sleep(poll).await;
            }
            for url in &api_urls {
                self.exchange(Method::GET, url, None).await?;
            }
            Ok::<(), SessionError>(())
        };
        tokio::time::timeout(timeout, ready).await.map_err(|_| SessionError::Timeout(timeout))?
    }

    fn traffic(&self) -> Option<&[CapturedExchange]> { Some(&self.traffic) }

    async fn close(&mut self) {
        let log = telemetry::capture();
        if let Some(url) = self.cfg.logout_url.clone() {
            if let Err(e) = self.http.get(&url).send().await {
                log.warn_kv("logout failed", [("error", e.to_string())]);
            }
        }
        self.traffic.clear();
        log.info("🚪 Session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_portal_targets_kegiatan_aktif() {
        let cfg = PortalConfig::default();
        assert_eq!(cfg.api_urls, vec![DEFAULT_API_URL.to_string()]);
        assert!(cfg.logout_url.is_none());
    }

    #[test]
    fn malformed_portal_url_is_rejected_up_front() {
        let cfg = PortalConfig { login_url: "manajemen-mitra/login".into(), ..PortalConfig::default() };
        assert!(matches!(HttpSession::new(cfg), Err(SessionError::InvalidUrl(u)) if u == "manajemen-mitra/login"));
    }

    #[tokio::test]
    async fn fresh_session_is_instrumented_but_empty() {
        let s = HttpSession::new(PortalConfig::default()).unwrap();
        assert_eq!(s.traffic().map(|t| t.len()), Some(0));
    }

    fn portal_at(base: &str) -> PortalConfig {
        PortalConfig {
            launcher_url: format!("{base}/launcher"),
            login_url: format!("{base}/login"),
            dashboard_url: format!("{base}/dashboard"),
            api_urls: vec![format!("{base}/api/dashboard/kegiatan-aktif?tahun=2025")],
            ..PortalConfig::default()
        }
    }

    #[tokio::test]
    async fn login_then_dashboard_records_raw_wire_bodies() {
        let gz = crate::capture::decode::gzip(br#"{"data":[]}"#);
        let (base, seen) = crate::test_support::serve(vec![
            (200, b"<html>launcher</html>".to_vec(), vec![]),
            (200, b"<html>ok</html>".to_vec(), vec![]),
            (200, b"<html>dashboard</html>".to_vec(), vec![]),
            (200, gz.clone(), vec![("Content-Encoding", "gzip"), ("Content-Type", "application/json")]),
        ]).await;
        let mut s = HttpSession::new(portal_at(&base)).unwrap();
        let creds = Credentials { username: "mitra".into(), password: "rahasia".into() };
        s.open(&creds).await.unwrap();
        s.wait_until_ready(Duration::from_secs(5)).await.unwrap();

        let traffic = s.traffic().unwrap();
        assert_eq!(traffic.len(), 4);
        assert_eq!(traffic[1].method, "POST");
        assert!(traffic[3].url.contains("kegiatan-aktif"));
        assert_eq!(traffic[3].raw_body.as_deref(), Some(gz.as_slice()));

        let seen = seen.lock().unwrap();
        assert!(seen[1].request_line.starts_with("POST /login"));
        assert!(seen[1].body.contains("username=mitra"));
        drop(seen);

        s.close().await;
        assert_eq!(s.traffic().map(|t| t.len()), Some(0));
    }

    #[tokio::test]
    async fn rejected_login_is_an_error() {
        let (base, _) = crate::test_support::serve(vec![
            (200, b"<html></html>".to_vec(), vec![]),
            (401, b"denied".to_vec(), vec![]),
        ]).await;
        let mut s = HttpSession::new(portal_at(&base)).unwrap();
        let creds = Credentials { username: "mitra".into(), password: "salah".into() };
        assert!(matches!(s.open(&creds).await, Err(SessionError::Login(401))));
    }

    #[tokio::test]
    async fn silent_dashboard_times_out_instead_of_hanging() {
        let base = crate::test_support::serve_silence().await;
        let mut s = HttpSession::new(portal_at(&base)).unwrap();
        let err = s.wait_until_ready(Duration::from_millis(200)).await.unwrap_err();
        assert!(matches!(err, SessionError::Timeout(_)));
    }
}
