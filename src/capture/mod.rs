use std::time::Duration;

use anyhow::Result;
use clap::Args;

use crate::config::{AppConfig, Credentials};
use crate::notify::{self, channel::{HttpChannel, MessageChannel}};
use crate::records::db::RecordStore;
use crate::records::{self, SurveyRecord, DEFAULT_TABLE};
use crate::telemetry::{self};
use crate::telemetry::ops::capture::Phase as CapturePhase;

pub mod decode;
pub mod session;
pub mod traffic;
mod types;

use session::{HttpSession, PortalConfig, Session};
use traffic::DecodedPayload;

#[derive(Args)]
pub struct CaptureCmd {
    /// URL substring identifying the intercepted API call (defaults to the portal API URL)
    #[arg(long)] pub target: Option<String>,
    #[arg(long, default_value = DEFAULT_TABLE)] pub table: String,
    #[arg(long, default_value_t = 10)] pub ready_timeout_secs: u64,
    #[arg(long, default_value_t = false)] pub apply: bool,
    #[arg(long, default_value_t = 10)] pub plan_limit: usize,
}

#[derive(Clone, Debug)]
pub struct CaptureOptions {
    pub target: String,
    pub table: String,
    pub ready_timeout: Duration,
    pub apply: bool,
    pub plan_limit: usize,
}

#[derive(Debug)]
pub struct CaptureOutcome {
    pub payloads: Vec<DecodedPayload>,
    pub records: Vec<SurveyRecord>,
    pub saved: Option<usize>,
}

pub async fn run(cfg: &AppConfig, args: CaptureCmd) -> Result<()> {
    let portal = PortalConfig::from_env();
    let target = match args.target {
        Some(t) => t,
        None => portal.api_urls.first().cloned().unwrap_or_else(|| session::DEFAULT_API_URL.to_string()),
    };
    let opts = CaptureOptions {
        target,
        table: args.table,
        ready_timeout: Duration::from_secs(args.ready_timeout_secs),
        apply: args.apply,
        plan_limit: args.plan_limit,
    };
    let channel = HttpChannel::new(cfg.channel.clone())?;

    let outcome: Result<CaptureOutcome> = async {
        let creds = Credentials::from_env()?;
        let store = RecordStore::open(&cfg.output_dir).await?;
        let mut session = HttpSession::new(portal)?;
        execute(&mut session, &creds, &store, &opts).await
    }
    .await;
    let outcome = alert_on_failure(outcome, &channel, cfg, opts.apply).await?;

    if telemetry::config::json_mode() {
        let log = telemetry::capture();
        let report = types::CaptureReport {
            target: opts.target.clone(),
            table: opts.table.clone(),
            payloads: outcome.payloads.iter().map(|p| types::PayloadSample { url: p.url.clone(), method: p.method.clone(), decoded: p.document.is_some() }).collect(),
            rows: outcome.records.len(),
            sample_codes: outcome.records.iter().take(opts.plan_limit).map(SurveyRecord::code).collect(),
            saved: outcome.saved,
        };
        if opts.apply { log.result(&report, None)?; } else { log.plan(&report)?; }
    }
    Ok(())
}

/// Drives the session, decodes the target traffic and (with `apply`) replaces
/// the stored table. The session is closed whatever the outcome.
pub async fn execute<S: Session + ?Sized>(session: &mut S, creds: &Credentials, store: &RecordStore, opts: &CaptureOptions) -> Result<CaptureOutcome> {
    let outcome = collect(session, creds, store, opts).await;
    session.close().await;
    outcome
}

async fn collect<S: Session + ?Sized>(session: &mut S, creds: &Credentials, store: &RecordStore, opts: &CaptureOptions) -> Result<CaptureOutcome> {
    let log = telemetry::capture();
    let _g = log.root_span_kv([
        ("apply", opts.apply.to_string()),
        ("target", opts.target.clone()),
        ("table", opts.table.clone()),
        ("ready_timeout_ms", opts.ready_timeout.as_millis().to_string()),
    ]).entered();

    { let _s = log.span(&CapturePhase::OpenSession).entered(); session.open(creds).await?; }
    { let _s = log.span(&CapturePhase::WaitReady).entered(); session.wait_until_ready(opts.ready_timeout).await?; }

    let payloads = {
        let _s = log.span(&CapturePhase::Intercept).entered();
        traffic::capture(session.traffic(), &opts.target)?
    };
    let decoded = payloads.iter().filter(|p| p.document.is_some()).count();
    log.intercept_summary(payloads.len(), decoded, payloads.len() - decoded);
    for (i, p) in payloads.iter().enumerate() {
        if let Some(doc) = &p.document {
            log.debug(format!("Request #{} {} {}\n{}", i + 1, p.method, p.url, serde_json::to_string_pretty(doc)?));
        }
    }

    let rows = {
        let _s = log.span(&CapturePhase::Extract).entered();
        records::extract_records(&payloads)?
    };

    if !opts.apply {
        log.info(format!("📝 Capture plan — rows={} table={}", rows.len(), opts.table));
        for r in rows.iter().take(opts.plan_limit) {
            log.info(format!("  {} start={} end={}", r.code(), r.text(records::START_FIELD), r.text(records::END_FIELD)));
        }
        if rows.len() > opts.plan_limit { log.info(format!("  ... ({} more)", rows.len() - opts.plan_limit)); }
        log.info("   Use --apply to execute.");
        return Ok(CaptureOutcome { payloads, records: rows, saved: None });
    }

    let saved = {
        let _s = log.span(&CapturePhase::Save).entered();
        store.save(&opts.table, &rows).await?
    };
    log.rows_saved(&opts.table, saved);
    Ok(CaptureOutcome { payloads, records: rows, saved: Some(saved) })
}

/// On a fatal capture error, applied runs alert the administrators before
/// the error is returned. The alert itself never changes the outcome.
pub async fn alert_on_failure<T>(outcome: Result<T>, channel: &dyn MessageChannel, cfg: &AppConfig, apply: bool) -> Result<T> {
    if let Err(e) = &outcome {
        let log = telemetry::capture();
        log.error(format!("✗ FATAL ERROR: {e:#}"));
        if apply {
            let _s = log.span(&CapturePhase::NotifyError).entered();
            notify::send_error_notice(&log, channel, &cfg.admins(), cfg.send_pause, notify::DOWNLOAD_FAILED, &format!("{e:#}")).await;
        }
    }
    outcome
}
