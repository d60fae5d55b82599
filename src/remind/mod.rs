use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;
use uuid::Uuid;

use crate::config::{AppConfig, Contact};
use crate::notify::channel::{HttpChannel, MessageChannel};
use crate::notify::{self, Dispatcher, OutgoingMessage, RunSummary};
use crate::output::types::Meta;
use crate::records::db::{RecordStore, StoreError};
use crate::records::{SurveyRecord, DEFAULT_TABLE};
use crate::telemetry::{self};
use crate::telemetry::ctx::LogCtx;
use crate::telemetry::ops::remind::{Phase as RemindPhase, Remind};
use crate::util::time::today_or;

pub mod types;
pub mod window;

use window::{ReminderConfig, ReminderWindow};

#[derive(Args)]
pub struct RemindCmd {
    /// Date to evaluate windows for (YYYY-MM-DD); defaults to the local date
    #[arg(long)] pub today: Option<NaiveDate>,
    /// Also remind on the recruitment start date
    #[arg(long, default_value_t = false)] pub initial: bool,
    /// Comma-separated countdown offsets in days, e.g. "7,3"
    #[arg(long)] pub offsets: Option<String>,
    /// Send reminders to administrative contacts only
    #[arg(long, default_value_t = false)] pub admin_only: bool,
    #[arg(long, default_value = DEFAULT_TABLE)] pub table: String,
    #[arg(long, default_value_t = false)] pub apply: bool,
}

#[derive(Clone, Debug)]
pub struct RemindOptions {
    pub table: String,
    pub today: NaiveDate,
    pub reminder: ReminderConfig,
    pub admin_only: bool,
    pub apply: bool,
}

pub struct RemindOutcome {
    pub records: usize,
    pub recipients: usize,
    pub windows: Vec<ReminderWindow>,
    pub messages: Vec<OutgoingMessage>,
    /// `None` for plan-only runs.
    pub summary: Option<(Uuid, RunSummary)>,
}

pub async fn run(cfg: &AppConfig, args: RemindCmd) -> Result<()> {
    let mut reminder = ReminderConfig::from_env()?;
    if args.initial { reminder.enable_initial_window = true; }
    if let Some(offsets) = args.offsets.as_deref() { reminder.final_offsets = window::parse_offsets(offsets)?; }
    let opts = RemindOptions {
        table: args.table,
        today: today_or(args.today),
        reminder,
        admin_only: args.admin_only,
        apply: args.apply,
    };

    let log = telemetry::remind();
    let channel = HttpChannel::new(cfg.channel.clone())?;
    let store = match RecordStore::open(&cfg.output_dir).await {
        Ok(store) => store,
        Err(e) => {
            alert_on_load_failure(&log, &channel, cfg, opts.apply, &e).await;
            return Ok(());
        }
    };
    let Some(outcome) = remind(&store, &channel, cfg, &opts).await? else { return Ok(()) };

    if !telemetry::config::json_mode() {
        return Ok(());
    }
    match &outcome.summary {
        None => {
            let windows = outcome.windows.iter().zip(&outcome.messages)
                .map(|(w, m)| types::WindowPlan { kind: w.kind, target_date: w.target_date, survey_codes: w.survey_codes.clone(), text: m.text.clone() })
                .collect();
            log.plan(&types::RemindPlan { today: opts.today, records: outcome.records, recipients: outcome.recipients, windows })?;
        }
        Some((run_id, summary)) => {
            let result = types::RemindApply {
                run_id: *run_id,
                today: opts.today,
                windows: outcome.windows.len(),
                sent: summary.sent,
                failed: summary.failed,
                results: &summary.results,
            };
            log.result(&result, Some(Meta { duration_ms: None, run_id: Some(*run_id) }))?;
        }
    }
    Ok(())
}

/// Unreadable records end the run; applied runs also alert the administrators.
/// A table that was never written stays silent.
async fn alert_on_load_failure(log: &LogCtx<Remind>, channel: &dyn MessageChannel, cfg: &AppConfig, apply: bool, err: &StoreError) {
    log.error(format!("❌ {err}; nothing to do"));
    if apply && !matches!(err, StoreError::TableMissing(_)) {
        notify::send_error_notice(log, channel, &cfg.admins(), cfg.send_pause, notify::LOAD_FAILED, &err.to_string()).await;
    }
}

/// The reminder workflow for one `today`.
///
/// Returns `Ok(None)` when the stored records cannot be loaded; no reminder goes out for that run.
pub async fn remind(store: &RecordStore, channel: &dyn MessageChannel, cfg: &AppConfig, opts: &RemindOptions) -> Result<Option<RemindOutcome>> {
    let log = telemetry::remind();
    let _g = log.root_span_kv([
        ("apply", opts.apply.to_string()),
        ("today", opts.today.to_string()),
        ("table", opts.table.clone()),
        ("initial", opts.reminder.enable_initial_window.to_string()),
        ("offsets", format!("{:?}", opts.reminder.final_offsets)),
        ("admin_only", opts.admin_only.to_string()),
    ]).entered();

    let records: Vec<SurveyRecord> = {
        let _s = log.span(&RemindPhase::Load).entered();
        match store.load(&opts.table).await {
            Ok(rows) => rows,
            Err(e) => {
                alert_on_load_failure(&log, channel, cfg, opts.apply, &e).await;
                return Ok(None);
            }
        }
    };
    log.info(format!("📄 Loaded {} record(s) from {}", records.len(), opts.table));

    let windows = {
        let _s = log.span(&RemindPhase::Windows).entered();
        window::compute_windows(&records, opts.today, &opts.reminder)
    };
    let recipients: Vec<Contact> = if opts.admin_only { cfg.admins() } else { cfg.contacts.clone() };
    let messages: Vec<OutgoingMessage> = windows
        .iter()
        .map(|w| {
            log.window_summary(&w.kind.to_string(), w.survey_codes.len());
            OutgoingMessage { text: window::render(w), recipients: recipients.clone() }
        })
        .collect();

    if !opts.apply {
        log.info(format!("📝 Remind plan — today={} windows={} recipients={}", opts.today, windows.len(), recipients.len()));
        for m in &messages { log.info(format!("  ---\n{}", m.text)); }
        if messages.is_empty() { log.info("  (no window matched; an info notice would go to admins)"); }
        log.info("   Use --apply to execute.");
        return Ok(Some(RemindOutcome { records: records.len(), recipients: recipients.len(), windows, messages, summary: None }));
    }

    let dispatcher = Dispatcher::new(channel, cfg.send_pause, &log);
    let results = {
        let _s = log.span(&RemindPhase::Dispatch).entered();
        dispatcher.dispatch_or_notify(&messages, &cfg.admins(), &notify::info_notice_text(opts.today)).await
    };
    let summary = RunSummary::from_results(results);
    log.totals(summary.sent, summary.failed);

    let run_id = Uuid::new_v4();
    {
        let _s = log.span(&RemindPhase::SaveResults).entered();
        if let Err(e) = store.save_results(run_id, &summary.results).await {
            log.warn_kv("could not persist dispatch results", [("error", e.to_string())]);
        }
    }

    Ok(Some(RemindOutcome { records: records.len(), recipients: recipients.len(), windows, messages, summary: Some((run_id, summary)) }))
}
