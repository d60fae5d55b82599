use anyhow::Result;
use serde::Serialize;
use std::marker::PhantomData;
use tracing::{info, debug, warn, error, Span};

use crate::output::{Emitter, OutputConfig};
use crate::output::types::{Envelope, Meta};

pub trait PhaseSpan {
    fn name(&self) -> &'static str;
    fn span(&self) -> Span;
}

pub trait OpMarker {
    const NAME: &'static str;
    type Phase: PhaseSpan;
    fn root_span() -> Span;
}

pub struct LogCtx<O: OpMarker> {
    pub(crate) json: bool,
    pub(crate) _marker: PhantomData<O>,
}

impl<O: OpMarker> LogCtx<O> {
    fn op_name(&self) -> &'static str { O::NAME }

    pub fn root_span(&self) -> Span { O::root_span() }

    pub fn root_span_kv<'a, T>(&self, fields: T) -> Span
    where
        T: IntoIterator<Item = (&'a str, String)>,
    {
        let span = self.root_span();
        let details = kv_to_string(fields);
        if details.is_empty() {
            info!(op = %self.op_name(), "start");
        } else {
            info!(op = %self.op_name(), details = %details, "start");
        }
        span
    }

    pub fn span(&self, ph: &O::Phase) -> Span {
        if self.json { debug!(op = %self.op_name(), phase = ph.name(), "phase"); }
        ph.span()
    }

    pub fn info(&self, msg: impl AsRef<str>) { if self.json { info!(op = %self.op_name(), "{}", msg.as_ref()); } else { info!("{}", msg.as_ref()); } }
    pub fn debug(&self, msg: impl AsRef<str>) { if self.json { debug!(op = %self.op_name(), "{}", msg.as_ref()); } else { debug!("{}", msg.as_ref()); } }
    pub fn warn(&self, msg: impl AsRef<str>) { if self.json { warn!(op = %self.op_name(), "{}", msg.as_ref()); } else { warn!("{}", msg.as_ref()); } }
    pub fn error(&self, msg: impl AsRef<str>) { if self.json { error!(op = %self.op_name(), "{}", msg.as_ref()); } else { error!("{}", msg.as_ref()); } }

    pub fn info_kv<'a, D>(&self, msg: &str, kv: D)
    where
        D: IntoIterator<Item = (&'a str, String)>,
    {
        if self.json { let details = kv_to_string(kv); info!(op = %self.op_name(), details = %details, "{}", msg); }
        else { info!("{}", msg); }
    }

    pub fn warn_kv<'a, D>(&self, msg: &str, kv: D)
    where
        D: IntoIterator<Item = (&'a str, String)>,
    {
        if self.json { let details = kv_to_string(kv); warn!(op = %self.op_name(), details = %details, "{}", msg); }
        else { let details = kv_to_string(kv); warn!("{} {}", msg, details); }
    }

    pub fn plan<T: Serialize>(&self, plan: &T) -> Result<()> {
        let env = Envelope::plan(self.op_name(), plan, None)?;
        Emitter::from_env(OutputConfig::from_env()).emit(&env)?;
        Ok(())
    }

    pub fn result<T: Serialize>(&self, result: &T, meta: Option<Meta>) -> Result<()> {
        let env = Envelope::result(self.op_name(), result, meta)?;
        Emitter::from_env(OutputConfig::from_env()).emit(&env)?;
        Ok(())
    }
}

impl LogCtx<crate::telemetry::ops::capture::Capture> {
    pub fn intercept_summary(&self, selected: usize, decoded: usize, failed: usize) {
        if self.json { info!(op = %self.op_name(), selected, decoded, failed, "intercept_summary"); }
        else { info!("📡 Intercepted — selected={} decoded={} failed={}", selected, decoded, failed); }
    }

    pub fn rows_saved(&self, table: &str, rows: usize) {
        if self.json { info!(op = %self.op_name(), table, rows, "rows_saved"); }
        else { info!("💾 Saved {} row(s) to table {}", rows, table); }
    }
}

impl LogCtx<crate::telemetry::ops::remind::Remind> {
    pub fn window_summary(&self, label: &str, codes: usize) {
        if self.json { info!(op = %self.op_name(), window = label, codes, "window"); }
        else { info!("🗓️ Window {} — {} survey(s)", label, codes); }
    }

    pub fn totals(&self, sent: usize, failed: usize) {
        if self.json { info!(op = %self.op_name(), sent, failed, "dispatch_totals"); }
        else { info!("📊 Dispatch totals — sent={} failed={}", sent, failed); }
    }
}

fn kv_to_string<'a, T>(kv: T) -> String
where
    T: IntoIterator<Item = (&'a str, String)>,
{
    let mut parts: Vec<String> = Vec::new();
    for (k, v) in kv { parts.push(format!("{}={}", k, v)); }
    parts.join(" ")
}
