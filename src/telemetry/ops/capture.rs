use tracing::Span;
use tracing::info_span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Capture;

#[derive(Copy, Clone, Debug)]
pub enum Phase { OpenSession, WaitReady, Intercept, Extract, Save, NotifyError }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str { match self {
        Phase::OpenSession => "open_session",
        Phase::WaitReady => "wait_ready",
        Phase::Intercept => "intercept",
        Phase::Extract => "extract",
        Phase::Save => "save",
        Phase::NotifyError => "notify_error",
    }}
    fn span(&self) -> Span { match self {
        Phase::OpenSession => info_span!("open_session"),
        Phase::WaitReady => info_span!("wait_ready"),
        Phase::Intercept => info_span!("intercept"),
        Phase::Extract => info_span!("extract"),
        Phase::Save => info_span!("save"),
        Phase::NotifyError => info_span!("notify_error"),
    }}
}

impl OpMarker for Capture {
    const NAME: &'static str = "capture";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("capture") }
}
