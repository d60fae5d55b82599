use tracing::Span;
use tracing::info_span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Remind;

#[derive(Copy, Clone, Debug)]
pub enum Phase { Load, Windows, Dispatch, SaveResults }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str { match self {
        Phase::Load => "load",
        Phase::Windows => "windows",
        Phase::Dispatch => "dispatch",
        Phase::SaveResults => "save_results",
    }}
    fn span(&self) -> Span { match self {
        Phase::Load => info_span!("load"),
        Phase::Windows => info_span!("windows"),
        Phase::Dispatch => info_span!("dispatch"),
        Phase::SaveResults => info_span!("save_results"),
    }}
}

impl OpMarker for Remind {
    const NAME: &'static str = "remind";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("remind") }
}
