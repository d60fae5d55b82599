use tracing::Span;
use tracing::info_span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Contacts;

#[derive(Copy, Clone, Debug)]
pub enum Phase { List }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str { match self { Phase::List => "list" } }
    fn span(&self) -> Span { match self { Phase::List => info_span!("list") } }
}

impl OpMarker for Contacts {
    const NAME: &'static str = "contacts";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("contacts") }
}
