pub mod config;
pub mod ctx;
pub mod ops;

use ctx::LogCtx;

pub fn capture() -> LogCtx<ops::capture::Capture> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }
pub fn remind() -> LogCtx<ops::remind::Remind> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }
pub fn contacts() -> LogCtx<ops::contacts::Contacts> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }

/// Context that always tags events with its op, whatever SURVEI_LOG_FORMAT says.
#[cfg(test)]
pub(crate) fn json_ctx<O: ctx::OpMarker>() -> LogCtx<O> { LogCtx { json: true, _marker: std::marker::PhantomData } }
