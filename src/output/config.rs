use std::env;

use crate::telemetry;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub pretty: bool,
}

impl OutputConfig {
    pub fn from_env() -> Self {
        let format = match env::var("SURVEI_OUTPUT_FORMAT").ok().as_deref() {
            Some("json") => OutputFormat::Json,
            _ if telemetry::config::json_mode() => OutputFormat::Json,
            _ => OutputFormat::Text,
        };
        let pretty = match env::var("SURVEI_OUTPUT_PRETTY").ok().as_deref() {
            Some(v) if v.eq_ignore_ascii_case("1") || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes") => true,
            _ => false,
        };
        OutputConfig { format, pretty }
    }
}
