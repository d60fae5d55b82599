use std::collections::HashSet;
use std::env;
use std::fmt;

use chrono::{Days, NaiveDate};
use serde::Serialize;

use crate::config::ConfigError;
use crate::records::SurveyRecord;

pub const DEFAULT_FINAL_OFFSETS: [u32; 2] = [7, 3];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReminderConfig {
    pub enable_initial_window: bool,
    /// Days before `tgl_rek_selesai`, processed in this order.
    pub final_offsets: Vec<u32>,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self { enable_initial_window: false, final_offsets: DEFAULT_FINAL_OFFSETS.to_vec() }
    }
}

impl ReminderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        if let Ok(v) = env::var("SURVEI_INITIAL_WINDOW") {
            cfg.enable_initial_window = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = env::var("SURVEI_FINAL_OFFSETS") {
            cfg.final_offsets = parse_offsets(&v)?;
        }
        Ok(cfg)
    }
}

/// "7,3" -> [7, 3]. Zero, negatives and non-numbers are rejected.
pub fn parse_offsets(s: &str) -> Result<Vec<u32>, ConfigError> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| match p.parse::<u32>() {
            Ok(d) if d > 0 => Ok(d),
            _ => Err(ConfigError::InvalidOffset(p.to_string())),
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Initial,
    Final(u32),
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowKind::Initial => write!(f, "initial"),
            WindowKind::Final(d) => write!(f, "final({})", d),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReminderWindow {
    pub kind: WindowKind,
    pub target_date: NaiveDate,
    /// De-duplicated, first-seen order.
    pub survey_codes: Vec<String>,
}

/// Classifies records into reminder windows for `today`.
///
/// Dates compare as plain calendar days. Records whose dates cannot be
/// parsed match nothing. Empty windows are not emitted.
pub fn compute_windows(records: &[SurveyRecord], today: NaiveDate, cfg: &ReminderConfig) -> Vec<ReminderWindow> {
    let mut windows = Vec::new();

    if cfg.enable_initial_window {
        let codes = codes_where(records, |r| r.start_date() == Some(today));
        if !codes.is_empty() {
            windows.push(ReminderWindow { kind: WindowKind::Initial, target_date: today, survey_codes: codes });
        }
    }

    for &days in &cfg.final_offsets {
        let Some(target) = today.checked_add_days(Days::new(days.into())) else { continue };
        let codes = codes_where(records, |r| r.end_date() == Some(target));
        if !codes.is_empty() {
            windows.push(ReminderWindow { kind: WindowKind::Final(days), target_date: target, survey_codes: codes });
        }
    }

    windows
}

fn codes_where(records: &[SurveyRecord], pred: impl Fn(&SurveyRecord) -> bool) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|r| pred(*r))
        .map(SurveyRecord::code)
        .filter(|code| seen.insert(code.clone()))
        .collect()
}

pub fn render(window: &ReminderWindow) -> String {
    let header = match window.kind {
        WindowKind::Initial => "📢 Reminder: recruitment starts today for:".to_string(),
        WindowKind::Final(days) => format!(
            "⏰ Reminder: recruitment ends in {} {} on {} for:",
            days,
            if days == 1 { "day" } else { "days" },
            window.target_date.format("%Y-%m-%d"),
        ),
    };
    let mut out = header;
    for (i, code) in window.survey_codes.iter().enumerate() {
        out.push_str(&format!("\n{}. {}", i + 1, code));
    }
    out
}
