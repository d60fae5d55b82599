use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::notify::DispatchResult;
use super::window::WindowKind;

// Plan envelope types
#[derive(Serialize)]
pub struct WindowPlan {
    pub kind: WindowKind,
    pub target_date: NaiveDate,
    pub survey_codes: Vec<String>,
    pub text: String,
}

#[derive(Serialize)]
pub struct RemindPlan {
    pub today: NaiveDate,
    pub records: usize,
    pub recipients: usize,
    pub windows: Vec<WindowPlan>,
}

// Apply/result envelope types
#[derive(Serialize)]
pub struct RemindApply<'a> {
    pub run_id: Uuid,
    pub today: NaiveDate,
    pub windows: usize,
    pub sent: usize,
    pub failed: usize,
    pub results: &'a [DispatchResult],
}
