use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::capture::traffic::DecodedPayload;
use crate::util::time::date_from_value;

pub mod db;

/// Table the active-survey listing is stored under.
pub const DEFAULT_TABLE: &str = "kegiatan_aktif";

pub const CODE_FIELD: &str = "kd_survei";
pub const START_FIELD: &str = "tgl_rek_mulai";
pub const END_FIELD: &str = "tgl_rek_selesai";
const REQUIRED: [&str; 3] = [CODE_FIELD, START_FIELD, END_FIELD];

#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("no captured response could be decoded")]
    NoUsableResponse,
    #[error("'data' key not found in response; available keys: {available:?}")]
    MissingDataKey { available: Vec<String> },
    #[error("'data' is empty")]
    EmptyDataSet,
    #[error("'data' is not a list of rows")]
    DataNotArray,
    #[error("row {0} is not an object")]
    RowNotObject(usize),
    #[error("row {row} has no '{field}' value")]
    MissingField { row: usize, field: &'static str },
}

/// One flattened row of the portal's active-survey listing.
///
/// Every column the portal sent is kept, in order; only the survey code and
/// the two recruitment dates are interpreted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurveyRecord {
    fields: Map<String, Value>,
}

impl SurveyRecord {
    pub fn from_fields(row: usize, fields: Map<String, Value>) -> Result<Self, SchemaError> {
        for field in REQUIRED {
            if fields.get(field).map_or(true, Value::is_null) {
                return Err(SchemaError::MissingField { row, field });
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &Map<String, Value> { &self.fields }

    pub fn code(&self) -> String { self.text(CODE_FIELD) }

    pub fn start_date(&self) -> Option<NaiveDate> { self.fields.get(START_FIELD).and_then(date_from_value) }

    pub fn end_date(&self) -> Option<NaiveDate> { self.fields.get(END_FIELD).and_then(date_from_value) }

    /// String form of a column, without JSON quoting for string values.
    pub fn text(&self, field: &str) -> String {
        match self.fields.get(field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

/// Flattens `data` of the first decodable payload into records.
pub fn extract_records(payloads: &[DecodedPayload]) -> Result<Vec<SurveyRecord>, SchemaError> {
    let document = payloads
        .iter()
        .find_map(|p| p.document.as_ref())
        .ok_or(SchemaError::NoUsableResponse)?;

    let data = match document.as_object() {
        Some(obj) => obj.get("data").ok_or_else(|| SchemaError::MissingDataKey { available: obj.keys().cloned().collect() })?,
        None => return Err(SchemaError::MissingDataKey { available: Vec::new() }),
    };
    let rows = match data {
        Value::Array(rows) => rows,
        Value::Null => return Err(SchemaError::EmptyDataSet),
        _ => return Err(SchemaError::DataNotArray),
    };
    if rows.is_empty() {
        return Err(SchemaError::EmptyDataSet);
    }

    rows.iter()
        .enumerate()
        .map(|(i, row)| match row {
            Value::Object(fields) => SurveyRecord::from_fields(i, fields.clone()),
            _ => Err(SchemaError::RowNotObject(i)),
        })
        .collect()
}

#[cfg(test)]
pub(crate) fn record(code: &str, start: &str, end: &str) -> SurveyRecord {
    let mut fields = Map::new();
    fields.insert(CODE_FIELD.to_string(), Value::from(code));
    fields.insert(START_FIELD.to_string(), Value::from(start));
    fields.insert(END_FIELD.to_string(), Value::from(end));
    SurveyRecord::from_fields(0, fields).unwrap()
}
