use serde::Serialize;

#[derive(Serialize)]
pub struct PayloadSample {
    pub url: String,
    pub method: String,
    pub decoded: bool,
}

// Plan and apply share one shape; `saved` is only set when rows were written.
#[derive(Serialize)]
pub struct CaptureReport {
    pub target: String,
    pub table: String,
    pub payloads: Vec<PayloadSample>,
    pub rows: usize,
    pub sample_codes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved: Option<usize>,
}
