use std::io::Read;

use flate2::read::GzDecoder;
use serde_json::Value;
use thiserror::Error;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const SNIPPET_RADIUS: usize = 40;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no response body was captured")]
    MissingResponse,
    #[error("gzip body could not be decompressed: {0}")]
    CompressionError(#[source] std::io::Error),
    #[error("response is not valid JSON at line {line} column {column} (near {snippet:?}): {source}")]
    MalformedJson {
        line: usize,
        column: usize,
        snippet: String,
        #[source]
        source: serde_json::Error,
    },
}

pub fn is_gzip(raw: &[u8]) -> bool {
    raw.starts_with(&GZIP_MAGIC)
}

/// Turns a captured response body into a JSON document.
///
/// Gzip bodies are detected by their magic number rather than by headers,
/// since intercepted traffic does not always keep `Content-Encoding`.
/// Non-UTF-8 bytes are replaced before parsing.
pub fn decode(raw: Option<&[u8]>) -> Result<Value, DecodeError> {
    let raw = raw.ok_or(DecodeError::MissingResponse)?;
    let text = if is_gzip(raw) {
        let mut out = Vec::new();
        GzDecoder::new(raw).read_to_end(&mut out).map_err(DecodeError::CompressionError)?;
        String::from_utf8_lossy(&out).into_owned()
    } else {
        String::from_utf8_lossy(raw).into_owned()
    };
    serde_json::from_str(&text).map_err(|source| DecodeError::MalformedJson {
        line: source.line(),
        column: source.column(),
        snippet: snippet_at(&text, source.line(), source.column()),
        source,
    })
}

// serde_json reports 1-based line/column; column 0 means "before the first char".
fn snippet_at(text: &str, line: usize, column: usize) -> String {
    let mut offset = 0usize;
    for (i, l) in text.split_inclusive('\n').enumerate() {
        if i + 1 == line {
            offset += column.saturating_sub(1).min(l.len());
            break;
        }
        offset += l.len();
    }
    let offset = offset.min(text.len());
    let start = floor_char_boundary(text, offset.saturating_sub(SNIPPET_RADIUS));
    let end = floor_char_boundary(text, (offset + SNIPPET_RADIUS).min(text.len()));
    text[start..end].to_string()
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) { i -= 1; }
    i
}

#[cfg(test)]
pub(crate) fn gzip(bytes: &[u8]) -> Vec<u8> {
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(bytes).unwrap();
    enc.finish().unwrap()
}
