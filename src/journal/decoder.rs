//! Newline-delimited JSON decoding.
//!
//! The game occasionally writes truncated lines containing raw control
//! characters, so every line is sanitized before it reaches `serde_json`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One undecorated journal record.
///
/// `event` selects the expected field set, but the schema is open: unknown
/// and extra fields are kept in `fields` rather than rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub timestamp: String,
    pub event: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// A line that could not be decoded as a record.
#[derive(Debug, thiserror::Error)]
#[error("malformed line '{}': {source}", preview(.text))]
pub struct MalformedLine {
    /// The sanitized line text.
    pub text: String,
    #[source]
    pub source: serde_json::Error,
}

fn preview(text: &str) -> String {
    text.chars().take(120).collect()
}

/// Strip control characters (0x00-0x1F) from a line.
pub fn sanitize_line(line: &str) -> String {
    line.chars().filter(|c| (*c as u32) >= 0x20).collect()
}

/// Decode a single line.
///
/// Returns `None` for blank lines.
pub fn decode_line(line: &str) -> Option<Result<RawRecord, MalformedLine>> {
    let text = sanitize_line(line);
    if text.trim().is_empty() {
        return None;
    }
    Some(
        serde_json::from_str::<RawRecord>(&text)
            .map_err(|source| MalformedLine { text, source }),
    )
}

/// Incremental decoder for a byte stream.
///
/// Bytes are buffered until a newline arrives, so the output does not depend
/// on how the input was chunked (including chunks that split a UTF-8 sequence).
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return every record completed by them, in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<RawRecord, MalformedLine>> {
        let mut out = Vec::new();
        let mut scan_from = self.buffer.len();
        self.buffer.extend_from_slice(bytes);

        while let Some(offset) = self.buffer[scan_from..].iter().position(|b| *b == b'\n') {
            let end = scan_from + offset;
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            scan_from = 0;
            if let Some(decoded) = decode_line(&String::from_utf8_lossy(&line[..line.len() - 1])) {
                out.push(decoded);
            }
        }

        out
    }

    /// Flush a trailing line that never received its newline.
    pub fn finish(&mut self) -> Option<Result<RawRecord, MalformedLine>> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        decode_line(&String::from_utf8_lossy(&line))
    }

    /// Number of buffered bytes not yet terminated by a newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partially buffered line.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = concat!(
        r#"{"timestamp":"2017-10-04T19:01:01Z","event":"FSDJump","StarSystem":"Sol","StarPos":[0.0,0.0,0.0]}"#,
        "\n",
        r#"{"timestamp":"2017-10-04T19:05:11Z","event":"Location","StarSystem":"Achenar","Docked":false}"#,
        "\r\n",
        "\n",
        r#"{"timestamp":"2017-10-04T19:06:00Z","event":"ReceiveText","Channel":"npc","Message":"héllo"}"#,
        "\n",
    );

    fn events(records: Vec<Result<RawRecord, MalformedLine>>) -> Vec<String> {
        records
            .into_iter()
            .map(|r| r.expect("record should decode").event)
            .collect()
    }

    #[test]
    fn test_single_chunk() {
        let mut decoder = LineDecoder::new();
        let out = events(decoder.push(SAMPLE.as_bytes()));
        assert_eq!(out, vec!["FSDJump", "Location", "ReceiveText"]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_chunk_boundaries_do_not_matter() {
        let mut whole = LineDecoder::new();
        let expected: Vec<RawRecord> = whole
            .push(SAMPLE.as_bytes())
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let bytes = SAMPLE.as_bytes();
        for chunk_size in 1..=17 {
            let mut decoder = LineDecoder::new();
            let mut got = Vec::new();
            for chunk in bytes.chunks(chunk_size) {
                got.extend(decoder.push(chunk).into_iter().map(|r| r.unwrap()));
            }
            assert_eq!(got, expected, "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn test_partial_line_is_buffered() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(br#"{"timestamp":"2017-10-04T19:01:01Z","#).is_empty());
        assert!(decoder.pending() > 0);

        let out = decoder.push(b"\"event\":\"Music\"}\n");
        assert_eq!(events(out), vec!["Music"]);
    }

    #[test]
    fn test_control_characters_are_stripped() {
        let line = "{\"timestamp\":\"2017-10-04T19:01:01Z\",\u{0}\"event\":\"Scan\u{1}\"}";
        let record = decode_line(line).unwrap().unwrap();
        assert_eq!(record.event, "Scan");
    }

    #[test]
    fn test_extra_fields_are_preserved() {
        let record = decode_line(r#"{"timestamp":"t","event":"Bounty","Target":"x","Reward":5}"#)
            .unwrap()
            .unwrap();
        assert_eq!(record.fields.get("Target"), Some(&Value::from("x")));
        assert_eq!(record.fields.get("Reward"), Some(&Value::from(5)));
    }

    #[test]
    fn test_malformed_line_reports_error_and_continues() {
        let mut decoder = LineDecoder::new();
        let out = decoder.push(b"{not json\n{\"timestamp\":\"t\",\"event\":\"Music\"}\n");
        assert_eq!(out.len(), 2);
        assert!(out[0].is_err());
        assert_eq!(out[1].as_ref().unwrap().event, "Music");
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        assert!(decode_line("").is_none());
        assert!(decode_line("  \r").is_none());
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(br#"{"timestamp":"t","event":"Shutdown"}"#).is_empty());
        let last = decoder.finish().unwrap().unwrap();
        assert_eq!(last.event, "Shutdown");
        assert!(decoder.finish().is_none());
    }
}
