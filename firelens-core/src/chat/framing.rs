//! Byte-level framing of the event stream
//!
//! Network chunks arrive at arbitrary byte offsets. [`Utf8Decoder`] turns
//! them into text without splitting multi-byte characters, and
//! [`RecordSplitter`] cuts the text into blank-line-delimited records and
//! extracts their `data:` payloads.

/// Record boundary
pub const RECORD_BOUNDARY: &str = "\n\n";

/// Incremental UTF-8 decoder.
///
/// An incomplete multi-byte sequence at the end of a chunk is held back until
/// the next chunk completes it. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::with_capacity(self.pending.len());
        let mut consumed = 0;

        loop {
            match std::str::from_utf8(&self.pending[consumed..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    consumed = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid_end = consumed + e.valid_up_to();
                    out.push_str(
                        std::str::from_utf8(&self.pending[consumed..valid_end]).unwrap_or_default(),
                    );
                    match e.error_len() {
                        Some(invalid) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            consumed = valid_end + invalid;
                        }
                        None => {
                            // Truncated sequence: wait for more bytes
                            consumed = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..consumed);
        out
    }

    /// Flush whatever is left, replacing a truncated sequence with U+FFFD.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Splits decoded text into records and yields their data payloads.
#[derive(Debug, Default)]
pub struct RecordSplitter {
    buffer: String,
}

impl RecordSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text and return the payloads of every record it completed.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);

        let mut payloads = Vec::new();
        while let Some(end) = self.buffer.find(RECORD_BOUNDARY) {
            let record: String = self.buffer.drain(..end + RECORD_BOUNDARY.len()).collect();
            if let Some(payload) = data_payload(&record[..end]) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Unconsumed partial record
    pub fn remainder(&self) -> &str {
        &self.buffer
    }

    /// Drop the partial record, returning how many bytes were discarded.
    pub fn discard(&mut self) -> usize {
        let len = self.buffer.len();
        self.buffer.clear();
        len
    }
}

/// Join the `data:` lines of one record. Comments and other fields are
/// ignored; a record without data yields `None`.
pub fn data_payload(record: &str) -> Option<String> {
    let mut lines = Vec::new();
    for line in record.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("data:") {
            lines.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}
