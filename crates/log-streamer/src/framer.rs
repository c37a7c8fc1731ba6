// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Splits an arbitrarily chunked byte stream into record payloads.
//!
//! Both framers are fed one chunk at a time through `push_chunk` and drained
//! with `finish` once the source reports end of input. Finished payloads are
//! appended to a caller-owned list; payloads decoded before an error stay in
//! it.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::config::{InputFormat, PayloadFormat, StreamerConfig};

/// How a complete line is turned into a payload.
#[derive(Debug, Clone)]
pub enum LineEncoding {
    /// The line bytes are sent as-is.
    Raw,
    /// The line is placed under `key` in a JSON object alongside fixed entries.
    Json {
        key: String,
        entries: Map<String, Value>,
    },
}

impl LineEncoding {
    pub fn json<I>(key: String, entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        LineEncoding::Json { key, entries }
    }

    fn encode(&self, line: Vec<u8>) -> Option<Vec<u8>> {
        match self {
            LineEncoding::Raw => Some(line),
            LineEncoding::Json { key, entries } => {
                let mut mapping = entries.clone();
                mapping.insert(
                    key.clone(),
                    Value::String(String::from_utf8_lossy(&line).into_owned()),
                );
                match serde_json::to_vec(&mapping) {
                    Ok(data) => Some(data),
                    Err(e) => {
                        error!("Failed to JSON serialize an output mapping: {e}");
                        error!("Mapping that caused the error: {mapping:?}");
                        None
                    }
                }
            }
        }
    }
}

/// Line-oriented framing. LF and CRLF terminated lines are both accepted.
#[derive(Debug)]
pub struct LineFramer {
    pending: Vec<u8>,
    encoding: LineEncoding,
}

impl LineFramer {
    #[must_use]
    pub fn new(encoding: LineEncoding) -> Self {
        LineFramer {
            pending: Vec::new(),
            encoding,
        }
    }

    pub fn push_chunk(&mut self, chunk: &[u8], out: &mut Vec<Vec<u8>>) {
        let mut rest = chunk;

        while !rest.is_empty() {
            let Some(lf) = rest.iter().position(|&b| b == b'\n') else {
                // A trailing CR may be half of a CRLF split across reads.
                let tail = match rest.split_last() {
                    Some((&b'\r', head)) => head,
                    _ => rest,
                };
                self.pending.extend_from_slice(tail);
                break;
            };

            let body = match rest[..lf].split_last() {
                Some((&b'\r', head)) => head,
                _ => &rest[..lf],
            };
            let mut line = std::mem::take(&mut self.pending);
            line.extend_from_slice(body);
            rest = &rest[lf + 1..];

            if line.is_empty() {
                continue;
            }
            if let Some(payload) = self.encoding.encode(line) {
                out.push(payload);
            }
        }
    }

    /// An unterminated final line is discarded.
    pub fn finish(&mut self) {
        if !self.pending.is_empty() {
            debug!(
                "Dropping {} bytes of unterminated input at end of stream",
                self.pending.len()
            );
            self.pending.clear();
        }
    }
}

/// Tracks bracket depth and string state across chunks so the decoder only
/// runs once a top-level value can have ended.
#[derive(Debug, Default)]
struct ValueScanner {
    depth: usize,
    in_string: bool,
    escaped: bool,
    boundary: bool,
}

impl ValueScanner {
    fn feed(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                    self.boundary |= self.depth == 0;
                }
                continue;
            }
            match b {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth = self.depth.saturating_sub(1);
                    self.boundary |= self.depth == 0;
                }
                _ => self.boundary |= self.depth == 0,
            }
        }
    }

    fn take_boundary(&mut self) -> bool {
        std::mem::take(&mut self.boundary)
    }
}

/// Framing of whitespace separated top-level JSON values.
///
/// Invalid UTF-8 is replaced with U+FFFD before decoding. A sequence cut at a
/// chunk boundary is completed by the next chunk.
#[derive(Debug, Default)]
pub struct JsonFramer {
    /// Trailing bytes of an incomplete UTF-8 sequence
    undecoded: Vec<u8>,
    text: String,
    scanner: ValueScanner,
}

impl JsonFramer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chunk(
        &mut self,
        chunk: &[u8],
        out: &mut Vec<Vec<u8>>,
    ) -> Result<(), serde_json::Error> {
        self.decode_utf8(chunk, false);
        if !self.scanner.take_boundary() {
            return Ok(());
        }
        self.drain(false, out)
    }

    pub fn finish(&mut self, out: &mut Vec<Vec<u8>>) -> Result<(), serde_json::Error> {
        self.decode_utf8(&[], true);
        self.scanner.take_boundary();
        self.drain(true, out)
    }

    fn decode_utf8(&mut self, chunk: &[u8], at_eof: bool) {
        let start = self.text.len();
        self.undecoded.extend_from_slice(chunk);

        let mut rest: &[u8] = &self.undecoded;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, invalid) = rest.split_at(e.valid_up_to());
                    self.text
                        .push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            rest = &invalid[len..];
                        }
                        None if at_eof => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            rest = &[];
                            break;
                        }
                        None => {
                            rest = invalid;
                            break;
                        }
                    }
                }
            }
        }
        self.undecoded = rest.to_vec();
        self.scanner.feed(&self.text.as_bytes()[start..]);
    }

    fn drain(&mut self, at_eof: bool, out: &mut Vec<Vec<u8>>) -> Result<(), serde_json::Error> {
        let mut consumed = 0;
        let mut failure = None;
        {
            let mut values = serde_json::Deserializer::from_str(&self.text).into_iter::<Value>();
            loop {
                let start = values.byte_offset();
                match values.next() {
                    None => {
                        consumed = values.byte_offset();
                        break;
                    }
                    Some(Ok(value)) => {
                        let end = values.byte_offset();
                        // A number ending exactly at the buffer end may continue in the next chunk.
                        if !at_eof && end == self.text.len() && value.is_number() {
                            consumed = start;
                            break;
                        }
                        consumed = end;
                        if let Some(payload) = encode_value(&value) {
                            out.push(payload);
                        }
                    }
                    Some(Err(e)) if e.is_eof() && !at_eof => {
                        consumed = start;
                        break;
                    }
                    Some(Err(e)) => {
                        consumed = start;
                        // A scalar directly followed by garbage (`2x`) still counts as a value.
                        if let Some(payload) =
                            leading_value(&self.text[start..]).and_then(|v| encode_value(&v))
                        {
                            out.push(payload);
                        }
                        failure = Some(e);
                        break;
                    }
                }
            }
        }
        self.text.drain(..consumed);

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn leading_value(text: &str) -> Option<Value> {
    let mut de = serde_json::Deserializer::from_str(text);
    Value::deserialize(&mut de).ok()
}

fn encode_value(value: &Value) -> Option<Vec<u8>> {
    if value.is_null() {
        return None;
    }
    match serde_json::to_vec(value) {
        Ok(data) => Some(data),
        Err(e) => {
            warn!("Unable to re-JSON encode a record: {value}: {e}");
            None
        }
    }
}

/// The framing strategy used for a run.
#[derive(Debug)]
pub enum Framer {
    Line(LineFramer),
    Json(JsonFramer),
}

impl Framer {
    #[must_use]
    pub fn from_config(config: &StreamerConfig) -> Self {
        match config.input_format {
            InputFormat::Json => Framer::Json(JsonFramer::new()),
            InputFormat::Line => {
                let encoding = match config.payload_format {
                    PayloadFormat::String => LineEncoding::Raw,
                    PayloadFormat::Json => LineEncoding::json(
                        config.output_key.clone(),
                        config.additional_entries.clone(),
                    ),
                };
                Framer::Line(LineFramer::new(encoding))
            }
        }
    }

    pub fn push_chunk(
        &mut self,
        chunk: &[u8],
        out: &mut Vec<Vec<u8>>,
    ) -> Result<(), serde_json::Error> {
        match self {
            Framer::Line(framer) => {
                framer.push_chunk(chunk, out);
                Ok(())
            }
            Framer::Json(framer) => framer.push_chunk(chunk, out),
        }
    }

    pub fn finish(&mut self, out: &mut Vec<Vec<u8>>) -> Result<(), serde_json::Error> {
        match self {
            Framer::Line(framer) => {
                framer.finish();
                Ok(())
            }
            Framer::Json(framer) => framer.finish(out),
        }
    }
}
