//! Output Parser: classify what the answering process printed.
//!
//! The process may print diagnostics before its answer object, so the
//! strategies run from most to least deterministic:
//!
//! 1. the text after the last configured sentinel line,
//! 2. the whole output decoded as one object,
//! 3. the text from the last `{"text":` marker to the end.
//!
//! Anything that does not yield an object with a non-empty `text` becomes a
//! plain answer. Parsing never fails.

use calgpt_core::config::ParserConfig;
use calgpt_core::types::{CourseRecord, ParsedAnswer};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Start of the trailing answer object in marker-based extraction.
pub const TEXT_MARKER: &str = "{\"text\":";

#[derive(Debug, Clone)]
pub struct OutputParser {
    sentinel: Option<String>,
    marker_fallback: bool,
}

impl Default for OutputParser {
    fn default() -> Self {
        Self::new(None, true)
    }
}

/// Result of trying to read one candidate slice as an answer object.
enum Decoded {
    Answer(ParsedAnswer),
    MissingText,
    NotAnObject,
}

impl OutputParser {
    pub fn new(sentinel: Option<String>, marker_fallback: bool) -> Self {
        Self {
            sentinel: sentinel
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            marker_fallback,
        }
    }

    pub fn from_config(config: &ParserConfig) -> Self {
        Self::new(config.sentinel.clone(), config.marker_fallback)
    }

    pub fn sentinel(&self) -> Option<&str> {
        self.sentinel.as_deref()
    }

    pub fn parse(&self, output: &str) -> ParsedAnswer {
        let trimmed = output.trim();
        let plain = || ParsedAnswer::Plain {
            text: trimmed.to_string(),
        };
        if trimmed.is_empty() {
            return plain();
        }

        if let Some(body) = self
            .sentinel
            .as_deref()
            .and_then(|s| after_last_sentinel(trimmed, s))
        {
            match decode_answer(body.trim()) {
                Decoded::Answer(answer) => return answer,
                Decoded::MissingText => {
                    warn!(
                        reason = "missing_text",
                        strategy = "sentinel",
                        "Answer object has no usable text"
                    );
                    return plain();
                }
                Decoded::NotAnObject => {
                    debug!("Text after sentinel is not an answer object");
                }
            }
        }

        match decode_answer(trimmed) {
            Decoded::Answer(answer) => return answer,
            Decoded::MissingText => {
                warn!(
                    reason = "missing_text",
                    strategy = "whole",
                    "Answer object has no usable text"
                );
                return plain();
            }
            Decoded::NotAnObject => {}
        }

        if self.marker_fallback {
            if let Some(idx) = trimmed.rfind(TEXT_MARKER) {
                match decode_answer(&trimmed[idx..]) {
                    Decoded::Answer(answer) => return answer,
                    Decoded::MissingText => {
                        warn!(
                            reason = "missing_text",
                            strategy = "marker",
                            "Answer object has no usable text"
                        );
                    }
                    Decoded::NotAnObject => {
                        debug!(offset = idx, "Trailing marker did not decode");
                    }
                }
            }
        }

        plain()
    }
}

/// Parse with the default settings: no sentinel, marker fallback enabled.
pub fn parse_output(output: &str) -> ParsedAnswer {
    OutputParser::default().parse(output)
}

/// The first `max_chars` characters of `text`, never splitting a character.
pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Slice after the last line equal to `sentinel`, if any.
fn after_last_sentinel<'a>(text: &'a str, sentinel: &str) -> Option<&'a str> {
    let mut offset = 0;
    let mut found = None;
    for line in text.split_inclusive('\n') {
        offset += line.len();
        if line.trim() == sentinel {
            found = Some(offset);
        }
    }
    found.map(|end| &text[end..])
}

fn decode_answer(candidate: &str) -> Decoded {
    let object = match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(object)) => object,
        _ => return Decoded::NotAnObject,
    };

    let text = match object.get("text").and_then(Value::as_str) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => return Decoded::MissingText,
    };
    let courses = decode_courses(object.get("courses"));
    Decoded::Answer(ParsedAnswer::Structured { text, courses })
}

/// Decode each element on its own so one bad record does not sink the rest.
fn decode_courses(value: Option<&Value>) -> Vec<CourseRecord> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| match CourseRecord::deserialize(item) {
                Ok(course) => Some(course),
                Err(e) => {
                    warn!(index, error = %e, "Dropping malformed course entry");
                    None
                }
            })
            .collect(),
        Some(_) => {
            warn!("Ignoring courses field that is not an array");
            Vec::new()
        }
    }
}
