use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CalgptError, Result};

// =============================================================================
// Enums
// =============================================================================

/// Who authored a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

// =============================================================================
// Requests
// =============================================================================

/// One prior turn forwarded to the answering process as context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryTurn {
    #[serde(alias = "from", alias = "role")]
    pub sender: Sender,
    pub text: String,
}

impl HistoryTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            text: text.into(),
        }
    }
}

/// A question plus the conversation so far, as received over HTTP.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub chat_history: Vec<HistoryTurn>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            chat_history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<HistoryTurn>) -> Self {
        self.chat_history = history;
        self
    }

    /// Trim the question and reject it if nothing is left.
    pub fn normalized(mut self) -> Result<Self> {
        let trimmed = self.question.trim();
        if trimmed.is_empty() {
            return Err(CalgptError::Validation(
                "question must not be empty".to_string(),
            ));
        }
        if trimmed.len() != self.question.len() {
            self.question = trimmed.to_string();
        }
        Ok(self)
    }
}

// =============================================================================
// Answers
// =============================================================================

/// A single course as emitted by the answering process.
///
/// Field names on the wire follow the course catalogue the answering process
/// reads from (`abbreviation`, `courseNumber`, ...). Optional fields that are
/// missing stay `None` and are omitted again on serialization, so "unknown"
/// never turns into zero or an empty string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CourseRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "abbreviation", alias = "department")]
    pub department: String,
    #[serde(
        rename = "courseNumber",
        alias = "number",
        deserialize_with = "string_or_number"
    )]
    pub number: String,
    pub title: String,
    #[serde(rename = "openSeats")]
    pub open_seats: u32,
    #[serde(rename = "enrolledPercentage", alias = "enrolledFraction")]
    pub enrolled_fraction: f64,
    #[serde(
        default,
        deserialize_with = "optional_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub units: Option<String>,
    #[serde(
        rename = "letterAverage",
        alias = "gradeLetter",
        default,
        deserialize_with = "optional_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub grade_letter: Option<String>,
    #[serde(
        rename = "gradeAverage",
        alias = "gradeGPA",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub grade_gpa: Option<f64>,
}

/// Label shown for a grade that is reported as unavailable.
pub const GRADE_NOT_AVAILABLE: &str = "N/A";

impl CourseRecord {
    /// `false` when the catalogue reported the `-1` "no data" sentinel.
    pub fn grade_available(&self) -> bool {
        let letter_sentinel = self
            .grade_letter
            .as_deref()
            .map(|l| matches!(l.trim(), "-1" | "-1.0"))
            .unwrap_or(false);
        let gpa_sentinel = self.grade_gpa.map(|g| g == -1.0).unwrap_or(false);
        !(letter_sentinel || gpa_sentinel)
    }

    /// Display text for the grade: `N/A` for the sentinel, the letter grade
    /// when present, else the GPA to one decimal. `None` when nothing is known.
    pub fn grade_label(&self) -> Option<String> {
        if !self.grade_available() {
            return Some(GRADE_NOT_AVAILABLE.to_string());
        }
        if let Some(letter) = self.grade_letter.as_deref().filter(|l| !l.is_empty()) {
            return Some(letter.to_string());
        }
        self.grade_gpa.map(|g| format!("{:.1}", g))
    }

    /// Course code as displayed, e.g. `COMPSCI 61A`.
    pub fn code(&self) -> String {
        format!("{} {}", self.department, self.number)
    }
}

/// Classified output of the answering process.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParsedAnswer {
    /// The process emitted a `{text, courses?}` object.
    Structured {
        text: String,
        courses: Vec<CourseRecord>,
    },
    /// Anything else; the whole trimmed output is the text.
    Plain { text: String },
}

impl ParsedAnswer {
    pub fn text(&self) -> &str {
        match self {
            ParsedAnswer::Structured { text, .. } | ParsedAnswer::Plain { text } => text,
        }
    }

    /// Courses carried by a structured answer; empty for plain answers.
    pub fn courses(&self) -> &[CourseRecord] {
        match self {
            ParsedAnswer::Structured { courses, .. } => courses,
            ParsedAnswer::Plain { .. } => &[],
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, ParsedAnswer::Structured { .. })
    }

    pub fn into_parts(self) -> (String, Vec<CourseRecord>) {
        match self {
            ParsedAnswer::Structured { text, courses } => (text, courses),
            ParsedAnswer::Plain { text } => (text, Vec::new()),
        }
    }
}

// =============================================================================
// Lenient field decoding
// =============================================================================

fn scalar_to_string<E: serde::de::Error>(
    value: serde_json::Value,
) -> std::result::Result<String, E> {
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(E::custom(format!("expected string or number, got {}", other))),
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    scalar_to_string(value)
}

fn optional_string_or_number<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => scalar_to_string::<D::Error>(value).map(Some),
    }
}
