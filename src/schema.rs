//! The quiz result schema: the pipeline's only external contract.
//!
//! Serialised form:
//!
//! ```json
//! {"items": [{"question": "…", "options": ["a", "b", "c", "d"],
//!             "correct_index": 2, "explanation": "…"}]}
//! ```
//!
//! Deserialisation goes through permissive "raw" shapes and then a checked
//! conversion (`serde(try_from)`), so a [`GenerationResult`] value that exists
//! always satisfies every invariant: 1–10 items, non-empty questions,
//! exactly four options, `correct_index` in `0..4`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Number of answer options every item carries.
pub const OPTION_COUNT: usize = 4;

/// Hard upper bound on items in a result, independent of what was requested.
pub const MAX_ITEMS: usize = 10;

/// Lower bound on items in a result. Zero items is a violation, not an empty success.
pub const MIN_ITEMS: usize = 1;

// ── Violation ────────────────────────────────────────────────────────────

/// The first schema rule a candidate result broke.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{path}: {reason}")]
pub struct SchemaViolation {
    /// JSON path of the offending field, e.g. `items[2].options`.
    pub path: String,
    pub reason: String,
}

impl SchemaViolation {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

// ── Item ─────────────────────────────────────────────────────────────────

/// One validated multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMcqItem")]
pub struct McqItem {
    pub question: String,
    pub options: [String; OPTION_COUNT],
    pub correct_index: u8,
    pub explanation: String,
}

impl McqItem {
    /// The text of the correct option.
    pub fn correct_option(&self) -> &str {
        &self.options[self.correct_index as usize]
    }

    fn from_raw(raw: RawMcqItem, path: &str) -> Result<Self, SchemaViolation> {
        if raw.question.trim().is_empty() {
            return Err(SchemaViolation::new(
                format!("{path}.question"),
                "question must be a non-empty string",
            ));
        }

        let count = raw.options.len();
        let options: [String; OPTION_COUNT] = raw.options.try_into().map_err(|_| {
            SchemaViolation::new(
                format!("{path}.options"),
                format!("expected exactly {OPTION_COUNT} options, got {count}"),
            )
        })?;

        let correct_index = u8::try_from(raw.correct_index)
            .ok()
            .filter(|i| (*i as usize) < OPTION_COUNT)
            .ok_or_else(|| {
                SchemaViolation::new(
                    format!("{path}.correct_index"),
                    format!(
                        "must be between 0 and {}, got {}",
                        OPTION_COUNT - 1,
                        raw.correct_index
                    ),
                )
            })?;

        Ok(McqItem {
            question: raw.question,
            options,
            correct_index,
            explanation: raw.explanation,
        })
    }
}

impl TryFrom<RawMcqItem> for McqItem {
    type Error = SchemaViolation;

    fn try_from(raw: RawMcqItem) -> Result<Self, Self::Error> {
        McqItem::from_raw(raw, "item")
    }
}

/// Wire shape before validation. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct RawMcqItem {
    question: String,
    options: Vec<String>,
    correct_index: i64,
    explanation: String,
}

// ── Result ───────────────────────────────────────────────────────────────

/// A validated set of 1–10 quiz items. Produced once per request, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGenerationResult")]
pub struct GenerationResult {
    items: Vec<McqItem>,
}

#[derive(Debug, Deserialize)]
struct RawGenerationResult {
    items: Vec<RawMcqItem>,
}

impl TryFrom<RawGenerationResult> for GenerationResult {
    type Error = SchemaViolation;

    fn try_from(raw: RawGenerationResult) -> Result<Self, Self::Error> {
        let count = raw.items.len();
        if !(MIN_ITEMS..=MAX_ITEMS).contains(&count) {
            return Err(SchemaViolation::new(
                "items",
                format!("expected between {MIN_ITEMS} and {MAX_ITEMS} items, got {count}"),
            ));
        }

        let items = raw
            .items
            .into_iter()
            .enumerate()
            .map(|(i, item)| McqItem::from_raw(item, &format!("items[{i}]")))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(GenerationResult { items })
    }
}

impl GenerationResult {
    /// Build a result from already-constructed items, enforcing the item-count bounds.
    pub fn new(items: Vec<McqItem>) -> Result<Self, SchemaViolation> {
        let count = items.len();
        if !(MIN_ITEMS..=MAX_ITEMS).contains(&count) {
            return Err(SchemaViolation::new(
                "items",
                format!("expected between {MIN_ITEMS} and {MAX_ITEMS} items, got {count}"),
            ));
        }
        Ok(Self { items })
    }

    /// Validate an arbitrary JSON value against the schema.
    pub fn from_value(value: &Value) -> Result<Self, SchemaViolation> {
        if !value.is_object() {
            return Err(SchemaViolation::new(
                "$",
                format!("expected a JSON object, got {}", json_kind(value)),
            ));
        }
        let raw: RawGenerationResult = RawGenerationResult::deserialize(value)
            .map_err(|e| SchemaViolation::new("$", e.to_string()))?;
        raw.try_into()
    }

    /// Parse and validate a JSON document.
    pub fn from_json(s: &str) -> Result<Self, SchemaViolation> {
        let value: Value =
            serde_json::from_str(s).map_err(|e| SchemaViolation::new("$", format!("not valid JSON: {e}")))?;
        Self::from_value(&value)
    }

    pub fn items(&self) -> &[McqItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<McqItem> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always `false` for a constructed value; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Pretty-printed JSON, non-ASCII characters kept as-is.
    pub fn to_json_pretty(&self) -> String {
        // Serialising plain strings and integers cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// JSON Schema describing the accepted shape, sent to the model.
    pub fn json_schema() -> Value {
        json!({
            "title": "GenerationResult",
            "type": "object",
            "additionalProperties": false,
            "required": ["items"],
            "properties": {
                "items": {
                    "type": "array",
                    "minItems": MIN_ITEMS,
                    "maxItems": MAX_ITEMS,
                    "items": {
                        "title": "MCQItem",
                        "type": "object",
                        "additionalProperties": false,
                        "required": ["question", "options", "correct_index", "explanation"],
                        "properties": {
                            "question": { "type": "string", "minLength": 1 },
                            "options": {
                                "type": "array",
                                "items": { "type": "string" },
                                "minItems": OPTION_COUNT,
                                "maxItems": OPTION_COUNT
                            },
                            "correct_index": {
                                "type": "integer",
                                "minimum": 0,
                                "maximum": OPTION_COUNT - 1
                            },
                            "explanation": { "type": "string" }
                        }
                    }
                }
            }
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Request bound ────────────────────────────────────────────────────────

/// Requested number of questions, 1–10.
///
/// A soft bound: it is passed to the prompt, but the result is only ever
/// truncated by the schema's hard bound of [`MAX_ITEMS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct MaxQuestions(u8);

impl MaxQuestions {
    pub const MIN: u8 = MIN_ITEMS as u8;
    pub const MAX: u8 = MAX_ITEMS as u8;

    pub fn new(n: u32) -> Result<Self, crate::error::Pdf2McqError> {
        if n < Self::MIN as u32 || n > Self::MAX as u32 {
            return Err(crate::error::Pdf2McqError::InvalidConfig(format!(
                "max_questions must be {}–{}, got {n}",
                Self::MIN,
                Self::MAX
            )));
        }
        Ok(Self(n as u8))
    }

    /// Clamp any value into range.
    pub fn saturating(n: u32) -> Self {
        Self(n.clamp(Self::MIN as u32, Self::MAX as u32) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for MaxQuestions {
    fn default() -> Self {
        Self(Self::MAX)
    }
}

impl TryFrom<u32> for MaxQuestions {
    type Error = crate::error::Pdf2McqError;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        Self::new(n)
    }
}

impl From<MaxQuestions> for u32 {
    fn from(m: MaxQuestions) -> u32 {
        m.0 as u32
    }
}

impl fmt::Display for MaxQuestions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
