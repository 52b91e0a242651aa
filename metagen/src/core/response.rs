//! Parsing of free-form completion text into a [`CandidateSpec`].

use std::sync::LazyLock;

use jsonschema::Validator;
use serde_json::Value;

use crate::core::types::CandidateSpec;

/// JSON Schema the generation response must satisfy.
pub const CANDIDATE_SCHEMA: &str = include_str!("../../schemas/candidate.schema.json");

static CANDIDATE_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(CANDIDATE_SCHEMA).expect("candidate schema should be valid json");
    jsonschema::validator_for(&schema).expect("candidate schema should compile")
});

/// Why a response could not be turned into a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub reason: String,
    /// The unparsed response, preserved verbatim.
    pub raw: String,
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason)
    }
}

/// Parse a completion into a candidate.
///
/// Tries the whole text first, then the span from the first `{` to the last
/// `}`. The object must satisfy [`CANDIDATE_SCHEMA`].
pub fn parse_candidate(raw: &str) -> Result<CandidateSpec, ParseFailure> {
    let value = extract_json_object(raw).ok_or_else(|| ParseFailure {
        reason: "response does not contain a JSON object".to_string(),
        raw: raw.to_string(),
    })?;

    let messages: Vec<String> = CANDIDATE_VALIDATOR
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(ParseFailure {
            reason: format!("response violates candidate schema: {}", messages.join("; ")),
            raw: raw.to_string(),
        });
    }

    serde_json::from_value(value).map_err(|err| ParseFailure {
        reason: format!("deserialize candidate: {err}"),
        raw: raw.to_string(),
    })
}

/// Locate a JSON object in free-form text.
pub fn extract_json_object(raw: &str) -> Option<Value> {
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(raw.trim()) {
        return Some(value);
    }
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&raw[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}
