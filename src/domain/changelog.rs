use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub changed: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
}

impl ChangeRecord {
    pub fn merge(&mut self, other: ChangeRecord) {
        self.added.extend(other.added);
        self.changed.extend(other.changed);
        self.removed.extend(other.removed);
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// Bullet list grouped by kind, used when no model summary is requested.
    pub fn to_markdown(&self) -> String {
        if self.is_empty() {
            return "- No notable changes.\n".to_string();
        }

        let mut out = String::new();
        for (heading, entries) in [
            ("Added", &self.added),
            ("Changed", &self.changed),
            ("Removed", &self.removed),
        ] {
            if entries.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("### {heading}\n\n"));
            for entry in entries {
                out.push_str(&format!("- {}\n", entry.trim()));
            }
        }
        out
    }
}

/// Why the model stopped producing output for a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionStatus {
    Stop,
    Length,
    Other(String),
    Unknown,
}

impl CompletionStatus {
    pub fn from_finish_reason(reason: Option<&str>) -> Self {
        match reason.map(|r| r.trim().to_lowercase()) {
            None => CompletionStatus::Unknown,
            Some(r) if r == "stop" => CompletionStatus::Stop,
            Some(r) if r == "length" => CompletionStatus::Length,
            Some(r) => CompletionStatus::Other(r),
        }
    }

    pub fn is_natural(&self) -> bool {
        matches!(self, CompletionStatus::Stop)
    }
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionStatus::Stop => f.write_str("stop"),
            CompletionStatus::Length => f.write_str("length"),
            CompletionStatus::Other(reason) => f.write_str(reason),
            CompletionStatus::Unknown => f.write_str("unknown"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub chunk: String,
    pub text: String,
    pub status: CompletionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedOutput {
    NoJsonObject,
    InvalidJson(String),
}

impl fmt::Display for MalformedOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedOutput::NoJsonObject => f.write_str("no JSON object in model output"),
            MalformedOutput::InvalidJson(err) => write!(f, "invalid JSON in model output: {err}"),
        }
    }
}

/// Parses the text between the first `{` and the last `}` of a model reply.
///
/// Each list is read on its own: a key that is null or not an array counts as
/// empty, and list items that are not strings are stringified or dropped.
pub fn extract_record(text: &str) -> Result<ChangeRecord, MalformedOutput> {
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return Err(MalformedOutput::NoJsonObject);
    };
    if end < start {
        return Err(MalformedOutput::NoJsonObject);
    }

    let value: Value = serde_json::from_str(&text[start..=end])
        .map_err(|err| MalformedOutput::InvalidJson(err.to_string()))?;
    let Value::Object(object) = value else {
        return Err(MalformedOutput::NoJsonObject);
    };

    Ok(ChangeRecord {
        added: list_field(&object, "added"),
        changed: list_field(&object, "changed"),
        removed: list_field(&object, "removed"),
    })
}

fn list_field(object: &Map<String, Value>, key: &str) -> Vec<String> {
    let items = match object.get(key) {
        None => return Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => {
            warn!(
                key,
                found = json_kind(other),
                "expected a list in model output; treating it as empty"
            );
            return Vec::new();
        }
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(entry) => Some(entry.clone()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            other => {
                warn!(
                    key,
                    found = json_kind(other),
                    "dropping non-text entry from model output"
                );
                None
            }
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
