//! Core data types shared across the query pipeline
//!
//! Defines the parametrized query shape handed to the graph store, the flat
//! record shape coming back, and the uniform result envelope every question
//! resolves to.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// A typed scalar bound to a named query parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Int(i64),
    Float(f64),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

/// A parametrized graph query ready for execution
///
/// User-supplied values are always carried as named parameters, never
/// spliced into the query text. Queries produced by the generative path
/// carry an empty parameter map because the model emits literal values.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphQuery {
    /// Query text with `$name` parameter placeholders
    pub text: String,
    /// Named parameter bindings, applied in order
    pub params: Vec<(String, ParamValue)>,
}

impl GraphQuery {
    pub fn new(text: impl Into<String>) -> Self {
        GraphQuery {
            text: text.into(),
            params: Vec::new(),
        }
    }

    /// Bind a named parameter, consuming and returning the query
    pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }
}

/// A scalar field in a result record
///
/// Non-scalar values returned by generated queries (nodes, lists, maps)
/// are flattened to their compact JSON text so records stay flat.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(v) => FieldValue::Bool(v),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Int(i)
                } else {
                    FieldValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(v) => FieldValue::Text(v),
            other => FieldValue::Text(other.to_string()),
        }
    }
}

/// One flat key -> scalar row returned by the graph store
pub type Record = BTreeMap<String, FieldValue>;

/// The uniform response shape returned for every question
///
/// Exactly one of `result`/`error` is populated, matching `success`. The
/// constructors are the only way to build one, so a half-populated
/// envelope cannot exist.
#[derive(Debug, Clone, Serialize)]
pub struct ResultEnvelope {
    /// Whether the question produced a result
    pub success: bool,
    /// The original question text, unmodified
    pub question: String,
    /// Result records when `success` is true
    pub result: Option<Vec<Record>>,
    /// Human-readable error message when `success` is false
    pub error: Option<String>,
}

impl ResultEnvelope {
    pub fn ok(question: impl Into<String>, records: Vec<Record>) -> Self {
        ResultEnvelope {
            success: true,
            question: question.into(),
            result: Some(records),
            error: None,
        }
    }

    pub fn fail(question: impl Into<String>, error: impl Into<String>) -> Self {
        ResultEnvelope {
            success: false,
            question: question.into(),
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Check that a question is acceptable before routing it.
///
/// Returns the rejection message for input the pipeline should not see:
/// empty or whitespace-only text, questions shorter than 3 characters or
/// longer than 1000, and questions carrying credential-hunting terms.
pub fn validate_question(question: &str) -> Result<(), &'static str> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err("Question cannot be empty");
    }
    if trimmed.len() < 3 {
        return Err("Question is too short");
    }
    if question.len() > 1000 {
        return Err("Question is too long");
    }

    let lowered = question.to_lowercase();
    const BLOCKED_TERMS: [&str; 3] = ["password", "secret", "confidential"];
    if BLOCKED_TERMS.iter().any(|term| lowered.contains(term)) {
        return Err("Question contains inappropriate terms");
    }

    Ok(())
}
