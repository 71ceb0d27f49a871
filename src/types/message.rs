//! @dose
//! purpose: Message contract between the token engine and its worker. Requests and responses
//!     travel as untyped JSON values; these types are the only way either side turns a value
//!     back into something it acts on.
//!
//! when-editing:
//!     - !Field names are camelCase on the wire; the `type` tag values are part of the contract
//!     - !Every inbound value goes through from_message, which never panics
//!     - topHeavyRanges is accepted as an alias for heavyRanges on input only
//!
//! invariants:
//!     - A well-formed HeavyRange has start_line <= end_line and tokens > 0
//!     - A result and an error always carry the request_id of the request they answer
//!
//! gotchas:
//!     - Negative or fractional counts fail deserialization into usize, which is how they are rejected

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const TOKENIZE_REQUEST_TYPE: &str = "tokenize";
pub const TOKENIZE_RESULT_TYPE: &str = "tokenize:result";
pub const TOKENIZE_ERROR_TYPE: &str = "tokenize:error";

/// Severity of a heavy line range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// A contiguous line span whose token density crossed a threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeavyRange {
    pub start_line: usize,
    pub end_line: usize,
    pub tokens: usize,
    pub severity: Severity,
}

impl HeavyRange {
    /// Range covering a single line
    pub fn line(line: usize, tokens: usize, severity: Severity) -> Self {
        Self {
            start_line: line,
            end_line: line,
            tokens,
            severity,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.start_line <= self.end_line && self.tokens > 0
    }
}

/// Messages sent to the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerRequest {
    #[serde(rename = "tokenize", rename_all = "camelCase")]
    Tokenize {
        request_id: String,
        text: String,
        is_reconcile_request: bool,
    },
}

impl WorkerRequest {
    pub fn tokenize(request_id: impl Into<String>, text: impl Into<String>, reconcile: bool) -> Self {
        WorkerRequest::Tokenize {
            request_id: request_id.into(),
            text: text.into(),
            is_reconcile_request: reconcile,
        }
    }

    pub fn request_id(&self) -> &str {
        match self {
            WorkerRequest::Tokenize { request_id, .. } => request_id,
        }
    }

    /// Validate an inbound value, returning None for anything malformed
    pub fn from_message(value: Value) -> Option<Self> {
        serde_json::from_value(value).ok()
    }

    pub fn into_message(self) -> Value {
        // Serializing a plain enum of strings and bools cannot fail
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Payload of a successful tokenization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenizeResult {
    pub request_id: String,
    pub token_count: usize,
    /// True when the count came from a whole-document encode
    pub is_reconciled: bool,
    pub is_estimate: bool,
    #[serde(
        default,
        alias = "topHeavyRanges",
        skip_serializing_if = "Option::is_none"
    )]
    pub heavy_ranges: Option<Vec<HeavyRange>>,
}

/// Messages sent back by the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerResponse {
    #[serde(rename = "tokenize:result")]
    Result(TokenizeResult),
    #[serde(rename = "tokenize:error", rename_all = "camelCase")]
    Error { request_id: String, error: String },
}

impl WorkerResponse {
    pub fn request_id(&self) -> &str {
        match self {
            WorkerResponse::Result(result) => &result.request_id,
            WorkerResponse::Error { request_id, .. } => request_id,
        }
    }

    /// Validate an inbound value, returning None for anything malformed
    pub fn from_message(value: Value) -> Option<Self> {
        let response: WorkerResponse = serde_json::from_value(value).ok()?;
        if let WorkerResponse::Result(result) = &response {
            let ranges_ok = result
                .heavy_ranges
                .as_ref()
                .is_none_or(|ranges| ranges.iter().all(HeavyRange::is_well_formed));
            if !ranges_ok {
                return None;
            }
        }
        Some(response)
    }

    pub fn into_message(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
