//! Reduces the child's response shapes to one success/data/error triple.
//!
//! Classification of text content is a keyword heuristic, not a protocol
//! guarantee. Callers that need the authoritative status should read the raw
//! payload. An empty keyword set turns the heuristic off.

use serde::Serialize;
use serde_json::Value;

use crate::bridge::protocol::JsonRpcMessage;

/// Failure markers matched case-insensitively against text content.
pub const DEFAULT_FAILURE_KEYWORDS: &[&str] =
    &["error", "failed", "exception", "错误", "失败", "异常"];

/// Uniform outcome handed to HTTP callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl NormalizedResult {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error_message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error_message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    keywords: Vec<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_KEYWORDS.iter().copied())
    }
}

impl Normalizer {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    /// Normalizer that never reclassifies text content as a failure.
    pub fn disabled() -> Self {
        Self {
            keywords: Vec::new(),
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn looks_like_failure(&self, text: &str) -> bool {
        if self.keywords.is_empty() {
            return false;
        }
        let lowered = text.to_lowercase();
        self.keywords.iter().any(|k| lowered.contains(k.as_str()))
    }

    pub fn normalize(&self, message: Option<&JsonRpcMessage>) -> NormalizedResult {
        let Some(message) = message else {
            return NormalizedResult::failure("No response");
        };

        if let Some(ref error) = message.error {
            let text = error
                .message
                .as_deref()
                .filter(|m| !m.is_empty())
                .unwrap_or("Unknown error");
            return NormalizedResult::failure(text);
        }

        let Some(result) = message.result.as_ref().filter(|r| !r.is_null()) else {
            return NormalizedResult::failure("Empty result");
        };

        if let Some(blocks) = result.get("content").and_then(Value::as_array) {
            return self.normalize_content(blocks, result);
        }

        if let Some(success) = result.get("success").and_then(Value::as_bool) {
            let error_message = result
                .get("errorMessage")
                .or_else(|| result.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let data = result
                .get("result")
                .or_else(|| result.get("data"))
                .filter(|v| !v.is_null())
                .cloned();
            return NormalizedResult {
                success,
                data,
                error_message,
            };
        }

        NormalizedResult::success(result.clone())
    }

    fn normalize_content(&self, blocks: &[Value], raw: &Value) -> NormalizedResult {
        let text = blocks
            .iter()
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n");

        if text.is_empty() {
            return NormalizedResult::success(raw.clone());
        }

        if self.looks_like_failure(&text) {
            NormalizedResult {
                success: false,
                data: Some(Value::String(text.clone())),
                error_message: Some(text),
            }
        } else {
            NormalizedResult::success(Value::String(text))
        }
    }
}
