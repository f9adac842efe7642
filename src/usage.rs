use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }

    pub fn from_value(value: &Value) -> Self {
        Self {
            prompt_tokens: token_count(value.get("prompt_tokens")),
            completion_tokens: token_count(value.get("completion_tokens")),
            total_tokens: token_count(value.get("total_tokens")),
        }
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self {
            prompt_tokens: self.prompt_tokens.saturating_add(other.prompt_tokens),
            completion_tokens: self
                .completion_tokens
                .saturating_add(other.completion_tokens),
            total_tokens: self.total_tokens.saturating_add(other.total_tokens),
        }
    }
}

fn token_count(value: Option<&Value>) -> u64 {
    let Some(Value::Number(number)) = value else {
        return 0;
    };
    if let Some(count) = number.as_u64() {
        return count;
    }
    match number.as_f64() {
        Some(count) if count.is_finite() && count >= 0.0 => count.trunc() as u64,
        _ => 0,
    }
}

/// Returns the `usage` block of a chat-completion response body, or `None`
/// when the response carries no usage. Only a body that is not JSON is an error.
pub fn extract_usage(body: &str) -> Result<Option<TokenUsage>> {
    let root: Value =
        serde_json::from_str(body).context("Failed to parse response body as JSON")?;
    Ok(root.get("usage").map(TokenUsage::from_value))
}
