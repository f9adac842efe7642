use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::model::{ChatCompletionRequest, Message};
use crate::providers::http_errors::model_api_request_error;

pub async fn chat(client: &Client, cfg: &Config, messages: &[Message]) -> Result<String> {
    let api_url = cfg.api_url.as_str();
    let body = ChatCompletionRequest::new(&cfg.model, messages);
    debug!(
        api_url = %api_url,
        model = %cfg.model,
        message_count = messages.len(),
        "sending chat completion request"
    );

    let response = client
        .post(api_url)
        .bearer_auth(&cfg.api_key)
        .json(&body)
        .send()
        .await
        .map_err(|err| {
            warn!(
                api_url = %api_url,
                model = %cfg.model,
                error = %err,
                "chat completion request failed"
            );
            model_api_request_error(err, api_url, cfg.request_timeout_secs)
        })?;

    let status = response.status();
    let response_body = response
        .text()
        .await
        .context("Failed to read chat completion response body")?;

    if !status.is_success() {
        warn!(
            api_url = %api_url,
            model = %cfg.model,
            status = %status,
            response_body_len = response_body.len(),
            "chat completion returned non-success status"
        );
        return Err(anyhow!(
            "Model request failed with status {}: {}",
            status,
            response_body
        ));
    }

    debug!(
        model = %cfg.model,
        response_len = response_body.len(),
        "received chat completion response"
    );
    Ok(response_body)
}

pub fn extract_assistant_content(body: &str) -> Result<String> {
    let root: Value =
        serde_json::from_str(body).context("Failed to parse response body as JSON")?;
    let choices = root
        .get("choices")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Invalid response: 'choices' is not an array"))?;
    let choice = choices
        .first()
        .filter(|choice| choice.is_object())
        .ok_or_else(|| anyhow!("Invalid response: choices[0] is not an object"))?;
    let message = choice
        .get("message")
        .filter(|message| message.is_object())
        .ok_or_else(|| anyhow!("Invalid response: 'message' is not an object"))?;
    message
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid response: 'content' is not a string"))
}
