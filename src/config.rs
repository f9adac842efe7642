use anyhow::{Result, anyhow};
use serde_json::Value;
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::timestamp::UsageTimezone;

const DEFAULT_CONFIG_PATH: &str = "openai.json";
const DEFAULT_PREFERRED_LANGUAGE: &str = "ja";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_TIMEZONE: &str = "UTC";
const DEFAULT_USAGE_LOG_PATH: &str = "token_usage_log.json";
const DEFAULT_POLLING_RATE_MS: u64 = 1000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

const SYSTEM_PROMPT_EN: &str = "You are a helpful assistant.";
const SYSTEM_PROMPT_ZH: &str = "你是個得力的助手。我想用繁體中文交流。";
const SYSTEM_PROMPT_JA: &str = "あなたは有能なアシスタントです。";

#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    values: serde_json::Map<String, Value>,
}

impl ConfigFile {
    pub fn from_json(raw: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(raw)? {
            Value::Object(values) => Ok(Self { values }),
            _ => Err(anyhow!("config file must contain a JSON object")),
        }
    }

    pub fn read(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file found");
                return Self::default();
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read config file");
                return Self::default();
            }
        };

        Self::from_json(&raw).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "ignoring invalid config file");
            Self::default()
        })
    }

    fn string(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn number_text(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::Number(number) => Some(number.to_string()),
            Value::String(text) => Some(text.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub preferred_language: String,
    pub system_prompt: String,
    pub custom_instructions: String,
    pub user_info: String,
    pub ai_profile: String,
    pub model: String,
    pub api_url: String,
    pub timezone_alias: String,
    pub timezone: UsageTimezone,
    pub usage_log_path: PathBuf,
    pub polling_rate_ms: u64,
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = config_file_path(env::var("OPENAI_CONFIG").ok().as_deref());
        let file = ConfigFile::read(&path);
        Self::resolve(&file, |key| env::var(key).ok())
    }

    pub fn resolve(
        file: &ConfigFile,
        mut get_var: impl FnMut(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut lookup = |key: &str, var: &str| file.string(key).or_else(|| get_var(var));

        let api_key = lookup("api_key", "OPENAI_API_KEY")
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                anyhow!("API key is not set (add `api_key` to openai.json or set OPENAI_API_KEY)")
            })?;
        let preferred_language = lookup("preferred_language", "PREFERRED_LANGUAGE")
            .unwrap_or_else(|| DEFAULT_PREFERRED_LANGUAGE.to_string());
        let system_prompt = lookup("system_prompt", "SYSTEM_PROMPT")
            .unwrap_or_else(|| default_system_prompt(&preferred_language).to_string());
        let custom_instructions =
            lookup("custom_instructions", "CUSTOM_INSTRUCTIONS").unwrap_or_default();
        let user_info = lookup("user_info", "USER_INFO").unwrap_or_default();
        let ai_profile = lookup("ai_profile", "AI_PROFILE").unwrap_or_default();
        let model = lookup("model", "OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_url =
            lookup("api_url", "OPENAI_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let timezone_alias =
            lookup("timezone", "TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let usage_log_path = parse_usage_log_path(lookup("usage_log_path", "TOKEN_USAGE_LOG"));

        let polling_rate_ms = parse_polling_rate_ms(
            file.number_text("polling_rate_ms")
                .or_else(|| get_var("POLLING_RATE_MS"))
                .as_deref(),
        );
        let request_timeout_secs = parse_request_timeout_secs(
            file.number_text("request_timeout_secs")
                .or_else(|| get_var("REQUEST_TIMEOUT_SECS"))
                .as_deref(),
        );

        Ok(Self {
            api_key,
            preferred_language,
            system_prompt,
            custom_instructions,
            user_info,
            ai_profile,
            model,
            api_url,
            timezone: UsageTimezone::from_alias(&timezone_alias),
            timezone_alias,
            usage_log_path,
            polling_rate_ms,
            request_timeout_secs,
        })
    }

    pub fn combined_system_prompt(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}",
            self.system_prompt, self.custom_instructions, self.user_info, self.ai_profile
        )
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.polling_rate_ms)
    }
}

fn default_system_prompt(preferred_language: &str) -> &'static str {
    match preferred_language {
        "en" => SYSTEM_PROMPT_EN,
        "zh" => SYSTEM_PROMPT_ZH,
        _ => SYSTEM_PROMPT_JA,
    }
}

fn config_file_path(raw: Option<&str>) -> PathBuf {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn parse_usage_log_path(raw: Option<String>) -> PathBuf {
    raw.as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_USAGE_LOG_PATH))
}

fn parse_polling_rate_ms(raw: Option<&str>) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_POLLING_RATE_MS)
}

fn parse_request_timeout_secs(raw: Option<&str>) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
}
