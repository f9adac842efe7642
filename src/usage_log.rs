use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::timestamp::UsageTimezone;
use crate::usage::{self, TokenUsage};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: String,
    #[serde(flatten)]
    pub usage: TokenUsage,
}

impl UsageRecord {
    pub fn new(timestamp: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            timestamp: timestamp.into(),
            usage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageSummary {
    NoLog,
    ParseFailure,
    Totals(TokenUsage),
}

enum LoadedLog {
    Missing,
    Unparseable,
    Entries(Vec<Value>),
}

#[derive(Debug, Clone)]
pub struct UsageLog {
    path: PathBuf,
}

impl UsageLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<LoadedLog> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(LoadedLog::Missing),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("Failed to read usage log '{}'", self.path.display())
                });
            }
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(entries)) => Ok(LoadedLog::Entries(entries)),
            Ok(_) | Err(_) => Ok(LoadedLog::Unparseable),
        }
    }

    /// Appends `record` and rewrites the whole file. A missing or unparseable
    /// log starts over as an empty array.
    pub fn append(&self, record: &UsageRecord) -> Result<()> {
        let mut entries = match self.load()? {
            LoadedLog::Entries(entries) => entries,
            LoadedLog::Missing => Vec::new(),
            LoadedLog::Unparseable => {
                warn!(
                    path = %self.path.display(),
                    "usage log is not a JSON array; starting a fresh log"
                );
                Vec::new()
            }
        };

        entries.push(serde_json::to_value(record).context("Failed to encode usage record")?);
        let encoded =
            serde_json::to_string_pretty(&entries).context("Failed to encode usage log")?;

        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create usage log directory '{}'", dir.display())
            })?;
        }
        fs::write(&self.path, encoded)
            .with_context(|| format!("Failed to write usage log '{}'", self.path.display()))?;

        debug!(
            path = %self.path.display(),
            entries = entries.len(),
            total_tokens = record.usage.total_tokens,
            "appended usage record"
        );
        Ok(())
    }

    pub fn aggregate(&self) -> Result<UsageSummary> {
        let summary = match self.load()? {
            LoadedLog::Missing => UsageSummary::NoLog,
            LoadedLog::Unparseable => UsageSummary::ParseFailure,
            LoadedLog::Entries(entries) => UsageSummary::Totals(
                entries
                    .iter()
                    .map(TokenUsage::from_value)
                    .fold(TokenUsage::default(), TokenUsage::saturating_add),
            ),
        };
        Ok(summary)
    }

    pub fn record_response(
        &self,
        body: &str,
        timezone: &UsageTimezone,
    ) -> Result<Option<UsageRecord>> {
        let Some(usage) = usage::extract_usage(body)? else {
            debug!("response carried no usage field; nothing logged");
            return Ok(None);
        };

        let record = UsageRecord::new(timezone.now(), usage);
        self.append(&record)?;
        Ok(Some(record))
    }
}
