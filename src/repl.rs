use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::model::turn_messages;
use crate::model_gateway::ModelGateway;
use crate::providers::openai::extract_assistant_content;
use crate::usage_log::{UsageLog, UsageRecord, UsageSummary};

const EXIT_COMMAND: &str = "exit";
const SHOW_TOKENS_COMMAND: &str = "show_tokens";
const USER_PROMPT: &str = "User > ";
const ASSISTANT_PREFIX: &str = "Assistant > ";

pub struct Turn {
    pub reply: Result<String>,
    pub usage: Result<Option<UsageRecord>>,
}

pub struct ChatSession<'a, G> {
    gateway: G,
    cfg: &'a Config,
    usage_log: UsageLog,
}

impl<'a, G> ChatSession<'a, G>
where
    G: ModelGateway,
{
    pub fn new(gateway: G, cfg: &'a Config) -> Self {
        Self {
            gateway,
            cfg,
            usage_log: UsageLog::new(cfg.usage_log_path.clone()),
        }
    }

    pub fn usage_log(&self) -> &UsageLog {
        &self.usage_log
    }

    pub async fn run_turn(&self, input: &str) -> Result<Turn> {
        let messages = turn_messages(self.cfg, input);
        let body = self.gateway.chat(&messages).await?;

        let reply = extract_assistant_content(&body);
        let usage = self
            .usage_log
            .record_response(&body, &self.cfg.timezone)
            .context("Failed to log token usage");

        if let Ok(Some(record)) = &usage {
            debug!(
                timestamp = %record.timestamp,
                prompt_tokens = record.usage.prompt_tokens,
                completion_tokens = record.usage.completion_tokens,
                total_tokens = record.usage.total_tokens,
                "logged token usage"
            );
        }
        Ok(Turn { reply, usage })
    }

    pub async fn run<R, W, E>(&self, mut input: R, mut out: W, mut err_out: E) -> Result<()>
    where
        R: BufRead,
        W: Write,
        E: Write,
    {
        writeln!(out, "openai-cli")?;
        writeln!(out, "model: {}", self.cfg.model)?;
        writeln!(
            out,
            "type a prompt, '{}' for cumulative token usage, or '{}' to quit",
            SHOW_TOKENS_COMMAND, EXIT_COMMAND
        )?;

        let mut buf = Vec::new();
        loop {
            write!(out, "{}", USER_PROMPT)?;
            out.flush().context("Failed to flush stdout")?;

            buf.clear();
            let read = input
                .read_until(b'\n', &mut buf)
                .context("Failed to read stdin")?;
            if read == 0 {
                break;
            }
            let prompt = match std::str::from_utf8(&buf) {
                Ok(line) => line.trim(),
                Err(err) => {
                    warn!(error = %err, "discarding input line that is not valid UTF-8");
                    writeln!(err_out, "Error: input is not valid UTF-8: {err}")?;
                    continue;
                }
            };

            if prompt.is_empty() {
                continue;
            }
            if prompt == EXIT_COMMAND {
                break;
            }
            if prompt == SHOW_TOKENS_COMMAND {
                if let Err(err) = self.write_usage_summary(&mut out) {
                    warn!(error = %err, "failed to aggregate token usage");
                    writeln!(err_out, "Error: {err:#}")?;
                }
                continue;
            }

            match self.run_turn(prompt).await {
                Ok(turn) => {
                    match turn.reply {
                        Ok(reply) => writeln!(out, "{}{}", ASSISTANT_PREFIX, reply)?,
                        Err(err) => {
                            warn!(error = %err, "failed to extract assistant reply");
                            writeln!(err_out, "Error: failed to extract assistant reply: {err:#}")?;
                        }
                    }
                    if let Err(err) = turn.usage {
                        warn!(error = %err, "failed to log token usage");
                        writeln!(err_out, "Error: {err:#}")?;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "chat turn failed");
                    writeln!(err_out, "Error: {err:#}")?;
                }
            }

            let pacing = self.cfg.pacing();
            if !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }
        }

        info!("chat session ended");
        Ok(())
    }

    fn write_usage_summary(&self, out: &mut impl Write) -> Result<()> {
        match self.usage_log.aggregate()? {
            UsageSummary::NoLog => writeln!(out, "No token usage log found.")?,
            UsageSummary::ParseFailure => writeln!(out, "Failed to parse token usage log.")?,
            UsageSummary::Totals(totals) => {
                writeln!(out, "Total prompt tokens: {}", totals.prompt_tokens)?;
                writeln!(out, "Total completion tokens: {}", totals.completion_tokens)?;
                writeln!(out, "Total tokens: {}", totals.total_tokens)?;
            }
        }
        Ok(())
    }
}

pub async fn run_repl<G: ModelGateway>(gateway: G, cfg: &Config) -> Result<()> {
    let session = ChatSession::new(gateway, cfg);
    session
        .run(io::stdin().lock(), io::stdout(), io::stderr())
        .await
}
