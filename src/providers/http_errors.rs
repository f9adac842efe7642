use anyhow::anyhow;
use std::error::Error as StdError;
use std::io::ErrorKind;

fn error_chain_matches(err: &(dyn StdError + 'static), kind: ErrorKind, needle: &str) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(source) = current {
        if source
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io_err| io_err.kind() == kind)
        {
            return true;
        }
        if source.to_string().to_ascii_lowercase().contains(needle) {
            return true;
        }
        current = source.source();
    }
    false
}

fn is_timeout(err: &reqwest::Error) -> bool {
    err.is_timeout() || error_chain_matches(err, ErrorKind::TimedOut, "timed out")
}

fn is_connection_refused(err: &reqwest::Error) -> bool {
    error_chain_matches(err, ErrorKind::ConnectionRefused, "connection refused")
}

pub(crate) fn model_api_request_error(
    err: reqwest::Error,
    api_url: &str,
    timeout_secs: u64,
) -> anyhow::Error {
    if is_timeout(&err) {
        return anyhow!(
            "Model request timed out after {}s while calling '{}'. \
             Increase REQUEST_TIMEOUT_SECS or retry later.",
            timeout_secs,
            api_url
        );
    }

    match (err.is_connect(), is_connection_refused(&err)) {
        (true, true) => anyhow!(
            "Connection refused by model API at '{}'. \
             Check that OPENAI_API_URL points at a running endpoint.",
            api_url
        ),
        (true, false) => anyhow!(
            "Failed to connect to model API at '{}'. \
             Check OPENAI_API_URL and network connectivity.",
            api_url
        ),
        _ => anyhow!("Failed to call model API at '{}': {}", api_url, err),
    }
}
