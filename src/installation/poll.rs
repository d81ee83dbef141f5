// Installation progress long-poll
//
// The "start installation" page hands out a multiple-redirect URL. Each XHR GET against it
// (with the latest token in the `mr` query parameter) advances the remote installer by one
// slice and answers either `[token, stage, percent]` or, once finished, an object naming
// where to go next. Completion detection differs between wizard revisions, so the caller
// supplies it.

use crate::error::{InstallError, Result};
use crate::installation::progress::ProgressReporter;
use crate::models::state::WizardState;
use crate::remote::session::Browser;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

pub const TOKEN_PARAM: &str = "mr";
const DEFAULT_STAGE: &str = "complete";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollLimits {
    pub max_iterations: u64,
    #[serde(with = "duration_secs", rename = "timeout_secs")]
    pub timeout: Duration,
}

impl Default for PollLimits {
    fn default() -> Self {
        Self {
            max_iterations: 5000,
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Token sent with the very first poll request: base64 of `"0"`.
pub fn initial_token() -> String {
    STANDARD.encode("0")
}

/// `url` with its `mr` parameter set to `token`; other parameters keep their order.
pub fn with_token(url: &str, token: &str) -> Result<String> {
    let mut parsed = Url::parse(url).map_err(|e| {
        InstallError::page_structure("(install)", format!("invalid poll URL '{}': {}", url, e))
    })?;
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != TOKEN_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    parsed
        .query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(TOKEN_PARAM, token);
    Ok(parsed.to_string())
}

/// One in-progress answer from the poll endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTick {
    pub token: String,
    pub stage: String,
    /// Rounded and clamped to `0..=100`.
    pub percent: u8,
}

pub fn parse_tick(response: &Value) -> Result<PollTick> {
    let malformed = || {
        InstallError::page_structure(
            "(install)",
            format!("unexpected progress response: {}", response),
        )
    };
    let items = response.as_array().ok_or_else(malformed)?;

    let token = match items.first() {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(malformed()),
    };
    let stage = items
        .get(1)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_STAGE)
        .to_string();
    // Percent may arrive as a float or a numeric string; anything above 100 is displayed as 100.
    let raw = match items.get(2) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    let percent = raw.round().clamp(0.0, 100.0) as u8;

    Ok(PollTick {
        token,
        stage,
        percent,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    /// Where the installer wants the browser to go next.
    pub completion_url: String,
    pub last_token: Option<String>,
    pub requests: u64,
}

/// Poll `poll_url` until `is_complete` yields a completion URL.
///
/// Fails with `PollTimeout` once `limits` are exhausted; each request is raced against the
/// remaining wall-clock budget and against `cancel`. The progress display is finished on
/// success and abandoned on every failure.
pub async fn poll_until_complete<F>(
    browser: &mut dyn Browser,
    progress: &mut dyn ProgressReporter,
    cancel: &CancellationToken,
    limits: &PollLimits,
    poll_url: &str,
    is_complete: F,
) -> Result<PollOutcome>
where
    F: Fn(&str, &Value) -> Option<String> + Send + Sync,
{
    progress.start("Installing");
    let result = poll_loop(browser, progress, cancel, limits, poll_url, is_complete).await;
    match &result {
        Ok(_) => progress.finish(),
        Err(_) => progress.abandon(),
    }
    result
}

async fn poll_loop<F>(
    browser: &mut dyn Browser,
    progress: &mut dyn ProgressReporter,
    cancel: &CancellationToken,
    limits: &PollLimits,
    poll_url: &str,
    is_complete: F,
) -> Result<PollOutcome>
where
    F: Fn(&str, &Value) -> Option<String> + Send + Sync,
{
    // tokio's clock, so the budget and the per-request timeout agree under a paused runtime.
    let started = Instant::now();
    let mut token = initial_token();
    let mut last_token = None;
    let mut requests: u64 = 0;

    let timed_out = |requests: u64| InstallError::PollTimeout {
        iterations: requests,
        elapsed: started.elapsed(),
    };

    loop {
        if cancel.is_cancelled() {
            return Err(InstallError::Cancelled(WizardState::Install));
        }
        if requests >= limits.max_iterations {
            return Err(timed_out(requests));
        }
        let remaining = limits
            .timeout
            .checked_sub(started.elapsed())
            .filter(|d| !d.is_zero())
            .ok_or_else(|| timed_out(requests))?;

        let url = with_token(poll_url, &token)?;
        requests += 1;
        debug!("[PHASE: install] [STEP: poll] Request #{}: {}", requests, url);

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(InstallError::Cancelled(WizardState::Install));
            }
            r = tokio::time::timeout(remaining, browser.xhr_json(&url)) => match r {
                Ok(response) => response?,
                Err(_) => return Err(timed_out(requests)),
            },
        };

        if let Some(completion_url) = is_complete(&url, &response) {
            info!(
                "[PHASE: install] [STEP: poll] Installation finished after {} poll requests ({:?})",
                requests,
                started.elapsed()
            );
            return Ok(PollOutcome {
                completion_url,
                last_token,
                requests,
            });
        }

        let tick = parse_tick(&response)?;
        progress.update(tick.percent, &tick.stage);
        token = tick.token.clone();
        last_token = Some(tick.token);
    }
}

/// Completion as announced by current wizards: `{"redirect": "<url>"}`.
pub fn redirect_target(response: &Value) -> Option<String> {
    response
        .get("redirect")
        .and_then(Value::as_str)
        .map(str::to_string)
}
