// Error taxonomy for the wizard driver
//
// Every variant is fatal to the current run. Nothing in this crate retries: by the time an
// error surfaces the remote wizard (or the database server) may already have applied side
// effects, so errors carry enough context to be shown verbatim to the operator.

use crate::models::state::WizardState;
use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = InstallError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum InstallError {
    /// Non-success HTTP status on any request.
    #[error("{method} {url} returned HTTP {status}")]
    RemoteRequest {
        method: &'static str,
        url: String,
        status: u16,
    },

    /// The request never produced a response (DNS, TLS, connection reset, body decode).
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Expected markup is missing; usually a wizard revision no driver covers.
    #[error("unexpected page structure on \"{title}\": {detail}")]
    PageStructure { title: String, detail: String },

    /// The remote wizard rejected the run (failing system checks, license, stalled page).
    #[error("installation rejected: {}", .0.join("; "))]
    Installation(Vec<String>),

    #[error("no installation wizard driver is registered for IPS version {0}")]
    UnsupportedVersion(String),

    #[error(
        "installation progress did not complete after {iterations} poll requests ({elapsed:?}); \
         the remote installation is in an indeterminate state and needs manual inspection"
    )]
    PollTimeout { iterations: u64, elapsed: Duration },

    #[error("database provisioning failed: {0}")]
    DatabaseProvisioning(String),

    #[error("installation cancelled during the {0} step")]
    Cancelled(WizardState),

    #[error("admin {0} is not configured and no interactive prompt is available")]
    MissingAdminCredential(&'static str),

    #[error("login failed: {0}")]
    Authentication(String),

    #[error("session store error: {0}")]
    Session(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl InstallError {
    pub fn page_structure(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::PageStructure {
            title: title.into(),
            detail: detail.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Installation(vec![message.into()])
    }

    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            url: url.into(),
            source,
        }
    }

    /// True when the remote wizard may have been left half-installed.
    pub fn leaves_remote_indeterminate(&self) -> bool {
        matches!(
            self,
            Self::PollTimeout { .. } | Self::Cancelled(WizardState::Install)
        )
    }
}
