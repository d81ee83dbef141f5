// Remote installation wizard
//
// Drives the vendor's browser-based installer for one site, page by page:
// system check → license → applications → server details → admin → install → complete.
//
// IMPORTANT:
// - Nothing is retried. A failed submission may already have changed the remote site.
// - Never log secrets (license keys, database or admin passwords).

pub mod drivers;
pub mod poll;
pub mod progress;
pub mod registry;
pub mod steps;

use crate::database::provisioning::DatabaseProvision;
use crate::error::{InstallError, Result};
use crate::models::credentials::{AdminCredentialSource, DatabaseCredentials};
use crate::models::page::WizardPage;
use crate::models::state::{InstallSession, WizardState};
use crate::remote::session::Browser;
use log::{info, warn};
use poll::PollLimits;
use progress::ProgressReporter;
use registry::DriverRegistry;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_LICENSE_SUFFIX: &str = "-TESTINSTALL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WizardOptions {
    /// Appended to the license key; `None` submits the key unchanged.
    pub license_suffix: Option<String>,
    pub poll: PollLimits,
}

impl Default for WizardOptions {
    fn default() -> Self {
        Self {
            license_suffix: Some(DEFAULT_LICENSE_SUFFIX.to_string()),
            poll: PollLimits::default(),
        }
    }
}

/// What the finished wizard reported, plus the database it was installed into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallSummary {
    pub heading: String,
    pub text: Option<String>,
    pub suite_url: Option<String>,
    pub database: Option<DatabaseCredentials>,
}

/// Everything one wizard run needs. Collaborators are borrowed so callers (and tests) keep
/// ownership of their session, provisioner and progress output.
pub struct WizardContext<'a> {
    pub browser: &'a mut dyn Browser,
    pub provisioner: &'a dyn DatabaseProvision,
    pub credentials: &'a dyn AdminCredentialSource,
    pub progress: &'a mut dyn ProgressReporter,
    pub session: InstallSession,
    pub options: &'a WizardOptions,
    pub cancel: CancellationToken,
}

impl<'a> WizardContext<'a> {
    /// Move to `state`, failing with `Cancelled` if cancellation was requested.
    pub fn transition(&mut self, state: WizardState) -> Result<()> {
        if self.cancel.is_cancelled() {
            warn!(
                "[PHASE: wizard] [STEP: {}] Installation cancelled (correlation_id={})",
                state, self.session.correlation_id
            );
            return Err(InstallError::Cancelled(state));
        }
        info!(
            "[PHASE: wizard] [STEP: {}] Entering step (from {}, correlation_id={})",
            state, self.session.state, self.session.correlation_id
        );
        self.session.state = state;
        Ok(())
    }

    /// Record the title of `page`. A page that repeats the previous title means the wizard
    /// rejected the last submission and re-rendered itself.
    pub fn observe(&mut self, page: &WizardPage) -> Result<()> {
        self.session.observe_title(page).map_err(|stalled| {
            InstallError::rejected(format!(
                "the installer returned to \"{}\" instead of advancing from the {} step",
                stalled.title, self.session.state
            ))
        })
    }
}

/// Run the wizard for `ctx.session.site`, using the driver registered for its version.
pub async fn run_wizard(registry: &DriverRegistry, mut ctx: WizardContext<'_>) -> Result<InstallSummary> {
    let driver = match ctx.session.site.parsed_version() {
        Some(version) => registry.resolve(&version)?(),
        None => {
            warn!(
                "[PHASE: wizard] [STEP: resolve] Site version '{}' is not a version number; using the latest driver",
                ctx.session.site.version
            );
            registry.latest(&ctx.session.site.version)?()
        }
    };
    info!(
        "[PHASE: wizard] [STEP: resolve] Installing {} ({}) with the {} driver (correlation_id={})",
        ctx.session.site.name(),
        ctx.session.site.version,
        driver.name(),
        ctx.session.correlation_id
    );

    ctx.transition(WizardState::SystemCheck)?;
    let page = driver.start(&mut ctx).await?;
    let page = driver.system_check(&mut ctx, page).await?;

    ctx.transition(WizardState::License)?;
    let page = driver.license(&mut ctx, page).await?;

    ctx.transition(WizardState::Applications)?;
    let page = driver.applications(&mut ctx, page).await?;

    ctx.transition(WizardState::ServerDetails)?;
    let page = driver.server_details(&mut ctx, page).await?;

    ctx.transition(WizardState::Admin)?;
    let page = driver.admin(&mut ctx, page).await?;

    ctx.transition(WizardState::Install)?;
    let completion_url = driver.install(&mut ctx, page).await?;

    ctx.transition(WizardState::Complete)?;
    let summary = driver.complete(&mut ctx, &completion_url).await?;
    info!(
        "[PHASE: wizard] [STEP: complete] {} (correlation_id={})",
        summary.heading, ctx.session.correlation_id
    );
    Ok(summary)
}
