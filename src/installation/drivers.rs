// Wizard drivers
//
// One method per wizard state. The default bodies drive the current wizard through the shared
// steps; a driver for an older revision overrides only the states that differ.

use crate::error::Result;
use crate::installation::poll;
use crate::installation::steps;
use crate::installation::{InstallSummary, WizardContext};
use crate::models::page::WizardPage;
use async_trait::async_trait;
use log::{debug, info};
use serde_json::Value;

/// Poll-array entry older wizards use to say the installation has finished.
pub const DONE_MARKER: &str = "__done";

#[async_trait]
pub trait WizardDriver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Load the first wizard page.
    async fn start(&self, ctx: &mut WizardContext<'_>) -> Result<WizardPage> {
        steps::start(ctx).await
    }

    async fn system_check(&self, ctx: &mut WizardContext<'_>, page: WizardPage) -> Result<WizardPage> {
        steps::system_check(ctx, page).await
    }

    async fn license(&self, ctx: &mut WizardContext<'_>, page: WizardPage) -> Result<WizardPage> {
        steps::license(ctx, page).await
    }

    async fn applications(&self, ctx: &mut WizardContext<'_>, page: WizardPage) -> Result<WizardPage> {
        steps::applications(ctx, page).await
    }

    async fn server_details(&self, ctx: &mut WizardContext<'_>, page: WizardPage) -> Result<WizardPage> {
        steps::server_details(ctx, page).await
    }

    async fn admin(&self, ctx: &mut WizardContext<'_>, page: WizardPage) -> Result<WizardPage> {
        steps::admin(ctx, page).await
    }

    /// Start the installation and poll it; returns the completion URL.
    async fn install(&self, ctx: &mut WizardContext<'_>, page: WizardPage) -> Result<String> {
        steps::install(ctx, page, |url: &str, response: &Value| {
            self.check_complete(url, response)
        })
        .await
    }

    /// Completion URL if `response` (to a request for `poll_url`) says the installation is done.
    fn check_complete(&self, _poll_url: &str, response: &Value) -> Option<String> {
        poll::redirect_target(response)
    }

    async fn complete(&self, ctx: &mut WizardContext<'_>, completion_url: &str) -> Result<InstallSummary> {
        steps::complete(ctx, completion_url).await
    }
}

/// The current wizard.
pub struct LatestDriver;

#[async_trait]
impl WizardDriver for LatestDriver {
    fn name(&self) -> &'static str {
        "latest"
    }
}

/// 4.0 wizards finish by putting `__done` in the poll array instead of answering with a
/// redirect. The completion page is the poll URL with the final token quoted.
pub struct LegacyDoneMarkerDriver;

#[async_trait]
impl WizardDriver for LegacyDoneMarkerDriver {
    fn name(&self) -> &'static str {
        "legacy-done-marker"
    }

    fn check_complete(&self, poll_url: &str, response: &Value) -> Option<String> {
        if let Some(target) = poll::redirect_target(response) {
            return Some(target);
        }
        let items = response.as_array()?;
        if !items.iter().any(|item| item.as_str() == Some(DONE_MARKER)) {
            return None;
        }
        let token = match items.first()? {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let url = poll::with_token(poll_url, &format!("\"{}\"", token)).ok()?;
        debug!("[PHASE: install] [STEP: poll] Completion marker seen, continuing at {}", url);
        Some(url)
    }
}

/// From 4.1.3.2 the first visit to the installer shows a landing page; the system check
/// only appears once the installer URL is opened again.
pub struct LandingPageDriver;

#[async_trait]
impl WizardDriver for LandingPageDriver {
    fn name(&self) -> &'static str {
        "landing-page"
    }

    async fn start(&self, ctx: &mut WizardContext<'_>) -> Result<WizardPage> {
        let landing = steps::start(ctx).await?;
        ctx.observe(&landing)?;
        info!(
            "[PHASE: wizard] [STEP: start] Landing page \"{}\" shown, reopening the installer",
            landing.title
        );
        let url = ctx.session.site.wizard_url();
        ctx.browser.open(&url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const POLL_URL: &str = "http://forum.example.com/admin/install/index.php?controller=install&mr=MA%3D%3D";

    #[test]
    fn latest_completes_only_on_redirect() {
        let driver = LatestDriver;
        assert_eq!(
            driver.check_complete(POLL_URL, &json!({"redirect": "http://forum.example.com/admin/install/?controller=done"})),
            Some("http://forum.example.com/admin/install/?controller=done".to_string())
        );
        assert_eq!(driver.check_complete(POLL_URL, &json!(["tok", "__done", 100])), None);
        assert_eq!(driver.check_complete(POLL_URL, &json!(["tok", "Step", 50])), None);
    }

    #[test]
    fn legacy_done_marker_builds_completion_url() {
        let driver = LegacyDoneMarkerDriver;
        let url = driver
            .check_complete(POLL_URL, &json!(["finaltoken", "__done"]))
            .unwrap();
        assert!(url.starts_with("http://forum.example.com/admin/install/index.php?controller=install&"));
        assert!(url.ends_with("mr=%22finaltoken%22"));
        assert_eq!(url.matches("mr=").count(), 1);
    }

    #[test]
    fn legacy_still_accepts_redirects() {
        let driver = LegacyDoneMarkerDriver;
        assert_eq!(
            driver.check_complete(POLL_URL, &json!({"redirect": "http://x/done"})),
            Some("http://x/done".to_string())
        );
        assert_eq!(driver.check_complete(POLL_URL, &json!(["tok", "Step", 50])), None);
    }
}
