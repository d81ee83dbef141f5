// Wizard steps shared by every driver
//
// Each step receives the page the previous step landed on, checks that the wizard actually
// advanced (title changed), then fills and submits that page. Form and field names are the
// vendor's.

use crate::error::{InstallError, Result};
use crate::installation::poll::{self, PollOutcome};
use crate::installation::{InstallSummary, WizardContext};
use crate::models::page::{FormValues, WizardPage};
use crate::utils::logging::mask_sensitive;
use log::{error, info};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

pub const LICENSE_FIELD: &str = "lkey";
pub const EULA_FIELD: &str = "eula_checkbox";
/// List item wrapping the license field; its warning explains a rejected key.
pub const LICENSE_CONTAINER: &str = "license_lkey";

pub const SQL_HOST_FIELD: &str = "sql_host";
pub const SQL_USER_FIELD: &str = "sql_user";
pub const SQL_PASS_FIELD: &str = "sql_pass";
pub const SQL_DATABASE_FIELD: &str = "sql_database";

pub const ADMIN_USER_FIELD: &str = "admin_user";
pub const ADMIN_PASS_FIELD: &str = "admin_pass1";
pub const ADMIN_PASS_CONFIRM_FIELD: &str = "admin_pass2";
pub const ADMIN_EMAIL_FIELD: &str = "admin_email";

fn continue_link() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("Continue").unwrap())
}

fn start_installation_link() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("Start Installation").unwrap())
}

pub fn license_value(key: &str, suffix: Option<&str>) -> String {
    format!("{}{}", key, suffix.unwrap_or_default())
}

pub async fn start(ctx: &mut WizardContext<'_>) -> Result<WizardPage> {
    let url = ctx.session.site.wizard_url();
    info!("[PHASE: wizard] [STEP: start] Opening installer at {}", url);
    ctx.browser.open(&url).await
}

pub async fn system_check(ctx: &mut WizardContext<'_>, page: WizardPage) -> Result<WizardPage> {
    ctx.observe(&page)?;
    if !page.failing_checks.is_empty() {
        for check in &page.failing_checks {
            error!("[PHASE: wizard] [STEP: system_check] Failed check: {}", check);
        }
        return Err(InstallError::Installation(page.failing_checks));
    }
    ctx.progress.step("System check passed");
    ctx.browser.follow_link(continue_link()).await
}

pub async fn license(ctx: &mut WizardContext<'_>, page: WizardPage) -> Result<WizardPage> {
    ctx.observe(&page)?;
    let key = license_value(
        &ctx.session.site.license_key,
        ctx.options.license_suffix.as_deref(),
    );
    info!(
        "[PHASE: wizard] [STEP: license] Submitting license key {}",
        mask_sensitive(&key)
    );
    let values = FormValues::new().text(LICENSE_FIELD, key).check(EULA_FIELD);
    ctx.browser.submit(0, &values).await
}

pub async fn applications(ctx: &mut WizardContext<'_>, page: WizardPage) -> Result<WizardPage> {
    if let Err(stalled) = ctx.observe(&page) {
        // Still on the license page: the key was not accepted.
        let Some(warning) = page.field_warnings.get(LICENSE_CONTAINER) else {
            return Err(stalled);
        };
        error!(
            "[PHASE: wizard] [STEP: applications] License key rejected: {}",
            warning
        );
        return Err(InstallError::rejected(warning.clone()));
    }
    ctx.progress.step("License accepted");
    ctx.browser.submit(0, &FormValues::new()).await
}

pub async fn server_details(ctx: &mut WizardContext<'_>, page: WizardPage) -> Result<WizardPage> {
    ctx.observe(&page)?;
    page.form(0)?;

    let credentials = ctx.provisioner.provision(&ctx.session.site).await?;
    let values = FormValues::new()
        .text(SQL_HOST_FIELD, credentials.host.as_str())
        .text(SQL_USER_FIELD, credentials.user.as_str())
        .text(SQL_PASS_FIELD, credentials.password.as_str())
        .text(SQL_DATABASE_FIELD, credentials.name.as_str());
    info!(
        "[PHASE: wizard] [STEP: server_details] Submitting database {} for user {}",
        credentials.name, credentials.user
    );
    ctx.session.record_database(credentials);
    ctx.progress.step("Database created");
    ctx.browser.submit(0, &values).await
}

pub async fn admin(ctx: &mut WizardContext<'_>, page: WizardPage) -> Result<WizardPage> {
    ctx.observe(&page)?;
    let admin = ctx.credentials.admin_credentials()?;
    let values = FormValues::new()
        .text(ADMIN_USER_FIELD, admin.display_name.as_str())
        .text(ADMIN_PASS_FIELD, admin.password.as_str())
        .text(ADMIN_PASS_CONFIRM_FIELD, admin.password.as_str())
        .text(ADMIN_EMAIL_FIELD, admin.email.as_str());
    info!(
        "[PHASE: wizard] [STEP: admin] Submitting admin account {}",
        admin.display_name
    );
    ctx.browser.submit(0, &values).await
}

/// Start the installation and poll it to completion. Returns the completion URL.
pub async fn install<F>(
    ctx: &mut WizardContext<'_>,
    page: WizardPage,
    is_complete: F,
) -> Result<String>
where
    F: Fn(&str, &Value) -> Option<String> + Send + Sync,
{
    ctx.observe(&page)?;
    let page = ctx.browser.follow_link(start_installation_link()).await?;
    let poll_url = page.multiple_redirect_url.clone().ok_or_else(|| {
        InstallError::page_structure(&page.title, "no installation progress endpoint on the page")
    })?;
    info!("[PHASE: wizard] [STEP: install] Polling installation progress at {}", poll_url);

    let PollOutcome {
        completion_url,
        last_token,
        ..
    } = poll::poll_until_complete(
        ctx.browser,
        ctx.progress,
        &ctx.cancel,
        &ctx.options.poll,
        &poll_url,
        is_complete,
    )
    .await?;
    ctx.session.poll_token = last_token;
    Ok(completion_url)
}

pub async fn complete(ctx: &mut WizardContext<'_>, completion_url: &str) -> Result<InstallSummary> {
    let page = ctx.browser.open(completion_url).await?;
    let welcome = page.welcome.clone().ok_or_else(|| {
        InstallError::page_structure(&page.title, "no welcome message on the completion page")
    })?;
    ctx.progress.step(&welcome.heading);
    Ok(InstallSummary {
        heading: welcome.heading,
        text: welcome.text,
        suite_url: welcome.action_url,
        database: ctx.session.database.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn license_suffix_is_optional() {
        assert_eq!(license_value("ABCD-1234", Some("-TESTINSTALL")), "ABCD-1234-TESTINSTALL");
        assert_eq!(license_value("ABCD-1234", None), "ABCD-1234");
    }
}
