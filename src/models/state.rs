// Installation session state (in-memory)
//
// NOTE: This is NOT persisted. If the process dies mid-wizard the remote site may be left
// partially installed and has to be reset by hand; nothing here tries to resume.

use crate::models::credentials::DatabaseCredentials;
use crate::models::page::WizardPage;
use crate::models::site::Site;
use std::fmt;
use uuid::Uuid;

/// The remote wizard's pages, in the order they are driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardState {
    SystemCheck,
    License,
    Applications,
    ServerDetails,
    Admin,
    Install,
    Complete,
}

impl WizardState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WizardState::SystemCheck => "system_check",
            WizardState::License => "license",
            WizardState::Applications => "applications",
            WizardState::ServerDetails => "server_details",
            WizardState::Admin => "admin",
            WizardState::Install => "install",
            WizardState::Complete => "complete",
        }
    }
}

impl fmt::Display for WizardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of comparing a freshly loaded page title against the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stalled {
    pub title: String,
}

#[derive(Debug)]
pub struct InstallSession {
    pub correlation_id: String,
    pub state: WizardState,
    pub site: Site,
    pub database: Option<DatabaseCredentials>,
    pub poll_token: Option<String>,
    previous_title: Option<String>,
}

impl InstallSession {
    pub fn new(site: Site) -> Self {
        Self {
            correlation_id: Uuid::new_v4().simple().to_string(),
            state: WizardState::SystemCheck,
            site,
            database: None,
            poll_token: None,
            previous_title: None,
        }
    }

    pub fn previous_title(&self) -> Option<&str> {
        self.previous_title.as_deref()
    }

    /// Record the title of a newly loaded page.
    ///
    /// Returns `Err(Stalled)` when it equals the previous page's title: the wizard re-rendered
    /// the same page instead of advancing. The stored title is left untouched in that case.
    pub fn observe_title(&mut self, page: &WizardPage) -> Result<(), Stalled> {
        log::info!(
            "[PHASE: wizard] [STEP: {}] Installation page loaded: {} (correlation_id={})",
            self.state,
            page.title,
            self.correlation_id
        );
        if self.previous_title.as_deref() == Some(page.title.as_str()) {
            return Err(Stalled {
                title: page.title.clone(),
            });
        }
        self.previous_title = Some(page.title.clone());
        Ok(())
    }

    pub fn record_database(&mut self, credentials: DatabaseCredentials) {
        self.site.database = Some(credentials.clone());
        self.database = Some(credentials);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::site::Domain;
    use std::path::PathBuf;

    fn page(title: &str) -> WizardPage {
        WizardPage::titled("http://example.com/admin/install", title)
    }

    fn session() -> InstallSession {
        let site = Site::new(
            "My Site",
            Domain::new("example.com"),
            PathBuf::from("/srv/example"),
            "1234-5678",
            "4.1.5",
        );
        InstallSession::new(site)
    }

    #[test]
    fn distinct_titles_advance() {
        let mut s = session();
        assert!(s.observe_title(&page("System Check")).is_ok());
        assert!(s.observe_title(&page("License")).is_ok());
        assert_eq!(s.previous_title(), Some("License"));
    }

    #[test]
    fn repeated_title_is_a_stall() {
        let mut s = session();
        s.observe_title(&page("License")).unwrap();
        let stall = s.observe_title(&page("License")).unwrap_err();
        assert_eq!(stall.title, "License");
    }

    #[test]
    fn recorded_database_lands_on_the_site_too() {
        let mut s = session();
        s.record_database(DatabaseCredentials {
            host: "localhost".to_string(),
            name: "ipsv_my_site".to_string(),
            user: "ipsv_0123456789a".to_string(),
            password: "pw".to_string(),
        });
        assert_eq!(s.site.database.as_ref().unwrap().name, "ipsv_my_site");
        assert!(s.database.is_some());
    }
}
