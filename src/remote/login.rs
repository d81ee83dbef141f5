// Vendor client-area login
//
// A successful login is recognised by the pass-hash cookie the client area sets; the login
// page itself renders the same way for good and bad credentials.

use crate::error::{InstallError, Result};
use crate::models::page::FormValues;
use crate::remote::session::{Browser, HttpSession};
use crate::utils::logging::mask_sensitive;
use log::{debug, info};

pub const LOGIN_URL: &str =
    "https://www.invisionpower.com/clients/index.php?app=core&module=global&section=login";
pub const USERNAME_FIELD: &str = "ips_username";
pub const PASSWORD_FIELD: &str = "ips_password";
pub const REMEMBER_FIELD: &str = "rememberMe";
pub const LOGIN_COOKIE: &str = "ips_pass_hash";

/// Cookie access a login needs on top of `Browser`.
pub trait SessionCookies {
    fn cookie(&self, url: &str, name: &str) -> Result<Option<String>>;
    fn persist(&self) -> Result<()>;
}

impl SessionCookies for HttpSession {
    fn cookie(&self, url: &str, name: &str) -> Result<Option<String>> {
        HttpSession::cookie(self, url, name)
    }

    fn persist(&self) -> Result<()> {
        HttpSession::persist(self)
    }
}

/// True when the session already carries a client-area login (loaded from the session file).
pub fn has_saved_login(session: &impl SessionCookies) -> Result<bool> {
    Ok(session.cookie(LOGIN_URL, LOGIN_COOKIE)?.is_some())
}

pub struct Login {
    username: String,
    password: String,
    remember: bool,
}

impl Login {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            remember: true,
        }
    }

    /// Whether the session cookies are written to the session file after a good login.
    pub fn remember(mut self, remember: bool) -> Self {
        self.remember = remember;
        self
    }

    pub async fn process<S>(&self, session: &mut S) -> Result<()>
    where
        S: Browser + SessionCookies,
    {
        debug!("[PHASE: login] [STEP: open] Processing login request");
        let page = session.open(LOGIN_URL).await?;
        info!("[PHASE: login] [STEP: open] Login page loaded: {}", page.title);

        debug!(
            "[PHASE: login] [STEP: submit] Username: {}, password: {}, remember: {}",
            self.username,
            mask_sensitive(&self.password),
            self.remember
        );
        let mut values = FormValues::new()
            .text(USERNAME_FIELD, self.username.as_str())
            .text(PASSWORD_FIELD, self.password.as_str());
        if self.remember {
            values = values.check(REMEMBER_FIELD);
        }
        session.submit(0, &values).await?;

        if session.cookie(LOGIN_URL, LOGIN_COOKIE)?.is_none() {
            return Err(InstallError::Authentication(
                "no login cookie returned, this probably means an invalid login was provided"
                    .to_string(),
            ));
        }
        info!("[PHASE: login] [STEP: submit] Login request successful");

        if self.remember {
            session.persist()?;
        }
        Ok(())
    }
}
