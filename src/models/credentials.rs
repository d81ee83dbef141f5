// Credentials threaded through the wizard
//
// Admin credentials come from saved configuration first; any field that is not saved is
// asked for through a prompt collaborator. Without a prompt a missing field is an error.

use crate::error::{InstallError, Result};
use crate::utils::logging::mask_sensitive;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseCredentials {
    pub host: String,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for DatabaseCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseCredentials")
            .field("host", &self.host)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AdminCredentials {
    pub display_name: String,
    pub password: String,
    pub email: String,
}

impl fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("display_name", &self.display_name)
            .field("password", &"***")
            .field("email", &mask_sensitive(&self.email))
            .finish()
    }
}

/// Admin values saved in configuration (`[admin]` table). Empty strings count as unset.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedAdminCredentials {
    pub user: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
}

impl fmt::Debug for SavedAdminCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SavedAdminCredentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("email", &self.email)
            .finish()
    }
}

/// Interactive collaborator used when a value is not saved.
pub trait CredentialPrompt: Send + Sync {
    fn text(&self, label: &str) -> std::io::Result<String>;
    fn password(&self, label: &str, confirmation: &str) -> std::io::Result<String>;
}

pub trait AdminCredentialSource: Send + Sync {
    fn admin_credentials(&self) -> Result<AdminCredentials>;
}

pub struct ConfiguredAdmin {
    saved: SavedAdminCredentials,
    prompt: Option<Box<dyn CredentialPrompt>>,
}

impl ConfiguredAdmin {
    pub fn new(saved: SavedAdminCredentials) -> Self {
        Self {
            saved,
            prompt: None,
        }
    }

    pub fn with_prompt(mut self, prompt: Box<dyn CredentialPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    fn saved_or_prompt(
        &self,
        saved: Option<&String>,
        field: &'static str,
        ask: impl FnOnce(&dyn CredentialPrompt) -> std::io::Result<String>,
        prompted: &mut Vec<&'static str>,
    ) -> Result<String> {
        if let Some(value) = saved.filter(|v| !v.trim().is_empty()) {
            return Ok(value.clone());
        }
        let prompt = self
            .prompt
            .as_deref()
            .ok_or(InstallError::MissingAdminCredential(field))?;
        prompted.push(field);
        Ok(ask(prompt)?)
    }
}

impl AdminCredentialSource for ConfiguredAdmin {
    fn admin_credentials(&self) -> Result<AdminCredentials> {
        let mut prompted = Vec::new();

        let display_name = self.saved_or_prompt(
            self.saved.user.as_ref(),
            "display name",
            |p| p.text("Admin display name"),
            &mut prompted,
        )?;
        let password = self.saved_or_prompt(
            self.saved.password.as_ref(),
            "password",
            |p| p.password("Admin password", "Confirm admin password"),
            &mut prompted,
        )?;
        let email = self.saved_or_prompt(
            self.saved.email.as_ref(),
            "email",
            |p| p.text("Admin email"),
            &mut prompted,
        )?;

        if !prompted.is_empty() {
            log::info!(
                "[PHASE: wizard] [STEP: admin] Prompted for admin {}; save them under [admin] to skip prompting",
                prompted.join(", ")
            );
        }

        Ok(AdminCredentials {
            display_name,
            password,
            email,
        })
    }
}

/// Terminal prompts backed by dialoguer.
pub struct DialoguerPrompt;

fn prompt_io_error(e: dialoguer::Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
}

impl CredentialPrompt for DialoguerPrompt {
    fn text(&self, label: &str) -> std::io::Result<String> {
        dialoguer::Input::<String>::new()
            .with_prompt(label)
            .interact_text()
            .map_err(prompt_io_error)
    }

    fn password(&self, label: &str, confirmation: &str) -> std::io::Result<String> {
        dialoguer::Password::new()
            .with_prompt(label)
            .with_confirmation(confirmation, "Passwords do not match")
            .interact()
            .map_err(prompt_io_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedPrompt {
        asked: Mutex<Vec<String>>,
    }

    impl ScriptedPrompt {
        fn new() -> Self {
            Self {
                asked: Mutex::new(Vec::new()),
            }
        }
    }

    impl CredentialPrompt for ScriptedPrompt {
        fn text(&self, label: &str) -> std::io::Result<String> {
            self.asked.lock().unwrap().push(label.to_string());
            Ok(format!("typed {}", label))
        }

        fn password(&self, label: &str, _confirmation: &str) -> std::io::Result<String> {
            self.asked.lock().unwrap().push(label.to_string());
            Ok("typed-password".to_string())
        }
    }

    fn full_saved() -> SavedAdminCredentials {
        SavedAdminCredentials {
            user: Some("admin".to_string()),
            password: Some("hunter2hunter2".to_string()),
            email: Some("admin@example.com".to_string()),
        }
    }

    #[test]
    fn saved_credentials_need_no_prompt() {
        let source = ConfiguredAdmin::new(full_saved());
        let creds = source.admin_credentials().unwrap();
        assert_eq!(creds.display_name, "admin");
        assert_eq!(creds.password, "hunter2hunter2");
        assert_eq!(creds.email, "admin@example.com");
    }

    #[test]
    fn missing_fields_are_prompted_individually() {
        let saved = SavedAdminCredentials {
            user: Some("admin".to_string()),
            password: None,
            email: Some("   ".to_string()),
        };
        let source = ConfiguredAdmin::new(saved).with_prompt(Box::new(ScriptedPrompt::new()));
        let creds = source.admin_credentials().unwrap();
        assert_eq!(creds.display_name, "admin");
        assert_eq!(creds.password, "typed-password");
        assert_eq!(creds.email, "typed Admin email");
    }

    #[test]
    fn missing_field_without_prompt_is_an_error() {
        let saved = SavedAdminCredentials {
            email: None,
            ..full_saved()
        };
        let err = ConfiguredAdmin::new(saved).admin_credentials().unwrap_err();
        assert!(matches!(err, InstallError::MissingAdminCredential("email")));
    }

    #[test]
    fn debug_output_never_shows_passwords() {
        let creds = DatabaseCredentials {
            host: "localhost".to_string(),
            name: "ipsv_site".to_string(),
            user: "ipsv_abc".to_string(),
            password: "TopSecretPassword1".to_string(),
        };
        assert!(!format!("{:?}", creds).contains("TopSecretPassword1"));
        assert!(!format!("{:?}", full_saved()).contains("hunter2hunter2"));
    }
}
