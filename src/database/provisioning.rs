// Database provisioning for a new site
//
// Creates one MySQL database and one user per site:
// - database: `ipsv_<slug>` (MySQL caps identifiers at 64 characters)
// - user: `ipsv_` + 11 hex characters of SHA-256(domain + slug), 16 characters total so it
//   fits the oldest user-name limit MySQL still ships with
// - password: random alphanumeric, 16-24 characters
//
// Identifiers are backtick-quoted and string literals quote-escaped; MySQL cannot bind
// identifiers or account names as parameters.

use crate::error::{InstallError, Result};
use crate::models::credentials::DatabaseCredentials;
use crate::models::site::Site;
use crate::security::crypto::{generate_password, sha256_hex};
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};

pub const NAME_PREFIX: &str = "ipsv_";
pub const MAX_DATABASE_NAME_LEN: usize = 64;
pub const USER_HASH_LEN: usize = 11;
pub const PASSWORD_MIN_LEN: usize = 16;
pub const PASSWORD_MAX_LEN: usize = 24;

// =============================================================================
// Naming
// =============================================================================

pub fn database_name(site: &Site) -> String {
    format!("{}{}", NAME_PREFIX, site.slug())
        .chars()
        .take(MAX_DATABASE_NAME_LEN)
        .collect()
}

pub fn database_user(site: &Site) -> String {
    let digest = sha256_hex(format!("{}{}", site.domain.name, site.slug()).as_bytes());
    format!("{}{}", NAME_PREFIX, &digest[..USER_HASH_LEN])
}

// =============================================================================
// MySQL statement generation
// =============================================================================

/// Backtick-quote a MySQL identifier
fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Single-quote a MySQL string literal
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

fn account(user: &str, host: &str) -> String {
    format!("{}@{}", quote_literal(user), quote_literal(host))
}

pub fn drop_database_stmt(db_name: &str) -> String {
    format!("DROP DATABASE IF EXISTS {}", quote_ident(db_name))
}

pub fn create_database_stmt(db_name: &str) -> String {
    format!("CREATE DATABASE {}", quote_ident(db_name))
}

pub fn create_user_stmt(user: &str, host: &str, password: &str) -> String {
    format!(
        "CREATE USER IF NOT EXISTS {} IDENTIFIED BY {}",
        account(user, host),
        quote_literal(password)
    )
}

/// Resets the password of a user left over from an earlier install of the same site.
pub fn alter_user_stmt(user: &str, host: &str, password: &str) -> String {
    format!(
        "ALTER USER {} IDENTIFIED BY {}",
        account(user, host),
        quote_literal(password)
    )
}

pub fn grant_stmt(db_name: &str, user: &str, host: &str) -> String {
    format!(
        "GRANT ALL PRIVILEGES ON {}.* TO {}",
        quote_ident(db_name),
        account(user, host)
    )
}

// =============================================================================
// Provisioner
// =============================================================================

/// Statement execution seam. Production uses `MySqlExecutor`; tests record statements.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn database_exists(&self, db_name: &str) -> Result<bool>;
    async fn execute(&self, statement: &str) -> Result<()>;
}

/// What the wizard needs from database provisioning.
#[async_trait]
pub trait DatabaseProvision: Send + Sync {
    async fn provision(&self, site: &Site) -> Result<DatabaseCredentials>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningOptions {
    /// Host the installed site uses to reach MySQL (goes into the wizard form).
    pub site_host: String,
    /// Host part of the MySQL account.
    pub grant_host: String,
    /// Drop a database that already exists instead of failing.
    pub recreate_existing: bool,
}

impl Default for ProvisioningOptions {
    fn default() -> Self {
        Self {
            site_host: "localhost".to_string(),
            grant_host: "localhost".to_string(),
            recreate_existing: false,
        }
    }
}

pub struct DatabaseProvisioner<E: SqlExecutor> {
    executor: E,
    options: ProvisioningOptions,
}

impl<E: SqlExecutor> DatabaseProvisioner<E> {
    pub fn new(executor: E, options: ProvisioningOptions) -> Self {
        Self { executor, options }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }
}

#[async_trait]
impl<E: SqlExecutor> DatabaseProvision for DatabaseProvisioner<E> {
    async fn provision(&self, site: &Site) -> Result<DatabaseCredentials> {
        let name = database_name(site);
        let user = database_user(site);
        let password = generate_password(PASSWORD_MIN_LEN, PASSWORD_MAX_LEN)
            .map_err(|e| InstallError::DatabaseProvisioning(e.to_string()))?;
        let host = &self.options.grant_host;

        if self.executor.database_exists(&name).await? {
            if !self.options.recreate_existing {
                return Err(InstallError::DatabaseProvisioning(format!(
                    "database {} already exists; remove it or enable recreate_existing",
                    name
                )));
            }
            warn!(
                "[PHASE: database] [STEP: provision] Dropping existing database {} (recreate_existing is set)",
                name
            );
            self.executor.execute(&drop_database_stmt(&name)).await?;
        }

        info!("[PHASE: database] [STEP: provision] Creating database {}", name);
        self.executor.execute(&create_database_stmt(&name)).await?;

        info!(
            "[PHASE: database] [STEP: provision] Granting {} access to {}@{}",
            name, user, host
        );
        self.executor
            .execute(&create_user_stmt(&user, host, &password))
            .await?;
        self.executor
            .execute(&alter_user_stmt(&user, host, &password))
            .await?;
        self.executor.execute(&grant_stmt(&name, &user, host)).await?;

        Ok(DatabaseCredentials {
            host: self.options.site_host.clone(),
            name,
            user,
            password,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::site::Domain;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Records statements instead of running them.
    struct RecordingExecutor {
        existing: Vec<String>,
        statements: Mutex<Vec<String>>,
    }

    impl RecordingExecutor {
        fn new(existing: &[&str]) -> Self {
            Self {
                existing: existing.iter().map(|s| s.to_string()).collect(),
                statements: Mutex::new(Vec::new()),
            }
        }

        fn statements(&self) -> Vec<String> {
            self.statements.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SqlExecutor for RecordingExecutor {
        async fn database_exists(&self, db_name: &str) -> Result<bool> {
            Ok(self.existing.iter().any(|d| d == db_name))
        }

        async fn execute(&self, statement: &str) -> Result<()> {
            self.statements.lock().unwrap().push(statement.to_string());
            Ok(())
        }
    }

    fn site(name: &str) -> Site {
        Site::new(
            name,
            Domain::new("forum.example.com"),
            PathBuf::from("/srv/forum"),
            "KEY",
            "4.1.5",
        )
    }

    #[test]
    fn names_follow_site_slug() {
        let site = site("My Forum");
        assert_eq!(database_name(&site), "ipsv_my_forum");
        let user = database_user(&site);
        assert_eq!(user.len(), 16);
        assert!(user.starts_with("ipsv_"));
        assert!(user[5..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn database_name_is_capped_at_64() {
        let site = site(&"x".repeat(100));
        assert_eq!(database_name(&site).len(), MAX_DATABASE_NAME_LEN);
    }

    #[test]
    fn user_depends_on_domain_and_slug() {
        let a = site("Forum");
        let mut b = site("Forum");
        b.domain = Domain::new("other.example.com");
        assert_ne!(database_user(&a), database_user(&b));
        assert_eq!(database_user(&a), database_user(&site("Forum")));
    }

    #[test]
    fn statements_quote_identifiers_and_literals() {
        assert_eq!(create_database_stmt("ips`v"), "CREATE DATABASE `ips``v`");
        assert_eq!(
            create_user_stmt("ipsv_a", "localhost", "it's"),
            "CREATE USER IF NOT EXISTS 'ipsv_a'@'localhost' IDENTIFIED BY 'it''s'"
        );
        assert_eq!(
            grant_stmt("ipsv_site", "ipsv_a", "%"),
            "GRANT ALL PRIVILEGES ON `ipsv_site`.* TO 'ipsv_a'@'%'"
        );
        assert_eq!(quote_literal(r"a\b"), r"'a\\b'");
    }

    #[tokio::test]
    async fn provision_creates_database_user_and_grant() {
        let provisioner =
            DatabaseProvisioner::new(RecordingExecutor::new(&[]), ProvisioningOptions::default());
        let creds = provisioner.provision(&site("My Forum")).await.unwrap();

        assert_eq!(creds.host, "localhost");
        assert_eq!(creds.name, "ipsv_my_forum");
        assert!(creds.user.len() <= 16);
        assert!((PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&creds.password.len()));
        assert!(creds.password.chars().all(|c| c.is_ascii_alphanumeric()));

        let statements = provisioner.executor().statements();
        assert_eq!(statements.len(), 4);
        assert_eq!(statements[0], "CREATE DATABASE `ipsv_my_forum`");
        assert!(statements[1].starts_with("CREATE USER IF NOT EXISTS"));
        assert!(statements[2].starts_with("ALTER USER"));
        assert!(statements[3].starts_with("GRANT ALL PRIVILEGES ON `ipsv_my_forum`.*"));
    }

    #[tokio::test]
    async fn successive_provisions_use_different_passwords() {
        let provisioner =
            DatabaseProvisioner::new(RecordingExecutor::new(&[]), ProvisioningOptions::default());
        let first = provisioner.provision(&site("Forum")).await.unwrap();
        let second = provisioner.provision(&site("Forum")).await.unwrap();
        assert_eq!(first.user, second.user);
        assert_ne!(first.password, second.password);
    }

    #[tokio::test]
    async fn existing_database_is_an_error_by_default() {
        let provisioner = DatabaseProvisioner::new(
            RecordingExecutor::new(&["ipsv_forum"]),
            ProvisioningOptions::default(),
        );
        let err = provisioner.provision(&site("Forum")).await.unwrap_err();
        assert!(matches!(err, InstallError::DatabaseProvisioning(_)));
        assert!(provisioner.executor().statements().is_empty());
    }

    #[tokio::test]
    async fn existing_database_is_dropped_when_recreating() {
        let options = ProvisioningOptions {
            recreate_existing: true,
            grant_host: "%".to_string(),
            ..Default::default()
        };
        let provisioner =
            DatabaseProvisioner::new(RecordingExecutor::new(&["ipsv_forum"]), options);
        provisioner.provision(&site("Forum")).await.unwrap();

        let statements = provisioner.executor().statements();
        assert_eq!(statements[0], "DROP DATABASE IF EXISTS `ipsv_forum`");
        assert_eq!(statements[1], "CREATE DATABASE `ipsv_forum`");
        assert!(statements[2].contains("@'%'"));
    }
}
