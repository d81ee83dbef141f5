// Runtime configuration
//
// Layered with the `config` crate: built-in defaults, then an optional TOML file, then
// `IPSV__SECTION__KEY` environment variables. Nothing here writes configuration back.

use crate::database::connection::DEFAULT_CONNECT_TIMEOUT;
use crate::database::provisioning::ProvisioningOptions;
use crate::installation::poll::PollLimits;
use crate::installation::progress::DEFAULT_MAX_WIDTH;
use crate::installation::{WizardOptions, DEFAULT_LICENSE_SUFFIX};
use crate::models::credentials::SavedAdminCredentials;
use crate::models::site::{Domain, Site};
use crate::remote::session::HttpSettings;
use crate::utils::path_resolver;
use crate::utils::validation::parse_domain;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "IPSV";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathSettings,
    pub http: HttpSettings,
    pub database: DatabaseSettings,
    pub admin: SavedAdminCredentials,
    pub license: LicenseSettings,
    pub client_area: ClientAreaSettings,
    pub poll: PollLimits,
    pub progress: ProgressSettings,
}

/// Filesystem locations; unset entries resolve under the platform data directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub data_dir: Option<PathBuf>,
    pub session_file: Option<PathBuf>,
    pub versions_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl PathSettings {
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => path_resolver::resolve_data_folder(),
        }
    }

    pub fn session_file(&self) -> Result<PathBuf> {
        match (&self.session_file, &self.data_dir) {
            (Some(file), _) => Ok(file.clone()),
            (None, Some(dir)) => Ok(dir.join("session.json")),
            (None, None) => path_resolver::resolve_session_file(),
        }
    }

    pub fn versions_dir(&self) -> Result<PathBuf> {
        match (&self.versions_dir, &self.data_dir) {
            (Some(dir), _) => Ok(dir.clone()),
            (None, Some(data)) => Ok(data.join("versions").join("ips")),
            (None, None) => path_resolver::resolve_versions_folder(),
        }
    }

    pub fn log_dir(&self) -> Result<PathBuf> {
        match (&self.log_dir, &self.data_dir) {
            (Some(dir), _) => Ok(dir.clone()),
            (None, Some(data)) => Ok(data.join("logs")),
            (None, None) => path_resolver::resolve_log_folder(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Administrative connection used to create databases and users.
    pub url: String,
    pub site_host: String,
    pub grant_host: String,
    pub recreate_existing: bool,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        let provisioning = ProvisioningOptions::default();
        Self {
            url: "mysql://root@localhost:3306".to_string(),
            site_host: provisioning.site_host,
            grant_host: provisioning.grant_host,
            recreate_existing: provisioning.recreate_existing,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT.as_secs(),
        }
    }
}

impl DatabaseSettings {
    pub fn provisioning_options(&self) -> ProvisioningOptions {
        ProvisioningOptions {
            site_host: self.site_host.clone(),
            grant_host: self.grant_host.clone(),
            recreate_existing: self.recreate_existing,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseSettings {
    /// Used when the site definition carries no key of its own.
    pub key: Option<String>,
    /// Appended to the key so the install registers as a test install. Empty disables it.
    pub test_install_suffix: String,
    /// Client-area license page offering the release download.
    pub url: Option<String>,
}

impl Default for LicenseSettings {
    fn default() -> Self {
        Self {
            key: None,
            test_install_suffix: DEFAULT_LICENSE_SUFFIX.to_string(),
            url: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientAreaSettings {
    pub username: Option<String>,
    pub password: Option<String>,
    /// Save the login cookies to the session file.
    pub remember: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressSettings {
    pub max_width: u16,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
        }
    }
}

impl Settings {
    /// Load defaults, then `path` (when given it must exist), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?
            .try_deserialize::<Settings>()
            .context("Invalid configuration")?;
        Ok(settings)
    }

    /// Settings from TOML text only (no environment), for tests and embedding.
    pub fn from_toml(text: &str) -> Result<Self> {
        Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()
            .context("Failed to parse configuration")?
            .try_deserialize::<Settings>()
            .context("Invalid configuration")
    }

    pub fn wizard_options(&self) -> WizardOptions {
        let suffix = self.license.test_install_suffix.trim();
        WizardOptions {
            license_suffix: (!suffix.is_empty()).then(|| suffix.to_string()),
            poll: self.poll.clone(),
        }
    }
}

/// A site to install, as described in its own TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteDefinition {
    pub name: String,
    /// Operator input; a `https://` prefix turns SSL on.
    pub domain: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub root: PathBuf,
    pub version: String,
    pub license_key: Option<String>,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default)]
    pub spdy: bool,
    #[serde(default = "default_true")]
    pub gzip: bool,
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub in_dev: bool,
}

fn default_true() -> bool {
    true
}

impl SiteDefinition {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read site definition {:?}", path))?;
        toml::from_str(&text).with_context(|| format!("Invalid site definition {:?}", path))
    }

    /// Build the `Site`; `fallback_license` is used when the definition has no key.
    pub fn into_site(self, fallback_license: Option<&str>) -> Result<Site> {
        let parsed = parse_domain(&self.domain)?;
        let license_key = self
            .license_key
            .or_else(|| fallback_license.map(str::to_string))
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("No license key configured for site '{}'", self.name))?;
        let aliases = self
            .aliases
            .iter()
            .map(|a| parse_domain(a).map(|d| d.host))
            .collect::<Result<Vec<_>>>()?;

        let mut site = Site::new(
            self.name,
            Domain::new(parsed.host).with_extras(aliases),
            self.root,
            license_key,
            self.version,
        );
        site.ssl = self.ssl || parsed.https;
        site.spdy = self.spdy;
        site.gzip = self.gzip;
        site.enabled = self.enable;
        site.in_dev = self.in_dev;
        Ok(site)
    }
}
