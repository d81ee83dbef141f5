// Provisioning targets: sites and the domains they are served from

use crate::models::credentials::DatabaseCredentials;
use crate::models::version::Version;
use crate::utils::validation::parse_domain;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;

fn slug_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^0-9a-zA-Z_-]+").unwrap())
}

/// Lowercase the name and collapse every run of characters outside `[0-9a-zA-Z_-]` into a
/// single underscore. Applying it twice gives the same result.
pub fn slugify(name: &str) -> String {
    slug_re().replace_all(&name.to_lowercase(), "_").into_owned()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,
    #[serde(default)]
    pub extras: Vec<String>,
}

impl Domain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extras: Vec::new(),
        }
    }

    pub fn with_extras(mut self, extras: Vec<String>) -> Self {
        self.extras = extras;
        self
    }

    /// Domain from operator input (`https://www.Example.com/` becomes `example.com`).
    pub fn parse(input: &str) -> anyhow::Result<Self> {
        Ok(Self::new(parse_domain(input)?.host))
    }
}

#[derive(Debug, Clone)]
pub struct Site {
    name: String,
    slug: String,
    pub domain: Domain,
    pub root: PathBuf,
    pub license_key: String,
    pub version: String,
    pub ssl: bool,
    pub spdy: bool,
    pub gzip: bool,
    pub enabled: bool,
    pub in_dev: bool,
    pub database: Option<DatabaseCredentials>,
}

impl Site {
    pub fn new(
        name: impl Into<String>,
        domain: Domain,
        root: PathBuf,
        license_key: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            slug: slugify(&name),
            name,
            domain,
            root,
            license_key: license_key.into(),
            version: version.into(),
            ssl: false,
            spdy: false,
            gzip: true,
            enabled: false,
            in_dev: false,
            database: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.slug = slugify(&self.name);
    }

    pub fn parsed_version(&self) -> Option<Version> {
        Version::parse(&self.version)
    }

    /// Entry point of the remote installation wizard.
    pub fn wizard_url(&self) -> String {
        format!(
            "{scheme}://{host}/admin/install",
            scheme = if self.ssl { "https" } else { "http" },
            host = self.domain.name
        )
    }
}
