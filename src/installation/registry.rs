// Wizard driver registry
//
// Drivers are keyed by the lowest IPS version they apply to; `None` is the unconditioned
// driver for the current wizard. The table is built in code, there is no discovery.

use crate::error::{InstallError, Result};
use crate::installation::drivers::{LandingPageDriver, LatestDriver, LegacyDoneMarkerDriver, WizardDriver};
use crate::models::version::Version;
use log::debug;
use std::collections::BTreeMap;

pub type DriverConstructor = fn() -> Box<dyn WizardDriver>;

#[derive(Default)]
pub struct DriverRegistry {
    // `None` sorts before every `Some`, so iterating in reverse visits versioned drivers from
    // the newest minimum down and reaches the default last.
    drivers: BTreeMap<Option<Version>, DriverConstructor>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builtin drivers for the wizard revisions this crate knows about.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(None, || Box::new(LatestDriver));
        registry.register(Some(Version::new(&[4, 0, 0])), || {
            Box::new(LegacyDoneMarkerDriver)
        });
        registry.register(Some(Version::new(&[4, 1, 3, 2])), || {
            Box::new(LandingPageDriver)
        });
        registry
    }

    /// Register `constructor` for versions at or above `min_version`; replaces any driver
    /// already registered under the same key.
    pub fn register(&mut self, min_version: Option<Version>, constructor: DriverConstructor) {
        self.drivers.insert(min_version, constructor);
    }

    /// The driver with the largest minimum version not above `target`, else the default.
    pub fn resolve(&self, target: &Version) -> Result<DriverConstructor> {
        let found = self
            .drivers
            .iter()
            .rev()
            .find(|(min, _)| match min {
                Some(min) => min <= target,
                None => true,
            });
        match found {
            Some((min, constructor)) => {
                debug!(
                    "[PHASE: wizard] [STEP: resolve] Version {} resolved to driver key {}",
                    target,
                    min.as_ref()
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "latest".to_string())
                );
                Ok(*constructor)
            }
            None => Err(InstallError::UnsupportedVersion(target.to_string())),
        }
    }

    /// The unconditioned driver, for sites whose version string does not parse.
    pub fn latest(&self, requested: &str) -> Result<DriverConstructor> {
        self.drivers
            .get(&None)
            .copied()
            .ok_or_else(|| InstallError::UnsupportedVersion(requested.to_string()))
    }
}
