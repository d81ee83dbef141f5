// Loose release versions ("4.1.3.2", "4.0.11", "4.1.5 Beta 2")
//
// Ordering is componentwise over the numeric tuple, so a shorter tuple that is a prefix of a
// longer one sorts first: 4.0.11 < 4.0.11.0 < 4.0.12.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(Vec<u32>);

impl Version {
    pub fn new(components: &[u32]) -> Self {
        Self(components.to_vec())
    }

    pub fn components(&self) -> &[u32] {
        &self.0
    }

    /// Parse a vendor version label.
    ///
    /// Each dot-separated component contributes its leading digits; parsing stops at the
    /// first component without any (e.g. the "Beta" in "4.1.5 Beta 2").
    pub fn parse(input: &str) -> Option<Self> {
        let head = input.trim().split_whitespace().next()?;
        let head = head.trim_start_matches(['v', 'V']);

        let mut parts = Vec::new();
        for raw in head.split('.') {
            let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                break;
            }
            parts.push(digits.parse::<u32>().ok()?);
            if digits.len() != raw.len() {
                break;
            }
        }

        if parts.is_empty() {
            None
        } else {
            Some(Self(parts))
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(".");
        f.write_str(&joined)
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s).ok_or_else(|| format!("Invalid version string: '{}'", s))
    }
}

impl TryFrom<String> for Version {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_versions() {
        assert_eq!(Version::parse("4.1.3.2"), Some(Version::new(&[4, 1, 3, 2])));
        assert_eq!(Version::parse("4.0.11"), Some(Version::new(&[4, 0, 11])));
        assert_eq!(Version::parse(" 4.2 "), Some(Version::new(&[4, 2])));
    }

    #[test]
    fn ignores_release_suffixes() {
        assert_eq!(
            Version::parse("4.1.5 Beta 2"),
            Some(Version::new(&[4, 1, 5]))
        );
        assert_eq!(Version::parse("4.1.5b3"), Some(Version::new(&[4, 1, 5])));
        assert_eq!(Version::parse("v4.0.0"), Some(Version::new(&[4, 0, 0])));
    }

    #[test]
    fn rejects_non_versions() {
        assert_eq!(Version::parse(""), None);
        assert_eq!(Version::parse("latest"), None);
    }

    #[test]
    fn orders_componentwise() {
        let v = |s: &str| Version::parse(s).unwrap();
        assert!(v("4.0.11") < v("4.1.0"));
        assert!(v("4.0.9") < v("4.0.11"));
        assert!(v("4.0.11") < v("4.0.11.0"));
        assert!(v("3.9.0") < v("4.0.0"));
        assert!(v("4.1.3.2") > v("4.1.3"));
    }

    #[test]
    fn display_round_trips_through_from_str() {
        let v: Version = "4.1.3.2".parse().unwrap();
        assert_eq!(v.to_string(), "4.1.3.2");
    }
}
