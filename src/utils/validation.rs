// Input validation utilities

use anyhow::Result;
use url::Url;

/// A domain as typed by an operator, normalised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDomain {
    pub host: String,
    pub https: bool,
}

/// Normalise operator input such as `WWW.Example.com/forums` or `https://forum.example.com`.
///
/// Lowercases, assumes `http://` when no scheme is given, requires a hostname and drops a
/// leading `www.` along with any path, port or query.
pub fn parse_domain(input: &str) -> Result<ParsedDomain> {
    let lowered = input.trim().to_lowercase();
    let with_scheme = if lowered.starts_with("http://") || lowered.starts_with("https://") {
        lowered
    } else {
        format!("http://{}", lowered)
    };

    let url = Url::parse(&with_scheme)
        .map_err(|e| anyhow::anyhow!("Invalid domain provided: '{}' ({})", input, e))?;
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Invalid domain provided: '{}'", input))?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() {
        return Err(anyhow::anyhow!("Invalid domain provided: '{}'", input));
    }

    Ok(ParsedDomain {
        host: host.to_string(),
        https: url.scheme() == "https",
    })
}
