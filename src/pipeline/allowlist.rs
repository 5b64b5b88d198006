//! Host allowlist: decides which media URLs may be downloaded at all.
//!
//! Classification is pure: no DNS lookups, no network. Rejected URLs never
//! reach the fetcher; the coordinator records them as
//! [`crate::output::FetchResult::Rejected`] so the renderer prints a notice.

use crate::error::{ExportError, MediaError};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// How an allowlist entry is compared against a URL's host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HostMatch {
    /// `pbs.twimg.com` matches only `pbs.twimg.com`.
    Exact,
    /// `twimg.com` matches `twimg.com` and any `*.twimg.com`. (default)
    #[default]
    Subdomain,
}

/// Result of classifying one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Rejected(MediaError),
}

/// A validated, lower-cased set of hostnames.
#[derive(Debug, Clone)]
pub struct Allowlist {
    hosts: Vec<String>,
    mode: HostMatch,
}

impl Allowlist {
    /// Validate and normalise `entries`.
    ///
    /// Entries are trimmed, lower-cased and stripped of a leading `.`;
    /// blank entries are ignored. An entry carrying a scheme, path, port or
    /// whitespace is a misconfiguration and fails the run.
    pub fn new<I, S>(entries: I, mode: HostMatch) -> Result<Self, ExportError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut hosts = Vec::new();
        for raw in entries {
            let entry = raw.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            let host = entry.trim_start_matches('.').to_ascii_lowercase();
            validate_host(entry, &host)?;
            if !hosts.contains(&host) {
                hosts.push(host);
            }
        }
        Ok(Self { hosts, mode })
    }

    /// An allowlist that accepts every http/https URL.
    pub fn allow_all() -> Self {
        Self {
            hosts: Vec::new(),
            mode: HostMatch::default(),
        }
    }

    pub fn allows_all(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Classify `url` as eligible for download or rejected.
    pub fn classify(&self, url: &str) -> Eligibility {
        let host = match parse_host(url) {
            Some(h) => h,
            None => {
                return Eligibility::Rejected(MediaError::InvalidUrl {
                    url: url.to_string(),
                })
            }
        };

        if self.allows_all() || self.hosts.iter().any(|h| self.host_matches(&host, h)) {
            Eligibility::Eligible
        } else {
            Eligibility::Rejected(MediaError::RejectedByPolicy {
                url: url.to_string(),
                host,
            })
        }
    }

    fn host_matches(&self, host: &str, allowed: &str) -> bool {
        match self.mode {
            HostMatch::Exact => host == allowed,
            HostMatch::Subdomain => {
                host == allowed
                    || (host.len() > allowed.len()
                        && host.ends_with(allowed)
                        && host.as_bytes()[host.len() - allowed.len() - 1] == b'.')
            }
        }
    }
}

/// Lower-cased host of an http/https URL.
fn parse_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.to_ascii_lowercase())
}

fn validate_host(entry: &str, host: &str) -> Result<(), ExportError> {
    let invalid = |reason: &str| ExportError::InvalidAllowlist {
        entry: entry.to_string(),
        reason: reason.to_string(),
    };

    if host.contains("://") {
        return Err(invalid("expected a hostname, not a URL"));
    }
    if host.contains('/') {
        return Err(invalid("hostname must not contain a path"));
    }
    if host.contains(':') {
        return Err(invalid("hostname must not contain a port"));
    }
    if host.chars().any(char::is_whitespace) {
        return Err(invalid("hostname must not contain whitespace"));
    }
    if host.split('.').any(str::is_empty) {
        return Err(invalid("hostname has an empty label"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(hosts: &[&str], mode: HostMatch) -> Allowlist {
        Allowlist::new(hosts.iter().copied(), mode).unwrap()
    }

    #[test]
    fn empty_list_allows_everything() {
        let a = list(&[], HostMatch::Exact);
        assert!(a.allows_all());
        assert_eq!(a.classify("https://anything.example/x.png"), Eligibility::Eligible);
    }

    #[test]
    fn blank_entries_are_ignored() {
        let a = list(&["", "   "], HostMatch::Exact);
        assert!(a.allows_all());
    }

    #[test]
    fn exact_match_rejects_subdomains() {
        let a = list(&["twimg.com"], HostMatch::Exact);
        assert_eq!(a.classify("https://twimg.com/a.jpg"), Eligibility::Eligible);
        assert!(matches!(
            a.classify("https://pbs.twimg.com/a.jpg"),
            Eligibility::Rejected(MediaError::RejectedByPolicy { .. })
        ));
    }

    #[test]
    fn subdomain_match_accepts_children_only() {
        let a = list(&["twimg.com"], HostMatch::Subdomain);
        assert_eq!(a.classify("https://pbs.twimg.com/a.jpg"), Eligibility::Eligible);
        assert_eq!(a.classify("https://twimg.com/a.jpg"), Eligibility::Eligible);
        // suffix without a dot boundary is a different domain
        assert!(matches!(
            a.classify("https://eviltwimg.com/a.jpg"),
            Eligibility::Rejected(_)
        ));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let a = list(&["PBS.TWIMG.com"], HostMatch::Exact);
        assert_eq!(a.classify("https://pbs.TwImg.COM/media/x.jpg"), Eligibility::Eligible);
    }

    #[test]
    fn rejection_carries_host() {
        let a = list(&["pbs.twimg.com"], HostMatch::Subdomain);
        match a.classify("https://cdn.example.org/a.png") {
            Eligibility::Rejected(MediaError::RejectedByPolicy { host, .. }) => {
                assert_eq!(host, "cdn.example.org")
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn non_http_and_garbage_are_invalid() {
        let a = Allowlist::allow_all();
        assert!(matches!(
            a.classify("ftp://pbs.twimg.com/a.jpg"),
            Eligibility::Rejected(MediaError::InvalidUrl { .. })
        ));
        assert!(matches!(
            a.classify("not a url"),
            Eligibility::Rejected(MediaError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn malformed_entries_fail_construction() {
        for bad in ["https://pbs.twimg.com", "pbs.twimg.com/media", "host:8080", "a..b", "a b"] {
            let err = Allowlist::new([bad], HostMatch::Subdomain).unwrap_err();
            assert!(
                matches!(err, ExportError::InvalidAllowlist { .. }),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn leading_dot_and_duplicates_normalised() {
        let a = list(&[".twimg.com", "TWIMG.COM"], HostMatch::Subdomain);
        assert_eq!(a.hosts(), ["twimg.com".to_string()]);
    }
}
