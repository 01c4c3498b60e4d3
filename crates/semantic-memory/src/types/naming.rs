//! Index names, document ids and web page URLs
//!
//! Every index argument passes through [`clean_index_name`] before any lookup,
//! so callers outside the orchestrator must apply the same rule.

use once_cell::sync::Lazy;
use regex::Regex;
use std::net::IpAddr;
use url::{Host, Url};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Index used when the caller passes none
pub const DEFAULT_INDEX: &str = "default";

/// Longest accepted document id
const MAX_DOCUMENT_ID_LEN: usize = 256;

static INDEX_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s|\\/._:]").expect("static regex"));
static INDEX_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9-]+$").expect("static regex"));
static DOCUMENT_ID_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("static regex"));

/// Normalize an index name, falling back to `default_index` when empty.
///
/// Whitespace and `\ / . _ : |` become `-`, the result is lower-cased.
pub fn clean_index_name_or(index: Option<&str>, default_index: &str) -> Result<String> {
    let trimmed = index.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return clean_index_name_or(Some(default_index), DEFAULT_INDEX);
    }

    let cleaned = INDEX_SEPARATORS
        .replace_all(&trimmed.to_lowercase(), "-")
        .into_owned();

    if !INDEX_CHARS.is_match(&cleaned) {
        return Err(Error::validation(format!(
            "Invalid index name '{}': only letters, digits and '-' are allowed",
            trimmed
        )));
    }

    Ok(cleaned)
}

/// Normalize an index name using [`DEFAULT_INDEX`] for empty input
pub fn clean_index_name(index: Option<&str>) -> Result<String> {
    clean_index_name_or(index, DEFAULT_INDEX)
}

/// Check a caller-supplied document id
pub fn validate_document_id(document_id: &str) -> Result<()> {
    if document_id.is_empty() {
        return Err(Error::validation("Document id is empty"));
    }
    if document_id.len() > MAX_DOCUMENT_ID_LEN {
        return Err(Error::validation(format!(
            "Document id is longer than {} characters",
            MAX_DOCUMENT_ID_LEN
        )));
    }
    if document_id == "." || document_id == ".." {
        return Err(Error::validation(format!(
            "Invalid document id '{}': reserved path name",
            document_id
        )));
    }
    if !DOCUMENT_ID_CHARS.is_match(document_id) {
        return Err(Error::validation(format!(
            "Invalid document id '{}': only letters, digits, '.', '_' and '-' are allowed",
            document_id
        )));
    }
    Ok(())
}

/// Generate a fresh document id: random hex plus a UTC timestamp
pub fn new_document_id() -> String {
    format!(
        "{}{}",
        Uuid::new_v4().simple(),
        chrono::Utc::now().format("%Y%m%d%H%M%S%f")
    )
}

/// Validate a web page URL before it is imported.
///
/// Only http(s) is accepted. Hosts that resolve textually to loopback,
/// private, link-local or unspecified addresses are rejected, including the
/// shorthand IPv4 forms the URL parser expands (`127.1`, `0x7f000001`).
/// Returns the canonical serialization of the URL.
pub fn validate_web_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url.trim())
        .map_err(|e| Error::validation(format!("Invalid URL '{}': {}", url.trim(), e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::validation(format!(
            "URL scheme '{}' is not allowed, use http or https",
            parsed.scheme()
        )));
    }

    let ip = match parsed.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.');
            if domain.eq_ignore_ascii_case("localhost") {
                return Err(Error::validation(format!("URL host '{}' is not allowed", domain)));
            }
            None
        }
        Some(Host::Ipv4(v4)) => Some(IpAddr::V4(v4)),
        Some(Host::Ipv6(v6)) => Some(IpAddr::V6(v6)),
        None => return Err(Error::validation(format!("URL '{}' has no host", parsed))),
    };

    if let Some(ip) = ip.filter(is_reserved_ip) {
        return Err(Error::validation(format!(
            "URL host '{}' is a reserved IP address",
            ip
        )));
    }

    Ok(parsed.as_str().to_string())
}

fn is_reserved_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation()
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_reserved_ip(&IpAddr::V4(v4));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // unique local fc00::/7
                || (first & 0xfe00) == 0xfc00
                // link local fe80::/10
                || (first & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_index_name() {
        assert_eq!(clean_index_name(None).unwrap(), "default");
        assert_eq!(clean_index_name(Some("   ")).unwrap(), "default");
        assert_eq!(clean_index_name(Some("KB")).unwrap(), "kb");
        assert_eq!(clean_index_name(Some(" My Docs.v2 ")).unwrap(), "my-docs-v2");
        assert_eq!(clean_index_name(Some("a/b\\c:d_e|f")).unwrap(), "a-b-c-d-e-f");
        assert!(clean_index_name(Some("bad*name")).is_err());
    }

    #[test]
    fn test_clean_index_name_is_idempotent() {
        let once = clean_index_name(Some("Team Notes_2024")).unwrap();
        assert_eq!(clean_index_name(Some(&once)).unwrap(), once);
    }

    #[test]
    fn test_custom_default_index() {
        assert_eq!(clean_index_name_or(Some(""), "Shared Docs").unwrap(), "shared-docs");
    }

    #[test]
    fn test_document_ids() {
        assert!(validate_document_id("doc1").is_ok());
        assert!(validate_document_id("report_2024-01.v2").is_ok());
        assert!(validate_document_id("").is_err());
        assert!(validate_document_id("a/b").is_err());
        assert!(validate_document_id("has space").is_err());
        assert!(matches!(validate_document_id("."), Err(Error::Validation(_))));
        assert!(matches!(validate_document_id(".."), Err(Error::Validation(_))));
        assert!(validate_document_id("...").is_ok());

        let generated = new_document_id();
        assert!(validate_document_id(&generated).is_ok());
        assert_ne!(generated, new_document_id());
    }

    #[test]
    fn test_web_urls() {
        assert!(validate_web_url("https://example.com/page?x=1").is_ok());
        assert!(validate_web_url("http://example.com").is_ok());
        assert!(validate_web_url("ftp://example.com/file").is_err());
        assert!(validate_web_url("not a url").is_err());
        assert!(validate_web_url("http://127.0.0.1/admin").is_err());
        assert!(validate_web_url("http://10.0.0.5/").is_err());
        assert!(validate_web_url("http://localhost:8080/").is_err());
        assert!(validate_web_url("http://[::1]/").is_err());
        assert!(validate_web_url("http://93.184.216.34/").is_ok());
    }

    #[test]
    fn test_web_urls_reject_loopback_spellings() {
        for url in [
            "http://2130706433/",
            "http://127.1/",
            "http://0x7f000001/",
            "http://0177.0.0.1/",
            "http://LOCALHOST./",
            "http://[::ffff:127.0.0.1]/",
            "https://192.168.1.1:8443/x",
        ] {
            assert!(
                matches!(validate_web_url(url), Err(Error::Validation(_))),
                "{} should be rejected",
                url
            );
        }
    }

    #[test]
    fn test_web_url_canonical_form() {
        assert_eq!(validate_web_url(" HTTP://Example.COM ").unwrap(), "http://example.com/");
        assert_eq!(
            validate_web_url("https://example.com/a b?q=1").unwrap(),
            "https://example.com/a%20b?q=1"
        );
    }
}
