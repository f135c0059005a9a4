//! Startup configuration checks with per-field suggestions.
//!
//! Each helper checks one setting and returns a [`ValidationError`] naming
//! the offending flag. [`ProxyConfig::from_args`](super::ProxyConfig::from_args)
//! runs them all and reports every problem at once.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use url::Url;

use crate::error::ValidationError;

fn error(field: &str, message: impl Into<String>, suggestion: Option<&str>) -> ValidationError {
    ValidationError {
        field: field.into(),
        message: message.into(),
        suggestion: suggestion.map(String::from),
    }
}

/// Turn the `--domain` value into the issuer URL.
///
/// A bare host (`acme.zitadel.cloud`, `auth.local:8080`) means HTTPS; an
/// explicit `http://` or `https://` prefix is kept as given.
pub fn issuer_url(domain: &str) -> Result<Url, ValidationError> {
    let domain = domain.trim();
    if domain.is_empty() {
        return Err(error(
            "domain",
            "cannot be empty",
            Some("pass --domain <instance>.zitadel.cloud"),
        ));
    }

    let candidate = if domain.contains("://") {
        domain.to_string()
    } else {
        format!("https://{domain}")
    };

    let url = Url::parse(&candidate)
        .map_err(|e| error("domain", format!("'{domain}' is not a valid host: {e}"), None))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        "http" | "https" => Err(error("domain", format!("'{domain}' has no host"), None)),
        scheme => Err(error(
            "domain",
            format!("unsupported scheme '{scheme}' (expected http or https)"),
            None,
        )),
    }
}

pub fn validate_key_path(path: &Path) -> Result<(), ValidationError> {
    if path.as_os_str().is_empty() {
        return Err(error("key", "cannot be empty", Some("pass --key path/to/key.json")));
    }
    if !path.is_file() {
        return Err(error(
            "key",
            format!("'{}' does not exist or is not a file", path.display()),
            None,
        ));
    }
    Ok(())
}

pub fn listen_addr(host: &str, port: u16) -> Result<SocketAddr, ValidationError> {
    let ip: IpAddr = host.parse().map_err(|_| {
        error(
            "host",
            format!("'{host}' is not an IP address"),
            Some("use 0.0.0.0 to listen on all interfaces"),
        )
    })?;
    Ok(SocketAddr::new(ip, port))
}

pub fn validate_timeout(field: &str, millis: Option<u64>) -> Result<(), ValidationError> {
    match millis {
        Some(0) => Err(error(
            field,
            "must be greater than 0",
            Some("omit the flag to disable the timeout"),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_domain_defaults_to_https() {
        let url = issuer_url("acme.zitadel.cloud").unwrap();
        assert_eq!(url.as_str(), "https://acme.zitadel.cloud/");
    }

    #[test]
    fn explicit_scheme_is_kept() {
        let url = issuer_url("http://127.0.0.1:8080").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/");
    }

    #[test]
    fn empty_domain_fails_with_suggestion() {
        let err = issuer_url("  ").unwrap_err();
        assert_eq!(err.field, "domain");
        assert!(err.suggestion.is_some());
    }

    #[test]
    fn non_http_scheme_fails() {
        let err = issuer_url("ftp://auth.example").unwrap_err();
        assert!(err.message.contains("unsupported scheme"));
    }

    #[test]
    fn missing_key_file_fails() {
        let err = validate_key_path(Path::new("/nonexistent/key.json")).unwrap_err();
        assert_eq!(err.field, "key");
    }

    #[test]
    fn listen_addr_requires_ip() {
        assert_eq!(
            listen_addr("0.0.0.0", 8089).unwrap(),
            "0.0.0.0:8089".parse().unwrap()
        );
        assert!(listen_addr("localhost", 8089).is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(validate_timeout("upstream-timeout-ms", Some(0)).is_err());
        assert!(validate_timeout("upstream-timeout-ms", Some(1)).is_ok());
        assert!(validate_timeout("upstream-timeout-ms", None).is_ok());
    }
}
