//! Endpoint URL validation for the inference and codec services.

use std::net::IpAddr;
use thiserror::Error;
use url::{Host, Url};

/// Errors that can occur during URL validation
#[derive(Debug, Error)]
pub enum UrlValidationError {
    #[error("Invalid URL format: {0}")]
    InvalidFormat(#[from] url::ParseError),

    #[error("URL scheme must be http or https, got: {0}")]
    UnsupportedScheme(String),

    #[error("URL must have a host")]
    MissingHost,
}

/// Parse a service endpoint, requiring an http(s) scheme and a host.
///
/// # Example
/// ```rust
/// use tts_engine::utils::url_validation::validate_endpoint_url;
///
/// assert!(validate_endpoint_url("http://127.0.0.1:5006/v1/completions").is_ok());
/// assert!(validate_endpoint_url("ftp://codec.internal/decode").is_err());
/// ```
pub fn validate_endpoint_url(url: &str) -> Result<Url, UrlValidationError> {
    let parsed = Url::parse(url)?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(UrlValidationError::UnsupportedScheme(other.to_string())),
    }

    match parsed.host() {
        Some(Host::Domain(domain)) if domain.is_empty() => Err(UrlValidationError::MissingHost),
        Some(_) => Ok(parsed),
        None => Err(UrlValidationError::MissingHost),
    }
}

/// Whether the endpoint points at this machine
pub fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
        None => false,
    }
}
