//! Endpoint validation.
//!
//! The completion endpoint is configured as a full URL, so the only thing
//! checked here is that it is an absolute `http`/`https` URL with a host.

use reqwest::Url;

use crate::core::error::ErrorKind;

/// Parse a configured endpoint into a request URL.
///
/// # Examples
///
/// ```
/// use chatservice::utils::url::parse_endpoint;
///
/// assert!(parse_endpoint("http://127.0.0.1:8080/v1/chat/completions").is_ok());
/// assert!(parse_endpoint("not a url").is_err());
/// ```
pub fn parse_endpoint(endpoint: &str) -> Result<Url, ErrorKind> {
    let invalid = || ErrorKind::InvalidEndpoint(endpoint.to_string());
    let url = Url::parse(endpoint.trim()).map_err(|_| invalid())?;

    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        _ => Err(invalid()),
    }
}
