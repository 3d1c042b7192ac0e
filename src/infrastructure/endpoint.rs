//! Resolve the push endpoint from configuration.
//!
//! The configured origin may carry any of `http`, `https`, `ws` or `wss`
//! (or none at all); the result always uses the hosting page's scheme so a
//! secure console never opens a mixed-content link.

use crate::domain::config::ServerConfig;
use crate::domain::error::{LiveError, LiveResult};
use url::Url;

/// HTTP(S) URL of the endpoint, e.g. `https://admin.example.com/ws`
pub fn resolve_endpoint(server: &ServerConfig) -> LiveResult<Url> {
    let origin = server.origin.trim();
    if origin.is_empty() {
        return Err(LiveError::config("server.origin is empty"));
    }

    let with_scheme = if origin.contains("://") {
        origin.to_string()
    } else {
        format!("http://{}", origin)
    };

    let mut url = Url::parse(&with_scheme)?;
    if url.host_str().is_none() {
        return Err(LiveError::config(format!("origin '{}' has no host", origin)));
    }

    let scheme = if server.page_secure { "https" } else { "http" };
    set_scheme(&mut url, scheme)?;

    let path = format!(
        "{}/{}",
        url.path().trim_end_matches('/'),
        server.endpoint_path.trim_start_matches('/')
    );
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);

    Ok(url)
}

/// Same URL with the matching WebSocket scheme
pub fn websocket_url(endpoint: &Url) -> LiveResult<Url> {
    let mut url = endpoint.clone();
    let scheme = match endpoint.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    set_scheme(&mut url, scheme)?;
    Ok(url)
}

/// Same URL with the matching HTTP scheme
pub fn http_url(endpoint: &Url) -> LiveResult<Url> {
    let mut url = endpoint.clone();
    let scheme = match endpoint.scheme() {
        "wss" | "https" => "https",
        _ => "http",
    };
    set_scheme(&mut url, scheme)?;
    Ok(url)
}

fn set_scheme(url: &mut Url, scheme: &str) -> LiveResult<()> {
    url.set_scheme(scheme).map_err(|_| {
        LiveError::config(format!("cannot use scheme {} for {}", scheme, url))
    })
}
