use url::Url;

use crate::error::{AuthError, AuthResult};

/// Returns the URL with a path that ends in `/`, so relative resolution keeps
/// the last segment (`/r4` + `x` would otherwise resolve to `/x`).
pub fn ensure_path_ends_with_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        return url.clone();
    }
    let mut with_slash = url.clone();
    let path = format!("{}/", url.path());
    with_slash.set_path(&path);
    with_slash
}

/// Parses an absolute http(s) URL, mapping failures through `on_error`.
pub fn parse_http_url(raw: &str, on_error: impl Fn(String) -> AuthError) -> AuthResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| on_error(format!("'{}' is not a valid URL: {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(on_error(format!("'{}' uses unsupported scheme '{}'", raw, other))),
    }
}
