use percent_encoding::percent_decode_str;

use crate::error::{FileServiceError, Result};

/// Percent-decodes a request path. Paths that do not decode to UTF-8 are invalid.
pub fn decode_path(path: &str) -> Result<String> {
    percent_decode_str(path)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| FileServiceError::InvalidPath(path.to_string()))
}

/// Removes a mount prefix from a decoded path, keeping the leading `/`.
///
/// Returns `None` when the path lies outside the mount. `/static` owns
/// `/static` and `/static/...` but not `/statics`.
pub fn strip_mount<'a>(mount: &str, path: &'a str) -> Option<&'a str> {
    let mount = mount.trim_end_matches('/');
    if mount.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(mount)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}
