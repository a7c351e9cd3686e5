use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use hyper::header::{self, HeaderMap, HeaderValue};
use mime_guess::mime;

use super::{ContentEncoding, FileAttributes};

/// Guesses the media type of a logical path. For a precompressed variant the
/// encoding suffix is ignored, so `site.css.br` is still `text/css`.
pub fn guess_content_type(path: &str, encoding: Option<ContentEncoding>) -> String {
    let path = match encoding {
        Some(encoding) => path.strip_suffix(encoding.extension()).unwrap_or(path),
        None => path,
    };
    let guessed = mime_guess::from_path(path).first_or_octet_stream();
    let textual = guessed.type_() == mime::TEXT
        || guessed.subtype() == mime::JAVASCRIPT
        || guessed.subtype() == mime::JSON
        || guessed.suffix().map_or(false, |suffix| suffix == mime::XML);
    if textual && guessed.get_param(mime::CHARSET).is_none() {
        format!("{}; charset=utf-8", guessed.essence_str())
    } else {
        guessed.to_string()
    }
}

pub fn etag(attrs: &FileAttributes) -> String {
    format!("\"{:x}-{:x}\"", attrs.length(), millis(attrs.last_modified()))
}

pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|date| SystemTime::from(date.with_timezone(&Utc)))
}

pub(crate) fn millis(time: SystemTime) -> u128 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

pub(crate) fn build_headers(
    attrs: &FileAttributes,
    content_type: &str,
    encoding: Option<ContentEncoding>,
    date: Option<SystemTime>,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Some(encoding) = encoding {
        headers.insert(
            header::CONTENT_ENCODING,
            HeaderValue::from_static(encoding.header_value()),
        );
        headers.insert(header::VARY, HeaderValue::from_static("accept-encoding"));
    }
    if let Ok(value) = HeaderValue::from_str(&http_date(attrs.last_modified())) {
        headers.insert(header::LAST_MODIFIED, value);
    }
    if let Ok(value) = HeaderValue::from_str(&etag(attrs)) {
        headers.insert(header::ETAG, value);
    }
    if let Some(Ok(value)) = date.map(|date| HeaderValue::from_str(&http_date(date))) {
        headers.insert(header::DATE, value);
    }
    headers
}
