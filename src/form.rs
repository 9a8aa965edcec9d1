//! Post-form decoding for `application/x-www-form-urlencoded` and
//! `multipart/form-data` bodies.
//!
//! Only text fields are collected. File parts (those with a `filename`) are
//! skipped, as are parts whose content is not UTF-8.

use std::fmt;

/// Decoded form fields in body order. Repeated keys keep every value.
#[derive(Debug, Default)]
pub(crate) struct Form {
    fields: Vec<(String, String)>,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FormError {
    /// The content type is neither urlencoded nor multipart.
    Unsupported,
    MissingBoundary,
    Malformed(&'static str),
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported => f.write_str("body is not a form"),
            Self::MissingBoundary => f.write_str("multipart body without boundary"),
            Self::Malformed(what) => write!(f, "malformed multipart body: {what}"),
        }
    }
}

impl Form {
    pub(crate) fn parse(content_type: Option<&str>, body: &[u8]) -> Result<Self, FormError> {
        let content_type = content_type.unwrap_or_default();
        let (mime, params) = match content_type.split_once(';') {
            Some((mime, params)) => (mime.trim(), params),
            None => (content_type.trim(), ""),
        };

        if mime.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
            let fields = form_urlencoded::parse(body).into_owned().collect();
            return Ok(Self { fields });
        }
        if mime.eq_ignore_ascii_case("multipart/form-data") {
            let boundary = boundary(params).ok_or(FormError::MissingBoundary)?;
            return parse_multipart(body, boundary.as_bytes()).map(|fields| Self { fields });
        }
        Err(FormError::Unsupported)
    }

    pub(crate) fn first(&self, key: &str) -> Option<&str> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub(crate) fn all(&self, key: &str) -> Vec<&str> {
        self.fields.iter().filter(|(k, _)| k == key).map(|(_, v)| v.as_str()).collect()
    }
}

fn boundary(params: &str) -> Option<&str> {
    params.split(';').find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("boundary")
            .then(|| value.trim().trim_matches('"'))
            .filter(|b| !b.is_empty())
    })
}

fn parse_multipart(body: &[u8], boundary: &[u8]) -> Result<Vec<(String, String)>, FormError> {
    let delimiter = [b"--".as_slice(), boundary].concat();

    let start = find(body, &delimiter).ok_or(FormError::Malformed("no opening boundary"))?;
    let mut rest = &body[start + delimiter.len()..];

    // Every delimiter after the first is preceded by CRLF.
    let delimiter = [b"\r\n".as_slice(), delimiter.as_slice()].concat();

    let mut fields = Vec::new();
    loop {
        if rest.starts_with(b"--") {
            return Ok(fields);
        }
        // Linear whitespace may pad a delimiter line.
        let padding = rest.iter().take_while(|&&b| b == b' ' || b == b'\t').count();
        rest = rest[padding..]
            .strip_prefix(b"\r\n")
            .ok_or(FormError::Malformed("boundary not followed by CRLF"))?;

        let end = find(rest, &delimiter).ok_or(FormError::Malformed("unterminated part"))?;
        let part = &rest[..end];
        rest = &rest[end + delimiter.len()..];

        let split = find(part, b"\r\n\r\n").ok_or(FormError::Malformed("part without headers"))?;
        let (headers, content) = (&part[..split], &part[split + 4..]);
        let Some((name, is_file)) = disposition(headers) else { continue };
        if is_file {
            continue;
        }
        if let Ok(value) = std::str::from_utf8(content) {
            fields.push((name, value.to_owned()));
        }
    }
}

/// Reads `name` and whether a `filename` is present from the part's
/// `Content-Disposition` header.
fn disposition(headers: &[u8]) -> Option<(String, bool)> {
    let headers = std::str::from_utf8(headers).ok()?;
    let value = headers.split("\r\n").find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim().eq_ignore_ascii_case("content-disposition").then_some(value)
    })?;

    let mut name = None;
    let mut is_file = false;
    for param in value.split(';').skip(1) {
        let Some((key, val)) = param.split_once('=') else { continue };
        match key.trim() {
            "name" => name = Some(val.trim().trim_matches('"').to_owned()),
            "filename" => is_file = true,
            _ => {}
        }
    }
    name.map(|name| (name, is_file))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
