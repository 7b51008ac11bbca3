//! MIME body parts and header maps.
//!
//! AS2 transmits a single MIME body part over HTTP: the part's headers
//! travel as HTTP headers and the part's content is the request body.
//! Signed messages and MDNs arrive as `multipart/signed` /
//! `multipart/report` structures, so this module also carries a small
//! multipart parser sufficient for those shapes.

use crate::As2Error;

/// An ordered, case-insensitive header map.
///
/// Insertion order is preserved so that serializing the same map twice is
/// byte-identical. Lookup ignores ASCII case; the stored name casing is the
/// one given on first insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    /// Create an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing any existing values for the same name.
    ///
    /// The replacement keeps the position of the first existing entry.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let mut kept = false;
        self.entries.retain_mut(|(n, v)| {
            if n.eq_ignore_ascii_case(name) {
                if kept {
                    return false;
                }
                kept = true;
                *v = value.clone();
            }
            true
        });
        if !kept {
            self.entries.push((name.to_string(), value));
        }
    }

    /// Append a header without touching existing values of the same name.
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        self.entries.push((name.to_string(), value.into()));
    }

    /// Get the first value for a header name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Check whether a header is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Remove all values for a header name.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Iterate over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of header entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse an RFC 822 style header block.
    ///
    /// Folded continuation lines (leading space or tab) are unfolded with a
    /// single space. Returns the map and the offset of the first byte after
    /// the terminating blank line (or `bytes.len()` if there is none).
    pub fn parse_block(bytes: &[u8]) -> Result<(Self, usize), As2Error> {
        let mut fields: Vec<(String, String)> = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let rest = &bytes[pos..];
            let line_len = rest
                .iter()
                .position(|&b| b == b'\n')
                .map(|i| i + 1)
                .unwrap_or(rest.len());
            let line = trim_eol(&rest[..line_len]);
            pos += line_len;

            if line.is_empty() {
                break;
            }
            if line[0] == b' ' || line[0] == b'\t' {
                let cont = std::str::from_utf8(line)
                    .map_err(|_| As2Error::Mime("header line is not valid UTF-8".into()))?;
                match fields.last_mut() {
                    Some((_, value)) => {
                        value.push(' ');
                        value.push_str(cont.trim());
                    }
                    None => {
                        return Err(As2Error::Mime(
                            "continuation line before any header field".into(),
                        ))
                    }
                }
            } else {
                let text = std::str::from_utf8(line)
                    .map_err(|_| As2Error::Mime("header line is not valid UTF-8".into()))?;
                let (name, value) = text.split_once(':').ok_or_else(|| {
                    As2Error::Mime(format!("header line without colon: '{text}'"))
                })?;
                fields.push((name.trim().to_string(), value.trim().to_string()));
            }
        }
        Ok((Self { entries: fields }, pos))
    }
}

/// A MIME body part: headers plus raw content bytes.
///
/// The content is the *decoded* payload; any Content-Transfer-Encoding
/// named in the headers describes how the bytes go on the wire, not how
/// they are held here.
#[derive(Clone, PartialEq, Eq)]
pub struct BodyPart {
    headers: HeaderMap,
    content: Vec<u8>,
}

impl BodyPart {
    /// Create a body part with the given content type.
    pub fn new(content: Vec<u8>, content_type: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.set(crate::headers::CONTENT_TYPE, content_type);
        Self { headers, content }
    }

    /// Assemble a body part from an existing header map and content.
    pub fn from_parts(headers: HeaderMap, content: Vec<u8>) -> Self {
        Self { headers, content }
    }

    /// The part's content bytes.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Consume the part and return its content bytes.
    pub fn into_content(self) -> Vec<u8> {
        self.content
    }

    /// The part's headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Set a header, replacing existing values.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    /// The full `Content-Type` header value.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(crate::headers::CONTENT_TYPE)
    }

    /// The media type without parameters, lowercased.
    pub fn content_type_essence(&self) -> Option<String> {
        self.content_type()
            .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
    }

    /// A parameter from the `Content-Type` header, unquoted.
    pub fn content_type_parameter(&self, name: &str) -> Option<String> {
        let ct = self.content_type()?;
        for param in ct.split(';').skip(1) {
            if let Some((k, v)) = param.split_once('=') {
                if k.trim().eq_ignore_ascii_case(name) {
                    return Some(v.trim().trim_matches('"').to_string());
                }
            }
        }
        None
    }

    /// Whether this part is a `multipart/signed` structure.
    pub fn is_multipart_signed(&self) -> bool {
        self.content_type_essence().as_deref() == Some("multipart/signed")
    }

    /// Whether this part is a `multipart/report` structure (MDN carrier).
    pub fn is_multipart_report(&self) -> bool {
        self.content_type_essence().as_deref() == Some("multipart/report")
    }

    /// The canonical MIME bytes of this part.
    ///
    /// With `include_headers`, each header is rendered as `Name: value`
    /// followed by CRLF, then a blank line, then the content. This is the
    /// MIC input format: CRLF canonicalization is required because the
    /// receiver digests the same canonical form.
    pub fn canonical_bytes(&self, include_headers: bool) -> Vec<u8> {
        if !include_headers {
            return self.content.clone();
        }
        let mut out = Vec::with_capacity(self.content.len() + 128);
        for (name, value) in self.headers.iter() {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.content);
        out
    }

    /// Split a multipart content body into its parts.
    ///
    /// Requires a `boundary` parameter on the Content-Type. Preamble and
    /// epilogue are discarded. Each returned part has its own header block
    /// parsed; the CRLF that precedes a boundary delimiter belongs to the
    /// delimiter and is stripped from the part content.
    pub fn parts(&self) -> Result<Vec<BodyPart>, As2Error> {
        let boundary = self.content_type_parameter("boundary").ok_or_else(|| {
            As2Error::MissingBoundary(self.content_type().unwrap_or("").to_string())
        })?;
        let raw_parts = split_multipart(&self.content, &boundary)?;
        let mut parts = Vec::with_capacity(raw_parts.len());
        for raw in raw_parts {
            let (headers, offset) = HeaderMap::parse_block(&raw)?;
            parts.push(BodyPart::from_parts(headers, raw[offset..].to_vec()));
        }
        Ok(parts)
    }
}

// Content can be megabytes of payload; keep Debug output bounded.
impl std::fmt::Debug for BodyPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyPart")
            .field("headers", &self.headers)
            .field("content", &format!("[{} bytes]", self.content.len()))
            .finish()
    }
}

fn trim_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn split_multipart(content: &[u8], boundary: &str) -> Result<Vec<Vec<u8>>, As2Error> {
    let open = format!("--{boundary}");
    let close = format!("--{boundary}--");
    let mut parts: Vec<Vec<u8>> = Vec::new();
    let mut current: Option<Vec<u8>> = None;

    for line in content.split_inclusive(|&b| b == b'\n') {
        let trimmed = trim_eol(line);
        // Closing delimiter starts with the opening one, so test it first.
        if trimmed == close.as_bytes() {
            if let Some(part) = current.take() {
                parts.push(strip_trailing_eol(part));
            }
            break;
        }
        if trimmed == open.as_bytes() {
            if let Some(part) = current.take() {
                parts.push(strip_trailing_eol(part));
            }
            current = Some(Vec::new());
            continue;
        }
        if let Some(part) = current.as_mut() {
            part.extend_from_slice(line);
        }
        // Lines before the first delimiter are preamble.
    }

    if parts.is_empty() {
        return Err(As2Error::Mime(format!(
            "no parts found for boundary '{boundary}'"
        )));
    }
    Ok(parts)
}

fn strip_trailing_eol(mut part: Vec<u8>) -> Vec<u8> {
    if part.ends_with(b"\r\n") {
        part.truncate(part.len() - 2);
    } else if part.ends_with(b"\n") {
        part.truncate(part.len() - 1);
    }
    part
}
