//! Message parameter extraction from filenames and defaults strings.
//!
//! A poller can carry a `defaults` string (`subject=Invoices,
//! sender.as2_id=MyCompany`) and a `format` template
//! (`sender.as2_id.receiver.as2_id.attributes.fileid`) that is matched
//! against each filename token-by-token using the configured delimiter
//! characters. Both produce `(key, value)` pairs applied to the message.

use as2_types::Message;

use crate::PollError;

/// Delimiters used when the poller configuration names none.
pub const DEFAULT_DELIMITERS: &str = ".-";

/// Parse a comma-separated `key=value` defaults string.
pub fn parse_defaults(defaults: &str) -> Vec<(String, String)> {
    defaults
        .split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Split a filename into attribute values per the format template.
///
/// The template is a comma-separated list of parameter keys; the
/// filename is tokenized on the delimiter characters and tokens are
/// assigned to keys in order. A filename with fewer tokens than the
/// template has keys does not match.
pub fn parse_filename(
    format: &str,
    delimiters: &str,
    filename: &str,
) -> Result<Vec<(String, String)>, PollError> {
    let keys: Vec<&str> = format
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .collect();
    let tokens: Vec<&str> = filename
        .split(|c| delimiters.contains(c))
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.len() < keys.len() {
        return Err(PollError::FormatMismatch {
            filename: filename.to_string(),
            format: format.to_string(),
        });
    }

    Ok(keys
        .into_iter()
        .zip(tokens)
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect())
}

/// Apply one extracted parameter to a message.
///
/// `subject` sets the message subject; everything else (including the
/// `sender.*` / `receiver.*` identity keys) lands in the attribute map
/// for the partnership resolver to consume.
pub fn apply_parameter(msg: &mut Message, key: &str, value: &str) {
    match key {
        "subject" => msg.subject = value.to_string(),
        _ => {
            let key = key.strip_prefix("attributes.").unwrap_or(key);
            msg.attributes
                .extra
                .insert(key.to_string(), value.to_string());
        }
    }
}
