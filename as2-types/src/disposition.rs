//! MDN disposition parsing (RFC 3798 / RFC 4130).
//!
//! A disposition looks like
//! `automatic-action/MDN-sent-automatically; processed/warning: duplicate-document`:
//! an action mode and sending mode before the semicolon, then the
//! disposition status with an optional modifier and description.

use std::fmt;

use crate::As2Error;

/// How the receiver disposed of the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispositionCategory {
    /// Processed cleanly.
    Success,
    /// Processed with a warning; the transfer still counts as delivered.
    Warning,
    /// The receiver rejected the message. Retrying will not help.
    Error,
}

/// A parsed MDN disposition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispositionType {
    /// Action mode, e.g. `automatic-action`.
    pub action: String,
    /// Sending mode, e.g. `MDN-sent-automatically`.
    pub mdn_action: String,
    /// Disposition status, e.g. `processed` or `failed`.
    pub status: String,
    /// Optional status modifier: `error`, `warning` or `failure`.
    pub status_modifier: Option<String>,
    /// Optional free-text description after the modifier.
    pub status_description: Option<String>,
}

impl DispositionType {
    /// The disposition a compliant receiver sends on clean processing.
    pub fn processed() -> Self {
        Self {
            action: "automatic-action".to_string(),
            mdn_action: "MDN-sent-automatically".to_string(),
            status: "processed".to_string(),
            status_modifier: None,
            status_description: None,
        }
    }

    /// Parse a disposition string.
    pub fn parse(value: &str) -> Result<Self, As2Error> {
        let invalid = |reason: &str| As2Error::InvalidDisposition {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        let (modes, status_part) = value
            .split_once(';')
            .ok_or_else(|| invalid("missing ';' separator"))?;
        let (action, mdn_action) = modes
            .split_once('/')
            .ok_or_else(|| invalid("missing '/' in action modes"))?;

        let status_part = status_part.trim();
        if status_part.is_empty() {
            return Err(invalid("empty disposition status"));
        }

        let (status, modifier_part) = match status_part.split_once('/') {
            Some((s, m)) => (s, Some(m)),
            None => (status_part, None),
        };

        let (status_modifier, status_description) = match modifier_part {
            None => (None, None),
            Some(m) => match m.split_once(':') {
                Some((modifier, description)) => (
                    Some(modifier.trim().to_string()),
                    Some(description.trim().to_string()),
                ),
                None => (Some(m.trim().to_string()), None),
            },
        };

        Ok(Self {
            action: action.trim().to_string(),
            mdn_action: mdn_action.trim().to_string(),
            status: status.trim().to_string(),
            status_modifier,
            status_description,
        })
    }

    /// Whether the modifier marks a warning.
    pub fn is_warning(&self) -> bool {
        self.status_modifier
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case("warning"))
    }

    /// Classify the disposition for retry and routing decisions.
    ///
    /// Anything other than a plain `processed` status is a rejection,
    /// except a `warning` modifier, which counts as delivered.
    pub fn category(&self) -> DispositionCategory {
        if !self.status.eq_ignore_ascii_case("processed") {
            return DispositionCategory::Error;
        }
        match self.status_modifier.as_deref() {
            None => DispositionCategory::Success,
            Some(m) if m.eq_ignore_ascii_case("warning") => DispositionCategory::Warning,
            Some(_) => DispositionCategory::Error,
        }
    }
}

impl fmt::Display for DispositionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}; {}", self.action, self.mdn_action, self.status)?;
        if let Some(modifier) = &self.status_modifier {
            write!(f, "/{modifier}")?;
            if let Some(description) = &self.status_description {
                write!(f, ": {description}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_processed() {
        let d = DispositionType::parse("automatic-action/MDN-sent-automatically; processed")
            .unwrap();
        assert_eq!(d.action, "automatic-action");
        assert_eq!(d.mdn_action, "MDN-sent-automatically");
        assert_eq!(d.status, "processed");
        assert_eq!(d.status_modifier, None);
        assert_eq!(d.category(), DispositionCategory::Success);
    }

    #[test]
    fn parse_warning_with_description() {
        let d = DispositionType::parse(
            "automatic-action/MDN-sent-automatically; processed/warning: duplicate-document",
        )
        .unwrap();
        assert_eq!(d.status_modifier.as_deref(), Some("warning"));
        assert_eq!(d.status_description.as_deref(), Some("duplicate-document"));
        assert!(d.is_warning());
        assert_eq!(d.category(), DispositionCategory::Warning);
    }

    #[test]
    fn parse_error_modifier() {
        let d = DispositionType::parse(
            "automatic-action/MDN-sent-automatically; processed/error: decryption-failed",
        )
        .unwrap();
        assert_eq!(d.category(), DispositionCategory::Error);
        assert!(!d.is_warning());
    }

    #[test]
    fn failed_status_is_error() {
        let d = DispositionType::parse(
            "automatic-action/MDN-sent-automatically; failed/failure: sender-equals-receiver",
        )
        .unwrap();
        assert_eq!(d.category(), DispositionCategory::Error);
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(DispositionType::parse("no separator").is_err());
        assert!(DispositionType::parse("no-slash; processed").is_err());
        assert!(DispositionType::parse("a/b; ").is_err());
    }

    #[test]
    fn display_roundtrip() {
        for s in [
            "automatic-action/MDN-sent-automatically; processed",
            "automatic-action/MDN-sent-automatically; processed/warning: almost",
            "automatic-action/MDN-sent-automatically; failed/failure: unsupported format",
        ] {
            let d = DispositionType::parse(s).unwrap();
            assert_eq!(d.to_string(), s);
        }
    }
}
