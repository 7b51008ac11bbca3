//! Outbound AS2 header assembly.

use chrono::{DateTime, Utc};

use as2_types::{headers, HeaderMap, Message};

/// `Connection` value sent on every request.
pub const DEFAULT_CONNECTION: &str = "close, TE";
/// `AS2-Version` this sender speaks.
pub const AS2_VERSION: &str = "1.1";
/// `Mime-Version` sent on every request.
pub const MIME_VERSION: &str = "1.0";

/// Assembles the outbound HTTP header set for a message.
///
/// Message-specific headers are taken as the base and the mandatory AS2
/// headers are written over them, so custom headers survive unless the
/// protocol claims the name. Building twice for the same message and
/// timestamp yields byte-identical maps.
#[derive(Debug, Clone)]
pub struct HeaderBuilder {
    /// `User-Agent` value.
    pub user_agent: String,
    /// Double-quote every outbound header value (`quoteheadervalues`).
    pub quote_header_values: bool,
}

impl Default for HeaderBuilder {
    fn default() -> Self {
        Self {
            user_agent: format!("as2-send/{}", env!("CARGO_PKG_VERSION")),
            quote_header_values: false,
        }
    }
}

impl HeaderBuilder {
    /// Build the header set for a message at the given send time.
    pub fn build(&self, msg: &Message, date: DateTime<Utc>) -> HeaderMap {
        let partnership = &msg.partnership;
        let mut map = msg.headers.clone();

        map.set(headers::CONNECTION, DEFAULT_CONNECTION);
        map.set(headers::USER_AGENT, self.user_agent.clone());
        map.set(headers::MIME_VERSION, MIME_VERSION);
        map.set(headers::AS2_VERSION, AS2_VERSION);

        map.set(headers::DATE, date.format("%a, %d %b %Y %H:%M:%S GMT").to_string());
        map.set(headers::MESSAGE_ID, msg.message_id.clone());
        map.set(headers::CONTENT_TYPE, msg.content_type.clone());
        map.set(headers::RECIPIENT_ADDRESS, partnership.as2_url.clone());
        map.set(headers::AS2_FROM, identifier(&partnership.sender_as2_id));
        map.set(headers::AS2_TO, identifier(&partnership.receiver_as2_id));
        map.set(headers::SUBJECT, msg.subject.clone());
        map.set(headers::FROM, partnership.sender_email.clone());
        // Already on the message when the pipeline ran; carried through
        // verbatim so the wire CTE matches the secured body.
        if let Some(cte) = msg.headers.get(headers::CONTENT_TRANSFER_ENCODING) {
            map.set(headers::CONTENT_TRANSFER_ENCODING, cte.to_string());
        }

        if let Some(mdn_to) = &partnership.mdn_to {
            map.set(headers::DISPOSITION_NOTIFICATION_TO, mdn_to.clone());
        }
        if let Some(options) = &partnership.mdn_options {
            map.set(headers::DISPOSITION_NOTIFICATION_OPTIONS, options.clone());
        }
        // Presence of this header is what switches the receiver to
        // asynchronous MDN delivery.
        if let Some(receipt_url) = &partnership.receipt_delivery_option {
            map.set(headers::RECEIPT_DELIVERY_OPTION, receipt_url.clone());
        }
        if let Some(disposition) = &msg.content_disposition {
            map.set(headers::CONTENT_DISPOSITION, disposition.clone());
        }

        if self.quote_header_values {
            let quoted: Vec<(String, String)> = map
                .iter()
                .map(|(n, v)| (n.to_string(), quote(v)))
                .collect();
            let mut out = HeaderMap::new();
            for (n, v) in quoted {
                out.add(&n, v);
            }
            return out;
        }
        map
    }
}

/// Quote an AS2 identifier when RFC 4130 requires it: identifiers with
/// spaces, commas or quotes must travel quoted regardless of the global
/// quoting flag.
fn identifier(value: &str) -> String {
    let already_quoted = value.len() >= 2 && value.starts_with('"') && value.ends_with('"');
    if !already_quoted && value.contains([' ', ',', '"']) {
        quote(value)
    } else {
        value.to_string()
    }
}

fn quote(value: &str) -> String {
    // Never quote twice.
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use as2_types::Partnership;
    use chrono::TimeZone;

    fn message() -> Message {
        let partnership = Partnership {
            sender_as2_id: "MyCompany".into(),
            receiver_as2_id: "PartnerCo".into(),
            sender_email: "edi@mycompany.example".into(),
            as2_url: "http://partner.example/as2".into(),
            mdn_to: Some("edi@mycompany.example".into()),
            mdn_options: Some(
                "signed-receipt-protocol=optional, pkcs7-signature; \
                 signed-receipt-micalg=optional, sha-256"
                    .into(),
            ),
            ..Partnership::default()
        };
        let mut msg = Message::new("<AS2-1-0001-host@MyCompany_PartnerCo>".into(), partnership);
        msg.subject = "Invoice 42".into();
        msg.content_type = "application/octet-stream".into();
        msg.headers
            .set(headers::CONTENT_TRANSFER_ENCODING, "binary");
        msg
    }

    fn fixed_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 17, 12, 30, 45).unwrap()
    }

    #[test]
    fn mandatory_headers_are_present() {
        let map = HeaderBuilder::default().build(&message(), fixed_date());
        for name in [
            headers::AS2_VERSION,
            headers::AS2_FROM,
            headers::AS2_TO,
            headers::MESSAGE_ID,
            headers::SUBJECT,
            headers::FROM,
            headers::DATE,
            headers::CONTENT_TYPE,
            headers::CONTENT_TRANSFER_ENCODING,
            headers::MIME_VERSION,
            headers::RECIPIENT_ADDRESS,
        ] {
            assert!(map.contains(name), "missing {name}");
        }
        assert_eq!(map.get(headers::AS2_VERSION), Some("1.1"));
        assert_eq!(map.get(headers::AS2_FROM), Some("MyCompany"));
        assert_eq!(map.get(headers::AS2_TO), Some("PartnerCo"));
    }

    #[test]
    fn date_is_rfc1123() {
        let map = HeaderBuilder::default().build(&message(), fixed_date());
        assert_eq!(map.get(headers::DATE), Some("Fri, 17 May 2024 12:30:45 GMT"));
    }

    #[test]
    fn building_twice_is_identical() {
        let msg = message();
        let builder = HeaderBuilder::default();
        let date = fixed_date();
        assert_eq!(builder.build(&msg, date), builder.build(&msg, date));
    }

    #[test]
    fn mandatory_headers_override_custom_values() {
        let mut msg = message();
        msg.headers.set(headers::AS2_FROM, "Spoofed");
        msg.headers.set("X-Custom", "kept");
        let map = HeaderBuilder::default().build(&msg, fixed_date());
        assert_eq!(map.get(headers::AS2_FROM), Some("MyCompany"));
        assert_eq!(map.get("X-Custom"), Some("kept"));
    }

    #[test]
    fn mdn_headers_follow_partnership() {
        let mut msg = message();
        msg.partnership.receipt_delivery_option =
            Some("http://mycompany.example/mdn".into());
        let map = HeaderBuilder::default().build(&msg, fixed_date());
        assert_eq!(
            map.get(headers::DISPOSITION_NOTIFICATION_TO),
            Some("edi@mycompany.example")
        );
        assert_eq!(
            map.get(headers::RECEIPT_DELIVERY_OPTION),
            Some("http://mycompany.example/mdn")
        );

        msg.partnership.mdn_to = None;
        msg.partnership.mdn_options = None;
        msg.partnership.receipt_delivery_option = None;
        let map = HeaderBuilder::default().build(&msg, fixed_date());
        assert!(!map.contains(headers::DISPOSITION_NOTIFICATION_TO));
        assert!(!map.contains(headers::DISPOSITION_NOTIFICATION_OPTIONS));
        assert!(!map.contains(headers::RECEIPT_DELIVERY_OPTION));
    }

    #[test]
    fn identifiers_with_specials_are_quoted_without_the_flag() {
        let mut msg = message();
        msg.partnership.sender_as2_id = "My Company".into();
        let map = HeaderBuilder::default().build(&msg, fixed_date());
        assert_eq!(map.get(headers::AS2_FROM), Some("\"My Company\""));
        // Plain identifiers stay bare.
        assert_eq!(map.get(headers::AS2_TO), Some("PartnerCo"));
    }

    #[test]
    fn quote_flag_quotes_everything() {
        let builder = HeaderBuilder {
            quote_header_values: true,
            ..HeaderBuilder::default()
        };
        let map = builder.build(&message(), fixed_date());
        assert_eq!(map.get(headers::AS2_FROM), Some("\"MyCompany\""));
        assert_eq!(map.get(headers::SUBJECT), Some("\"Invoice 42\""));
    }

    #[test]
    fn quoting_escapes_embedded_quotes() {
        assert_eq!(quote("a\"b"), "\"a\\\"b\"");
        assert_eq!(identifier("say \"hi"), "\"say \\\"hi\"");
    }

    #[test]
    fn quoting_never_doubles_up() {
        assert_eq!(quote("\"already quoted\""), "\"already quoted\"");

        let builder = HeaderBuilder {
            quote_header_values: true,
            ..HeaderBuilder::default()
        };
        let mut msg = message();
        msg.partnership.sender_as2_id = "My Company".into();
        let map = builder.build(&msg, fixed_date());
        assert_eq!(map.get(headers::AS2_FROM), Some("\"My Company\""));
    }

    #[test]
    fn content_disposition_is_conditional() {
        let mut msg = message();
        let map = HeaderBuilder::default().build(&msg, fixed_date());
        assert!(!map.contains(headers::CONTENT_DISPOSITION));

        msg.content_disposition = Some("attachment; filename=\"invoice.edi\"".into());
        let map = HeaderBuilder::default().build(&msg, fixed_date());
        assert_eq!(
            map.get(headers::CONTENT_DISPOSITION),
            Some("attachment; filename=\"invoice.edi\"")
        );
    }
}
