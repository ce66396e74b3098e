//! Recovers a [`ContentIntent`] from a decoded payload so a scan result can be
//! shown as what it is (network, email draft, phone number, link) instead of a
//! raw string.

use percent_encoding::percent_decode_str;

use super::{ContentIntent, Payload, WifiEncryption};

impl ContentIntent {
    /// Classifies a payload. Never fails: anything unrecognised is `FreeText`.
    pub fn parse(payload: &Payload) -> ContentIntent {
        let raw = payload.as_str();

        if let Some(rest) = strip_prefix_ignore_case(raw, "WIFI:") {
            if let Some(intent) = parse_wifi(rest) {
                return intent;
            }
        } else if let Some(rest) = strip_prefix_ignore_case(raw, "mailto:") {
            return parse_mailto(rest);
        } else if let Some(rest) = strip_prefix_ignore_case(raw, "tel:") {
            return ContentIntent::PhoneNumber {
                number: rest.to_string(),
            };
        } else if strip_prefix_ignore_case(raw, "http://").is_some()
            || strip_prefix_ignore_case(raw, "https://").is_some()
        {
            return ContentIntent::Link {
                url: raw.to_string(),
            };
        }

        ContentIntent::FreeText {
            text: raw.to_string(),
        }
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&value[prefix.len()..])
    } else {
        None
    }
}

fn parse_wifi(body: &str) -> Option<ContentIntent> {
    let mut ssid = None;
    let mut password = String::new();
    let mut encryption = WifiEncryption::None;

    for field in split_unescaped(body) {
        // An empty field is the `;;` terminator.
        if field.is_empty() {
            break;
        }
        let (key, value) = field.split_once(':')?;
        match key {
            "T" => encryption = value.parse().ok()?,
            "S" => ssid = Some(value.to_string()),
            "P" => password = value.to_string(),
            _ => {}
        }
    }

    if encryption == WifiEncryption::None {
        password.clear();
    }

    Some(ContentIntent::WifiCredential {
        ssid: ssid?,
        password,
        encryption,
    })
}

/// Splits on `;` while honouring backslash escapes written by other generators.
fn split_unescaped(body: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = body.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            ';' => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    if !current.is_empty() {
        fields.push(current);
    }
    fields
}

fn parse_mailto(rest: &str) -> ContentIntent {
    let (to, query) = rest.split_once('?').unwrap_or((rest, ""));
    let mut subject = String::new();
    let mut body = String::new();

    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let decoded = percent_decode_str(value).decode_utf8_lossy().into_owned();
        match key.to_ascii_lowercase().as_str() {
            "subject" => subject = decoded,
            "body" => body = decoded,
            _ => {}
        }
    }

    ContentIntent::EmailMessage {
        to: to.to_string(),
        subject,
        body,
    }
}
