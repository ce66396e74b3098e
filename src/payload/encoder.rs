use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use super::{ContentIntent, Payload, WifiEncryption};

/// Bytes left untouched by URI-component encoding: `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
pub(crate) const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Maps an intent to its canonical payload. Pure and total.
pub fn encode(intent: &ContentIntent) -> Payload {
    let data = match intent {
        ContentIntent::Link { url } => url.clone(),
        ContentIntent::FreeText { text } => text.clone(),
        ContentIntent::WifiCredential {
            ssid,
            password,
            encryption,
        } => match encryption {
            WifiEncryption::None => format!("WIFI:T:nopass;S:{ssid};;"),
            WifiEncryption::Wpa | WifiEncryption::Wep => {
                format!("WIFI:T:{};S:{ssid};P:{password};;", encryption.token())
            }
        },
        ContentIntent::EmailMessage { to, subject, body } => format!(
            "mailto:{to}?subject={}&body={}",
            encode_uri_component(subject),
            encode_uri_component(body)
        ),
        ContentIntent::PhoneNumber { number } => format!("tel:{number}"),
    };
    Payload::from(data)
}

pub fn encode_uri_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}
