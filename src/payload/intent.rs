use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the user wants the code to carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ContentIntent {
    Link {
        url: String,
    },
    FreeText {
        text: String,
    },
    WifiCredential {
        ssid: String,
        password: String,
        encryption: WifiEncryption,
    },
    EmailMessage {
        to: String,
        subject: String,
        body: String,
    },
    PhoneNumber {
        number: String,
    },
}

impl ContentIntent {
    pub fn kind(&self) -> &'static str {
        match self {
            ContentIntent::Link { .. } => "link",
            ContentIntent::FreeText { .. } => "text",
            ContentIntent::WifiCredential { .. } => "wifi",
            ContentIntent::EmailMessage { .. } => "email",
            ContentIntent::PhoneNumber { .. } => "phone",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WifiEncryption {
    Wpa,
    Wep,
    None,
}

impl Default for WifiEncryption {
    fn default() -> Self {
        WifiEncryption::Wpa
    }
}

impl WifiEncryption {
    /// Value of the `T:` field.
    pub fn token(self) -> &'static str {
        match self {
            WifiEncryption::Wpa => "WPA",
            WifiEncryption::Wep => "WEP",
            WifiEncryption::None => "nopass",
        }
    }
}

impl FromStr for WifiEncryption {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "WPA" | "WPA2" | "WPA3" => Ok(WifiEncryption::Wpa),
            "WEP" => Ok(WifiEncryption::Wep),
            "NONE" | "NOPASS" | "" => Ok(WifiEncryption::None),
            _ => Err(format!("unknown wifi encryption '{value}'")),
        }
    }
}

/// The canonical string carried in a code's data region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(String);

impl Payload {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for Payload {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("WPA", WifiEncryption::Wpa; "upper wpa")]
    #[test_case("wpa2", WifiEncryption::Wpa; "wpa2 alias")]
    #[test_case("WEP", WifiEncryption::Wep; "wep")]
    #[test_case("nopass", WifiEncryption::None; "nopass token")]
    #[test_case("none", WifiEncryption::None; "none word")]
    fn parses_encryption_names(raw: &str, expected: WifiEncryption) {
        assert_eq!(raw.parse::<WifiEncryption>().unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_encryption() {
        assert!("SAE-PK".parse::<WifiEncryption>().is_err());
    }

    #[test]
    fn intent_serializes_with_kind_tag() {
        let intent = ContentIntent::PhoneNumber {
            number: "+15551234".into(),
        };
        let json = serde_json::to_value(&intent).unwrap();
        assert_eq!(json["kind"], "phoneNumber");
        assert_eq!(json["number"], "+15551234");
    }
}
