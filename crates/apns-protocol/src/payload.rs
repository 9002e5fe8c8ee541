//! Notification payload model and its JSON document.
//!
//! The document is `{"aps": {...}, <custom fields>...}`. Key order is fixed:
//! `aps` first, then custom fields in insertion order. Inside `aps` the order
//! is `alert`, `badge`, `sound`; inside an alert dictionary it is `loc-key`,
//! `loc-args`, `body`, `action-loc-key`.

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use serde_json::Value;

use crate::error::ProtocolError;

/// Top-level key reserved for the system dictionary.
pub const APS_KEY: &str = "aps";

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Alert
// ─────────────────────────────────────────────────────────────────────────────

/// Alert portion of a notification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Alert {
    /// Body text
    pub body: Option<String>,
    /// Localization key of the action button
    pub action_localized_key: Option<String>,
    /// Localization key of the alert message
    pub localized_key: Option<String>,
    /// Arguments substituted into the localized message, in order
    pub localized_args: Vec<Value>,
}

impl Alert {
    /// Plain alert with only body text.
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            ..Self::default()
        }
    }

    /// Alert driven by a localization key.
    pub fn localized(key: impl Into<String>) -> Self {
        Self {
            localized_key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn add_localized_args<I, V>(&mut self, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.localized_args.extend(values.into_iter().map(Into::into));
    }

    /// True when no field is set; an empty alert is left out of the document.
    pub fn is_empty(&self) -> bool {
        non_empty(&self.body).is_none()
            && non_empty(&self.action_localized_key).is_none()
            && non_empty(&self.localized_key).is_none()
            && self.localized_args.is_empty()
    }

    fn to_field(&self) -> Option<AlertField<'_>> {
        if self.is_empty() {
            return None;
        }
        let body = non_empty(&self.body);
        let loc_key = non_empty(&self.localized_key);
        let action_loc_key = non_empty(&self.action_localized_key);

        let body_only =
            loc_key.is_none() && action_loc_key.is_none() && self.localized_args.is_empty();
        match body {
            Some(text) if body_only => Some(AlertField::Plain(text)),
            _ => Some(AlertField::Dictionary(AlertDictionary {
                loc_key,
                loc_args: &self.localized_args,
                body,
                action_loc_key,
            })),
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum AlertField<'a> {
    Plain(&'a str),
    Dictionary(AlertDictionary<'a>),
}

#[derive(Serialize)]
struct AlertDictionary<'a> {
    #[serde(rename = "loc-key", skip_serializing_if = "Option::is_none")]
    loc_key: Option<&'a str>,
    #[serde(rename = "loc-args", skip_serializing_if = "<[Value]>::is_empty")]
    loc_args: &'a [Value],
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(rename = "action-loc-key", skip_serializing_if = "Option::is_none")]
    action_loc_key: Option<&'a str>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Custom fields
// ─────────────────────────────────────────────────────────────────────────────

/// Application-defined top-level fields, kept in insertion order.
///
/// Each key maps to one or more values: a single value is written as a
/// scalar, several values as an array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomFields {
    entries: Vec<(String, Vec<Value>)>,
}

impl CustomFields {
    fn insert(&mut self, key: String, values: Vec<Value>) -> Result<(), ProtocolError> {
        if values.is_empty() {
            return Err(ProtocolError::invalid_argument(format!(
                "custom field '{key}' needs at least one value"
            )));
        }
        if key == APS_KEY {
            return Err(ProtocolError::invalid_argument(
                "custom field name 'aps' is reserved",
            ));
        }
        if self.get(&key).is_some() {
            return Err(ProtocolError::invalid_argument(format!(
                "custom field '{key}' already present"
            )));
        }
        self.entries.push((key, values));
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&[Value]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for CustomFields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, values) in &self.entries {
            match values.as_slice() {
                [single] => map.serialize_entry(key, single)?,
                many => map.serialize_entry(key, many)?,
            }
        }
        map.end()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payload
// ─────────────────────────────────────────────────────────────────────────────

/// One notification addressed to one device.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    /// 64-character hex device token
    pub device_token: String,
    pub alert: Alert,
    pub badge: Option<u32>,
    pub sound: Option<String>,
    custom: CustomFields,
}

#[derive(Serialize)]
struct Document<'a> {
    aps: Aps<'a>,
    #[serde(flatten)]
    custom: &'a CustomFields,
}

#[derive(Serialize)]
struct Aps<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    alert: Option<AlertField<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    badge: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sound: Option<&'a str>,
}

impl Payload {
    /// Payload with no alert, badge, or sound.
    pub fn new(device_token: impl Into<String>) -> Self {
        Self {
            device_token: device_token.into(),
            alert: Alert::default(),
            badge: None,
            sound: None,
            custom: CustomFields::default(),
        }
    }

    /// Payload with a plain body alert.
    pub fn with_alert(device_token: impl Into<String>, body: impl Into<String>) -> Self {
        let mut payload = Self::new(device_token);
        payload.alert = Alert::new(body);
        payload
    }

    pub fn badge(mut self, badge: u32) -> Self {
        self.badge = Some(badge);
        self
    }

    pub fn sound(mut self, sound: impl Into<String>) -> Self {
        self.sound = Some(sound.into());
        self
    }

    /// Add a top-level custom field. Fails on an empty value list, a
    /// duplicate key, or the reserved `aps` key.
    pub fn add_custom<I, V>(
        &mut self,
        key: impl Into<String>,
        values: I,
    ) -> Result<(), ProtocolError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.custom
            .insert(key.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn custom_fields(&self) -> &CustomFields {
        &self.custom
    }

    /// Compact JSON document. Non-ASCII characters are written as `\uXXXX`
    /// escapes so the text is pure ASCII.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        let document = Document {
            aps: Aps {
                alert: self.alert.to_field(),
                badge: self.badge,
                sound: non_empty(&self.sound),
            },
            custom: &self.custom,
        };
        let raw = serde_json::to_string(&document)
            .map_err(|e| ProtocolError::encoding(format!("payload JSON: {e}")))?;
        Ok(escape_non_ascii(&raw))
    }
}

fn escape_non_ascii(raw: &str) -> String {
    if raw.is_ascii() {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len() + 16);
    let mut units = [0u16; 2];
    for ch in raw.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            for unit in ch.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    out
}
