//! Typed connection settings.
//!
//! NetworkManager exchanges connection profiles as `a{sa{sv}}` dictionaries.
//! Controllers work on [`Settings`], a map of [`SettingValue`]s, and the
//! conversion to and from `zvariant` values happens only at the zbus boundary.
//! Values the controllers never edit are kept as [`SettingValue::Raw`] and
//! written back untouched.

use std::collections::HashMap;
use std::sync::Arc;

use zvariant::{OwnedValue, Value};

/// A profile: section name to key to value.
pub type Settings = HashMap<String, HashMap<String, SettingValue>>;

/// A profile in the shape zbus sends and receives.
pub(crate) type DbusSettings = HashMap<String, HashMap<String, OwnedValue>>;

/// One value inside a settings section.
#[derive(Debug, Clone)]
pub enum SettingValue {
    Str(String),
    Bool(bool),
    U8(u8),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    /// `ay`, used for SSIDs and certificate paths.
    Bytes(Vec<u8>),
    /// `as`, e.g. `802-1x.eap`.
    StrList(Vec<String>),
    /// `a{ss}`, e.g. `vpn.data` and `vpn.secrets`.
    StrMap(HashMap<String, String>),
    /// Anything else, passed through unchanged.
    Raw(Arc<OwnedValue>),
}

impl PartialEq for SettingValue {
    fn eq(&self, other: &Self) -> bool {
        use SettingValue::*;
        match (self, other) {
            (Str(a), Str(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (U8(a), U8(b)) => a == b,
            (U32(a), U32(b)) => a == b,
            (I32(a), I32(b)) => a == b,
            (U64(a), U64(b)) => a == b,
            (I64(a), I64(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (StrList(a), StrList(b)) => a == b,
            (StrMap(a), StrMap(b)) => a == b,
            (Raw(a), Raw(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl SettingValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view for any of the integer variants that fits in a `u32`.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::U8(n) => Some(u32::from(*n)),
            Self::U32(n) => Some(*n),
            Self::I32(n) => u32::try_from(*n).ok(),
            Self::U64(n) => u32::try_from(*n).ok(),
            Self::I64(n) => u32::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str_map(&self) -> Option<&HashMap<String, String>> {
        match self {
            Self::StrMap(m) => Some(m),
            _ => None,
        }
    }

    /// Converts a value received from the bus.
    pub(crate) fn from_owned(value: OwnedValue) -> Self {
        match &*value {
            Value::Str(s) => return Self::Str(s.to_string()),
            Value::Bool(b) => return Self::Bool(*b),
            Value::U8(n) => return Self::U8(*n),
            Value::U32(n) => return Self::U32(*n),
            Value::I32(n) => return Self::I32(*n),
            Value::U64(n) => return Self::U64(*n),
            Value::I64(n) => return Self::I64(*n),
            Value::ObjectPath(p) => return Self::Str(p.to_string()),
            _ => {}
        }

        let signature = value.value_signature().to_string();
        let copy = match value.try_clone() {
            Ok(copy) => copy,
            Err(_) => return Self::Raw(Arc::new(value)),
        };
        let converted = match signature.as_str() {
            "ay" => Vec::<u8>::try_from(copy).ok().map(Self::Bytes),
            "as" => Vec::<String>::try_from(copy).ok().map(Self::StrList),
            "a{ss}" => HashMap::<String, String>::try_from(copy)
                .ok()
                .map(Self::StrMap),
            _ => None,
        };
        converted.unwrap_or_else(|| Self::Raw(Arc::new(value)))
    }

    /// Converts a borrowed value, as found in `PropertiesChanged` payloads.
    pub(crate) fn from_value(value: &Value<'_>) -> Option<Self> {
        value.try_to_owned().ok().map(Self::from_owned)
    }

    /// Converts the value into the form sent on the bus.
    pub(crate) fn to_owned_value(&self) -> zvariant::Result<OwnedValue> {
        match self {
            Self::Str(s) => OwnedValue::try_from(Value::from(s.clone())),
            Self::Bool(b) => OwnedValue::try_from(Value::from(*b)),
            Self::U8(n) => OwnedValue::try_from(Value::from(*n)),
            Self::U32(n) => OwnedValue::try_from(Value::from(*n)),
            Self::I32(n) => OwnedValue::try_from(Value::from(*n)),
            Self::U64(n) => OwnedValue::try_from(Value::from(*n)),
            Self::I64(n) => OwnedValue::try_from(Value::from(*n)),
            Self::Bytes(b) => OwnedValue::try_from(Value::from(b.clone())),
            Self::StrList(l) => OwnedValue::try_from(Value::from(l.clone())),
            Self::StrMap(m) => OwnedValue::try_from(Value::from(m.clone())),
            Self::Raw(v) => v.try_clone(),
        }
    }
}

impl From<&str> for SettingValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<bool> for SettingValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<u32> for SettingValue {
    fn from(n: u32) -> Self {
        Self::U32(n)
    }
}

impl From<i32> for SettingValue {
    fn from(n: i32) -> Self {
        Self::I32(n)
    }
}

impl From<Vec<u8>> for SettingValue {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<Vec<String>> for SettingValue {
    fn from(l: Vec<String>) -> Self {
        Self::StrList(l)
    }
}

impl From<HashMap<String, String>> for SettingValue {
    fn from(m: HashMap<String, String>) -> Self {
        Self::StrMap(m)
    }
}

pub(crate) fn settings_from_dbus(raw: DbusSettings) -> Settings {
    raw.into_iter()
        .map(|(section, keys)| {
            let keys = keys
                .into_iter()
                .map(|(k, v)| (k, SettingValue::from_owned(v)))
                .collect();
            (section, keys)
        })
        .collect()
}

pub(crate) fn settings_to_dbus(settings: &Settings) -> zvariant::Result<DbusSettings> {
    let mut out = HashMap::with_capacity(settings.len());
    for (section, keys) in settings {
        let mut converted = HashMap::with_capacity(keys.len());
        for (k, v) in keys {
            converted.insert(k.clone(), v.to_owned_value()?);
        }
        out.insert(section.clone(), converted);
    }
    Ok(out)
}

/// Looks up `section.key`.
pub fn setting<'a>(settings: &'a Settings, section: &str, key: &str) -> Option<&'a SettingValue> {
    settings.get(section)?.get(key)
}

/// Looks up `section.key` as a string, empty when absent.
pub fn setting_str<'a>(settings: &'a Settings, section: &str, key: &str) -> &'a str {
    setting(settings, section, key)
        .and_then(SettingValue::as_str)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_match_their_variant_only() {
        assert_eq!(SettingValue::from("x").as_str(), Some("x"));
        assert_eq!(SettingValue::from(true).as_str(), None);
        assert_eq!(SettingValue::I32(3).as_u32(), Some(3));
        assert_eq!(SettingValue::I32(-1).as_u32(), None);
        assert_eq!(SettingValue::U8(7).as_u32(), Some(7));
        assert_eq!(SettingValue::from(vec![1u8, 2]).as_bytes(), Some(&[1u8, 2][..]));
    }

    #[test]
    fn basic_values_survive_the_bus_boundary() {
        let values = [
            SettingValue::from("home"),
            SettingValue::from(false),
            SettingValue::from(42u32),
            SettingValue::from(-4i32),
            SettingValue::from(b"ssid".to_vec()),
            SettingValue::from(vec!["peap".to_string()]),
        ];
        for v in values {
            let owned = v.to_owned_value().unwrap();
            assert_eq!(SettingValue::from_owned(owned), v);
        }
    }

    #[test]
    fn string_maps_survive_the_bus_boundary() {
        let mut data = HashMap::new();
        data.insert("remote".to_string(), "vpn.example.com".to_string());
        let v = SettingValue::from(data.clone());
        let back = SettingValue::from_owned(v.to_owned_value().unwrap());
        assert_eq!(back.as_str_map(), Some(&data));
    }

    #[test]
    fn setting_str_defaults_to_empty() {
        let mut settings = Settings::new();
        settings
            .entry("connection".into())
            .or_default()
            .insert("id".into(), "Work".into());
        assert_eq!(setting_str(&settings, "connection", "id"), "Work");
        assert_eq!(setting_str(&settings, "connection", "uuid"), "");
        assert_eq!(setting_str(&settings, "vpn", "id"), "");
    }
}
