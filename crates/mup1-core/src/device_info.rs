//! Device Info: the subset of a board's CORECONF state this core projects
//! into a typed record, kept current by `queryDeviceInfo()`.

use std::{path::PathBuf, time::SystemTime};

use mup1_proto::CborValue;

/// One entry of `ietf-interfaces:interfaces/interface` (RFC 8343).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Interface {
    /// `name` leaf.
    pub name: String,
    /// `type` leaf (an identityref, e.g. `"iana-if-type:ethernetCsmacd"`).
    pub if_type: Option<String>,
    /// `enabled` leaf.
    pub enabled: Option<bool>,
    /// `oper-status` leaf.
    pub oper_status: Option<String>,
}

/// One entry of `ieee802-dot1q-bridge:bridges/bridge`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bridge {
    /// `name` leaf.
    pub name: String,
    /// `address` leaf (bridge MAC address).
    pub address: Option<String>,
    /// Names of this bridge's `component` list entries.
    pub components: Vec<String>,
}

/// The per-device record a [`crate::connection`] maintains, refreshed by
/// `queryDeviceInfo()` and otherwise left untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    /// Serial device path.
    pub path: PathBuf,
    /// Configured baud rate.
    pub baud_rate: u32,
    /// Whether the owning connection is currently Open.
    pub connected: bool,
    /// `ietf-system:system-state/platform`'s `os-name` leaf.
    pub model: Option<String>,
    /// `ietf-system:system-state/platform`'s `os-version` leaf.
    pub firmware: Option<String>,
    /// `ietf-system:system-state/platform`'s `serial-number` leaf.
    pub serial_number: Option<String>,
    /// `ietf-interfaces:interfaces/interface` list.
    pub interfaces: Vec<Interface>,
    /// `ieee802-dot1q-bridge:bridges/bridge` list.
    pub bridges: Vec<Bridge>,
    /// When this record was last refreshed by a successful query.
    pub last_seen: Option<SystemTime>,
}

impl DeviceInfo {
    /// A fresh, disconnected record for `path`.
    #[must_use]
    pub fn new(path: PathBuf, baud_rate: u32) -> Self {
        Self {
            path,
            baud_rate,
            connected: false,
            model: None,
            firmware: None,
            serial_number: None,
            interfaces: Vec::new(),
            bridges: Vec::new(),
            last_seen: None,
        }
    }

    /// Apply a `GET /c?d=a` response tree, projecting the three well-known
    /// YANG subtrees. Missing keys leave the corresponding field(s)
    /// unchanged rather than clearing them.
    pub fn apply_query_response(&mut self, root: &CborValue, now: SystemTime) {
        if let Some(platform) = path(root, &["ietf-system:system-state", "platform"]) {
            if let Some(model) = text_field(platform, "os-name") {
                self.model = Some(model);
            }
            if let Some(firmware) = text_field(platform, "os-version") {
                self.firmware = Some(firmware);
            }
            if let Some(serial_number) = text_field(platform, "serial-number") {
                self.serial_number = Some(serial_number);
            }
        }

        if let Some(interfaces) = path(root, &["ietf-interfaces:interfaces", "interface"]) {
            if let Some(entries) = as_array(interfaces) {
                self.interfaces = entries.iter().filter_map(parse_interface).collect();
            }
        }

        if let Some(bridges) = path(root, &["ieee802-dot1q-bridge:bridges", "bridge"]) {
            if let Some(entries) = as_array(bridges) {
                self.bridges = entries.iter().filter_map(parse_bridge).collect();
            }
        }

        self.last_seen = Some(now);
    }
}

fn parse_interface(entry: &CborValue) -> Option<Interface> {
    let name = text_field(entry, "name")?;
    Some(Interface {
        name,
        if_type: text_field(entry, "type"),
        enabled: bool_field(entry, "enabled"),
        oper_status: text_field(entry, "oper-status"),
    })
}

fn parse_bridge(entry: &CborValue) -> Option<Bridge> {
    let name = text_field(entry, "name")?;
    let components = map_get(entry, "component")
        .and_then(as_array)
        .map(|entries| entries.iter().filter_map(|c| text_field(c, "name")).collect())
        .unwrap_or_default();
    Some(Bridge { name, address: text_field(entry, "address"), components })
}

/// Walk successive map keys, tolerating any missing link by returning
/// `None`.
fn path<'a>(value: &'a CborValue, keys: &[&str]) -> Option<&'a CborValue> {
    keys.iter().try_fold(value, |current, key| map_get(current, key))
}

fn map_get<'a>(value: &'a CborValue, key: &str) -> Option<&'a CborValue> {
    let CborValue::Map(entries) = value else { return None };
    entries.iter().find(|(k, _)| matches!(k, CborValue::Text(t) if t == key)).map(|(_, v)| v)
}

fn as_array(value: &CborValue) -> Option<&Vec<CborValue>> {
    match value {
        CborValue::Array(items) => Some(items),
        _ => None,
    }
}

fn text_field(value: &CborValue, key: &str) -> Option<String> {
    match map_get(value, key) {
        Some(CborValue::Text(text)) => Some(text.clone()),
        _ => None,
    }
}

fn bool_field(value: &CborValue, key: &str) -> Option<bool> {
    match map_get(value, key) {
        Some(CborValue::Bool(b)) => Some(*b),
        _ => None,
    }
}
