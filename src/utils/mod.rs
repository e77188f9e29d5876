use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;
use std::net::Ipv4Addr;

/// Validate an IPv4 address (e.g., "192.168.1.1").
/// Returns true if the string is a valid dotted-decimal IPv4 address.
pub fn is_valid_ipv4(ip: &str) -> bool {
    let parts: Vec<&str> = ip.split('.').collect();
    if parts.len() != 4 {
        return false;
    }
    parts.iter().all(|p| p.parse::<u8>().is_ok())
}

/// An IPv4 network in CIDR form. Host bits must be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Subnet {
    pub network: Ipv4Addr,
    pub prefix_len: u8,
}

impl Ipv4Subnet {
    pub fn parse(raw: &str) -> Option<Self> {
        let (addr, len) = raw.trim().split_once('/')?;
        if !is_valid_ipv4(addr) {
            return None;
        }
        let network: Ipv4Addr = addr.parse().ok()?;
        let prefix_len: u8 = len.parse().ok()?;
        if prefix_len > 32 {
            return None;
        }
        let mask = u32::MAX.checked_shl(32 - prefix_len as u32).unwrap_or(0);
        if u32::from(network) & !mask != 0 {
            return None;
        }
        Some(Self { network, prefix_len })
    }
}

impl fmt::Display for Ipv4Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

/// Normalize a list argument that may arrive as a real list, a JSON-encoded
/// list inside a string, or a bare string meaning a one-element list.
pub fn normalize_list_param(value: &Value, param: &str) -> Option<Vec<String>> {
    match value {
        Value::Null => None,
        Value::Array(items) => Some(items.iter().map(value_to_string).collect()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => {
                tracing::debug!("{} was a JSON-encoded list with {} items", param, items.len());
                Some(items.iter().map(value_to_string).collect())
            }
            _ => Some(vec![s.clone()]),
        },
        other => {
            tracing::warn!("{} has unexpected type, ignoring: {}", param, other);
            None
        }
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Serde adapter for [`normalize_list_param`]; absent or null gives an empty list
pub fn lenient_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let raw = Value::deserialize(d)?;
    match &raw {
        Value::Null | Value::Array(_) | Value::String(_) => {
            Ok(normalize_list_param(&raw, "list").unwrap_or_default())
        }
        other => Err(serde::de::Error::custom(format!(
            "expected a list of strings, got {}",
            other
        ))),
    }
}
