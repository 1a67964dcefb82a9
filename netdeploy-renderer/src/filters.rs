//! IPv4 helper filters registered on every template.
//!
//! ```text
//! {{ 24 | subnet_mask }}                          -> 255.255.255.0
//! {{ 24 | wildcard_mask }}                        -> 0.0.0.255
//! {{ "192.168.10.77" | ipv4_network(prefix=24) }} -> 192.168.10.0
//! {{ "192.168.10.77/26" | ipv4_network }}         -> 192.168.10.64
//! ```
//!
//! Bad input is a render error. A config line with a made-up mask is worse
//! than no config.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use tera::{Tera, Value};

pub fn register(tera: &mut Tera) {
    tera.register_filter("subnet_mask", subnet_mask);
    tera.register_filter("wildcard_mask", wildcard_mask);
    tera.register_filter("ipv4_network", ipv4_network);
}

/// Prefix length → dotted netmask.
pub fn subnet_mask(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let prefix = prefix_len(value, "subnet_mask")?;
    Ok(Value::String(mask(prefix).to_string()))
}

/// Prefix length → dotted hostmask (inverted netmask, as used in ACLs and OSPF).
pub fn wildcard_mask(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let prefix = prefix_len(value, "wildcard_mask")?;
    Ok(Value::String((!mask(prefix)).to_string()))
}

/// Address → network address. The prefix comes from `prefix=N` or from a
/// `/N` suffix on the address; the argument wins when both are present.
pub fn ipv4_network(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let text = value
        .as_str()
        .ok_or_else(|| tera::Error::msg(format!("ipv4_network expects a string, got {value}")))?;
    let (addr, suffix) = match text.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (text, None),
    };
    let addr: Ipv4Addr = addr
        .trim()
        .parse()
        .map_err(|_| tera::Error::msg(format!("ipv4_network: '{text}' is not an IPv4 address")))?;
    let prefix = match (args.get("prefix"), suffix) {
        (Some(arg), _) => prefix_len(arg, "ipv4_network")?,
        (None, Some(suffix)) => prefix_len(&Value::String(suffix.to_string()), "ipv4_network")?,
        (None, None) => {
            return Err(tera::Error::msg(
                "ipv4_network needs a prefix: use ipv4_network(prefix=N) or an a.b.c.d/N value",
            ))
        }
    };
    Ok(Value::String((addr & mask(prefix)).to_string()))
}

fn mask(prefix: u8) -> Ipv4Addr {
    let bits = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
    Ipv4Addr::from(bits)
}

/// Accepts `24`, `"24"` and `"/24"`.
fn prefix_len(value: &Value, filter: &str) -> tera::Result<u8> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().trim_start_matches('/').parse::<u64>().ok(),
        _ => None,
    };
    match parsed {
        Some(p) if p <= 32 => Ok(p as u8),
        _ => Err(tera::Error::msg(format!(
            "{filter}: '{value}' is not a prefix length between 0 and 32"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
