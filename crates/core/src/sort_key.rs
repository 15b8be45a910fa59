use std::cmp::Ordering;
use std::net::IpAddr;

use crate::natsort::NaturalKey;
use crate::value::Value;

/// Comparable value produced by a column's sort projection.
#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Natural(NaturalKey),
    Bytes(Vec<u8>),
    Tuple(Vec<SortKey>),
}

impl SortKey {
    pub fn natural(text: &str) -> Self {
        SortKey::Natural(NaturalKey::new(text))
    }

    pub fn tuple(parts: impl IntoIterator<Item = SortKey>) -> Self {
        SortKey::Tuple(parts.into_iter().collect())
    }

    /// Compare two keys, or `None` when they are of incompatible kinds.
    ///
    /// Integers and floats compare numerically; tuples compare element-wise
    /// from the left, a shorter prefix ordering first. A NaN float is
    /// incomparable.
    pub fn try_cmp(&self, other: &SortKey) -> Option<Ordering> {
        use SortKey::*;
        match (self, other) {
            (Null, Null) => Some(Ordering::Equal),
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Int(a), Float(b)) => (*a as f64).partial_cmp(b),
            (Float(a), Int(b)) => a.partial_cmp(&(*b as f64)),
            (Text(a), Text(b)) => Some(a.cmp(b)),
            (Natural(a), Natural(b)) => Some(a.cmp(b)),
            (Text(a), Natural(b)) => Some(NaturalKey::new(a).cmp(b)),
            (Natural(a), Text(b)) => Some(a.cmp(&NaturalKey::new(b))),
            (Bytes(a), Bytes(b)) => Some(a.cmp(b)),
            (Tuple(a), Tuple(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.try_cmp(y)? {
                        Ordering::Equal => continue,
                        unequal => return Some(unequal),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }
}

impl From<&Value> for SortKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => SortKey::Null,
            Value::Bool(b) => SortKey::Bool(*b),
            Value::Int(i) => SortKey::Int(*i),
            Value::Float(f) => SortKey::Float(*f),
            Value::Str(s) => SortKey::Text(s.clone()),
            Value::List(items) => SortKey::Tuple(items.iter().map(SortKey::from).collect()),
            Value::Map(_) => SortKey::Null,
        }
    }
}

/// Sort key for a peer address such as `10.0.0.2:6881` or `[::1]:51413`.
///
/// IPv4 addresses are mapped into IPv6 so both families order together; the
/// port compares numerically. Anything unparsable sorts as plain text.
pub fn peer_address_key(address: &str) -> SortKey {
    let Some((host, port)) = address.rsplit_once(':') else {
        return SortKey::Text(address.to_string());
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let (Ok(ip), Ok(port)) = (host.parse::<IpAddr>(), port.parse::<u16>()) else {
        return SortKey::Text(address.to_string());
    };
    let octets = match ip {
        IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
        IpAddr::V6(v6) => v6.octets(),
    };
    SortKey::tuple([SortKey::Bytes(octets.to_vec()), SortKey::Int(port as i64)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_numeric_kinds_compare() {
        assert_eq!(SortKey::Int(2).try_cmp(&SortKey::Float(2.5)), Some(Ordering::Less));
    }

    #[test]
    fn test_heterogeneous_kinds_are_incomparable() {
        assert_eq!(SortKey::Int(1).try_cmp(&SortKey::Text("1".into())), None);
        let a = SortKey::tuple([SortKey::Int(1), SortKey::Text("x".into())]);
        let b = SortKey::tuple([SortKey::Int(1), SortKey::Bool(true)]);
        assert_eq!(a.try_cmp(&b), None);
    }

    #[test]
    fn test_peer_addresses_order_numerically() {
        let a = peer_address_key("10.0.0.9:6881");
        let b = peer_address_key("10.0.0.10:6881");
        assert_eq!(a.try_cmp(&b), Some(Ordering::Less));
        let v6 = peer_address_key("[::1]:51413");
        assert!(matches!(v6, SortKey::Tuple(_)));
    }
}
