//! Source-address hashing for sticky routing.

use std::net::IpAddr;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 16_777_619;

/// 32-bit FNV-1a over an arbitrary byte slice.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(FNV_OFFSET_BASIS, |hash, byte| {
            (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME)
        })
}

/// Sticky-table key for a client address: FNV-1a of the textual IP (port
/// stripped), rendered in decimal.
///
/// The choice of hash and rendering is contractual: the same IP must map to
/// the same key across restarts, since operators may persist or compare
/// keys out of band.
pub fn source_key(ip: &IpAddr) -> String {
    fnv1a_32(ip.to_string().as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a_reference_vectors() {
        // Published FNV-1a 32-bit test vectors.
        assert_eq!(fnv1a_32(b""), 0x811c_9dc5);
        assert_eq!(fnv1a_32(b"a"), 0xe40c_292c);
        assert_eq!(fnv1a_32(b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn test_source_key_is_pure() {
        let ip: IpAddr = "192.168.1.100".parse().unwrap();
        assert_eq!(source_key(&ip), source_key(&ip));
    }

    #[test]
    fn test_source_key_is_decimal() {
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        let key = source_key(&ip);
        assert!(key.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(key, fnv1a_32(b"127.0.0.1").to_string());
    }

    #[test]
    fn test_source_key_distinguishes_ips() {
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();
        assert_ne!(source_key(&a), source_key(&b));
    }
}
