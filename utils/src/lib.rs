//! Leverage common functionality across the beacon crates.

use sha2::{Digest, Sha256};

pub mod codec;

/// Converts bytes to a hexadecimal string.
pub fn hex(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes.iter() {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

/// Converts a hexadecimal string to bytes.
pub fn from_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }

    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Converts a hexadecimal string to bytes, stripping whitespace and/or a `0x` prefix.
pub fn from_hex_formatted(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.replace(['\t', '\n', '\r', ' '], "");
    let res = hex.strip_prefix("0x").unwrap_or(&hex);
    from_hex(res)
}

/// Hashes the given bytes using SHA-256.
pub fn hash(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Appends `value` to `buf` as an unsigned LEB128 varint.
fn put_varint(mut value: usize, buf: &mut Vec<u8>) {
    while value >= 0x80 {
        buf.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Concatenates a namespace and a message, prepending a varint encoding of the
/// namespace length.
///
/// Without the length prefix, `(b"ab", b"c")` and `(b"a", b"bc")` would produce
/// the same payload, so a signature made in one namespace could be replayed in
/// another.
pub fn union_unique(namespace: &[u8], msg: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(10 + namespace.len() + msg.len());
    put_varint(namespace.len(), &mut result);
    result.extend_from_slice(namespace);
    result.extend_from_slice(msg);
    result
}

/// Compute the modulo of bytes interpreted as a big-endian integer.
///
/// This function is used to select an entry from an array when the bytes are
/// a random seed.
pub fn modulo(bytes: &[u8], n: u64) -> u64 {
    assert_ne!(n, 0, "modulus must be non-zero");
    let n = n as u128;
    let mut result: u128 = 0;
    for &byte in bytes {
        result = ((result << 8) | (byte as u128)) % n;
    }
    result as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn test_hex() {
        // Test case 0: empty bytes
        let b = &[];
        let h = hex(b);
        assert_eq!(h, "");
        assert_eq!(from_hex(&h).unwrap(), b.to_vec());

        // Test case 1: multiple bytes
        let b = &[0x01, 0x02, 0x03];
        let h = hex(b);
        assert_eq!(h, "010203");
        assert_eq!(from_hex(&h).unwrap(), b.to_vec());

        // Test case 2: odd number of characters
        assert!(from_hex("0102030").is_none());

        // Test case 3: invalid hexadecimal character
        assert!(from_hex("01g3").is_none());
    }

    #[test]
    fn test_from_hex_formatted() {
        let b = vec![0x01, 0x02, 0x03];
        assert_eq!(from_hex_formatted("01 02 03").unwrap(), b);
        assert_eq!(from_hex_formatted("0x010203").unwrap(), b);
        assert_eq!(from_hex_formatted("  \n0x\r\n01\n02\t03\n").unwrap(), b);
    }

    #[test]
    fn test_hash() {
        assert_eq!(
            hex(&hash(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        );
    }

    #[test]
    fn test_union_unique() {
        let a = union_unique(b"ab", b"c");
        let b = union_unique(b"a", b"bc");
        assert_ne!(a, b);
        assert_eq!(a, vec![2, b'a', b'b', b'c']);

        // Long namespaces use a multi-byte prefix
        let namespace = vec![7u8; 300];
        let payload = union_unique(&namespace, b"x");
        assert_eq!(&payload[..2], &[0xac, 0x02]);
        assert_eq!(payload.len(), 2 + 300 + 1);
    }

    #[test]
    fn test_modulo() {
        // Test case 0: empty bytes
        assert_eq!(modulo(&[], 1), 0);

        // Test case 1: single byte
        assert_eq!(modulo(&[0x01], 1), 0);

        // Test case 2: multiple bytes
        assert_eq!(modulo(&[0x01, 0x02, 0x03], 10), 0x010203 % 10);

        // Test case 3: random inputs that fit in a u64
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..100 {
            let value: u64 = rng.gen();
            let n: u64 = rng.gen_range(1..u64::MAX);
            assert_eq!(modulo(&value.to_be_bytes(), n), value % n);
        }
    }

    #[test]
    #[should_panic(expected = "modulus must be non-zero")]
    fn test_modulo_zero() {
        modulo(&[0x01], 0);
    }
}
