//! Address representation: 20-byte values rendered as 40 lowercase hex
//! characters, plus the two reserved sentinels that are valid wherever an
//! address is required but never correspond to a keypair.

pub const COINBASE: &str = "COINBASE";
pub const GENESIS: &str = "GENESIS";

/// True if `s` is either a reserved sentinel or 40 lowercase hex characters.
pub fn is_valid_address(s: &str) -> bool {
    s == COINBASE || s == GENESIS || is_valid_keyed_address(s)
}

/// True if `s` is a 40 lowercase-hex-character address (excludes the
/// sentinels) — i.e. an address that could back a real keypair.
pub fn is_valid_keyed_address(s: &str) -> bool {
    s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_valid() {
        assert!(is_valid_address(COINBASE));
        assert!(is_valid_address(GENESIS));
        assert!(!is_valid_keyed_address(COINBASE));
    }

    #[test]
    fn forty_hex_chars_is_valid() {
        let addr = "a".repeat(40);
        assert!(is_valid_address(&addr));
        assert!(is_valid_keyed_address(&addr));
    }

    #[test]
    fn wrong_length_or_uppercase_is_invalid() {
        assert!(!is_valid_address(&"a".repeat(39)));
        assert!(!is_valid_address(&"A".repeat(40)));
        assert!(!is_valid_address("not-hex-at-all-not-hex-at-all-not-hex!!"));
    }
}
