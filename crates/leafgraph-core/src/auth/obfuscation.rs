//! Storage obfuscation for values written to durable storage.
//!
//! This is NOT encryption. Each character is XORed with a fixed key that
//! ships with the client, so anyone holding the binary can reverse it. It
//! only keeps refresh tokens and session descriptors from being readable
//! at a glance in the storage file. Nothing may rely on it for
//! confidentiality.

/// Fixed client-side obfuscation key. Changing it orphans previously stored
/// values, which the token store then treats as corrupt and wipes.
pub const OBFUSCATION_KEY: &str = "leafgraph_storage_obfuscation";

/// Obfuscate a value for storage.
pub fn obfuscate(text: &str) -> String {
    obfuscate_with_key(text, OBFUSCATION_KEY)
}

/// Reverse `obfuscate`. The transform is an involution, so this is the same
/// operation; the separate name keeps call sites readable.
pub fn reveal(text: &str) -> String {
    obfuscate_with_key(text, OBFUSCATION_KEY)
}

/// XOR every character with the repeating key.
///
/// The key must be ASCII: flipping only the low seven bits of a Unicode
/// scalar can neither land in the surrogate range nor exceed `char::MAX`,
/// which makes the transform total over all strings.
pub(crate) fn obfuscate_with_key(text: &str, key: &str) -> String {
    debug_assert!(key.is_ascii() && !key.is_empty());
    let key = key.as_bytes();
    text.chars()
        .enumerate()
        .map(|(i, c)| {
            let k = u32::from(key[i % key.len()]);
            char::from_u32(u32::from(c) ^ k).unwrap_or(c)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[&str] = &[
        "",
        "r-1",
        "eyJhbGciOiJIUzI1NiJ9.eyJleHAiOjE3MDAwMDAwMDB9.sig",
        "{\"userId\":\"1\",\"username\":\"admin\"}",
        "ünïcödé ✓ 日本語 🦀",
        "\u{7f}\u{0}\u{1}control",
        "\u{d7ff}\u{e000}\u{10ffff}",
    ];

    #[test]
    fn test_storage_obfuscation_round_trip() {
        for sample in SAMPLES {
            assert_eq!(reveal(&obfuscate(sample)), *sample);
            assert_eq!(obfuscate(&reveal(sample)), *sample);
        }
    }

    #[test]
    fn test_storage_obfuscation_hides_plaintext() {
        let hidden = obfuscate("refresh-token-value");
        assert_ne!(hidden, "refresh-token-value");
        assert!(!hidden.contains("refresh"));
        assert_eq!(hidden.chars().count(), "refresh-token-value".chars().count());
    }

    #[test]
    fn test_storage_obfuscation_wrong_key_garbles() {
        let hidden = obfuscate_with_key("refresh-token-value", "other_key");
        assert_ne!(reveal(&hidden), "refresh-token-value");
    }

    #[test]
    fn test_storage_obfuscation_total_over_scalar_boundaries() {
        // Every scalar next to the surrogate gap and at the top of the range
        // must survive.
        let edges: String = ['\u{d7ff}', '\u{d780}', '\u{e000}', '\u{e07f}', '\u{10ff80}', '\u{10ffff}']
            .iter()
            .collect();
        assert_eq!(reveal(&obfuscate(&edges)), edges);
    }
}
