//! Channel-name canonicalization and segment-key derivation.
//!
//! Both halves are an external contract with existing producer
//! processes and must not be modernized.

/// Maximum canonical name length in bytes, leading separator included.
pub const MAX_NAME_LEN: usize = 14;

/// Polynomial constant folded into every byte of the key hash.
const POLYNOMIAL: i32 = 0x04C1_1DB7;

/// Canonicalize a channel name for semaphore lookup: prefix with `/`,
/// neutralize embedded separators, truncate to [`MAX_NAME_LEN`].
///
/// Names arrive off the wire and may be any UTF-8; the cut backs up to
/// the nearest char boundary so a multi-byte character straddling the
/// limit is dropped whole.
pub fn canonical_name(name: &str) -> String {
    let mut canonical = String::with_capacity(MAX_NAME_LEN);
    canonical.push('/');
    canonical.push_str(&name.replace('/', "_"));

    let mut cut = MAX_NAME_LEN.min(canonical.len());
    while !canonical.is_char_boundary(cut) {
        cut -= 1;
    }
    canonical.truncate(cut);
    canonical
}

/// Derive the shared-memory key from a canonical name.
///
/// This is a plain XOR fold of each byte against the CRC-32 polynomial
/// constant, not a real CRC-32. Producers key their segments with
/// exactly this function, so it is preserved bit-for-bit.
pub fn segment_key(canonical: &str) -> i32 {
    let mut key = 0i32;
    for byte in canonical.bytes() {
        key ^= i32::from(byte) ^ POLYNOMIAL;
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_name_is_prefixed() {
        assert_eq!(canonical_name("cam0"), "/cam0");
    }

    #[test]
    fn embedded_separators_are_neutralized() {
        assert_eq!(canonical_name("front/left"), "/front_left");
    }

    #[test]
    fn long_names_truncate_to_the_limit() {
        let canonical = canonical_name("a-rather-long-channel-name");
        assert_eq!(canonical.len(), MAX_NAME_LEN);
        assert_eq!(canonical, "/a-rather-long");
    }

    #[test]
    fn multibyte_char_straddling_the_limit_is_dropped_whole() {
        // Byte 14 lands inside the two-byte "\u{e9}"; the cut must back
        // up instead of splitting the character.
        let canonical = canonical_name("aaaaaaaaaaaa\u{e9}camera");
        assert_eq!(canonical, "/aaaaaaaaaaaa");
        assert!(canonical.len() <= MAX_NAME_LEN);

        // A name that fits entirely is untouched.
        assert_eq!(canonical_name("cam\u{e9}ra"), "/cam\u{e9}ra");
    }

    #[test]
    fn wide_characters_never_split() {
        // Four-byte scalar values stress the boundary walk.
        let canonical = canonical_name("\u{1F4F7}\u{1F4F7}\u{1F4F7}\u{1F4F7}");
        assert!(canonical.len() <= MAX_NAME_LEN);
        assert!(canonical.is_char_boundary(canonical.len()));
        assert_eq!(canonical, "/\u{1F4F7}\u{1F4F7}\u{1F4F7}");
    }

    #[test]
    fn key_fold_matches_known_values() {
        // Computed with the producer-side fold.
        assert_eq!(segment_key(""), 0);
        assert_eq!(segment_key("/"), 0x04C1_1DB7 ^ 0x2F);

        let mut expected = 0i32;
        for b in "/cam0".bytes() {
            expected ^= i32::from(b) ^ 0x04C1_1DB7;
        }
        assert_eq!(segment_key("/cam0"), expected);
    }

    #[test]
    fn fold_is_not_a_table_driven_crc32() {
        // An even-length name folds the polynomial away entirely; a real
        // CRC-32 would never do that.
        let key = segment_key("/a");
        assert_eq!(key, i32::from(b'/') ^ i32::from(b'a'));
    }
}
