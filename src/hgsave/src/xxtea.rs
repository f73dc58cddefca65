//! XXTEA (corrected block TEA) over 32-bit little-endian words.
//!
//! Used only to obfuscate the manifest sidecar. There is no IV and no
//! authentication; identical plaintext and key always give identical output.

const DELTA: u32 = 0x9E37_79B9;

/// 128-bit key as four words
pub type Key = [u32; 4];

#[inline]
fn mx(sum: u32, y: u32, z: u32, p: usize, e: u32, key: &Key) -> u32 {
    (((z >> 5) ^ (y << 2)).wrapping_add((y >> 3) ^ (z << 4)))
        ^ ((sum ^ y).wrapping_add(key[(p & 3) ^ e as usize] ^ z))
}

fn rounds(n: usize) -> u32 {
    // n >= 2 here, so this fits comfortably
    6 + 52 / n as u32
}

/// Encrypt `words` in place. Arrays shorter than two words are left untouched.
pub fn encrypt(words: &mut [u32], key: &Key) {
    let n = words.len();
    if n < 2 {
        return;
    }

    let mut sum: u32 = 0;
    let mut z = words[n - 1];
    for _ in 0..rounds(n) {
        sum = sum.wrapping_add(DELTA);
        let e = (sum >> 2) & 3;
        for p in 0..n - 1 {
            let y = words[p + 1];
            words[p] = words[p].wrapping_add(mx(sum, y, z, p, e, key));
            z = words[p];
        }
        let y = words[0];
        words[n - 1] = words[n - 1].wrapping_add(mx(sum, y, z, n - 1, e, key));
        z = words[n - 1];
    }
}

/// Decrypt `words` in place. Arrays shorter than two words are left untouched.
pub fn decrypt(words: &mut [u32], key: &Key) {
    let n = words.len();
    if n < 2 {
        return;
    }

    let rounds = rounds(n);
    let mut sum = rounds.wrapping_mul(DELTA);
    let mut y = words[0];
    for _ in 0..rounds {
        let e = (sum >> 2) & 3;
        for p in (1..n).rev() {
            let z = words[p - 1];
            words[p] = words[p].wrapping_sub(mx(sum, y, z, p, e, key));
            y = words[p];
        }
        let z = words[n - 1];
        words[0] = words[0].wrapping_sub(mx(sum, y, z, 0, e, key));
        y = words[0];
        sum = sum.wrapping_sub(DELTA);
    }
}

/// Read little-endian words. Trailing bytes that don't fill a word are ignored.
pub fn words_from_bytes(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub fn bytes_from_words(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Build a key from 16 bytes
pub fn key_from_bytes(bytes: &[u8; 16]) -> Key {
    let mut key = [0u32; 4];
    for (slot, chunk) in key.iter_mut().zip(bytes.chunks_exact(4)) {
        *slot = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const KEY: Key = [0x0123_4567, 0x89AB_CDEF, 0xFEDC_BA98, 0x7654_3210];

    #[test]
    fn test_known_vector() {
        // Reference output of the published XXTEA algorithm for an all-zero
        // key and a two-word all-zero block
        let mut words = [0u32, 0];
        encrypt(&mut words, &[0; 4]);
        assert_eq!(words, [0x053704AB, 0x575D8C80]);
    }

    #[test]
    fn test_encrypt_changes_data() {
        let original: Vec<u32> = (0..108).collect();
        let mut words = original.clone();
        encrypt(&mut words, &KEY);
        assert_ne!(words, original);
        decrypt(&mut words, &KEY);
        assert_eq!(words, original);
    }

    #[test]
    fn test_wrong_key_does_not_decrypt() {
        let original = vec![0xEEEE_EEBEu32, 1, 2, 3];
        let mut words = original.clone();
        encrypt(&mut words, &KEY);
        decrypt(&mut words, &[1, 2, 3, 4]);
        assert_ne!(words, original);
    }

    #[test]
    fn test_single_word_untouched() {
        let mut words = [42u32];
        encrypt(&mut words, &KEY);
        assert_eq!(words, [42]);
    }

    #[test]
    fn test_word_conversion() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0xAA, 0xBB, 0xCC, 0xDD];
        let words = words_from_bytes(&bytes);
        assert_eq!(words, vec![0x0403_0201, 0xDDCC_BBAA]);
        assert_eq!(bytes_from_words(&words), bytes);
        assert_eq!(key_from_bytes(b"ABCDEFGHIJKLMNOP")[0], 0x4443_4241);
    }

    proptest! {
        #[test]
        fn prop_decrypt_inverts_encrypt(
            words in proptest::collection::vec(any::<u32>(), 2..200),
            key in any::<[u32; 4]>(),
        ) {
            let mut buf = words.clone();
            encrypt(&mut buf, &key);
            decrypt(&mut buf, &key);
            prop_assert_eq!(buf, words);
        }
    }
}
