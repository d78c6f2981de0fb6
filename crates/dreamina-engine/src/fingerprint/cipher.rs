//! RC4 keystream XOR. The token scheme leans on the cipher being its
//! own inverse, so there is a single `apply` rather than an
//! encrypt/decrypt pair. Keys must be non-empty.

pub fn apply(data: &[u8], key: &[u8]) -> Vec<u8> {
    debug_assert!(!key.is_empty());
    let mut state: [u8; 256] = std::array::from_fn(|n| n as u8);
    let mut j = 0usize;
    for i in 0..256 {
        j = (j + state[i] as usize + key[i % key.len()] as usize) % 256;
        state.swap(i, j);
    }

    let mut a = 0usize;
    let mut b = 0usize;
    let mut out = Vec::with_capacity(data.len());
    for &byte in data {
        a = (a + 1) % 256;
        b = (b + state[a] as usize) % 256;
        state.swap(a, b);
        let keystream = state[(state[a] as usize + state[b] as usize) % 256];
        out.push(byte ^ keystream);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::apply;

    #[test]
    fn matches_reference_vector() {
        // classic test vector: RC4("Plaintext", "Key")
        let cipher = apply(b"Plaintext", b"Key");
        assert_eq!(hex::encode(cipher), "bbf316e8d940af0ad3");
    }

    #[test]
    fn is_self_inverse() {
        let cases: &[(&[u8], &[u8])] = &[
            (b"a query string", b"\x79"),
            (b"Mozilla/5.0", &[0, 1, 14]),
            (&[0u8, 255, 128, 7], b"longer key material"),
        ];
        for &(data, key) in cases {
            assert_eq!(apply(&apply(data, key), key), data);
        }
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(apply(b"", b"Key").is_empty());
    }
}
