//! Bit-packing encoder over the five fixed 64-symbol tables the
//! upstream verifier recognizes. Looks like base64 but is not: there
//! is no padding, and trailing 1-2 bytes are dropped outright.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alphabet {
    Standard,
    Shuffled1,
    Shuffled2,
    /// Used for the user-agent transform inside token building.
    Shuffled3,
    /// Used for the final token encoding.
    Shuffled4,
}

impl Alphabet {
    pub(crate) fn table(self) -> &'static [u8; 64] {
        match self {
            Alphabet::Standard => {
                b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/"
            }
            Alphabet::Shuffled1 => {
                b"Dkdpgh4ZKsQB80/Mfvw36XI1R25+WUAlEi7NLboqYTOPuzmFjJnryx9HVGcaStCe"
            }
            Alphabet::Shuffled2 => {
                b"Dkdpgh4ZKsQB80/Mfvw36XI1R25-WUAlEi7NLboqYTOPuzmFjJnryx9HVGcaStCe"
            }
            Alphabet::Shuffled3 => {
                b"ckdp1h4ZKsUB80/Mfvw36XIgR25+WQAlEi7NLboqYTOPuzmFjJnryx9HVGDaStCe"
            }
            Alphabet::Shuffled4 => {
                b"Dkdpgh2ZmsQB80/MfvV36XI1R45-WUAlEixNLwoqYTOPuzKFjJnry79HbGcaStCe"
            }
        }
    }
}

/// Encodes each complete 3-byte window as 4 symbols; output length is
/// always `floor(len / 3) * 4`.
pub fn encode(data: &[u8], alphabet: Alphabet) -> String {
    let table = alphabet.table();
    let mut out = String::with_capacity(data.len() / 3 * 4);
    for chunk in data.chunks_exact(3) {
        let window =
            (u32::from(chunk[0]) << 16) | (u32::from(chunk[1]) << 8) | u32::from(chunk[2]);
        for shift in [18u32, 12, 6, 0] {
            out.push(table[(window >> shift & 0x3f) as usize] as char);
        }
    }
    out
}
