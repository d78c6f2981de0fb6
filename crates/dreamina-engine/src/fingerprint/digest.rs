//! SM3 (GB/T 32905-2016), the digest the upstream anti-tamper check
//! expects. Operates on raw bytes; strings hash as their UTF-8 bytes.

const IV: [u32; 8] = [
    0x7380_166f,
    0x4914_b2b9,
    0x1724_42d7,
    0xda8a_0600,
    0xa96f_30bc,
    0x1631_38aa,
    0xe38d_ee4d,
    0xb0fb_0e4e,
];

const T_EARLY: u32 = 0x79cc_4519;
const T_LATE: u32 = 0x7a87_9d8a;

fn p0(x: u32) -> u32 {
    x ^ x.rotate_left(9) ^ x.rotate_left(17)
}

fn p1(x: u32) -> u32 {
    x ^ x.rotate_left(15) ^ x.rotate_left(23)
}

fn compress(regs: &mut [u32; 8], block: &[u8]) {
    let mut w = [0u32; 68];
    for (word, bytes) in w.iter_mut().zip(block.chunks_exact(4)) {
        *word = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    }
    for n in 16..68 {
        let x = p1(w[n - 16] ^ w[n - 9] ^ w[n - 3].rotate_left(15));
        w[n] = x ^ w[n - 13].rotate_left(7) ^ w[n - 6];
    }

    let mut r = *regs;
    for j in 0..64 {
        let t = if j < 16 { T_EARLY } else { T_LATE };
        let ss1 = r[0]
            .rotate_left(12)
            .wrapping_add(r[4])
            .wrapping_add(t.rotate_left(j as u32))
            .rotate_left(7);
        let ss2 = ss1 ^ r[0].rotate_left(12);
        let ff = if j < 16 {
            r[0] ^ r[1] ^ r[2]
        } else {
            (r[0] & r[1]) | (r[0] & r[2]) | (r[1] & r[2])
        };
        let gg = if j < 16 {
            r[4] ^ r[5] ^ r[6]
        } else {
            (r[4] & r[5]) | (!r[4] & r[6])
        };
        let tt1 = ff
            .wrapping_add(r[3])
            .wrapping_add(ss2)
            .wrapping_add(w[j] ^ w[j + 4]);
        let tt2 = gg.wrapping_add(r[7]).wrapping_add(ss1).wrapping_add(w[j]);
        r[3] = r[2];
        r[2] = r[1].rotate_left(9);
        r[1] = r[0];
        r[0] = tt1;
        r[7] = r[6];
        r[6] = r[5].rotate_left(19);
        r[5] = r[4];
        r[4] = p0(tt2);
    }

    for (reg, mixed) in regs.iter_mut().zip(r) {
        *reg ^= mixed;
    }
}

pub fn digest(data: &[u8]) -> [u8; 32] {
    let mut padded = Vec::with_capacity(data.len() + 72);
    padded.extend_from_slice(data);
    padded.push(0x80);
    while padded.len() % 64 != 56 {
        padded.push(0);
    }
    padded.extend_from_slice(&(data.len() as u64 * 8).to_be_bytes());

    let mut regs = IV;
    for block in padded.chunks_exact(64) {
        compress(&mut regs, block);
    }

    let mut out = [0u8; 32];
    for (slot, reg) in out.chunks_exact_mut(4).zip(regs) {
        slot.copy_from_slice(&reg.to_be_bytes());
    }
    out
}

/// Two passes, the second over the raw 32 digest bytes of the first.
pub fn digest_doubled(data: &[u8]) -> [u8; 32] {
    digest(&digest(data))
}

#[cfg(test)]
mod tests {
    use super::digest;

    #[test]
    fn matches_published_vectors() {
        assert_eq!(
            hex::encode(digest(b"abc")),
            "66c7f0f462eeedd9d1f2d46bdc10e4e24167c4875cf2f7a2297da02b8f4ba8e0"
        );
        assert_eq!(
            hex::encode(digest(b"")),
            "1ab21d8355cfa17f8e61194831e81a8f22bec8c728fedb191f4ca464742c8a32"
        );
    }

    #[test]
    fn handles_multi_block_messages() {
        // 64 bytes of input forces a second padding block
        let message = b"abcd".repeat(16);
        assert_eq!(
            hex::encode(digest(&message)),
            "debe9ff92275b8a138604889c18e5a4d6fdb70e5387e5765293dcba39c0c5732"
        );
    }

    #[test]
    fn utf8_text_hashes_as_bytes() {
        assert_eq!(digest("abc".as_bytes()), digest(b"abc"));
        assert_ne!(digest("ab".as_bytes()), digest(b"abc"));
    }
}
