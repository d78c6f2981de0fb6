//! Per-request anti-tamper token, sent as the `a_bogus` query
//! parameter. The verifier recomputes the slot layout below, so the
//! byte positions and the emission order are load-bearing.

pub mod cipher;
pub mod codec;
pub mod digest;

use chrono::Utc;
use rand::Rng;

use crate::fingerprint::codec::Alphabet;

const TOKEN_SUFFIX: &str = "cus";
const AID: u32 = 6383;
const PAGE_ID: u32 = 6241;
const CALL_ARGS: [u32; 3] = [0, 1, 14];
// key for the user-agent transform feeding the third digest
const AGENT_KEY: [u8; 3] = [0, 1, 14];
// single-byte key sealing the assembled slot buffer
const SEAL_KEY: [u8; 1] = [0x79];
// option pairs bit-mixed into the 12-byte random prefix
const PREFIX_OPTIONS: [[u8; 2]; 3] = [[3, 45], [1, 0], [1, 5]];

/// Screen and platform descriptor a desktop browser session reports.
pub const DEFAULT_ENV_DESCRIPTOR: &str =
    "1536|747|1536|834|0|30|0|0|1536|834|1536|864|1525|747|24|24|Win32";

// the order slots leave the table; the verifier indexes into this
const EMIT_ORDER: [usize; 44] = [
    18, 20, 52, 26, 30, 34, 58, 38, 40, 53, 42, 21, 27, 54, 55, 31, 35, 57, 39, 41, 43, 22, 28,
    32, 60, 36, 23, 29, 33, 37, 44, 45, 59, 46, 47, 48, 49, 50, 24, 25, 65, 66, 70, 71,
];

/// Builds the anti-tamper token over a serialized query string, the
/// browser user agent and the pipe-delimited screen descriptor.
pub fn build_token(query: &str, user_agent: &str, env: &str) -> String {
    let now = Utc::now().timestamp_millis() as u64;
    build_token_at(query, user_agent, env, now, now, &mut rand::thread_rng())
}

fn build_token_at<R: Rng>(
    query: &str,
    user_agent: &str,
    env: &str,
    start_ms: u64,
    end_ms: u64,
    rng: &mut R,
) -> String {
    let query_digest = digest::digest_doubled(format!("{query}{TOKEN_SUFFIX}").as_bytes());
    let suffix_digest = digest::digest_doubled(TOKEN_SUFFIX.as_bytes());
    let transformed_agent = codec::encode(
        &cipher::apply(user_agent.as_bytes(), &AGENT_KEY),
        Alphabet::Shuffled3,
    );
    let agent_digest = digest::digest_doubled(transformed_agent.as_bytes());

    let slots = populate_slots(
        start_ms,
        end_ms,
        &query_digest,
        &suffix_digest,
        &agent_digest,
        env.len(),
    );
    let sealed = cipher::apply(&assemble(&slots, env.as_bytes()), &SEAL_KEY);

    let mut token_bytes = random_prefix(rng);
    token_bytes.extend_from_slice(&sealed);
    let mut token = codec::encode(&token_bytes, Alphabet::Shuffled4);
    token.push('=');
    token
}

fn populate_slots(
    start_ms: u64,
    end_ms: u64,
    query_digest: &[u8; 32],
    suffix_digest: &[u8; 32],
    agent_digest: &[u8; 32],
    env_len: usize,
) -> [u8; 73] {
    let mut b = [0u8; 73];
    b[8] = 3;
    b[18] = 44;

    let start_low = start_ms as u32;
    b[20] = (start_low >> 24) as u8;
    b[21] = (start_low >> 16) as u8;
    b[22] = (start_low >> 8) as u8;
    b[23] = start_low as u8;
    b[24] = (start_ms >> 32) as u8;
    b[25] = (start_ms >> 40) as u8;

    let [arg0, arg1, arg2] = CALL_ARGS;
    b[26] = (arg0 >> 24) as u8;
    b[27] = (arg0 >> 16) as u8;
    b[28] = (arg0 >> 8) as u8;
    b[29] = arg0 as u8;
    // the middle argument lands middle-out: bytes 1, 0, 3, 2
    b[30] = (arg1 >> 8) as u8;
    b[31] = arg1 as u8;
    b[32] = (arg1 >> 24) as u8;
    b[33] = (arg1 >> 16) as u8;
    b[34] = (arg2 >> 24) as u8;
    b[35] = (arg2 >> 16) as u8;
    b[36] = (arg2 >> 8) as u8;
    b[37] = arg2 as u8;

    b[38] = query_digest[21];
    b[39] = query_digest[22];
    b[40] = suffix_digest[21];
    b[41] = suffix_digest[22];
    b[42] = agent_digest[23];
    b[43] = agent_digest[24];

    let end_low = end_ms as u32;
    b[44] = (end_low >> 24) as u8;
    b[45] = (end_low >> 16) as u8;
    b[46] = (end_low >> 8) as u8;
    b[47] = end_low as u8;
    b[48] = b[8];
    b[49] = (end_ms >> 32) as u8;
    b[50] = (end_ms >> 40) as u8;

    b[52] = (PAGE_ID >> 24) as u8;
    b[53] = (PAGE_ID >> 16) as u8;
    b[54] = (PAGE_ID >> 8) as u8;
    b[55] = PAGE_ID as u8;
    b[57] = AID as u8;
    b[58] = (AID >> 8) as u8;
    b[59] = (AID >> 16) as u8;
    b[60] = (AID >> 24) as u8;

    b[65] = env_len as u8;
    b[66] = (env_len >> 8) as u8;
    // trailing option list is always empty
    b[70] = 0;
    b[71] = 0;
    b
}

/// Emitted slots, then the raw descriptor bytes, then a checksum over
/// the slots alone. Slot 34 never folds into the checksum.
fn assemble(slots: &[u8; 73], env: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(EMIT_ORDER.len() + env.len() + 1);
    for &slot in &EMIT_ORDER {
        body.push(slots[slot]);
    }
    body.extend_from_slice(env);
    let checksum = EMIT_ORDER
        .iter()
        .filter(|&&slot| slot != 34)
        .fold(0u8, |acc, &slot| acc ^ slots[slot]);
    body.push(checksum);
    body
}

fn random_prefix<R: Rng>(rng: &mut R) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(12);
    for [first, second] in PREFIX_OPTIONS {
        let sample: u16 = rng.gen_range(0..10_000);
        let low = sample as u8;
        let high = (sample >> 8) as u8;
        prefix.push(low & 0xaa | first & 0x55);
        prefix.push(low & 0x55 | first & 0xaa);
        prefix.push(high & 0xaa | second & 0x55);
        prefix.push(high & 0x55 | second & 0xaa);
    }
    prefix
}
