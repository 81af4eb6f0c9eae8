//! Short, time-ordered identifiers.
//!
//! An id is the current Unix time in milliseconds written in base 36 (most
//! significant digit first) followed by two random symbols. The digit alphabet
//! is rotated by a caller-chosen seed, which lets each entity category start
//! its ids with its own leading character.

use chrono::Utc;
use rand::Rng;

const ALPHABET: [u8; 36] = *b"abcdefghijklmnopqrstuvwxyz0123456789";
const ROTATION_OFFSET: u64 = 14;
const RANDOM_SUFFIX_LEN: usize = 2;

/// Generate an id for the current instant.
pub fn generate(seed: u32) -> String {
    generate_at(seed, Utc::now().timestamp_millis(), &mut rand::thread_rng())
}

/// Generate an id for a given millisecond timestamp using the supplied RNG.
///
/// Negative timestamps encode as an empty prefix.
pub fn generate_at<R: Rng + ?Sized>(seed: u32, millis: i64, rng: &mut R) -> String {
    let alphabet = rotated_alphabet(seed);
    let mut id = encode_millis(&alphabet, millis);

    for _ in 0..RANDOM_SUFFIX_LEN {
        let index = rng.gen_range(0..alphabet.len());
        if let Some(symbol) = alphabet.get(index) {
            id.push(char::from(*symbol));
        }
    }

    id
}

/// Recover the millisecond timestamp encoded in an id generated with `seed`.
///
/// Returns `None` when the id is too short or contains foreign symbols.
#[cfg(test)]
fn decode_millis(id: &str, seed: u32) -> Option<i64> {
    let alphabet = rotated_alphabet(seed);
    let prefix_len = id.len().checked_sub(RANDOM_SUFFIX_LEN)?;
    let prefix = id.get(..prefix_len)?;

    prefix.bytes().try_fold(0i64, |acc, symbol| {
        let digit = alphabet.iter().position(|candidate| *candidate == symbol)?;
        acc.checked_mul(36)?
            .checked_add(i64::try_from(digit).ok()?)
    })
}

fn rotated_alphabet(seed: u32) -> [u8; 36] {
    let shift = (u64::from(seed) + ROTATION_OFFSET) % 36;
    let mut alphabet = ALPHABET;
    // shift < 36, fits any usize
    alphabet.rotate_left(shift as usize);
    alphabet
}

fn encode_millis(alphabet: &[u8; 36], millis: i64) -> String {
    let mut value = u64::try_from(millis).unwrap_or(0);
    let mut digits = Vec::new();

    while value > 0 {
        let remainder = (value % 36) as usize;
        if let Some(symbol) = alphabet.get(remainder) {
            digits.push(char::from(*symbol));
        }
        value /= 36;
    }

    digits.into_iter().rev().collect()
}
