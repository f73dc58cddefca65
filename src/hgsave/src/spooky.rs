//! SpookyHash V2 (128-bit), in the narrowed form used by manifest fingerprints.
//!
//! Messages under 192 bytes take the standard short path. Longer messages only
//! run the 96-byte block mix over the whole blocks and return the first two
//! state words: no tail is absorbed and no final mixing is applied. Existing
//! manifests were fingerprinted this way, so the long path must stay as is to
//! remain compatible with them.

const SC_CONST: u64 = 0xDEAD_BEEF_DEAD_BEEF;
const NUM_VARS: usize = 12;
const BLOCK_SIZE: usize = NUM_VARS * 8;
const BUF_SIZE: usize = 2 * BLOCK_SIZE;

/// Rotation amounts for the long-message mix, one per state word
const MIX_ROTATIONS: [u32; NUM_VARS] = [11, 32, 43, 31, 17, 28, 39, 57, 55, 54, 22, 46];

#[inline]
fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(word)
}

fn short_mix(h: &mut [u64; 4]) {
    const ROTATIONS: [(usize, usize, usize, u32); 12] = [
        (2, 3, 0, 50),
        (3, 0, 1, 52),
        (0, 1, 2, 30),
        (1, 2, 3, 41),
        (2, 3, 0, 54),
        (3, 0, 1, 48),
        (0, 1, 2, 38),
        (1, 2, 3, 37),
        (2, 3, 0, 62),
        (3, 0, 1, 34),
        (0, 1, 2, 5),
        (1, 2, 3, 36),
    ];
    for &(a, b, c, r) in &ROTATIONS {
        h[a] = h[a].rotate_left(r);
        h[a] = h[a].wrapping_add(h[b]);
        h[c] ^= h[a];
    }
}

fn short_end(h: &mut [u64; 4]) {
    const ROTATIONS: [(usize, usize, u32); 11] = [
        (3, 2, 15),
        (0, 3, 52),
        (1, 0, 26),
        (2, 1, 51),
        (3, 2, 28),
        (0, 3, 9),
        (1, 0, 47),
        (2, 1, 54),
        (3, 2, 32),
        (0, 3, 25),
        (1, 0, 63),
    ];
    for &(a, b, r) in &ROTATIONS {
        h[a] ^= h[b];
        h[b] = h[b].rotate_left(r);
        h[a] = h[a].wrapping_add(h[b]);
    }
}

fn short(message: &[u8], seed1: u64, seed2: u64) -> (u64, u64) {
    let mut h = [seed1, seed2, SC_CONST, SC_CONST];
    let mut rest = message;

    if message.len() > 15 {
        let mut blocks = message.chunks_exact(32);
        for block in &mut blocks {
            h[2] = h[2].wrapping_add(read_u64(block, 0));
            h[3] = h[3].wrapping_add(read_u64(block, 8));
            short_mix(&mut h);
            h[0] = h[0].wrapping_add(read_u64(block, 16));
            h[1] = h[1].wrapping_add(read_u64(block, 24));
        }
        rest = blocks.remainder();

        if rest.len() >= 16 {
            h[2] = h[2].wrapping_add(read_u64(rest, 0));
            h[3] = h[3].wrapping_add(read_u64(rest, 8));
            short_mix(&mut h);
            rest = &rest[16..];
        }
    }

    h[3] = h[3].wrapping_add((message.len() as u64) << 56);
    if rest.is_empty() {
        h[2] = h[2].wrapping_add(SC_CONST);
        h[3] = h[3].wrapping_add(SC_CONST);
    } else {
        let mut tail = [0u8; 16];
        tail[..rest.len()].copy_from_slice(rest);
        h[2] = h[2].wrapping_add(read_u64(&tail, 0));
        h[3] = h[3].wrapping_add(read_u64(&tail, 8));
    }

    short_end(&mut h);
    (h[0], h[1])
}

fn mix(block: &[u8], s: &mut [u64; NUM_VARS]) {
    for i in 0..NUM_VARS {
        s[i] = s[i].wrapping_add(read_u64(block, i * 8));
        s[(i + 2) % NUM_VARS] ^= s[(i + 10) % NUM_VARS];
        s[(i + 11) % NUM_VARS] ^= s[i];
        s[i] = s[i].rotate_left(MIX_ROTATIONS[i]);
        s[(i + 11) % NUM_VARS] = s[(i + 11) % NUM_VARS].wrapping_add(s[(i + 1) % NUM_VARS]);
    }
}

/// Hash `message` with two 64-bit seeds
pub fn hash128(message: &[u8], seed1: u64, seed2: u64) -> (u64, u64) {
    if message.len() < BUF_SIZE {
        return short(message, seed1, seed2);
    }

    let mut s = [0u64; NUM_VARS];
    for i in (0..NUM_VARS).step_by(3) {
        s[i] = seed1;
        s[i + 1] = seed2;
        s[i + 2] = SC_CONST;
    }

    for block in message.chunks_exact(BLOCK_SIZE) {
        mix(block, &mut s);
    }

    (s[0], s[1])
}

/// Chained hasher: each update hashes its input seeded with the previous output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spooky {
    h1: u64,
    h2: u64,
}

impl Spooky {
    pub fn new(seed1: u64, seed2: u64) -> Self {
        Spooky {
            h1: seed1,
            h2: seed2,
        }
    }

    pub fn update(&mut self, message: &[u8]) -> &mut Self {
        let (h1, h2) = hash128(message, self.h1, self.h2);
        self.h1 = h1;
        self.h2 = h2;
        self
    }

    pub fn finish(&self) -> (u64, u64) {
        (self.h1, self.h2)
    }

    /// Both words little-endian, `h1` first, as stored in the manifest
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&self.h1.to_le_bytes());
        out[8..].copy_from_slice(&self.h2.to_le_bytes());
        out
    }
}
