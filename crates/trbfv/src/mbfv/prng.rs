//! The deterministic keyed PRNG behind the common reference string.

use blake2::{Blake2b512, Digest};
use rand::{CryptoRng, RngCore};

use crate::{Error, Result};

/// Number of bytes produced by one `clock` call.
const BLOCK_SIZE: usize = 32;

/// A deterministic PRNG: a sponge over Blake2b-512, optionally keyed
/// for domain separation.
///
/// Two instances constructed with the same `(key, seed)` pair produce
/// the same stream on every platform; parties agree on the pair out of
/// band. An unkeyed instance provides a public common reference
/// string. The stream is strictly sequential: concurrent consumers
/// must hold independent instances.
#[derive(Debug, Clone)]
pub struct KeyedPrng {
    key: Vec<u8>,
    state: [u8; BLOCK_SIZE],
    clock: u64,
    buffer: [u8; BLOCK_SIZE],
    buffered: usize,
}

impl KeyedPrng {
    /// Create an unkeyed PRNG.
    pub fn new() -> Self {
        Self::new_keyed(&[])
    }

    /// Create a PRNG keyed with `key`; the key is mixed into every
    /// output block.
    pub fn new_keyed(key: &[u8]) -> Self {
        let mut prng = Self {
            key: key.to_vec(),
            state: [0u8; BLOCK_SIZE],
            clock: 0,
            buffer: [0u8; BLOCK_SIZE],
            buffered: 0,
        };
        prng.seed(&[]);
        prng
    }

    /// Reset the internal state, mixing `seed` in, and rewind the
    /// clock to 0.
    pub fn seed(&mut self, seed: &[u8]) {
        let mut h = Blake2b512::new();
        h.update(&self.key);
        h.update(seed);
        let digest = h.finalize();
        self.state.copy_from_slice(&digest[..BLOCK_SIZE]);
        self.clock = 0;
        self.buffered = 0;
    }

    /// Produce the next 32-byte block and advance the clock by one.
    ///
    /// The block is the right half of the 64-byte hash of the keyed
    /// state; the left half is fed back as the next state.
    pub fn clock(&mut self) -> [u8; BLOCK_SIZE] {
        let mut h = Blake2b512::new();
        h.update(&self.key);
        h.update(self.state);
        let digest = h.finalize();
        self.state.copy_from_slice(&digest[..BLOCK_SIZE]);
        let mut out = [0u8; BLOCK_SIZE];
        out.copy_from_slice(&digest[BLOCK_SIZE..]);
        self.clock += 1;
        out
    }

    /// The number of blocks produced since the last seeding.
    pub fn clock_value(&self) -> u64 {
        self.clock
    }

    /// Fast-forward the stream to clock `n` by producing and
    /// discarding blocks. The clock may only move forward.
    pub fn set_clock(&mut self, n: u64) -> Result<()> {
        if n < self.clock {
            return Err(Error::BackwardsClock {
                current: self.clock,
                requested: n,
            });
        }
        while self.clock < n {
            self.clock();
        }
        Ok(())
    }
}

impl Default for KeyedPrng {
    fn default() -> Self {
        Self::new()
    }
}

impl RngCore for KeyedPrng {
    fn next_u32(&mut self) -> u32 {
        let mut b = [0u8; 4];
        self.fill_bytes(&mut b);
        u32::from_le_bytes(b)
    }

    fn next_u64(&mut self) -> u64 {
        let mut b = [0u8; 8];
        self.fill_bytes(&mut b);
        u64::from_le_bytes(b)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut filled = 0;
        while filled < dest.len() {
            if self.buffered == 0 {
                self.buffer = self.clock();
                self.buffered = BLOCK_SIZE;
            }
            let take = self.buffered.min(dest.len() - filled);
            let start = BLOCK_SIZE - self.buffered;
            dest[filled..filled + take].copy_from_slice(&self.buffer[start..start + take]);
            self.buffered -= take;
            filled += take;
        }
    }
}

impl CryptoRng for KeyedPrng {}

#[cfg(test)]
mod tests {
    use super::KeyedPrng;
    use crate::Error;
    use rand::RngCore;

    #[test]
    fn determinism() {
        let mut a = KeyedPrng::new_keyed(b"domain");
        let mut b = KeyedPrng::new_keyed(b"domain");
        a.seed(b"seed");
        b.seed(b"seed");
        for _ in 0..64 {
            assert_eq!(a.clock(), b.clock());
        }

        let mut c = KeyedPrng::new_keyed(b"other domain");
        c.seed(b"seed");
        assert_ne!(a.clock(), c.clock());
    }

    // Scenario: clock() 256 times must equal set_clock(255) followed by
    // one clock() on a fresh instance of the same (key, seed).
    #[test]
    fn set_clock_equals_repeated_clock() {
        let mut a = KeyedPrng::new();
        a.seed(b"hello");
        let mut last = [0u8; 32];
        for _ in 0..256 {
            last = a.clock();
        }

        let mut b = KeyedPrng::new();
        b.seed(b"hello");
        b.set_clock(255).unwrap();
        assert_eq!(b.clock(), last);
        assert_eq!(b.clock_value(), 256);
    }

    #[test]
    fn backwards_clock() {
        let mut a = KeyedPrng::new();
        a.set_clock(10).unwrap();
        assert_eq!(
            a.set_clock(9).unwrap_err(),
            Error::BackwardsClock {
                current: 10,
                requested: 9
            }
        );
    }

    #[test]
    fn seed_rewinds_the_clock() {
        let mut a = KeyedPrng::new();
        let first = a.clock();
        a.set_clock(42).unwrap();
        a.seed(&[]);
        assert_eq!(a.clock_value(), 0);
        assert_eq!(a.clock(), first);
    }

    #[test]
    fn rng_core_stream_is_deterministic() {
        let mut a = KeyedPrng::new_keyed(b"stream");
        let mut b = KeyedPrng::new_keyed(b"stream");
        let mut buf_a = [0u8; 100];
        let mut buf_b = [0u8; 100];
        a.fill_bytes(&mut buf_a);
        // Different read granularity, same stream.
        b.fill_bytes(&mut buf_b[..37]);
        b.fill_bytes(&mut buf_b[37..]);
        assert_eq!(buf_a, buf_b);
        assert_eq!(a.next_u64(), b.next_u64());
    }
}
