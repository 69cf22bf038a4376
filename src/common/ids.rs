//! Deterministic hash helper for model artefact checksums.
//!
//! FNV-1a over 64 bits. Not cryptographic: it detects truncated or edited
//! files, nothing more.

#[derive(Copy, Clone, Debug)]
pub struct SimpleHash(u64);

impl SimpleHash {
    /// Create a new hash state with the FNV offset basis.
    pub fn new() -> Self {
        Self(0xcbf2_9ce4_8422_2325)
    }

    /// Feed bytes into the hash function.
    pub fn update(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.0 = (self.0 ^ (*b as u64)).wrapping_mul(0x0000_0100_0000_01b3);
        }
    }

    /// Finalise the hash and return a 16-character lowercase hex string.
    pub fn finish_hex(&self) -> String {
        format!("{:016x}", self.0)
    }
}

impl Default for SimpleHash {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot hex fingerprint of a byte slice.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = SimpleHash::new();
    hasher.update(bytes);
    hasher.finish_hex()
}
