//! Hash-based record ID generation.
//!
//! Record IDs are derived from a SHA256 hash of the record's seed text plus
//! a timestamp and nonce, encoded in base36 and prefixed with the record
//! kind. The hash length adapts to the number of registered IDs so short IDs
//! stay readable in small journals while large ones remain collision-free.
//!
//! Format: `{prefix}-{hash}` (e.g., "issue-a3f8", "tag-k02x").
//!
//! # Example
//!
//! ```
//! use quill::id_generation::IdGenerator;
//!
//! let mut generator = IdGenerator::new("issue");
//! let id = generator.generate("My first entry").unwrap();
//! assert!(id.starts_with("issue-"));
//! ```

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

const BASE36_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const MAX_NONCE: u32 = 100;

/// Errors that can occur during ID generation
#[derive(Debug, Error)]
pub enum IdGenerationError {
    /// Unable to generate a unique ID after exhausting all nonces and length increases
    #[error("Unable to generate unique ID after {attempts} attempts")]
    CollisionExhausted {
        /// Number of nonces tried before giving up
        attempts: u32,
    },

    /// Base36 encoding failed
    #[error("Base36 encoding failed: {0}")]
    EncodingFailed(String),
}

/// Hash-based ID generator with collision detection.
///
/// One generator is kept per record kind; its `existing_ids` set grows with
/// each generated or registered ID and is what makes collision retries work.
/// Memory overhead is negligible for journals of any realistic size.
pub struct IdGenerator {
    prefix: &'static str,
    existing_ids: HashSet<String>,
}

impl IdGenerator {
    /// Create a new ID generator for the given record-kind prefix.
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            existing_ids: HashSet::new(),
        }
    }

    /// Register an existing ID (e.g., loaded from a snapshot) to prevent collisions.
    pub fn register_id(&mut self, id: String) {
        self.existing_ids.insert(id);
    }

    /// Number of IDs this generator knows about.
    pub fn known_ids(&self) -> usize {
        self.existing_ids.len()
    }

    /// Generate a new unique ID from the given seed text.
    ///
    /// The seed is typically the record's title or name; it only influences
    /// the hash, so duplicate seeds are fine.
    ///
    /// # Errors
    ///
    /// Returns an error if unable to generate a unique ID after trying all
    /// nonces at the maximum length.
    pub fn generate(&mut self, seed: &str) -> Result<String, IdGenerationError> {
        let id_length = self.adaptive_length();

        for nonce in 0..MAX_NONCE {
            let id = self.generate_hash_id(seed, nonce, id_length)?;

            if !self.existing_ids.contains(&id) {
                if nonce > 0 {
                    debug!(nonce, id_length, "generated unique ID after collision retries");
                }
                self.existing_ids.insert(id.clone());
                return Ok(id);
            }
        }

        // All nonces collided at the current length; retry once with one more
        // character before giving up.
        if id_length < 6 {
            warn!(
                id_length,
                max_nonce = MAX_NONCE,
                "all nonces exhausted, increasing ID length"
            );
            let longer_id = self.generate_hash_id(seed, 0, id_length + 1)?;
            self.existing_ids.insert(longer_id.clone());
            return Ok(longer_id);
        }

        Err(IdGenerationError::CollisionExhausted {
            attempts: MAX_NONCE,
        })
    }

    fn generate_hash_id(
        &self,
        seed: &str,
        nonce: u32,
        length: usize,
    ) -> Result<String, IdGenerationError> {
        let timestamp = Utc::now().timestamp_micros();
        let content = format!("{}|{}|{}", seed, timestamp, nonce);

        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        let hash_bytes = hasher.finalize();

        let hash_str = encode_base36(&hash_bytes[..8], length)?;

        Ok(format!("{}-{}", self.prefix, hash_str))
    }

    /// Determine ID length based on how many IDs already exist.
    ///
    /// - 0-500 records: 4 chars
    /// - 500-1,500: 5 chars
    /// - 1,500+: 6 chars
    fn adaptive_length(&self) -> usize {
        match self.existing_ids.len() {
            0..=500 => 4,
            501..=1500 => 5,
            _ => 6,
        }
    }
}

/// Encode bytes as a base36 string of the requested length.
///
/// The input is limited to the first 8 bytes of the SHA256 hash so the
/// intermediate value fits in a u64; wrapping arithmetic keeps the conversion
/// deterministic if it overflows.
fn encode_base36(bytes: &[u8], length: usize) -> Result<String, IdGenerationError> {
    let mut num: u64 = 0;
    for &byte in bytes {
        num = num.wrapping_shl(8).wrapping_add(u64::from(byte));
    }

    let mut result = Vec::new();
    let mut n = num;

    while result.len() < length {
        let remainder = (n % 36) as usize;
        result.push(BASE36_CHARS[remainder]);
        n /= 36;
    }

    result.reverse();

    String::from_utf8(result)
        .map_err(|e| IdGenerationError::EncodingFailed(format!("UTF-8 conversion failed: {}", e)))
}
