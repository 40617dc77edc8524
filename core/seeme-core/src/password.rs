//! Identity-bound credential hashing.
//!
//! The password is bound to the account's display name and identity before
//! hashing, so renaming an account forces a re-hash and two accounts never
//! share a verifiable hash. Stored values are self-describing:
//!
//! ```text
//! pbkdf2-sha256$<iterations>$<salt hex>$<digest hex>
//! ```

use rand::RngCore;
use sha2::Sha256;

pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Joins password, display name and identity. Callers reject fields containing it.
pub const FIELD_SEPARATOR: char = '\0';

const SCHEME: &str = "pbkdf2-sha256";
const SALT_BYTES: usize = 16;
const DIGEST_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialHasher {
    iterations: u32,
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

impl CredentialHasher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Hashes with a fresh random salt embedded in the result.
    pub fn hash(&self, password: &str, display_name: &str, identity: &str) -> String {
        let mut salt = [0u8; SALT_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        let digest = derive(password, display_name, identity, &salt, self.iterations);
        format!(
            "{}${}${}${}",
            SCHEME,
            self.iterations,
            hex::encode(salt),
            hex::encode(digest)
        )
    }

    /// Recomputes with the salt and rounds stored in `stored_hash`.
    ///
    /// Values that don't parse verify as `false`.
    pub fn verify(
        &self,
        password: &str,
        display_name: &str,
        identity: &str,
        stored_hash: &str,
    ) -> bool {
        let Some(parsed) = ParsedHash::parse(stored_hash) else {
            return false;
        };
        let digest = derive(
            password,
            display_name,
            identity,
            &parsed.salt,
            parsed.iterations,
        );
        constant_time_eq(&digest, &parsed.digest)
    }
}

struct ParsedHash {
    iterations: u32,
    salt: Vec<u8>,
    digest: Vec<u8>,
}

impl ParsedHash {
    fn parse(value: &str) -> Option<Self> {
        let mut parts = value.split('$');
        if parts.next()? != SCHEME {
            return None;
        }
        let iterations: u32 = parts.next()?.parse().ok().filter(|n| *n > 0)?;
        let salt = hex::decode(parts.next()?).ok()?;
        let digest = hex::decode(parts.next()?).ok()?;
        if parts.next().is_some() || salt.is_empty() || digest.len() != DIGEST_BYTES {
            return None;
        }
        Some(Self {
            iterations,
            salt,
            digest,
        })
    }
}

fn derive(
    password: &str,
    display_name: &str,
    identity: &str,
    salt: &[u8],
    iterations: u32,
) -> [u8; DIGEST_BYTES] {
    let combined = format!(
        "{password}{sep}{display_name}{sep}{identity}",
        sep = FIELD_SEPARATOR
    );
    let mut digest = [0u8; DIGEST_BYTES];
    pbkdf2::pbkdf2_hmac::<Sha256>(combined.as_bytes(), salt, iterations, &mut digest);
    digest
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
