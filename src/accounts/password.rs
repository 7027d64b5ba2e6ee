// =============================================================================
// Password hashing — PBKDF2-HMAC-SHA256
// =============================================================================
//
// Encoded form: `pbkdf2:sha256:<iterations>$<salt hex>$<hash hex>`.
// Verification compares digests in constant time.
// =============================================================================

use sha2::Sha256;

const SCHEME: &str = "pbkdf2:sha256";
const SALT_LEN: usize = 16;

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    iterations: u32,
}

impl PasswordHasher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    /// Hash `password` with a fresh random salt.
    pub fn hash(&self, password: &str) -> String {
        let salt: [u8; SALT_LEN] = uuid::Uuid::new_v4().into_bytes();
        let digest = pbkdf2_sha256(password.as_bytes(), &salt, self.iterations);
        format!(
            "{SCHEME}:{}${}${}",
            self.iterations,
            hex::encode(salt),
            hex::encode(digest)
        )
    }

    /// Check `password` against an encoded hash. Malformed hashes never match.
    pub fn verify(&self, password: &str, encoded: &str) -> bool {
        let Some((iterations, salt, expected)) = decode(encoded) else {
            return false;
        };
        let digest = pbkdf2_sha256(password.as_bytes(), &salt, iterations);
        constant_time_eq(&digest, &expected)
    }
}

fn decode(encoded: &str) -> Option<(u32, Vec<u8>, Vec<u8>)> {
    let rest = encoded.strip_prefix(SCHEME)?.strip_prefix(':')?;
    let mut parts = rest.splitn(3, '$');
    let iterations: u32 = parts.next()?.parse().ok()?;
    let salt = hex::decode(parts.next()?).ok()?;
    let hash = hex::decode(parts.next()?).ok()?;
    if iterations == 0 || hash.len() != 32 {
        return None;
    }
    Some((iterations, salt, hash))
}

/// PBKDF2 (RFC 8018) with HMAC-SHA256; the output is 32 bytes.
fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut out = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    out
}

/// Compare two byte slices in constant time.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
