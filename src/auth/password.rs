use anyhow::Result;

pub fn hash(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password, cost).map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))
}

/// Malformed hashes verify as false rather than erroring.
pub fn verify(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}
