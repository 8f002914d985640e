use sha2::{Digest, Sha256};

/// Hex SHA-256 over `ip|user_agent|accept_language|accept_encoding`.
/// Missing headers hash as empty strings so the fingerprint is always defined.
pub fn compute_fingerprint(
    ip: &str,
    user_agent: Option<&str>,
    accept_language: Option<&str>,
    accept_encoding: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    hasher.update(b"|");
    hasher.update(user_agent.unwrap_or_default().as_bytes());
    hasher.update(b"|");
    hasher.update(accept_language.unwrap_or_default().as_bytes());
    hasher.update(b"|");
    hasher.update(accept_encoding.unwrap_or_default().as_bytes());
    format!("{:x}", hasher.finalize())
}
