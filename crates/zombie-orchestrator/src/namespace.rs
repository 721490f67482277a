/// Random bytes behind every namespace.
pub const NAMESPACE_ENTROPY_BYTES: usize = 16;

pub const NAMESPACE_PREFIX: &str = "zombie-";

/// Generate a fresh namespace, e.g. `zombie-3f9c...` (32 hex characters).
pub fn generate_namespace() -> String {
    let bytes: [u8; NAMESPACE_ENTROPY_BYTES] = rand::random();
    format!("{NAMESPACE_PREFIX}{}", hex::encode(bytes))
}
