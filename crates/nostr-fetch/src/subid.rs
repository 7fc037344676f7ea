use std::hash::{Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

/// An opaque subscription id: `currentMillis || 2-char base32 random` (§6).
#[derive(Debug, Clone)]
pub struct SubId {
    id: String,
}

impl PartialEq for SubId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SubId {}

impl SubId {
    pub fn new() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);

        let rand_bytes: [u8; 2] = rand::rng().random();
        let suffix = base32::encode(base32::Alphabet::RFC4648 { padding: false }, &rand_bytes)
            .to_lowercase();
        let suffix: String = suffix.chars().take(2).collect();

        Self {
            id: format!("{millis}{suffix}"),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }
}

impl Default for SubId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl Hash for SubId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
