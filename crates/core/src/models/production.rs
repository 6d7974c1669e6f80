//! Production model

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Upper bound (exclusive) of the random half of a production id
const ID_RANDOM_BOUND: u32 = 1_000_000_000;

/// One director running one script, identified by a generated id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Production {
    pub id: String,
    pub title: String,
}

impl Production {
    /// Create a production with a freshly generated id
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: generate_production_id(),
            title: title.into(),
        }
    }

    pub fn with_id(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// Random base-36 number followed by the current time in milliseconds.
///
/// Unique enough to tell productions apart on the lobby, not unguessable.
pub fn generate_production_id() -> String {
    let random = rand::thread_rng().gen_range(0..ID_RANDOM_BOUND);
    format!("{}{}", to_base36(random), Utc::now().timestamp_millis())
}

fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value == 0 {
        return "0".to_string();
    }

    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    // Only ASCII digits were pushed
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_295), "zz");
    }

    #[test]
    fn test_generated_ids_differ() {
        let a = Production::new("Macbeth");
        let b = Production::new("Macbeth");
        assert_ne!(a.id, b.id);
        assert_eq!(a.title, "Macbeth");
        assert!(a.id.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
