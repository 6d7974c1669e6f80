//! Actor model

use serde::{Deserialize, Serialize};

/// Transport-layer address of a peer, used as the actor's casting key
pub type ActorIdentity = String;

/// A peer that accepted an invite and announced itself to the director
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub identity: ActorIdentity,
    /// Self-reported display name
    pub name: String,
}

impl Actor {
    pub fn new(identity: impl Into<ActorIdentity>, name: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            name: name.into(),
        }
    }

    /// Name to show in rosters, falling back to the identity when blank
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.identity
        } else {
            &self.name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_fallback() {
        assert_eq!(Actor::new("peer-1", "Drew").display_name(), "Drew");
        assert_eq!(Actor::new("peer-1", "  ").display_name(), "peer-1");
    }
}
