//! AgentSlot: a leased unit of pool capacity paired with a working copy.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentType(String);

impl AgentType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An acquired slot in the AgentPool. Dropping the handle without calling
/// release is a caller bug; the pool tracks lease expiry independently as
/// a backstop.
#[derive(Debug, Clone)]
pub struct AgentSlot {
    pub agent_type: AgentType,
    pub lease_token: Uuid,
    pub working_copy: String,
    in_use: bool,
}

impl AgentSlot {
    pub fn new(agent_type: AgentType, working_copy: impl Into<String>) -> Self {
        Self {
            agent_type,
            lease_token: Uuid::now_v7(),
            working_copy: working_copy.into(),
            in_use: true,
        }
    }

    pub fn in_use(&self) -> bool {
        self.in_use
    }

    pub fn mark_released(&mut self) {
        self.in_use = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_slot_starts_in_use() {
        let slot = AgentSlot::new(AgentType::new("coder"), "/tmp/wc-1");
        assert!(slot.in_use());
    }

    #[test]
    fn mark_released_flips_flag() {
        let mut slot = AgentSlot::new(AgentType::new("coder"), "/tmp/wc-1");
        slot.mark_released();
        assert!(!slot.in_use());
    }

    #[test]
    fn agent_type_display() {
        let t = AgentType::from("reviewer");
        assert_eq!(t.to_string(), "reviewer");
    }
}
