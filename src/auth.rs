//! Per-request caller identity, supplied by the external auth layer.
//!
//! The engine never authenticates; services validate the session and
//! inject an [`AuthContext`] into the GraphQL request context.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Group granting access to agent-only operations.
pub const SUPPORT_AGENT_GROUP: &str = "support-agents";

/// Authenticated caller identity and group memberships.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub groups: Vec<String>,
}

impl AuthContext {
    pub fn new(user_id: Uuid, groups: Vec<String>) -> Self {
        Self { user_id, groups }
    }

    pub fn is_support_agent(&self) -> bool {
        self.groups.iter().any(|g| g == SUPPORT_AGENT_GROUP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_group_membership() {
        let agent = AuthContext::new(
            Uuid::new_v4(),
            vec!["users".to_string(), SUPPORT_AGENT_GROUP.to_string()],
        );
        assert!(agent.is_support_agent());

        let reporter = AuthContext::new(Uuid::new_v4(), vec!["users".to_string()]);
        assert!(!reporter.is_support_agent());
    }
}
