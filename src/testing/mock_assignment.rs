//! Mock agent assignment for testing.

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::assignment::AgentAssignment;

/// Mock implementation of the [`AgentAssignment`] trait. Returns a fixed
/// agent id, or `None` to leave tickets unassigned.
#[derive(Debug, Default)]
pub struct MockAgentAssignment {
    agent: RwLock<Option<Uuid>>,
}

impl MockAgentAssignment {
    /// No agent available; tickets stay unassigned.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent(agent_id: Uuid) -> Self {
        Self {
            agent: RwLock::new(Some(agent_id)),
        }
    }

    pub async fn set_agent(&self, agent_id: Option<Uuid>) {
        *self.agent.write().await = agent_id;
    }
}

#[async_trait]
impl AgentAssignment for MockAgentAssignment {
    async fn pick_agent(&self) -> Option<Uuid> {
        *self.agent.read().await
    }
}
